//! The VU data-and-coordination core: tabular [`DataProvider`]s deduplicated
//! by a process-wide [`ProviderRegistry`], a per-VU [`DataManager`] façade
//! over them, and a [`RendezvousBarrier`] for cross-VU synchronization
//! points.
#![deny(rustdoc::broken_intra_doc_links)]

pub mod barrier;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod manager;
mod metrics;
pub mod provider;
pub mod registry;
pub mod row;
pub mod source;
pub mod value;

pub use barrier::{BarrierObserver, BarrierStats, RendezvousBarrier, WaitReason, WaitResult};
pub use config::{
    BarrierPointConfig, ChangePolicy, Distribution, Exhaustion, LegacyMode, Order, ProviderConfig,
    ReleasePolicy, Scope,
};
pub use context::VuContext;
pub use error::{BarrierError, ManagerError, ProviderError};
pub use manager::{DataManager, ScenarioSource};
pub use provider::{DataProvider, ExhaustionAction, GetRowResult, Iteration, ProviderStatus, VuId};
pub use registry::ProviderRegistry;
pub use row::Row;
pub use value::Value;
