//! Error taxonomy for the VU data-and-coordination core (spec §7).
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by [`crate::provider::DataProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configured source file could not be opened.
    #[error("tabular source {path} could not be opened: {source}")]
    SourceMissing {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source opened, but yielded zero usable rows after filtering.
    #[error("tabular source {path} produced no rows")]
    NoData {
        /// Path that produced no rows.
        path: PathBuf,
    },
}

/// Errors surfaced by [`crate::manager::DataManager`].
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The global provider's exhaustion policy is `stop_test`; the harness
    /// is expected to halt the whole run.
    #[error("global data provider exhausted: test run must stop")]
    ExhaustionStopTest,
}

/// Errors surfaced by [`crate::barrier::RendezvousBarrier`].
#[derive(Debug, Error)]
pub enum BarrierError {
    /// `reset()` was called while this VU was waiting; callers must treat
    /// this as a test abort.
    #[error("rendezvous point {name} was reset while waiting")]
    Reset {
        /// The point that was reset.
        name: String,
    },
}
