//! Metric name constants for the gauges this crate publishes, mirrored on
//! `readyset_client::metrics::recorded`'s pattern of a flat set of `&str`
//! constants consumed through the `metrics` crate's macros.

/// Rows currently available (not checked out) in a provider's pool.
pub const PROVIDER_ROWS_AVAILABLE: &str = "loadcore_provider_rows_available";
/// Rows currently checked out of a provider's pool.
pub const PROVIDER_ROWS_CHECKED_OUT: &str = "loadcore_provider_rows_checked_out";
/// VUs a provider has permanently stopped via `stop_vu`.
pub const PROVIDER_STOPPED_VUS: &str = "loadcore_provider_stopped_vus";
/// Count of distinct providers held by the process-wide registry.
pub const REGISTRY_PROVIDER_COUNT: &str = "loadcore_registry_provider_count";
/// VUs currently waiting at a rendezvous point.
pub const BARRIER_WAITING: &str = "loadcore_barrier_waiting";
/// Cohorts a rendezvous point has released so far.
pub const BARRIER_GENERATIONS: &str = "loadcore_barrier_generations";
