//! Configuration surface (spec §6) and the fingerprint used to deduplicate
//! providers in the [`crate::registry::ProviderRegistry`].
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where rows are drawn from for a given VU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Each VU gets its own index into `rows`, `(vuId - 1) mod len`.
    Local,
    /// All VUs share a single cursor or random pick over `rows`.
    Global,
    /// Rows are checked out from a shared pool and released explicitly.
    Unique,
}

/// How the next index is chosen from the scope's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Walk the pool in ascending order, wrapping per `Exhaustion`.
    Sequential,
    /// Pick uniformly at random from the pool.
    Random,
}

/// What happens when a scope's pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    /// Repopulate the pool and continue.
    Cycle,
    /// Add the VU to `stoppedVUs`; it takes no more rows.
    StopVu,
    /// The whole test run should halt.
    StopTest,
    /// The iteration continues with no row for this source.
    NoValue,
}

/// How often a VU is allowed to see a different row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePolicy {
    /// Always select a new row; never consult either cache.
    EachUse,
    /// Cache by `(vuId, iteration)`; a new iteration invalidates the cache.
    EachIteration,
    /// Cache by `vuId`; the same row is returned until the provider resets.
    EachVu,
}

/// The legacy, flat configuration mode, mapped per §4.1.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyMode {
    /// Maps to `{unique, sequential, stop_vu}`.
    Unique,
    /// Maps to `{global, random, cycle}`.
    Random,
    /// Maps to `{global, sequential, cycle}`.
    Next,
}

/// The distribution policy: scope, order, and exhaustion behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Distribution {
    /// The sharing model for row selection.
    pub scope: Scope,
    /// The index-choice rule within that scope.
    pub order: Order,
    /// What happens when the scope's pool runs dry.
    #[serde(rename = "on_exhausted")]
    pub exhaustion: Exhaustion,
}

/// The full, normalized configuration for one tabular source. Equality of
/// [`ProviderConfig::fingerprint`] is what the registry uses to decide
/// whether two managers share a provider instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Path to the delimited source file.
    pub file: PathBuf,
    /// Text encoding of the source; `None` means UTF-8.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Field delimiter; `None` triggers auto-detection (spec §6).
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Drop the data row immediately following the header row. Applied
    /// after header-mode parsing (which always consumes row 0 as column
    /// names) — this does not disable or replace header parsing, it skips
    /// one additional row past it (§4.1).
    #[serde(default)]
    pub skip_first_line: bool,
    /// Skip rows with no non-empty fields. Defaults to true per §6.
    #[serde(default = "default_true")]
    pub skip_empty_lines: bool,
    /// If set, project (and reorder) the parsed row down to these columns.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// A single `column OP literal` comparison (§4.1.4); `None` means no
    /// filtering.
    #[serde(default)]
    pub filter: Option<String>,
    /// Column rename map applied after projection/filtering.
    #[serde(default)]
    pub column_rename: IndexMap<String, String>,
    /// The distribution policy, if set explicitly.
    #[serde(default)]
    pub distribution: Option<Distribution>,
    /// How often a VU sees a new row.
    #[serde(default)]
    pub change_policy: Option<ChangePolicy>,
    /// The legacy flat mode, used only when `distribution` is unset.
    #[serde(default)]
    pub mode: Option<LegacyMode>,
    /// Legacy `randomize` flag: forces `order = random` when no explicit
    /// order is given.
    #[serde(default)]
    pub randomize: bool,
    /// Legacy `cycleOnExhaustion` flag: when `false` and no explicit
    /// exhaustion is given, defaults exhaustion to `stop_vu` rather than
    /// `cycle`.
    #[serde(default = "default_true")]
    pub cycle_on_exhaustion: bool,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Resolve the effective distribution, applying legacy-mode mapping and
    /// the `randomize`/`cycleOnExhaustion` defaults (§4.1.3).
    pub fn resolved_distribution(&self) -> Distribution {
        if let Some(dist) = self.distribution {
            return dist;
        }
        if let Some(mode) = self.mode {
            return match mode {
                LegacyMode::Unique => Distribution {
                    scope: Scope::Unique,
                    order: Order::Sequential,
                    exhaustion: Exhaustion::StopVu,
                },
                LegacyMode::Random => Distribution {
                    scope: Scope::Global,
                    order: Order::Random,
                    exhaustion: Exhaustion::Cycle,
                },
                LegacyMode::Next => Distribution {
                    scope: Scope::Global,
                    order: Order::Sequential,
                    exhaustion: Exhaustion::Cycle,
                },
            };
        }
        let order = if self.randomize {
            Order::Random
        } else {
            Order::Sequential
        };
        let exhaustion = if self.cycle_on_exhaustion {
            Exhaustion::Cycle
        } else {
            Exhaustion::StopVu
        };
        Distribution {
            scope: Scope::Global,
            order,
            exhaustion,
        }
    }

    /// Resolve the effective change policy (§4.1.3: `each_iteration` both
    /// when unset and when scope is `unique`).
    pub fn resolved_change_policy(&self) -> ChangePolicy {
        self.change_policy.unwrap_or(ChangePolicy::EachIteration)
    }

    /// A stable hash over the normalized config, used as the provider
    /// registry key. Two configs with the same fingerprint share a provider.
    pub fn fingerprint(&self) -> u64 {
        let renames: Vec<(&String, &String)> = self.column_rename.iter().collect();
        loadcore_util::stable_hash(&(
            &self.file,
            &self.encoding,
            self.delimiter,
            self.skip_first_line,
            self.skip_empty_lines,
            &self.columns,
            &self.filter,
            renames,
            self.resolved_distribution(),
            self.resolved_change_policy(),
        ))
    }
}

/// A named, count-based rendezvous point configuration (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierPointConfig {
    /// The point's name; first arrival wins on config (later arrivals at the
    /// same name reuse the existing config).
    pub name: String,
    /// Number of arrivals required before release.
    pub count: usize,
    /// Timeout in milliseconds; `0`/`None` means wait indefinitely.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether a release drains everyone (`all`) or exactly `count` waiters
    /// (`count`).
    #[serde(default)]
    pub release_policy: ReleasePolicy,
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Who gets woken when a rendezvous point releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// Wake every current waiter.
    #[default]
    All,
    /// Wake exactly `count` waiters, in arrival order.
    Count,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_unique_maps_to_unique_sequential_stop_vu() {
        let cfg = ProviderConfig {
            mode: Some(LegacyMode::Unique),
            ..base_config()
        };
        let dist = cfg.resolved_distribution();
        assert_eq!(dist.scope, Scope::Unique);
        assert_eq!(dist.order, Order::Sequential);
        assert_eq!(dist.exhaustion, Exhaustion::StopVu);
    }

    #[test]
    fn legacy_random_maps_to_global_random_cycle() {
        let cfg = ProviderConfig {
            mode: Some(LegacyMode::Random),
            ..base_config()
        };
        let dist = cfg.resolved_distribution();
        assert_eq!(dist.scope, Scope::Global);
        assert_eq!(dist.order, Order::Random);
        assert_eq!(dist.exhaustion, Exhaustion::Cycle);
    }

    #[test]
    fn randomize_without_explicit_order_forces_random() {
        let cfg = ProviderConfig {
            randomize: true,
            ..base_config()
        };
        assert_eq!(cfg.resolved_distribution().order, Order::Random);
    }

    #[test]
    fn fingerprint_is_stable_for_equal_configs() {
        let a = base_config();
        let b = base_config();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_on_filter_change() {
        let a = base_config();
        let b = ProviderConfig {
            filter: Some("age > 30".into()),
            ..base_config()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    fn base_config() -> ProviderConfig {
        ProviderConfig {
            file: "users.csv".into(),
            encoding: None,
            delimiter: None,
            skip_first_line: false,
            skip_empty_lines: true,
            columns: None,
            filter: None,
            column_rename: IndexMap::new(),
            distribution: None,
            change_policy: None,
            mode: None,
            randomize: false,
            cycle_on_exhaustion: true,
        }
    }
}
