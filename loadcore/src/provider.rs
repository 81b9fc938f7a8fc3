//! [`DataProvider`]: owns one tabular source, enforces the
//! distribution/change/exhaustion policies of spec §4.1, and serves rows to
//! many VUs concurrently.
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::config::{ChangePolicy, Distribution, Exhaustion, Order, ProviderConfig, Scope};
use crate::error::ProviderError;
use crate::row::Row;
use crate::source;

/// A virtual user identifier.
pub type VuId = u64;
/// A per-VU iteration counter.
pub type Iteration = u64;

/// What a caller should do in response to an exhausted/stopped row request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionAction {
    /// Halt the whole test run.
    StopTest,
    /// This VU should stop iterating.
    StopVu,
    /// Continue the iteration without this row.
    NoValue,
}

/// The result of [`DataProvider::get_row`].
#[derive(Debug, Clone)]
pub struct GetRowResult {
    /// The row selected, if any.
    pub row: Option<Row>,
    /// Whether the provider (or this VU, for `stop_vu`) is now exhausted.
    pub exhausted: bool,
    /// The action the caller should take, if the provider didn't return a
    /// row (or, for `stop_vu`/`stop_test`/`no_value`, regardless).
    pub action: Option<ExhaustionAction>,
}

impl GetRowResult {
    fn row(row: Row) -> Self {
        GetRowResult {
            row: Some(row),
            exhausted: false,
            action: None,
        }
    }

    fn soft_wait() -> Self {
        GetRowResult {
            row: None,
            exhausted: false,
            action: None,
        }
    }

    fn action(action: ExhaustionAction) -> Self {
        GetRowResult {
            row: None,
            exhausted: true,
            action: Some(action),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CheckoutEntry {
    vu_id: VuId,
    iteration: Iteration,
    #[allow(dead_code)]
    checkout_time: Instant,
}

/// A point-in-time snapshot of a provider's bookkeeping, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStatus {
    /// Total rows materialized at load.
    pub rows_total: usize,
    /// Rows currently available for checkout (scope=unique only).
    pub available: usize,
    /// Rows currently checked out (scope=unique only).
    pub checked_out: usize,
    /// VUs that have been told to stop.
    pub stopped_vus: usize,
    /// Whether the provider is currently in an exhausted state.
    pub exhausted: bool,
}

struct ProviderState {
    rows: Vec<Row>,
    distribution: Distribution,
    global_cursor: usize,
    available: Vec<usize>,
    checked_out: HashMap<usize, CheckoutEntry>,
    vu_cache: HashMap<VuId, Row>,
    iter_cache: HashMap<(VuId, Iteration), Row>,
    stopped_vus: HashSet<VuId>,
    exhausted: bool,
    rng: SmallRng,
}

impl ProviderState {
    fn new(rows: Vec<Row>, distribution: Distribution) -> Self {
        let mut rng = SmallRng::from_os_rng();
        let mut available: Vec<usize> = (0..rows.len()).collect();
        if distribution.scope == Scope::Unique && distribution.order == Order::Random {
            loadcore_util::shuffle::shuffle_in_place(&mut available, &mut rng);
        }
        ProviderState {
            rows,
            distribution,
            global_cursor: 0,
            available,
            checked_out: HashMap::new(),
            vu_cache: HashMap::new(),
            iter_cache: HashMap::new(),
            stopped_vus: HashSet::new(),
            exhausted: false,
            rng,
        }
    }

    fn repopulate_available(&mut self) {
        self.available = (0..self.rows.len()).collect();
        if self.distribution.order == Order::Random {
            loadcore_util::shuffle::shuffle_in_place(&mut self.available, &mut self.rng);
        }
    }

    fn take_unique_index(&mut self) -> Option<usize> {
        match self.distribution.order {
            Order::Sequential => {
                if self.available.is_empty() {
                    None
                } else {
                    Some(self.available.remove(0))
                }
            }
            Order::Random => {
                loadcore_util::shuffle::take_random(&mut self.available, &mut self.rng)
            }
        }
    }

    fn release_unique_index(&mut self, idx: usize) {
        match self.distribution.order {
            Order::Sequential => {
                let pos = self.available.partition_point(|&x| x < idx);
                self.available.insert(pos, idx);
            }
            Order::Random => self.available.push(idx),
        }
        if !self.available.is_empty() {
            self.exhausted = false;
        }
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            rows_total: self.rows.len(),
            available: self.available.len(),
            checked_out: self.checked_out.len(),
            stopped_vus: self.stopped_vus.len(),
            exhausted: self.exhausted,
        }
    }
}

/// Owns one tabular source and serves rows to many VUs under the
/// distribution/change/exhaustion policies configured for it.
pub struct DataProvider {
    config: ProviderConfig,
    load_gate: tokio::sync::OnceCell<()>,
    state: parking_lot::Mutex<Option<ProviderState>>,
}

impl DataProvider {
    /// Construct a provider for `config`. Does not read the source; call
    /// [`DataProvider::load`] or [`DataProvider::get_row`] for that.
    pub fn new(config: ProviderConfig) -> Self {
        DataProvider {
            config,
            load_gate: tokio::sync::OnceCell::new(),
            state: parking_lot::Mutex::new(None),
        }
    }

    /// This provider's source configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Read the source once, applying the header/skip/projection/filter/
    /// rename passes. Idempotent (R1): a second call is a no-op once the
    /// first succeeds. Concurrent first callers all await the same load.
    pub async fn load(&self) -> Result<(), ProviderError> {
        self.load_gate
            .get_or_try_init(|| async {
                let rows = source::load_rows(&self.config)?;
                let distribution = self.config.resolved_distribution();
                *self.state.lock() = Some(ProviderState::new(rows, distribution));
                Ok::<(), ProviderError>(())
            })
            .await?;
        Ok(())
    }

    /// A snapshot of this provider's bookkeeping.
    pub fn status(&self) -> ProviderStatus {
        let status = match self.state.lock().as_ref() {
            Some(state) => state.status(),
            None => ProviderStatus {
                rows_total: 0,
                available: 0,
                checked_out: 0,
                stopped_vus: 0,
                exhausted: false,
            },
        };
        metrics::gauge!(crate::metrics::PROVIDER_ROWS_AVAILABLE).set(status.available as f64);
        metrics::gauge!(crate::metrics::PROVIDER_ROWS_CHECKED_OUT).set(status.checked_out as f64);
        metrics::gauge!(crate::metrics::PROVIDER_STOPPED_VUS).set(status.stopped_vus as f64);
        status
    }

    /// Resolve a row for `(vu_id, iteration)`, loading the source on first
    /// use if necessary. See spec §4.1 for the full selection algorithm.
    pub async fn get_row(
        &self,
        vu_id: VuId,
        iteration: Iteration,
    ) -> Result<GetRowResult, ProviderError> {
        self.load().await?;
        let change_policy = self.config.resolved_change_policy();
        let mut guard = self.state.lock();
        let state = guard.as_mut().expect("load() initializes state");

        if state.stopped_vus.contains(&vu_id) {
            return Ok(GetRowResult::action(ExhaustionAction::StopVu));
        }

        if change_policy == ChangePolicy::EachVu {
            if let Some(row) = state.vu_cache.get(&vu_id) {
                return Ok(GetRowResult::row(row.clone()));
            }
        }
        if change_policy == ChangePolicy::EachIteration {
            if let Some(row) = state.iter_cache.get(&(vu_id, iteration)) {
                return Ok(GetRowResult::row(row.clone()));
            }
        }

        let result = select_row(state, vu_id, iteration);

        if let Some(row) = &result.row {
            match change_policy {
                ChangePolicy::EachVu => {
                    state.vu_cache.insert(vu_id, row.clone());
                }
                ChangePolicy::EachIteration => {
                    state.iter_cache.insert((vu_id, iteration), row.clone());
                }
                ChangePolicy::EachUse => {}
            }
        }

        Ok(result)
    }

    /// Reverse a checkout for scope=unique (no-op otherwise, or if none is
    /// found for this VU/iteration).
    pub async fn release_row(
        &self,
        vu_id: VuId,
        iteration: Iteration,
    ) -> Result<(), ProviderError> {
        self.load().await?;
        let change_policy = self.config.resolved_change_policy();
        let mut guard = self.state.lock();
        let state = guard.as_mut().expect("load() initializes state");

        if state.distribution.scope != Scope::Unique {
            return Ok(());
        }

        let found = state.checked_out.iter().find_map(|(&idx, entry)| {
            let matches = entry.vu_id == vu_id
                && (change_policy != ChangePolicy::EachIteration || entry.iteration == iteration);
            matches.then_some(idx)
        });

        let Some(idx) = found else {
            return Ok(());
        };

        state.checked_out.remove(&idx);
        state.release_unique_index(idx);
        if change_policy == ChangePolicy::EachIteration {
            state.iter_cache.remove(&(vu_id, iteration));
        }

        Ok(())
    }
}

fn select_row(state: &mut ProviderState, vu_id: VuId, iteration: Iteration) -> GetRowResult {
    match state.distribution.scope {
        Scope::Local => select_local(state, vu_id),
        Scope::Global => select_global(state, vu_id),
        Scope::Unique => select_unique(state, vu_id, iteration),
    }
}

fn select_local(state: &mut ProviderState, vu_id: VuId) -> GetRowResult {
    if state.rows.is_empty() {
        return GetRowResult::action(ExhaustionAction::NoValue);
    }
    let idx = match state.distribution.order {
        Order::Sequential => (vu_id.saturating_sub(1) as usize) % state.rows.len(),
        Order::Random => {
            use rand::Rng;
            state.rng.random_range(0..state.rows.len())
        }
    };
    GetRowResult::row(state.rows[idx].clone())
}

fn select_global(state: &mut ProviderState, vu_id: VuId) -> GetRowResult {
    if state.rows.is_empty() {
        return exhaust(state, vu_id, state.distribution.exhaustion);
    }
    match state.distribution.order {
        Order::Random => {
            use rand::Rng;
            let idx = state.rng.random_range(0..state.rows.len());
            GetRowResult::row(state.rows[idx].clone())
        }
        Order::Sequential => {
            if state.global_cursor >= state.rows.len() {
                if state.distribution.exhaustion == Exhaustion::Cycle {
                    state.global_cursor = 0;
                    let row = state.rows[0].clone();
                    state.global_cursor = 1;
                    GetRowResult::row(row)
                } else {
                    exhaust(state, vu_id, state.distribution.exhaustion)
                }
            } else {
                let idx = state.global_cursor;
                state.global_cursor += 1;
                GetRowResult::row(state.rows[idx].clone())
            }
        }
    }
}

fn select_unique(state: &mut ProviderState, vu_id: VuId, iteration: Iteration) -> GetRowResult {
    if state.available.is_empty() {
        if state.distribution.exhaustion == Exhaustion::Cycle {
            if !state.checked_out.is_empty() {
                return GetRowResult::soft_wait();
            }
            state.repopulate_available();
        } else {
            return exhaust(state, vu_id, state.distribution.exhaustion);
        }
    }

    let Some(idx) = state.take_unique_index() else {
        return GetRowResult::soft_wait();
    };
    state.checked_out.insert(
        idx,
        CheckoutEntry {
            vu_id,
            iteration,
            checkout_time: Instant::now(),
        },
    );
    GetRowResult::row(state.rows[idx].clone())
}

fn exhaust(state: &mut ProviderState, vu_id: VuId, exhaustion: Exhaustion) -> GetRowResult {
    state.exhausted = true;
    match exhaustion {
        Exhaustion::StopTest => GetRowResult::action(ExhaustionAction::StopTest),
        Exhaustion::StopVu => {
            state.stopped_vus.insert(vu_id);
            GetRowResult::action(ExhaustionAction::StopVu)
        }
        Exhaustion::NoValue => GetRowResult::action(ExhaustionAction::NoValue),
        Exhaustion::Cycle => unreachable!("cycle is handled by callers before reaching exhaust()"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ChangePolicy as CP, Distribution, Exhaustion as Ex, Order as Or, Scope as Sc,
    };
    use std::io::Write;

    fn config_with(
        contents: &str,
        dist: Distribution,
        change_policy: Option<ChangePolicy>,
    ) -> (tempfile::NamedTempFile, ProviderConfig) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let cfg = ProviderConfig {
            file: f.path().to_path_buf(),
            encoding: None,
            delimiter: None,
            skip_first_line: false,
            skip_empty_lines: true,
            columns: None,
            filter: None,
            column_rename: indexmap::IndexMap::new(),
            distribution: Some(dist),
            change_policy,
            mode: None,
            randomize: false,
            cycle_on_exhaustion: true,
        };
        (f, cfg)
    }

    #[tokio::test]
    async fn scenario_1_global_sequential_cycle() {
        let (_f, cfg) = config_with(
            "v\nA\nB\nC\n",
            Distribution {
                scope: Sc::Global,
                order: Or::Sequential,
                exhaustion: Ex::Cycle,
            },
            None,
        );
        let provider = DataProvider::new(cfg);
        let a = provider.get_row(1, 0).await.unwrap().row.unwrap();
        let b = provider.get_row(2, 0).await.unwrap().row.unwrap();
        let c = provider.get_row(1, 1).await.unwrap().row.unwrap();
        let d = provider.get_row(2, 1).await.unwrap().row.unwrap();
        assert_eq!(a.get("v").unwrap().to_string(), "A");
        assert_eq!(b.get("v").unwrap().to_string(), "B");
        assert_eq!(c.get("v").unwrap().to_string(), "C");
        assert_eq!(d.get("v").unwrap().to_string(), "A");
    }

    #[tokio::test]
    async fn scenario_2_unique_sequential_stop_vu_then_release() {
        let (_f, cfg) = config_with(
            "v\nA\nB\n",
            Distribution {
                scope: Sc::Unique,
                order: Or::Sequential,
                exhaustion: Ex::StopVu,
            },
            Some(CP::EachIteration),
        );
        let provider = DataProvider::new(cfg);
        let a = provider.get_row(1, 0).await.unwrap();
        assert_eq!(a.row.unwrap().get("v").unwrap().to_string(), "A");
        let b = provider.get_row(2, 0).await.unwrap();
        assert_eq!(b.row.unwrap().get("v").unwrap().to_string(), "B");
        let stopped = provider.get_row(3, 0).await.unwrap();
        assert!(stopped.row.is_none());
        assert_eq!(stopped.action, Some(ExhaustionAction::StopVu));

        // VU 3 was told to stop; that's permanent (I6), so it stays stopped
        // even after a release frees up a slot for someone else.
        provider.release_row(1, 0).await.unwrap();
        let still_stopped = provider.get_row(3, 1).await.unwrap();
        assert!(still_stopped.row.is_none());
        assert_eq!(still_stopped.action, Some(ExhaustionAction::StopVu));

        let after_release = provider.get_row(4, 0).await.unwrap();
        assert_eq!(
            after_release.row.unwrap().get("v").unwrap().to_string(),
            "A"
        );
    }

    #[tokio::test]
    async fn scenario_3_each_vu_caching() {
        let (_f, cfg) = config_with(
            "v\nA\nB\nC\n",
            Distribution {
                scope: Sc::Global,
                order: Or::Sequential,
                exhaustion: Ex::Cycle,
            },
            Some(CP::EachVu),
        );
        let provider = DataProvider::new(cfg);
        let a0 = provider.get_row(1, 0).await.unwrap().row.unwrap();
        let a1 = provider.get_row(1, 1).await.unwrap().row.unwrap();
        let a2 = provider.get_row(1, 2).await.unwrap().row.unwrap();
        assert_eq!(a0, a1);
        assert_eq!(a1, a2);
        let b = provider.get_row(2, 0).await.unwrap().row.unwrap();
        assert_eq!(b.get("v").unwrap().to_string(), "B");
        assert_eq!(provider.status().rows_total, 3);
    }

    #[tokio::test]
    async fn scenario_4_legacy_random_never_exhausts() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"v\nA\nB\nC\n").unwrap();
        let cfg = ProviderConfig {
            file: f.path().to_path_buf(),
            encoding: None,
            delimiter: None,
            skip_first_line: false,
            skip_empty_lines: true,
            columns: None,
            filter: None,
            column_rename: indexmap::IndexMap::new(),
            distribution: None,
            change_policy: None,
            mode: Some(crate::config::LegacyMode::Random),
            randomize: false,
            cycle_on_exhaustion: true,
        };
        let provider = DataProvider::new(cfg);
        for i in 0..1000u64 {
            let result = provider.get_row(1, i).await.unwrap();
            assert!(result.action.is_none());
            let v = result.row.unwrap().get("v").unwrap().to_string();
            assert!(["A", "B", "C"].contains(&v.as_str()));
        }
    }

    #[tokio::test]
    async fn i1_i2_hold_across_checkout_release_cycles() {
        let (_f, cfg) = config_with(
            "v\nA\nB\nC\n",
            Distribution {
                scope: Sc::Unique,
                order: Or::Sequential,
                exhaustion: Ex::Cycle,
            },
            Some(CP::EachIteration),
        );
        let provider = DataProvider::new(cfg);
        for vu in 1..=3u64 {
            provider.get_row(vu, 0).await.unwrap();
        }
        let status = provider.status();
        assert_eq!(status.available + status.checked_out, status.rows_total);
        for vu in 1..=3u64 {
            provider.release_row(vu, 0).await.unwrap();
        }
        let status = provider.status();
        assert_eq!(status.checked_out, 0);
        assert_eq!(status.available, 3);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Checkout { vu: u64, iteration: u64 },
        Release { vu: u64, iteration: u64 },
    }

    fn op_strategy() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        (0..4u64, 0..6u64, any::<bool>()).prop_map(|(vu, iteration, checkout)| {
            if checkout {
                Op::Checkout { vu, iteration }
            } else {
                Op::Release { vu, iteration }
            }
        })
    }

    use proptest::prop_assert_eq;

    proptest::proptest! {
        // I1/I2 (P1): available + checked_out always equals rows_total, and
        // a row is never simultaneously available and checked out, no
        // matter what interleaving of checkouts/releases a VU mix drives.
        #[test]
        fn i1_i2_hold_under_arbitrary_checkout_release_interleavings(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (_f, cfg) = config_with(
                    "v\nA\nB\nC\nD\n",
                    Distribution {
                        scope: Sc::Unique,
                        order: Or::Random,
                        exhaustion: Ex::Cycle,
                    },
                    Some(CP::EachIteration),
                );
                let provider = DataProvider::new(cfg);
                for op in ops {
                    match op {
                        Op::Checkout { vu, iteration } => {
                            let _ = provider.get_row(vu, iteration).await.unwrap();
                        }
                        Op::Release { vu, iteration } => {
                            provider.release_row(vu, iteration).await.unwrap();
                        }
                    }
                    let status = provider.status();
                    prop_assert_eq!(status.available + status.checked_out, status.rows_total);
                }
                Ok(())
            })?;
        }
    }
}
