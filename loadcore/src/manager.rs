//! [`DataManager`]: the per-VU façade binding one global provider and any
//! number of scenario-scoped providers to a single VU identity (spec §4.2).
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::context::VuContext;
use crate::error::ManagerError;
use crate::provider::{DataProvider, ExhaustionAction, Iteration, VuId};
use crate::registry::ProviderRegistry;

/// A scenario's declared tabular source, if it has one. Scenarios without a
/// `provider` simply have no scenario-scoped data; `loadScenarioInto` for
/// them is a no-op.
#[derive(Debug, Clone)]
pub struct ScenarioSource {
    /// The scenario's name, used to key [`DataManager::load_scenario_into`].
    pub name: String,
    /// The scenario's tabular source config, if any.
    pub provider: Option<ProviderConfig>,
}

/// Per-VU façade over the shared [`ProviderRegistry`]: mediates iteration
/// lifecycle and propagates stop signals, per the two-flag state machine of
/// spec §4.2.
pub struct DataManager {
    registry: Arc<ProviderRegistry>,
    vu_id: VuId,
    iteration: Iteration,
    global: Option<Arc<DataProvider>>,
    scenarios: HashMap<String, Arc<DataProvider>>,
    stop_vu: AtomicBool,
    stop_test: AtomicBool,
}

impl DataManager {
    /// Bind this manager to `vu_id`, optionally attaching a provider for the
    /// global row source.
    pub fn init(
        registry: Arc<ProviderRegistry>,
        vu_id: VuId,
        global_config: Option<ProviderConfig>,
    ) -> Self {
        let global = global_config.map(|cfg| registry.acquire(cfg));
        DataManager {
            registry,
            vu_id,
            iteration: 0,
            global,
            scenarios: HashMap::new(),
            stop_vu: AtomicBool::new(false),
            stop_test: AtomicBool::new(false),
        }
    }

    /// Acquire (and pre-load) a provider for every scenario that declares a
    /// tabular source. A load failure for one scenario is logged and that
    /// scenario's provider becomes absent; it does not fail init for the
    /// others.
    pub async fn init_scenarios(&mut self, scenarios: &[ScenarioSource]) {
        for scenario in scenarios {
            let Some(config) = &scenario.provider else {
                continue;
            };
            let provider = self.registry.acquire(config.clone());
            match provider.load().await {
                Ok(()) => {
                    self.scenarios.insert(scenario.name.clone(), provider);
                }
                Err(error) => {
                    tracing::warn!(
                        scenario = %scenario.name,
                        %error,
                        "scenario data source failed to load; scenario will have no tabular data"
                    );
                }
            }
        }
    }

    /// Record the current iteration number.
    pub fn on_iteration_start(&mut self, iteration: Iteration) {
        self.iteration = iteration;
    }

    /// Release any checked-out rows for this iteration, across the global
    /// provider (if any) and every scenario provider. Order is unspecified;
    /// a release failure on one provider doesn't stop the others.
    pub async fn on_iteration_end(&self, iteration: Iteration) {
        if let Some(provider) = &self.global {
            if let Err(error) = provider.release_row(self.vu_id, iteration).await {
                tracing::warn!(%error, "failed to release global row");
            }
        }
        for (name, provider) in &self.scenarios {
            if let Err(error) = provider.release_row(self.vu_id, iteration).await {
                tracing::warn!(scenario = %name, %error, "failed to release scenario row");
            }
        }
    }

    /// Resolve a row from the global provider and write its columns into
    /// `context` unconditionally (global precedence). Returns `false` iff
    /// this manager has latched into a stop state or the provider reports
    /// `stop_vu`. A `stop_test` result is returned as
    /// [`ManagerError::ExhaustionStopTest`] for the harness to propagate.
    pub async fn load_global_into(&self, context: &mut VuContext) -> Result<bool, ManagerError> {
        let Some(provider) = &self.global else {
            return Ok(true);
        };
        self.load_into(provider, context, VuContext::apply_global)
            .await
    }

    /// Resolve a row from the named scenario's provider and write its
    /// columns into `context` only where absent (scenario precedence is
    /// lower than global). Unknown scenarios are no-ops returning `true`.
    pub async fn load_scenario_into(
        &self,
        scenario: &str,
        context: &mut VuContext,
    ) -> Result<bool, ManagerError> {
        let Some(provider) = self.scenarios.get(scenario) else {
            return Ok(true);
        };
        self.load_into(provider, context, VuContext::apply_scenario)
            .await
    }

    async fn load_into(
        &self,
        provider: &Arc<DataProvider>,
        context: &mut VuContext,
        apply: impl FnOnce(&mut VuContext, crate::row::Row),
    ) -> Result<bool, ManagerError> {
        if self.should_stop() {
            return Ok(false);
        }

        let result = match provider.get_row(self.vu_id, self.iteration).await {
            Ok(result) => result,
            Err(error) => {
                // A source-level failure (e.g. the file disappeared between
                // load() and get_row()) isn't one of the modeled exhaustion
                // outcomes; treat it like no_value rather than crashing the
                // VU.
                tracing::warn!(%error, "data provider error; continuing without a row");
                return Ok(true);
            }
        };

        if let Some(row) = result.row {
            apply(context, row);
            return Ok(true);
        }

        match result.action {
            Some(ExhaustionAction::StopVu) => {
                self.stop_vu.store(true, Ordering::SeqCst);
                Ok(false)
            }
            Some(ExhaustionAction::StopTest) => {
                self.stop_test.store(true, Ordering::SeqCst);
                self.stop_vu.store(true, Ordering::SeqCst);
                Err(ManagerError::ExhaustionStopTest)
            }
            // `no_value`, and the unique-scope soft-wait (no action at all):
            // the iteration continues without this slot populated.
            Some(ExhaustionAction::NoValue) | None => Ok(true),
        }
    }

    /// Whether this VU should stop iterating.
    pub fn should_stop(&self) -> bool {
        self.stop_vu.load(Ordering::SeqCst)
    }

    /// Whether the whole test run should stop.
    pub fn should_stop_test(&self) -> bool {
        self.stop_test.load(Ordering::SeqCst)
    }
}
