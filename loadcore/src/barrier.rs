//! [`RendezvousBarrier`]: a named, count-based rendezvous point with a
//! timeout-driven partial release, process-wide singleton semantics (spec
//! §4.3).
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::BarrierPointConfig;
use crate::error::BarrierError;
use crate::provider::VuId;

/// Why a [`RendezvousBarrier::wait`] call released (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The point's arrival threshold was reached.
    CountReached,
    /// The point's timeout elapsed before the threshold was reached.
    Timeout,
    /// The barrier was stopped; the point stays inactive until a `reset()`.
    Inactive,
}

/// The outcome of a [`RendezvousBarrier::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitResult {
    /// Whether this arrival was released (always `true`; a rejected wait
    /// surfaces as `Err(BarrierError::Reset)` instead).
    pub released: bool,
    /// Why the release happened.
    pub reason: WaitReason,
    /// How long this arrival waited, in milliseconds.
    pub wait_time_ms: u64,
    /// How many VUs were released together with this arrival.
    pub cohort_size: usize,
}

/// Point-in-time counters for one named barrier point.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarrierStats {
    /// How many times this point has released a cohort (by threshold or by
    /// timeout).
    pub generations: u64,
    /// How many VUs are currently waiting at this point.
    pub waiting: usize,
    /// The configured arrival count required to release by threshold.
    pub count: usize,
}

/// Observes barrier lifecycle events. Implementations are a thin callback
/// list; the barrier does not depend on any particular sink.
pub trait BarrierObserver: Send + Sync {
    /// Called when a VU arrives at `point`.
    fn arrived(&self, _point: &str, _vu_id: VuId) {}
    /// Called once per cohort release, with how many waiters were released.
    fn released(&self, _point: &str, _released: usize, _timed_out: bool) {}
}

type Waiters = Vec<(VuId, Instant, oneshot::Sender<WaitResult>)>;

struct Generation {
    config: BarrierPointConfig,
    arrived: Waiters,
    cancel: CancellationToken,
}

impl Generation {
    fn fresh(config: BarrierPointConfig) -> Self {
        Generation {
            config,
            arrived: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }
}

struct PointState {
    current: Generation,
    generations: u64,
}

impl PointState {
    fn new(config: BarrierPointConfig) -> Self {
        PointState {
            current: Generation::fresh(config),
            generations: 0,
        }
    }
}

/// Send `reason` to every waiter in `waiters`, each computing its own elapsed
/// wait time. Returns how many were released.
fn release_all(waiters: Waiters, reason: WaitReason) -> usize {
    let cohort_size = waiters.len();
    for (_, arrived_at, tx) in waiters {
        let _ = tx.send(WaitResult {
            released: true,
            reason,
            wait_time_ms: arrived_at.elapsed().as_millis() as u64,
            cohort_size,
        });
    }
    cohort_size
}

/// A named rendezvous point, shared by every VU in the process that waits on
/// the same name. The first arrival at an unseen name fixes that point's
/// config (count/timeout/release policy) for its lifetime; later arrivals
/// pass a config purely as a fallback for an unseen name, and it's ignored
/// once the point exists.
pub struct RendezvousBarrier {
    points: DashMap<String, Arc<Mutex<PointState>>>,
    observers: Arc<Mutex<Vec<Arc<dyn BarrierObserver>>>>,
    active: AtomicBool,
}

impl Default for RendezvousBarrier {
    fn default() -> Self {
        RendezvousBarrier {
            points: DashMap::new(),
            observers: Arc::new(Mutex::new(Vec::new())),
            active: AtomicBool::new(true),
        }
    }
}

impl RendezvousBarrier {
    /// An empty barrier with no points yet arrived-at.
    pub fn new() -> Self {
        RendezvousBarrier::default()
    }

    /// Register an observer for arrival/release events.
    pub fn add_observer(&self, observer: Arc<dyn BarrierObserver>) {
        self.observers.lock().push(observer);
    }

    fn notify_released(
        observers: &Mutex<Vec<Arc<dyn BarrierObserver>>>,
        point: &str,
        released: usize,
        timed_out: bool,
    ) {
        for observer in observers.lock().iter() {
            observer.released(point, released, timed_out);
        }
    }

    /// Arrive at `config.name`, blocking until the point's threshold is
    /// reached or its timeout elapses. Returns [`BarrierError::Reset`] if the
    /// point is reset while this call is waiting.
    pub async fn wait(
        &self,
        config: BarrierPointConfig,
        vu_id: VuId,
    ) -> Result<WaitResult, BarrierError> {
        if !self.active.load(Ordering::Acquire) {
            return Ok(WaitResult {
                released: true,
                reason: WaitReason::Inactive,
                wait_time_ms: 0,
                cohort_size: 0,
            });
        }

        let point_name = config.name.clone();
        let point = self
            .points
            .entry(point_name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(PointState::new(config))))
            .clone();

        for observer in self.observers.lock().iter() {
            observer.arrived(&point_name, vu_id);
        }

        let (rx, arm, released_now) = {
            let mut state = point.lock();
            let (tx, rx) = oneshot::channel();
            let just_armed = state.current.arrived.is_empty();
            state.current.arrived.push((vu_id, Instant::now(), tx));

            // Pushes happen one at a time under the point's lock, so the
            // first push to reach `count` always lands exactly on it: no
            // generation ever accumulates more arrivals than its count
            // before being drained.
            let threshold_reached =
                state.current.arrived.len() >= state.current.config.count.max(1);
            let released_now = if threshold_reached {
                let config = state.current.config.clone();
                let finished = std::mem::replace(&mut state.current, Generation::fresh(config));
                state.generations += 1;
                Some(finished.arrived)
            } else {
                None
            };
            // A timeout of 0 means wait indefinitely for count: never arm a
            // timer for it (spec §4.3).
            let arm = just_armed && released_now.is_none() && state.current.config.timeout_ms > 0;
            (rx, arm, released_now)
        };

        if let Some(waiters) = released_now {
            // Every arrival made it into this cohort (see the comment
            // above), so every waiter here gets `CountReached`.
            let count = release_all(waiters, WaitReason::CountReached);
            Self::notify_released(&self.observers, &point_name, count, false);
        } else if arm {
            self.arm_timer(point_name.clone(), point.clone());
        }

        rx.await.map_err(|_| BarrierError::Reset {
            name: point_name.clone(),
        })
    }

    fn arm_timer(&self, point_name: String, point: Arc<Mutex<PointState>>) {
        let (timeout, cancel) = {
            let state = point.lock();
            (
                Duration::from_millis(state.current.config.timeout_ms),
                state.current.cancel.clone(),
            )
        };
        let observers = self.observers.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    let finished = {
                        let mut state = point.lock();
                        if state.current.arrived.is_empty() {
                            return;
                        }
                        let config = state.current.config.clone();
                        let finished = std::mem::replace(&mut state.current, Generation::fresh(config));
                        state.generations += 1;
                        finished
                    };

                    // A timeout always drains every waiter currently parked at the
                    // point, regardless of `release_policy` (spec §4.3, §8 P5): the
                    // policy only distinguishes the threshold-reached path, and
                    // since arrivals are pushed one at a time, that path never
                    // accumulates more than `count` waiters to split in the first
                    // place.
                    let released_count = release_all(finished.arrived, WaitReason::Timeout);
                    Self::notify_released(&observers, &point_name, released_count, true);
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Snapshot the stats of a named point, if it has ever been arrived-at.
    pub fn stats(&self, name: &str) -> Option<BarrierStats> {
        let stats = self.points.get(name).map(|point| {
            let state = point.lock();
            BarrierStats {
                generations: state.generations,
                waiting: state.current.arrived.len(),
                count: state.current.config.count,
            }
        })?;
        metrics::gauge!(crate::metrics::BARRIER_WAITING, "point" => name.to_string())
            .set(stats.waiting as f64);
        metrics::gauge!(crate::metrics::BARRIER_GENERATIONS, "point" => name.to_string())
            .set(stats.generations as f64);
        Some(stats)
    }

    /// Snapshot stats for every point that has ever been arrived-at.
    pub fn all_stats(&self) -> HashMap<String, BarrierStats> {
        self.points
            .iter()
            .map(|entry| {
                let state = entry.value().lock();
                (
                    entry.key().clone(),
                    BarrierStats {
                        generations: state.generations,
                        waiting: state.current.arrived.len(),
                        count: state.current.config.count,
                    },
                )
            })
            .collect()
    }

    /// Reset every point: cancel pending timers, drop every waiter's sender
    /// so its `wait()` resolves to [`BarrierError::Reset`], drop all
    /// generation history, and make the barrier active again (reversing a
    /// prior [`Self::stop`]).
    pub fn reset(&self) {
        for entry in self.points.iter() {
            let mut state = entry.value().lock();
            state.current.cancel.cancel();
            state.current.arrived.clear();
        }
        self.points.clear();
        self.active.store(true, Ordering::Release);
    }

    /// Wake every current waiter with `released=true, reason=inactive` and
    /// make the barrier inactive: subsequent `wait()` calls resolve
    /// synchronously with the same outcome until [`Self::reset`].
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        for entry in self.points.iter() {
            let mut state = entry.value().lock();
            state.current.cancel.cancel();
            let config = state.current.config.clone();
            let finished = std::mem::replace(&mut state.current, Generation::fresh(config));
            release_all(finished.arrived, WaitReason::Inactive);
        }
    }
}
