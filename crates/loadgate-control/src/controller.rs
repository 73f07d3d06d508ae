//! Degradation controller — admission control over the current load level.
//!
//! The hot path (`should_reject` / `admit`) only ever reads the cached
//! snapshot; recomputation happens in a background refresh loop and,
//! as a bound on staleness, lazily at most once per configured interval.
//! A failing evaluator keeps the last-known-good snapshot, so admission
//! fails open, never closed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use loadgate_core::{
    AdmitDecision, DegradationConfig, DegradationState, HealthReport, HealthState, LoadLevel,
    LoadSnapshot,
};

use crate::evaluator::SnapshotSource;

/// Machine-readable reason attached to rejected requests.
pub const REASON_SYSTEM_OVERLOADED: &str = "SYSTEM_OVERLOADED";

struct Cached {
    snapshot: LoadSnapshot,
    state: DegradationState,
}

/// Gates admission of incoming requests on the current load level.
///
/// Shared across request handlers via `Arc`; all methods take `&self`.
pub struct DegradationController {
    source: Arc<dyn SnapshotSource>,
    allowlist: HashSet<String>,
    config: DegradationConfig,
    cached: RwLock<Cached>,
    /// Unix ms of the last lazy refresh attempt (CAS-guarded).
    last_refresh_ms: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl DegradationController {
    /// Create a controller over a snapshot source.
    ///
    /// Starts in `Normal` with an idle snapshot, so requests are
    /// admitted until the first evaluation says otherwise.
    pub fn new(source: Arc<dyn SnapshotSource>, config: DegradationConfig) -> Self {
        let now = now_millis();
        let allowlist = config.essential_endpoints.iter().cloned().collect();
        Self {
            source,
            allowlist,
            config,
            cached: RwLock::new(Cached {
                snapshot: LoadSnapshot::idle(now),
                state: DegradationState {
                    active: false,
                    level: LoadLevel::Normal,
                    activated_at: None,
                    last_evaluated_at: now,
                },
            }),
            last_refresh_ms: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Whether the given endpoint should be rejected right now.
    ///
    /// Below `Critical` every request is admitted; at `Critical` only
    /// endpoints on the essential allowlist pass.
    pub fn should_reject(&self, endpoint: &str) -> bool {
        self.refresh_if_stale(now_millis());

        let critical = {
            let cached = read_cached(&self.cached);
            cached.snapshot.load_level == LoadLevel::Critical
        };
        let reject = critical && !self.allowlist.contains(endpoint);

        if reject {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint, "request rejected under critical load");
        } else {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        }
        reject
    }

    /// Admission decision with reason code and retry-after hint.
    pub fn admit(&self, endpoint: &str) -> AdmitDecision {
        if self.should_reject(endpoint) {
            let overall_load = read_cached(&self.cached).snapshot.overall_load;
            AdmitDecision::reject(REASON_SYSTEM_OVERLOADED, self.retry_after_secs(overall_load))
        } else {
            AdmitDecision::admit()
        }
    }

    /// True while the level is `High` or `Critical`.
    pub fn is_degradation_active(&self) -> bool {
        read_cached(&self.cached).state.active
    }

    /// The most recent load snapshot.
    pub fn current_metrics(&self) -> LoadSnapshot {
        self.refresh_if_stale(now_millis());
        read_cached(&self.cached).snapshot.clone()
    }

    /// Current degradation state.
    pub fn degradation_state(&self) -> DegradationState {
        read_cached(&self.cached).state.clone()
    }

    /// Health status for the status endpoint.
    pub fn health_status(&self) -> HealthReport {
        let cached = read_cached(&self.cached);
        let status = if cached.state.active {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        HealthReport {
            status,
            snapshot: cached.snapshot.clone(),
        }
    }

    /// Cumulative (admitted, rejected) counts for the process lifetime.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.admitted.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }

    /// Re-evaluate now and install the result.
    ///
    /// Evaluation failures are logged and leave the cached snapshot
    /// untouched; a broken evaluator must never take the gate down
    /// with it.
    pub fn refresh(&self) {
        match self.source.evaluate() {
            Ok(snapshot) => self.install(snapshot),
            Err(e) => {
                warn!(error = %e, "load evaluation failed, keeping last snapshot");
            }
        }
    }

    /// Run the periodic refresh loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = interval.as_millis() as u64,
            "degradation controller refresh loop started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => self.refresh(),
                _ = shutdown.changed() => {
                    info!("degradation controller shutting down");
                    break;
                }
            }
        }
    }

    /// Refresh at most once per `refresh_interval_ms`; a CAS picks a
    /// single winner under concurrent calls.
    fn refresh_if_stale(&self, now_ms: u64) {
        let last = self.last_refresh_ms.load(Ordering::Acquire);
        if last != 0 && now_ms.saturating_sub(last) < self.config.refresh_interval_ms {
            return;
        }
        if self
            .last_refresh_ms
            .compare_exchange(last, now_ms.max(1), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.refresh();
        }
    }

    fn install(&self, snapshot: LoadSnapshot) {
        let mut cached = write_cached(&self.cached);
        // Never replace a snapshot with an older one.
        if snapshot.computed_at < cached.snapshot.computed_at {
            return;
        }

        let previous_level = cached.state.level;
        let was_active = cached.state.active;
        let level = snapshot.load_level;
        let active = level.is_degraded();

        if active && !was_active {
            cached.state.activated_at = Some(snapshot.computed_at);
            warn!(
                level = %level,
                overall_load = snapshot.overall_load,
                "degradation activated"
            );
        } else if !active && was_active {
            cached.state.activated_at = None;
            info!(
                level = %level,
                overall_load = snapshot.overall_load,
                "degradation cleared"
            );
        } else if level != previous_level {
            debug!(from = %previous_level, to = %level, "load level changed");
        }

        cached.state.active = active;
        cached.state.level = level;
        cached.state.last_evaluated_at = snapshot.computed_at;
        cached.snapshot = snapshot;
    }

    fn retry_after_secs(&self, overall_load: f64) -> u64 {
        // Scales down as load recovers toward the threshold.
        let hint = (overall_load - 50.0).round();
        let hint = if hint.is_finite() && hint > 0.0 {
            hint as u64
        } else {
            0
        };
        hint.max(self.config.min_retry_after_secs)
    }
}

/// The cached struct only holds plain value objects; data behind a lock
/// poisoned by a panicking reader is still the last installed snapshot.
fn read_cached(lock: &RwLock<Cached>) -> RwLockReadGuard<'_, Cached> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_cached(lock: &RwLock<Cached>) -> RwLockWriteGuard<'_, Cached> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::anyhow;

    use crate::evaluator::LoadEvaluator;
    use loadgate_core::{EvaluatorConfig, WindowConfig};
    use loadgate_metrics::MetricsRecorder;

    /// Source that always yields the same snapshot, stamped fresh.
    struct FixedSource {
        overall_load: f64,
        level: LoadLevel,
    }

    impl SnapshotSource for FixedSource {
        fn evaluate(&self) -> anyhow::Result<LoadSnapshot> {
            Ok(LoadSnapshot {
                overall_load: self.overall_load,
                load_level: self.level,
                request_rate: 10.0,
                avg_response_time_ms: 100.0,
                error_rate: 0.0,
                computed_at: now_millis(),
            })
        }
    }

    struct FailingSource;

    impl SnapshotSource for FailingSource {
        fn evaluate(&self) -> anyhow::Result<LoadSnapshot> {
            Err(anyhow!("scoring blew up"))
        }
    }

    /// Source that replays a script of results, repeating the last one.
    struct ScriptedSource {
        script: Mutex<VecDeque<anyhow::Result<LoadSnapshot>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<anyhow::Result<LoadSnapshot>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn evaluate(&self) -> anyhow::Result<LoadSnapshot> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                match script.front() {
                    Some(Ok(snap)) => Ok(snap.clone()),
                    _ => Err(anyhow!("script exhausted")),
                }
            }
        }
    }

    fn snap(overall_load: f64, level: LoadLevel, computed_at: u64) -> LoadSnapshot {
        LoadSnapshot {
            overall_load,
            load_level: level,
            request_rate: 5.0,
            avg_response_time_ms: 50.0,
            error_rate: 0.0,
            computed_at,
        }
    }

    fn immediate_config() -> DegradationConfig {
        DegradationConfig {
            refresh_interval_ms: 0,
            ..DegradationConfig::default()
        }
    }

    fn controller(source: impl SnapshotSource + 'static) -> DegradationController {
        DegradationController::new(Arc::new(source), immediate_config())
    }

    #[test]
    fn normal_load_admits_everything() {
        let controller = controller(FixedSource {
            overall_load: 20.0,
            level: LoadLevel::Normal,
        });

        assert!(!controller.should_reject("some_api_endpoint"));
        assert!(!controller.should_reject("another_endpoint"));
        assert!(!controller.is_degradation_active());
        assert_eq!(controller.counters(), (2, 0));
    }

    #[test]
    fn high_load_degrades_but_still_admits() {
        let controller = controller(FixedSource {
            overall_load: 80.0,
            level: LoadLevel::High,
        });

        assert!(!controller.should_reject("some_api_endpoint"));
        assert!(controller.is_degradation_active());
        assert_eq!(controller.health_status().status, HealthState::Degraded);
    }

    #[test]
    fn critical_load_sheds_non_essential_endpoints() {
        let controller = controller(FixedSource {
            overall_load: 95.0,
            level: LoadLevel::Critical,
        });

        assert!(controller.should_reject("some_api_endpoint"));
        assert!(!controller.should_reject("health_check"));
        assert!(!controller.should_reject("emergency_access"));

        let (admitted, rejected) = controller.counters();
        assert_eq!(admitted, 2);
        assert_eq!(rejected, 1);
    }

    #[test]
    fn unknown_endpoints_are_not_exempt() {
        let controller = controller(FixedSource {
            overall_load: 95.0,
            level: LoadLevel::Critical,
        });
        // Only explicitly listed identifiers bypass shedding.
        assert!(controller.should_reject("health_check_v2"));
        assert!(controller.should_reject(""));
    }

    #[test]
    fn rejection_carries_reason_and_retry_hint() {
        let controller = controller(FixedSource {
            overall_load: 95.0,
            level: LoadLevel::Critical,
        });

        let decision = controller.admit("some_api_endpoint");
        assert!(!decision.allowed);
        assert_eq!(decision.reason_code.as_deref(), Some(REASON_SYSTEM_OVERLOADED));
        // max(5, round(95 - 50)) = 45.
        assert_eq!(decision.retry_after_seconds, Some(45));

        let decision = controller.admit("health_check");
        assert!(decision.allowed);
        assert!(decision.reason_code.is_none());
    }

    #[test]
    fn retry_hint_never_drops_below_floor() {
        let controller = controller(FixedSource {
            overall_load: 91.0,
            level: LoadLevel::Critical,
        });
        let decision = controller.admit("some_api_endpoint");
        // round(91 - 50) = 41, still above the floor of 5.
        assert_eq!(decision.retry_after_seconds, Some(41));

        assert_eq!(controller.retry_after_secs(50.0), 5);
        assert_eq!(controller.retry_after_secs(0.0), 5);
    }

    #[test]
    fn evaluator_failure_fails_open() {
        let controller = controller(FailingSource);

        for _ in 0..10 {
            assert!(!controller.should_reject("some_api_endpoint"));
        }
        assert!(!controller.is_degradation_active());
        assert_eq!(controller.health_status().status, HealthState::Healthy);
        assert_eq!(controller.counters(), (10, 0));
    }

    #[test]
    fn failure_after_critical_keeps_last_known_good() {
        let t = now_millis() + 1_000;
        let controller = controller(ScriptedSource::new(vec![
            Ok(snap(95.0, LoadLevel::Critical, t)),
            Err(anyhow!("scoring blew up")),
        ]));

        assert!(controller.should_reject("some_api_endpoint"));
        // Subsequent evaluations fail; the critical snapshot stays.
        assert!(controller.should_reject("some_api_endpoint"));
        assert!(controller.is_degradation_active());
    }

    #[test]
    fn recovery_clears_degradation() {
        let t = now_millis() + 1_000;
        let controller = controller(ScriptedSource::new(vec![
            Ok(snap(95.0, LoadLevel::Critical, t)),
            Ok(snap(10.0, LoadLevel::Normal, t + 1)),
        ]));

        assert!(controller.should_reject("some_api_endpoint"));
        let state = controller.degradation_state();
        assert!(state.active);
        assert_eq!(state.activated_at, Some(t));

        assert!(!controller.should_reject("some_api_endpoint"));
        let state = controller.degradation_state();
        assert!(!state.active);
        assert_eq!(state.level, LoadLevel::Normal);
        assert_eq!(state.activated_at, None);
        assert!(!controller.is_degradation_active());
    }

    #[test]
    fn stale_snapshot_is_never_installed() {
        let t = now_millis() + 10_000;
        let controller = controller(ScriptedSource::new(vec![
            Ok(snap(95.0, LoadLevel::Critical, t + 1000)),
            Ok(snap(10.0, LoadLevel::Normal, t)),
        ]));

        controller.refresh();
        controller.refresh();

        // The out-of-order normal snapshot must not roll time backwards.
        let current = controller.current_metrics();
        assert_eq!(current.load_level, LoadLevel::Critical);
        assert_eq!(current.computed_at, t + 1000);
    }

    #[test]
    fn refresh_interval_bounds_staleness() {
        let t = now_millis();
        let config = DegradationConfig {
            refresh_interval_ms: 3_600_000, // Effectively never within a test.
            ..DegradationConfig::default()
        };
        let controller = DegradationController::new(
            Arc::new(ScriptedSource::new(vec![
                Ok(snap(10.0, LoadLevel::Normal, t)),
                Ok(snap(95.0, LoadLevel::Critical, t + 1)),
            ])),
            config,
        );

        // First call refreshes (nothing cached yet) and sees Normal.
        assert!(!controller.should_reject("some_api_endpoint"));
        // The critical snapshot is ready, but within the interval the
        // cached Normal one keeps being served.
        assert!(!controller.should_reject("some_api_endpoint"));
    }

    #[test]
    fn allowlist_is_injected_configuration() {
        let config = DegradationConfig {
            essential_endpoints: vec!["only_this_one".to_string()],
            refresh_interval_ms: 0,
            ..DegradationConfig::default()
        };
        let controller = DegradationController::new(
            Arc::new(FixedSource {
                overall_load: 95.0,
                level: LoadLevel::Critical,
            }),
            config,
        );

        assert!(!controller.should_reject("only_this_one"));
        // The defaults no longer apply once a list is supplied.
        assert!(controller.should_reject("health_check"));
    }

    #[test]
    fn overload_scenario_end_to_end() {
        let recorder = Arc::new(MetricsRecorder::new(&WindowConfig::default()));
        let evaluator = Arc::new(LoadEvaluator::new(
            recorder.clone(),
            EvaluatorConfig::default(),
        ));
        let controller = DegradationController::new(evaluator, immediate_config());

        for _ in 0..100 {
            recorder.record(2500.0, true);
        }

        assert!(controller.should_reject("some_api_endpoint"));
        assert!(!controller.should_reject("health_check"));

        let snapshot = controller.current_metrics();
        assert!(snapshot.overall_load >= 90.0);
        assert_eq!(snapshot.load_level, LoadLevel::Critical);
        assert!(controller.is_degradation_active());
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let controller = Arc::new(controller(FixedSource {
            overall_load: 20.0,
            level: LoadLevel::Normal,
        }));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let background = controller.clone();
        let handle = tokio::spawn(async move {
            background
                .run(Duration::from_millis(10), shutdown_rx)
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(controller.current_metrics().load_level, LoadLevel::Normal);
    }
}
