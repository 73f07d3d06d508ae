//! Scaling advisor — turns a load trend into a capacity recommendation.
//!
//! Each advisory cycle evaluates the snapshot source, appends the
//! result to a bounded trend window, and recommends at most one action.
//! Scale-up fires whenever the system is degraded and the trend is not
//! improving; scale-down requires a fully normal window, a
//! non-increasing trend, and an elapsed cooldown since the last emitted
//! action. Flapping in one direction is tolerated, in the other it is
//! not: under-provisioning costs more than a spare replica.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use loadgate_core::{AdvisorConfig, LoadLevel, ScaleAction, ScalingRecommendation};
use loadgate_control::SnapshotSource;

struct Observation {
    overall_load: f64,
    level: LoadLevel,
}

struct Trend {
    history: VecDeque<Observation>,
    /// When the last non-`None` recommendation was emitted (unix ms).
    last_action_at: Option<u64>,
    latest: ScalingRecommendation,
}

/// Produces scaling recommendations from the recent load trend.
pub struct ScalingAdvisor {
    source: Arc<dyn SnapshotSource>,
    config: AdvisorConfig,
    trend: Mutex<Trend>,
}

impl ScalingAdvisor {
    /// Create an advisor over a snapshot source. `config` must have
    /// passed `GateConfig::validate`.
    pub fn new(source: Arc<dyn SnapshotSource>, config: AdvisorConfig) -> Self {
        Self {
            source,
            config,
            trend: Mutex::new(Trend {
                history: VecDeque::new(),
                last_action_at: None,
                latest: ScalingRecommendation::none("no advisory cycle has run yet", 0),
            }),
        }
    }

    /// The most recently generated recommendation.
    pub fn latest(&self) -> ScalingRecommendation {
        lock_trend(&self.trend).latest.clone()
    }

    /// Run one advisory cycle against the wall clock.
    pub fn recommend(&self) -> ScalingRecommendation {
        self.recommend_at(now_millis())
    }

    /// Clock-explicit advisory cycle, for deterministic tests.
    pub fn recommend_at(&self, now_ms: u64) -> ScalingRecommendation {
        let recommendation = match self.source.evaluate() {
            Ok(snapshot) => self.advise(now_ms, snapshot.overall_load, snapshot.load_level),
            Err(e) => {
                // A failed evaluation contributes no observation; the
                // trend window keeps only real data points.
                warn!(error = %e, "advisory cycle skipped, evaluation failed");
                ScalingRecommendation::none(format!("load evaluation failed: {e}"), now_ms)
            }
        };

        lock_trend(&self.trend).latest = recommendation.clone();
        recommendation
    }

    /// Run the periodic advisory loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            "scaling advisor loop started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let rec = self.recommend();
                    match rec.action {
                        ScaleAction::None => {
                            debug!(reason = %rec.reason, "no scaling action");
                        }
                        action => {
                            info!(
                                action = %action,
                                confidence = rec.confidence,
                                reason = %rec.reason,
                                "scaling recommendation"
                            );
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaling advisor shutting down");
                    break;
                }
            }
        }
    }

    fn advise(&self, now_ms: u64, overall_load: f64, level: LoadLevel) -> ScalingRecommendation {
        let mut trend = lock_trend(&self.trend);

        trend.history.push_back(Observation {
            overall_load,
            level,
        });
        while trend.history.len() > self.config.history_len {
            trend.history.pop_front();
        }

        if trend.history.len() < self.config.history_len {
            return ScalingRecommendation::none(
                format!(
                    "collecting trend history ({} of {})",
                    trend.history.len(),
                    self.config.history_len
                ),
                now_ms,
            );
        }

        let loads: Vec<f64> = trend.history.iter().map(|o| o.overall_load).collect();
        let slope = least_squares_slope(&loads);
        let confidence = trend_confidence(&loads, slope);

        let newest_degraded = level.is_degraded();
        let all_normal = trend.history.iter().all(|o| o.level == LoadLevel::Normal);

        if newest_degraded && slope >= 0.0 {
            trend.last_action_at = Some(now_ms);
            return ScalingRecommendation {
                action: ScaleAction::ScaleUp,
                reason: format!(
                    "load {overall_load:.1} at level {level} and not improving (slope {slope:+.2})"
                ),
                confidence,
                generated_at: now_ms,
            };
        }

        if all_normal && slope <= 0.0 {
            let cooldown_ms = self.config.cooldown_secs * 1000;
            let cooled = match trend.last_action_at {
                Some(at) => now_ms.saturating_sub(at) >= cooldown_ms,
                None => true,
            };
            if cooled {
                trend.last_action_at = Some(now_ms);
                return ScalingRecommendation {
                    action: ScaleAction::ScaleDown,
                    reason: format!(
                        "sustained normal load {overall_load:.1} with non-rising trend (slope {slope:+.2})"
                    ),
                    confidence,
                    generated_at: now_ms,
                };
            }
            return ScalingRecommendation::none(
                format!(
                    "scale-down deferred, cooldown of {}s not elapsed",
                    self.config.cooldown_secs
                ),
                now_ms,
            );
        }

        ScalingRecommendation::none(
            format!("load {overall_load:.1} at level {level}, trend inconclusive"),
            now_ms,
        )
    }
}

/// Least-squares slope of the series over its indices, in load points
/// per observation.
fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Fraction of consecutive deltas that agree with the slope's
/// direction. A flat series agrees with a flat slope.
fn trend_confidence(values: &[f64], slope: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total = values.len() - 1;
    let agreeing = values
        .windows(2)
        .filter(|pair| {
            let delta = pair[1] - pair[0];
            if slope == 0.0 {
                delta == 0.0
            } else {
                delta * slope > 0.0 || delta == 0.0
            }
        })
        .count();
    agreeing as f64 / total as f64
}

/// Trend data is plain values; whatever the last holder wrote is intact.
fn lock_trend(lock: &Mutex<Trend>) -> MutexGuard<'_, Trend> {
    match lock.lock() {
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

    use anyhow::anyhow;

    use loadgate_core::{LevelThresholds, LoadSnapshot};

    const T0: u64 = 1_700_000_000_000;

    /// Source replaying a fixed sequence of overall_load values,
    /// classifying each with the default thresholds.
    struct SeqSource {
        loads: Mutex<Vec<f64>>,
    }

    impl SeqSource {
        fn new(loads: &[f64]) -> Self {
            let mut reversed: Vec<f64> = loads.to_vec();
            reversed.reverse();
            Self {
                loads: Mutex::new(reversed),
            }
        }
    }

    impl SnapshotSource for SeqSource {
        fn evaluate(&self) -> anyhow::Result<LoadSnapshot> {
            let mut loads = self.loads.lock().unwrap();
            let load = loads.pop().ok_or_else(|| anyhow!("sequence exhausted"))?;
            let thresholds = LevelThresholds::default();
            Ok(LoadSnapshot {
                overall_load: load,
                load_level: thresholds.classify(load),
                request_rate: 10.0,
                avg_response_time_ms: 100.0,
                error_rate: 0.0,
                computed_at: T0,
            })
        }
    }

    struct FailingSource;

    impl SnapshotSource for FailingSource {
        fn evaluate(&self) -> anyhow::Result<LoadSnapshot> {
            Err(anyhow!("recorder unavailable"))
        }
    }

    fn advisor(loads: &[f64], cooldown_secs: u64) -> ScalingAdvisor {
        let config = AdvisorConfig {
            history_len: 5,
            cooldown_secs,
        };
        ScalingAdvisor::new(Arc::new(SeqSource::new(loads)), config)
    }

    /// Drive `n` cycles 30 s apart and return the last recommendation.
    fn drive(advisor: &ScalingAdvisor, n: usize) -> ScalingRecommendation {
        let mut last = ScalingRecommendation::none("unused", 0);
        for i in 0..n {
            last = advisor.recommend_at(T0 + i as u64 * 30_000);
        }
        last
    }

    #[test]
    fn no_action_until_history_fills() {
        let advisor = advisor(&[95.0, 95.0, 95.0, 95.0, 95.0], 0);
        for i in 0..4 {
            let rec = advisor.recommend_at(T0 + i * 30_000);
            assert_eq!(rec.action, ScaleAction::None);
            assert!(rec.reason.contains("collecting"));
        }
    }

    #[test]
    fn rising_degraded_load_scales_up() {
        let advisor = advisor(&[70.0, 78.0, 85.0, 91.0, 96.0], 0);
        let rec = drive(&advisor, 5);
        assert_eq!(rec.action, ScaleAction::ScaleUp);
        assert!(rec.confidence > 0.9);
    }

    #[test]
    fn flat_critical_load_scales_up() {
        let advisor = advisor(&[95.0, 95.0, 95.0, 95.0, 95.0], 300);
        let rec = drive(&advisor, 5);
        // Not improving counts as not-improving even with zero slope,
        // and scale-up is never cooldown-gated.
        assert_eq!(rec.action, ScaleAction::ScaleUp);
        assert_eq!(rec.confidence, 1.0);
    }

    #[test]
    fn degraded_but_falling_load_waits() {
        let advisor = advisor(&[98.0, 95.0, 90.0, 85.0, 80.0], 0);
        let rec = drive(&advisor, 5);
        // Still High at the newest point but the trend is clearly down;
        // capacity is already catching up.
        assert_eq!(rec.action, ScaleAction::None);
        assert!(rec.reason.contains("inconclusive"));
    }

    #[test]
    fn sustained_normal_load_scales_down() {
        let advisor = advisor(&[30.0, 25.0, 22.0, 20.0, 18.0], 0);
        let rec = drive(&advisor, 5);
        assert_eq!(rec.action, ScaleAction::ScaleDown);
        assert!(rec.confidence > 0.9);
    }

    #[test]
    fn scale_down_respects_cooldown() {
        let loads = [
            30.0, 25.0, 22.0, 20.0, 18.0, // first window → scale down
            17.0, 16.0, 15.0, 14.0, 13.0, // still falling
        ];
        let advisor = advisor(&loads, 300);

        let first = drive(&advisor, 5);
        assert_eq!(first.action, ScaleAction::ScaleDown);

        // 30 s later the trend still points down, but the cooldown has
        // not elapsed.
        let second = advisor.recommend_at(T0 + 5 * 30_000);
        assert_eq!(second.action, ScaleAction::None);
        assert!(second.reason.contains("cooldown"));

        // Once the cooldown passes, the next all-normal window fires.
        for i in 6..9 {
            advisor.recommend_at(T0 + i * 30_000);
        }
        let third = advisor.recommend_at(T0 + 5 * 30_000 + 301_000);
        assert_eq!(third.action, ScaleAction::ScaleDown);
    }

    #[test]
    fn scale_up_resets_scale_down_cooldown() {
        let loads = [
            70.0, 78.0, 85.0, 91.0, 96.0, // rising degraded → scale up
            40.0, 30.0, 20.0, 15.0, 10.0, // sharp recovery
        ];
        let advisor = advisor(&loads, 300);

        let up = drive(&advisor, 5);
        assert_eq!(up.action, ScaleAction::ScaleUp);

        // Recovery follows immediately, but the window only becomes
        // all-normal on the 10th observation, 150 s after the scale-up.
        // The cooldown started at the scale-up, so no scale-down yet.
        let mut last = ScalingRecommendation::none("unused", 0);
        for i in 5..10 {
            last = advisor.recommend_at(T0 + i * 30_000);
        }
        assert_eq!(last.action, ScaleAction::None);
        assert!(last.reason.contains("cooldown"));
    }

    #[test]
    fn normal_but_rising_load_holds() {
        let advisor = advisor(&[10.0, 15.0, 22.0, 30.0, 40.0], 0);
        let rec = drive(&advisor, 5);
        assert_eq!(rec.action, ScaleAction::None);
    }

    #[test]
    fn mixed_window_is_inconclusive() {
        // Elevated points in the window, newest back to normal.
        let advisor = advisor(&[60.0, 55.0, 45.0, 40.0, 35.0], 0);
        let rec = drive(&advisor, 5);
        assert_eq!(rec.action, ScaleAction::None);
    }

    #[test]
    fn evaluation_failure_yields_none_with_reason() {
        let config = AdvisorConfig {
            history_len: 5,
            cooldown_secs: 0,
        };
        let advisor = ScalingAdvisor::new(Arc::new(FailingSource), config);

        let rec = advisor.recommend_at(T0);
        assert_eq!(rec.action, ScaleAction::None);
        assert!(rec.reason.contains("load evaluation failed"));
        assert_eq!(rec.confidence, 0.0);
    }

    #[test]
    fn failed_cycles_do_not_pollute_history() {
        // Five good observations interleaved with failures must still
        // produce a full window and a recommendation.
        let loads = [95.0, 95.0, 95.0, 95.0, 95.0];
        let seq = SeqSource::new(&loads);
        let config = AdvisorConfig {
            history_len: 5,
            cooldown_secs: 0,
        };
        let advisor = ScalingAdvisor::new(Arc::new(seq), config);

        let mut last = ScalingRecommendation::none("unused", 0);
        for i in 0..7 {
            last = advisor.recommend_at(T0 + i * 30_000);
        }
        // Cycles 6 and 7 hit the exhausted sequence and fail, so the
        // latest recommendation reports the failure without discarding
        // the scale-up decided on cycle 5.
        assert!(last.reason.contains("load evaluation failed"));
        assert_eq!(advisor.latest().action, ScaleAction::None);

        let rec_at_5 = {
            let advisor = ScalingAdvisor::new(
                Arc::new(SeqSource::new(&loads)),
                AdvisorConfig {
                    history_len: 5,
                    cooldown_secs: 0,
                },
            );
            drive(&advisor, 5)
        };
        assert_eq!(rec_at_5.action, ScaleAction::ScaleUp);
    }

    #[test]
    fn latest_tracks_most_recent_cycle() {
        let advisor = advisor(&[30.0, 25.0, 22.0, 20.0, 18.0], 0);
        assert_eq!(advisor.latest().action, ScaleAction::None);

        let rec = drive(&advisor, 5);
        assert_eq!(advisor.latest(), rec);
    }

    #[test]
    fn slope_of_linear_series_is_exact() {
        assert!((least_squares_slope(&[0.0, 2.0, 4.0, 6.0, 8.0]) - 2.0).abs() < 1e-9);
        assert!((least_squares_slope(&[10.0, 8.0, 6.0, 4.0, 2.0]) + 2.0).abs() < 1e-9);
        assert_eq!(least_squares_slope(&[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(least_squares_slope(&[5.0]), 0.0);
    }

    #[test]
    fn confidence_counts_agreeing_deltas() {
        // Monotonic rise: every delta agrees.
        assert_eq!(trend_confidence(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.0), 1.0);
        // One dip out of four deltas.
        assert_eq!(trend_confidence(&[1.0, 2.0, 1.5, 3.0, 4.0], 1.0), 0.75);
        // Flat series with flat slope.
        assert_eq!(trend_confidence(&[5.0, 5.0, 5.0], 0.0), 1.0);
    }
}
