// src/session_policy.rs
//! Evaluation-period gate for the console.
//!
//! The policy is a plain value with an explicit `start`/`stop` lifecycle; the
//! Bevy plugin drives `tick` once per frame and the UI reads the resulting
//! [`AccessStatus`]. No process-wide hooks are installed.

use bevy::prelude::*;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::ConsoleSettings;

const SECS_PER_DAY: i64 = 86_400;
/// Slack allowed on top of the check interval before a tick counts as late.
const LATE_TICK_SLACK_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicyConfig {
    pub enabled: bool,
    /// Last day of the evaluation period (inclusive, UTC).
    pub expires_on: Option<NaiveDate>,
    pub grace_period_days: i64,
    pub warning_threshold_days: i64,
    pub check_interval_secs: u64,
}

impl Default for SessionPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            expires_on: None,
            grace_period_days: 1,
            warning_threshold_days: 30,
            check_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Unrestricted,
    Active { days_left: i64 },
    Warning { days_left: i64 },
    GracePeriod { days_left: i64 },
    Expired { days_ago: i64 },
}

impl AccessStatus {
    pub fn is_locked(self) -> bool {
        matches!(self, AccessStatus::Expired { .. })
    }

    pub fn banner(self) -> Option<String> {
        match self {
            AccessStatus::Warning { days_left } => Some(format!(
                "Evaluation period ends in {} day{}.",
                days_left,
                if days_left == 1 { "" } else { "s" }
            )),
            AccessStatus::GracePeriod { days_left } => Some(format!(
                "Evaluation period has ended. The console locks in {} day{}.",
                days_left,
                if days_left == 1 { "" } else { "s" }
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAnomaly {
    /// Wall clock went backwards between two checks.
    Backwards { by_secs: i64 },
    /// A check arrived much later than scheduled (sleep, suspend, clock jump).
    LateTick { late_by_secs: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub status: AccessStatus,
    pub changed: bool,
    pub anomaly: Option<ClockAnomaly>,
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    config: SessionPolicyConfig,
    started: bool,
    last_check: Option<DateTime<Utc>>,
    status: AccessStatus,
}

impl SessionPolicy {
    pub fn new(config: SessionPolicyConfig) -> Self {
        Self {
            config,
            started: false,
            last_check: None,
            status: AccessStatus::Unrestricted,
        }
    }

    pub fn status(&self) -> AccessStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.started
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> AccessStatus {
        self.started = true;
        self.last_check = Some(now);
        self.status = self.evaluate(now);
        info!("Session policy started: {:?}", self.status);
        self.status
    }

    pub fn stop(&mut self) {
        if self.started {
            info!("Session policy stopped.");
        }
        self.started = false;
        self.last_check = None;
    }

    /// Re-evaluates once the check interval has elapsed. Returns `None` when
    /// stopped or when it is not yet time to check.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TickReport> {
        if !self.started {
            return None;
        }
        let last = self.last_check.unwrap_or(now);
        let elapsed = (now - last).num_seconds();
        let interval = self.config.check_interval_secs as i64;

        let anomaly = if elapsed < 0 {
            Some(ClockAnomaly::Backwards { by_secs: -elapsed })
        } else if elapsed < interval {
            return None;
        } else if elapsed > interval + LATE_TICK_SLACK_SECS {
            Some(ClockAnomaly::LateTick {
                late_by_secs: elapsed - interval,
            })
        } else {
            None
        };
        if let Some(anomaly) = anomaly {
            warn!("Session policy: clock anomaly detected: {:?}", anomaly);
        }

        self.last_check = Some(now);
        let status = self.evaluate(now);
        let changed = status != self.status;
        if changed {
            info!("Session policy status changed: {:?} -> {:?}", self.status, status);
        }
        self.status = status;
        Some(TickReport {
            status,
            changed,
            anomaly,
        })
    }

    pub fn evaluate(&self, now: DateTime<Utc>) -> AccessStatus {
        if !self.config.enabled {
            return AccessStatus::Unrestricted;
        }
        let Some(expiry) = self
            .config
            .expires_on
            .and_then(|day| day.and_hms_opt(23, 59, 59))
            .map(|end| end.and_utc())
        else {
            return AccessStatus::Unrestricted;
        };

        if now <= expiry {
            let days_left = ceil_days(expiry - now);
            return if days_left <= self.config.warning_threshold_days {
                AccessStatus::Warning { days_left }
            } else {
                AccessStatus::Active { days_left }
            };
        }
        let grace_end = expiry + Duration::days(self.config.grace_period_days.max(0));
        if now <= grace_end {
            AccessStatus::GracePeriod {
                days_left: ceil_days(grace_end - now),
            }
        } else {
            AccessStatus::Expired {
                days_ago: ceil_days(now - expiry),
            }
        }
    }
}

fn ceil_days(span: Duration) -> i64 {
    let secs = span.num_seconds().max(0);
    (secs + SECS_PER_DAY - 1) / SECS_PER_DAY
}

/// Bevy wrapper around the policy.
#[derive(Resource, Debug)]
pub struct AccessGate {
    pub policy: SessionPolicy,
}

pub struct SessionPolicyPlugin;

impl Plugin for SessionPolicyPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, start_session_policy)
            .add_systems(Update, (tick_session_policy, stop_session_policy_on_exit));
    }
}

fn start_session_policy(mut commands: Commands, settings: Res<ConsoleSettings>) {
    let mut policy = SessionPolicy::new(settings.session_policy.clone());
    policy.start(Utc::now());
    commands.insert_resource(AccessGate { policy });
}

fn tick_session_policy(gate: Option<ResMut<AccessGate>>) {
    if let Some(mut gate) = gate {
        gate.policy.tick(Utc::now());
    }
}

fn stop_session_policy_on_exit(mut exits: EventReader<AppExit>, gate: Option<ResMut<AccessGate>>) {
    if exits.read().next().is_some() {
        if let Some(mut gate) = gate {
            gate.policy.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy(expires: (i32, u32, u32)) -> SessionPolicy {
        SessionPolicy::new(SessionPolicyConfig {
            enabled: true,
            expires_on: NaiveDate::from_ymd_opt(expires.0, expires.1, expires.2),
            ..Default::default()
        })
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn disabled_policy_is_unrestricted() {
        let p = SessionPolicy::new(SessionPolicyConfig::default());
        assert_eq!(p.evaluate(at(2030, 1, 1, 0)), AccessStatus::Unrestricted);
    }

    #[test]
    fn status_across_the_expiry_boundary() {
        let p = policy((2026, 6, 30));
        assert_eq!(p.evaluate(at(2026, 1, 1, 12)), AccessStatus::Active { days_left: 181 });
        assert_eq!(p.evaluate(at(2026, 6, 10, 12)), AccessStatus::Warning { days_left: 21 });
        assert_eq!(p.evaluate(at(2026, 6, 30, 23)), AccessStatus::Warning { days_left: 1 });
        assert_eq!(p.evaluate(at(2026, 7, 1, 12)), AccessStatus::GracePeriod { days_left: 1 });
        assert_eq!(p.evaluate(at(2026, 7, 3, 0)), AccessStatus::Expired { days_ago: 3 });
        assert!(p.evaluate(at(2026, 7, 3, 0)).is_locked());
    }

    #[test]
    fn tick_waits_for_the_interval() {
        let mut p = policy((2026, 6, 30));
        let t0 = at(2026, 6, 1, 0);
        assert_eq!(p.tick(t0), None, "stopped policy never ticks");

        p.start(t0);
        assert_eq!(p.tick(t0 + Duration::seconds(30)), None);
        let report = p.tick(t0 + Duration::seconds(60)).unwrap();
        assert_eq!(report.anomaly, None);
        assert!(!report.changed);

        p.stop();
        assert!(!p.is_running());
        assert_eq!(p.tick(t0 + Duration::seconds(600)), None);
    }

    #[test]
    fn clock_anomalies_are_reported() {
        let mut p = policy((2026, 6, 30));
        let t0 = at(2026, 6, 1, 0);
        p.start(t0);

        let late = p.tick(t0 + Duration::seconds(300)).unwrap();
        assert_eq!(late.anomaly, Some(ClockAnomaly::LateTick { late_by_secs: 240 }));

        let back = p.tick(t0).unwrap();
        assert_eq!(back.anomaly, Some(ClockAnomaly::Backwards { by_secs: 300 }));
    }

    #[test]
    fn tick_reports_expiry_transition() {
        let mut p = policy((2026, 6, 30));
        p.start(at(2026, 7, 1, 23));
        assert!(matches!(p.status(), AccessStatus::GracePeriod { .. }));
        let report = p.tick(at(2026, 7, 1, 23) + Duration::seconds(3_600)).unwrap();
        assert!(report.changed);
        assert!(report.status.is_locked());
    }
}
