use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("target_availability must be in (0, 100], got {0}")]
pub struct InvalidTarget(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SloStatus {
    Healthy,
    AtRisk,
    Violated,
    Exhausted,
}

/// Point-in-time SLO status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SloReport {
    pub slo_name: String,
    pub target_availability: f64,
    pub actual_availability: f64,
    pub error_budget_remaining: f64,
    pub status: SloStatus,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_violations: usize,
    pub longest_violation_minutes: f64,
}

impl SloReport {
    pub fn is_healthy(&self) -> bool {
        self.status == SloStatus::Healthy
    }

    pub fn budget_consumed_percent(&self) -> f64 {
        (100.0 - self.error_budget_remaining).max(0.0)
    }
}

/// Service Level Objective entity, keyed by name.
#[derive(Debug, Clone)]
pub struct Slo {
    name: String,
    target_availability: f64,
    window_hours: u32,
    violations: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Slo {
    pub fn new(name: impl Into<String>, target_availability: f64, window_hours: u32) -> Result<Self, InvalidTarget> {
        if !(target_availability > 0.0 && target_availability <= 100.0) {
            return Err(InvalidTarget(target_availability.to_string()));
        }
        Ok(Self {
            name: name.into(),
            target_availability,
            window_hours,
            violations: Vec::new(),
        })
    }

    pub fn record_violation(&mut self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) {
        self.violations.push((start, end.unwrap_or_else(Utc::now)));
    }

    pub fn report(&self, now: Option<DateTime<Utc>>) -> SloReport {
        let now = now.unwrap_or_else(Utc::now);
        let window_start = now - Duration::hours(self.window_hours as i64);
        let window_minutes = (self.window_hours as f64) * 60.0;

        let mut total_violation_minutes = 0.0_f64;
        let mut longest = 0.0_f64;
        let mut violations_in_window = 0usize;

        for (start, end) in &self.violations {
            let v_start = (*start).max(window_start);
            let v_end = (*end).min(now);
            if v_start < v_end {
                let minutes = (v_end - v_start).num_milliseconds() as f64 / 60_000.0;
                total_violation_minutes += minutes;
                longest = longest.max(minutes);
                violations_in_window += 1;
            }
        }

        let actual_availability = (window_minutes - total_violation_minutes) / window_minutes * 100.0;

        let allowed_downtime = window_minutes * (1.0 - self.target_availability / 100.0);
        let remaining = (allowed_downtime - total_violation_minutes).max(0.0);
        let error_budget_remaining = if allowed_downtime > 0.0 {
            remaining / allowed_downtime * 100.0
        } else {
            100.0
        };

        let status = if error_budget_remaining <= 0.0 {
            SloStatus::Exhausted
        } else if actual_availability < self.target_availability {
            SloStatus::Violated
        } else if error_budget_remaining < 20.0 {
            SloStatus::AtRisk
        } else {
            SloStatus::Healthy
        };

        SloReport {
            slo_name: self.name.clone(),
            target_availability: self.target_availability,
            actual_availability: round2(actual_availability, 4),
            error_budget_remaining: round2(error_budget_remaining, 2),
            status,
            window_start,
            window_end: now,
            total_violations: violations_in_window,
            longest_violation_minutes: round2(longest, 2),
        }
    }
}

fn round2(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_target() {
        assert!(Slo::new("api", 0.0, 720).is_err());
        assert!(Slo::new("api", 100.1, 720).is_err());
        assert!(Slo::new("api", 99.9, 720).is_ok());
    }

    #[test]
    fn healthy_with_no_violations() {
        let slo = Slo::new("api", 99.9, 720).unwrap();
        let report = slo.report(None);
        assert!(report.is_healthy());
        assert_eq!(report.total_violations, 0);
        assert!((report.actual_availability - 100.0).abs() < 1e-9);
    }

    #[test]
    fn violation_drops_status_below_healthy() {
        let mut slo = Slo::new("api", 99.9, 1).unwrap();
        let now = Utc::now();
        slo.record_violation(now - Duration::minutes(10), Some(now));
        let report = slo.report(Some(now));
        assert_ne!(report.status, SloStatus::Healthy);
        assert_eq!(report.total_violations, 1);
    }
}
