//! Server-side composite status derivation.

use std::time::Duration;

use meridian_proto::{DaemonId, DaemonStatus, UnitId};

/// Derives the status a daemon reports for itself.
///
/// Strict precedence: dependency problems outrank hardware problems, which
/// outrank a stale control loop. `NotRunning` and `Unresponsive` never come
/// from here; only a caller can observe those.
#[must_use]
pub fn compute_status(
    bad_dependencies: &[DaemonId],
    bad_units: &[UnitId],
    tick_age: Duration,
    liveness_window: Duration,
) -> DaemonStatus {
    if !bad_dependencies.is_empty() {
        return DaemonStatus::DependencyError {
            daemons: bad_dependencies.to_vec(),
        };
    }
    if !bad_units.is_empty() {
        return DaemonStatus::HardwareError {
            units: bad_units.to_vec(),
        };
    }
    if tick_age > liveness_window {
        return DaemonStatus::Stale {
            age_secs: tick_age.as_secs().min(u64::from(u32::MAX)) as u32,
        };
    }
    DaemonStatus::Running
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);
    const FRESH: Duration = Duration::from_secs(1);
    const OLD: Duration = Duration::from_secs(60);

    #[test]
    fn healthy_when_nothing_is_wrong() {
        assert_eq!(compute_status(&[], &[], FRESH, WINDOW), DaemonStatus::Running);
    }

    #[test]
    fn dependency_outranks_everything_else() {
        // All three conditions at once: the dependency wins.
        let status = compute_status(&[DaemonId::Power], &[1, 2], OLD, WINDOW);
        assert_eq!(
            status,
            DaemonStatus::DependencyError {
                daemons: vec![DaemonId::Power]
            }
        );
    }

    #[test]
    fn hardware_outranks_staleness() {
        let status = compute_status(&[], &[3], OLD, WINDOW);
        assert_eq!(status, DaemonStatus::HardwareError { units: vec![3] });
    }

    #[test]
    fn stale_loop_is_reported_last() {
        let status = compute_status(&[], &[], OLD, WINDOW);
        assert_eq!(status, DaemonStatus::Stale { age_secs: 60 });
    }

    #[test]
    fn tick_age_at_the_window_boundary_is_fresh() {
        assert_eq!(
            compute_status(&[], &[], WINDOW, WINDOW),
            DaemonStatus::Running
        );
    }
}
