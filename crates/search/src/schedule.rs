//! Geometric cooling schedule.

/// Normalized cost regression the acceptance targets are anchored to.
const REFERENCE_DELTA: f64 = 0.01;
/// Probability of accepting that regression at the start of the search.
const P_ACCEPT_HIGH: f64 = 0.8;
/// ... and at the end.
const P_ACCEPT_LOW: f64 = 1e-4;

/// Temperature bounds and per-step decay factor.
#[derive(Debug, Clone, Copy)]
pub struct CoolingSchedule {
    pub t_max: f64,
    pub t_min: f64,
    pub alpha: f64,
}

impl CoolingSchedule {
    /// Derive the schedule so that a 1% cost regression is accepted with
    /// probability 0.8 at `t_max` and 0.0001 at `t_min`, and `t_max`
    /// decays geometrically to `t_min` over exactly `iterations` steps.
    pub fn for_iterations(iterations: usize) -> Self {
        let t_max = -REFERENCE_DELTA / P_ACCEPT_HIGH.ln();
        let t_min = -REFERENCE_DELTA / P_ACCEPT_LOW.ln();
        let alpha = ((t_min / t_max).ln() / iterations as f64).exp();
        Self {
            t_max,
            t_min,
            alpha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_reaches_t_min_after_iterations() {
        for iterations in [1usize, 10, 100, 1000] {
            let schedule = CoolingSchedule::for_iterations(iterations);
            let decayed = schedule.t_max * schedule.alpha.powi(iterations as i32);
            assert!(
                (decayed - schedule.t_min).abs() < 1e-12,
                "t_max * alpha^{iterations} = {decayed}, want {}",
                schedule.t_min
            );
        }
    }

    #[test]
    fn test_temperature_strictly_decays() {
        let schedule = CoolingSchedule::for_iterations(100);
        assert!(schedule.alpha < 1.0);
        assert!(schedule.alpha > 0.0);
        assert!(schedule.t_max > schedule.t_min);
        assert!(schedule.t_min > 0.0);
    }

    #[test]
    fn test_acceptance_targets_hold_at_bounds() {
        let schedule = CoolingSchedule::for_iterations(50);
        let accept_at = |t: f64| (-REFERENCE_DELTA / t).exp();
        assert!((accept_at(schedule.t_max) - P_ACCEPT_HIGH).abs() < 1e-12);
        assert!((accept_at(schedule.t_min) - P_ACCEPT_LOW).abs() < 1e-12);
    }
}
