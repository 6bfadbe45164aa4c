use std::ops::Deref;

use tracing::debug;

use crate::domain::Cost;
use crate::error::{Error, Result};

/// Adaptive weights for the two relaxed constraints.
///
/// Excess load and time warp are priced into the cost function with weights
/// that the outer loop periodically steers towards a target share of feasible
/// offspring. Weights stay within [1, 1000] so penalized costs cannot
/// overflow downstream integer arithmetic.
#[derive(Debug, Clone)]
pub struct PenaltyManager {
    capacity_penalty: Cost,
    time_warp_penalty: Cost,
    penalty_increase: f64,
    penalty_decrease: f64,
    target_feasible: f64,
    capacity: Cost,
    repair_booster: Cost,
}

impl PenaltyManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        init_capacity_penalty: Cost,
        init_time_warp_penalty: Cost,
        penalty_increase: f64,
        penalty_decrease: f64,
        target_feasible: f64,
        capacity: Cost,
        repair_booster: Cost,
    ) -> Result<Self> {
        if penalty_increase < 1.0 {
            return Err(Error::InvalidConfiguration(
                "expected penaltyIncrease >= 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&penalty_decrease) {
            return Err(Error::InvalidConfiguration(
                "expected penaltyDecrease in [0, 1]".into(),
            ));
        }

        if !(0.0..=1.0).contains(&target_feasible) {
            return Err(Error::InvalidConfiguration(
                "expected targetFeasible in [0, 1]".into(),
            ));
        }

        if repair_booster < 1 {
            return Err(Error::InvalidConfiguration(
                "expected repairBooster >= 1".into(),
            ));
        }

        Ok(Self {
            capacity_penalty: init_capacity_penalty,
            time_warp_penalty: init_time_warp_penalty,
            penalty_increase,
            penalty_decrease,
            target_feasible,
            capacity,
            repair_booster,
        })
    }

    #[inline]
    pub fn load_penalty(&self, load: Cost) -> Cost {
        (load - self.capacity).max(0) * self.capacity_penalty
    }

    #[inline]
    pub fn tw_penalty(&self, time_warp: Cost) -> Cost {
        time_warp * self.time_warp_penalty
    }

    pub fn capacity_penalty(&self) -> Cost {
        self.capacity_penalty
    }

    pub fn time_warp_penalty(&self) -> Cost {
        self.time_warp_penalty
    }

    fn compute(&self, penalty: Cost, feas_pct: f64) -> Cost {
        let diff = self.target_feasible - feas_pct;

        // Allow some margin between target and actual.
        if -0.05 < diff && diff < 0.05 {
            return penalty;
        }

        let penalty = penalty as f64;

        // +- 1 so the value cannot get stuck on the same integer, bounded to
        // [1, 1000] to avoid overflow in cost computations.
        let updated = if diff > 0.0 {
            (self.penalty_increase * penalty + 1.0).min(1000.0)
        } else {
            (self.penalty_decrease * penalty - 1.0).max(1.0)
        };

        updated as Cost
    }

    pub fn update_capacity_penalty(&mut self, feas_pct: f64) {
        self.capacity_penalty = self.compute(self.capacity_penalty, feas_pct);
        debug!(
            feas_pct,
            penalty = self.capacity_penalty,
            "updated capacity penalty"
        );
    }

    pub fn update_time_warp_penalty(&mut self, feas_pct: f64) {
        self.time_warp_penalty = self.compute(self.time_warp_penalty, feas_pct);
        debug!(
            feas_pct,
            penalty = self.time_warp_penalty,
            "updated time warp penalty"
        );
    }

    /// Temporarily multiplies both weights by the repair booster. The guard
    /// restores the exact prior weights when dropped, on every exit path.
    pub fn boost(&mut self) -> PenaltyBooster<'_> {
        let old_capacity = self.capacity_penalty;
        let old_time_warp = self.time_warp_penalty;

        self.capacity_penalty *= self.repair_booster;
        self.time_warp_penalty *= self.repair_booster;

        PenaltyBooster {
            manager: self,
            old_capacity,
            old_time_warp,
        }
    }
}

/// Scoped penalty boost; see [`PenaltyManager::boost`].
pub struct PenaltyBooster<'a> {
    manager: &'a mut PenaltyManager,
    old_capacity: Cost,
    old_time_warp: Cost,
}

impl Deref for PenaltyBooster<'_> {
    type Target = PenaltyManager;

    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl Drop for PenaltyBooster<'_> {
    fn drop(&mut self) {
        self.manager.capacity_penalty = self.old_capacity;
        self.manager.time_warp_penalty = self.old_time_warp;
    }
}
