use std::time::{Duration, Instant};

use crate::domain::Cost;
use crate::error::{Error, Result};

/// Polled once per generation with the best cost found so far; returning
/// true terminates the search. Implementations are O(1) and never block.
pub trait StoppingCriterion {
    fn should_stop(&mut self, best_cost: Cost) -> bool;
}

/// Stops once the wall clock runs out. The clock starts at the first poll.
#[derive(Debug)]
pub struct MaxRuntime {
    max_runtime: Duration,
    start: Option<Instant>,
}

impl MaxRuntime {
    pub fn new(max_runtime: Duration) -> Self {
        Self {
            max_runtime,
            start: None,
        }
    }
}

impl StoppingCriterion for MaxRuntime {
    fn should_stop(&mut self, _best_cost: Cost) -> bool {
        let start = self.start.get_or_insert_with(Instant::now);
        start.elapsed() > self.max_runtime
    }
}

/// Stops after a fixed number of polls.
#[derive(Debug)]
pub struct MaxIterations {
    max_iterations: usize,
    current: usize,
}

impl MaxIterations {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            current: 0,
        }
    }
}

impl StoppingCriterion for MaxIterations {
    fn should_stop(&mut self, _best_cost: Cost) -> bool {
        self.current += 1;
        self.current > self.max_iterations
    }
}

/// Stops after `max_iterations` consecutive polls without improvement of the
/// best cost.
#[derive(Debug)]
pub struct NoImprovement {
    max_iterations: usize,
    target: Cost,
    current: usize,
}

impl NoImprovement {
    pub fn new(max_iterations: usize) -> Result<Self> {
        if max_iterations == 0 {
            return Err(Error::InvalidConfiguration(
                "zero iterations is not understood".into(),
            ));
        }

        Ok(Self {
            max_iterations,
            target: Cost::MAX,
            current: 0,
        })
    }
}

impl StoppingCriterion for NoImprovement {
    fn should_stop(&mut self, best_cost: Cost) -> bool {
        if best_cost < self.target {
            self.target = best_cost;
            self.current = 0;
            return false;
        }

        self.current += 1;
        self.current >= self.max_iterations
    }
}

/// Stops on no improvement or on the wall clock, whichever comes first.
#[derive(Debug)]
pub struct TimedNoImprovement {
    no_improvement: NoImprovement,
    max_runtime: MaxRuntime,
}

impl TimedNoImprovement {
    pub fn new(max_iterations: usize, max_runtime: Duration) -> Result<Self> {
        Ok(Self {
            no_improvement: NoImprovement::new(max_iterations)?,
            max_runtime: MaxRuntime::new(max_runtime),
        })
    }
}

impl StoppingCriterion for TimedNoImprovement {
    fn should_stop(&mut self, best_cost: Cost) -> bool {
        self.no_improvement.should_stop(best_cost) || self.max_runtime.should_stop(best_cost)
    }
}
