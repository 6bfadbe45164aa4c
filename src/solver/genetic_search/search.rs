use std::time::{Duration, Instant};

use tracing::{debug, info, span, Level};

use crate::config::Config;
use crate::domain::{Cost, Individual, ProblemData};
use crate::error::Result;
use crate::evaluation::PenaltyManager;
use crate::rng::XorShift128;
use crate::solver::local_search::{LocalSearch, LocalSearchParams};
use crate::stats::{DataPoint, Statistics};
use crate::stop::StoppingCriterion;

use super::crossover::selective_route_exchange;
use super::population::{Population, PopulationParams};

/// Outer-loop knobs.
#[derive(Debug, Clone, Copy)]
pub struct GeneticSearchParams {
    pub nb_penalty_management: usize,
    pub repair_probability: usize,
    pub collect_statistics: bool,
    pub should_intensify: bool,
}

impl Default for GeneticSearchParams {
    fn default() -> Self {
        Self {
            nb_penalty_management: 47,
            repair_probability: 79,
            collect_statistics: false,
            should_intensify: true,
        }
    }
}

/// Outcome of a [`GeneticSearch::run`] call.
#[derive(Debug)]
pub struct SearchResult {
    pub best: Option<Individual>,
    pub iterations: usize,
    pub elapsed: Duration,
    pub statistics: Statistics,
}

/// The hybrid genetic search: crossover produces an offspring, local search
/// educates it (optionally boosted repair when it stays infeasible), and the
/// population absorbs the result. Penalty weights adapt to the feasibility
/// history every `nb_penalty_management` iterations.
pub struct GeneticSearch<'a> {
    data: &'a ProblemData,
    penalties: PenaltyManager,
    population: Population,
    local_search: LocalSearch,
    rng: XorShift128,
    params: GeneticSearchParams,
    /// Feasibility registers over the current penalty window, capacity and
    /// time warp tracked separately.
    load_feasible: Vec<bool>,
    tw_feasible: Vec<bool>,
}

impl<'a> GeneticSearch<'a> {
    /// Builds the full solver stack from a validated configuration.
    pub fn new(data: &'a ProblemData, config: &Config) -> Result<Self> {
        config.validate()?;

        let penalties = PenaltyManager::new(
            config.init_capacity_penalty,
            config.init_time_warp_penalty,
            config.penalty_increase,
            config.penalty_decrease,
            config.target_feasible,
            data.capacity(),
            config.repair_booster,
        )?;

        let local_search = LocalSearch::new(
            data,
            LocalSearchParams {
                weight_wait_time: config.weight_wait_time,
                weight_time_warp: config.weight_time_warp,
                nb_granular: config.nb_granular,
                post_process_path_length: config.post_process_path_length,
            },
        );

        let mut rng = XorShift128::new(config.seed);

        let population = Population::new(
            data,
            &penalties,
            &mut rng,
            PopulationParams {
                min_pop_size: config.min_pop_size,
                generation_size: config.generation_size,
                nb_elite: config.nb_elite,
                nb_close: config.nb_close,
                lb_diversity: config.lb_diversity,
                ub_diversity: config.ub_diversity,
            },
        );

        Ok(Self {
            data,
            penalties,
            population,
            local_search,
            rng,
            params: GeneticSearchParams {
                nb_penalty_management: config.nb_penalty_management,
                repair_probability: config.repair_probability,
                collect_statistics: config.collect_statistics,
                should_intensify: config.should_intensify,
            },
            load_feasible: Vec::new(),
            tw_feasible: Vec::new(),
        })
    }

    pub fn penalties(&self) -> &PenaltyManager {
        &self.penalties
    }

    fn best_cost(&self) -> Cost {
        self.population
            .best_found()
            .map_or(Cost::MAX, Individual::distance)
    }

    /// Runs generations until the stopping criterion fires.
    pub fn run(&mut self, stop: &mut dyn StoppingCriterion) -> SearchResult {
        let start = Instant::now();
        let mut statistics = Statistics::new();
        let mut iteration = 0;

        let search_span = span!(Level::INFO, "genetic_search");
        let _guard = search_span.enter();

        info!(
            clients = self.data.num_clients(),
            vehicles = self.data.num_vehicles(),
            population = self.population.size(),
            "starting search"
        );

        if self.params.collect_statistics {
            statistics.record(DataPoint {
                iteration: 0,
                elapsed_secs: 0.0,
                cost: self.best_cost(),
                num_feasible: self.population.num_feasible(),
                num_infeasible: self.population.num_infeasible(),
            });
        }

        while !stop.should_stop(self.best_cost()) {
            iteration += 1;

            let offspring = {
                let (first, second) = self.population.select(self.data, &mut self.rng);
                selective_route_exchange(
                    (first, second),
                    self.data,
                    &self.penalties,
                    &mut self.rng,
                )
            };

            let educated =
                self.local_search
                    .run(&offspring, self.data, &self.penalties, &mut self.rng, false);

            self.load_feasible.push(!educated.has_excess_capacity());
            self.tw_feasible.push(!educated.has_time_warp());

            let mut new_best = self
                .population
                .add(educated.clone(), self.data, &self.penalties);

            // An infeasible offspring sometimes deserves a second, harder
            // attempt under boosted penalties.
            if !educated.is_feasible()
                && self.rng.randint(100) < self.params.repair_probability
            {
                let repaired = {
                    let boosted = self.penalties.boost();
                    self.local_search
                        .run(&educated, self.data, &boosted, &mut self.rng, false)
                };

                if repaired.is_feasible() {
                    new_best |= self.population.add(repaired, self.data, &self.penalties);
                }
            }

            if new_best {
                if self.params.collect_statistics {
                    statistics.record(DataPoint {
                        iteration,
                        elapsed_secs: start.elapsed().as_secs_f64(),
                        cost: self.best_cost(),
                        num_feasible: self.population.num_feasible(),
                        num_infeasible: self.population.num_infeasible(),
                    });
                }

                if self.params.should_intensify {
                    self.intensify();
                }
            }

            if iteration % self.params.nb_penalty_management == 0 {
                self.manage_penalties();
            }
        }

        info!(
            iterations = iteration,
            best = self.best_cost(),
            elapsed = ?start.elapsed(),
            "search finished"
        );

        SearchResult {
            best: self.population.best_overall(&self.penalties),
            iterations: iteration,
            elapsed: start.elapsed(),
            statistics,
        }
    }

    /// Re-educates the new best with enumerative post-processing enabled.
    fn intensify(&mut self) {
        let Some(best) = self.population.best_found().cloned() else {
            return;
        };

        debug!(distance = best.distance(), "intensifying new best");

        let polished = self
            .local_search
            .run(&best, self.data, &self.penalties, &mut self.rng, true);
        self.population.add(polished, self.data, &self.penalties);
    }

    /// Updates both penalty weights from the feasibility registers of the
    /// window that just ended.
    fn manage_penalties(&mut self) {
        let fraction = |window: &[bool]| {
            if window.is_empty() {
                return 1.0;
            }
            window.iter().filter(|&&feasible| feasible).count() as f64 / window.len() as f64
        };

        self.penalties.update_capacity_penalty(fraction(&self.load_feasible));
        self.penalties.update_time_warp_penalty(fraction(&self.tw_feasible));

        self.load_feasible.clear();
        self.tw_feasible.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::fixtures::SMALL;
    use crate::domain::ProblemData;
    use crate::stop::MaxIterations;

    fn config() -> Config {
        Config {
            seed: 42,
            min_pop_size: 5,
            generation_size: 8,
            nb_penalty_management: 10,
            ..Config::default()
        }
    }

    #[test]
    fn finds_a_feasible_solution_on_small_instance() {
        let data = ProblemData::parse(SMALL).unwrap();
        let mut search = GeneticSearch::new(&data, &config()).unwrap();

        let mut stop = MaxIterations::new(40);
        let result = search.run(&mut stop);

        assert_eq!(result.iterations, 40);

        let best = result.best.expect("population is never empty");
        assert!(best.is_feasible());

        let mut seen = vec![0usize; data.num_clients() + 1];
        for route in best.routes() {
            for &client in route {
                seen[client] += 1;
            }
        }
        assert!(seen[1..].iter().all(|&count| count == 1));
    }

    #[test]
    fn identical_seeds_give_identical_runs() {
        let data = ProblemData::parse(SMALL).unwrap();

        let run = || {
            let mut search = GeneticSearch::new(&data, &config()).unwrap();
            let mut stop = MaxIterations::new(25);
            let result = search.run(&mut stop);
            result.best.map(|best| best.routes().to_vec())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn statistics_are_collected_when_enabled() {
        let data = ProblemData::parse(SMALL).unwrap();

        let config = Config {
            collect_statistics: true,
            ..config()
        };
        let mut search = GeneticSearch::new(&data, &config).unwrap();

        let mut stop = MaxIterations::new(30);
        let result = search.run(&mut stop);

        // At least the first feasible improvement is recorded.
        assert!(!result.statistics.points().is_empty());
    }
}
