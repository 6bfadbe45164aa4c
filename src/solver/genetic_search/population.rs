use tracing::{debug, info};

use crate::domain::{Cost, Individual, ProblemData};
use crate::evaluation::{broken_pairs_distance, PenaltyManager};
use crate::rng::XorShift128;

/// Sizing and selection knobs of the population.
#[derive(Debug, Clone, Copy)]
pub struct PopulationParams {
    pub min_pop_size: usize,
    pub generation_size: usize,
    pub nb_elite: usize,
    pub nb_close: usize,
    pub lb_diversity: f64,
    pub ub_diversity: f64,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            min_pop_size: 25,
            generation_size: 40,
            nb_elite: 4,
            nb_close: 5,
            lb_diversity: 0.1,
            ub_diversity: 0.5,
        }
    }
}

/// A population member with its biased fitness and a distance-sorted list of
/// the other members of its sub-population.
struct Wrapper {
    id: u64,
    indiv: Individual,
    fitness: f64,
    proximity: Vec<(f64, u64)>,
}

impl Wrapper {
    /// Mean broken-pairs distance to the `nb_close` closest members.
    fn avg_distance_closest(&self, nb_close: usize) -> f64 {
        if self.proximity.is_empty() {
            return 0.0;
        }

        let take = nb_close.min(self.proximity.len());
        let sum: f64 = self.proximity[..take].iter().map(|&(dist, _)| dist).sum();
        sum / take as f64
    }
}

/// Feasible and infeasible sub-populations with biased-fitness survivor
/// selection and binary-tournament parent selection.
pub struct Population {
    feasible: Vec<Wrapper>,
    infeasible: Vec<Wrapper>,
    params: PopulationParams,
    next_id: u64,
    best: Option<Individual>,
}

impl Population {
    /// Seeds the population with `min_pop_size` random individuals.
    pub fn new(
        data: &ProblemData,
        penalties: &PenaltyManager,
        rng: &mut XorShift128,
        params: PopulationParams,
    ) -> Self {
        let mut population = Self {
            feasible: Vec::new(),
            infeasible: Vec::new(),
            params,
            next_id: 0,
            best: None,
        };

        for _ in 0..params.min_pop_size {
            population.add(Individual::new_random(data, rng), data, penalties);
        }

        population
    }

    /// Inserts an individual into its sub-population; returns true when it
    /// became the new best feasible solution.
    pub fn add(&mut self, indiv: Individual, data: &ProblemData, penalties: &PenaltyManager) -> bool {
        let feasible = indiv.is_feasible();

        let id = self.next_id;
        self.next_id += 1;

        let sub_pop = if feasible {
            &mut self.feasible
        } else {
            &mut self.infeasible
        };

        // Register the broken-pairs distance to every current member, both
        // ways, keeping the lists sorted.
        let mut proximity = Vec::with_capacity(sub_pop.len());
        for other in sub_pop.iter_mut() {
            let dist = broken_pairs_distance(data, &indiv, &other.indiv);

            let at = proximity.partition_point(|&(d, _): &(f64, u64)| d < dist);
            proximity.insert(at, (dist, other.id));

            let at = other.proximity.partition_point(|&(d, _)| d < dist);
            other.proximity.insert(at, (dist, id));
        }

        sub_pop.push(Wrapper {
            id,
            indiv: indiv.clone(),
            fitness: 0.0,
            proximity,
        });

        Self::update_biased_fitness(sub_pop, &self.params, penalties);

        if sub_pop.len() > self.params.min_pop_size + self.params.generation_size {
            Self::purge(sub_pop, &self.params, penalties);
        }

        // A feasible solution's penalized cost is just its distance, so best
        // tracking is independent of the current penalty weights.
        let mut new_best = false;
        if feasible {
            if self.best.as_ref().map_or(true, |best| indiv.distance() < best.distance()) {
                info!(distance = indiv.distance(), "new best solution");
                self.best = Some(indiv);
                new_best = true;
            }
        }

        new_best
    }

    /// Sorts the sub-population by cost and recomputes every member's biased
    /// fitness from its cost rank and diversity rank.
    fn update_biased_fitness(
        sub_pop: &mut [Wrapper],
        params: &PopulationParams,
        penalties: &PenaltyManager,
    ) {
        sub_pop.sort_by_key(|wrapper| wrapper.indiv.cost(penalties));

        // Diversity contribution, most diverse first.
        let mut diversity: Vec<(f64, usize)> = sub_pop
            .iter()
            .enumerate()
            .map(|(cost_rank, wrapper)| {
                (wrapper.avg_distance_closest(params.nb_close), cost_rank)
            })
            .collect();

        diversity.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));

        let pop_size = sub_pop.len() as f64;
        let div_weight = 1.0 - params.nb_elite.min(sub_pop.len()) as f64 / pop_size;

        for (div_rank, &(_, cost_rank)) in diversity.iter().enumerate() {
            sub_pop[cost_rank].fitness = (cost_rank as f64 + div_weight * div_rank as f64) / pop_size;
        }
    }

    /// Survivor selection: duplicates go first, then the worst by biased
    /// fitness, until the sub-population is back at its minimum size.
    fn purge(sub_pop: &mut Vec<Wrapper>, params: &PopulationParams, penalties: &PenaltyManager) {
        let remove = |sub_pop: &mut Vec<Wrapper>, idx: usize| {
            let id = sub_pop[idx].id;
            sub_pop.remove(idx);

            for wrapper in sub_pop.iter_mut() {
                if let Some(at) = wrapper.proximity.iter().position(|&(_, other)| other == id) {
                    wrapper.proximity.remove(at);
                }
            }
        };

        while sub_pop.len() > params.min_pop_size {
            // A proximity of zero to the closest member means an exact
            // duplicate in route structure.
            let duplicate = sub_pop
                .iter()
                .position(|wrapper| matches!(wrapper.proximity.first(), Some(&(dist, _)) if dist == 0.0));

            match duplicate {
                Some(idx) => remove(sub_pop, idx),
                None => break,
            }
        }

        while sub_pop.len() > params.min_pop_size {
            Self::update_biased_fitness(sub_pop, params, penalties);

            let worst = sub_pop
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.fitness.total_cmp(&b.1.fitness))
                .map(|(idx, _)| idx);

            match worst {
                Some(idx) => remove(sub_pop, idx),
                None => break,
            }
        }

        debug!(size = sub_pop.len(), "purged sub-population");
    }

    fn tournament(&self, rng: &mut XorShift128) -> &Wrapper {
        let pick = |idx: usize| {
            if idx < self.feasible.len() {
                &self.feasible[idx]
            } else {
                &self.infeasible[idx - self.feasible.len()]
            }
        };

        let first = pick(rng.randint(self.size()));
        let second = pick(rng.randint(self.size()));

        if first.fitness < second.fitness {
            first
        } else {
            second
        }
    }

    /// Two parents by binary tournament; the second is re-drawn a bounded
    /// number of times until the pair's diversity falls inside the band.
    pub fn select(
        &self,
        data: &ProblemData,
        rng: &mut XorShift128,
    ) -> (&Individual, &Individual) {
        let first = self.tournament(rng);
        let mut second = self.tournament(rng);

        let mut diversity = broken_pairs_distance(data, &first.indiv, &second.indiv);

        let mut tries = 1;
        while (diversity < self.params.lb_diversity || diversity > self.params.ub_diversity)
            && tries < 10
        {
            second = self.tournament(rng);
            diversity = broken_pairs_distance(data, &first.indiv, &second.indiv);
            tries += 1;
        }

        (&first.indiv, &second.indiv)
    }

    pub fn size(&self) -> usize {
        self.num_feasible() + self.num_infeasible()
    }

    pub fn num_feasible(&self) -> usize {
        self.feasible.len()
    }

    pub fn num_infeasible(&self) -> usize {
        self.infeasible.len()
    }

    pub fn best_found(&self) -> Option<&Individual> {
        self.best.as_ref()
    }

    /// The best individual overall: the best feasible solution if one was
    /// ever found, otherwise the cheapest current member.
    pub fn best_overall(&self, penalties: &PenaltyManager) -> Option<Individual> {
        if let Some(best) = &self.best {
            return Some(best.clone());
        }

        self.feasible
            .iter()
            .chain(self.infeasible.iter())
            .min_by_key(|wrapper| wrapper.indiv.cost(penalties))
            .map(|wrapper| wrapper.indiv.clone())
    }
}
