use std::io::Write;
use std::path::Path;

use rand::seq::SliceRandom;

use crate::domain::{Cost, ProblemData};
use crate::error::{Error, Result};
use crate::evaluation::PenaltyManager;
use crate::rng::XorShift128;

/// A complete (possibly infeasible) solution: one client sequence per
/// vehicle, with empty routes padded at the end.
///
/// The aggregate statistics are recomputed from scratch by [`evaluate`]
/// whenever the routes change; the per-client `(pred, succ)` table feeds the
/// broken-pairs diversity measure.
///
/// [`evaluate`]: Individual::evaluate
#[derive(Debug, Clone)]
pub struct Individual {
    routes: Vec<Vec<usize>>,
    neighbours: Vec<(usize, usize)>,
    nb_routes: usize,
    distance: Cost,
    capacity_excess: Cost,
    time_warp: Cost,
}

impl Individual {
    /// Builds a random individual: clients are shuffled and spread evenly
    /// over the fleet.
    pub fn new_random(data: &ProblemData, rng: &mut XorShift128) -> Self {
        let nb_clients = data.num_clients();
        let nb_vehicles = data.num_vehicles();

        let mut clients: Vec<usize> = (1..=nb_clients).collect();
        clients.shuffle(rng);

        // Clients per vehicle, adjusted upward when the division of clients
        // over vehicles is not perfect.
        let per_vehicle = (nb_clients / nb_vehicles).max(1);
        let per_route = per_vehicle + usize::from(nb_clients % nb_vehicles != 0);

        let mut routes = vec![Vec::new(); nb_vehicles];
        for (idx, client) in clients.into_iter().enumerate() {
            routes[idx / per_route].push(client);
        }

        let mut indiv = Self {
            routes,
            neighbours: vec![(0, 0); nb_clients + 1],
            nb_routes: 0,
            distance: 0,
            capacity_excess: 0,
            time_warp: 0,
        };

        indiv.make_neighbours();
        indiv.evaluate(data);
        indiv
    }

    /// Builds an individual from explicit route sequences. Non-empty routes
    /// are stable-sorted in front of empty ones.
    pub fn new(data: &ProblemData, mut routes: Vec<Vec<usize>>) -> Result<Self> {
        if routes.len() != data.num_vehicles() {
            return Err(Error::InvalidArgument(
                "number of routes does not match number of vehicles".into(),
            ));
        }

        routes.sort_by_key(Vec::is_empty);

        let mut indiv = Self {
            routes,
            neighbours: vec![(0, 0); data.num_clients() + 1],
            nb_routes: 0,
            distance: 0,
            capacity_excess: 0,
            time_warp: 0,
        };

        indiv.make_neighbours();
        indiv.evaluate(data);
        Ok(indiv)
    }

    fn make_neighbours(&mut self) {
        self.neighbours[0] = (0, 0); // depot neighbours have no meaning

        for route in &self.routes {
            for (idx, &client) in route.iter().enumerate() {
                let pred = if idx == 0 { 0 } else { route[idx - 1] };
                let succ = if idx == route.len() - 1 {
                    0
                } else {
                    route[idx + 1]
                };
                self.neighbours[client] = (pred, succ);
            }
        }
    }

    /// Recomputes distance, capacity excess, and time warp from scratch by
    /// simulating each route's schedule. A route departs no earlier than the
    /// largest release time among its clients.
    pub fn evaluate(&mut self, data: &ProblemData) {
        self.nb_routes = 0;
        self.distance = 0;
        self.capacity_excess = 0;
        self.time_warp = 0;

        for route in &self.routes {
            if route.is_empty() {
                // First empty route; all subsequent routes are empty as well.
                break;
            }

            self.nb_routes += 1;

            let last_release = route
                .iter()
                .map(|&client| data.client(client).release)
                .max()
                .unwrap_or(0);

            let first = data.client(route[0]);

            let mut r_dist = data.dist(0, route[0]);
            let mut r_time_warp = 0;
            let mut load = first.demand;
            let mut time = last_release + r_dist;

            if time < first.tw_early {
                time = first.tw_early;
            }

            if time > first.tw_late {
                r_time_warp += time - first.tw_late;
                time = first.tw_late;
            }

            for idx in 1..route.len() {
                let prev = data.client(route[idx - 1]);
                let curr = data.client(route[idx]);

                r_dist += data.dist(route[idx - 1], route[idx]);
                load += curr.demand;
                time += prev.serv_dur + data.dist(route[idx - 1], route[idx]);

                if time < curr.tw_early {
                    time = curr.tw_early; // wait for the window to open
                }

                if time > curr.tw_late {
                    r_time_warp += time - curr.tw_late;
                    time = curr.tw_late;
                }
            }

            let last_idx = route[route.len() - 1];
            let last = data.client(last_idx);

            r_dist += data.dist(last_idx, 0);
            time += last.serv_dur + data.dist(last_idx, 0);

            // Only the end of the depot's window matters for the return leg.
            r_time_warp += (time - data.depot().tw_late).max(0);

            self.distance += r_dist;
            self.time_warp += r_time_warp;
            self.capacity_excess += (load - data.capacity()).max(0);
        }
    }

    /// Penalized cost under the given penalty weights.
    pub fn cost(&self, penalties: &PenaltyManager) -> Cost {
        self.distance
            + penalties.capacity_penalty() * self.capacity_excess
            + penalties.tw_penalty(self.time_warp)
    }

    pub fn is_feasible(&self) -> bool {
        !self.has_excess_capacity() && !self.has_time_warp()
    }

    pub fn has_excess_capacity(&self) -> bool {
        self.capacity_excess > 0
    }

    pub fn has_time_warp(&self) -> bool {
        self.time_warp > 0
    }

    pub fn routes(&self) -> &[Vec<usize>] {
        &self.routes
    }

    pub fn num_routes(&self) -> usize {
        self.nb_routes
    }

    pub fn neighbours(&self) -> &[(usize, usize)] {
        &self.neighbours
    }

    pub fn distance(&self) -> Cost {
        self.distance
    }

    pub fn capacity_excess(&self) -> Cost {
        self.capacity_excess
    }

    pub fn time_warp(&self) -> Cost {
        self.time_warp
    }

    /// Writes the solution file: one line per non-empty route, then the
    /// penalized cost and the elapsed wall-clock seconds.
    pub fn write_to(
        &self,
        path: impl AsRef<Path>,
        penalties: &PenaltyManager,
        elapsed_secs: f64,
    ) -> Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);

        for (r_idx, route) in self.routes.iter().take(self.nb_routes).enumerate() {
            write!(out, "Route #{}:", r_idx + 1)?;
            for client in route {
                write!(out, " {client}")?;
            }
            writeln!(out)?;
        }

        writeln!(out, "Cost {}", self.cost(penalties))?;
        writeln!(out, "Time {elapsed_secs}")?;

        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::fixtures::SMALL;
    use crate::domain::{Client, Matrix};

    fn penalties(data: &ProblemData) -> PenaltyManager {
        PenaltyManager::new(20, 6, 1.34, 0.32, 0.43, data.capacity(), 12).unwrap()
    }

    fn two_client_data() -> ProblemData {
        let client = |demand| Client {
            demand,
            tw_late: 1000,
            ..Client::default()
        };

        let clients = vec![client(0), client(1), client(1)];
        let dist = Matrix::from_rows(vec![vec![0, 1, 2], vec![1, 0, 3], vec![2, 3, 0]]);
        ProblemData::new(clients, 2, 10, dist).unwrap()
    }

    #[test]
    fn route_count_must_match_fleet() {
        let data = two_client_data();
        assert!(matches!(
            Individual::new(&data, vec![vec![1, 2]]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_routes_sort_last() {
        let data = two_client_data();
        let indiv = Individual::new(&data, vec![vec![], vec![1, 2]]).unwrap();

        assert_eq!(indiv.routes()[0], vec![1, 2]);
        assert!(indiv.routes()[1].is_empty());
        assert_eq!(indiv.num_routes(), 1);
    }

    #[test]
    fn evaluates_distance_and_load() {
        let data = two_client_data();
        let pm = penalties(&data);

        let single = Individual::new(&data, vec![vec![1, 2], vec![]]).unwrap();
        assert_eq!(single.distance(), 6); // 0 -> 1 -> 2 -> 0
        assert!(single.is_feasible());
        assert_eq!(single.cost(&pm), 6);

        let split = Individual::new(&data, vec![vec![1], vec![2]]).unwrap();
        assert_eq!(split.distance(), 6); // 1 + 1 + 2 + 2
        assert_eq!(split.num_routes(), 2);
    }

    #[test]
    fn evaluates_time_warp_and_release() {
        let client = |tw_early, tw_late, release| Client {
            demand: 1,
            tw_early,
            tw_late,
            release,
            ..Client::default()
        };

        let depot = Client {
            tw_late: 1000,
            ..Client::default()
        };
        let dist = Matrix::from_rows(vec![vec![0, 10, 2], vec![10, 0, 3], vec![2, 3, 0]]);

        let clients = vec![depot, client(0, 5, 0), client(0, 8, 0)];
        let data = ProblemData::new(clients, 2, 10, dist.clone()).unwrap();

        // Arrival at client 1 is at time 10, five past its closing time.
        let indiv = Individual::new(&data, vec![vec![1, 2], vec![]]).unwrap();
        assert_eq!(indiv.time_warp(), 5);
        assert!(!indiv.is_feasible());

        let pm = penalties(&data);
        assert_eq!(indiv.cost(&pm), indiv.distance() + 6 * 5);

        // A release time of 4 on client 2 delays departure of the whole
        // route, adding four more units of lateness at client 1.
        let clients = vec![depot, client(0, 5, 0), client(0, 8, 4)];
        let data = ProblemData::new(clients, 2, 10, dist).unwrap();

        let indiv = Individual::new(&data, vec![vec![1, 2], vec![]]).unwrap();
        assert_eq!(indiv.time_warp(), 9);
    }

    #[test]
    fn excess_capacity_is_summed_over_routes() {
        let client = |demand| Client {
            demand,
            tw_late: 1000,
            ..Client::default()
        };

        let clients = vec![client(0), client(7), client(8)];
        let data = ProblemData::new(clients, 2, 5, Matrix::new(3, 3)).unwrap();

        let indiv = Individual::new(&data, vec![vec![1], vec![2]]).unwrap();
        assert_eq!(indiv.capacity_excess(), 2 + 3);
        assert!(indiv.has_excess_capacity());
    }

    #[test]
    fn neighbours_follow_route_order() {
        let data = two_client_data();
        let indiv = Individual::new(&data, vec![vec![1, 2], vec![]]).unwrap();

        assert_eq!(indiv.neighbours()[1], (0, 2));
        assert_eq!(indiv.neighbours()[2], (1, 0));
    }

    #[test]
    fn random_individual_covers_all_clients() {
        let data = ProblemData::parse(SMALL).unwrap();
        let mut rng = XorShift128::new(1);

        let indiv = Individual::new_random(&data, &mut rng);

        let mut seen = vec![0usize; data.num_clients() + 1];
        for route in indiv.routes() {
            for &client in route {
                seen[client] += 1;
            }
        }

        assert!(seen[1..].iter().all(|&count| count == 1));
        assert_eq!(indiv.routes().len(), data.num_vehicles());
    }

    #[test]
    fn solution_file_round_trip() {
        let data = ProblemData::parse(SMALL).unwrap();
        let pm = penalties(&data);
        let mut rng = XorShift128::new(11);

        let indiv = Individual::new_random(&data, &mut rng);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.txt");
        indiv.write_to(&path, &pm, 1.5).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut routes: Vec<Vec<usize>> = text
            .lines()
            .filter(|line| line.starts_with("Route #"))
            .map(|line| {
                line.split(':')
                    .nth(1)
                    .unwrap()
                    .split_whitespace()
                    .map(|tok| tok.parse().unwrap())
                    .collect()
            })
            .collect();
        routes.resize(data.num_vehicles(), Vec::new());

        let cost_line = text
            .lines()
            .find(|line| line.starts_with("Cost "))
            .unwrap();
        let written_cost: Cost = cost_line[5..].parse().unwrap();

        let rebuilt = Individual::new(&data, routes).unwrap();
        assert_eq!(rebuilt.cost(&pm), written_cost);
        assert_eq!(rebuilt.distance(), indiv.distance());
    }
}
