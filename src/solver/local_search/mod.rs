pub mod exchange;
pub mod move_two_clients_reversed;
pub mod operator;
pub mod relocate_star;
pub mod swap_star;
pub mod two_opt;
pub mod workspace;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::domain::{Cost, Individual, ProblemData};
use crate::evaluation::{PenaltyManager, TimeWindowSegment};
use crate::rng::XorShift128;

use exchange::Exchange;
use move_two_clients_reversed::MoveTwoClientsReversed;
use operator::{NodeOperator, RouteOperator};
use relocate_star::RelocateStar;
use swap_star::SwapStar;
use two_opt::TwoOpt;
use workspace::{NodeIdx, Workspace};

/// Tuning knobs of the local search.
#[derive(Debug, Clone, Copy)]
pub struct LocalSearchParams {
    pub weight_wait_time: Cost,
    pub weight_time_warp: Cost,
    pub nb_granular: usize,
    pub post_process_path_length: usize,
}

impl Default for LocalSearchParams {
    fn default() -> Self {
        Self {
            weight_wait_time: 18,
            weight_time_warp: 20,
            nb_granular: 34,
            post_process_path_length: 7,
        }
    }
}

/// The educate step: first-improvement search over the granular
/// neighbourhood with the node operators, periodic route-operator polish,
/// and optional enumerative post-processing of short subpaths.
pub struct LocalSearch {
    workspace: Workspace,
    node_ops: Vec<Box<dyn NodeOperator>>,
    route_ops: Vec<Box<dyn RouteOperator>>,
    /// Granular neighbourhood: for each client, the most promising partner
    /// clients sorted by surrogate proximity.
    neighbours: Vec<Vec<usize>>,
    params: LocalSearchParams,
}

impl LocalSearch {
    pub fn new(data: &ProblemData, params: LocalSearchParams) -> Self {
        let node_ops: Vec<Box<dyn NodeOperator>> = vec![
            Box::new(Exchange::<1, 0>),
            Box::new(Exchange::<2, 0>),
            Box::new(Exchange::<3, 0>),
            Box::new(Exchange::<1, 1>),
            Box::new(Exchange::<2, 1>),
            Box::new(Exchange::<3, 1>),
            Box::new(Exchange::<2, 2>),
            Box::new(Exchange::<3, 2>),
            Box::new(Exchange::<3, 3>),
            Box::new(MoveTwoClientsReversed),
            Box::new(TwoOpt),
        ];

        let route_ops: Vec<Box<dyn RouteOperator>> =
            vec![Box::new(RelocateStar::new()), Box::new(SwapStar::new(data))];

        Self {
            workspace: Workspace::new(data),
            node_ops,
            route_ops,
            neighbours: Self::granular_neighbourhood(data, &params),
            params,
        }
    }

    /// Builds the per-client candidate lists once. Each list is independent
    /// of the others, so they are computed in parallel; the collected order
    /// is deterministic.
    fn granular_neighbourhood(data: &ProblemData, params: &LocalSearchParams) -> Vec<Vec<usize>> {
        let n = data.num_clients();

        (0..=n)
            .into_par_iter()
            .map(|client| {
                if client == 0 {
                    return Vec::new();
                }

                let mut proximities: Vec<(Cost, usize)> = (1..=n)
                    .filter(|&other| other != client)
                    .map(|other| (Self::proximity(data, params, client, other), other))
                    .collect();

                proximities.sort_unstable();
                proximities.truncate(params.nb_granular);
                proximities.into_iter().map(|(_, other)| other).collect()
            })
            .collect()
    }

    /// Surrogate closeness of serving `other` directly after `client`:
    /// travel time plus weighted wait and time-warp estimates from the two
    /// time windows.
    fn proximity(
        data: &ProblemData,
        params: &LocalSearchParams,
        client: usize,
        other: usize,
    ) -> Cost {
        let from = data.client(client);
        let to = data.client(other);
        let time = data.dist(client, other);

        let wait = (to.tw_early - time - from.serv_dur - from.tw_late).max(0);
        let warp = (from.tw_early + from.serv_dur + time - to.tw_late).max(0);

        time + params.weight_wait_time * wait + params.weight_time_warp * warp
    }

    /// Improves the individual in place and returns the educated solution.
    pub fn run(
        &mut self,
        indiv: &Individual,
        data: &ProblemData,
        penalties: &PenaltyManager,
        rng: &mut XorShift128,
        post_process: bool,
    ) -> Individual {
        self.workspace.load_individual(data, indiv);

        for op in &mut self.node_ops {
            op.init();
        }
        for op in &mut self.route_ops {
            op.init();
        }

        let mut order: Vec<usize> = (1..=data.num_clients()).collect();
        order.shuffle(rng);

        loop {
            let mut node_improved = false;

            for &u in &order {
                let mut moved = false;

                for idx in 0..self.neighbours[u].len() {
                    let v = self.neighbours[u][idx];
                    if self.try_node_ops(data, penalties, u, v) {
                        moved = true;
                        break;
                    }
                }

                if !moved {
                    // Depot sentinels are candidates too: the route's own
                    // start, and an empty route's start to open a new route.
                    let own_depot = self.workspace.routes[self.workspace.nodes[u].route].start;
                    let mut depots = vec![own_depot];

                    if let Some(empty) = self.workspace.first_empty_route() {
                        depots.push(self.workspace.routes[empty].start);
                    }

                    for v in depots {
                        if self.try_node_ops(data, penalties, u, v) {
                            moved = true;
                            break;
                        }
                    }
                }

                node_improved |= moved;
            }

            if node_improved {
                continue;
            }

            // A sweep without node-operator improvement: polish with the
            // route operators before giving up.
            if !self.route_pass(data, penalties) {
                break;
            }
        }

        if post_process {
            self.post_process(data, penalties);
        }

        let routes = self.workspace.export_routes();
        let educated =
            Individual::new(data, routes).expect("workspace exports one sequence per vehicle");

        debug!(
            distance = educated.distance(),
            time_warp = educated.time_warp(),
            excess = educated.capacity_excess(),
            "local search finished"
        );

        educated
    }

    /// Runs each node operator on `(u, v)`; applies and propagates the first
    /// improving move.
    fn try_node_ops(
        &mut self,
        data: &ProblemData,
        penalties: &PenaltyManager,
        u: NodeIdx,
        v: NodeIdx,
    ) -> bool {
        let mut touched = None;

        for op in &mut self.node_ops {
            let delta = op.evaluate(&self.workspace, data, penalties, u, v);

            if delta < 0 {
                trace!(operator = op.name(), delta, u, v, "applying node move");

                let r_u = self.workspace.nodes[u].route;
                let r_v = self.workspace.nodes[v].route;
                op.apply(&mut self.workspace, u, v);
                touched = Some((r_u, r_v));
                break;
            }
        }

        match touched {
            Some((r_u, r_v)) => {
                self.after_move(data, r_u);
                if r_v != r_u {
                    self.after_move(data, r_v);
                }
                true
            }
            None => false,
        }
    }

    /// One pass of the route-level operators over all distinct non-empty
    /// route pairs.
    fn route_pass(&mut self, data: &ProblemData, penalties: &PenaltyManager) -> bool {
        let mut improved = false;
        let num_routes = self.workspace.routes.len();

        for r_u in 0..num_routes {
            if self.workspace.routes[r_u].is_empty() {
                continue;
            }

            for r_v in r_u + 1..num_routes {
                if self.workspace.routes[r_v].is_empty() {
                    continue;
                }

                let mut applied = false;

                for op in &mut self.route_ops {
                    let delta = op.evaluate(&self.workspace, data, penalties, r_u, r_v);

                    if delta < 0 {
                        trace!(operator = op.name(), delta, r_u, r_v, "applying route move");
                        op.apply(&mut self.workspace, r_u, r_v);
                        applied = true;
                        break;
                    }
                }

                if applied {
                    self.after_move(data, r_u);
                    self.after_move(data, r_v);
                    improved = true;
                }
            }
        }

        improved
    }

    fn after_move(&mut self, data: &ProblemData, route: usize) {
        self.workspace.update_route(data, route);

        for op in &mut self.node_ops {
            op.route_updated(route);
        }
        for op in &mut self.route_ops {
            op.route_updated(route);
        }
    }

    /// Exact improvement of short subpaths: every window of
    /// `post_process_path_length` consecutive clients is replaced by its best
    /// permutation.
    fn post_process(&mut self, data: &ProblemData, penalties: &PenaltyManager) {
        let len = self.params.post_process_path_length;
        if len < 2 {
            return;
        }

        for r_idx in 0..self.workspace.routes.len() {
            if self.workspace.routes[r_idx].size() < len {
                continue;
            }

            let mut start_pos = 1;
            while start_pos + len - 1 <= self.workspace.routes[r_idx].size() {
                self.improve_window(data, penalties, r_idx, start_pos, len);
                start_pos += 1;
            }
        }
    }

    fn improve_window(
        &mut self,
        data: &ProblemData,
        penalties: &PenaltyManager,
        r_idx: usize,
        start_pos: usize,
        len: usize,
    ) {
        let dist = data.distance_matrix();

        let (best_delta, best_perm, before, after) = {
            let ws = &self.workspace;
            let client = |node: NodeIdx| ws.nodes[node].client;

            let before = ws.at_pos(r_idx, start_pos - 1);
            let after = ws.at_pos(r_idx, start_pos + len);
            let window: Vec<NodeIdx> =
                (start_pos..start_pos + len).map(|pos| ws.at_pos(r_idx, pos)).collect();

            let base_dist = ws.dist_between(r_idx, start_pos - 1, start_pos + len);
            let base_warp = penalties.tw_penalty(ws.routes[r_idx].time_warp());

            let mut best_delta = 0;
            let mut best_perm: Option<Vec<NodeIdx>> = None;

            for perm in window.iter().copied().permutations(len) {
                if perm == window {
                    continue;
                }

                let mut perm_dist = data.dist(client(before), client(perm[0]));
                for pair in perm.windows(2) {
                    perm_dist += data.dist(client(pair[0]), client(pair[1]));
                }
                perm_dist += data.dist(client(perm[len - 1]), client(after));

                let mut tws = ws.nodes[before].tw_before;
                for &node in &perm {
                    tws = TimeWindowSegment::merge(dist, tws, ws.nodes[node].tw);
                }
                tws = TimeWindowSegment::merge(dist, tws, ws.nodes[after].tw_after);

                let delta = perm_dist - base_dist + penalties.tw_penalty(tws.total_time_warp())
                    - base_warp;

                if delta < best_delta {
                    best_delta = delta;
                    best_perm = Some(perm);
                }
            }

            (best_delta, best_perm, before, after)
        };

        if let Some(perm) = best_perm {
            trace!(delta = best_delta, route = r_idx, start_pos, "reordered subpath");
            self.workspace.relink(before, &perm, after);
            self.after_move(data, r_idx);
        }
    }
}

/// Helpers shared by the operator unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::workspace::Workspace;
    use crate::domain::{Cost, Individual, ProblemData};
    use crate::evaluation::PenaltyManager;

    pub(crate) fn penalties(data: &ProblemData) -> PenaltyManager {
        PenaltyManager::new(20, 6, 1.34, 0.32, 0.43, data.capacity(), 12).unwrap()
    }

    /// Applies a move on a fresh workspace and checks that the claimed delta
    /// matches a from-scratch re-evaluation exactly.
    pub(crate) fn assert_exact_delta(
        data: &ProblemData,
        penalties: &PenaltyManager,
        indiv: &Individual,
        delta: Cost,
        mutate: impl FnOnce(&mut Workspace) -> Vec<usize>,
    ) {
        let before = indiv.cost(penalties);

        let mut ws = Workspace::new(data);
        ws.load_individual(data, indiv);

        let touched = mutate(&mut ws);
        for route in touched {
            ws.update_route(data, route);
        }

        let rebuilt = Individual::new(data, ws.export_routes()).unwrap();
        assert_eq!(
            rebuilt.cost(penalties) - before,
            delta,
            "operator delta must match a from-scratch re-evaluation"
        );
    }
}
