use crate::domain::{Cost, Matrix, ProblemData};
use crate::evaluation::{PenaltyManager, TimeWindowSegment};

use super::operator::RouteOperator;
use super::workspace::{NodeIdx, Workspace};

type Tws = TimeWindowSegment;

/// The three cheapest insertion points of a client in a route.
///
/// Keeping three candidates lets the evaluation skip positions adjacent to
/// the swap partner without rescanning the route.
#[derive(Debug, Clone, Copy)]
struct ThreeBest {
    should_update: bool,
    costs: [Cost; 3],
    locs: [Option<NodeIdx>; 3],
}

impl Default for ThreeBest {
    fn default() -> Self {
        Self {
            should_update: true,
            costs: [Cost::MAX; 3],
            locs: [None; 3],
        }
    }
}

impl ThreeBest {
    fn maybe_add(&mut self, cost: Cost, place: NodeIdx) {
        if cost >= self.costs[2] {
            return;
        }

        if cost >= self.costs[1] {
            self.costs[2] = cost;
            self.locs[2] = Some(place);
        } else if cost >= self.costs[0] {
            self.costs[2] = self.costs[1];
            self.locs[2] = self.locs[1];
            self.costs[1] = cost;
            self.locs[1] = Some(place);
        } else {
            self.costs[2] = self.costs[1];
            self.locs[2] = self.locs[1];
            self.costs[1] = self.costs[0];
            self.locs[1] = self.locs[0];
            self.costs[0] = cost;
            self.locs[0] = Some(place);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BestMove {
    cost: Cost,
    u: Option<NodeIdx>,
    u_after: Option<NodeIdx>,
    v: Option<NodeIdx>,
    v_after: Option<NodeIdx>,
}

/// SWAP* neighbourhood: exchanges a client pair between two routes, but
/// reinserts each client at its own best position rather than in the other's
/// place. Insertion and removal costs are cached per (route, client) and
/// invalidated through the route-updated flags.
pub struct SwapStar {
    cache: Matrix<ThreeBest>,
    removal_costs: Matrix<Cost>,
    updated: Vec<bool>,
    best: BestMove,
}

impl SwapStar {
    pub fn new(data: &ProblemData) -> Self {
        Self {
            cache: Matrix::new(data.num_vehicles(), data.num_clients() + 1),
            removal_costs: Matrix::new(data.num_vehicles(), data.num_clients() + 1),
            updated: vec![true; data.num_vehicles()],
            best: BestMove::default(),
        }
    }

    fn num_clients(&self) -> usize {
        self.cache.num_cols() - 1
    }

    /// Cost deltas of removing each client from the given route.
    fn update_removal_costs(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        r_idx: usize,
    ) {
        let dist = data.distance_matrix();
        let curr_time_warp = penalties.tw_penalty(ws.routes[r_idx].time_warp());

        for u in ws.route_clients(r_idx) {
            let p_u = ws.prev(u);
            let n_u = ws.next(u);

            let tw_data = Tws::merge(dist, ws.nodes[p_u].tw_before, ws.nodes[n_u].tw_after);

            let client = |node: NodeIdx| ws.nodes[node].client;
            let removal = data.dist(client(p_u), client(n_u))
                - data.dist(client(p_u), client(u))
                - data.dist(client(u), client(n_u))
                + penalties.tw_penalty(tw_data.total_time_warp())
                - curr_time_warp;

            self.removal_costs.set(r_idx, client(u), removal);
        }
    }

    /// Recomputes the three best insertion points for `u` in route `r_idx`.
    fn update_insertion_cost(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        r_idx: usize,
        u: NodeIdx,
    ) {
        let dist = data.distance_matrix();
        let route_warp = penalties.tw_penalty(ws.routes[r_idx].time_warp());
        let client = |node: NodeIdx| ws.nodes[node].client;

        let mut positions = ThreeBest {
            should_update: false,
            ..ThreeBest::default()
        };

        // Cost of inserting U just after the depot (0 -> U -> ...).
        let depot = ws.routes[r_idx].start;
        let n_depot = ws.next(depot);

        let tw_data = Tws::merge_all(
            dist,
            [
                ws.nodes[depot].tw_before,
                ws.nodes[u].tw,
                ws.nodes[n_depot].tw_after,
            ],
        );

        let cost = data.dist(0, client(u)) + data.dist(client(u), client(n_depot))
            - data.dist(0, client(n_depot))
            + penalties.tw_penalty(tw_data.total_time_warp())
            - route_warp;

        positions.maybe_add(cost, depot);

        for v in ws.route_clients(r_idx) {
            let n_v = ws.next(v);

            let tw_data = Tws::merge_all(
                dist,
                [ws.nodes[v].tw_before, ws.nodes[u].tw, ws.nodes[n_v].tw_after],
            );

            let delta = data.dist(client(v), client(u)) + data.dist(client(u), client(n_v))
                - data.dist(client(v), client(n_v))
                + penalties.tw_penalty(tw_data.total_time_warp())
                - route_warp;

            positions.maybe_add(delta, v);
        }

        self.cache.set(r_idx, client(u), positions);
    }

    /// Best place for `u` in `v`'s route, assuming `v` is removed.
    fn best_insert_point(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        u: NodeIdx,
        v: NodeIdx,
    ) -> (Cost, NodeIdx) {
        let r_v = ws.nodes[v].route;
        let u_client = ws.nodes[u].client;

        if self.cache.get(r_v, u_client).should_update {
            self.update_insertion_cost(ws, data, penalties, r_v, u);
        }

        let best = self.cache.get(r_v, u_client);
        for idx in 0..3 {
            // Cached positions are valid as long as they are not adjacent
            // to the client being removed.
            if let Some(loc) = best.locs[idx] {
                if loc != v && ws.next(loc) != v {
                    return (best.costs[idx], loc);
                }
            }
        }

        // Fallback: insert in the place vacated by V.
        let dist = data.distance_matrix();
        let p_v = ws.prev(v);
        let n_v = ws.next(v);
        let client = |node: NodeIdx| ws.nodes[node].client;

        let tw_data = Tws::merge_all(
            dist,
            [ws.nodes[p_v].tw_before, ws.nodes[u].tw, ws.nodes[n_v].tw_after],
        );

        let delta = data.dist(client(p_v), client(u)) + data.dist(client(u), client(n_v))
            - data.dist(client(p_v), client(n_v))
            + penalties.tw_penalty(tw_data.total_time_warp())
            - penalties.tw_penalty(ws.routes[r_v].time_warp());

        (delta, p_v)
    }

    /// Exact cost of the retained candidate, with complete time-window
    /// merges for both reordered routes. The caches carry only partial
    /// time-warp information, so this runs before committing.
    fn full_evaluate(
        &self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        route_u: usize,
        route_v: usize,
    ) -> Cost {
        let (Some(u), Some(u_after), Some(v), Some(v_after)) =
            (self.best.u, self.best.u_after, self.best.v, self.best.v_after)
        else {
            return self.best.cost;
        };

        let dist = data.distance_matrix();
        let client = |node: NodeIdx| ws.nodes[node].client;
        let d = |a: NodeIdx, b: NodeIdx| data.dist(client(a), client(b));

        let p_u = ws.prev(u);
        let n_u = ws.next(u);
        let p_v = ws.prev(v);
        let n_v = ws.next(v);

        let current = d(p_u, u) + d(u, n_u) + d(p_v, v) + d(v, n_v);
        let proposed = d(v_after, v) + d(u_after, u);

        let mut delta = proposed - current;

        if v_after == p_u {
            // V takes U's place.
            delta += d(v, n_u);
        } else {
            delta += d(v, ws.next(v_after)) + d(p_u, n_u) - d(v_after, ws.next(v_after));
        }

        if u_after == p_v {
            // U takes V's place.
            delta += d(u, n_v);
        } else {
            delta += d(u, ws.next(u_after)) + d(p_v, n_v) - d(u_after, ws.next(u_after));
        }

        // Time windows of route U with V inserted after `v_after`. The
        // positions are always distinct: u_after == V or v_after == U cannot
        // happen.
        let pos_u = ws.nodes[u].position;
        let pos_v_after = ws.nodes[v_after].position;

        let u_tws = if pos_v_after + 1 == pos_u {
            Tws::merge_all(
                dist,
                [ws.nodes[v_after].tw_before, ws.nodes[v].tw, ws.nodes[n_u].tw_after],
            )
        } else if pos_v_after < pos_u {
            Tws::merge_all(
                dist,
                [
                    ws.nodes[v_after].tw_before,
                    ws.nodes[v].tw,
                    ws.tw_between(data, route_u, pos_v_after + 1, pos_u - 1),
                    ws.nodes[n_u].tw_after,
                ],
            )
        } else {
            Tws::merge_all(
                dist,
                [
                    ws.nodes[p_u].tw_before,
                    ws.tw_between(data, route_u, pos_u + 1, pos_v_after),
                    ws.nodes[v].tw,
                    ws.nodes[ws.next(v_after)].tw_after,
                ],
            )
        };

        delta += penalties.tw_penalty(u_tws.total_time_warp());

        let pos_v = ws.nodes[v].position;
        let pos_u_after = ws.nodes[u_after].position;

        let v_tws = if pos_u_after + 1 == pos_v {
            Tws::merge_all(
                dist,
                [ws.nodes[u_after].tw_before, ws.nodes[u].tw, ws.nodes[n_v].tw_after],
            )
        } else if pos_u_after < pos_v {
            Tws::merge_all(
                dist,
                [
                    ws.nodes[u_after].tw_before,
                    ws.nodes[u].tw,
                    ws.tw_between(data, route_v, pos_u_after + 1, pos_v - 1),
                    ws.nodes[n_v].tw_after,
                ],
            )
        } else {
            Tws::merge_all(
                dist,
                [
                    ws.nodes[p_v].tw_before,
                    ws.tw_between(data, route_v, pos_v + 1, pos_u_after),
                    ws.nodes[u].tw,
                    ws.nodes[ws.next(u_after)].tw_after,
                ],
            )
        };

        delta += penalties.tw_penalty(v_tws.total_time_warp());

        delta -= penalties.tw_penalty(ws.routes[route_u].time_warp());
        delta -= penalties.tw_penalty(ws.routes[route_v].time_warp());

        let u_demand = data.client(client(u)).demand;
        let v_demand = data.client(client(v)).demand;

        delta += penalties.load_penalty(ws.routes[route_u].load() - u_demand + v_demand)
            - penalties.load_penalty(ws.routes[route_u].load());
        delta += penalties.load_penalty(ws.routes[route_v].load() + u_demand - v_demand)
            - penalties.load_penalty(ws.routes[route_v].load());

        delta
    }
}

impl RouteOperator for SwapStar {
    fn init(&mut self) {
        self.updated.fill(true);
    }

    fn evaluate(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        route_u: usize,
        route_v: usize,
    ) -> Cost {
        self.best = BestMove::default();

        for r_idx in [route_v, route_u] {
            if self.updated[r_idx] {
                self.update_removal_costs(ws, data, penalties, r_idx);
                self.updated[r_idx] = false;

                for idx in 1..=self.num_clients() {
                    self.cache.get_mut(r_idx, idx).should_update = true;
                }
            }
        }

        let load_u = ws.routes[route_u].load();
        let load_v = ws.routes[route_v].load();

        let u_nodes: Vec<NodeIdx> = ws.route_clients(route_u).collect();
        let v_nodes: Vec<NodeIdx> = ws.route_clients(route_v).collect();

        for &u in &u_nodes {
            for &v in &v_nodes {
                let u_demand = data.client(ws.nodes[u].client).demand;
                let v_demand = data.client(ws.nodes[v].client).demand;
                let load_diff = u_demand - v_demand;

                // Cheap lower bound first: load deltas plus cached removal
                // gains, before any insertion-point work.
                let mut delta = penalties.load_penalty(load_u - load_diff)
                    - penalties.load_penalty(load_u)
                    + penalties.load_penalty(load_v + load_diff)
                    - penalties.load_penalty(load_v)
                    + self.removal_costs.get(route_u, ws.nodes[u].client)
                    + self.removal_costs.get(route_v, ws.nodes[v].client);

                if delta >= 0 {
                    continue;
                }

                let (extra_v, u_after) = self.best_insert_point(ws, data, penalties, u, v);
                delta += extra_v;

                if delta >= 0 {
                    continue;
                }

                let (extra_u, v_after) = self.best_insert_point(ws, data, penalties, v, u);
                delta += extra_u;

                if delta < self.best.cost {
                    self.best = BestMove {
                        cost: delta,
                        u: Some(u),
                        u_after: Some(u_after),
                        v: Some(v),
                        v_after: Some(v_after),
                    };
                }
            }
        }

        // Positive deltas almost never turn negative under full evaluation;
        // not worth the work.
        if self.best.cost >= 0 {
            return self.best.cost;
        }

        let delta = self.full_evaluate(ws, data, penalties, route_u, route_v);
        self.best.cost = delta;
        delta
    }

    fn apply(&mut self, ws: &mut Workspace, _route_u: usize, _route_v: usize) {
        if let (Some(u), Some(u_after), Some(v), Some(v_after)) =
            (self.best.u, self.best.u_after, self.best.v, self.best.v_after)
        {
            ws.insert_after(u, u_after);
            ws.insert_after(v, v_after);
        }
    }

    fn route_updated(&mut self, route: usize) {
        self.updated[route] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Client, Individual};
    use crate::solver::local_search::test_support::{assert_exact_delta, penalties};

    fn swapped_clusters_data() -> ProblemData {
        // Two clusters left and right of the depot. Clients 2 and 3 start in
        // the wrong cluster's route, and their best insertion points are not
        // each other's positions.
        let client = |x, y| Client {
            x,
            y,
            demand: 1,
            tw_late: 1_000_000,
            ..Client::default()
        };

        let clients = vec![
            Client {
                tw_late: 1_000_000,
                ..Client::default()
            },
            client(-10, 0),
            client(-10, 2),
            client(10, 0),
            client(10, 2),
            client(-10, 4),
            client(10, 4),
        ];

        let mut dist = Matrix::new(7, 7);
        for i in 0..7 {
            for j in 0..7 {
                let dx = (clients[i].x - clients[j].x) as f64;
                let dy = (clients[i].y - clients[j].y) as f64;
                dist.set(i, j, (10.0 * dx.hypot(dy)) as i64);
            }
        }

        ProblemData::new(clients, 2, 10, dist).unwrap()
    }

    #[test]
    fn finds_improving_cross_insertion() {
        let data = swapped_clusters_data();
        let pm = penalties(&data);

        // Route 0 serves the left cluster but carries right-cluster client 3;
        // route 1 is the mirror image with client 2.
        let indiv = Individual::new(&data, vec![vec![1, 3, 5], vec![4, 2, 6]]).unwrap();
        let mut ws = Workspace::new(&data);
        ws.load_individual(&data, &indiv);

        let mut swap_star = SwapStar::new(&data);
        swap_star.init();

        let delta = swap_star.evaluate(&ws, &data, &pm, 0, 1);
        assert!(delta < 0);

        assert_exact_delta(&data, &pm, &indiv, delta, |ws| {
            swap_star.apply(ws, 0, 1);
            vec![0, 1]
        });
    }

    #[test]
    fn caches_are_refreshed_after_route_update() {
        let data = swapped_clusters_data();
        let pm = penalties(&data);

        let indiv = Individual::new(&data, vec![vec![1, 3, 5], vec![4, 2, 6]]).unwrap();
        let mut ws = Workspace::new(&data);
        ws.load_individual(&data, &indiv);

        let mut swap_star = SwapStar::new(&data);
        swap_star.init();

        let first = swap_star.evaluate(&ws, &data, &pm, 0, 1);
        assert!(first < 0);

        swap_star.apply(&mut ws, 0, 1);
        ws.update_route(&data, 0);
        ws.update_route(&data, 1);
        swap_star.route_updated(0);
        swap_star.route_updated(1);

        // After the clusters are fixed no further improving swap exists, and
        // the stale caches must not claim otherwise.
        let second = swap_star.evaluate(&ws, &data, &pm, 0, 1);
        assert!(second >= 0);
    }
}
