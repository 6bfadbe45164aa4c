use crate::domain::{Cost, Individual, ProblemData};
use crate::evaluation::TimeWindowSegment;

/// Index of a node in the workspace arena.
pub type NodeIdx = usize;

/// Angle used for routes without clients, so they sort after all real routes.
const EMPTY_ANGLE: f64 = 1e30;

/// One element of a route's doubly-linked structure.
///
/// Client nodes sit at arena index = client id; the depot sentinels of each
/// route follow after them. `prev`/`next` are arena indices, so relinking
/// never touches the allocator.
#[derive(Debug, Clone)]
pub struct Node {
    pub client: usize,
    pub is_depot: bool,
    pub route: usize,
    /// 1-based position; the start sentinel is 0, the end sentinel size + 1.
    pub position: usize,
    pub prev: NodeIdx,
    pub next: NodeIdx,
    /// Singleton segment covering just this node.
    pub tw: TimeWindowSegment,
    /// Merged segment from the route start through this node.
    pub tw_before: TimeWindowSegment,
    /// Merged segment from this node through the route end.
    pub tw_after: TimeWindowSegment,
    pub cumulated_load: Cost,
    pub cumulated_distance: Cost,
    pub cumulated_reversal_distance: Cost,
}

/// A vehicle's route: two depot sentinels plus a dense position index.
#[derive(Debug, Clone)]
pub struct Route {
    pub idx: usize,
    pub start: NodeIdx,
    pub end: NodeIdx,
    /// Nodes at positions 1..=size, then the end sentinel.
    pub nodes: Vec<NodeIdx>,
    pub angle_center: f64,
    load: Cost,
    time_warp: Cost,
    feasible: bool,
}

impl Route {
    pub fn size(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn load(&self) -> Cost {
        self.load
    }

    pub fn time_warp(&self) -> Cost {
        self.time_warp
    }

    pub fn has_time_warp(&self) -> bool {
        self.time_warp > 0
    }

    pub fn is_feasible(&self) -> bool {
        self.feasible
    }
}

/// The local-search working area: a node arena and the routes linked through
/// it. It is loaded from an [`Individual`] at the start of an educate step,
/// mutated in place by the operators, and serialized back out at the end.
/// The arena is allocated once and reused across calls.
#[derive(Debug)]
pub struct Workspace {
    pub nodes: Vec<Node>,
    pub routes: Vec<Route>,
}

impl Workspace {
    pub fn new(data: &ProblemData) -> Self {
        let nb_clients = data.num_clients();
        let nb_vehicles = data.num_vehicles();

        let singleton = |client: usize| {
            let info = data.client(client);
            TimeWindowSegment {
                idx_first: client,
                idx_last: client,
                duration: info.serv_dur,
                time_warp: 0,
                tw_early: info.tw_early,
                tw_late: info.tw_late,
                release: info.release,
            }
        };

        let blank = |client: usize, is_depot: bool| Node {
            client,
            is_depot,
            route: 0,
            position: 0,
            prev: 0,
            next: 0,
            tw: singleton(client),
            tw_before: singleton(client),
            tw_after: singleton(client),
            cumulated_load: 0,
            cumulated_distance: 0,
            cumulated_reversal_distance: 0,
        };

        // Arena slot 0 mirrors the depot so client ids map to slots directly;
        // it is never linked into a route.
        let mut nodes = vec![blank(0, true)];
        nodes.extend((1..=nb_clients).map(|client| blank(client, false)));

        let mut routes = Vec::with_capacity(nb_vehicles);
        for idx in 0..nb_vehicles {
            let start = nodes.len();
            nodes.push(blank(0, true));
            let end = nodes.len();
            nodes.push(blank(0, true));

            nodes[start].route = idx;
            nodes[end].route = idx;

            routes.push(Route {
                idx,
                start,
                end,
                nodes: Vec::new(),
                angle_center: EMPTY_ANGLE,
                load: 0,
                time_warp: 0,
                feasible: true,
            });
        }

        Self { nodes, routes }
    }

    /// Links the individual's route sequences into the arena and rebuilds
    /// every cache.
    pub fn load_individual(&mut self, data: &ProblemData, indiv: &Individual) {
        for (r_idx, sequence) in indiv.routes().iter().enumerate() {
            let start = self.routes[r_idx].start;
            let end = self.routes[r_idx].end;

            let mut prev = start;
            for &client in sequence {
                self.link(prev, client);
                self.nodes[client].route = r_idx;
                prev = client;
            }
            self.link(prev, end);
            self.link(end, start); // sentinels close the cycle

            // Sentinel caches never depend on the clients in between.
            let start_tw = self.nodes[start].tw;
            let end_tw = self.nodes[end].tw;
            self.nodes[start].position = 0;
            self.nodes[start].cumulated_load = 0;
            self.nodes[start].cumulated_distance = 0;
            self.nodes[start].cumulated_reversal_distance = 0;
            self.nodes[start].tw_before = start_tw;
            self.nodes[end].tw_after = end_tw;

            // Force a full cache rebuild for this route.
            self.routes[r_idx].nodes.clear();
            self.update_route(data, r_idx);
        }
    }

    /// Serializes the routes back into client sequences, sorted by polar
    /// angle with empty routes last. Adjacent routes in this ordering serve
    /// nearby clients, which the crossover exploits.
    pub fn export_routes(&self) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.routes.len()).collect();
        order.sort_by(|&a, &b| {
            self.routes[a]
                .angle_center
                .total_cmp(&self.routes[b].angle_center)
        });

        order
            .into_iter()
            .map(|r_idx| {
                let route = &self.routes[r_idx];
                route.nodes[..route.size()]
                    .iter()
                    .map(|&node| self.nodes[node].client)
                    .collect()
            })
            .collect()
    }

    #[inline]
    fn link(&mut self, from: NodeIdx, to: NodeIdx) {
        self.nodes[from].next = to;
        self.nodes[to].prev = from;
    }

    #[inline]
    pub fn next(&self, node: NodeIdx) -> NodeIdx {
        self.nodes[node].next
    }

    #[inline]
    pub fn prev(&self, node: NodeIdx) -> NodeIdx {
        self.nodes[node].prev
    }

    /// Node at the given 1-based position; position 0 is the start sentinel.
    #[inline]
    pub fn at_pos(&self, r_idx: usize, pos: usize) -> NodeIdx {
        if pos == 0 {
            self.routes[r_idx].start
        } else {
            self.routes[r_idx].nodes[pos - 1]
        }
    }

    /// Removes `node` from its route and links it directly after `after`.
    /// Caches stay stale until [`update_route`] runs on both routes.
    ///
    /// [`update_route`]: Workspace::update_route
    pub fn insert_after(&mut self, node: NodeIdx, after: NodeIdx) {
        let prev = self.nodes[node].prev;
        let next = self.nodes[node].next;
        self.link(prev, next);

        let succ = self.nodes[after].next;
        self.link(after, node);
        self.link(node, succ);

        self.nodes[node].route = self.nodes[after].route;
    }

    /// Exchanges the positions of two nodes, possibly across routes.
    pub fn swap_with(&mut self, first: NodeIdx, second: NodeIdx) {
        let f_prev = self.nodes[first].prev;
        let f_next = self.nodes[first].next;
        let s_prev = self.nodes[second].prev;
        let s_next = self.nodes[second].next;

        if f_next == second {
            self.link(f_prev, second);
            self.link(second, first);
            self.link(first, s_next);
        } else if s_next == first {
            self.link(s_prev, first);
            self.link(first, second);
            self.link(second, f_next);
        } else {
            self.link(f_prev, second);
            self.link(second, f_next);
            self.link(s_prev, first);
            self.link(first, s_next);
        }

        let f_route = self.nodes[first].route;
        self.nodes[first].route = self.nodes[second].route;
        self.nodes[second].route = f_route;
    }

    /// Rewires `before -> sequence... -> after` in place. All nodes must
    /// already belong to the same route; caches stay stale until
    /// [`update_route`] runs.
    ///
    /// [`update_route`]: Workspace::update_route
    pub fn relink(&mut self, before: NodeIdx, sequence: &[NodeIdx], after: NodeIdx) {
        let mut prev = before;
        for &node in sequence {
            self.link(prev, node);
            prev = node;
        }
        self.link(prev, after);
    }

    /// Rebuilds the route's caches after a structural mutation. The prefix
    /// that matches the previously cached node list keeps its cumulants; from
    /// the first change onward everything is recomputed, followed by a
    /// reverse pass for the suffix segments and the polar angle.
    pub fn update_route(&mut self, data: &ProblemData, r_idx: usize) {
        let old_nodes = std::mem::take(&mut self.routes[r_idx].nodes);

        // Walk the links from the start sentinel up to and including the end
        // sentinel.
        let mut list = Vec::with_capacity(old_nodes.len());
        let mut node = self.routes[r_idx].start;
        loop {
            node = self.nodes[node].next;
            list.push(node);
            if self.nodes[node].is_depot {
                break;
            }
        }
        self.routes[r_idx].nodes = list;

        let dist = data.distance_matrix();

        let mut load = 0;
        let mut distance = 0;
        let mut reverse_distance = 0;
        let mut found_change = false;

        for pos in 0..self.routes[r_idx].nodes.len() {
            let node = self.routes[r_idx].nodes[pos];

            if !found_change && (pos >= old_nodes.len() || node != old_nodes[pos]) {
                found_change = true;

                if pos > 0 {
                    // Everything before the change is unchanged, so its
                    // cumulants can be reused.
                    let carried = self.routes[r_idx].nodes[pos - 1];
                    load = self.nodes[carried].cumulated_load;
                    distance = self.nodes[carried].cumulated_distance;
                    reverse_distance = self.nodes[carried].cumulated_reversal_distance;
                }
            }

            if !found_change {
                continue;
            }

            let prev = self.nodes[node].prev;
            let client = self.nodes[node].client;
            let prev_client = self.nodes[prev].client;

            load += data.client(client).demand;
            distance += data.dist(prev_client, client);
            reverse_distance += data.dist(client, prev_client) - data.dist(prev_client, client);

            let tw_before = TimeWindowSegment::merge(
                dist,
                self.nodes[prev].tw_before,
                self.nodes[node].tw,
            );

            let entry = &mut self.nodes[node];
            entry.route = r_idx;
            entry.position = pos + 1;
            entry.cumulated_load = load;
            entry.cumulated_distance = distance;
            entry.cumulated_reversal_distance = reverse_distance;
            entry.tw_before = tw_before;
        }

        // Reverse pass: suffix segments from the end sentinel back to the
        // start sentinel.
        let mut node = *self.routes[r_idx]
            .nodes
            .last()
            .unwrap_or(&self.routes[r_idx].end);
        loop {
            let prev = self.nodes[node].prev;
            self.nodes[prev].tw_after =
                TimeWindowSegment::merge(dist, self.nodes[prev].tw, self.nodes[node].tw_after);
            node = prev;
            if self.nodes[node].is_depot {
                break;
            }
        }

        let end = self.routes[r_idx].end;
        let load = self.nodes[end].cumulated_load;
        let time_warp = self.nodes[end].tw_before.total_time_warp();

        let route = &mut self.routes[r_idx];
        route.load = load;
        route.time_warp = time_warp;
        route.feasible = load <= data.capacity() && time_warp == 0;

        self.setup_angle(data, r_idx);
    }

    /// Pseudo-polar angle of the mean client coordinate relative to the
    /// depot. Sorts equivalently to atan2 but is much cheaper.
    fn setup_angle(&mut self, data: &ProblemData, r_idx: usize) {
        let route = &self.routes[r_idx];

        if route.is_empty() {
            self.routes[r_idx].angle_center = EMPTY_ANGLE;
            return;
        }

        let mut cumulated_x = 0;
        let mut cumulated_y = 0;

        for &node in &route.nodes[..route.size()] {
            let client = data.client(self.nodes[node].client);
            cumulated_x += client.x;
            cumulated_y += client.y;
        }

        let size = route.size() as f64;
        let dx = cumulated_x as f64 / size - data.depot().x as f64;
        let dy = cumulated_y as f64 / size - data.depot().y as f64;

        self.routes[r_idx].angle_center = if dx == 0.0 && dy == 0.0 {
            0.0
        } else {
            (1.0 - dx / (dx.abs() + dy.abs())).copysign(dy)
        };
    }

    /// Distance covered between two positions (inclusive boundary nodes).
    #[inline]
    pub fn dist_between(&self, r_idx: usize, from_pos: usize, to_pos: usize) -> Cost {
        debug_assert!(from_pos <= to_pos);
        self.cumulated_distance_at(r_idx, to_pos) - self.cumulated_distance_at(r_idx, from_pos)
    }

    /// Total demand of the clients at positions `from_pos..=to_pos`.
    #[inline]
    pub fn load_between(&self, r_idx: usize, from_pos: usize, to_pos: usize) -> Cost {
        debug_assert!(1 <= from_pos && from_pos <= to_pos);
        let before = self.nodes[self.at_pos(r_idx, from_pos - 1)].cumulated_load;
        self.nodes[self.at_pos(r_idx, to_pos)].cumulated_load - before
    }

    #[inline]
    fn cumulated_distance_at(&self, r_idx: usize, pos: usize) -> Cost {
        if pos == 0 {
            0
        } else {
            self.nodes[self.at_pos(r_idx, pos)].cumulated_distance
        }
    }

    /// Merged time-window segment over positions `from_pos..=to_pos`,
    /// composed from the per-node singletons (O(to_pos - from_pos)).
    pub fn tw_between(&self, data: &ProblemData, r_idx: usize, from_pos: usize, to_pos: usize) -> TimeWindowSegment {
        debug_assert!(1 <= from_pos && from_pos <= to_pos);

        let dist = data.distance_matrix();
        let mut tws = self.nodes[self.at_pos(r_idx, from_pos)].tw;

        for pos in from_pos + 1..=to_pos {
            let node = self.at_pos(r_idx, pos);
            tws = TimeWindowSegment::merge(dist, tws, self.nodes[node].tw);
        }

        tws
    }

    /// Node indices of the route's clients, in visit order.
    pub fn route_clients(&self, r_idx: usize) -> impl Iterator<Item = NodeIdx> + '_ {
        let route = &self.routes[r_idx];
        route.nodes[..route.size()].iter().copied()
    }

    pub fn first_empty_route(&self) -> Option<usize> {
        self.routes.iter().position(Route::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::fixtures::SMALL;
    use crate::rng::XorShift128;

    fn setup() -> (ProblemData, Workspace, Individual) {
        let data = ProblemData::parse(SMALL).unwrap();
        let indiv = Individual::new(&data, vec![vec![1, 2], vec![3, 4], vec![]]).unwrap();
        let mut ws = Workspace::new(&data);
        ws.load_individual(&data, &indiv);
        (data, ws, indiv)
    }

    #[test]
    fn positions_and_cumulants_after_load() {
        let (data, ws, _) = setup();

        let route = &ws.routes[0];
        assert_eq!(route.size(), 2);
        assert_eq!(ws.nodes[1].position, 1);
        assert_eq!(ws.nodes[2].position, 2);
        assert_eq!(ws.nodes[1].route, 0);
        assert_eq!(ws.nodes[3].route, 1);

        // Cumulated distance along 0 -> 1 -> 2 -> end.
        assert_eq!(ws.nodes[1].cumulated_distance, data.dist(0, 1));
        assert_eq!(
            ws.nodes[2].cumulated_distance,
            data.dist(0, 1) + data.dist(1, 2)
        );

        assert_eq!(ws.nodes[1].cumulated_load, 5);
        assert_eq!(ws.nodes[2].cumulated_load, 10);
        assert_eq!(route.load(), 10);
    }

    #[test]
    fn route_stats_match_individual_evaluation() {
        let (_data, ws, indiv) = setup();

        let total_distance: Cost = (0..3)
            .map(|r| {
                let route = &ws.routes[r];
                ws.nodes[route.end].cumulated_distance
            })
            .sum();
        assert_eq!(total_distance, indiv.distance());

        let total_warp: Cost = (0..3).map(|r| ws.routes[r].time_warp()).sum();
        assert_eq!(total_warp, indiv.time_warp());
    }

    #[test]
    fn between_queries() {
        let (data, ws, _) = setup();

        assert_eq!(ws.dist_between(0, 0, 1), data.dist(0, 1));
        assert_eq!(
            ws.dist_between(0, 0, 3),
            data.dist(0, 1) + data.dist(1, 2) + data.dist(2, 0)
        );
        assert_eq!(ws.load_between(0, 1, 2), 10);
        assert_eq!(ws.load_between(0, 2, 2), 5);

        let tws = ws.tw_between(&data, 0, 1, 2);
        assert_eq!(tws.idx_first, 1);
        assert_eq!(tws.idx_last, 2);
    }

    #[test]
    fn insert_after_moves_between_routes() {
        let (data, mut ws, _) = setup();

        // Move client 3 right after client 1.
        ws.insert_after(3, 1);
        ws.update_route(&data, 0);
        ws.update_route(&data, 1);

        let clients: Vec<usize> = ws.route_clients(0).map(|n| ws.nodes[n].client).collect();
        assert_eq!(clients, vec![1, 3, 2]);
        assert_eq!(ws.routes[0].load(), 13);
        assert_eq!(ws.routes[1].load(), 3);
        assert_eq!(ws.nodes[3].route, 0);
        assert_eq!(ws.nodes[3].position, 2);
        assert_eq!(ws.nodes[2].position, 3);
    }

    #[test]
    fn swap_with_exchanges_cross_route() {
        let (data, mut ws, _) = setup();

        ws.swap_with(2, 4);
        ws.update_route(&data, 0);
        ws.update_route(&data, 1);

        let first: Vec<usize> = ws.route_clients(0).map(|n| ws.nodes[n].client).collect();
        let second: Vec<usize> = ws.route_clients(1).map(|n| ws.nodes[n].client).collect();
        assert_eq!(first, vec![1, 4]);
        assert_eq!(second, vec![3, 2]);
        assert_eq!(ws.routes[0].load(), 8);
    }

    #[test]
    fn swap_with_handles_adjacent_nodes() {
        let (data, mut ws, _) = setup();

        ws.swap_with(1, 2);
        ws.update_route(&data, 0);

        let clients: Vec<usize> = ws.route_clients(0).map(|n| ws.nodes[n].client).collect();
        assert_eq!(clients, vec![2, 1]);
    }

    #[test]
    fn incremental_update_matches_full_rebuild() {
        let (data, mut ws, _) = setup();

        ws.insert_after(4, 1);
        ws.update_route(&data, 0); // incremental: prefix [1] reused
        ws.update_route(&data, 1);

        let mut fresh = Workspace::new(&data);
        let indiv = Individual::new(&data, vec![vec![1, 4, 2], vec![3], vec![]]).unwrap();
        fresh.load_individual(&data, &indiv);

        for node in [1, 2, 3, 4] {
            assert_eq!(ws.nodes[node].position, fresh.nodes[node].position);
            assert_eq!(ws.nodes[node].cumulated_load, fresh.nodes[node].cumulated_load);
            assert_eq!(
                ws.nodes[node].cumulated_distance,
                fresh.nodes[node].cumulated_distance
            );
            assert_eq!(
                ws.nodes[node].cumulated_reversal_distance,
                fresh.nodes[node].cumulated_reversal_distance
            );
            assert_eq!(ws.nodes[node].tw_before, fresh.nodes[node].tw_before);
            assert_eq!(ws.nodes[node].tw_after, fresh.nodes[node].tw_after);
        }
    }

    #[test]
    fn export_orders_by_angle_and_round_trips() {
        let data = ProblemData::parse(SMALL).unwrap();
        let mut rng = XorShift128::new(3);
        let indiv = Individual::new_random(&data, &mut rng);

        let mut ws = Workspace::new(&data);
        ws.load_individual(&data, &indiv);
        let exported = ws.export_routes();

        // Same clients, same multiplicity, empty routes at the end.
        let mut all: Vec<usize> = exported.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);

        let non_empty = exported.iter().take_while(|r| !r.is_empty()).count();
        assert!(exported[non_empty..].iter().all(Vec::is_empty));

        let rebuilt = Individual::new(&data, exported).unwrap();
        assert_eq!(rebuilt.distance(), indiv.distance());
        assert_eq!(rebuilt.time_warp(), indiv.time_warp());
    }

    #[test]
    fn first_empty_route_is_found() {
        let (_, ws, _) = setup();
        assert_eq!(ws.first_empty_route(), Some(2));
    }
}
