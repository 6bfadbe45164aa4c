use crate::domain::{Cost, ProblemData};
use crate::evaluation::{PenaltyManager, TimeWindowSegment};

use super::operator::NodeOperator;
use super::workspace::{NodeIdx, Workspace};

type Tws = TimeWindowSegment;

/// 2-OPT moves.
///
/// Within a route, reverses the sub-path between `next(U)` and `V`. Between
/// routes, exchanges the tails following `U` and `V`. The reversal is priced
/// in O(1) through the cached reversal-distance cumulants; its time-warp
/// effect needs an O(|V - U|) walk because reversed segments are not cached.
pub struct TwoOpt;

impl TwoOpt {
    fn eval_within_route(
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        u: NodeIdx,
        v: NodeIdx,
    ) -> Cost {
        if ws.nodes[u].position + 1 >= ws.nodes[v].position {
            return 0;
        }

        let n_u = ws.next(u);
        let n_v = ws.next(v);
        let client = |node: NodeIdx| ws.nodes[node].client;

        let mut delta = data.dist(client(u), client(v))
            + data.dist(client(n_u), client(n_v))
            + ws.nodes[v].cumulated_reversal_distance
            - data.dist(client(u), client(n_u))
            - data.dist(client(v), client(n_v))
            - ws.nodes[n_u].cumulated_reversal_distance;

        let route = &ws.routes[ws.nodes[u].route];

        if !route.has_time_warp() && delta >= 0 {
            return delta;
        }

        // Walk the reversed sub-path back to front; its segment data is not
        // cached in this direction.
        let dist = data.distance_matrix();
        let mut tws = ws.nodes[u].tw_before;

        let mut node = v;
        while node != u {
            tws = Tws::merge(dist, tws, ws.nodes[node].tw);
            node = ws.prev(node);
        }

        tws = Tws::merge(dist, tws, ws.nodes[n_v].tw_after);

        delta += penalties.tw_penalty(tws.total_time_warp());
        delta -= penalties.tw_penalty(route.time_warp());

        delta
    }

    fn eval_between_routes(
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        u: NodeIdx,
        v: NodeIdx,
    ) -> Cost {
        let n_u = ws.next(u);
        let n_v = ws.next(v);
        let client = |node: NodeIdx| ws.nodes[node].client;

        let current = data.dist(client(u), client(n_u)) + data.dist(client(v), client(n_v));
        let proposed = data.dist(client(u), client(n_v)) + data.dist(client(v), client(n_u));

        let mut delta = proposed - current;

        let route_u = &ws.routes[ws.nodes[u].route];
        let route_v = &ws.routes[ws.nodes[v].route];

        if route_u.is_feasible() && route_v.is_feasible() && delta >= 0 {
            return delta;
        }

        let dist = data.distance_matrix();

        let u_tws = Tws::merge(dist, ws.nodes[u].tw_before, ws.nodes[n_v].tw_after);
        delta += penalties.tw_penalty(u_tws.total_time_warp());
        delta -= penalties.tw_penalty(route_u.time_warp());

        let v_tws = Tws::merge(dist, ws.nodes[v].tw_before, ws.nodes[n_u].tw_after);
        delta += penalties.tw_penalty(v_tws.total_time_warp());
        delta -= penalties.tw_penalty(route_v.time_warp());

        let delta_load = ws.nodes[u].cumulated_load - ws.nodes[v].cumulated_load;

        delta += penalties.load_penalty(route_u.load() - delta_load)
            - penalties.load_penalty(route_u.load());
        delta += penalties.load_penalty(route_v.load() + delta_load)
            - penalties.load_penalty(route_v.load());

        delta
    }

    fn apply_within_route(ws: &mut Workspace, u: NodeIdx, v: NodeIdx) {
        let mut node = v;
        let mut insertion_point = u;
        let curr_next = ws.next(u);

        while node != curr_next {
            // No need to move next(U) itself; the reversal pivots around it.
            let current = node;
            node = ws.prev(node);
            ws.insert_after(current, insertion_point);
            insertion_point = current;
        }
    }

    fn apply_between_routes(ws: &mut Workspace, u: NodeIdx, v: NodeIdx) {
        let mut tail_u = ws.next(u);
        let mut tail_v = ws.next(v);

        let mut insert_location = u;
        while !ws.nodes[tail_v].is_depot {
            let node = tail_v;
            tail_v = ws.next(tail_v);
            ws.insert_after(node, insert_location);
            insert_location = node;
        }

        let mut insert_location = v;
        while !ws.nodes[tail_u].is_depot {
            let node = tail_u;
            tail_u = ws.next(tail_u);
            ws.insert_after(node, insert_location);
            insert_location = node;
        }
    }
}

impl NodeOperator for TwoOpt {
    fn evaluate(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        u: NodeIdx,
        v: NodeIdx,
    ) -> Cost {
        // The symmetric pair is handled when the iteration reaches it the
        // other way around.
        if ws.nodes[u].route > ws.nodes[v].route {
            return 0;
        }

        if ws.nodes[u].route == ws.nodes[v].route {
            Self::eval_within_route(ws, data, penalties, u, v)
        } else {
            Self::eval_between_routes(ws, data, penalties, u, v)
        }
    }

    fn apply(&mut self, ws: &mut Workspace, u: NodeIdx, v: NodeIdx) {
        if ws.nodes[u].route == ws.nodes[v].route {
            Self::apply_within_route(ws, u, v);
        } else {
            Self::apply_between_routes(ws, u, v);
        }
    }
}
