use crate::domain::{Cost, ProblemData};
use crate::evaluation::{PenaltyManager, TimeWindowSegment};

use super::operator::NodeOperator;
use super::workspace::{NodeIdx, Workspace};

type Tws = TimeWindowSegment;

/// Moves the pair `U, next(U)` after `V` in reversed order, producing
/// `V -> next(U) -> U -> next(V)`.
pub struct MoveTwoClientsReversed;

impl NodeOperator for MoveTwoClientsReversed {
    fn evaluate(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        u: NodeIdx,
        v: NodeIdx,
    ) -> Cost {
        let n_u = ws.next(u);

        if u == ws.next(v) || n_u == v || ws.nodes[n_u].is_depot {
            return 0;
        }

        let nn_u = ws.next(n_u);
        let n_v = ws.next(v);

        let pos_u = ws.nodes[u].position;
        let pos_v = ws.nodes[v].position;
        let r_u = ws.nodes[u].route;
        let r_v = ws.nodes[v].route;

        let client = |node: NodeIdx| ws.nodes[node].client;

        let current = ws.dist_between(r_u, pos_u - 1, pos_u + 2)
            + data.dist(client(v), client(n_v));
        let proposed = data.dist(client(ws.prev(u)), client(nn_u))
            + data.dist(client(v), client(n_u))
            + data.dist(client(n_u), client(u))
            + data.dist(client(u), client(n_v));

        let mut delta = proposed - current;
        let dist = data.distance_matrix();

        if r_u != r_v {
            if ws.routes[r_u].is_feasible() && delta >= 0 {
                return delta;
            }

            let u_tws = Tws::merge(
                dist,
                ws.nodes[ws.prev(u)].tw_before,
                ws.nodes[nn_u].tw_after,
            );

            delta += penalties.tw_penalty(u_tws.total_time_warp());
            delta -= penalties.tw_penalty(ws.routes[r_u].time_warp());

            let load_diff = ws.load_between(r_u, pos_u, pos_u + 1);

            delta += penalties.load_penalty(ws.routes[r_u].load() - load_diff)
                - penalties.load_penalty(ws.routes[r_u].load());

            // If the donor route alone cannot pay for the move, adding the
            // receiving route can only make it worse.
            if delta >= 0 {
                return delta;
            }

            delta += penalties.load_penalty(ws.routes[r_v].load() + load_diff)
                - penalties.load_penalty(ws.routes[r_v].load());

            let v_tws = Tws::merge_all(
                dist,
                [
                    ws.nodes[v].tw_before,
                    ws.nodes[n_u].tw,
                    ws.nodes[u].tw,
                    ws.nodes[n_v].tw_after,
                ],
            );

            delta += penalties.tw_penalty(v_tws.total_time_warp());
            delta -= penalties.tw_penalty(ws.routes[r_v].time_warp());
        } else {
            let route = &ws.routes[r_u];

            if !route.has_time_warp() && delta >= 0 {
                return delta;
            }

            let tws = if pos_u < pos_v {
                Tws::merge_all(
                    dist,
                    [
                        ws.nodes[ws.prev(u)].tw_before,
                        ws.tw_between(data, r_u, pos_u + 2, pos_v),
                        ws.nodes[n_u].tw,
                        ws.nodes[u].tw,
                        ws.nodes[n_v].tw_after,
                    ],
                )
            } else {
                Tws::merge_all(
                    dist,
                    [
                        ws.nodes[v].tw_before,
                        ws.nodes[n_u].tw,
                        ws.nodes[u].tw,
                        ws.tw_between(data, r_u, pos_v + 1, pos_u - 1),
                        ws.nodes[nn_u].tw_after,
                    ],
                )
            };

            delta += penalties.tw_penalty(tws.total_time_warp());
            delta -= penalties.tw_penalty(route.time_warp());
        }

        delta
    }

    fn apply(&mut self, ws: &mut Workspace, u: NodeIdx, v: NodeIdx) {
        let x = ws.next(u); // copy, the insert below changes next(U)

        ws.insert_after(u, v);
        ws.insert_after(x, v);
    }
}
