use crate::domain::{Cost, ProblemData};
use crate::evaluation::PenaltyManager;

use super::exchange::Exchange;
use super::operator::{NodeOperator, RouteOperator};
use super::workspace::{NodeIdx, Workspace};

#[derive(Debug, Clone, Copy, Default)]
struct Move {
    delta_cost: Cost,
    from: Option<NodeIdx>,
    to: Option<NodeIdx>,
}

/// Best (1, 0)-exchange between two routes, tested in both directions and
/// including insertions right after the depot.
pub struct RelocateStar {
    relocate: Exchange<1, 0>,
    best: Move,
}

impl RelocateStar {
    pub fn new() -> Self {
        Self {
            relocate: Exchange::<1, 0>,
            best: Move::default(),
        }
    }

    fn consider(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        from: NodeIdx,
        to: NodeIdx,
    ) {
        let delta = self.relocate.evaluate(ws, data, penalties, from, to);

        if delta < self.best.delta_cost {
            self.best = Move {
                delta_cost: delta,
                from: Some(from),
                to: Some(to),
            };
        }
    }
}

impl Default for RelocateStar {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteOperator for RelocateStar {
    fn evaluate(
        &mut self,
        ws: &Workspace,
        data: &ProblemData,
        penalties: &PenaltyManager,
        route_u: usize,
        route_v: usize,
    ) -> Cost {
        self.best = Move::default();

        let u_nodes: Vec<NodeIdx> = ws.route_clients(route_u).collect();
        let v_nodes: Vec<NodeIdx> = ws.route_clients(route_v).collect();
        let v_depot = ws.routes[route_v].start;

        for &node_u in &u_nodes {
            // U directly after V's depot.
            self.consider(ws, data, penalties, node_u, v_depot);

            for &node_v in &v_nodes {
                // U after V, and V after U.
                self.consider(ws, data, penalties, node_u, node_v);
                self.consider(ws, data, penalties, node_v, node_u);
            }
        }

        self.best.delta_cost
    }

    fn apply(&mut self, ws: &mut Workspace, _route_u: usize, _route_v: usize) {
        if let (Some(from), Some(to)) = (self.best.from, self.best.to) {
            ws.insert_after(from, to);
        }
    }
}
