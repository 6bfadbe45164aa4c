use crate::domain::{Cost, ProblemData};

/// Cost change of inserting `client` between `prev` and `next`, or
/// `Cost::MAX` when the time windows make the insertion unreachable.
///
/// The precheck is deliberately optimistic: it only compares earliest
/// possible finish times against closing times, leaving exact scheduling to
/// the later evaluation.
fn delta_cost(client: usize, prev: usize, next: usize, data: &ProblemData) -> Cost {
    let c = data.client(client);
    let p = data.client(prev);
    let n = data.client(next);

    let prev_release = p.release.max(c.release);
    let prev_earliest_arrival = (prev_release + data.dist(0, prev)).max(p.tw_early);
    let prev_earliest_finish = prev_earliest_arrival + p.serv_dur;
    let dist_prev_client = data.dist(prev, client);

    if prev_earliest_finish + dist_prev_client >= c.tw_late {
        return Cost::MAX;
    }

    let client_release = c.release.max(n.release);
    let client_earliest_arrival = (client_release + data.dist(0, client)).max(c.tw_early);
    let client_earliest_finish = client_earliest_arrival + c.serv_dur;
    let dist_client_next = data.dist(client, next);

    if client_earliest_finish + dist_client_next >= n.tw_late {
        return Cost::MAX;
    }

    dist_prev_client + dist_client_next - data.dist(prev, next)
}

/// Inserts each unplanned client at its cheapest reachable position across
/// the non-empty routes. Ties break on the first position found; when no
/// position passes the reachability precheck the client still goes into the
/// first route, so nobody is left unplanned.
pub fn greedy_repair(routes: &mut [Vec<usize>], unplanned: &[usize], data: &ProblemData) {
    // Points just past the last non-empty route.
    let mut num_routes = 0;
    for (r_idx, route) in routes.iter().enumerate() {
        if !route.is_empty() {
            num_routes = r_idx + 1;
        }
    }

    for &client in unplanned {
        let mut best = (Cost::MAX, 0, 0); // (cost, route, offset)

        for (r_idx, route) in routes.iter().enumerate().take(num_routes) {
            if route.is_empty() {
                continue;
            }

            for idx in 0..=route.len() {
                let prev = if idx == 0 { 0 } else { route[idx - 1] };
                let next = if idx == route.len() { 0 } else { route[idx] };

                let cost = delta_cost(client, prev, next, data);
                if cost < best.0 {
                    best = (cost, r_idx, idx);
                }
            }
        }

        let (_, r_idx, offset) = best;
        routes[r_idx].insert(offset, client);
    }
}
