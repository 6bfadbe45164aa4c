use tracing::trace;

use crate::domain::{Individual, ProblemData};
use crate::evaluation::PenaltyManager;
use crate::rng::XorShift128;

use super::repair::greedy_repair;

/// Selective route exchange (SREX): transplants a contiguous block of routes
/// from parent B into the corresponding positions of parent A.
///
/// Route blocks are picked by index over the angle-sorted routes, then the
/// two start indices are shifted locally to minimize the mismatch between
/// the replaced and inserted client sets. Two stitched candidates are built
/// (one keeps B's insertions, one keeps only clients A also selected), both
/// are greedily repaired, and the cheaper one under the current penalties is
/// returned.
pub fn selective_route_exchange(
    parents: (&Individual, &Individual),
    data: &ProblemData,
    penalties: &PenaltyManager,
    rng: &mut XorShift128,
) -> Individual {
    let (parent_a, parent_b) = parents;

    let n_routes_a = parent_a.num_routes();
    let n_routes_b = parent_b.num_routes();

    // Adjacent routes overlap spatially (they are angle-sorted), so a random
    // contiguous block replaces routes with a large shared client set.
    let mut start_a = rng.randint(n_routes_a);
    let n_moved = rng.randint(n_routes_a.min(n_routes_b)) + 1; // at least one
    let mut start_b = if start_a < n_routes_b { start_a } else { 0 };

    let routes_a = parent_a.routes();
    let routes_b = parent_b.routes();

    let num_clients = data.num_clients();
    let mut selected_a = vec![false; num_clients + 1];
    let mut selected_b = vec![false; num_clients + 1];

    for r in 0..n_moved {
        for &client in &routes_a[(start_a + r) % n_routes_a] {
            selected_a[client] = true;
        }
        for &client in &routes_b[(start_b + r) % n_routes_b] {
            selected_b[client] = true;
        }
    }

    // Shift the two blocks while doing so shrinks the one-sided differences
    // |A-selection not in B| / |B-selection in A|. Each move is scored by
    // the change it causes; stop at a local optimum. The loop is bounded
    // because every accepted move strictly improves the score.
    for _ in 0..n_routes_a.max(n_routes_b) {
        let count = |route: &[usize], pred: &dyn Fn(usize) -> bool| -> i64 {
            route.iter().filter(|&&client| pred(client)).count() as i64
        };

        let not_in_b = |client: usize| !selected_b[client];
        let in_a = |client: usize| selected_a[client];

        let difference_a_left = count(&routes_a[(start_a + n_routes_a - 1) % n_routes_a], &not_in_b)
            - count(&routes_a[(start_a + n_moved - 1) % n_routes_a], &not_in_b);

        let difference_a_right = count(&routes_a[(start_a + n_moved) % n_routes_a], &not_in_b)
            - count(&routes_a[start_a], &not_in_b);

        let difference_b_left = count(&routes_b[(start_b + n_moved + n_routes_b - 1) % n_routes_b], &in_a)
            - count(&routes_b[(start_b + n_routes_b - 1) % n_routes_b], &in_a);

        let difference_b_right = count(&routes_b[start_b], &in_a)
            - count(&routes_b[(start_b + n_moved) % n_routes_b], &in_a);

        let best_difference = difference_a_left
            .min(difference_a_right)
            .min(difference_b_left)
            .min(difference_b_right);

        if best_difference >= 0 {
            break; // no further improving shift
        }

        if best_difference == difference_a_left {
            for &client in &routes_a[(start_a + n_moved - 1) % n_routes_a] {
                selected_a[client] = false;
            }
            start_a = (start_a + n_routes_a - 1) % n_routes_a;
            for &client in &routes_a[start_a] {
                selected_a[client] = true;
            }
        } else if best_difference == difference_a_right {
            for &client in &routes_a[start_a] {
                selected_a[client] = false;
            }
            start_a = (start_a + 1) % n_routes_a;
            for &client in &routes_a[(start_a + n_moved - 1) % n_routes_a] {
                selected_a[client] = true;
            }
        } else if best_difference == difference_b_left {
            for &client in &routes_b[(start_b + n_moved - 1) % n_routes_b] {
                selected_b[client] = false;
            }
            start_b = (start_b + n_routes_b - 1) % n_routes_b;
            for &client in &routes_b[start_b] {
                selected_b[client] = true;
            }
        } else {
            for &client in &routes_b[start_b] {
                selected_b[client] = false;
            }
            start_b = (start_b + 1) % n_routes_b;
            for &client in &routes_b[(start_b + n_moved - 1) % n_routes_b] {
                selected_b[client] = true;
            }
        }
    }

    // Clients that the B-block brings in but the A-block never had: they may
    // collide with retained A-routes, so one candidate drops them there and
    // the other drops them from the inserted block.
    let in_b_not_a: Vec<bool> = (0..=num_clients)
        .map(|client| selected_b[client] && !selected_a[client])
        .collect();

    let nb_vehicles = data.num_vehicles();
    let mut candidate1 = vec![Vec::new(); nb_vehicles];
    let mut candidate2 = vec![Vec::new(); nb_vehicles];

    // Replace the selected A-routes with B's routes.
    for r in 0..n_moved {
        let index_a = (start_a + r) % n_routes_a;
        let index_b = (start_b + r) % n_routes_b;

        for &client in &routes_b[index_b] {
            candidate1[index_a].push(client);

            if !in_b_not_a[client] {
                candidate2[index_a].push(client);
            }
        }
    }

    // Keep the remaining A-routes, dropping duplicates in candidate 1.
    for r in n_moved..n_routes_a {
        let index_a = (start_a + r) % n_routes_a;

        for &client in &routes_a[index_a] {
            if !in_b_not_a[client] {
                candidate1[index_a].push(client);
            }

            candidate2[index_a].push(client);
        }
    }

    // Clients of the removed A-routes that the inserted B-routes do not
    // cover are unplanned and must be reinserted.
    let unplanned: Vec<usize> = (1..=num_clients)
        .filter(|&client| selected_a[client] && !selected_b[client])
        .collect();

    greedy_repair(&mut candidate1, &unplanned, data);
    greedy_repair(&mut candidate2, &unplanned, data);

    let offspring1 =
        Individual::new(data, candidate1).expect("candidate has one sequence per vehicle");
    let offspring2 =
        Individual::new(data, candidate2).expect("candidate has one sequence per vehicle");

    trace!(
        moved = n_moved,
        unplanned = unplanned.len(),
        cost1 = offspring1.cost(penalties),
        cost2 = offspring2.cost(penalties),
        "selective route exchange"
    );

    if offspring1.cost(penalties) <= offspring2.cost(penalties) {
        offspring1
    } else {
        offspring2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::fixtures::SMALL;
    use crate::domain::ProblemData;
    use crate::evaluation::PenaltyManager;

    fn penalties(data: &ProblemData) -> PenaltyManager {
        PenaltyManager::new(20, 6, 1.34, 0.32, 0.43, data.capacity(), 12).unwrap()
    }

    fn covers_each_client_once(data: &ProblemData, indiv: &Individual) -> bool {
        let mut seen = vec![0usize; data.num_clients() + 1];
        for route in indiv.routes() {
            for &client in route {
                seen[client] += 1;
            }
        }
        seen[1..].iter().all(|&count| count == 1)
    }

    #[test]
    fn offspring_is_a_valid_solution() {
        let data = ProblemData::parse(SMALL).unwrap();
        let pm = penalties(&data);
        let mut rng = XorShift128::new(17);

        let parent_a = Individual::new(&data, vec![vec![1, 2], vec![3, 4], vec![]]).unwrap();
        let parent_b = Individual::new(&data, vec![vec![1, 3], vec![2], vec![4]]).unwrap();

        for _ in 0..25 {
            let child = selective_route_exchange((&parent_a, &parent_b), &data, &pm, &mut rng);
            assert!(covers_each_client_once(&data, &child));
        }
    }

    #[test]
    fn identical_parents_reproduce_themselves() {
        let data = ProblemData::parse(SMALL).unwrap();
        let pm = penalties(&data);
        let mut rng = XorShift128::new(5);

        let parent = Individual::new(&data, vec![vec![1, 2], vec![3, 4], vec![]]).unwrap();
        let child = selective_route_exchange((&parent, &parent), &data, &pm, &mut rng);

        assert_eq!(child.cost(&pm), parent.cost(&pm));
        assert!(covers_each_client_once(&data, &child));
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let data = ProblemData::parse(SMALL).unwrap();
        let pm = penalties(&data);

        let parent_a = Individual::new(&data, vec![vec![1, 2], vec![3, 4], vec![]]).unwrap();
        let parent_b = Individual::new(&data, vec![vec![4, 2], vec![1], vec![3]]).unwrap();

        let run = |seed| {
            let mut rng = XorShift128::new(seed);
            let child = selective_route_exchange((&parent_a, &parent_b), &data, &pm, &mut rng);
            child.routes().to_vec()
        };

        assert_eq!(run(23), run(23));
        assert_eq!(run(23), run(23));
    }
}
