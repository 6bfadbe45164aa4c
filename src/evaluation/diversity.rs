use crate::domain::{Individual, ProblemData};

/// Broken-pairs distance between two solutions.
///
/// Counts, over all clients, the route edges of one solution that the other
/// does not have (in either direction), and normalizes into [0, 1]. Zero
/// means the two solutions have identical route structure.
pub fn broken_pairs_distance(data: &ProblemData, first: &Individual, second: &Individual) -> f64 {
    let f_neighbours = first.neighbours();
    let s_neighbours = second.neighbours();

    let mut num_broken_pairs = 0;

    for client in 1..=data.num_clients() {
        let (f_pred, f_succ) = f_neighbours[client];
        let (s_pred, s_succ) = s_neighbours[client];

        // Each edge is counted twice in this loop, once for each endpoint.
        num_broken_pairs += usize::from(f_succ != s_succ);
        num_broken_pairs += usize::from(f_pred != s_pred);
    }

    // Average broken pairs distance, adjusted for the double counting.
    num_broken_pairs as f64 / (2 * data.num_clients()) as f64
}
