pub mod individual;
pub mod instance;
pub mod matrix;

pub use individual::Individual;
pub use instance::{Client, ProblemData};
pub use matrix::Matrix;

/// Integer cost/time/load unit used throughout the solver.
///
/// Distances, durations, demands, and penalized costs all share this type;
/// the EUC_2D path keeps one decimal of precision by scaling by ten before
/// truncation.
pub type Cost = i64;
