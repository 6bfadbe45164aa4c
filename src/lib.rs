//! Hybrid genetic search for the capacitated vehicle routing problem with
//! time windows and release times.
//!
//! The engine combines a genetic population manager (selective route
//! exchange crossover, broken-pairs diversity, biased-fitness survivor
//! selection) with a granular-neighbourhood local search whose move
//! evaluators run in constant time thanks to a concatenable time-window
//! segment algebra over doubly-linked routes. Capacity and time-window
//! violations are allowed during the search and priced by adaptive
//! penalties.
//!
//! Instances are read from TSPLIB-like files (`EXPLICIT` full matrices or
//! `EUC_2D` coordinates with one retained decimal); solutions are written as
//! plain `Route #k: ...` lines followed by the cost and elapsed time.

pub mod config;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod rng;
pub mod solver;
pub mod stats;
pub mod stop;

pub use config::{CommandLine, Config};
pub use domain::{Cost, Individual, ProblemData};
pub use error::{Error, Result};
pub use evaluation::PenaltyManager;
pub use rng::XorShift128;
pub use solver::{GeneticSearch, SearchResult};
