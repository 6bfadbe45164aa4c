pub mod crossover;
pub mod population;
pub mod repair;
pub mod search;

pub use crossover::selective_route_exchange;
pub use population::{Population, PopulationParams};
pub use search::{GeneticSearch, GeneticSearchParams, SearchResult};
