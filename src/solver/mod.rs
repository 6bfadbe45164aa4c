pub mod genetic_search;
pub mod local_search;

pub use genetic_search::search::{GeneticSearch, GeneticSearchParams, SearchResult};
pub use local_search::{LocalSearch, LocalSearchParams};
