pub mod diversity;
pub mod penalty;
pub mod time_window;

pub use diversity::broken_pairs_distance;
pub use penalty::{PenaltyBooster, PenaltyManager};
pub use time_window::TimeWindowSegment;
