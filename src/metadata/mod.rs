pub mod resolver;
pub mod thresholds;
