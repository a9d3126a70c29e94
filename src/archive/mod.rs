pub mod error;
pub mod manifest;
pub mod partition;
pub mod repartition;
