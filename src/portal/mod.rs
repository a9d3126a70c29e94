pub mod client;
pub mod error;
pub mod retry;
pub mod transport;
pub mod values;
