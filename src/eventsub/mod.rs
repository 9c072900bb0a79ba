pub mod manager;
pub mod payload;
pub mod transport;
pub mod types;
