pub mod channel;
pub mod token;
pub mod usage;
