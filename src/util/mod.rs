pub mod env;
pub mod helix;
pub mod tracing;
