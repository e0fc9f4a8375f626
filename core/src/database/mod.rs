pub mod bind;
mod engine;
#[cfg(test)]
pub mod mock;
pub mod sqlserver;

pub use engine::{EngineError, SqlEngine};
