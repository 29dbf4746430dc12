pub mod config;
pub mod daemon;
pub mod error;
pub mod sources;

pub use daemon::Runner;
pub use error::RunnerError;
