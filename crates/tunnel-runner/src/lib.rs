pub mod archive;
pub mod docker;
pub mod error;
pub mod parser;
pub mod run;
pub mod runtime;
pub mod streamer;

#[cfg(test)]
pub(crate) mod testing;

pub use error::RunnerError;
pub use run::Runner;
pub use runtime::{ContainerId, ContainerRuntime};
