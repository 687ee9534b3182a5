pub mod builtin;
pub mod registry;
pub mod runner;

pub use registry::{RegistryError, RunnerFactory, RunnerRegistry, RunnerRegistryBuilder};
pub use runner::{Artifact, DynRunner, Runner, RunnerOutput, SlotContext, StageError};
