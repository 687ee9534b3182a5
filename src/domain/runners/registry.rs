use crate::domain::runners::runner::{DynRunner, Runner, SlotContext, erase};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub type RunnerFactory = Arc<dyn Fn(&SlotContext) -> Box<dyn DynRunner> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("job type `{0}` is already registered")]
    DuplicateJobType(String),
    #[error("no runner registered for job type `{0}`")]
    NotFound(String),
}

/// Collects factories during startup.
#[derive(Default)]
pub struct RunnerRegistryBuilder {
    factories: BTreeMap<String, RunnerFactory>,
}

impl RunnerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed runner factory under `job_type`.
    pub fn register<F, R>(&mut self, job_type: &str, factory: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&SlotContext) -> R + Send + Sync + 'static,
        R: Runner + 'static,
    {
        self.register_dyn(job_type, Arc::new(move |slot: &SlotContext| erase(factory(slot))))
    }

    /// Register an already type-erased factory under `job_type`.
    pub fn register_dyn(
        &mut self,
        job_type: &str,
        factory: RunnerFactory,
    ) -> Result<&mut Self, RegistryError> {
        if self.factories.contains_key(job_type) {
            return Err(RegistryError::DuplicateJobType(job_type.to_string()));
        }
        self.factories.insert(job_type.to_string(), factory);
        Ok(self)
    }

    /// Freeze the registry; no registration is possible afterwards.
    pub fn build(self) -> Arc<RunnerRegistry> {
        Arc::new(RunnerRegistry {
            factories: self.factories,
        })
    }
}

/// Read-only map from job type to runner factory.
pub struct RunnerRegistry {
    factories: BTreeMap<String, RunnerFactory>,
}

impl RunnerRegistry {
    pub fn resolve(&self, job_type: &str) -> Result<RunnerFactory, RegistryError> {
        self.factories
            .get(job_type)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(job_type.to_string()))
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    /// Registered job types in lexical order.
    pub fn job_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
