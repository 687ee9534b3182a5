use crate::domain::entities::job::FailureKind;
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use thiserror::Error;

/// Error raised by a pipeline stage, classified by the stage itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StageError {
    pub kind: FailureKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient failure; the job may be retried.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Infrastructure, message)
    }

    /// The input can never succeed.
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidInput, message)
    }
}

/// Binary result to hand to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Final product of `postprocess`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerOutput {
    pub artifact: Option<Artifact>,
    pub metadata: Value,
}

/// The exclusive resource a runner instance is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotContext {
    pub slot_id: String,
}

/// Three-stage execution pipeline for one job type.
///
/// An instance may serve many jobs in a row; `load` runs once before the
/// first and `unload` when the worker evicts it.
#[async_trait]
pub trait Runner: Send {
    type Prepared: Send + 'static;
    type Output: Send + 'static;

    async fn load(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    async fn prepare(&mut self, payload: &Value) -> Result<Self::Prepared, StageError>;

    async fn infer(&mut self, prepared: Self::Prepared) -> Result<Self::Output, StageError>;

    async fn postprocess(&mut self, output: Self::Output) -> Result<RunnerOutput, StageError>;

    async fn unload(&mut self) {}
}

pub type StageValue = Box<dyn Any + Send>;

/// Object-safe form of [`Runner`] stored by the registry.
#[async_trait]
pub trait DynRunner: Send {
    async fn load(&mut self) -> Result<(), StageError>;
    async fn prepare(&mut self, payload: &Value) -> Result<StageValue, StageError>;
    async fn infer(&mut self, prepared: StageValue) -> Result<StageValue, StageError>;
    async fn postprocess(&mut self, output: StageValue) -> Result<RunnerOutput, StageError>;
    async fn unload(&mut self);
}

struct Erased<R>(R);

fn handoff<T: 'static>(value: StageValue) -> Result<T, StageError> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| StageError::bad_input("stage handoff type mismatch"))
}

#[async_trait]
impl<R: Runner> DynRunner for Erased<R> {
    async fn load(&mut self) -> Result<(), StageError> {
        self.0.load().await
    }

    async fn prepare(&mut self, payload: &Value) -> Result<StageValue, StageError> {
        let prepared = self.0.prepare(payload).await?;
        Ok(Box::new(prepared))
    }

    async fn infer(&mut self, prepared: StageValue) -> Result<StageValue, StageError> {
        let output = self.0.infer(handoff::<R::Prepared>(prepared)?).await?;
        Ok(Box::new(output))
    }

    async fn postprocess(&mut self, output: StageValue) -> Result<RunnerOutput, StageError> {
        self.0.postprocess(handoff::<R::Output>(output)?).await
    }

    async fn unload(&mut self) {
        self.0.unload().await
    }
}

/// Box a typed runner behind the object-safe interface.
pub fn erase<R: Runner + 'static>(runner: R) -> Box<dyn DynRunner> {
    Box::new(Erased(runner))
}
