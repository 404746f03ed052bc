//! RPC errors
//!
//! Every failure a caller can observe through [`wait`](crate::RpcSystem::wait)
//! is one of these. Errors are `Clone` because a single outcome is published
//! to every clone of a promise.

use codec::CodecError;
use schema::SchemaError;
use thiserror::Error;

/// Errors raised while dispatching calls or resolving promises
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    /// Call was issued against a promise that failed to resolve
    #[error("Promise not fulfilled: {reason}")]
    PromiseNotFulfilled { reason: String },

    /// Implementation returned an error
    #[error("Call {method} failed: {reason}")]
    CallFailed { method: String, reason: String },

    /// Worker running the call panicked; the capability itself keeps serving
    #[error("Worker for {method} panicked: {reason}")]
    WorkerPanicked { method: String, reason: String },

    /// Interface (and its superclasses) has no such method
    #[error("Interface {interface} has no method '{method}'")]
    MethodNotFound { interface: String, method: String },

    /// Object used as a call target or stop target is not a usable capability
    #[error("Not a capability: {what}")]
    NotACapability { what: String },

    /// Interface-typed object whose pointer is null
    #[error("Null capability of interface {interface}")]
    NullCapability { interface: String },

    /// Owning actor has stopped; the call was never run or its outcome was lost
    #[error("Capability {actor} stopped")]
    CapabilityStopped { actor: String },

    /// Call was forwarded through more promises than allowed
    #[error("Pipeline depth of {limit} exceeded")]
    PipelineDepthExceeded { limit: u32 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RpcError {
    pub fn call_failed(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallFailed {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn not_a_capability(what: impl Into<String>) -> Self {
        Self::NotACapability { what: what.into() }
    }

    pub fn stopped(actor: impl ToString) -> Self {
        Self::CapabilityStopped {
            actor: actor.to_string(),
        }
    }

    /// Failure seen by calls queued on a promise that failed with `self`
    pub fn unfulfilled(&self) -> Self {
        match self {
            Self::PromiseNotFulfilled { .. } => self.clone(),
            other => Self::PromiseNotFulfilled {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type for capability operations
pub type RpcResult<T> = std::result::Result<T, RpcError>;
