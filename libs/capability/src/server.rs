//! Implementation side of a capability

use async_trait::async_trait;
use codec::Object;
use schema::Method;

/// Everything a call implementation sees: the resolved method, the caller's
/// parameters, and a preallocated result struct to fill in
#[derive(Debug, Clone)]
pub struct CallContext {
    method: Method,
    params: Object,
    results: Object,
}

impl CallContext {
    pub(crate) fn new(method: Method, params: Object, results: Object) -> Self {
        Self {
            method,
            params,
            results,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Shorthand for `method().name`
    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    pub fn params(&self) -> &Object {
        &self.params
    }

    pub fn results(&self) -> &Object {
        &self.results
    }
}

/// Behaviour behind a capability
///
/// One actor owns each started server and runs its calls one at a time, so
/// interior state needs a lock only to satisfy `Sync`; it is never contended
/// by two calls on the same capability.
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Handle one call. Returning an error or panicking fails this call only.
    async fn call(&self, ctx: CallContext) -> anyhow::Result<()>;

    /// Runs inside the actor before its first call
    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs inside the actor after its last call
    async fn on_stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
