//! Outgoing calls before they are sent

use crate::error::{RpcError, RpcResult};
use codec::Object;
use schema::{Method, SchemaError};

/// A call being prepared: the resolved method, its target, and a parameter
/// struct in a fresh build message
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: Object,
    params: Object,
}

impl Request {
    pub(crate) fn new(method_name: &str, target: &Object) -> RpcResult<Self> {
        if !target.is_capability() {
            return Err(RpcError::not_a_capability(format!(
                "{} is a struct",
                target.node().display_name
            )));
        }
        let method = target
            .schema()
            .method(target.node_id(), method_name)
            .map_err(|e| match e {
                SchemaError::UnknownMethod { node, method } => RpcError::MethodNotFound {
                    interface: node,
                    method,
                },
                other => other.into(),
            })?
            .clone();
        let params = codec::set_root(method.param_struct, target.schema().clone())?;
        Ok(Self {
            method,
            target: target.clone(),
            params,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &Object {
        &self.target
    }

    /// Parameter struct to fill before sending
    pub fn params(&self) -> &Object {
        &self.params
    }

    pub(crate) fn into_parts(self) -> (Method, Object, Object) {
        (self.method, self.target, self.params)
    }
}
