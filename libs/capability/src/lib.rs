//! # capwire Capability - Actor-Backed Calls and Promise Pipelining
//!
//! ## Purpose
//!
//! Turns interface-typed objects into callable targets. Each started
//! capability is served by one actor task that runs its calls one at a time;
//! callers build a request, send it, and wait on the returned promise.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   send    ┌──────────────────────────┐
//! │ Caller               │──────────►│ Capability table entry   │
//! │ request / param      │           │  Local    → mailbox      │
//! │ send / wait          │           │  Promised → promise queue│
//! └──────────┬───────────┘           │  Broken   → fail at once │
//!            │ watch                 └────────────┬─────────────┘
//!            │                                    ▼
//! ┌──────────┴───────────┐           ┌──────────────────────────┐
//! │ Promise              │◄──────────│ Capability actor         │
//! │ Ok / Error / Timeout │  complete │ one worker task per call │
//! └──────────────────────┘           └──────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Calls on one capability never overlap.
//! - Calls queued on one promise reach the resolved target in issue order.
//! - A failing or panicking call fails only itself; the actor keeps serving.
//! - A timed-out wait gives up observing; the call still runs to completion.
//!
//! ## Example
//!
//! ```rust,ignore
//! let system = RpcSystem::new("calc");
//! let calc = system.start(CALCULATOR, Calculator::default(), schema.clone())?;
//!
//! let request = system.request("add", &calc)?;
//! system.param(&request).set("a", 2i64)?;
//! system.param(&request).set("b", 3i64)?;
//! let promise = system.send(request);
//!
//! match system.wait(&promise).await {
//!     WaitOutcome::Ok(results) => assert_eq!(results.get("sum")?, Value::Int64(5)),
//!     WaitOutcome::Error(e) => return Err(e.into()),
//!     WaitOutcome::Timeout => { /* wait again or give up */ }
//! }
//! ```

mod actor;
pub mod call;
pub mod capability;
pub mod config;
pub mod error;
pub mod metrics;
pub mod promise;
pub mod registry;
pub mod request;
pub mod server;
pub mod system;

pub use call::CallState;
pub use capability::{Capability, LocalCapability};
pub use config::RpcConfig;
pub use error::{RpcError, RpcResult};
pub use metrics::{RpcMetrics, RpcStats};
pub use promise::{Promise, PromiseCell, PromiseStatus, WaitOutcome};
pub use registry::{ActorId, ActorInfo};
pub use request::Request;
pub use server::{CallContext, Server};
pub use system::{Link, RpcSystem};
