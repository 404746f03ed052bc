//! End-to-end call tests against live capability actors
//!
//! Covers direct calls, pipelined calls on unresolved results, issue-order
//! replay, failure propagation, worker panics, timeouts, and the actor
//! lifecycle.

use anyhow::Context;
use async_trait::async_trait;
use capability::{
    CallContext, Promise, RpcConfig, RpcError, RpcSystem, Server, WaitOutcome,
};
use codec::{Object, Value};
use parking_lot::Mutex;
use schema::{InterfaceBuilder, NodeId, Schema, SchemaBuilder, StructBuilder, Type};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EMPTY: NodeId = 0x500;
const ADD_PARAMS: NodeId = 0x501;
const ADD_RESULTS: NodeId = 0x502;
const SLOW_PARAMS: NodeId = 0x503;
const MAKE_RESULTS: NodeId = 0x504;
const APPEND_PARAMS: NodeId = 0x505;
const ENTRIES_RESULTS: NodeId = 0x506;
const LOG_RESULTS: NodeId = 0x507;
const SQRT_PARAMS: NodeId = 0x508;

const CALC: NodeId = 0x600;
const FACTORY: NodeId = 0x601;
const LOG: NodeId = 0x602;
const SCIENTIFIC: NodeId = 0x603;

fn schema() -> Arc<Schema> {
    Arc::new(
        SchemaBuilder::new()
            .node(StructBuilder::new(EMPTY, "calc.Empty", 0, 0).build())
            .node(
                StructBuilder::new(ADD_PARAMS, "calc.AddParams", 2, 0)
                    .field("a", Type::Int64, 0)
                    .field("b", Type::Int64, 1)
                    .build(),
            )
            .node(
                StructBuilder::new(ADD_RESULTS, "calc.AddResults", 1, 0)
                    .field("sum", Type::Int64, 0)
                    .build(),
            )
            .node(
                StructBuilder::new(SLOW_PARAMS, "calc.SlowParams", 1, 0)
                    .field("ms", Type::UInt32, 0)
                    .build(),
            )
            .node(
                StructBuilder::new(MAKE_RESULTS, "calc.MakeResults", 0, 1)
                    .field("calc", Type::Interface(CALC), 0)
                    .build(),
            )
            .node(
                StructBuilder::new(LOG_RESULTS, "calc.LogResults", 0, 1)
                    .field("log", Type::Interface(LOG), 0)
                    .build(),
            )
            .node(
                StructBuilder::new(APPEND_PARAMS, "calc.AppendParams", 1, 0)
                    .field("n", Type::UInt32, 0)
                    .build(),
            )
            .node(
                StructBuilder::new(ENTRIES_RESULTS, "calc.EntriesResults", 0, 1)
                    .field("items", Type::list_of(Type::UInt32), 0)
                    .build(),
            )
            .node(
                StructBuilder::new(SQRT_PARAMS, "calc.SqrtParams", 1, 0)
                    .field("x", Type::Float64, 0)
                    .build(),
            )
            .node(
                InterfaceBuilder::new(CALC, "calc.Calculator")
                    .method("add", ADD_PARAMS, ADD_RESULTS)
                    .method("fail", EMPTY, EMPTY)
                    .method("crash", EMPTY, EMPTY)
                    .method("slow", SLOW_PARAMS, EMPTY)
                    .build(),
            )
            .node(
                InterfaceBuilder::new(FACTORY, "calc.Factory")
                    .method("make", EMPTY, MAKE_RESULTS)
                    .method("makeLog", EMPTY, LOG_RESULTS)
                    .method("refuse", EMPTY, MAKE_RESULTS)
                    .method("nothing", EMPTY, MAKE_RESULTS)
                    .build(),
            )
            .node(
                InterfaceBuilder::new(LOG, "calc.Log")
                    .method("append", APPEND_PARAMS, EMPTY)
                    .method("entries", EMPTY, ENTRIES_RESULTS)
                    .build(),
            )
            .node(
                InterfaceBuilder::new(SCIENTIFIC, "calc.Scientific")
                    .extends(CALC)
                    .method("sqrt", SQRT_PARAMS, ADD_RESULTS)
                    .build(),
            )
            .build()
            .unwrap(),
    )
}

#[derive(Default)]
struct Calculator {
    in_flight: AtomicU32,
    peak: Arc<AtomicU32>,
}

#[async_trait]
impl Server for Calculator {
    async fn call(&self, ctx: CallContext) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let outcome = self.dispatch(&ctx).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

impl Calculator {
    async fn dispatch(&self, ctx: &CallContext) -> anyhow::Result<()> {
        match ctx.method_name() {
            "add" => {
                let a = ctx.params().get("a")?.as_i64().context("a")?;
                let b = ctx.params().get("b")?.as_i64().context("b")?;
                ctx.results().set("sum", a + b)?;
            }
            "sqrt" => {
                let x = ctx.params().get("x")?.as_f64().context("x")?;
                ctx.results().set("sum", x.sqrt() as i64)?;
            }
            "fail" => anyhow::bail!("refused to compute"),
            "crash" => panic!("calculator exploded"),
            "slow" => {
                let ms = ctx.params().get("ms")?.as_u64().context("ms")?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            other => anyhow::bail!("unexpected method {other}"),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Log {
    entries: Mutex<Vec<u32>>,
}

#[async_trait]
impl Server for Log {
    async fn call(&self, ctx: CallContext) -> anyhow::Result<()> {
        match ctx.method_name() {
            "append" => {
                let n = ctx.params().get("n")?.as_u64().context("n")? as u32;
                self.entries.lock().push(n);
            }
            "entries" => {
                let entries = self.entries.lock().clone();
                ctx.results().set_list("items", entries)?;
            }
            other => anyhow::bail!("unexpected method {other}"),
        }
        Ok(())
    }
}

/// Hands out new capabilities after a delay, so callers see unresolved promises
struct Factory {
    system: RpcSystem,
    schema: Arc<Schema>,
    delay: Duration,
}

#[async_trait]
impl Server for Factory {
    async fn call(&self, ctx: CallContext) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        match ctx.method_name() {
            "make" => {
                let calc = self.system.start(CALC, Calculator::default(), self.schema.clone())?;
                ctx.results().set_capability("calc", &calc)?;
            }
            "makeLog" => {
                let log = self.system.start(LOG, Log::default(), self.schema.clone())?;
                ctx.results().set_capability("log", &log)?;
            }
            "refuse" => anyhow::bail!("factory closed"),
            "nothing" => {}
            other => anyhow::bail!("unexpected method {other}"),
        }
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start_factory(system: &RpcSystem, delay_ms: u64) -> Object {
    let schema = schema();
    let factory = Factory {
        system: system.clone(),
        schema: schema.clone(),
        delay: Duration::from_millis(delay_ms),
    };
    system.start(FACTORY, factory, schema).unwrap()
}

fn send_add(system: &RpcSystem, target: &Object, a: i64, b: i64) -> Promise {
    let request = system.request("add", target).unwrap();
    system.param(&request).set("a", a).unwrap();
    system.param(&request).set("b", b).unwrap();
    system.send(request)
}

fn send_empty(system: &RpcSystem, method: &str, target: &Object) -> Promise {
    system.send(system.request(method, target).unwrap())
}

fn sum_of(outcome: WaitOutcome) -> i64 {
    match outcome {
        WaitOutcome::Ok(results) => results.get("sum").unwrap().as_i64().unwrap(),
        other => panic!("call did not succeed: {other:?}"),
    }
}

#[tokio::test]
async fn test_direct_call_fills_results() {
    init_tracing();
    let system = RpcSystem::new("direct");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();

    let promise = send_add(&system, &calc, 2, 3);
    assert_eq!(sum_of(system.wait(&promise).await), 5);
    assert!(promise.is_done());

    let stats = system.stats();
    assert_eq!(stats.calls_dispatched, 1);
    assert_eq!(stats.calls_completed, 1);
    assert_eq!(stats.calls_failed, 0);
}

#[tokio::test]
async fn test_pipelined_call_matches_direct_call() {
    init_tracing();
    let system = RpcSystem::new("pipeline");
    let factory = start_factory(&system, 50);

    let made = send_empty(&system, "make", &factory);
    assert!(!made.is_done());
    let promised_calc = made.pipeline("calc").unwrap();
    let pipelined = send_add(&system, &promised_calc, 20, 22);

    let results = system.wait(&made).await.into_results().unwrap();
    let calc = results.get("calc").unwrap().into_object().unwrap();
    let direct = send_add(&system, &calc, 20, 22);

    let pipelined_sum = sum_of(system.wait(&pipelined).await);
    assert_eq!(pipelined_sum, sum_of(system.wait(&direct).await));
    assert_eq!(pipelined_sum, 42);
    assert_eq!(system.stats().calls_pipelined, 1);
}

#[tokio::test]
async fn test_pipelined_calls_replay_in_issue_order() {
    let system = RpcSystem::new("order");
    let factory = start_factory(&system, 30);

    let made = send_empty(&system, "makeLog", &factory);
    let log = made.pipeline("log").unwrap();
    for n in 1..=3u32 {
        let request = system.request("append", &log).unwrap();
        system.param(&request).set("n", n).unwrap();
        system.send(request);
    }
    let entries = send_empty(&system, "entries", &log);

    let results = system.wait(&entries).await.into_results().unwrap();
    let items: Vec<u64> = results
        .get("items")
        .unwrap()
        .into_list()
        .unwrap()
        .iter()
        .map(|v| v.unwrap().as_u64().unwrap())
        .collect();
    assert_eq!(items, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_repeated_pipeline_shares_one_queue() {
    let system = RpcSystem::new("shared");
    let factory = start_factory(&system, 30);

    let made = send_empty(&system, "makeLog", &factory);
    for n in 1..=4u32 {
        // a fresh pipeline object per call still targets the same promise
        let log = made.pipeline("log").unwrap();
        let request = system.request("append", &log).unwrap();
        system.param(&request).set("n", n).unwrap();
        system.send(request);
    }
    let entries = send_empty(&system, "entries", &made.pipeline("log").unwrap());
    let results = system.wait(&entries).await.into_results().unwrap();
    let items = results.get("items").unwrap().into_list().unwrap().to_vec().unwrap();
    assert_eq!(items, vec![Value::UInt32(1), Value::UInt32(2), Value::UInt32(3), Value::UInt32(4)]);
}

#[tokio::test]
async fn test_failed_promise_fails_pipelined_calls() {
    let system = RpcSystem::new("refuse");
    let factory = start_factory(&system, 10);

    let refused = send_empty(&system, "refuse", &factory);
    let pipelined = send_add(&system, &refused.pipeline("calc").unwrap(), 1, 1);

    match system.wait(&refused).await {
        WaitOutcome::Error(RpcError::CallFailed { method, reason }) => {
            assert_eq!(method, "refuse");
            assert!(reason.contains("factory closed"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(matches!(
        system.wait(&pipelined).await,
        WaitOutcome::Error(RpcError::PromiseNotFulfilled { .. })
    ));
}

#[tokio::test]
async fn test_null_result_capability_fails_pipelined_calls() {
    let system = RpcSystem::new("null");
    let factory = start_factory(&system, 0);

    let made = send_empty(&system, "nothing", &factory);
    let pipelined = send_add(&system, &made.pipeline("calc").unwrap(), 1, 1);
    match system.wait(&pipelined).await {
        WaitOutcome::Error(RpcError::PromiseNotFulfilled { reason }) => {
            assert!(reason.contains("Null capability"), "reason: {reason}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // calling the null field directly fails the same way, without a promise
    let results = system.wait(&made).await.into_results().unwrap();
    let null = results.get("calc").unwrap().into_object().unwrap();
    assert!(matches!(
        system.wait(&send_add(&system, &null, 1, 1)).await,
        WaitOutcome::Error(RpcError::NullCapability { .. })
    ));
}

#[tokio::test]
async fn test_worker_panic_is_reported_and_actor_survives() {
    init_tracing();
    let system = RpcSystem::new("panic");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();

    let crashed = send_empty(&system, "crash", &calc);
    match system.wait(&crashed).await {
        WaitOutcome::Error(RpcError::WorkerPanicked { method, reason }) => {
            assert_eq!(method, "crash");
            assert!(reason.contains("exploded"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert_eq!(sum_of(system.wait(&send_add(&system, &calc, 4, 4)).await), 8);
    assert_eq!(system.stats().worker_panics, 1);
}

#[tokio::test]
async fn test_implementation_error_is_call_failed() {
    let system = RpcSystem::new("fail");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();
    let failed = send_empty(&system, "fail", &calc);
    let outcome = system.wait(&failed).await;
    assert!(matches!(
        outcome.error(),
        Some(RpcError::CallFailed { reason, .. }) if reason.contains("refused")
    ));
    assert_eq!(system.stats().calls_failed, 1);
}

#[tokio::test]
async fn test_timeout_abandons_observation_only() {
    let system = RpcSystem::with_config(
        "timeout",
        RpcConfig::default().with_wait_timeout(Duration::from_millis(20)),
    );
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();

    let request = system.request("slow", &calc).unwrap();
    system.param(&request).set("ms", 150u32).unwrap();
    let slow = system.send(request);

    assert!(system.wait(&slow).await.is_timeout());
    assert!(!slow.is_done());
    let outcome = system.wait_timeout(&slow, Duration::from_secs(5)).await;
    assert!(outcome.is_ok(), "re-wait should see completion: {outcome:?}");
}

#[tokio::test]
async fn test_calls_on_one_capability_never_overlap() {
    let system = RpcSystem::new("serial");
    let calc = Calculator::default();
    let peak = Arc::clone(&calc.peak);
    let calc = system.start(CALC, calc, schema()).unwrap();

    let promises: Vec<Promise> = (0..5)
        .map(|_| {
            let request = system.request("slow", &calc).unwrap();
            system.param(&request).set("ms", 10u32).unwrap();
            system.send(request)
        })
        .collect();
    for promise in &promises {
        assert!(system.wait(promise).await.is_ok());
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_finishes_current_call_and_fails_queued() {
    let system = RpcSystem::new("stop");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();

    let request = system.request("slow", &calc).unwrap();
    system.param(&request).set("ms", 100u32).unwrap();
    let running = system.send(request);
    let queued = send_add(&system, &calc, 1, 2);
    tokio::time::sleep(Duration::from_millis(20)).await;

    system.stop(&calc).await.unwrap();
    assert!(system.wait(&running).await.is_ok());
    assert!(matches!(
        system.wait(&queued).await,
        WaitOutcome::Error(RpcError::CapabilityStopped { .. })
    ));
    assert!(matches!(
        system.wait(&send_add(&system, &calc, 1, 2)).await,
        WaitOutcome::Error(RpcError::CapabilityStopped { .. })
    ));
}

#[tokio::test]
async fn test_dropping_link_stops_actor() {
    let system = RpcSystem::new("link");
    let (calc, link) = system.start_link(CALC, Calculator::default(), schema()).unwrap();
    assert_eq!(sum_of(system.wait(&send_add(&system, &calc, 1, 1)).await), 2);

    drop(link);
    assert!(system.capabilities().is_empty());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(
        system.wait(&send_add(&system, &calc, 1, 1)).await,
        WaitOutcome::Error(RpcError::CapabilityStopped { .. })
    ));
}

#[tokio::test]
async fn test_detached_link_keeps_actor() {
    let system = RpcSystem::new("detach");
    let (calc, link) = system.start_link(CALC, Calculator::default(), schema()).unwrap();
    link.detach();
    assert_eq!(system.capabilities().len(), 1);
    assert_eq!(sum_of(system.wait(&send_add(&system, &calc, 3, 3)).await), 6);
    system.shutdown().await;
}

#[tokio::test]
async fn test_unknown_method_is_rejected_at_request() {
    let system = RpcSystem::new("unknown");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();
    match system.request("divide", &calc) {
        Err(RpcError::MethodNotFound { interface, method }) => {
            assert_eq!(interface, "calc.Calculator");
            assert_eq!(method, "divide");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_inherited_methods_dispatch_to_subclass() {
    let system = RpcSystem::new("inherit");
    let sci = system.start(SCIENTIFIC, Calculator::default(), schema()).unwrap();

    let request = system.request("add", &sci).unwrap();
    assert_eq!(request.method().interface_id, CALC);
    system.param(&request).set("a", 10i64).unwrap();
    system.param(&request).set("b", 5i64).unwrap();
    assert_eq!(sum_of(system.wait(&system.send(request)).await), 15);

    let request = system.request("sqrt", &sci).unwrap();
    system.param(&request).set("x", 81.0f64).unwrap();
    assert_eq!(sum_of(system.wait(&system.send(request)).await), 9);
}

#[tokio::test]
async fn test_pipeline_requires_interface_field() {
    let system = RpcSystem::new("fields");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();
    let promise = send_add(&system, &calc, 1, 1);
    let err = promise.pipeline("sum").unwrap_err();
    assert!(matches!(err, RpcError::Codec(e) if e.is_type_error()));
    assert!(matches!(promise.pipeline("missing"), Err(RpcError::Schema(_))));
}

#[tokio::test]
async fn test_zero_pipeline_depth_rejects_pipelining() {
    let system = RpcSystem::with_config("depth", RpcConfig::default().with_max_pipeline_depth(0));
    let factory = start_factory(&system, 0);
    let made = send_empty(&system, "make", &factory);
    let pipelined = send_add(&system, &made.pipeline("calc").unwrap(), 1, 1);
    assert!(matches!(
        system.wait(&pipelined).await,
        WaitOutcome::Error(RpcError::PipelineDepthExceeded { limit: 0 })
    ));
    assert!(system.wait(&made).await.is_ok());
}

#[tokio::test]
async fn test_capability_survives_copy_into_another_message() {
    let system = RpcSystem::new("copy");
    let calc = system.start(CALC, Calculator::default(), schema()).unwrap();

    let holder = codec::set_root(MAKE_RESULTS, schema()).unwrap();
    holder.set_capability("calc", &calc).unwrap();
    assert_eq!(holder.message().capability_count(), 1);

    let copied = holder.get("calc").unwrap().into_object().unwrap();
    assert_eq!(sum_of(system.wait(&send_add(&system, &copied, 7, 8)).await), 15);
}
