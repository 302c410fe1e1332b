//! End-to-end tests: parse, generate, store, run.

use super::*;
use crate::blocks::parse_blocks;
use crate::codegen::CodeGenerator;
use crate::config::RetryPolicy;
use crate::errors::FunctionError;
use crate::events::CollectingEventSink;
use crate::functions::{BlockFunction, FnBlock, PassThrough, PythonInterpreter};
use crate::store::InMemoryFunctionStore;
use crate::testing::{CountingStore, MockGenerationService};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn set_x() -> Arc<dyn BlockFunction> {
    Arc::new(FnBlock::new("block_1", |mut ctx: Context| {
        ctx.insert("x", json!(1));
        Ok(ctx)
    }))
}

fn double_x() -> Arc<dyn BlockFunction> {
    Arc::new(FnBlock::new("block_2", |mut ctx: Context| {
        let x = ctx
            .get_i64("x")
            .ok_or_else(|| FunctionError::new("KeyError", "'x'"))?;
        ctx.insert("y", json!(x * 2));
        Ok(ctx)
    }))
}

fn total() -> Arc<dyn BlockFunction> {
    Arc::new(FnBlock::new("block_3", |mut ctx: Context| {
        let x = ctx.get_i64("x").unwrap_or(0);
        let y = ctx.get_i64("y").unwrap_or(0);
        ctx.insert("total", json!(x * y));
        Ok(ctx)
    }))
}

fn failing(name: &'static str) -> Arc<dyn BlockFunction> {
    Arc::new(FnBlock::new(name, |_ctx: Context| {
        Err(FunctionError::new("ZeroDivisionError", "division by zero"))
    }))
}

fn store_with(functions: Vec<Arc<dyn BlockFunction>>) -> Arc<CountingStore<InMemoryFunctionStore>> {
    let store = InMemoryFunctionStore::new();
    for f in functions {
        store.register(f);
    }
    Arc::new(CountingStore::new(store))
}

const NAMES: [&str; 3] = ["block_1", "block_2", "block_3"];

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_shared_context_flows_through_blocks() {
    let store = store_with(vec![set_x(), double_x(), total()]);
    let orchestrator = Orchestrator::new(store);

    let ctx = orchestrator.run_pipeline(&NAMES).await.unwrap();
    assert_eq!(ctx.to_value(), json!({"x": 1, "y": 2, "total": 2}));
}

#[tokio::test]
async fn test_failure_stops_run_and_reports_partial_context() {
    let store = store_with(vec![set_x(), failing("block_2"), total()]);
    let orchestrator = Orchestrator::new(store.clone());

    let report = orchestrator.run_pipeline_with_report(&NAMES).await;
    let states: Vec<_> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
        states,
        vec![BlockState::Executed, BlockState::ExecFailed, BlockState::Pending]
    );
    assert_eq!(report.completed(), vec!["block_1"]);

    match report.into_result() {
        Err(BlockflowError::Execution(e)) => {
            assert_eq!(e.block, "block_2");
            assert_eq!(e.cause.error_type, "ZeroDivisionError");
            assert_eq!(e.partial_context.to_value(), json!({"x": 1}));
            assert_eq!(e.completed, vec!["block_1".to_string()]);
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_eq!(store.load_count("block_2"), 1);
    assert_eq!(store.load_count("block_3"), 0);
}

#[tokio::test]
async fn test_missing_block_is_not_found() {
    let store = store_with(vec![]);
    let orchestrator = Orchestrator::new(store);

    let report = orchestrator.run_pipeline_with_report(&["missing_block"]).await;
    assert_eq!(report.outcomes[0].state, BlockState::LoadFailed);

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, BlockflowError::NotFound(ref e) if e.name == "missing_block"));
    assert_eq!(err.block_name(), Some("missing_block"));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let store = store_with(vec![set_x(), double_x(), total()]);
    let orchestrator = Orchestrator::new(store);

    let first = orchestrator.run_pipeline(&NAMES).await.unwrap();
    let second = orchestrator.run_pipeline(&NAMES).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_pipeline_returns_empty_context() {
    let orchestrator = Orchestrator::new(store_with(vec![]));
    let names: [&str; 0] = [];
    assert!(orchestrator.run_pipeline(&names).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancellation_between_blocks() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let cancel_after_x: Arc<dyn BlockFunction> = Arc::new(FnBlock::new("block_1", move |mut ctx: Context| {
        ctx.insert("x", json!(1));
        trigger.cancel("user interrupt");
        Ok(ctx)
    }));

    let store = store_with(vec![cancel_after_x, double_x(), total()]);
    let orchestrator = Orchestrator::new(store.clone()).with_cancellation(token);

    let report = orchestrator.run_pipeline_with_report(&NAMES).await;
    let states: Vec<_> = report.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
        states,
        vec![BlockState::Executed, BlockState::Cancelled, BlockState::Cancelled]
    );

    match report.into_result() {
        Err(BlockflowError::Cancelled(e)) => {
            assert_eq!(e.reason, "user interrupt");
            assert_eq!(e.next_block.as_deref(), Some("block_2"));
            assert_eq!(e.last_completed.as_deref(), Some("block_1"));
            assert_eq!(e.context.to_value(), json!({"x": 1}));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(store.load_count("block_2"), 0);
}

#[tokio::test]
async fn test_events_follow_block_order() {
    let sink = Arc::new(CollectingEventSink::new());
    let pass: Arc<dyn BlockFunction> = Arc::new(PassThrough::new("block_2"));
    let store = store_with(vec![set_x(), pass]);
    let orchestrator = Orchestrator::new(store).with_event_sink(sink.clone());

    let report = orchestrator
        .run_pipeline_with_report(&["block_1", "block_2"])
        .await;
    assert!(report.is_success());
    assert_eq!(report.context().and_then(|c| c.get_i64("x")), Some(1));

    assert_eq!(
        sink.types(),
        vec![
            events::PIPELINE_STARTED,
            events::BLOCK_LOADED,
            events::BLOCK_COMPLETED,
            events::BLOCK_LOADED,
            events::BLOCK_COMPLETED,
            events::PIPELINE_COMPLETED,
        ]
    );

    let summary = report.to_json();
    assert_eq!(summary["success"], true);
    assert_eq!(summary["blocks"][1]["state"], "executed");
    assert_eq!(summary["context"], json!({"x": 1}));
}

#[tokio::test]
async fn test_parse_generate_and_run_with_mixed_functions() {
    let text = "### Block 1: Seed\nSet x to 1.\n\n### Block 2: Double\nSet y to twice x.\n";
    let blocks = parse_blocks(text).unwrap();

    // Generation only needs to cover block_1; block_2 is native.
    let service = Arc::new(MockGenerationService::passthrough());
    let generator = CodeGenerator::new(service.clone());
    let store = Arc::new(InMemoryFunctionStore::new());

    let report = generator.build(&blocks[..1], store.as_ref()).await.unwrap();
    assert!(report.is_complete());
    assert!(store.source("block_1").is_some());
    store.register(set_x());
    store.register(double_x());

    let ctx = Orchestrator::new(store)
        .run_pipeline(&["block_1", "block_2"])
        .await
        .unwrap();
    assert_eq!(ctx.to_value(), json!({"x": 1, "y": 2}));
    assert_eq!(service.call_count(), 1);
}

#[tokio::test]
async fn test_generated_python_pipeline() {
    if !python_available() {
        return;
    }
    let text = "\
# Block 1: Seed
Set x to 1.

# Block 2: Double
Set y to twice x.

# Block 3: Total
Store x times y in total.
";
    let blocks = parse_blocks(text).unwrap();
    let service = Arc::new(
        MockGenerationService::new()
            .with_code(
                "block_1",
                "```python\ndef block_1(context: dict) -> dict:\n    context['x'] = 1\n    return context\n```",
            )
            .with_code(
                "block_2",
                "def block_2(context: dict) -> dict:\n    context['y'] = context['x'] * 2\n    return context\n",
            )
            .with_code(
                "block_3",
                "Here it is:\n```py\ndef block_3(context):\n    context['total'] = context['x'] * context['y']\n    return context\n```",
            ),
    );
    let interpreter = Arc::new(PythonInterpreter::new("python3").with_timeout(Duration::from_secs(30)));
    let store = Arc::new(InMemoryFunctionStore::with_interpreter(interpreter));

    let generator = CodeGenerator::new(service);
    let report = generator.build(&blocks, store.as_ref()).await.unwrap();
    assert_eq!(report.built.len(), 3);

    let names: Vec<_> = blocks.iter().map(|b| b.name().to_string()).collect();
    let ctx = Orchestrator::new(store).run_pipeline(&names).await.unwrap();
    assert_eq!(ctx.to_value(), json!({"x": 1, "y": 2, "total": 2}));
}

#[tokio::test]
async fn test_python_failure_names_block_and_keeps_partial_context() {
    if !python_available() {
        return;
    }
    let service = Arc::new(
        MockGenerationService::passthrough().with_code(
            "block_2",
            "def block_2(context):\n    return {'y': context['missing'] * 2}\n",
        ),
    );
    let store = Arc::new(CountingStore::new(InMemoryFunctionStore::new()));
    store.inner().register(set_x());

    let blocks = parse_blocks("## one\nseed\n## two\nbreaks\n## three\nnever runs\n").unwrap();
    let generator = CodeGenerator::new(service);
    generator.build(&blocks[1..], store.as_ref()).await.unwrap();

    let err = Orchestrator::new(store.clone())
        .run_pipeline(&NAMES)
        .await
        .unwrap_err();
    match err {
        BlockflowError::Execution(e) => {
            assert_eq!(e.block, "block_2");
            assert_eq!(e.cause.error_type, "KeyError");
            assert_eq!(e.partial_context.to_value(), json!({"x": 1}));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
    assert_eq!(store.load_count("block_3"), 0);
}

#[tokio::test]
async fn test_stub_keeps_pipeline_runnable() {
    if !python_available() {
        return;
    }
    let service = Arc::new(MockGenerationService::new());
    let generator = CodeGenerator::new(service)
        .with_retry_policy(RetryPolicy::new().with_max_attempts(2).with_base_delay_ms(1).with_jitter(false))
        .with_stub_on_failure(true);
    let store = Arc::new(InMemoryFunctionStore::new());
    store.register(set_x());

    let blocks = parse_blocks("## a\nseed\n## b\nunclear request\n").unwrap();
    let report = generator.build(&blocks[1..], store.as_ref()).await.unwrap();
    assert_eq!(report.stub_count(), 1);
    assert_eq!(report.built[0].attempts, 2);

    let ctx = Orchestrator::new(store)
        .run_pipeline(&["block_1", "block_2"])
        .await
        .unwrap();
    assert_eq!(ctx.to_value(), json!({"x": 1}));
}
