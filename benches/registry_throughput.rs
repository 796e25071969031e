use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use toolsmith::agent_server::{AgentServer, InvokeToolRequest, RegisterAgentRequest, SessionConfig};
use toolsmith::domain::{FunctionTool, Tool, ToolMetadata};
use toolsmith::learning::classify_error;
use toolsmith::learning::sanitize::sanitize;
use toolsmith::registry::{RegistryConfig, ToolRegistry};

fn bench_tool(i: usize) -> Arc<dyn Tool> {
    let metadata = ToolMetadata::new(format!("tool_{}", i), "Benchmark tool")
        .with_tags(["bench"]);
    Arc::new(FunctionTool::new(metadata, |input: serde_json::Value| async move { Ok(input) }))
}

fn benchmark_registry_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = ToolRegistry::new(RegistryConfig::default());
    rt.block_on(async {
        let tools = (0..500).map(bench_tool).collect();
        registry.register_batch(tools, "bench").await.unwrap();
    });

    c.bench_function("registry_get", |b| {
        b.to_async(&rt)
            .iter(|| async { registry.get(black_box("tool_250")).await.unwrap() });
    });

    c.bench_function("registry_list_tools", |b| {
        b.to_async(&rt).iter(|| async { registry.list_tools().await });
    });
}

fn benchmark_invoke_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = AgentServer::new(ToolRegistry::new(RegistryConfig::default()), SessionConfig::default());
    let session_id = rt.block_on(async {
        server
            .register_agent(RegisterAgentRequest {
                agent_id: "bench".into(),
                agent_name: "Bench".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .session_id
    });

    let mut group = c.benchmark_group("throughput");
    group.throughput(Throughput::Elements(1));
    group.bench_function("echo_invocations", |b| {
        b.to_async(&rt).iter(|| async {
            server
                .invoke_tool(
                    &session_id,
                    "echo",
                    InvokeToolRequest {
                        parameters: json!({ "message": "hi" }),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        });
    });
    group.finish();
}

fn benchmark_telemetry_helpers(c: &mut Criterion) {
    let message = "connection refused by upstream while calling alice@example.com";
    c.bench_function("classify_error", |b| {
        b.iter(|| classify_error(black_box(message)))
    });

    let payload = json!({
        "email": "alice@example.com",
        "card": "4111 1111 1111 1111",
        "notes": "x".repeat(8192),
    })
    .to_string();
    c.bench_function("sanitize_payload", |b| {
        b.iter(|| sanitize(black_box(&payload), 4096, true))
    });
}

criterion_group!(
    benches,
    benchmark_registry_lookup,
    benchmark_invoke_throughput,
    benchmark_telemetry_helpers
);
criterion_main!(benches);
