use super::*;
use crate::domain::FunctionTool;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

fn tool(name: &str) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        ToolMetadata::new(name, format!("{} tool", name)).with_tags(["test"]),
        |input: Value| async move { Ok(input) },
    ))
}

fn empty_registry() -> ToolRegistry {
    ToolRegistry::new(RegistryConfig {
        builtin_tools: false,
        ..Default::default()
    })
}

type Seen = Arc<Mutex<Vec<(ToolRegistryEventType, String)>>>;

async fn recording_handler(registry: &ToolRegistry) -> (HandlerId, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = registry
        .add_event_handler(move |event| {
            sink.lock()
                .unwrap()
                .push((event.event_type, event.tool_name.clone()));
        })
        .await;
    (id, seen)
}

async fn wait_for_events(seen: &Seen, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while seen.lock().unwrap().len() < expected {
        if tokio::time::Instant::now() > deadline {
            panic!(
                "expected {} events, saw {:?}",
                expected,
                seen.lock().unwrap()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_builtins_registered_at_construction() {
    let registry = ToolRegistry::default();

    assert_eq!(registry.count().await, 2);
    assert_eq!(registry.get_source(ECHO_TOOL).await.unwrap(), BUILTIN_SOURCE);
    assert_eq!(registry.get_source(STATUS_TOOL).await.unwrap(), BUILTIN_SOURCE);

    let echo = registry.get(ECHO_TOOL).await.unwrap();
    let out = echo.execute(json!({ "hello": "world" })).await.unwrap();
    assert_eq!(out, json!({ "hello": "world" }));
}

#[tokio::test]
async fn test_status_tool_reports_registry_size() {
    let registry = ToolRegistry::default();
    registry.register(tool("extra")).await.unwrap();

    let status = registry.get(STATUS_TOOL).await.unwrap();
    let out = status.execute(json!({})).await.unwrap();
    assert_eq!(out["status"], "ok");
    assert_eq!(out["tool_count"], 3);
}

#[tokio::test]
async fn test_register_rejects_empty_name() {
    let registry = empty_registry();
    let err = registry.register(tool("  ")).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidTool(_)));
    assert_eq!(registry.count().await, 0);
}

#[tokio::test]
async fn test_register_defaults_source_and_version() {
    let registry = empty_registry();
    registry.register(tool("plain")).await.unwrap();

    assert_eq!(registry.get_source("plain").await.unwrap(), DEFAULT_SOURCE);
    assert_eq!(registry.get_version("plain").await.unwrap(), DEFAULT_VERSION);
}

#[tokio::test]
async fn test_replace_does_not_increase_count() {
    let registry = empty_registry();
    for name in ["a", "b", "c"] {
        registry.register_with_source(tool(name), "openapi", "1.0.0").await.unwrap();
    }
    for _ in 0..4 {
        registry.register_with_source(tool("b"), "openapi", "2.0.0").await.unwrap();
    }

    assert_eq!(registry.count().await, 3);
    assert_eq!(registry.get_version("b").await.unwrap(), "2.0.0");
}

#[tokio::test]
async fn test_replace_keeps_creation_time() {
    let registry = empty_registry();
    registry.register_with_source(tool("t"), "openapi", "1").await.unwrap();
    let first = registry.get_metadata("t").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    registry.register_with_source(tool("t"), "openapi", "2").await.unwrap();
    let second = registry.get_metadata("t").await.unwrap();

    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at > first.updated_at);
}

#[tokio::test]
async fn test_batch_with_invalid_tool_registers_nothing() {
    let registry = empty_registry();
    let batch = vec![tool("one"), tool(""), tool("three")];

    let err = registry.register_batch(batch, "openapi-a").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidTool(_)));
    assert_eq!(registry.count().await, 0);
    assert!(registry.get("one").await.is_err());
    assert!(registry.get("three").await.is_err());
}

#[tokio::test]
async fn test_batch_registers_all_under_source() {
    let registry = empty_registry();
    let count = registry
        .register_batch(vec![tool("x"), tool("y")], "openapi-a")
        .await
        .unwrap();

    assert_eq!(count, 2);
    let listed = registry.list_tools_by_source("openapi-a").await;
    let names: Vec<&str> = listed.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y"]);
}

#[tokio::test]
async fn test_unregister_by_source_is_isolated() {
    let registry = empty_registry();
    registry.register_with_source(tool("t1"), "A", "1").await.unwrap();
    registry.register_with_source(tool("t2"), "A", "1").await.unwrap();
    registry.register_with_source(tool("t3"), "B", "1").await.unwrap();

    let removed = registry.unregister_by_source("A").await;

    assert_eq!(removed, 2);
    assert!(registry.get("t1").await.is_err());
    assert!(registry.get("t2").await.is_err());
    assert!(registry.get("t3").await.is_ok());
    assert_eq!(registry.unregister_by_source("A").await, 0);
}

#[tokio::test]
async fn test_reregister_under_other_source_reassigns_ownership() {
    let registry = empty_registry();
    registry.register_with_source(tool("shared"), "A", "1").await.unwrap();
    registry.register_with_source(tool("shared"), "B", "1").await.unwrap();

    assert_eq!(registry.count().await, 1);
    assert_eq!(registry.get_source("shared").await.unwrap(), "B");
    assert_eq!(registry.unregister_by_source("A").await, 0);
    assert!(registry.get("shared").await.is_ok());
}

#[tokio::test]
async fn test_lookups_of_missing_tool_fail() {
    let registry = empty_registry();
    assert!(matches!(
        registry.get("nope").await,
        Err(RegistryError::ToolNotFound(_))
    ));
    assert!(registry.get_version("nope").await.is_err());
    assert!(registry.get_source("nope").await.is_err());
    assert!(matches!(
        registry.unregister("nope").await,
        Err(RegistryError::ToolNotFound(_))
    ));
}

#[tokio::test]
async fn test_sources_and_stats() {
    let registry = ToolRegistry::default();
    registry.register_with_source(tool("a"), "petstore", "1").await.unwrap();
    registry.register_with_source(tool("b"), "petstore", "1").await.unwrap();

    let sources = registry.get_tool_sources().await;
    assert_eq!(sources.get("petstore"), Some(&2));
    assert_eq!(sources.get(BUILTIN_SOURCE), Some(&2));

    let stats = registry.get_registry_stats().await;
    assert_eq!(stats.total_tools, 4);
    assert_eq!(stats.tags.get("test"), Some(&2));
    assert_eq!(stats.tags.get("diagnostic"), Some(&2));
    assert!(stats.last_updated.is_some());
}

#[tokio::test]
async fn test_events_added_updated_removed_once_each() {
    let registry = empty_registry();
    let (_, seen) = recording_handler(&registry).await;

    registry.register(tool("evt")).await.unwrap();
    registry.register(tool("evt")).await.unwrap();
    registry.unregister("evt").await.unwrap();

    wait_for_events(&seen, 3).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (ToolRegistryEventType::Added, "evt".to_string()),
            (ToolRegistryEventType::Updated, "evt".to_string()),
            (ToolRegistryEventType::Removed, "evt".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_every_handler_gets_each_event() {
    let registry = empty_registry();
    let (_, first) = recording_handler(&registry).await;
    let (_, second) = recording_handler(&registry).await;

    registry.register(tool("fanout")).await.unwrap();

    wait_for_events(&first, 1).await;
    wait_for_events(&second, 1).await;
    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_removed_handler_gets_nothing_further() {
    let registry = empty_registry();
    let (id, seen) = recording_handler(&registry).await;

    registry.register(tool("before")).await.unwrap();
    wait_for_events(&seen, 1).await;

    assert!(registry.remove_event_handler(id).await);
    registry.register(tool("after")).await.unwrap();
    registry.unregister("before").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(!registry.remove_event_handler(id).await);
    assert!(!registry.remove_event_handler(9999).await);
}

#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let registry = empty_registry();
    registry
        .add_event_handler(|_event| panic!("subscriber bug"))
        .await;
    let (_, seen) = recording_handler(&registry).await;

    registry.register(tool("p1")).await.unwrap();
    registry.register(tool("p2")).await.unwrap();

    wait_for_events(&seen, 2).await;
    assert_eq!(registry.count().await, 2);

    // Permits are returned even when the handler unwinds.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.available_handler_permits(), 50);
}

#[tokio::test]
async fn test_batch_events_follow_mutation_order() {
    let registry = empty_registry();
    let (_, seen) = recording_handler(&registry).await;

    registry
        .register_batch(vec![tool("b1"), tool("b2"), tool("b3")], "s")
        .await
        .unwrap();
    registry.unregister_by_source("s").await;

    wait_for_events(&seen, 6).await;
    let seen = seen.lock().unwrap().clone();
    let kinds: Vec<ToolRegistryEventType> = seen.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(&kinds[..3], &[ToolRegistryEventType::Added; 3]);
    assert_eq!(&kinds[3..], &[ToolRegistryEventType::Removed; 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_then_get() {
    let registry = empty_registry();
    let n = 100;

    let mut writers = Vec::new();
    for i in 0..n {
        let registry = registry.clone();
        writers.push(tokio::spawn(async move {
            registry.register(tool(&format!("tool_{}", i))).await
        }));
    }
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let mut readers = Vec::new();
    for i in 0..n {
        let registry = registry.clone();
        readers.push(tokio::spawn(async move {
            registry.get(&format!("tool_{}", i)).await.map(|t| t.name().to_string())
        }));
    }
    for (i, reader) in readers.into_iter().enumerate() {
        assert_eq!(reader.await.unwrap().unwrap(), format!("tool_{}", i));
    }
    assert_eq!(registry.count().await, n);
}

#[tokio::test]
async fn test_replace_source_swaps_set_in_one_step() {
    let registry = empty_registry();
    registry
        .register_batch(vec![tool("keep"), tool("stale")], "config")
        .await
        .unwrap();
    registry.register_with_source(tool("other"), "openapi", "1").await.unwrap();
    let (_, seen) = recording_handler(&registry).await;

    let count = registry
        .replace_source(vec![tool("keep"), tool("fresh")], "config")
        .await
        .unwrap();

    assert_eq!(count, 2);
    let listed = registry.list_tools_by_source("config").await;
    let names: Vec<&str> = listed.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["fresh", "keep"]);
    assert_eq!(registry.get_source("other").await.unwrap(), "openapi");

    wait_for_events(&seen, 3).await;
    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (ToolRegistryEventType::Removed, "stale".to_string()),
            (ToolRegistryEventType::Updated, "keep".to_string()),
            (ToolRegistryEventType::Added, "fresh".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_replace_source_with_invalid_tool_changes_nothing() {
    let registry = empty_registry();
    registry
        .register_batch(vec![tool("a"), tool("b")], "config")
        .await
        .unwrap();

    let err = registry
        .replace_source(vec![tool("c"), tool(" ")], "config")
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::InvalidTool(_)));
    assert_eq!(registry.count().await, 2);
    assert!(registry.contains("a").await);
    assert!(!registry.contains("c").await);
}

#[tokio::test]
async fn test_full_handler_queue_drops_and_counts() {
    let registry = ToolRegistry::new(RegistryConfig {
        builtin_tools: false,
        handler_queue_size: 1,
        ..Default::default()
    });
    let (_, seen) = recording_handler(&registry).await;

    // The batch is queued without yielding, so only the first event fits.
    let batch = (0..5).map(|i| tool(&format!("q{}", i))).collect();
    registry.register_batch(batch, "s").await.unwrap();

    assert_eq!(registry.dropped_events(), 4);
    assert_eq!(registry.count().await, 5);
    wait_for_events(&seen, 1).await;

    registry.unregister("q0").await.unwrap();
    wait_for_events(&seen, 2).await;
    assert_eq!(registry.dropped_events(), 4);
    assert_eq!(
        seen.lock().unwrap()[1],
        (ToolRegistryEventType::Removed, "q0".to_string())
    );
}
