//! Runtime configuration and memory usage reporting

use super::create_test_context;
use qjs_core::{Context, JsValue, Runtime, RuntimeConfig};

#[test]
fn test_config_from_json_is_applied() {
    let config = RuntimeConfig::from_json(
        r#"{ "gc_threshold": 0, "memory_limit": 16777216, "max_stack_size": 65536 }"#,
    )
    .unwrap();
    assert_eq!(config.interrupt_poll_interval, RuntimeConfig::default().interrupt_poll_interval);

    let rt = Runtime::with_config(config.clone());
    assert_eq!(rt.config(), config);
    assert_eq!(rt.gc_threshold(), 0);
    assert_eq!(rt.max_stack_size(), 65536);

    rt.set_max_stack_size(1 << 20);
    rt.set_memory_limit(0);
    let updated = rt.config();
    assert_eq!(updated.max_stack_size, 1 << 20);
    assert_eq!(updated.memory_limit, 0);

    assert!(RuntimeConfig::from_json(r#"{ "gc_threshold": "lots" }"#).is_err());
}

#[test]
fn test_runtime_handles_share_state() {
    let rt = Runtime::new();
    let ctx = Context::new(&rt).unwrap();
    assert!(Runtime::ptr_eq(ctx.runtime(), &rt));
    assert!(!Runtime::ptr_eq(&Runtime::new(), &rt));

    rt.set_opaque(String::from("host state"));
    assert_eq!(
        ctx.runtime().opaque::<String>().as_deref().map(String::as_str),
        Some("host state")
    );
    let taken = rt.take_opaque().unwrap();
    assert_eq!(taken.downcast_ref::<String>().map(String::as_str), Some("host state"));
    assert!(rt.opaque::<String>().is_none());
}

#[test]
fn test_memory_usage_counts_live_data() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let arr = ctx
        .new_array_from(vec![JsValue::from("x"), JsValue::from(2)])
        .unwrap();
    let module = ctx.new_module("usage").unwrap();

    let usage = rt.memory_usage();
    assert_eq!(usage.realm_count, 1);
    assert_eq!(usage.module_count, 1);
    assert!(usage.obj_count > 0);
    assert!(usage.shape_count > 0);
    assert!(usage.atom_count > 0);
    assert!(usage.fast_array_count >= 1);
    assert!(usage.fast_array_elements >= 2);
    assert!(usage.malloc_size > 0);
    assert_eq!(usage.memory_used_count, rt.gc_stats().live_nodes);

    let json: serde_json::Value = serde_json::from_str(&usage.to_json()).unwrap();
    assert_eq!(json["realm_count"], 1);
    assert_eq!(json["module_count"], 1);

    let table = usage.to_string();
    assert!(table.starts_with("NAME"));
    assert!(table.contains("objects"));
    assert!(table.lines().last().unwrap().starts_with("realms"));

    drop(arr);
    drop(module);
}

#[test]
fn test_memory_limit_is_reported() {
    let ctx = create_test_context();
    ctx.runtime().set_memory_limit(64 << 20);
    let usage = ctx.runtime().memory_usage();
    assert_eq!(usage.malloc_limit, 64 << 20);
    assert!(usage.malloc_size <= usage.malloc_limit);
}
