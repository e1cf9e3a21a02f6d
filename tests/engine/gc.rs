//! Reference counting and cycle collection tests

use std::any::Any;
use std::cell::Cell;

use super::create_test_runtime;
use qjs_core::{ClassDef, ClassId, Context, GcKind, JsValue, PropFlags, Runtime};

thread_local! {
    static FINALIZED: Cell<usize> = const { Cell::new(0) };
}

fn count_finalizer(_opaque: Option<Box<dyn Any>>) {
    FINALIZED.with(|c| c.set(c.get() + 1));
}

fn finalized() -> usize {
    FINALIZED.with(Cell::get)
}

fn node_class(rt: &Runtime) -> ClassId {
    let id = rt.new_class_id();
    rt.register_class(id, ClassDef::new("Node").with_finalizer(count_finalizer))
        .unwrap();
    id
}

/// Context on a runtime that only collects when asked.
fn manual_gc_context() -> Context {
    let rt = create_test_runtime();
    rt.set_gc_threshold(0);
    Context::new(&rt).unwrap()
}

#[test]
fn test_two_node_cycle_needs_collection() {
    FINALIZED.with(|c| c.set(0));
    let ctx = manual_gc_context();
    let rt = ctx.runtime().clone();
    let class = node_class(&rt);

    let a = ctx.new_object_class(class, Some(Box::new("a"))).unwrap();
    let b = ctx.new_object_class(class, Some(Box::new("b"))).unwrap();
    ctx.define_property_value_str(&a, "next", JsValue::Object(b.clone()), PropFlags::C_W_E)
        .unwrap();
    ctx.define_property_value_str(&b, "next", JsValue::Object(a.clone()), PropFlags::C_W_E)
        .unwrap();

    let weak_a = a.downgrade();
    let weak_b = b.downgrade();
    let objects_before = rt.heap().live_count(GcKind::Object);
    drop(a);
    drop(b);

    // Each node is still held by the other
    assert!(weak_a.is_live());
    assert!(weak_b.is_live());
    assert_eq!(finalized(), 0);
    assert_eq!(rt.heap().live_count(GcKind::Object), objects_before);

    let stats = rt.run_gc();
    assert!(stats.freed >= 2);
    assert!(!weak_a.is_live());
    assert!(!weak_b.is_live());
    assert_eq!(finalized(), 2);
    assert!(rt.heap().live_count(GcKind::Object) <= objects_before - 2);

    // A second pass finds nothing new
    rt.run_gc();
    assert_eq!(finalized(), 2);
}

#[test]
fn test_acyclic_garbage_is_freed_without_collection() {
    FINALIZED.with(|c| c.set(0));
    let ctx = manual_gc_context();
    let class = node_class(ctx.runtime());

    let holder = ctx.new_object().unwrap();
    let node = ctx.new_object_class(class, None).unwrap();
    ctx.define_property_value_str(&holder, "child", JsValue::Object(node.clone()), PropFlags::C_W_E)
        .unwrap();
    let weak = node.downgrade();
    drop(node);
    assert!(weak.is_live());

    drop(holder);
    assert!(!weak.is_live());
    assert_eq!(finalized(), 1);
}

#[test]
fn test_cycle_with_outside_reference_survives() {
    FINALIZED.with(|c| c.set(0));
    let ctx = manual_gc_context();
    let rt = ctx.runtime().clone();
    let class = node_class(&rt);

    let a = ctx.new_object_class(class, None).unwrap();
    let b = ctx.new_object_class(class, None).unwrap();
    ctx.define_property_value_str(&a, "next", JsValue::Object(b.clone()), PropFlags::C_W_E)
        .unwrap();
    ctx.define_property_value_str(&b, "next", JsValue::Object(a.clone()), PropFlags::C_W_E)
        .unwrap();
    let weak_b = b.downgrade();
    drop(b);

    rt.run_gc();
    assert!(weak_b.is_live());
    assert_eq!(finalized(), 0);
    let next = ctx
        .get_property_str(&JsValue::Object(a.clone()), "next")
        .unwrap();
    assert!(next.as_object().is_some());
    drop(next);

    drop(a);
    rt.run_gc();
    assert!(!weak_b.is_live());
    assert_eq!(finalized(), 2);
}

#[test]
fn test_array_self_reference_is_collected() {
    let ctx = manual_gc_context();
    let rt = ctx.runtime().clone();
    let arr = ctx.new_array().unwrap();
    ctx.array_push(&arr, JsValue::Object(arr.clone())).unwrap();
    let weak = arr.downgrade();
    drop(arr);
    assert!(weak.is_live());
    rt.run_gc();
    assert!(!weak.is_live());
}

#[test]
fn test_closure_cycle_through_var_ref() {
    let ctx = manual_gc_context();
    let rt = ctx.runtime().clone();
    let bytecode = ctx
        .new_function_bytecode(qjs_core::FunctionBytecode {
            name: "inner".into(),
            arg_count: 1,
            ..Default::default()
        })
        .unwrap();
    let cell = ctx.new_var_ref(None).unwrap();
    let closure = ctx.new_closure(&bytecode, vec![cell.clone()]).unwrap();
    ctx.initialize_var_ref(&cell, JsValue::Object(closure.clone()));

    let weak = closure.downgrade();
    drop(closure);
    drop(cell);
    drop(bytecode);
    assert!(weak.is_live());
    rt.run_gc();
    assert!(!weak.is_live());
}

#[test]
fn test_dropped_context_is_fully_collected() {
    let rt = create_test_runtime();
    rt.set_gc_threshold(0);
    {
        let ctx = Context::new(&rt).unwrap();
        let obj = ctx.new_object().unwrap();
        ctx.set_property_str(&JsValue::Object(ctx.global_object()), "kept", JsValue::Object(obj))
            .unwrap();
        assert!(rt.heap().live_count(GcKind::Realm) == 1);
    }
    rt.run_gc();
    assert_eq!(rt.heap().live_count(GcKind::Realm), 0);
    assert_eq!(rt.heap().live_count(GcKind::Object), 0);
    assert_eq!(rt.heap().live_count(GcKind::Shape), 0);
}

#[test]
fn test_automatic_threshold_adapts() {
    let rt = create_test_runtime();
    rt.set_gc_threshold(1);
    let ctx = Context::new(&rt).unwrap();
    for _ in 0..16 {
        let obj = ctx.new_object().unwrap();
        ctx.set_property_str(&JsValue::Object(obj.clone()), "self", JsValue::Object(obj))
            .unwrap();
    }
    let stats = rt.gc_stats();
    assert!(stats.collections > 0);
    assert!(stats.gc_threshold >= 1);
}
