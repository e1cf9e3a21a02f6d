//! Module records and namespace objects

use super::{create_test_context, take_error};
use qjs_core::{ErrorKind, GpnFlags, JsValue, PropFlags, SetOutcome};

#[test]
fn test_module_registration() {
    let ctx = create_test_context();
    let module = ctx.new_module("lib/math").unwrap();
    assert_eq!(module.borrow().name().to_utf8(), "lib/math");
    let found = ctx.find_module("lib/math").unwrap();
    assert!(qjs_core::Gc::ptr_eq(&found, &module));
    assert!(ctx.find_module("lib/other").is_none());

    // Registering the same name again replaces the record
    let newer = ctx.new_module("lib/math").unwrap();
    let found = ctx.find_module("lib/math").unwrap();
    assert!(qjs_core::Gc::ptr_eq(&found, &newer));
}

#[test]
fn test_namespace_is_a_live_view() {
    let ctx = create_test_context();
    let module = ctx.new_module("counter").unwrap();
    let cell = ctx
        .add_module_export(&module, "count", Some(JsValue::from(1)))
        .unwrap();
    let ns = ctx.module_namespace(&module).unwrap();
    let view = JsValue::Object(ns.clone());
    assert_eq!(ctx.get_property_str(&view, "count").unwrap(), JsValue::from(1));

    ctx.set_module_export(&module, "count", JsValue::from(2)).unwrap();
    assert_eq!(ctx.get_property_str(&view, "count").unwrap(), JsValue::from(2));

    ctx.set_var_ref(&cell, JsValue::from(3)).unwrap();
    assert_eq!(ctx.get_property_str(&view, "count").unwrap(), JsValue::from(3));

    // The namespace is cached
    let again = ctx.module_namespace(&module).unwrap();
    assert!(qjs_core::Gc::ptr_eq(&again, &ns));
}

#[test]
fn test_namespace_shape() {
    let ctx = create_test_context();
    let module = ctx.new_module("shapes").unwrap();
    for name in ["zeta", "alpha", "mid"] {
        ctx.add_module_export(&module, name, Some(JsValue::from(name)))
            .unwrap();
    }
    let exported: Vec<String> = module
        .borrow()
        .export_names()
        .map(|n| n.to_utf8())
        .collect();
    assert_eq!(exported, vec!["zeta", "alpha", "mid"]);

    let ns = ctx.module_namespace(&module).unwrap();
    let names = ctx
        .get_own_property_names(&ns, GpnFlags::STRING_MASK | GpnFlags::ENUM_ONLY)
        .unwrap();
    let keys: Vec<String> = names
        .iter()
        .map(|e| ctx.atom_to_string(e.atom).to_utf8())
        .collect();
    ctx.free_property_names(names);
    assert_eq!(keys, vec!["alpha", "mid", "zeta"]);

    let view = JsValue::Object(ns.clone());
    assert_eq!(ctx.to_string(&view).unwrap(), "[object Module]");
    assert!(ctx.get_prototype(&ns).is_none());
    assert!(!ctx.is_extensible(&ns));
}

#[test]
fn test_namespace_is_read_only() {
    let ctx = create_test_context();
    let module = ctx.new_module("frozen").unwrap();
    ctx.add_module_export(&module, "value", Some(JsValue::from(1)))
        .unwrap();
    let ns = ctx.module_namespace(&module).unwrap();
    let view = JsValue::Object(ns.clone());

    let value_atom = ctx.runtime().new_atom("value");
    let outcome = ctx
        .set_property(&view, value_atom, JsValue::from(5), PropFlags::empty())
        .unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
    assert!(!ctx.delete_property(&ns, value_atom).unwrap());
    ctx.runtime().free_atom(value_atom);
    assert_eq!(ctx.get_property_str(&view, "value").unwrap(), JsValue::from(1));

    let fresh = ctx.runtime().new_atom("fresh");
    let outcome = ctx
        .set_property(&view, fresh, JsValue::from(5), PropFlags::empty())
        .unwrap();
    ctx.runtime().free_atom(fresh);
    assert_ne!(outcome, SetOutcome::Done);

    // Exports are fixed once the namespace exists
    let err = ctx.add_module_export(&module, "late", None).unwrap_err();
    assert_eq!(take_error(&ctx, err).0, ErrorKind::TypeError);
}

#[test]
fn test_export_errors() {
    let ctx = create_test_context();
    let module = ctx.new_module("errors").unwrap();
    ctx.add_module_export(&module, "x", None).unwrap();

    let err = ctx.add_module_export(&module, "x", None).unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::SyntaxError);
    assert_eq!(message, "duplicate exported name 'x'");

    let err = ctx
        .set_module_export(&module, "missing", JsValue::from(1))
        .unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::ReferenceError);
    assert_eq!(message, "'missing' is not exported");

    // Reading a binding before it is initialized
    let view = JsValue::Object(ctx.module_namespace(&module).unwrap());
    let err = ctx.get_property_str(&view, "x").unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::ReferenceError);
    assert_eq!(message, "x is not initialized");

    ctx.set_module_export(&module, "x", JsValue::from("ready")).unwrap();
    assert_eq!(ctx.get_property_str(&view, "x").unwrap(), JsValue::from("ready"));
}
