//! Shape sharing and transition tests

use super::create_test_context;
use qjs_core::{Gc, JsObjectRef, JsValue};

fn add(ctx: &qjs_core::Context, obj: &JsObjectRef, name: &str, n: i32) {
    ctx.set_property_str(&JsValue::Object(obj.clone()), name, JsValue::from(n))
        .unwrap();
}

fn same_shape(a: &JsObjectRef, b: &JsObjectRef) -> bool {
    Gc::ptr_eq(a.borrow().shape(), b.borrow().shape())
}

#[test]
fn test_same_additions_share_shape() {
    let ctx = create_test_context();
    let proto = ctx.new_object().unwrap();

    let a = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &a, "x", 1);
    add(&ctx, &a, "y", 2);

    let b = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &b, "x", 3);
    add(&ctx, &b, "y", 4);

    assert!(same_shape(&a, &b));
    assert_eq!(b.borrow().shape().borrow().id(), a.borrow().shape().borrow().id());
    assert_eq!(b.borrow().shape().ref_count(), 2);

    // Values stay per object
    let bx = ctx.get_property_str(&JsValue::Object(b.clone()), "x").unwrap();
    assert_eq!(bx, JsValue::from(3));
}

#[test]
fn test_different_order_or_proto_do_not_share() {
    let ctx = create_test_context();
    let proto = ctx.new_object().unwrap();

    let a = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &a, "x", 1);
    add(&ctx, &a, "y", 2);

    let reversed = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &reversed, "y", 1);
    add(&ctx, &reversed, "x", 2);
    assert!(!same_shape(&a, &reversed));

    let other_proto = ctx.new_object().unwrap();
    let c = ctx.new_object_proto(Some(&other_proto)).unwrap();
    add(&ctx, &c, "x", 1);
    add(&ctx, &c, "y", 2);
    assert!(!same_shape(&a, &c));
}

#[test]
fn test_divergent_transition_keeps_shared_prefix_intact() {
    let ctx = create_test_context();
    let proto = ctx.new_object().unwrap();

    let a = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &a, "x", 1);
    add(&ctx, &a, "y", 2);
    let b = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &b, "x", 1);
    add(&ctx, &b, "y", 2);
    assert!(same_shape(&a, &b));

    // Extending a shared shape leaves the other object's layout alone
    add(&ctx, &b, "z", 3);
    assert!(!same_shape(&a, &b));
    assert_eq!(a.borrow().shape().borrow().prop_count(), 2);
    assert_eq!(b.borrow().shape().borrow().prop_count(), 3);
    assert_eq!(a.borrow().shape().ref_count(), 1);

    let c = ctx.new_object_proto(Some(&proto)).unwrap();
    add(&ctx, &c, "x", 1);
    add(&ctx, &c, "y", 2);
    add(&ctx, &c, "z", 3);
    assert!(same_shape(&b, &c));
}

#[test]
fn test_delete_on_shared_shape_copies() {
    let ctx = create_test_context();
    let a = ctx.new_object().unwrap();
    add(&ctx, &a, "p", 1);
    add(&ctx, &a, "q", 2);
    let b = ctx.new_object().unwrap();
    add(&ctx, &b, "p", 1);
    add(&ctx, &b, "q", 2);
    assert!(same_shape(&a, &b));

    let rt = ctx.runtime();
    let q = rt.new_atom("q");
    assert!(ctx.delete_property(&a, q).unwrap());
    assert!(!same_shape(&a, &b));
    assert!(ctx.has_property(&b, q).unwrap());
    assert!(!ctx.has_property(&a, q).unwrap());
    assert_eq!(b.borrow().shape().ref_count(), 1);
    rt.free_atom(q);
}

#[test]
fn test_deleting_half_the_properties_compacts_the_shape() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let obj = ctx.new_object().unwrap();
    for i in 0..20 {
        add(&ctx, &obj, &format!("k{i}"), i);
    }
    let view = JsValue::Object(obj.clone());

    for i in (0..20).step_by(2) {
        let atom = rt.new_atom(&format!("k{i}"));
        assert!(ctx.delete_property(&obj, atom).unwrap());
        rt.free_atom(atom);
    }

    {
        let o = obj.borrow();
        let shape = o.shape().borrow();
        assert_eq!(shape.deleted_count(), 0);
        assert_eq!(shape.prop_count(), 10);
    }

    // Survivors keep their values and stay writable
    for i in (1..20).step_by(2) {
        let key = format!("k{i}");
        assert_eq!(ctx.get_property_str(&view, &key).unwrap(), JsValue::from(i));
        ctx.set_property_str(&view, &key, JsValue::from(i * 100)).unwrap();
        assert_eq!(ctx.get_property_str(&view, &key).unwrap(), JsValue::from(i * 100));
    }
    for i in (0..20).step_by(2) {
        let atom = rt.new_atom(&format!("k{i}"));
        assert!(!ctx.has_property(&obj, atom).unwrap());
        rt.free_atom(atom);
    }

    // New properties land after the survivors
    add(&ctx, &obj, "late", 7);
    assert_eq!(obj.borrow().shape().borrow().prop_count(), 11);
    assert_eq!(ctx.get_property_str(&view, "late").unwrap(), JsValue::from(7));
}
