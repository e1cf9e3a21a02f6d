//! Property get/set/define/delete and prototype tests

use super::{create_test_context, num, take_error};
use qjs_core::{
    Atom, Context, ErrorKind, JsObjectRef, JsResult, JsValue, PropFlags, PropertyDescriptor,
    SetOutcome, atoms,
};

fn obj_value(obj: &JsObjectRef) -> JsValue {
    JsValue::Object(obj.clone())
}

#[test]
fn test_read_only_non_configurable_property() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let obj = ctx.new_object().unwrap();
    let k = rt.new_atom("k");
    assert!(ctx.define_property_value(&obj, k, JsValue::from(1), PropFlags::empty()).unwrap());

    let outcome = ctx.set_property(&obj_value(&obj), k, JsValue::from(2), PropFlags::empty()).unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
    assert_eq!(ctx.get_property(&obj_value(&obj), k).unwrap(), JsValue::from(1));

    let err = ctx
        .set_property(&obj_value(&obj), k, JsValue::from(2), PropFlags::THROW)
        .unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::TypeError);
    assert_eq!(message, "'k' is read-only");

    assert!(!ctx.delete_property(&obj, k).unwrap());
    assert!(ctx.has_property(&obj, k).unwrap());
    assert_eq!(ctx.get_property(&obj_value(&obj), k).unwrap(), JsValue::from(1));
    rt.free_atom(k);
}

#[test]
fn test_non_configurable_cannot_be_redefined() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let obj = ctx.new_object().unwrap();
    let k = rt.new_atom("frozen");
    ctx.define_property_value(&obj, k, JsValue::from(1), PropFlags::ENUMERABLE)
        .unwrap();

    let changed = ctx
        .define_property_value(&obj, k, JsValue::from(5), PropFlags::ENUMERABLE)
        .unwrap();
    assert!(!changed);

    // Same value and attributes is allowed
    let same = ctx
        .define_property_value(&obj, k, JsValue::from(1), PropFlags::ENUMERABLE)
        .unwrap();
    assert!(same);

    let err = ctx
        .define_property_value(
            &obj,
            k,
            JsValue::from(5),
            PropFlags::ENUMERABLE | PropFlags::CONFIGURABLE | PropFlags::THROW,
        )
        .unwrap_err();
    assert_eq!(take_error(&ctx, err).0, ErrorKind::TypeError);
    rt.free_atom(k);
}

#[test]
fn test_delete_then_redefine() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let obj = ctx.new_object().unwrap();
    let k = rt.new_atom("temp");
    ctx.define_property_value(&obj, k, JsValue::from("first"), PropFlags::C_W_E)
        .unwrap();
    assert!(ctx.delete_property(&obj, k).unwrap());
    assert!(!ctx.has_property(&obj, k).unwrap());
    assert_eq!(ctx.get_property(&obj_value(&obj), k).unwrap(), JsValue::Undefined);

    assert!(ctx.define_property_value(&obj, k, JsValue::from("second"), PropFlags::C_W_E).unwrap());
    assert_eq!(
        ctx.get_property(&obj_value(&obj), k).unwrap(),
        JsValue::from("second")
    );
    rt.free_atom(k);
}

#[test]
fn test_deleting_missing_property_succeeds() {
    let ctx = create_test_context();
    let obj = ctx.new_object().unwrap();
    let k = ctx.runtime().new_atom("never_defined");
    assert!(ctx.delete_property(&obj, k).unwrap());
    ctx.runtime().free_atom(k);
}

#[test]
fn test_own_property_descriptor() {
    let ctx = create_test_context();
    let obj = ctx.new_object().unwrap();
    ctx.define_property_value_str(&obj, "v", JsValue::from(3), PropFlags::WRITABLE)
        .unwrap();
    let k = ctx.runtime().new_atom("v");
    let desc = ctx.get_own_property(&obj, k).unwrap().unwrap();
    assert_eq!(desc.value, Some(JsValue::from(3)));
    assert_eq!(desc.writable, Some(true));
    assert_eq!(desc.enumerable, Some(false));
    assert_eq!(desc.configurable, Some(false));
    ctx.runtime().free_atom(k);
}

#[test]
fn test_inherited_lookup_and_shadowing() {
    let ctx = create_test_context();
    let proto = ctx.new_object().unwrap();
    ctx.define_property_value_str(&proto, "shared", JsValue::from(1), PropFlags::C_W_E)
        .unwrap();
    let child = ctx.new_object_proto(Some(&proto)).unwrap();
    let child_value = obj_value(&child);

    assert_eq!(ctx.get_property_str(&child_value, "shared").unwrap(), JsValue::from(1));

    ctx.set_property_str(&child_value, "shared", JsValue::from(2)).unwrap();
    assert_eq!(ctx.get_property_str(&child_value, "shared").unwrap(), JsValue::from(2));
    assert_eq!(
        ctx.get_property_str(&obj_value(&proto), "shared").unwrap(),
        JsValue::from(1)
    );
}

#[test]
fn test_read_only_inherited_blocks_assignment() {
    let ctx = create_test_context();
    let proto = ctx.new_object().unwrap();
    ctx.define_property_value_str(&proto, "fixed", JsValue::from(1), PropFlags::empty())
        .unwrap();
    let child = ctx.new_object_proto(Some(&proto)).unwrap();
    let k = ctx.runtime().new_atom("fixed");
    let outcome = ctx
        .set_property(&obj_value(&child), k, JsValue::from(2), PropFlags::empty())
        .unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
    assert!(child.borrow().shape().borrow().prop_count() == 0);
    ctx.runtime().free_atom(k);
}

fn get_stored(_ctx: &Context, _this: &JsValue, _args: &[JsValue], magic: i32, data: &[JsValue]) -> JsResult<JsValue> {
    let base = data.first().cloned().unwrap_or_default();
    Ok(JsValue::from(num(&base) + f64::from(magic)))
}

fn set_mirror(ctx: &Context, this: &JsValue, args: &[JsValue], _magic: i32, _data: &[JsValue]) -> JsResult<JsValue> {
    let value = args.first().cloned().unwrap_or_default();
    ctx.set_property_str(this, "mirror", value)?;
    Ok(JsValue::Undefined)
}

#[test]
fn test_accessor_property() {
    let ctx = create_test_context();
    let getter = ctx
        .new_native_function_data(get_stored, 0, 10, &[JsValue::from(32)])
        .unwrap();
    let setter = ctx.new_native_function("setMirror", set_mirror, 1).unwrap();
    let obj = ctx.new_object().unwrap();
    let k = ctx.runtime().new_atom("computed");
    ctx.define_property_getset(
        &obj,
        k,
        JsValue::Object(getter),
        JsValue::Object(setter),
        PropFlags::CONFIGURABLE,
    )
    .unwrap();

    let target = obj_value(&obj);
    assert_eq!(num(&ctx.get_property(&target, k).unwrap()), 42.0);

    let outcome = ctx.set_property(&target, k, JsValue::from("hello"), PropFlags::THROW).unwrap();
    assert_eq!(outcome, SetOutcome::Done);
    assert_eq!(ctx.get_property_str(&target, "mirror").unwrap(), JsValue::from("hello"));

    let desc = ctx.get_own_property(&obj, k).unwrap().unwrap();
    assert!(desc.is_accessor());
    ctx.runtime().free_atom(k);
}

#[test]
fn test_getter_only_is_read_only() {
    let ctx = create_test_context();
    let getter = ctx
        .new_native_function_data(get_stored, 0, 0, &[JsValue::from(1)])
        .unwrap();
    let obj = ctx.new_object().unwrap();
    let k = ctx.runtime().new_atom("only_get");
    ctx.define_property_getset(&obj, k, JsValue::Object(getter), JsValue::Undefined, PropFlags::empty())
        .unwrap();
    let outcome = ctx
        .set_property(&obj_value(&obj), k, JsValue::from(9), PropFlags::empty())
        .unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
    ctx.runtime().free_atom(k);
}

#[test]
fn test_malformed_descriptor_throws() {
    let ctx = create_test_context();
    let obj = ctx.new_object().unwrap();
    let desc = PropertyDescriptor {
        value: Some(JsValue::from(1)),
        get: Some(JsValue::Undefined),
        ..Default::default()
    };
    let k = ctx.runtime().new_atom("bad");
    let err = ctx.define_property(&obj, k, &desc, PropFlags::empty()).unwrap_err();
    assert_eq!(take_error(&ctx, err).0, ErrorKind::TypeError);
    ctx.runtime().free_atom(k);
}

fn lazy_value(ctx: &Context, _obj: &JsObjectRef, atom: Atom, data: &JsValue) -> JsResult<JsValue> {
    let name = ctx.atom_to_string(atom).to_utf8();
    Ok(JsValue::from(format!("{name}:{}", ctx.to_string(data)?)))
}

#[test]
fn test_autoinit_realized_on_first_read() {
    let ctx = create_test_context();
    let obj = ctx.new_object().unwrap();
    let k = ctx.runtime().new_atom("lazy");
    ctx.define_property_autoinit(&obj, k, lazy_value, JsValue::from(7), PropFlags::C_W_E)
        .unwrap();

    let value = ctx.get_property(&obj_value(&obj), k).unwrap();
    assert_eq!(value, JsValue::from("lazy:7"));

    // Now an ordinary data property
    let desc = ctx.get_own_property(&obj, k).unwrap().unwrap();
    assert_eq!(desc.value, Some(JsValue::from("lazy:7")));
    ctx.set_property(&obj_value(&obj), k, JsValue::from(1), PropFlags::THROW)
        .unwrap();
    assert_eq!(ctx.get_property(&obj_value(&obj), k).unwrap(), JsValue::from(1));
    ctx.runtime().free_atom(k);
}

#[test]
fn test_non_extensible_object() {
    let ctx = create_test_context();
    let obj = ctx.new_object().unwrap();
    ctx.define_property_value_str(&obj, "kept", JsValue::from(1), PropFlags::C_W_E)
        .unwrap();
    assert!(ctx.prevent_extensions(&obj));
    assert!(!ctx.is_extensible(&obj));

    let fresh = ctx.runtime().new_atom("fresh");
    let outcome = ctx
        .set_property(&obj_value(&obj), fresh, JsValue::from(2), PropFlags::empty())
        .unwrap();
    assert_eq!(outcome, SetOutcome::NotExtensible);
    assert!(!ctx.define_property_value(&obj, fresh, JsValue::from(2), PropFlags::C_W_E).unwrap());

    // Existing properties stay writable
    ctx.set_property_str(&obj_value(&obj), "kept", JsValue::from(3)).unwrap();
    assert_eq!(ctx.get_property_str(&obj_value(&obj), "kept").unwrap(), JsValue::from(3));

    let other = ctx.new_object().unwrap();
    assert!(!ctx.set_prototype(&obj, Some(&other)).unwrap());
    ctx.runtime().free_atom(fresh);
}

#[test]
fn test_prototype_cycles_are_refused() {
    let ctx = create_test_context();
    let a = ctx.new_object().unwrap();
    let b = ctx.new_object_proto(Some(&a)).unwrap();
    assert!(!ctx.set_prototype(&a, Some(&b)).unwrap());
    assert!(ctx.set_prototype(&b, None).unwrap());
    assert!(ctx.get_prototype(&b).is_none());
    assert!(ctx.set_prototype(&a, Some(&b)).unwrap());
}

#[test]
fn test_primitive_receivers() {
    let ctx = create_test_context();
    let s = JsValue::from("hey");
    assert_eq!(num(&ctx.get_property(&s, atoms::LENGTH).unwrap()), 3.0);
    let second = Atom::from_index(1).unwrap();
    assert_eq!(ctx.get_property(&s, second).unwrap(), JsValue::from("e"));

    let k = ctx.runtime().new_atom("extra");
    let outcome = ctx.set_property(&s, k, JsValue::from(1), PropFlags::empty()).unwrap();
    assert_eq!(outcome, SetOutcome::NotAnObject);

    let err = ctx.get_property(&JsValue::Undefined, k).unwrap_err();
    assert_eq!(take_error(&ctx, err).0, ErrorKind::TypeError);
    ctx.runtime().free_atom(k);
}

#[test]
fn test_wrapper_objects() {
    let ctx = create_test_context();
    let wrapped = ctx.new_primitive_object(JsValue::from("ab")).unwrap();
    let value = obj_value(&wrapped);
    assert_eq!(num(&ctx.get_property(&value, atoms::LENGTH).unwrap()), 2.0);
    assert_eq!(ctx.to_string(&value).unwrap(), "ab");

    let index = Atom::from_index(0).unwrap();
    let outcome = ctx.set_property(&value, index, JsValue::from("z"), PropFlags::empty()).unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
    assert!(!ctx.delete_property(&wrapped, index).unwrap());

    let number = ctx.new_primitive_object(JsValue::from(5)).unwrap();
    assert_eq!(ctx.to_float64(&obj_value(&number)).unwrap(), 5.0);
    assert!(ctx.new_primitive_object(JsValue::Null).is_err());
    ctx.take_exception();
}
