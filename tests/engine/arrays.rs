//! Fast array, length and Array constructor tests

use super::{create_test_context, num, take_error};
use qjs_core::{Atom, ErrorKind, JsValue, PropFlags, SetOutcome, atoms};

fn index(i: u32) -> Atom {
    Atom::from_index(i).unwrap()
}

#[test]
fn test_truncating_length_releases_elements() {
    let ctx = create_test_context();
    let elements: Vec<_> = (0..5).map(|_| ctx.new_object().unwrap()).collect();
    let arr = ctx
        .new_array_from(elements.iter().cloned().map(JsValue::Object).collect())
        .unwrap();
    for element in &elements {
        assert_eq!(element.ref_count(), 2);
    }

    let receiver = JsValue::Object(arr.clone());
    let outcome = ctx
        .set_property(&receiver, atoms::LENGTH, JsValue::from(2), PropFlags::THROW)
        .unwrap();
    assert_eq!(outcome, SetOutcome::Done);

    assert_eq!(ctx.array_length(&arr), 2);
    assert_eq!(num(&ctx.get_property(&receiver, atoms::LENGTH).unwrap()), 2.0);
    assert_eq!(elements[0].ref_count(), 2);
    assert_eq!(elements[1].ref_count(), 2);
    for element in &elements[2..] {
        assert_eq!(element.ref_count(), 1);
    }
    assert!(ctx.get_own_property(&arr, index(3)).unwrap().is_none());
    assert!(!ctx.has_property(&arr, index(3)).unwrap());
    assert_eq!(ctx.get_property(&receiver, index(3)).unwrap(), JsValue::Undefined);
}

#[test]
fn test_push_and_index_access_stay_dense() {
    let ctx = create_test_context();
    let arr = ctx.new_array().unwrap();
    for i in 0..4 {
        ctx.array_push(&arr, JsValue::from(i * 10)).unwrap();
    }
    assert!(arr.borrow().is_fast_array());
    assert_eq!(ctx.array_length(&arr), 4);
    let receiver = JsValue::Object(arr.clone());
    assert_eq!(ctx.get_property(&receiver, index(2)).unwrap(), JsValue::from(20));

    ctx.set_property(&receiver, index(1), JsValue::from("one"), PropFlags::THROW)
        .unwrap();
    assert_eq!(ctx.get_property(&receiver, index(1)).unwrap(), JsValue::from("one"));
    assert!(arr.borrow().is_fast_array());
}

#[test]
fn test_hole_converts_to_slow_array() {
    let ctx = create_test_context();
    let arr = ctx
        .new_array_from(vec![JsValue::from(1), JsValue::from(2)])
        .unwrap();
    let receiver = JsValue::Object(arr.clone());
    ctx.set_property(&receiver, index(5), JsValue::from(6), PropFlags::THROW)
        .unwrap();
    assert!(!arr.borrow().is_fast_array());
    assert_eq!(ctx.array_length(&arr), 6);
    assert_eq!(ctx.get_property(&receiver, index(0)).unwrap(), JsValue::from(1));
    assert_eq!(ctx.get_property(&receiver, index(3)).unwrap(), JsValue::Undefined);
    assert_eq!(ctx.get_property(&receiver, index(5)).unwrap(), JsValue::from(6));

    // Truncation works on the slow representation too
    assert!(ctx.set_array_length(&arr, 1).unwrap());
    assert_eq!(ctx.array_length(&arr), 1);
    assert!(!ctx.has_property(&arr, index(5)).unwrap());
}

#[test]
fn test_deleting_middle_element_leaves_hole() {
    let ctx = create_test_context();
    let arr = ctx
        .new_array_from(vec![JsValue::from(1), JsValue::from(2), JsValue::from(3)])
        .unwrap();
    assert!(ctx.delete_property(&arr, index(1)).unwrap());
    assert!(!arr.borrow().is_fast_array());
    assert_eq!(ctx.array_length(&arr), 3);
    assert!(!ctx.has_property(&arr, index(1)).unwrap());
    assert!(ctx.has_property(&arr, index(2)).unwrap());
}

#[test]
fn test_deleting_last_element_stays_dense() {
    let ctx = create_test_context();
    let arr = ctx
        .new_array_from(vec![JsValue::from(1), JsValue::from(2)])
        .unwrap();
    assert!(ctx.delete_property(&arr, index(1)).unwrap());
    assert!(arr.borrow().is_fast_array());
    assert_eq!(ctx.array_length(&arr), 2);
    assert!(!ctx.has_property(&arr, index(1)).unwrap());
}

#[test]
fn test_invalid_length_throws_range_error() {
    let ctx = create_test_context();
    let arr = ctx.new_array().unwrap();
    let receiver = JsValue::Object(arr);
    let err = ctx
        .set_property(&receiver, atoms::LENGTH, JsValue::from(-1), PropFlags::empty())
        .unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::RangeError);
    assert_eq!(message, "invalid array length");

    let err = ctx
        .set_property(&receiver, atoms::LENGTH, JsValue::from(1.5), PropFlags::empty())
        .unwrap_err();
    assert_eq!(take_error(&ctx, err).0, ErrorKind::RangeError);
}

#[test]
fn test_read_only_length() {
    let ctx = create_test_context();
    let arr = ctx
        .new_array_from(vec![JsValue::from(1), JsValue::from(2)])
        .unwrap();
    let desc = qjs_core::PropertyDescriptor {
        writable: Some(false),
        ..Default::default()
    };
    assert!(ctx.define_property(&arr, atoms::LENGTH, &desc, PropFlags::empty()).unwrap());
    assert!(!ctx.set_array_length(&arr, 0).unwrap());
    assert_eq!(ctx.array_length(&arr), 2);

    let receiver = JsValue::Object(arr.clone());
    let outcome = ctx
        .set_property(&receiver, index(2), JsValue::from(3), PropFlags::empty())
        .unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
}

#[test]
fn test_array_constructor_from_global() {
    let ctx = create_test_context();
    let global = JsValue::Object(ctx.global_object());
    let array_ctor = ctx.get_property_str(&global, "Array").unwrap();
    assert!(ctx.is_function(&array_ctor));

    let sized = ctx.call(&array_ctor, &JsValue::Undefined, &[JsValue::from(3)]).unwrap();
    assert!(ctx.is_array(&sized));
    assert_eq!(ctx.array_length(sized.as_object().unwrap()), 3);

    let listed = ctx
        .call(
            &array_ctor,
            &JsValue::Undefined,
            &[JsValue::from("a"), JsValue::from("b")],
        )
        .unwrap();
    assert_eq!(ctx.array_length(listed.as_object().unwrap()), 2);
    assert_eq!(ctx.to_string(&listed).unwrap(), "a,b");

    let err = ctx
        .call(&array_ctor, &JsValue::Undefined, &[JsValue::from(-2)])
        .unwrap_err();
    let (kind, message) = take_error(&ctx, err);
    assert_eq!(kind, ErrorKind::RangeError);
    assert_eq!(message, "invalid array length");
}

#[test]
fn test_join_skips_nullish_and_breaks_cycles() {
    let ctx = create_test_context();
    let arr = ctx
        .new_array_from(vec![
            JsValue::from(1),
            JsValue::Null,
            JsValue::from(3),
            JsValue::Undefined,
        ])
        .unwrap();
    assert_eq!(ctx.to_string(&JsValue::Object(arr.clone())).unwrap(), "1,,3,");

    ctx.array_push(&arr, JsValue::Object(arr.clone())).unwrap();
    assert_eq!(ctx.to_string(&JsValue::Object(arr.clone())).unwrap(), "1,,3,,");
    // Break the cycle so the array is freed without a collection
    ctx.set_array_length(&arr, 0).unwrap();
}

#[test]
fn test_arguments_object() {
    let ctx = create_test_context();
    let args = ctx
        .new_arguments(vec![JsValue::from("x"), JsValue::from("y")])
        .unwrap();
    let receiver = JsValue::Object(args.clone());
    assert!(!ctx.is_array(&receiver));
    assert_eq!(num(&ctx.get_property(&receiver, atoms::LENGTH).unwrap()), 2.0);
    assert_eq!(ctx.get_property(&receiver, index(1)).unwrap(), JsValue::from("y"));
}
