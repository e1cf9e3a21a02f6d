//! Host classes: registration, opaque payloads, call hooks and exotic behavior

use std::rc::Rc;

use super::{create_test_context, num};
use qjs_core::{
    Atom, ClassDef, ClassId, Context, ExoticMethods, GpnFlags, JsError, JsObjectRef, JsResult,
    JsValue, PropFlags, PropertyDescriptor, SetOutcome,
};

struct Point {
    x: f64,
    y: f64,
}

fn point_norm(ctx: &Context, func: &JsObjectRef, _this: &JsValue, _args: &[JsValue]) -> JsResult<JsValue> {
    let class_id = func.borrow().class_id();
    match ctx.opaque::<Point>(func, class_id) {
        Some(p) => Ok(JsValue::from(p.x.hypot(p.y))),
        None => Err(ctx.throw_type_error("not a point")),
    }
}

/// Exposes a read-only `magic` key that lives outside the shape.
struct MagicKey;

impl ExoticMethods for MagicKey {
    fn get_own_property(
        &self,
        ctx: &Context,
        _obj: &JsObjectRef,
        atom: Atom,
    ) -> JsResult<Option<PropertyDescriptor>> {
        if ctx.atom_to_string(atom) == "magic" {
            return Ok(Some(PropertyDescriptor::data(
                JsValue::from(7),
                PropFlags::ENUMERABLE,
            )));
        }
        Ok(None)
    }

    fn delete_property(&self, ctx: &Context, _obj: &JsObjectRef, atom: Atom) -> JsResult<Option<bool>> {
        if ctx.atom_to_string(atom) == "magic" {
            return Ok(Some(false));
        }
        Ok(None)
    }

    fn own_property_names(&self, ctx: &Context, _obj: &JsObjectRef) -> JsResult<Vec<Atom>> {
        Ok(vec![ctx.runtime().new_atom("magic")])
    }
}

#[test]
fn test_class_registration() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let id = rt.new_class_id();
    let other = rt.new_class_id();
    assert_ne!(id, other);
    assert!(!rt.is_registered_class(id));

    rt.register_class(id, ClassDef::new("Point")).unwrap();
    assert!(rt.is_registered_class(id));
    assert_eq!(rt.class_name(id).as_deref(), Some("Point"));
    assert_eq!(
        rt.register_class(id, ClassDef::new("Point")),
        Err(JsError::ClassAlreadyRegistered(id.0))
    );
    assert_eq!(
        rt.register_class(ClassId(0), ClassDef::new("Zero")),
        Err(JsError::InvalidClassId(0))
    );
    assert_eq!(rt.class_name(ClassId::ARRAY).as_deref(), Some("Array"));

    // Instances need a registered class
    assert_eq!(
        ctx.new_object_class(other, None).unwrap_err(),
        JsError::InvalidClassId(other.0)
    );
    assert_eq!(
        ctx.new_object_class(ClassId::ARRAY, None).unwrap_err(),
        JsError::InvalidClassId(ClassId::ARRAY.0)
    );
    assert!(!ctx.has_exception());

    let plain = ctx.new_object_class(ClassId::OBJECT, None).unwrap();
    assert_eq!(plain.borrow().class_id(), ClassId::OBJECT);
}

#[test]
fn test_opaque_payload() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let id = rt.new_class_id();
    rt.register_class(id, ClassDef::new("Point")).unwrap();
    let obj = ctx
        .new_object_class(id, Some(Box::new(Point { x: 3.0, y: 4.0 })))
        .unwrap();

    assert_eq!(ctx.opaque::<Point>(&obj, id).map(|p| p.x), Some(3.0));
    assert!(ctx.opaque::<String>(&obj, id).is_none());
    assert!(ctx.opaque::<Point>(&obj, ClassId::OBJECT).is_none());

    let moved = ctx.with_opaque(&obj, id, |p: &mut Point| {
        p.x += 1.0;
        p.x
    });
    assert_eq!(moved, Some(4.0));
    assert_eq!(ctx.opaque::<Point>(&obj, id).map(|p| p.x), Some(4.0));

    let value = JsValue::Object(obj.clone());
    assert!(!ctx.is_function(&value));
    assert_eq!(ctx.to_string(&value).unwrap(), "[object Point]");

    // Instances are ordinary objects otherwise
    ctx.set_property_str(&value, "label", JsValue::from("p")).unwrap();
    assert_eq!(ctx.get_property_str(&value, "label").unwrap(), JsValue::from("p"));
}

#[test]
fn test_callable_instances() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let id = rt.new_class_id();
    rt.register_class(id, ClassDef::new("Point").with_call(point_norm))
        .unwrap();
    let obj = ctx
        .new_object_class(id, Some(Box::new(Point { x: 6.0, y: 8.0 })))
        .unwrap();
    let value = JsValue::Object(obj);
    assert!(ctx.is_function(&value));
    let norm = ctx.call(&value, &JsValue::Undefined, &[]).unwrap();
    assert_eq!(num(&norm), 10.0);
}

#[test]
fn test_exotic_hooks() {
    let ctx = create_test_context();
    let rt = ctx.runtime();
    let id = rt.new_class_id();
    rt.register_class(id, ClassDef::new("Magic").with_exotic(Rc::new(MagicKey)))
        .unwrap();
    let obj = ctx.new_object_class(id, None).unwrap();
    let value = JsValue::Object(obj.clone());
    ctx.set_property_str(&value, "plain", JsValue::from(1)).unwrap();

    assert_eq!(ctx.get_property_str(&value, "magic").unwrap(), JsValue::from(7));
    let magic = rt.new_atom("magic");
    assert!(ctx.has_property(&obj, magic).unwrap());
    let desc = ctx.get_own_property(&obj, magic).unwrap().unwrap();
    assert_eq!(desc.writable, Some(false));
    assert_eq!(desc.enumerable, Some(true));

    let outcome = ctx
        .set_property(&value, magic, JsValue::from(8), PropFlags::empty())
        .unwrap();
    assert_eq!(outcome, SetOutcome::ReadOnly);
    assert!(!ctx.delete_property(&obj, magic).unwrap());
    rt.free_atom(magic);

    let names = ctx
        .get_own_property_names(&obj, GpnFlags::STRING_MASK | GpnFlags::ENUM_ONLY)
        .unwrap();
    let keys: Vec<String> = names
        .iter()
        .map(|e| ctx.atom_to_string(e.atom).to_utf8())
        .collect();
    ctx.free_property_names(names);
    assert_eq!(keys, vec!["plain", "magic"]);
}
