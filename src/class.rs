//! Class registry
//!
//! Every object carries a class id. Built-in ids are fixed; embedders obtain
//! more with [`Runtime::new_class_id`](crate::Runtime::new_class_id) and
//! describe them with a [`ClassDef`].

use crate::atom::Atom;
use crate::context::Context;
use crate::error::{JsError, JsResult};
use crate::gc::Tracer;
use crate::object::PropertyDescriptor;
use crate::prelude::*;
use crate::value::{JsObjectRef, JsValue};

/// Dense class identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    pub const OBJECT: ClassId = ClassId(1);
    pub const ARRAY: ClassId = ClassId(2);
    pub const ERROR: ClassId = ClassId(3);
    pub const NUMBER: ClassId = ClassId(4);
    pub const STRING: ClassId = ClassId(5);
    pub const BOOLEAN: ClassId = ClassId(6);
    pub const SYMBOL: ClassId = ClassId(7);
    pub const ARGUMENTS: ClassId = ClassId(8);
    pub const C_FUNCTION: ClassId = ClassId(9);
    pub const BYTECODE_FUNCTION: ClassId = ClassId(10);
    pub const ARRAY_BUFFER: ClassId = ClassId(11);
    pub const UINT8C_ARRAY: ClassId = ClassId(12);
    pub const INT8_ARRAY: ClassId = ClassId(13);
    pub const UINT8_ARRAY: ClassId = ClassId(14);
    pub const INT16_ARRAY: ClassId = ClassId(15);
    pub const UINT16_ARRAY: ClassId = ClassId(16);
    pub const INT32_ARRAY: ClassId = ClassId(17);
    pub const UINT32_ARRAY: ClassId = ClassId(18);
    pub const FLOAT32_ARRAY: ClassId = ClassId(19);
    pub const FLOAT64_ARRAY: ClassId = ClassId(20);
    pub const MODULE_NS: ClassId = ClassId(21);

    /// First id handed out by `new_class_id`
    pub(crate) const INIT_COUNT: u32 = 22;

    pub fn is_typed_array(self) -> bool {
        (Self::UINT8C_ARRAY.0..=Self::FLOAT64_ARRAY.0).contains(&self.0)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match builtin_class_name(*self) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "ClassId({})", self.0),
        }
    }
}

fn builtin_class_name(id: ClassId) -> Option<&'static str> {
    let name = match id {
        ClassId::OBJECT => "Object",
        ClassId::ARRAY => "Array",
        ClassId::ERROR => "Error",
        ClassId::NUMBER => "Number",
        ClassId::STRING => "String",
        ClassId::BOOLEAN => "Boolean",
        ClassId::SYMBOL => "Symbol",
        ClassId::ARGUMENTS => "Arguments",
        ClassId::C_FUNCTION | ClassId::BYTECODE_FUNCTION => "Function",
        ClassId::ARRAY_BUFFER => "ArrayBuffer",
        ClassId::UINT8C_ARRAY => "Uint8ClampedArray",
        ClassId::INT8_ARRAY => "Int8Array",
        ClassId::UINT8_ARRAY => "Uint8Array",
        ClassId::INT16_ARRAY => "Int16Array",
        ClassId::UINT16_ARRAY => "Uint16Array",
        ClassId::INT32_ARRAY => "Int32Array",
        ClassId::UINT32_ARRAY => "Uint32Array",
        ClassId::FLOAT32_ARRAY => "Float32Array",
        ClassId::FLOAT64_ARRAY => "Float64Array",
        ClassId::MODULE_NS => "Module",
        _ => return None,
    };
    Some(name)
}

/// Called once when an instance dies, with its opaque payload.
pub type Finalizer = fn(Option<Box<dyn Any>>);

/// Reports the heap handles held by an opaque payload.
pub type GcMark = fn(&dyn Any, &mut Tracer<'_>);

/// Makes instances callable: `(ctx, func, this, args)`.
pub type ClassCall = fn(&Context, &JsObjectRef, &JsValue, &[JsValue]) -> JsResult<JsValue>;

/// Property hooks of exotic classes.
///
/// Each hook answers `None` (or an empty list) to fall back to the ordinary
/// shape-based behavior.
pub trait ExoticMethods {
    /// Own property lookup, consulted when the shape has no entry.
    fn get_own_property(
        &self,
        _ctx: &Context,
        _obj: &JsObjectRef,
        _atom: Atom,
    ) -> JsResult<Option<PropertyDescriptor>> {
        Ok(None)
    }

    /// Define hook, consulted before the ordinary algorithm.
    fn define_own_property(
        &self,
        _ctx: &Context,
        _obj: &JsObjectRef,
        _atom: Atom,
        _desc: &PropertyDescriptor,
    ) -> JsResult<Option<bool>> {
        Ok(None)
    }

    fn delete_property(
        &self,
        _ctx: &Context,
        _obj: &JsObjectRef,
        _atom: Atom,
    ) -> JsResult<Option<bool>> {
        Ok(None)
    }

    /// Extra own keys, listed after the shape's entries of the same kind.
    fn own_property_names(&self, _ctx: &Context, _obj: &JsObjectRef) -> JsResult<Vec<Atom>> {
        Ok(Vec::new())
    }
}

/// Description of a class.
#[derive(Clone)]
pub struct ClassDef {
    pub name: String,
    pub finalizer: Option<Finalizer>,
    pub gc_mark: Option<GcMark>,
    pub call: Option<ClassCall>,
    pub exotic: Option<Rc<dyn ExoticMethods>>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            finalizer: None,
            gc_mark: None,
            call: None,
            exotic: None,
        }
    }

    pub fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    pub fn with_gc_mark(mut self, gc_mark: GcMark) -> Self {
        self.gc_mark = Some(gc_mark);
        self
    }

    pub fn with_call(mut self, call: ClassCall) -> Self {
        self.call = Some(call);
        self
    }

    pub fn with_exotic(mut self, exotic: Rc<dyn ExoticMethods>) -> Self {
        self.exotic = Some(exotic);
        self
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("finalizer", &self.finalizer.is_some())
            .field("gc_mark", &self.gc_mark.is_some())
            .field("call", &self.call.is_some())
            .field("exotic", &self.exotic.is_some())
            .finish()
    }
}

/// Registered classes of a runtime, indexed by id.
pub(crate) struct ClassRegistry {
    classes: Vec<Option<ClassDef>>,
    next_id: u32,
}

impl ClassRegistry {
    pub(crate) fn new() -> Self {
        let mut classes = vec![None; ClassId::INIT_COUNT as usize];
        for id in 1..ClassId::INIT_COUNT {
            if let Some(name) = builtin_class_name(ClassId(id)) {
                if let Some(slot) = classes.get_mut(id as usize) {
                    *slot = Some(ClassDef::new(name));
                }
            }
        }
        Self {
            classes,
            next_id: ClassId::INIT_COUNT,
        }
    }

    pub(crate) fn new_class_id(&mut self) -> ClassId {
        let id = ClassId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn register(&mut self, id: ClassId, def: ClassDef) -> JsResult<()> {
        if id.0 == 0 || id.0 >= self.next_id {
            return Err(JsError::InvalidClassId(id.0));
        }
        if self.is_registered(id) {
            return Err(JsError::ClassAlreadyRegistered(id.0));
        }
        if self.classes.len() <= id.index() {
            self.classes.resize(id.index() + 1, None);
        }
        log::debug!("registered class {} as {:?}", def.name, id);
        if let Some(slot) = self.classes.get_mut(id.index()) {
            *slot = Some(def);
        }
        Ok(())
    }

    pub(crate) fn is_registered(&self, id: ClassId) -> bool {
        matches!(self.classes.get(id.index()), Some(Some(_)))
    }

    pub(crate) fn get(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn len(&self) -> usize {
        self.classes.len()
    }
}
