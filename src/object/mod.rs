//! Object model
//!
//! A [`JsObject`] pairs a [`Shape`] with a value array parallel to the
//! shape's entries, plus a class-specific payload. Arrays, arguments objects
//! and typed arrays keep their indexed elements in dense storage until an
//! operation forces the general representation.

mod array;
mod enumerate;
mod property;
mod typed_array;

pub use enumerate::{GpnFlags, PropertyEnum};
pub use property::{PropertyDescriptor, SetOutcome};
pub use typed_array::TypedArrayKind;

use crate::atom::{Atom, atoms};
use crate::class::{ClassCall, ClassId, Finalizer, GcMark};
use crate::context::Context;
use crate::error::{ErrorKind, JsResult};
use crate::function::{Closure, NativeFunction};
use crate::gc::{Gc, GcKind, GcPayload, Heap, Trace, Tracer};
use crate::memory::MemoryUsage;
use crate::module::ModuleDef;
use crate::prelude::*;
use crate::shape::{self, PropFlags, Shape};
use crate::value::{JsObjectRef, JsValue};

/// Produces the value of a lazily initialized property.
pub type AutoInitFn = fn(&Context, &JsObjectRef, Atom, &JsValue) -> JsResult<JsValue>;

/// Storage of one own property, parallel to a shape entry.
#[derive(Clone)]
pub enum PropertySlot {
    Value(JsValue),
    GetSet {
        getter: Option<JsObjectRef>,
        setter: Option<JsObjectRef>,
    },
    VarRef(Gc<crate::function::VarRef>),
    AutoInit {
        init: AutoInitFn,
        data: JsValue,
    },
}

impl Default for PropertySlot {
    fn default() -> Self {
        PropertySlot::Value(JsValue::Undefined)
    }
}

impl Trace for PropertySlot {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            PropertySlot::Value(v) => v.trace(tracer),
            PropertySlot::GetSet { getter, setter } => {
                getter.trace(tracer);
                setter.trace(tracer);
            }
            PropertySlot::VarRef(r) => tracer.edge(r),
            PropertySlot::AutoInit { data, .. } => data.trace(tracer),
        }
    }
}

/// Kind and catchability of an error object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorData {
    pub kind: ErrorKind,
    /// Script-level catch handlers must not intercept this error
    pub uncatchable: bool,
}

pub struct ArrayBufferData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) detached: bool,
}

pub struct TypedArrayData {
    pub(crate) kind: TypedArrayKind,
    pub(crate) buffer: JsObjectRef,
    /// Byte offset into the buffer
    pub(crate) offset: usize,
    /// Element count
    pub(crate) length: usize,
}

/// Payload of an instance of an embedder-defined class.
pub struct OpaqueData {
    pub(crate) value: Option<Box<dyn Any>>,
    pub(crate) finalizer: Option<Finalizer>,
    pub(crate) gc_mark: Option<GcMark>,
    pub(crate) call: Option<ClassCall>,
}

impl Drop for OpaqueData {
    fn drop(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer(self.value.take());
        }
    }
}

/// Class-specific part of an object.
#[derive(Default)]
pub enum ObjectData {
    #[default]
    Ordinary,
    /// Array elements; dense while the object is a fast array
    Array(Vec<JsValue>),
    Arguments(Vec<JsValue>),
    Error(ErrorData),
    /// Boolean, Number, String or Symbol wrapper
    Primitive(JsValue),
    NativeFunction(NativeFunction),
    Closure(Closure),
    ArrayBuffer(ArrayBufferData),
    TypedArray(TypedArrayData),
    ModuleNamespace(Gc<ModuleDef>),
    Opaque(OpaqueData),
}

impl Trace for ObjectData {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            ObjectData::Array(elements) | ObjectData::Arguments(elements) => elements.trace(tracer),
            ObjectData::Primitive(v) => v.trace(tracer),
            ObjectData::NativeFunction(f) => f.data.trace(tracer),
            ObjectData::Closure(c) => {
                tracer.edge(&c.bytecode);
                c.var_refs.trace(tracer);
            }
            ObjectData::TypedArray(t) => tracer.edge(&t.buffer),
            ObjectData::ModuleNamespace(m) => tracer.edge(m),
            ObjectData::Opaque(o) => {
                if let (Some(mark), Some(value)) = (o.gc_mark, o.value.as_deref()) {
                    mark(value, tracer);
                }
            }
            ObjectData::Ordinary | ObjectData::Error(_) | ObjectData::ArrayBuffer(_) => {}
        }
    }
}

/// A heap object.
pub struct JsObject {
    pub(crate) shape: Gc<Shape>,
    /// Values parallel to the shape's entries
    pub(crate) props: Vec<PropertySlot>,
    pub(crate) class_id: ClassId,
    pub(crate) extensible: bool,
    pub(crate) fast_array: bool,
    pub(crate) data: ObjectData,
}

impl JsObject {
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn shape(&self) -> &Gc<Shape> {
        &self.shape
    }

    pub fn proto(&self) -> Option<JsObjectRef> {
        self.shape.borrow().proto().cloned()
    }

    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    /// Whether indexed elements live in dense storage
    pub fn is_fast_array(&self) -> bool {
        self.fast_array
    }

    pub fn data(&self) -> &ObjectData {
        &self.data
    }

    pub fn is_callable(&self) -> bool {
        match &self.data {
            ObjectData::NativeFunction(_) | ObjectData::Closure(_) => true,
            ObjectData::Opaque(o) => o.call.is_some(),
            _ => false,
        }
    }

    /// Slot of `atom` together with its flags.
    pub(crate) fn find_own(&self, atom: Atom) -> Option<(usize, PropFlags)> {
        let shape = self.shape.borrow();
        shape
            .find(atom)
            .and_then(|index| Some((index, shape.properties().get(index)?.flags())))
    }

    /// Dense elements of a fast array or arguments object.
    pub(crate) fn dense_elements(&self) -> Option<&Vec<JsValue>> {
        match &self.data {
            ObjectData::Array(v) | ObjectData::Arguments(v) if self.fast_array => Some(v),
            _ => None,
        }
    }

    pub(crate) fn dense_elements_mut(&mut self) -> Option<&mut Vec<JsValue>> {
        match &mut self.data {
            ObjectData::Array(v) | ObjectData::Arguments(v) if self.fast_array => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsObject")
            .field("class", &self.class_id)
            .field("props", &self.props.len())
            .field("fast_array", &self.fast_array)
            .finish()
    }
}

impl Trace for JsObject {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.edge(&self.shape);
        self.props.trace(tracer);
        self.data.trace(tracer);
    }
}

impl GcPayload for JsObject {
    const KIND: GcKind = GcKind::Object;

    fn take_edges(&mut self) -> Box<dyn Any> {
        // The shape stays: it only points at the prototype, which the
        // collector clears separately when it is garbage too.
        let props = mem::take(&mut self.props);
        let data = mem::take(&mut self.data);
        Box::new((props, data))
    }

    fn extra_size(&self) -> usize {
        let elements = match &self.data {
            ObjectData::Array(v) | ObjectData::Arguments(v) => {
                v.capacity() * mem::size_of::<JsValue>()
            }
            ObjectData::ArrayBuffer(b) => b.bytes.capacity(),
            _ => 0,
        };
        self.props.capacity() * mem::size_of::<PropertySlot>() + elements
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.obj_count += 1;
        usage.obj_size += mem::size_of::<JsObject>();
        usage.prop_count += self.props.len();
        usage.prop_size += self.props.capacity() * mem::size_of::<PropertySlot>();
        for slot in &self.props {
            if let PropertySlot::Value(JsValue::String(s)) = slot {
                usage.add_string(s);
            }
        }
        match &self.data {
            ObjectData::Array(v) | ObjectData::Arguments(v) => {
                usage.array_count += 1;
                if self.fast_array {
                    usage.fast_array_count += 1;
                    usage.fast_array_elements += v.len();
                }
                for value in v {
                    if let JsValue::String(s) = value {
                        usage.add_string(s);
                    }
                }
            }
            ObjectData::NativeFunction(_) => usage.c_func_count += 1,
            ObjectData::ArrayBuffer(b) => {
                usage.binary_object_count += 1;
                usage.binary_object_size += b.bytes.len();
            }
            ObjectData::TypedArray(_) => usage.binary_object_count += 1,
            _ => {}
        }
    }
}

// ============================================================================
// Object creation and shape maintenance
// ============================================================================

impl Context {
    /// Allocate an object using `shape`, with one slot per shape entry.
    pub(crate) fn new_object_from_shape(
        &self,
        shape: Gc<Shape>,
        class_id: ClassId,
        data: ObjectData,
    ) -> JsResult<JsObjectRef> {
        let (count, capacity) = {
            let sh = shape.borrow();
            (sh.prop_count(), sh.prop_size())
        };
        let mut props = Vec::with_capacity(capacity.max(count));
        props.resize_with(count, PropertySlot::default);
        let fast_array = matches!(data, ObjectData::Array(_) | ObjectData::Arguments(_))
            || class_id.is_typed_array();
        let object = JsObject {
            shape,
            props,
            class_id,
            extensible: true,
            fast_array,
            data,
        };
        self.reserve_memory(Heap::node_size(&object))?;
        Ok(self.inner().heap.alloc(object))
    }

    /// New object with the given prototype, class and payload.
    pub fn new_object_with_data(
        &self,
        proto: Option<&JsObjectRef>,
        class_id: ClassId,
        data: ObjectData,
    ) -> JsResult<JsObjectRef> {
        let shape = shape::shape_for_proto(self.inner(), proto);
        self.new_object_from_shape(shape, class_id, data)
    }

    /// New plain object inheriting from `Object.prototype`
    pub fn new_object(&self) -> JsResult<JsObjectRef> {
        let proto = self.object_proto();
        self.new_object_with_data(proto.as_ref(), ClassId::OBJECT, ObjectData::Ordinary)
    }

    /// New plain object with an explicit prototype (`None` for a null prototype)
    pub fn new_object_proto(&self, proto: Option<&JsObjectRef>) -> JsResult<JsObjectRef> {
        self.new_object_with_data(proto, ClassId::OBJECT, ObjectData::Ordinary)
    }

    /// Wrapper object for a boolean, number, string or symbol.
    pub fn new_primitive_object(&self, value: JsValue) -> JsResult<JsObjectRef> {
        let class_id = match &value {
            JsValue::Boolean(_) => ClassId::BOOLEAN,
            JsValue::Int(_) | JsValue::Float(_) => ClassId::NUMBER,
            JsValue::String(_) => ClassId::STRING,
            JsValue::Symbol(_) => ClassId::SYMBOL,
            _ => return Err(self.throw_type_error("cannot wrap this value in an object")),
        };
        let proto = self.class_proto(class_id);
        let length = match &value {
            JsValue::String(s) => Some(JsValue::from_i64(s.len() as i64)),
            _ => None,
        };
        let obj = self.new_object_with_data(proto.as_ref(), class_id, ObjectData::Primitive(value))?;
        if let Some(length) = length {
            self.add_property(&obj, atoms::LENGTH, PropFlags::empty(), PropertySlot::Value(length));
        }
        Ok(obj)
    }

    /// Replace a shared or hashed shape with one this object may change in place.
    pub(crate) fn prepare_shape_update(&self, obj: &JsObjectRef) {
        let (hashed, shared) = {
            let o = obj.borrow();
            let hashed = o.shape.borrow().is_hashed();
            (hashed, o.shape.ref_count() > 1)
        };
        if shared {
            let copy = shape::clone_shape(self.inner(), &obj.borrow().shape.borrow());
            let old = mem::replace(&mut obj.borrow_mut().shape, copy);
            drop(old);
        } else if hashed {
            shape::unhash(&obj.borrow().shape);
        }
    }

    /// Append an own property slot. The caller checked that `atom` is absent.
    pub(crate) fn add_property(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        flags: PropFlags,
        slot: PropertySlot,
    ) {
        let rt = self.inner();
        let flags = flags.stored();
        let (hashed, shared) = {
            let o = obj.borrow();
            let hashed = o.shape.borrow().is_hashed();
            (hashed, o.shape.ref_count() > 1)
        };
        if hashed {
            let found = shape::find_hashed_shape_prop(rt, &obj.borrow().shape.borrow(), atom, flags);
            if let Some(next) = found {
                let old = {
                    let mut o = obj.borrow_mut();
                    let capacity = next.borrow().prop_size();
                    reserve_slots(&mut o.props, capacity);
                    o.props.push(slot);
                    mem::replace(&mut o.shape, next)
                };
                drop(old);
                obj.update_size();
                return;
            }
            if shared {
                let copy = shape::clone_shape(rt, &obj.borrow().shape.borrow());
                shape::rehash(rt, &copy);
                let old = mem::replace(&mut obj.borrow_mut().shape, copy);
                drop(old);
            }
        } else if shared {
            self.prepare_shape_update(obj);
        }
        let current = obj.borrow().shape.clone();
        shape::append_property(rt, &current, atom, flags);
        let capacity = current.borrow().prop_size();
        drop(current);
        {
            let mut o = obj.borrow_mut();
            reserve_slots(&mut o.props, capacity);
            o.props.push(slot);
        }
        obj.update_size();
    }

    /// Change the stored flags of slot `index`.
    pub(crate) fn set_slot_flags(&self, obj: &JsObjectRef, index: usize, flags: PropFlags) {
        let unchanged = {
            let o = obj.borrow();
            let sh = o.shape.borrow();
            sh.properties().get(index).map(|p| p.flags()) == Some(flags.stored())
        };
        if unchanged {
            return;
        }
        self.prepare_shape_update(obj);
        obj.borrow().shape.borrow_mut().set_flags(index, flags);
    }

    /// Remove the own shape entry for `atom`. Returns false when absent.
    pub(crate) fn remove_shape_property(&self, obj: &JsObjectRef, atom: Atom) -> bool {
        if obj.borrow().find_own(atom).is_none() {
            return false;
        }
        self.prepare_shape_update(obj);
        let removed = {
            let o = obj.borrow();
            let index = o.shape.borrow_mut().remove(atom);
            index
        };
        let Some(index) = removed else {
            return false;
        };
        let old = {
            let mut o = obj.borrow_mut();
            o.props.get_mut(index).map(mem::take)
        };
        drop(old);
        self.inner().release_atom(atom);
        let compact = obj.borrow().shape.borrow().needs_compaction();
        if compact {
            self.compact_properties(obj);
        }
        true
    }

    fn compact_properties(&self, obj: &JsObjectRef) {
        let mut o = obj.borrow_mut();
        let o = &mut *o;
        let kept = o.shape.borrow_mut().compact();
        let capacity = o.shape.borrow().prop_size();
        let mut old = mem::take(&mut o.props);
        let mut props = Vec::with_capacity(capacity);
        for index in kept {
            if let Some(value) = old.get_mut(index) {
                props.push(mem::take(value));
            }
        }
        o.props = props;
    }

    /// Atom for an element index, taking a reference for large indices.
    pub(crate) fn index_atom(&self, index: u32) -> Atom {
        match Atom::from_index(index) {
            Some(atom) => atom,
            None => self.inner().intern_atom(&index.to_string()),
        }
    }

    /// Element index named by `atom`.
    pub(crate) fn atom_index(&self, atom: Atom) -> Option<u32> {
        match atom.tagged_int() {
            Some(n) => Some(n),
            None => self.inner().atoms.borrow().array_index(atom),
        }
    }
}

fn reserve_slots(props: &mut Vec<PropertySlot>, capacity: usize) {
    if props.capacity() < capacity {
        props.reserve_exact(capacity - props.len());
    }
}
