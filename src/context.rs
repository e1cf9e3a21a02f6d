//! Contexts and realms
//!
//! A [`Context`] pairs a [`Runtime`] with a realm: the global object, the
//! per-class prototypes and the intrinsic constructors. Several contexts
//! may share one runtime; objects move freely between them.

use crate::atom::{Atom, AtomKind, atoms};
use crate::class::ClassId;
use crate::error::{ErrorKind, JsError, JsResult};
use crate::gc::{Gc, GcKind, GcPayload, Trace, Tracer};
use crate::memory::MemoryUsage;
use crate::module::ModuleDef;
use crate::object::{
    ErrorData, GpnFlags, JsObject, ObjectData, OpaqueData, PropertySlot, TypedArrayKind,
};
use crate::prelude::*;
use crate::runtime::{Job, JobFn, Runtime, RuntimeInner};
use crate::shape::{self, PropFlags, Shape};
use crate::string::{JsString, StringBuilder};
use crate::value::{JsObjectRef, JsSymbol, JsValue};

/// Per-realm intrinsics. A heap node, so realm <-> global cycles collect.
pub struct Realm {
    pub(crate) global: JsObjectRef,
    /// Prototype of each class, indexed by class id
    pub(crate) class_protos: Vec<Option<JsObjectRef>>,
    pub(crate) error_protos: Vec<Option<JsObjectRef>>,
    /// Shape of fresh arrays: `length` already in place
    pub(crate) array_shape: Option<Gc<Shape>>,
    pub(crate) modules: IndexMap<JsString, Gc<ModuleDef>>,
}

impl Trace for Realm {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.edge(&self.global);
        self.class_protos.trace(tracer);
        self.error_protos.trace(tracer);
        self.array_shape.trace(tracer);
        for module in self.modules.values() {
            tracer.edge(module);
        }
    }
}

impl GcPayload for Realm {
    const KIND: GcKind = GcKind::Realm;

    fn take_edges(&mut self) -> Box<dyn Any> {
        // The global handle stays; its contents are released with it
        Box::new((
            mem::take(&mut self.class_protos),
            mem::take(&mut self.error_protos),
            self.array_shape.take(),
            mem::take(&mut self.modules),
        ))
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.realm_count += 1;
    }
}

/// Hint for [`Context::to_primitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredType {
    Default,
    Number,
    String,
}

impl PreferredType {
    fn name(self) -> &'static str {
        match self {
            PreferredType::Default => "default",
            PreferredType::Number => "number",
            PreferredType::String => "string",
        }
    }
}

/// An execution context: a runtime plus one realm.
#[derive(Clone)]
pub struct Context {
    // Dropped before the runtime handle
    realm: Gc<Realm>,
    rt: Runtime,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("realm", &self.realm.id())
            .finish()
    }
}

/// Plain object allocated before the realm exists.
fn bootstrap_object(rt: &Rc<RuntimeInner>, proto: Option<&JsObjectRef>) -> JsObjectRef {
    let shape = shape::shape_for_proto(rt, proto);
    rt.heap.alloc(JsObject {
        shape,
        props: Vec::new(),
        class_id: ClassId::OBJECT,
        extensible: true,
        fast_array: false,
        data: ObjectData::Ordinary,
    })
}

impl Context {
    /// New context with a fresh realm.
    pub fn new(rt: &Runtime) -> JsResult<Context> {
        let inner = rt.inner();
        let object_proto = bootstrap_object(inner, None);
        let global = bootstrap_object(inner, Some(&object_proto));
        let mut class_protos = vec![None; ClassId::INIT_COUNT as usize];
        if let Some(slot) = class_protos.get_mut(ClassId::OBJECT.index()) {
            *slot = Some(object_proto);
        }
        let realm = inner.heap.alloc(Realm {
            global,
            class_protos,
            error_protos: vec![None; ErrorKind::ALL.len()],
            array_shape: None,
            modules: index_map_new(),
        });
        let ctx = Context {
            rt: rt.clone(),
            realm,
        };
        ctx.init_intrinsics()?;
        log::debug!("context created, realm node {}", ctx.realm.id());
        Ok(ctx)
    }

    pub(crate) fn from_realm(rt: Runtime, realm: Gc<Realm>) -> Context {
        Context { rt, realm }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        self.rt.inner()
    }

    pub(crate) fn realm(&self) -> &Gc<Realm> {
        &self.realm
    }

    pub fn global_object(&self) -> JsObjectRef {
        self.realm.borrow().global.clone()
    }

    // ------------------------------------------------------------------
    // Intrinsics
    // ------------------------------------------------------------------

    fn init_intrinsics(&self) -> JsResult<()> {
        let object_proto = self.object_proto();

        let function_proto = self.new_object_with_data(
            object_proto.as_ref(),
            ClassId::C_FUNCTION,
            ObjectData::NativeFunction(crate::function::NativeFunction {
                func: function_proto_call,
                length: 0,
                magic: 0,
                data: Vec::new(),
            }),
        )?;
        self.set_class_proto(ClassId::C_FUNCTION, Some(function_proto.clone()));
        self.set_class_proto(ClassId::BYTECODE_FUNCTION, Some(function_proto));

        let array_proto = self.new_object_proto(object_proto.as_ref())?;
        self.set_class_proto(ClassId::ARRAY, Some(array_proto.clone()));
        self.set_class_proto(ClassId::ARGUMENTS, object_proto.clone());
        for class_id in [ClassId::NUMBER, ClassId::STRING, ClassId::BOOLEAN, ClassId::SYMBOL] {
            let proto = self.new_object_proto(object_proto.as_ref())?;
            self.set_class_proto(class_id, Some(proto));
        }
        let buffer_proto = self.new_object_proto(object_proto.as_ref())?;
        self.set_class_proto(ClassId::ARRAY_BUFFER, Some(buffer_proto));
        let typed_proto = self.new_object_proto(object_proto.as_ref())?;
        for kind in TypedArrayKind::ALL {
            let proto = self.new_object_proto(Some(&typed_proto))?;
            self.set_class_proto(kind.class_id(), Some(proto));
        }

        // Shape shared by every new array: one `length` slot
        let template = self.new_object_with_data(
            Some(&array_proto),
            ClassId::ARRAY,
            ObjectData::Array(Vec::new()),
        )?;
        self.add_property(
            &template,
            atoms::LENGTH,
            PropFlags::WRITABLE | PropFlags::LENGTH,
            PropertySlot::Value(JsValue::Int(0)),
        );
        let array_shape = template.borrow().shape.clone();
        self.realm.borrow_mut().array_shape = Some(array_shape);

        self.init_error_protos()?;

        let global = self.global_object();
        self.define_property_value(
            &global,
            atoms::GLOBAL_THIS,
            JsValue::Object(global.clone()),
            PropFlags::WRITABLE | PropFlags::CONFIGURABLE,
        )?;
        self.install_constructor("Object", object_constructor, 1, 0, object_proto.as_ref())?;
        self.install_constructor("Array", array_constructor, 1, 0, Some(&array_proto))?;
        for kind in ErrorKind::ALL {
            let proto = self.error_proto(kind);
            self.install_constructor(kind.name(), error_constructor, 1, kind.index() as i32, proto.as_ref())?;
        }
        Ok(())
    }

    fn init_error_protos(&self) -> JsResult<()> {
        let object_proto = self.object_proto();
        let base = self.new_object_proto(object_proto.as_ref())?;
        self.set_class_proto(ClassId::ERROR, Some(base.clone()));
        for kind in ErrorKind::ALL {
            let proto = if kind == ErrorKind::Error {
                base.clone()
            } else {
                self.new_object_proto(Some(&base))?
            };
            let hidden = PropFlags::WRITABLE | PropFlags::CONFIGURABLE;
            self.define_property_value(&proto, atoms::NAME, JsValue::from(kind.name()), hidden)?;
            self.define_property_value(&proto, atoms::MESSAGE, JsValue::from(""), hidden)?;
            if let Some(slot) = self.realm.borrow_mut().error_protos.get_mut(kind.index()) {
                *slot = Some(proto);
            }
        }
        Ok(())
    }

    fn install_constructor(
        &self,
        name: &str,
        func: crate::function::NativeFn,
        length: u32,
        magic: i32,
        proto: Option<&JsObjectRef>,
    ) -> JsResult<()> {
        let ctor = self.new_native_function_data(func, length, magic, &[])?;
        self.define_property_value(&ctor, atoms::NAME, JsValue::from(name), PropFlags::CONFIGURABLE)?;
        if let Some(proto) = proto {
            self.define_property_value(&ctor, atoms::PROTOTYPE, JsValue::Object(proto.clone()), PropFlags::empty())?;
            self.define_property_value(
                proto,
                atoms::CONSTRUCTOR,
                JsValue::Object(ctor.clone()),
                PropFlags::WRITABLE | PropFlags::CONFIGURABLE,
            )?;
        }
        let global = self.global_object();
        self.define_property_value_str(
            &global,
            name,
            JsValue::Object(ctor),
            PropFlags::WRITABLE | PropFlags::CONFIGURABLE,
        )?;
        Ok(())
    }

    pub(crate) fn object_proto(&self) -> Option<JsObjectRef> {
        self.class_proto(ClassId::OBJECT)
    }

    pub(crate) fn function_proto(&self) -> Option<JsObjectRef> {
        self.class_proto(ClassId::C_FUNCTION)
    }

    /// Prototype used for new instances of `class_id` in this realm.
    pub fn class_proto(&self, class_id: ClassId) -> Option<JsObjectRef> {
        self.realm
            .borrow()
            .class_protos
            .get(class_id.index())
            .cloned()
            .flatten()
    }

    pub fn set_class_proto(&self, class_id: ClassId, proto: Option<JsObjectRef>) {
        let old = {
            let mut realm = self.realm.borrow_mut();
            let protos = &mut realm.class_protos;
            if protos.len() <= class_id.index() {
                protos.resize(class_id.index() + 1, None);
            }
            protos
                .get_mut(class_id.index())
                .and_then(|slot| mem::replace(slot, proto))
        };
        drop(old);
    }

    pub(crate) fn error_proto(&self, kind: ErrorKind) -> Option<JsObjectRef> {
        self.realm
            .borrow()
            .error_protos
            .get(kind.index())
            .cloned()
            .flatten()
    }

    pub(crate) fn array_shape(&self) -> Gc<Shape> {
        let cached = self.realm.borrow().array_shape.clone();
        match cached {
            Some(shape) => shape,
            None => shape::shape_for_proto(self.inner(), self.class_proto(ClassId::ARRAY).as_ref()),
        }
    }

    /// Prototype consulted for property reads on a primitive.
    pub(crate) fn primitive_proto(&self, value: &JsValue) -> Option<JsObjectRef> {
        let class_id = match value {
            JsValue::Boolean(_) => ClassId::BOOLEAN,
            JsValue::Int(_) | JsValue::Float(_) => ClassId::NUMBER,
            JsValue::String(_) => ClassId::STRING,
            JsValue::Symbol(_) => ClassId::SYMBOL,
            _ => return None,
        };
        self.class_proto(class_id)
    }

    pub(crate) fn class_exotic(&self, obj: &JsObjectRef) -> Option<Rc<dyn crate::class::ExoticMethods>> {
        let class_id = obj.borrow().class_id;
        if class_id.0 < ClassId::INIT_COUNT {
            return None;
        }
        self.inner()
            .classes
            .borrow()
            .get(class_id)
            .and_then(|def| def.exotic.clone())
    }

    /// Account for `size` upcoming bytes: maybe collect, then enforce the
    /// memory limit.
    pub(crate) fn reserve_memory(&self, size: usize) -> JsResult<()> {
        let rt = self.inner();
        if rt.heap.maybe_collect(size) {
            log::debug!("gc ran before allocation, threshold now {}", rt.heap.gc_threshold());
        }
        let limit = rt.config.borrow().memory_limit;
        if limit == 0 || rt.heap.allocated_bytes() + size <= limit || rt.in_out_of_memory.get() {
            return Ok(());
        }
        rt.heap.collect();
        if rt.heap.allocated_bytes() + size <= limit {
            return Ok(());
        }
        log::warn!(
            "memory limit of {limit} bytes reached ({} in use)",
            rt.heap.allocated_bytes()
        );
        // Building the error object must not recurse into this path
        rt.in_out_of_memory.set(true);
        let err = self.throw_internal_error("out of memory");
        rt.in_out_of_memory.set(false);
        Err(err)
    }

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------

    /// Park `value` in the exception slot.
    pub fn throw(&self, value: JsValue) -> JsError {
        let old = self.inner().exception.borrow_mut().replace(value);
        if old.is_some() {
            log::warn!("a pending exception was overwritten before being taken");
        }
        drop(old);
        JsError::Exception
    }

    /// Throw a new error of `kind`.
    pub fn throw_error(&self, kind: ErrorKind, message: impl AsRef<str>) -> JsError {
        match self.new_error(kind, message.as_ref()) {
            Ok(err) => self.throw(JsValue::Object(err)),
            Err(e) => e,
        }
    }

    pub fn throw_type_error(&self, message: impl AsRef<str>) -> JsError {
        self.throw_error(ErrorKind::TypeError, message)
    }

    pub fn throw_range_error(&self, message: impl AsRef<str>) -> JsError {
        self.throw_error(ErrorKind::RangeError, message)
    }

    pub fn throw_reference_error(&self, message: impl AsRef<str>) -> JsError {
        self.throw_error(ErrorKind::ReferenceError, message)
    }

    pub fn throw_internal_error(&self, message: impl AsRef<str>) -> JsError {
        self.throw_error(ErrorKind::InternalError, message)
    }

    /// Take the pending exception, clearing the slot.
    pub fn take_exception(&self) -> Option<JsValue> {
        self.rt.take_exception()
    }

    pub fn has_exception(&self) -> bool {
        self.rt.has_exception()
    }

    /// Text describing a failure, consuming the pending exception.
    pub fn exception_report(&self, err: JsError) -> String {
        if !err.is_exception() {
            return err.to_string();
        }
        let Some(value) = self.take_exception() else {
            return err.to_string();
        };
        let mut report = match self.to_string(&value) {
            Ok(s) => s.to_utf8(),
            Err(_) => {
                self.take_exception();
                "<unprintable exception>".to_string()
            }
        };
        if value.is_object() {
            match self.get_property(&value, atoms::STACK) {
                Ok(JsValue::String(stack)) if !stack.is_empty() => {
                    report.push('\n');
                    report.push_str(&stack.to_utf8());
                }
                Ok(_) => {}
                Err(_) => {
                    self.take_exception();
                }
            }
        }
        report
    }

    /// Check the interrupt handler; a stop request throws an uncatchable
    /// InternalError.
    pub(crate) fn poll_interrupt(&self) -> JsResult<()> {
        if !self.inner().poll_interrupt() {
            return Ok(());
        }
        log::debug!("execution interrupted by the host");
        let err = self.new_error(ErrorKind::InternalError, "interrupted")?;
        self.set_uncatchable_error(&JsValue::Object(err.clone()), true);
        Err(self.throw(JsValue::Object(err)))
    }

    // ------------------------------------------------------------------
    // Error objects
    // ------------------------------------------------------------------

    /// Error object of `kind` with an own `message`.
    pub fn new_error(&self, kind: ErrorKind, message: &str) -> JsResult<JsObjectRef> {
        let proto = self.error_proto(kind);
        let obj = self.new_object_with_data(
            proto.as_ref(),
            ClassId::ERROR,
            ObjectData::Error(ErrorData {
                kind,
                uncatchable: false,
            }),
        )?;
        self.add_property(
            &obj,
            atoms::MESSAGE,
            PropFlags::WRITABLE | PropFlags::CONFIGURABLE,
            PropertySlot::Value(JsValue::from(message)),
        );
        Ok(obj)
    }

    /// Error object that also records where it was raised.
    pub fn new_error_with_location(
        &self,
        kind: ErrorKind,
        message: &str,
        file_name: &str,
        line_number: u32,
    ) -> JsResult<JsObjectRef> {
        let obj = self.new_error(kind, message)?;
        let flags = PropFlags::WRITABLE | PropFlags::CONFIGURABLE;
        self.add_property(&obj, atoms::FILE_NAME, flags, PropertySlot::Value(JsValue::from(file_name)));
        self.add_property(&obj, atoms::LINE_NUMBER, flags, PropertySlot::Value(JsValue::from(line_number)));
        Ok(obj)
    }

    pub fn is_error(&self, value: &JsValue) -> bool {
        value
            .as_object()
            .is_some_and(|o| o.borrow().class_id == ClassId::ERROR)
    }

    /// Kind of an error object
    pub fn error_kind(&self, value: &JsValue) -> Option<ErrorKind> {
        let obj = value.as_object()?;
        match &obj.borrow().data {
            ObjectData::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_uncatchable_error(&self, value: &JsValue) -> bool {
        value.as_object().is_some_and(|o| {
            matches!(&o.borrow().data, ObjectData::Error(e) if e.uncatchable)
        })
    }

    pub fn set_uncatchable_error(&self, value: &JsValue, uncatchable: bool) {
        if let Some(obj) = value.as_object() {
            if let ObjectData::Error(e) = &mut obj.borrow_mut().data {
                e.uncatchable = uncatchable;
            }
        }
    }

    // ------------------------------------------------------------------
    // Class instances with host payloads
    // ------------------------------------------------------------------

    /// Instance of a registered class carrying `opaque`.
    ///
    /// The class finalizer receives the payload once when the object dies.
    pub fn new_object_class(
        &self,
        class_id: ClassId,
        opaque: Option<Box<dyn Any>>,
    ) -> JsResult<JsObjectRef> {
        if class_id == ClassId::OBJECT && opaque.is_none() {
            return self.new_object();
        }
        if class_id.0 < ClassId::INIT_COUNT {
            return Err(JsError::InvalidClassId(class_id.0));
        }
        let def = self.inner().classes.borrow().get(class_id).cloned();
        let Some(def) = def else {
            return Err(JsError::InvalidClassId(class_id.0));
        };
        let data = ObjectData::Opaque(OpaqueData {
            value: opaque,
            finalizer: def.finalizer,
            gc_mark: def.gc_mark,
            call: def.call,
        });
        let proto = self.class_proto(class_id).or_else(|| self.object_proto());
        self.new_object_with_data(proto.as_ref(), class_id, data)
    }

    /// Payload of `obj` if it is an instance of `class_id` holding a `T`.
    pub fn opaque<'a, T: Any>(&self, obj: &'a JsObjectRef, class_id: ClassId) -> Option<Ref<'a, T>> {
        Ref::filter_map(obj.borrow(), |o| match &o.data {
            ObjectData::Opaque(data) if o.class_id == class_id => {
                data.value.as_ref().and_then(|b| (**b).downcast_ref::<T>())
            }
            _ => None,
        })
        .ok()
    }

    /// Run `f` on the payload of `obj` mutably.
    pub fn with_opaque<T: Any, R>(
        &self,
        obj: &JsObjectRef,
        class_id: ClassId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let mut o = obj.borrow_mut();
        if o.class_id != class_id {
            return None;
        }
        match &mut o.data {
            ObjectData::Opaque(data) => data
                .value
                .as_mut()
                .and_then(|b| (**b).downcast_mut::<T>())
                .map(f),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    pub fn to_bool(&self, value: &JsValue) -> bool {
        value.to_boolean()
    }

    pub fn to_float64(&self, value: &JsValue) -> JsResult<f64> {
        if let Some(n) = value.primitive_to_number() {
            return Ok(n);
        }
        match value {
            JsValue::Symbol(_) => Err(self.throw_type_error("cannot convert a symbol to a number")),
            JsValue::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::Number)?;
                self.to_float64(&primitive)
            }
            _ => Ok(f64::NAN),
        }
    }

    /// ToNumber, then truncation saturating at the i64 range (NaN gives 0).
    pub fn to_int64(&self, value: &JsValue) -> JsResult<i64> {
        let n = self.to_float64(value)?;
        Ok(n as i64)
    }

    pub fn to_string(&self, value: &JsValue) -> JsResult<JsString> {
        if let Some(s) = value.primitive_to_string() {
            return Ok(s);
        }
        match value {
            JsValue::Symbol(_) => Err(self.throw_type_error("cannot convert a symbol to a string")),
            JsValue::Object(_) => {
                let primitive = self.to_primitive(value, PreferredType::String)?;
                self.to_string(&primitive)
            }
            JsValue::FunctionBytecode(_) => Ok(JsString::from("[function bytecode]")),
            JsValue::Module(_) => Ok(JsString::from("[module]")),
            _ => Ok(JsString::empty()),
        }
    }

    /// ToPrimitive. Objects without script-visible conversion methods fall
    /// back to their wrapped value, array join, `Name: message` for errors
    /// or `[object Class]`.
    pub fn to_primitive(&self, value: &JsValue, hint: PreferredType) -> JsResult<JsValue> {
        let JsValue::Object(obj) = value else {
            return Ok(value.clone());
        };
        let exotic = self.get_property(value, atoms::SYMBOL_TO_PRIMITIVE)?;
        if !exotic.is_null_or_undefined() {
            if !exotic.is_callable() {
                return Err(self.throw_type_error("Symbol.toPrimitive is not a function"));
            }
            let result = self.call(&exotic, value, &[JsValue::from(hint.name())])?;
            if result.is_object() {
                return Err(self.throw_type_error("cannot convert object to primitive value"));
            }
            return Ok(result);
        }
        let order = if hint == PreferredType::String {
            [atoms::TO_STRING, atoms::VALUE_OF]
        } else {
            [atoms::VALUE_OF, atoms::TO_STRING]
        };
        for atom in order {
            let method = self.get_property(value, atom)?;
            if method.is_callable() {
                let result = self.call(&method, value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        self.default_primitive(obj)
    }

    fn default_primitive(&self, obj: &JsObjectRef) -> JsResult<JsValue> {
        let (class_id, wrapped) = {
            let o = obj.borrow();
            let wrapped = match &o.data {
                ObjectData::Primitive(v) => Some(v.clone()),
                _ => None,
            };
            (o.class_id, wrapped)
        };
        if let Some(value) = wrapped {
            return Ok(value);
        }
        let value = JsValue::Object(obj.clone());
        let text = match class_id {
            ClassId::ARRAY => self.join_array(obj)?,
            ClassId::ERROR => self.error_to_string(&value)?,
            _ => self.object_tag(&value)?,
        };
        Ok(JsValue::String(text))
    }

    fn join_array(&self, obj: &JsObjectRef) -> JsResult<JsString> {
        // A cyclic array joins to the empty string at the point of the cycle
        if !self.inner().join_stack.borrow_mut().insert(obj.id()) {
            return Ok(JsString::empty());
        }
        let result = self.join_elements(obj);
        self.inner().join_stack.borrow_mut().remove(&obj.id());
        result
    }

    fn join_elements(&self, obj: &JsObjectRef) -> JsResult<JsString> {
        let receiver = JsValue::Object(obj.clone());
        let max_len = self.inner().config.borrow().max_string_len;
        let mut out = StringBuilder::new().with_limit(max_len);
        let length = self.array_length(obj);
        for i in 0..length {
            if i > 0 {
                out.push_unit(u16::from(b','))
                    .map_err(|_| self.throw_range_error("invalid string length"))?;
            }
            let atom = self.index_atom(i);
            let element = self.get_property(&receiver, atom);
            self.inner().release_atom(atom);
            let element = element?;
            if element.is_null_or_undefined() {
                continue;
            }
            let s = self.to_string(&element)?;
            out.push_js_string(&s)
                .map_err(|_| self.throw_range_error("invalid string length"))?;
        }
        Ok(out.finish())
    }

    fn error_to_string(&self, value: &JsValue) -> JsResult<JsString> {
        let name = match self.get_property(value, atoms::NAME)? {
            JsValue::Undefined => JsString::from("Error"),
            other => self.to_string(&other)?,
        };
        let message = match self.get_property(value, atoms::MESSAGE)? {
            JsValue::Undefined => JsString::empty(),
            other => self.to_string(&other)?,
        };
        if name.is_empty() {
            return Ok(message);
        }
        if message.is_empty() {
            return Ok(name);
        }
        name.concat(&JsString::from(": "))
            .and_then(|s| s.concat(&message))
            .map_err(|_| self.throw_range_error("invalid string length"))
    }

    /// `[object Tag]`, preferring a string `Symbol.toStringTag`.
    fn object_tag(&self, value: &JsValue) -> JsResult<JsString> {
        let tag = match self.get_property(value, atoms::SYMBOL_TO_STRING_TAG)? {
            JsValue::String(s) => s.to_utf8(),
            _ => match value.as_object() {
                Some(obj) if obj.borrow().is_callable() => "Function".to_string(),
                Some(obj) => {
                    let class_id = obj.borrow().class_id;
                    self.rt.class_name(class_id).unwrap_or_else(|| "Object".to_string())
                }
                None => "Object".to_string(),
            },
        };
        Ok(JsString::from(format!("[object {tag}]")))
    }

    // ------------------------------------------------------------------
    // Predicates, strings, symbols and atoms
    // ------------------------------------------------------------------

    pub fn is_function(&self, value: &JsValue) -> bool {
        value.is_callable()
    }

    /// String value from UTF-8 text, checked against the length limit.
    pub fn new_string(&self, text: &str) -> JsResult<JsValue> {
        let s = JsString::from(text);
        if s.len() > self.inner().config.borrow().max_string_len {
            return Err(self.throw_range_error("invalid string length"));
        }
        Ok(JsValue::String(s))
    }

    /// New unique symbol.
    pub fn new_symbol(&self, description: Option<&str>) -> JsValue {
        let text = JsString::from(description.unwrap_or(""));
        let atom = self.inner().atoms.borrow_mut().new_symbol(text, AtomKind::Symbol);
        JsValue::Symbol(JsSymbol::from_owned_atom(atom, self.inner()))
    }

    /// Registry symbol for `key` (`Symbol.for`).
    pub fn symbol_for(&self, key: &str) -> JsValue {
        let atom = self
            .inner()
            .atoms
            .borrow_mut()
            .intern(&JsString::from(key), AtomKind::GlobalSymbol);
        JsValue::Symbol(JsSymbol::from_owned_atom(atom, self.inner()))
    }

    pub fn symbol_description(&self, symbol: &JsSymbol) -> JsString {
        self.atom_text(symbol.atom())
    }

    /// ToPropertyKey. The caller owns the returned atom.
    pub fn value_to_atom(&self, value: &JsValue) -> JsResult<Atom> {
        match value {
            JsValue::Int(n) if *n >= 0 => Ok(self.index_atom(*n as u32)),
            JsValue::String(s) => Ok(self.inner().atoms.borrow_mut().intern(s, AtomKind::String)),
            JsValue::Symbol(sym) => Ok(self.inner().dup_atom(sym.atom())),
            JsValue::Object(_) => {
                let key = self.to_primitive(value, PreferredType::String)?;
                self.value_to_atom(&key)
            }
            other => {
                let s = self.to_string(other)?;
                Ok(self.inner().atoms.borrow_mut().intern(&s, AtomKind::String))
            }
        }
    }

    /// Property key as a value: symbols for symbol atoms, strings otherwise.
    pub fn atom_to_value(&self, atom: Atom) -> JsValue {
        let rt = self.inner();
        if rt.atoms.borrow().is_symbol(atom) {
            JsValue::Symbol(JsSymbol::from_owned_atom(rt.dup_atom(atom), rt))
        } else {
            JsValue::String(rt.atom_text(atom))
        }
    }

    pub fn atom_to_string(&self, atom: Atom) -> JsString {
        self.atom_text(atom)
    }

    pub(crate) fn atom_text(&self, atom: Atom) -> JsString {
        self.inner().atom_text(atom)
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Queue `func(args)` to run in this realm.
    pub fn enqueue_job(&self, func: JobFn, args: &[JsValue]) {
        self.inner().jobs.borrow_mut().push_back(Job {
            func,
            realm: self.realm.clone(),
            args: args.to_vec(),
        });
    }

    // ------------------------------------------------------------------
    // JSON bridging
    // ------------------------------------------------------------------

    /// Build a value from parsed JSON.
    pub fn value_from_json(&self, json: &serde_json::Value) -> JsResult<JsValue> {
        Ok(match json {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => JsValue::from_i64(i),
                None => JsValue::number(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => self.new_string(s)?,
            serde_json::Value::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.value_from_json(item))
                    .collect::<JsResult<Vec<_>>>()?;
                JsValue::Object(self.new_array_from(values)?)
            }
            serde_json::Value::Object(map) => {
                let obj = self.new_object()?;
                for (key, item) in map {
                    let value = self.value_from_json(item)?;
                    self.define_property_value_str(&obj, key, value, PropFlags::C_W_E)?;
                }
                JsValue::Object(obj)
            }
        })
    }

    /// Convert to JSON. Functions, symbols, undefined and non-finite
    /// numbers become `null`; cycles throw a TypeError.
    pub fn value_to_json(&self, value: &JsValue) -> JsResult<serde_json::Value> {
        let mut visited = FxHashSet::default();
        self.value_to_json_with_visited(value, &mut visited)
    }

    fn value_to_json_with_visited(
        &self,
        value: &JsValue,
        visited: &mut FxHashSet<usize>,
    ) -> JsResult<serde_json::Value> {
        Ok(match value {
            JsValue::Null | JsValue::Undefined | JsValue::Symbol(_) => serde_json::Value::Null,
            JsValue::FunctionBytecode(_) | JsValue::Module(_) => serde_json::Value::Null,
            JsValue::Boolean(b) => serde_json::Value::Bool(*b),
            JsValue::Int(n) => serde_json::Value::from(*n),
            JsValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            JsValue::String(s) => serde_json::Value::String(s.to_utf8()),
            JsValue::Object(obj) => {
                if value.is_callable() {
                    return Ok(serde_json::Value::Null);
                }
                let id = obj.id();
                if !visited.insert(id) {
                    return Err(self.throw_type_error("cannot convert a circular structure to JSON"));
                }
                let result = self.object_to_json(obj, visited);
                visited.remove(&id);
                result?
            }
        })
    }

    fn object_to_json(
        &self,
        obj: &JsObjectRef,
        visited: &mut FxHashSet<usize>,
    ) -> JsResult<serde_json::Value> {
        let receiver = JsValue::Object(obj.clone());
        let (class_id, wrapped) = {
            let o = obj.borrow();
            let wrapped = match &o.data {
                ObjectData::Primitive(v) => Some(v.clone()),
                _ => None,
            };
            (o.class_id, wrapped)
        };
        if let Some(inner) = wrapped {
            return self.value_to_json_with_visited(&inner, visited);
        }
        if class_id == ClassId::ARRAY {
            let length = self.array_length(obj);
            let mut items = Vec::with_capacity(length as usize);
            for i in 0..length {
                let atom = self.index_atom(i);
                let element = self.get_property(&receiver, atom);
                self.inner().release_atom(atom);
                items.push(self.value_to_json_with_visited(&element?, visited)?);
            }
            return Ok(serde_json::Value::Array(items));
        }
        let names = self.get_own_property_names(obj, GpnFlags::STRING_MASK | GpnFlags::ENUM_ONLY)?;
        let mut map = serde_json::Map::new();
        let mut failure = None;
        for entry in &names {
            let converted = self
                .get_property(&receiver, entry.atom)
                .and_then(|v| self.value_to_json_with_visited(&v, visited));
            match converted {
                Ok(json) => {
                    map.insert(self.atom_text(entry.atom).to_utf8(), json);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.free_property_names(names);
        match failure {
            Some(e) => Err(e),
            None => Ok(serde_json::Value::Object(map)),
        }
    }
}

// ============================================================================
// Intrinsic constructors
// ============================================================================

fn function_proto_call(
    _ctx: &Context,
    _this: &JsValue,
    _args: &[JsValue],
    _magic: i32,
    _data: &[JsValue],
) -> JsResult<JsValue> {
    Ok(JsValue::Undefined)
}

fn object_constructor(
    ctx: &Context,
    _this: &JsValue,
    args: &[JsValue],
    _magic: i32,
    _data: &[JsValue],
) -> JsResult<JsValue> {
    match args.first() {
        None | Some(JsValue::Undefined | JsValue::Null) => Ok(JsValue::Object(ctx.new_object()?)),
        Some(JsValue::Object(obj)) => Ok(JsValue::Object(obj.clone())),
        Some(other) => Ok(JsValue::Object(ctx.new_primitive_object(other.clone())?)),
    }
}

fn array_constructor(
    ctx: &Context,
    _this: &JsValue,
    args: &[JsValue],
    _magic: i32,
    _data: &[JsValue],
) -> JsResult<JsValue> {
    if let [len @ (JsValue::Int(_) | JsValue::Float(_))] = args {
        let n = ctx.to_float64(len)?;
        if n < 0.0 || n > u32::MAX as f64 || n.fract() != 0.0 {
            return Err(ctx.throw_range_error("invalid array length"));
        }
        let array = ctx.new_array()?;
        ctx.set_array_length(&array, n as u32)?;
        return Ok(JsValue::Object(array));
    }
    Ok(JsValue::Object(ctx.new_array_from(args.to_vec())?))
}

fn error_constructor(
    ctx: &Context,
    _this: &JsValue,
    args: &[JsValue],
    magic: i32,
    _data: &[JsValue],
) -> JsResult<JsValue> {
    let kind = ErrorKind::ALL
        .get(magic as usize)
        .copied()
        .unwrap_or(ErrorKind::Error);
    let message = match args.first() {
        None | Some(JsValue::Undefined) => String::new(),
        Some(value) => ctx.to_string(value)?.to_utf8(),
    };
    Ok(JsValue::Object(ctx.new_error(kind, &message)?))
}
