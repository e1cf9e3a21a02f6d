//! Functions and their storage
//!
//! Native functions, bytecode function records, closure variable cells and
//! suspended frames. Executing bytecode is not part of this crate: closures
//! can be created, traced and collected, but calling one reports an
//! `InternalError`.

use crate::atom::{Atom, atoms};
use crate::class::ClassId;
use crate::context::Context;
use crate::error::JsResult;
use crate::gc::{Gc, GcKind, GcPayload, Heap, Trace, Tracer};
use crate::memory::MemoryUsage;
use crate::object::{ObjectData, OpaqueData};
use crate::prelude::*;
use crate::shape::PropFlags;
use crate::string::JsString;
use crate::value::{JsObjectRef, JsValue};

/// Native function signature: `(ctx, this, args, magic, data)`.
///
/// `magic` and `data` are the values given when the function was created,
/// so one Rust function can back several script functions.
pub type NativeFn = fn(&Context, &JsValue, &[JsValue], i32, &[JsValue]) -> JsResult<JsValue>;

/// Estimated native stack bytes per nested call, for the depth limit
const FRAME_SIZE_ESTIMATE: usize = 4096;

/// Payload of a native function object
#[derive(Clone)]
pub struct NativeFunction {
    pub func: NativeFn,
    pub length: u32,
    pub magic: i32,
    /// Values bound at creation, passed back on every call
    pub data: Vec<JsValue>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("length", &self.length)
            .field("magic", &self.magic)
            .field("data", &self.data.len())
            .finish()
    }
}

/// Payload of a bytecode function object
pub struct Closure {
    pub bytecode: Gc<FunctionBytecode>,
    /// Captured bindings, one per closure variable of the bytecode
    pub var_refs: Vec<Gc<VarRef>>,
}

/// A variable binding shared between a scope and the closures capturing it.
#[derive(Debug, Default)]
pub struct VarRef {
    pub(crate) value: JsValue,
    /// False while the binding is in its temporal dead zone
    pub(crate) initialized: bool,
}

impl VarRef {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Trace for VarRef {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.value.trace(tracer);
    }
}

impl GcPayload for VarRef {
    const KIND: GcKind = GcKind::VarRef;

    fn take_edges(&mut self) -> Box<dyn Any> {
        Box::new(mem::take(&mut self.value))
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.var_ref_count += 1;
        if let JsValue::String(s) = &self.value {
            usage.add_string(s);
        }
    }
}

/// Where a closure variable comes from in the enclosing function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureVar {
    pub name: JsString,
    /// Local slot of the parent when `is_local`, else its closure slot
    pub var_index: u16,
    pub is_local: bool,
    pub is_const: bool,
    pub is_lexical: bool,
}

/// Compiled form of a function, shared by every closure created from it.
#[derive(Default)]
pub struct FunctionBytecode {
    pub name: JsString,
    pub filename: JsString,
    pub line_num: u32,
    pub arg_count: u16,
    pub var_count: u16,
    pub stack_size: u16,
    pub byte_code: Vec<u8>,
    /// Constants referenced by the code, including nested function records
    pub cpool: Vec<JsValue>,
    pub closure_vars: Vec<ClosureVar>,
}

impl fmt::Debug for FunctionBytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBytecode")
            .field("name", &self.name)
            .field("args", &self.arg_count)
            .field("code", &self.byte_code.len())
            .finish()
    }
}

impl Trace for FunctionBytecode {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.cpool.trace(tracer);
    }
}

impl GcPayload for FunctionBytecode {
    const KIND: GcKind = GcKind::FunctionBytecode;

    fn take_edges(&mut self) -> Box<dyn Any> {
        Box::new(mem::take(&mut self.cpool))
    }

    fn extra_size(&self) -> usize {
        self.byte_code.capacity()
            + self.cpool.capacity() * mem::size_of::<JsValue>()
            + self.closure_vars.capacity() * mem::size_of::<ClosureVar>()
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.js_func_count += 1;
        usage.js_func_size += mem::size_of::<FunctionBytecode>() + self.extra_size();
        usage.js_func_code_size += self.byte_code.len();
        usage.add_string(&self.name);
        usage.add_string(&self.filename);
        for value in &self.cpool {
            if let JsValue::String(s) = value {
                usage.add_string(s);
            }
        }
    }
}

/// Saved state of a suspended generator or async function.
pub struct AsyncFrame {
    pub func: JsValue,
    pub this: JsValue,
    pub args: Vec<JsValue>,
    pub locals: Vec<JsValue>,
    /// Value stack; entries at `sp` and above are free
    pub stack: Vec<JsValue>,
    pub sp: usize,
    /// Resume offset into the bytecode
    pub pc: usize,
}

impl AsyncFrame {
    pub fn push(&mut self, value: JsValue) -> bool {
        match self.stack.get_mut(self.sp) {
            Some(slot) => {
                *slot = value;
                self.sp += 1;
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<JsValue> {
        if self.sp == 0 {
            return None;
        }
        self.sp -= 1;
        self.stack.get_mut(self.sp).map(mem::take)
    }
}

impl Trace for AsyncFrame {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.func.trace(tracer);
        self.this.trace(tracer);
        self.args.trace(tracer);
        self.locals.trace(tracer);
        self.stack.trace(tracer);
    }
}

impl GcPayload for AsyncFrame {
    const KIND: GcKind = GcKind::AsyncFrame;

    fn take_edges(&mut self) -> Box<dyn Any> {
        self.sp = 0;
        Box::new((
            mem::take(&mut self.func),
            mem::take(&mut self.this),
            mem::take(&mut self.args),
            mem::take(&mut self.locals),
            mem::take(&mut self.stack),
        ))
    }

    fn extra_size(&self) -> usize {
        (self.args.capacity() + self.locals.capacity() + self.stack.capacity())
            * mem::size_of::<JsValue>()
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.async_frame_count += 1;
    }
}

/// Decrements the call depth when a call returns.
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

enum Callee {
    Native(NativeFn, i32, Vec<JsValue>),
    Bytecode,
    Class(crate::class::ClassCall),
}

impl Context {
    /// New native function object with `name` and `length` properties.
    pub fn new_native_function(&self, name: &str, func: NativeFn, length: u32) -> JsResult<JsObjectRef> {
        let obj = self.new_native_function_data(func, length, 0, &[])?;
        self.define_property_value(
            &obj,
            atoms::NAME,
            JsValue::from(name),
            PropFlags::CONFIGURABLE,
        )?;
        Ok(obj)
    }

    /// Native function carrying `magic` and a copy of `data`.
    pub fn new_native_function_data(
        &self,
        func: NativeFn,
        length: u32,
        magic: i32,
        data: &[JsValue],
    ) -> JsResult<JsObjectRef> {
        let proto = self.function_proto();
        let payload = ObjectData::NativeFunction(NativeFunction {
            func,
            length,
            magic,
            data: data.to_vec(),
        });
        let obj = self.new_object_with_data(proto.as_ref(), ClassId::C_FUNCTION, payload)?;
        self.define_property_value(
            &obj,
            atoms::LENGTH,
            JsValue::from(length),
            PropFlags::CONFIGURABLE,
        )?;
        Ok(obj)
    }

    /// Register a function record with the heap.
    pub fn new_function_bytecode(&self, bytecode: FunctionBytecode) -> JsResult<Gc<FunctionBytecode>> {
        self.reserve_memory(Heap::node_size(&bytecode))?;
        Ok(self.inner().heap.alloc(bytecode))
    }

    /// Function object for `bytecode` with its captured bindings.
    pub fn new_closure(
        &self,
        bytecode: &Gc<FunctionBytecode>,
        var_refs: Vec<Gc<VarRef>>,
    ) -> JsResult<JsObjectRef> {
        let (name, length) = {
            let b = bytecode.borrow();
            (b.name.clone(), b.arg_count)
        };
        let proto = self.function_proto();
        let payload = ObjectData::Closure(Closure {
            bytecode: bytecode.clone(),
            var_refs,
        });
        let obj = self.new_object_with_data(proto.as_ref(), ClassId::BYTECODE_FUNCTION, payload)?;
        self.define_property_value(&obj, atoms::LENGTH, JsValue::from(u32::from(length)), PropFlags::CONFIGURABLE)?;
        self.define_property_value(&obj, atoms::NAME, JsValue::String(name), PropFlags::CONFIGURABLE)?;
        Ok(obj)
    }

    /// New binding cell. `None` leaves it uninitialized.
    pub fn new_var_ref(&self, value: Option<JsValue>) -> JsResult<Gc<VarRef>> {
        let cell = VarRef {
            initialized: value.is_some(),
            value: value.unwrap_or_default(),
        };
        self.reserve_memory(Heap::node_size(&cell))?;
        Ok(self.inner().heap.alloc(cell))
    }

    /// Suspended frame with room for `var_count` locals and `stack_size` values.
    pub fn new_async_frame(
        &self,
        func: JsValue,
        this: JsValue,
        args: &[JsValue],
        var_count: usize,
        stack_size: usize,
    ) -> JsResult<Gc<AsyncFrame>> {
        let frame = AsyncFrame {
            func,
            this,
            args: args.to_vec(),
            locals: vec![JsValue::Undefined; var_count],
            stack: vec![JsValue::Undefined; stack_size],
            sp: 0,
            pc: 0,
        };
        self.reserve_memory(Heap::node_size(&frame))?;
        Ok(self.inner().heap.alloc(frame))
    }

    /// Value of a binding, throwing a ReferenceError inside its dead zone.
    pub fn get_var_ref(&self, cell: &Gc<VarRef>) -> JsResult<JsValue> {
        self.read_var_ref(cell, Atom::NULL)
    }

    /// Assign an initialized binding.
    pub fn set_var_ref(&self, cell: &Gc<VarRef>, value: JsValue) -> JsResult<()> {
        self.write_var_ref(cell, Atom::NULL, value)
    }

    /// End the dead zone of a binding by giving it its first value.
    pub fn initialize_var_ref(&self, cell: &Gc<VarRef>, value: JsValue) {
        let old = {
            let mut c = cell.borrow_mut();
            c.initialized = true;
            mem::replace(&mut c.value, value)
        };
        drop(old);
    }

    pub(crate) fn read_var_ref(&self, cell: &Gc<VarRef>, name: Atom) -> JsResult<JsValue> {
        let value = {
            let c = cell.borrow();
            c.initialized.then(|| c.value.clone())
        };
        match value {
            Some(value) => Ok(value),
            None => Err(self.throw_uninitialized(name)),
        }
    }

    pub(crate) fn write_var_ref(&self, cell: &Gc<VarRef>, name: Atom, value: JsValue) -> JsResult<()> {
        if !cell.borrow().initialized {
            return Err(self.throw_uninitialized(name));
        }
        let old = mem::replace(&mut cell.borrow_mut().value, value);
        drop(old);
        Ok(())
    }

    fn throw_uninitialized(&self, name: Atom) -> crate::error::JsError {
        if name.is_null() {
            self.throw_reference_error("variable is not initialized")
        } else {
            self.throw_reference_error(format!("{} is not initialized", self.atom_text(name)))
        }
    }

    /// Call `func` with `this` and `args`.
    pub fn call(&self, func: &JsValue, this: &JsValue, args: &[JsValue]) -> JsResult<JsValue> {
        self.poll_interrupt()?;
        let Some(obj) = func.as_object() else {
            return Err(self.throw_type_error("not a function"));
        };
        let callee = {
            let o = obj.borrow();
            match &o.data {
                ObjectData::NativeFunction(f) => Some(Callee::Native(f.func, f.magic, f.data.clone())),
                ObjectData::Closure(_) => Some(Callee::Bytecode),
                ObjectData::Opaque(OpaqueData { call: Some(call), .. }) => Some(Callee::Class(*call)),
                _ => None,
            }
        };
        let Some(callee) = callee else {
            return Err(self.throw_type_error("not a function"));
        };

        let rt = self.inner();
        let limit = rt.config.borrow().max_stack_size / FRAME_SIZE_ESTIMATE;
        let depth = rt.call_depth.get();
        if limit > 0 && depth >= limit {
            return Err(self.throw_range_error("Maximum call stack size exceeded"));
        }
        rt.call_depth.set(depth + 1);
        let _guard = DepthGuard(&rt.call_depth);

        match callee {
            Callee::Native(f, magic, data) => f(self, this, args, magic, &data),
            Callee::Class(call) => call(self, obj, this, args),
            Callee::Bytecode => Err(self.throw_internal_error("bytecode execution is not available")),
        }
    }
}
