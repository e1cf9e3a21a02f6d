//! Core of a QuickJS-style JavaScript engine: atoms, strings, shapes,
//! objects, garbage collection, contexts and modules.
//!
//! # Example
//!
//! ```
//! use qjs_core::{Context, JsValue, PropFlags, Runtime};
//!
//! let rt = Runtime::new();
//! let ctx = Context::new(&rt).unwrap();
//! let obj = ctx.new_object().unwrap();
//! ctx.define_property_value_str(&obj, "answer", JsValue::from(42), PropFlags::C_W_E)
//!     .unwrap();
//! let value = ctx
//!     .get_property_str(&JsValue::Object(obj), "answer")
//!     .unwrap();
//! assert_eq!(value.as_number(), Some(42.0));
//! ```

pub mod atom;
pub mod class;
pub mod config;
pub mod context;
pub mod error;
pub mod function;
pub mod gc;
pub mod memory;
pub mod module;
pub mod object;
pub mod prelude;
pub mod runtime;
pub mod shape;
pub mod string;
pub mod value;

pub use atom::{Atom, AtomKind, atoms};
pub use class::{ClassCall, ClassDef, ClassId, ExoticMethods, Finalizer, GcMark};
pub use config::RuntimeConfig;
pub use context::{Context, PreferredType, Realm};
pub use error::{ErrorKind, InvalidStringLength, JsError, JsResult};
pub use function::{AsyncFrame, ClosureVar, FunctionBytecode, NativeFn, VarRef};
pub use gc::{Gc, GcCycleStats, GcKind, GcStats, Trace, Tracer, WeakGc};
pub use memory::MemoryUsage;
pub use module::ModuleDef;
pub use object::{
    GpnFlags, JsObject, ObjectData, PropertyDescriptor, PropertyEnum, SetOutcome, TypedArrayKind,
};
pub use runtime::{InterruptHandler, JobFn, Runtime};
pub use shape::{PropFlags, Shape};
pub use string::{JsString, StringBuilder};
pub use value::{CheapClone, JsObjectRef, JsSymbol, JsValue};
