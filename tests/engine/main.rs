//! Integration tests for the engine core, organized by feature
//!
//! These tests exercise the runtime through the public API.
//!
//! ## Aggressive Test Defaults
//!
//! Tests use aggressive defaults to catch bugs early:
//! - `QJS_GC_THRESHOLD=1` - collect as soon as anything is allocated
//!
//! Override via environment variables:
//!
//! ```bash
//! cargo test                                # Default: aggressive settings
//! QJS_GC_THRESHOLD=100000 cargo test        # Less aggressive GC for faster runs
//! QJS_GC_THRESHOLD=0 cargo test             # Disable automatic GC
//! ```

mod arrays;
mod atoms;
mod classes;
mod config_memory;
mod gc;
mod jobs;
mod modules;
mod objects;
mod shapes;
mod strings;

use qjs_core::{Context, ErrorKind, JsError, JsValue, Runtime};

/// Create a runtime with aggressive defaults for testing:
/// - QJS_GC_THRESHOLD=1 (collect on the first allocation past one byte) to
///   catch GC bugs
pub fn create_test_runtime() -> Runtime {
    let rt = Runtime::new();
    let gc_threshold = std::env::var("QJS_GC_THRESHOLD")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);
    rt.set_gc_threshold(gc_threshold);
    rt
}

/// Runtime plus a fresh context on it.
pub fn create_test_context() -> Context {
    let rt = create_test_runtime();
    Context::new(&rt).unwrap()
}

/// Take the pending exception after `err` and return its kind and message.
pub fn take_error(ctx: &Context, err: JsError) -> (ErrorKind, String) {
    assert_eq!(err, JsError::Exception, "expected a thrown value");
    let value = ctx.take_exception().expect("exception slot should be filled");
    let kind = ctx
        .error_kind(&value)
        .unwrap_or_else(|| panic!("thrown value is not an error: {value:?}"));
    let message = ctx.get_property_str(&value, "message").unwrap();
    (kind, ctx.to_string(&message).unwrap().to_utf8())
}

/// Number stored in `value`, panicking on anything else.
pub fn num(value: &JsValue) -> f64 {
    value
        .as_number()
        .unwrap_or_else(|| panic!("expected a number, got {value:?}"))
}
