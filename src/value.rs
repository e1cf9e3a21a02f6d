//! JavaScript value representation
//!
//! The core JsValue type, symbols, and the primitive conversions that need no
//! realm (ToBoolean, number formatting and parsing, strict equality).

use crate::atom::Atom;
use crate::function::FunctionBytecode;
use crate::gc::{Gc, GcPayload, Trace, Tracer};
use crate::module::ModuleDef;
use crate::object::JsObject;
use crate::prelude::*;
use crate::runtime::RuntimeInner;
use crate::string::JsString;

/// Trait for types that have cheap (O(1), reference-counted) clones.
///
/// This trait makes it explicit when a clone is cheap (just incrementing a reference count)
/// vs when it might be expensive (copying data). Types implementing this trait should have
/// O(1) clone operations, typically because they use `Rc` or similar reference counting.
///
/// # Examples
/// - `JsObjectRef` (Gc<JsObject>) - cheap clone
/// - `JsString` (Rc-backed code units) - cheap clone
/// - `JsSymbol` (atom + reference count bump) - cheap clone
pub trait CheapClone: Clone {
    /// Create a cheap (reference-counted) clone of this value.
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

// Implement CheapClone for Rc-based types (Rc<RefCell<T>> is covered by this)
impl<T: ?Sized> CheapClone for Rc<T> {}

impl<T: GcPayload> CheapClone for Gc<T> {}

/// A reference to a heap object
pub type JsObjectRef = Gc<JsObject>;

/// A JavaScript value
#[derive(Clone, Default)]
pub enum JsValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Int(i32),
    Float(f64),
    String(JsString),
    Symbol(JsSymbol),
    Object(JsObjectRef),
    FunctionBytecode(Gc<FunctionBytecode>),
    Module(Gc<ModuleDef>),
}

impl CheapClone for JsValue {}

impl JsValue {
    /// Number value, stored as `Int` when it is an integer that fits in 32 bits.
    pub fn number(n: f64) -> JsValue {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            JsValue::Int(n as i32)
        } else {
            JsValue::Float(n)
        }
    }

    /// Int32 when the value fits, Float64 otherwise.
    pub fn from_i64(n: i64) -> JsValue {
        match i32::try_from(n) {
            Ok(v) => JsValue::Int(v),
            Err(_) => JsValue::Float(n as f64),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, JsValue::Null | JsValue::Undefined)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, JsValue::Int(_) | JsValue::Float(_))
    }

    /// Check if this is a string value
    pub fn is_string(&self) -> bool {
        matches!(self, JsValue::String(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, JsValue::Symbol(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn as_object(&self) -> Option<&JsObjectRef> {
        match self {
            JsValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            JsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Int(n) => Some(*n as f64),
            JsValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Check if this value is callable (a function)
    pub fn is_callable(&self) -> bool {
        match self {
            JsValue::Object(obj) => obj.borrow().is_callable(),
            _ => false,
        }
    }

    /// Get the typeof result for this value
    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object", // Historical quirk
            JsValue::Boolean(_) => "boolean",
            JsValue::Int(_) | JsValue::Float(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::Object(obj) => {
                if obj.borrow().is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
            JsValue::FunctionBytecode(_) | JsValue::Module(_) => "object",
        }
    }

    /// Convert to boolean (ToBoolean)
    pub fn to_boolean(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Boolean(b) => *b,
            JsValue::Int(n) => *n != 0,
            JsValue::Float(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Symbol(_) => true, // Symbols are always truthy
            JsValue::Object(_) | JsValue::FunctionBytecode(_) | JsValue::Module(_) => true,
        }
    }

    /// ToNumber for primitives. Objects and symbols need a context.
    pub fn primitive_to_number(&self) -> Option<f64> {
        match self {
            JsValue::Undefined => Some(f64::NAN),
            JsValue::Null => Some(0.0),
            JsValue::Boolean(true) => Some(1.0),
            JsValue::Boolean(false) => Some(0.0),
            JsValue::Int(n) => Some(*n as f64),
            JsValue::Float(n) => Some(*n),
            JsValue::String(s) => Some(string_to_number(s)),
            _ => None,
        }
    }

    /// ToString for primitives other than symbols.
    pub fn primitive_to_string(&self) -> Option<JsString> {
        match self {
            JsValue::Undefined => Some(JsString::from("undefined")),
            JsValue::Null => Some(JsString::from("null")),
            JsValue::Boolean(true) => Some(JsString::from("true")),
            JsValue::Boolean(false) => Some(JsString::from("false")),
            JsValue::Int(n) => Some(JsString::from(n.to_string())),
            JsValue::Float(n) => Some(JsString::from(number_to_string(*n))),
            JsValue::String(s) => Some(s.cheap_clone()),
            _ => None,
        }
    }

    /// Strict equality (===)
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
            (JsValue::Int(a), JsValue::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => {
                // NaN !== NaN
                a.as_number() == b.as_number()
            }
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => Gc::ptr_eq(a, b),
            (JsValue::FunctionBytecode(a), JsValue::FunctionBytecode(b)) => Gc::ptr_eq(a, b),
            (JsValue::Module(a), JsValue::Module(b)) => Gc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValue: like strict equality, but NaN equals NaN and +0 differs from -0.
    pub fn same_value(&self, other: &JsValue) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            _ => self.strict_equals(other),
        }
    }
}

impl Trace for JsValue {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        match self {
            JsValue::Object(obj) => tracer.edge(obj),
            JsValue::FunctionBytecode(b) => tracer.edge(b),
            JsValue::Module(m) => tracer.edge(m),
            _ => {}
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{}", b),
            JsValue::Int(n) => write!(f, "{}", n),
            JsValue::Float(n) => write!(f, "{}", number_to_string(*n)),
            JsValue::String(s) => write!(f, "{:?}", s),
            JsValue::Symbol(s) => write!(f, "{:?}", s),
            JsValue::Object(obj) => match obj.try_borrow() {
                Some(o) => write!(f, "[object {:?}]", o.class_id()),
                None => write!(f, "[object <busy>]"),
            },
            JsValue::FunctionBytecode(_) => write!(f, "[bytecode]"),
            JsValue::Module(_) => write!(f, "[module]"),
        }
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

// Conversions from Rust types

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Boolean(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Int(n)
    }
}

impl From<u32> for JsValue {
    fn from(n: u32) -> Self {
        JsValue::from_i64(n as i64)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<JsString> for JsValue {
    fn from(s: JsString) -> Self {
        JsValue::String(s)
    }
}

impl From<JsObjectRef> for JsValue {
    fn from(obj: JsObjectRef) -> Self {
        JsValue::Object(obj)
    }
}

impl From<JsSymbol> for JsValue {
    fn from(s: JsSymbol) -> Self {
        JsValue::Symbol(s)
    }
}

// ============================================================================
// JsSymbol
// ============================================================================

/// A symbol value: an owned reference to a symbol atom.
pub struct JsSymbol {
    atom: Atom,
    rt: Weak<RuntimeInner>,
}

impl JsSymbol {
    /// Wrap an atom reference the caller already owns.
    pub(crate) fn from_owned_atom(atom: Atom, rt: &Rc<RuntimeInner>) -> Self {
        Self {
            atom,
            rt: Rc::downgrade(rt),
        }
    }

    pub fn atom(&self) -> Atom {
        self.atom
    }
}

impl Clone for JsSymbol {
    fn clone(&self) -> Self {
        if let Some(rt) = self.rt.upgrade() {
            rt.dup_atom(self.atom);
        }
        Self {
            atom: self.atom,
            rt: self.rt.clone(),
        }
    }
}

impl CheapClone for JsSymbol {}

impl Drop for JsSymbol {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.release_atom(self.atom);
        }
    }
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.atom == other.atom
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.atom.hash(state);
    }
}

impl fmt::Debug for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rt.upgrade() {
            Some(rt) => write!(f, "Symbol({})", rt.atom_text(self.atom)),
            None => write!(f, "Symbol({:?})", self.atom),
        }
    }
}

// ============================================================================
// Number formatting and parsing
// ============================================================================

/// Format a number the way `Number.prototype.toString()` does for radix 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{n}");
    }
    // Exponential form: Rust prints "1e21" / "1.5e-7", JS wants "1e+21" / "1.5e-7"
    let text = format!("{n:e}");
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => text,
    }
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// ToNumber applied to a string.
pub fn string_to_number(s: &JsString) -> f64 {
    let text = s.to_utf8();
    let t = text.trim_matches(is_js_whitespace);
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = t.get(2..).unwrap_or_default();
        if digits.is_empty() {
            return f64::NAN;
        }
        let mut value = 0.0f64;
        for c in digits.chars() {
            match c.to_digit(radix) {
                Some(d) => value = value * radix as f64 + d as f64,
                None => return f64::NAN,
            }
        }
        return value;
    }
    let plausible = t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !plausible {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}
