//! Error types for the engine core

use thiserror::Error;

/// The native error constructors every realm provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    Error,
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    URIError,
    InternalError,
    AggregateError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Error,
        ErrorKind::EvalError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::URIError,
        ErrorKind::InternalError,
        ErrorKind::AggregateError,
    ];

    /// Constructor name, also the default `name` of error instances
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::URIError => "URIError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::AggregateError => "AggregateError",
        }
    }

    /// Slot of this kind in a realm's error prototype table
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type of the engine core.
///
/// JavaScript exceptions never travel inside this type: the thrown value is
/// parked in the runtime's exception slot and `Exception` only marks that
/// one is pending. Take it with `Context::take_exception`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JsError {
    /// Marker error indicating a value was thrown (actual value stored in the runtime)
    #[error("exception pending")]
    Exception,

    #[error("class id {0} is already registered")]
    ClassAlreadyRegistered(u32),

    #[error("class id {0} is not registered")]
    InvalidClassId(u32),
}

impl JsError {
    pub fn is_exception(&self) -> bool {
        matches!(self, JsError::Exception)
    }
}

pub type JsResult<T> = Result<T, JsError>;

/// Raised by string builders when a result would exceed the maximum length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid string length")]
pub struct InvalidStringLength;
