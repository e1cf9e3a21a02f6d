//! ArrayBuffer and typed array storage.

use crate::class::ClassId;
use crate::context::Context;
use crate::error::JsResult;
use crate::value::{JsObjectRef, JsValue};

use super::{ArrayBufferData, ObjectData, TypedArrayData};

/// Element type of a typed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedArrayKind {
    Uint8Clamped,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl TypedArrayKind {
    pub const ALL: [TypedArrayKind; 9] = [
        TypedArrayKind::Uint8Clamped,
        TypedArrayKind::Int8,
        TypedArrayKind::Uint8,
        TypedArrayKind::Int16,
        TypedArrayKind::Uint16,
        TypedArrayKind::Int32,
        TypedArrayKind::Uint32,
        TypedArrayKind::Float32,
        TypedArrayKind::Float64,
    ];

    /// Bytes per element
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Uint8Clamped | TypedArrayKind::Int8 | TypedArrayKind::Uint8 => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 => 8,
        }
    }

    pub fn class_id(self) -> ClassId {
        match self {
            TypedArrayKind::Uint8Clamped => ClassId::UINT8C_ARRAY,
            TypedArrayKind::Int8 => ClassId::INT8_ARRAY,
            TypedArrayKind::Uint8 => ClassId::UINT8_ARRAY,
            TypedArrayKind::Int16 => ClassId::INT16_ARRAY,
            TypedArrayKind::Uint16 => ClassId::UINT16_ARRAY,
            TypedArrayKind::Int32 => ClassId::INT32_ARRAY,
            TypedArrayKind::Uint32 => ClassId::UINT32_ARRAY,
            TypedArrayKind::Float32 => ClassId::FLOAT32_ARRAY,
            TypedArrayKind::Float64 => ClassId::FLOAT64_ARRAY,
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<JsValue> {
        let value = match self {
            TypedArrayKind::Uint8Clamped | TypedArrayKind::Uint8 => {
                JsValue::Int(i32::from(*bytes.first()?))
            }
            TypedArrayKind::Int8 => JsValue::Int(i32::from(i8::from_ne_bytes([*bytes.first()?]))),
            TypedArrayKind::Int16 => {
                JsValue::Int(i32::from(i16::from_ne_bytes(bytes.try_into().ok()?)))
            }
            TypedArrayKind::Uint16 => {
                JsValue::Int(i32::from(u16::from_ne_bytes(bytes.try_into().ok()?)))
            }
            TypedArrayKind::Int32 => JsValue::Int(i32::from_ne_bytes(bytes.try_into().ok()?)),
            TypedArrayKind::Uint32 => {
                JsValue::from_i64(i64::from(u32::from_ne_bytes(bytes.try_into().ok()?)))
            }
            TypedArrayKind::Float32 => {
                JsValue::number(f64::from(f32::from_ne_bytes(bytes.try_into().ok()?)))
            }
            TypedArrayKind::Float64 => JsValue::number(f64::from_ne_bytes(bytes.try_into().ok()?)),
        };
        Some(value)
    }

    fn encode(self, n: f64, out: &mut [u8]) {
        match self {
            TypedArrayKind::Uint8Clamped => out.copy_from_slice(&[clamp_u8(n)]),
            TypedArrayKind::Int8 => out.copy_from_slice(&(to_uint32(n) as i8).to_ne_bytes()),
            TypedArrayKind::Uint8 => out.copy_from_slice(&(to_uint32(n) as u8).to_ne_bytes()),
            TypedArrayKind::Int16 => out.copy_from_slice(&(to_uint32(n) as i16).to_ne_bytes()),
            TypedArrayKind::Uint16 => out.copy_from_slice(&(to_uint32(n) as u16).to_ne_bytes()),
            TypedArrayKind::Int32 => out.copy_from_slice(&(to_uint32(n) as i32).to_ne_bytes()),
            TypedArrayKind::Uint32 => out.copy_from_slice(&to_uint32(n).to_ne_bytes()),
            TypedArrayKind::Float32 => out.copy_from_slice(&(n as f32).to_ne_bytes()),
            TypedArrayKind::Float64 => out.copy_from_slice(&n.to_ne_bytes()),
        }
    }
}

/// ToUint32: truncate, then wrap modulo 2^32.
fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Uint8Clamped conversion: clamp, then round half to even.
fn clamp_u8(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let floor = n.floor();
    let diff = n - floor;
    let rounded = if diff > 0.5 || (diff == 0.5 && floor % 2.0 != 0.0) {
        floor + 1.0
    } else {
        floor
    };
    rounded as u8
}

/// Elements currently reachable: zero once the buffer is detached.
pub(crate) fn live_length(t: &TypedArrayData) -> usize {
    match &t.buffer.borrow().data {
        ObjectData::ArrayBuffer(b) if !b.detached => {
            let fits = t.offset + t.length * t.kind.element_size() <= b.bytes.len();
            if fits { t.length } else { 0 }
        }
        _ => 0,
    }
}

pub(crate) fn read_element(t: &TypedArrayData, index: usize) -> Option<JsValue> {
    if index >= live_length(t) {
        return None;
    }
    let size = t.kind.element_size();
    let start = t.offset + index * size;
    let buffer = t.buffer.borrow();
    match &buffer.data {
        ObjectData::ArrayBuffer(b) => t.kind.decode(b.bytes.get(start..start + size)?),
        _ => None,
    }
}

/// Store `n` at `index`. False when the index is out of bounds.
pub(crate) fn write_element(obj: &JsObjectRef, index: usize, n: f64) -> bool {
    let o = obj.borrow();
    let ObjectData::TypedArray(t) = &o.data else {
        return false;
    };
    if index >= live_length(t) {
        return false;
    }
    let size = t.kind.element_size();
    let start = t.offset + index * size;
    let mut buffer = t.buffer.borrow_mut();
    match &mut buffer.data {
        ObjectData::ArrayBuffer(b) => match b.bytes.get_mut(start..start + size) {
            Some(out) => {
                t.kind.encode(n, out);
                true
            }
            None => false,
        },
        _ => false,
    }
}

impl Context {
    /// New ArrayBuffer holding a copy of `bytes`
    pub fn new_array_buffer(&self, bytes: &[u8]) -> JsResult<JsObjectRef> {
        self.new_array_buffer_from_vec(bytes.to_vec())
    }

    pub fn new_array_buffer_from_vec(&self, bytes: Vec<u8>) -> JsResult<JsObjectRef> {
        let proto = self.class_proto(ClassId::ARRAY_BUFFER);
        let data = ObjectData::ArrayBuffer(ArrayBufferData {
            bytes,
            detached: false,
        });
        self.new_object_with_data(proto.as_ref(), ClassId::ARRAY_BUFFER, data)
    }

    /// Copy of the contents of an ArrayBuffer.
    pub fn array_buffer_bytes(&self, value: &JsValue) -> JsResult<Vec<u8>> {
        let obj = self.expect_array_buffer(value)?;
        self.with_array_buffer(&obj, |bytes| bytes.to_vec())
    }

    /// Run `f` over the bytes of an ArrayBuffer without copying.
    pub fn with_array_buffer<R>(
        &self,
        obj: &JsObjectRef,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> JsResult<R> {
        let mut o = obj.borrow_mut();
        match &mut o.data {
            ObjectData::ArrayBuffer(b) if !b.detached => Ok(f(&mut b.bytes)),
            ObjectData::ArrayBuffer(_) => {
                drop(o);
                Err(self.throw_type_error("ArrayBuffer is detached"))
            }
            _ => {
                drop(o);
                Err(self.throw_type_error("not an ArrayBuffer"))
            }
        }
    }

    /// Release the bytes of an ArrayBuffer; views over it read as empty.
    pub fn detach_array_buffer(&self, obj: &JsObjectRef) -> JsResult<()> {
        let freed = {
            let mut o = obj.borrow_mut();
            match &mut o.data {
                ObjectData::ArrayBuffer(b) => {
                    b.detached = true;
                    Some(std::mem::take(&mut b.bytes))
                }
                _ => None,
            }
        };
        match freed {
            Some(bytes) => {
                drop(bytes);
                obj.update_size();
                Ok(())
            }
            None => Err(self.throw_type_error("not an ArrayBuffer")),
        }
    }

    fn expect_array_buffer(&self, value: &JsValue) -> JsResult<JsObjectRef> {
        match value.as_object() {
            Some(obj) if obj.borrow().class_id == ClassId::ARRAY_BUFFER => Ok(obj.clone()),
            _ => Err(self.throw_type_error("not an ArrayBuffer")),
        }
    }

    /// New zero-filled typed array with its own buffer.
    pub fn new_typed_array(&self, kind: TypedArrayKind, length: usize) -> JsResult<JsObjectRef> {
        let Some(byte_length) = length.checked_mul(kind.element_size()) else {
            return Err(self.throw_range_error("invalid typed array length"));
        };
        let buffer = self.new_array_buffer_from_vec(vec![0; byte_length])?;
        self.new_typed_array_with_buffer(kind, &buffer, 0, Some(length))
    }

    /// View over `buffer` starting at `byte_offset`. Without `length` the
    /// view extends to the end of the buffer.
    pub fn new_typed_array_with_buffer(
        &self,
        kind: TypedArrayKind,
        buffer: &JsObjectRef,
        byte_offset: usize,
        length: Option<usize>,
    ) -> JsResult<JsObjectRef> {
        let size = kind.element_size();
        let buffer_len = {
            let b = buffer.borrow();
            match &b.data {
                ObjectData::ArrayBuffer(data) if !data.detached => Some(data.bytes.len()),
                _ => None,
            }
        };
        let Some(buffer_len) = buffer_len else {
            return Err(self.throw_type_error("not a live ArrayBuffer"));
        };
        if byte_offset % size != 0 {
            return Err(self.throw_range_error("start offset must be a multiple of the element size"));
        }
        if byte_offset > buffer_len {
            return Err(self.throw_range_error("start offset is outside the buffer"));
        }
        let length = match length {
            Some(length) => length,
            None => {
                if (buffer_len - byte_offset) % size != 0 {
                    return Err(self.throw_range_error("buffer length must be a multiple of the element size"));
                }
                (buffer_len - byte_offset) / size
            }
        };
        let fits = length
            .checked_mul(size)
            .and_then(|bytes| bytes.checked_add(byte_offset))
            .is_some_and(|end| end <= buffer_len);
        if !fits {
            return Err(self.throw_range_error("invalid typed array length"));
        }
        let class_id = kind.class_id();
        let proto = self.class_proto(class_id);
        let data = ObjectData::TypedArray(TypedArrayData {
            kind,
            buffer: buffer.clone(),
            offset: byte_offset,
            length,
        });
        self.new_object_with_data(proto.as_ref(), class_id, data)
    }

    /// Element count of a typed array (zero once its buffer is detached).
    pub fn typed_array_length(&self, obj: &JsObjectRef) -> JsResult<usize> {
        match &obj.borrow().data {
            ObjectData::TypedArray(t) => Ok(live_length(t)),
            _ => Err(self.throw_type_error("not a typed array")),
        }
    }

    /// The ArrayBuffer behind a typed array.
    pub fn typed_array_buffer(&self, obj: &JsObjectRef) -> JsResult<JsObjectRef> {
        match &obj.borrow().data {
            ObjectData::TypedArray(t) => Ok(t.buffer.clone()),
            _ => Err(self.throw_type_error("not a typed array")),
        }
    }
}
