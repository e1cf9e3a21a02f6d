//! Immutable JavaScript strings.
//!
//! A string stores either 8-bit (Latin-1) or 16-bit (UTF-16) code units. The
//! 16-bit form is only used when some unit exceeds 0xFF, and operations that
//! can drop those units (like `substring`) narrow the result again.

use crate::config::MAX_STRING_LEN;
use crate::error::InvalidStringLength;
use crate::prelude::*;
use crate::value::CheapClone;

/// A reference-counted, immutable sequence of UTF-16 code units.
#[derive(Clone)]
pub struct JsString(Rc<StringData>);

// JsString wraps an Rc, so clone is cheap (just reference count increment)
impl CheapClone for JsString {}

struct StringData {
    repr: Repr,
    /// Id of the atom this allocation backs, 0 for plain strings
    atom: Cell<u32>,
}

#[derive(Clone)]
enum Repr {
    Latin1(Vec<u8>),
    Utf16(Vec<u16>),
}

impl JsString {
    fn from_repr(repr: Repr) -> Self {
        JsString(Rc::new(StringData {
            repr,
            atom: Cell::new(0),
        }))
    }

    pub fn empty() -> Self {
        Self::from_repr(Repr::Latin1(Vec::new()))
    }

    /// Build from Latin-1 code units.
    ///
    /// Like every unchecked constructor here (including the `From` impls),
    /// this does not enforce `MAX_STRING_LEN`. Host input of unknown size
    /// goes through the `try_` constructors.
    pub fn from_latin1(bytes: Vec<u8>) -> Self {
        Self::from_repr(Repr::Latin1(bytes))
    }

    pub fn try_from_latin1(bytes: Vec<u8>) -> Result<Self, InvalidStringLength> {
        check_len(bytes.len())?;
        Ok(Self::from_latin1(bytes))
    }

    pub fn try_from_utf16(units: Vec<u16>) -> Result<Self, InvalidStringLength> {
        check_len(units.len())?;
        Ok(Self::from_utf16(units))
    }

    pub fn try_from_str(s: &str) -> Result<Self, InvalidStringLength> {
        // A UTF-16 length never exceeds the UTF-8 byte length
        if s.len() > MAX_STRING_LEN {
            check_len(s.encode_utf16().count())?;
        }
        Ok(Self::from(s))
    }

    /// Build from UTF-16 code units, narrowing to 8-bit storage when possible.
    pub fn from_utf16(units: Vec<u16>) -> Self {
        if units.iter().all(|&u| u <= 0xFF) {
            Self::from_latin1(units.into_iter().map(|u| u as u8).collect())
        } else {
            Self::from_repr(Repr::Utf16(units))
        }
    }

    /// Decode UTF-8. Invalid sequences become U+FFFD.
    pub fn from_utf8(bytes: &[u8]) -> Self {
        if bytes.is_ascii() {
            return Self::from_latin1(bytes.to_vec());
        }
        let text = String::from_utf8_lossy(bytes);
        Self::from(text.as_ref())
    }

    pub fn len(&self) -> usize {
        match &self.0.repr {
            Repr::Latin1(v) => v.len(),
            Repr::Utf16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the string uses 16-bit storage
    pub fn is_wide(&self) -> bool {
        matches!(self.0.repr, Repr::Utf16(_))
    }

    pub fn unit_at(&self, index: usize) -> Option<u16> {
        match &self.0.repr {
            Repr::Latin1(v) => v.get(index).map(|&b| b as u16),
            Repr::Utf16(v) => v.get(index).copied(),
        }
    }

    pub fn units(&self) -> Units<'_> {
        match &self.0.repr {
            Repr::Latin1(v) => Units::Latin1(v.iter()),
            Repr::Utf16(v) => Units::Utf16(v.iter()),
        }
    }

    pub fn as_latin1(&self) -> Option<&[u8]> {
        match &self.0.repr {
            Repr::Latin1(v) => Some(v),
            Repr::Utf16(_) => None,
        }
    }

    pub fn as_utf16(&self) -> Option<&[u16]> {
        match &self.0.repr {
            Repr::Latin1(_) => None,
            Repr::Utf16(v) => Some(v),
        }
    }

    /// Encode as UTF-8. Unpaired surrogates become U+FFFD.
    pub fn to_utf8(&self) -> String {
        match &self.0.repr {
            Repr::Latin1(v) => v.iter().map(|&b| b as char).collect(),
            Repr::Utf16(v) => String::from_utf16_lossy(v),
        }
    }

    /// Copy of the code units in `start..end`, clamped to the string.
    pub fn substring(&self, start: usize, end: usize) -> JsString {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        if start == 0 && end == len {
            return self.clone();
        }
        match &self.0.repr {
            Repr::Latin1(v) => Self::from_latin1(v.get(start..end).unwrap_or_default().to_vec()),
            Repr::Utf16(v) => Self::from_utf16(v.get(start..end).unwrap_or_default().to_vec()),
        }
    }

    /// Append `other`.
    ///
    /// When this handle is the only reference and its buffer has room for
    /// `other` in the same width, the buffer is extended in place.
    pub fn concat(mut self, other: &JsString) -> Result<JsString, InvalidStringLength> {
        let total = self.len() + other.len();
        if total > MAX_STRING_LEN {
            return Err(InvalidStringLength);
        }
        if other.is_empty() {
            return Ok(self);
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        let appended = match Rc::get_mut(&mut self.0) {
            Some(data) if data.atom.get() == 0 => match (&mut data.repr, &other.0.repr) {
                (Repr::Latin1(a), Repr::Latin1(b)) if a.capacity() - a.len() >= b.len() => {
                    a.extend_from_slice(b);
                    true
                }
                (Repr::Utf16(a), Repr::Utf16(b)) if a.capacity() - a.len() >= b.len() => {
                    a.extend_from_slice(b);
                    true
                }
                _ => false,
            },
            _ => false,
        };
        if appended {
            return Ok(self);
        }
        // Leave room so a chain of appends can continue in place
        let mut builder = StringBuilder::with_capacity(total + total / 2);
        builder.push_js_string(&self)?;
        builder.push_js_string(other)?;
        Ok(JsString::from_repr(builder.repr))
    }

    pub fn ptr_eq(a: &JsString, b: &JsString) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Address of the shared allocation, used to count distinct strings
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn atom_id(&self) -> u32 {
        self.0.atom.get()
    }

    pub(crate) fn set_atom_id(&self, id: u32) {
        self.0.atom.set(id);
    }

    /// Approximate heap footprint in bytes
    pub(crate) fn heap_size(&self) -> usize {
        let payload = match &self.0.repr {
            Repr::Latin1(v) => v.capacity(),
            Repr::Utf16(v) => v.capacity() * 2,
        };
        mem::size_of::<StringData>() + payload
    }

    pub fn content_hash(&self) -> u32 {
        hash_units(self.units())
    }

    /// Value of a canonical array index (`"0"`, `"17"`, never `"017"`), at most 2^32 - 2.
    pub fn to_array_index(&self) -> Option<u32> {
        let len = self.len();
        if len == 0 || len > 10 {
            return None;
        }
        let mut value: u64 = 0;
        for (i, unit) in self.units().enumerate() {
            if !(b'0' as u16..=b'9' as u16).contains(&unit) {
                return None;
            }
            if i == 0 && unit == b'0' as u16 && len > 1 {
                return None;
            }
            value = value * 10 + u64::from(unit - b'0' as u16);
        }
        if value <= u64::from(u32::MAX - 1) {
            Some(value as u32)
        } else {
            None
        }
    }
}

/// Iterator over the code units of a [`JsString`].
pub enum Units<'a> {
    Latin1(std::slice::Iter<'a, u8>),
    Utf16(std::slice::Iter<'a, u16>),
}

impl Iterator for Units<'_> {
    type Item = u16;

    #[inline]
    fn next(&mut self) -> Option<u16> {
        match self {
            Units::Latin1(it) => it.next().map(|&b| b as u16),
            Units::Utf16(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Units::Latin1(it) => it.size_hint(),
            Units::Utf16(it) => it.size_hint(),
        }
    }
}

impl Default for JsString {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&self.0.repr, &other.0.repr) {
            (Repr::Latin1(a), Repr::Latin1(b)) => a == b,
            (Repr::Utf16(a), Repr::Utf16(b)) => a == b,
            _ => self.len() == other.len() && self.units().eq(other.units()),
        }
    }
}

impl Eq for JsString {}

impl PartialOrd for JsString {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for JsString {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.units().cmp(other.units())
    }
}

impl Hash for JsString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for unit in self.units() {
            state.write_u16(unit);
        }
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.units().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self.units().eq(other.encode_utf16())
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        if s.chars().all(|c| (c as u32) <= 0xFF) {
            Self::from_latin1(s.chars().map(|c| c as u8).collect())
        } else {
            Self::from_repr(Repr::Utf16(s.encode_utf16().collect()))
        }
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        if s.is_ascii() {
            Self::from_latin1(s.into_bytes())
        } else {
            Self::from(s.as_str())
        }
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_utf8())
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_utf8())
    }
}

// ============================================================================
// StringBuilder
// ============================================================================

/// Growable string buffer.
///
/// Starts in 8-bit mode and widens to 16 bits on the first unit above 0xFF.
/// Capacity grows by at least half of the current capacity.
pub struct StringBuilder {
    repr: Repr,
    max_len: usize,
}

impl Default for StringBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringBuilder {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            repr: Repr::Latin1(Vec::with_capacity(capacity)),
            max_len: MAX_STRING_LEN,
        }
    }

    /// Lower the length limit (never above the engine maximum).
    pub fn with_limit(mut self, max_len: usize) -> Self {
        self.max_len = max_len.min(MAX_STRING_LEN);
        self
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Latin1(v) => v.len(),
            Repr::Utf16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_wide(&self) -> bool {
        matches!(self.repr, Repr::Utf16(_))
    }

    fn reserve(&mut self, additional: usize) -> Result<(), InvalidStringLength> {
        let len = self.len();
        let needed = len + additional;
        if needed > self.max_len {
            return Err(InvalidStringLength);
        }
        match &mut self.repr {
            Repr::Latin1(v) => reserve_growth(v, needed),
            Repr::Utf16(v) => reserve_growth(v, needed),
        }
        Ok(())
    }

    fn widen(&mut self) {
        if let Repr::Latin1(v) = &self.repr {
            let mut wide = Vec::with_capacity(v.capacity());
            wide.extend(v.iter().map(|&b| b as u16));
            self.repr = Repr::Utf16(wide);
        }
    }

    pub fn push_unit(&mut self, unit: u16) -> Result<(), InvalidStringLength> {
        self.reserve(1)?;
        if unit > 0xFF {
            self.widen();
        }
        match &mut self.repr {
            Repr::Latin1(v) => v.push(unit as u8),
            Repr::Utf16(v) => v.push(unit),
        }
        Ok(())
    }

    pub fn push_char(&mut self, c: char) -> Result<(), InvalidStringLength> {
        let mut buf = [0u16; 2];
        self.push_units(c.encode_utf16(&mut buf))
    }

    pub fn push_str(&mut self, s: &str) -> Result<(), InvalidStringLength> {
        if s.is_ascii() {
            return self.push_latin1(s.as_bytes());
        }
        let units: Vec<u16> = s.encode_utf16().collect();
        self.push_units(&units)
    }

    pub fn push_latin1(&mut self, bytes: &[u8]) -> Result<(), InvalidStringLength> {
        self.reserve(bytes.len())?;
        match &mut self.repr {
            Repr::Latin1(v) => v.extend_from_slice(bytes),
            Repr::Utf16(v) => v.extend(bytes.iter().map(|&b| b as u16)),
        }
        Ok(())
    }

    pub fn push_units(&mut self, units: &[u16]) -> Result<(), InvalidStringLength> {
        self.reserve(units.len())?;
        if units.iter().any(|&u| u > 0xFF) {
            self.widen();
        }
        match &mut self.repr {
            Repr::Latin1(v) => v.extend(units.iter().map(|&u| u as u8)),
            Repr::Utf16(v) => v.extend_from_slice(units),
        }
        Ok(())
    }

    pub fn push_js_string(&mut self, s: &JsString) -> Result<(), InvalidStringLength> {
        match &s.0.repr {
            Repr::Latin1(v) => self.push_latin1(v),
            Repr::Utf16(v) => self.push_units(v),
        }
    }

    pub fn finish(mut self) -> JsString {
        match &mut self.repr {
            Repr::Latin1(v) => v.shrink_to_fit(),
            Repr::Utf16(v) => v.shrink_to_fit(),
        }
        JsString::from_repr(self.repr)
    }
}

fn check_len(len: usize) -> Result<(), InvalidStringLength> {
    if len > MAX_STRING_LEN {
        return Err(InvalidStringLength);
    }
    Ok(())
}

fn reserve_growth<T>(v: &mut Vec<T>, needed: usize) {
    let cap = v.capacity();
    if needed <= cap {
        return;
    }
    let target = needed.max(cap + cap / 2).max(8);
    v.reserve_exact(target - v.len());
}
