//! Atom table: interned property names and symbols.
//!
//! An [`Atom`] is a 32-bit handle. Canonical integer strings up to 2^31 - 1
//! are encoded directly in the handle (bit 31 set) and need no table entry.
//! Every other atom indexes a slot of the [`AtomTable`] that holds its text,
//! kind and reference count. String atoms and global symbols are
//! deduplicated through a chained hash index; plain and private symbols are
//! always unique.

use crate::prelude::*;
use crate::string::JsString;

const TAG_INT: u32 = 1 << 31;

/// Largest integer representable as a tagged atom
pub const MAX_INT_ATOM: u32 = TAG_INT - 1;

const INITIAL_HASH_SIZE: usize = 64;

/// Handle to an interned string or symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    /// The absent atom. Marks deleted shape entries.
    pub const NULL: Atom = Atom(0);

    /// Tagged atom for an integer index, if it fits.
    pub fn from_index(n: u32) -> Option<Atom> {
        (n <= MAX_INT_ATOM).then_some(Atom(n | TAG_INT))
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn is_tagged_int(self) -> bool {
        self.0 & TAG_INT != 0
    }

    pub fn tagged_int(self) -> Option<u32> {
        self.is_tagged_int().then_some(self.0 & !TAG_INT)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Tagged integers and predefined atoms are never reference counted.
    pub fn is_const(self) -> bool {
        self.is_tagged_int() || self.0 < ATOM_END
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tagged_int() {
            Some(n) => write!(f, "Atom(#{n})"),
            None => write!(f, "Atom({})", self.0),
        }
    }
}

/// What an atom names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomKind {
    /// Property name
    String,
    /// Symbol from the global registry (`Symbol.for`)
    GlobalSymbol,
    /// Unique symbol
    Symbol,
    /// Private class member name
    Private,
}

impl AtomKind {
    /// Kinds deduplicated by content
    pub fn is_hashed(self) -> bool {
        matches!(self, AtomKind::String | AtomKind::GlobalSymbol)
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, AtomKind::GlobalSymbol | AtomKind::Symbol)
    }
}

macro_rules! define_atoms {
    ($( $name:ident : $kind:ident = $text:literal ),* $(,)?) => {
        #[allow(non_camel_case_types, dead_code, clippy::upper_case_acronyms)]
        #[repr(u32)]
        enum AtomIndex {
            Null,
            $($name,)*
            End,
        }

        /// Atoms created with every table. They are never freed.
        pub mod atoms {
            use super::Atom;
            $(pub const $name: Atom = Atom(super::AtomIndex::$name as u32);)*
        }

        const PREDEFINED_ATOMS: &[(&str, AtomKind)] = &[$(($text, AtomKind::$kind)),*];

        const ATOM_END: u32 = AtomIndex::End as u32;
    };
}

define_atoms! {
    EMPTY_STRING: String = "",
    LENGTH: String = "length",
    PROTOTYPE: String = "prototype",
    CONSTRUCTOR: String = "constructor",
    NAME: String = "name",
    MESSAGE: String = "message",
    FILE_NAME: String = "fileName",
    LINE_NUMBER: String = "lineNumber",
    STACK: String = "stack",
    CAUSE: String = "cause",
    ERRORS: String = "errors",
    TO_STRING: String = "toString",
    VALUE_OF: String = "valueOf",
    VALUE: String = "value",
    GET: String = "get",
    SET: String = "set",
    WRITABLE: String = "writable",
    ENUMERABLE: String = "enumerable",
    CONFIGURABLE: String = "configurable",
    PROTO: String = "__proto__",
    UNDEFINED: String = "undefined",
    NULL: String = "null",
    TRUE: String = "true",
    FALSE: String = "false",
    OBJECT_TYPE: String = "object",
    FUNCTION_TYPE: String = "function",
    NUMBER_TYPE: String = "number",
    STRING_TYPE: String = "string",
    SYMBOL_TYPE: String = "symbol",
    BOOLEAN_TYPE: String = "boolean",
    DEFAULT: String = "default",
    THEN: String = "then",
    GLOBAL_THIS: String = "globalThis",
    BYTE_LENGTH: String = "byteLength",
    BYTE_OFFSET: String = "byteOffset",
    BUFFER: String = "buffer",
    OBJECT: String = "Object",
    ARRAY: String = "Array",
    FUNCTION: String = "Function",
    STRING: String = "String",
    NUMBER: String = "Number",
    BOOLEAN: String = "Boolean",
    SYMBOL: String = "Symbol",
    ARGUMENTS: String = "Arguments",
    ARRAY_BUFFER: String = "ArrayBuffer",
    MODULE: String = "Module",
    ERROR: String = "Error",
    EVAL_ERROR: String = "EvalError",
    RANGE_ERROR: String = "RangeError",
    REFERENCE_ERROR: String = "ReferenceError",
    SYNTAX_ERROR: String = "SyntaxError",
    TYPE_ERROR: String = "TypeError",
    URI_ERROR: String = "URIError",
    INTERNAL_ERROR: String = "InternalError",
    AGGREGATE_ERROR: String = "AggregateError",
    SYMBOL_ITERATOR: Symbol = "Symbol.iterator",
    SYMBOL_ASYNC_ITERATOR: Symbol = "Symbol.asyncIterator",
    SYMBOL_TO_PRIMITIVE: Symbol = "Symbol.toPrimitive",
    SYMBOL_TO_STRING_TAG: Symbol = "Symbol.toStringTag",
    SYMBOL_HAS_INSTANCE: Symbol = "Symbol.hasInstance",
    SYMBOL_SPECIES: Symbol = "Symbol.species",
}

struct AtomEntry {
    kind: AtomKind,
    text: JsString,
    hash: u32,
    /// Next slot in the same hash bucket, 0 ends the chain
    hash_next: u32,
    ref_count: u32,
}

enum Slot {
    /// Slot 0, the null atom
    Reserved,
    Used(AtomEntry),
    /// Free slot, linked to the next free slot (0 ends the list)
    Free(u32),
}

/// Interning table for atoms.
pub struct AtomTable {
    slots: Vec<Slot>,
    buckets: Vec<u32>,
    count: usize,
    free_head: u32,
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_hash(text: &JsString, kind: AtomKind) -> u32 {
    text.content_hash()
        .wrapping_add((kind as u32).wrapping_mul(0x9E37_79B9))
}

impl AtomTable {
    /// Create a table holding the predefined atoms.
    pub fn new() -> Self {
        let mut table = Self {
            slots: vec![Slot::Reserved],
            buckets: vec![0; INITIAL_HASH_SIZE],
            count: 0,
            free_head: 0,
        };
        for &(text, kind) in PREDEFINED_ATOMS {
            let text = JsString::from(text);
            let hash = entry_hash(&text, kind);
            table.insert(text, kind, hash);
        }
        table
    }

    /// Intern `text` as a string atom.
    pub fn intern_str(&mut self, text: &str) -> Atom {
        self.intern(&JsString::from(text), AtomKind::String)
    }

    /// Intern `text` as a string atom or global symbol.
    ///
    /// Returns a new reference: callers release it when done. Plain and
    /// private symbols are never deduplicated, use [`AtomTable::new_symbol`].
    pub fn intern(&mut self, text: &JsString, kind: AtomKind) -> Atom {
        if !kind.is_hashed() {
            return self.new_symbol(text.clone(), kind);
        }
        if kind == AtomKind::String {
            if let Some(atom) = text.to_array_index().and_then(Atom::from_index) {
                return atom;
            }
        }
        // The string may already back an atom of the right kind
        let id = text.atom_id();
        if id != 0 {
            if let Some(Slot::Used(entry)) = self.slots.get(id as usize) {
                if entry.kind == kind {
                    return self.dup(Atom(id));
                }
            }
        }
        let hash = entry_hash(text, kind);
        if let Some(atom) = self.find(text, kind, hash) {
            return self.dup(atom);
        }
        self.insert(text.clone(), kind, hash)
    }

    /// Look up an existing atom without creating one. No reference is taken.
    pub fn lookup(&self, text: &JsString, kind: AtomKind) -> Option<Atom> {
        if kind == AtomKind::String {
            if let Some(atom) = text.to_array_index().and_then(Atom::from_index) {
                return Some(atom);
            }
        }
        self.find(text, kind, entry_hash(text, kind))
    }

    fn find(&self, text: &JsString, kind: AtomKind, hash: u32) -> Option<Atom> {
        let mut i = self.bucket_head(hash);
        while i != 0 {
            match self.slots.get(i as usize) {
                Some(Slot::Used(entry)) => {
                    if entry.hash == hash && entry.kind == kind && entry.text == *text {
                        return Some(Atom(i));
                    }
                    i = entry.hash_next;
                }
                _ => break,
            }
        }
        None
    }

    fn bucket_head(&self, hash: u32) -> u32 {
        let mask = self.buckets.len() - 1;
        self.buckets.get(hash as usize & mask).copied().unwrap_or(0)
    }

    /// Create a symbol that is distinct from every other atom.
    pub fn new_symbol(&mut self, description: JsString, kind: AtomKind) -> Atom {
        let hash = entry_hash(&description, kind);
        self.insert(description, kind, hash)
    }

    fn insert(&mut self, text: JsString, kind: AtomKind, hash: u32) -> Atom {
        if kind.is_hashed() && self.count + 1 > self.buckets.len() * 2 {
            self.resize(self.buckets.len() * 2);
        }
        let entry = AtomEntry {
            kind,
            text,
            hash,
            hash_next: 0,
            ref_count: 1,
        };
        let index = if self.free_head != 0 {
            let index = self.free_head;
            match self.slots.get_mut(index as usize) {
                Some(slot) if matches!(slot, Slot::Free(_)) => {
                    if let Slot::Free(next) = mem::replace(slot, Slot::Used(entry)) {
                        self.free_head = next;
                    }
                    index
                }
                _ => {
                    // Corrupt free list: drop it and append instead
                    log::warn!("atom free list pointed at live slot {index}");
                    self.free_head = 0;
                    self.slots.push(Slot::Used(entry));
                    (self.slots.len() - 1) as u32
                }
            }
        } else {
            self.slots.push(Slot::Used(entry));
            (self.slots.len() - 1) as u32
        };
        let mask = self.buckets.len() - 1;
        if let Some(Slot::Used(entry)) = self.slots.get_mut(index as usize) {
            if entry.text.atom_id() == 0 {
                entry.text.set_atom_id(index);
            }
            if kind.is_hashed() {
                if let Some(head) = self.buckets.get_mut(hash as usize & mask) {
                    entry.hash_next = *head;
                    *head = index;
                }
            }
        }
        self.count += 1;
        log::trace!("atom {index} interned ({kind:?})");
        Atom(index)
    }

    fn resize(&mut self, new_size: usize) {
        let mut buckets = vec![0u32; new_size];
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Used(entry) = slot {
                if entry.kind.is_hashed() {
                    if let Some(head) = buckets.get_mut(entry.hash as usize & (new_size - 1)) {
                        entry.hash_next = *head;
                        *head = i as u32;
                    }
                }
            }
        }
        log::trace!("atom hash resized to {new_size} buckets");
        self.buckets = buckets;
    }

    /// Take another reference to `atom`.
    pub fn dup(&mut self, atom: Atom) -> Atom {
        if !atom.is_const() {
            if let Some(Slot::Used(entry)) = self.slots.get_mut(atom.slot()) {
                entry.ref_count += 1;
            }
        }
        atom
    }

    /// Drop a reference to `atom`, freeing its slot at zero.
    pub fn release(&mut self, atom: Atom) {
        if atom.is_const() {
            return;
        }
        let index = atom.slot();
        match self.slots.get_mut(index) {
            Some(Slot::Used(entry)) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                if entry.ref_count > 0 {
                    return;
                }
            }
            _ => return,
        }
        self.free_slot(index);
    }

    fn free_slot(&mut self, index: usize) {
        let free_head = self.free_head;
        let entry = match self.slots.get_mut(index) {
            Some(slot) if matches!(slot, Slot::Used(_)) => {
                match mem::replace(slot, Slot::Free(free_head)) {
                    Slot::Used(entry) => entry,
                    other => {
                        *slot = other;
                        return;
                    }
                }
            }
            _ => return,
        };
        self.free_head = index as u32;
        if entry.kind.is_hashed() {
            let bucket = entry.hash as usize & (self.buckets.len() - 1);
            let mut prev = 0u32;
            let mut cur = self.buckets.get(bucket).copied().unwrap_or(0);
            while cur != 0 {
                if cur as usize == index {
                    if prev == 0 {
                        if let Some(head) = self.buckets.get_mut(bucket) {
                            *head = entry.hash_next;
                        }
                    } else if let Some(Slot::Used(p)) = self.slots.get_mut(prev as usize) {
                        p.hash_next = entry.hash_next;
                    }
                    break;
                }
                prev = cur;
                cur = match self.slots.get(cur as usize) {
                    Some(Slot::Used(e)) => e.hash_next,
                    _ => 0,
                };
            }
        }
        if entry.text.atom_id() as usize == index {
            entry.text.set_atom_id(0);
        }
        self.count -= 1;
        log::trace!("atom {index} freed");
    }

    pub fn kind(&self, atom: Atom) -> Option<AtomKind> {
        if atom.is_tagged_int() {
            return Some(AtomKind::String);
        }
        match self.slots.get(atom.slot()) {
            Some(Slot::Used(entry)) => Some(entry.kind),
            _ => None,
        }
    }

    pub fn is_symbol(&self, atom: Atom) -> bool {
        self.kind(atom).is_some_and(AtomKind::is_symbol)
    }

    /// Text of a string atom, or description of a symbol.
    pub fn text(&self, atom: Atom) -> JsString {
        if let Some(n) = atom.tagged_int() {
            return JsString::from(n.to_string());
        }
        match self.slots.get(atom.slot()) {
            Some(Slot::Used(entry)) => entry.text.clone(),
            _ => JsString::empty(),
        }
    }

    /// Array index named by `atom`: tagged integers and canonical numeric strings.
    pub fn array_index(&self, atom: Atom) -> Option<u32> {
        if let Some(n) = atom.tagged_int() {
            return Some(n);
        }
        match self.slots.get(atom.slot()) {
            Some(Slot::Used(entry)) if entry.kind == AtomKind::String => {
                entry.text.to_array_index()
            }
            _ => None,
        }
    }

    /// Reference count of a table atom (`None` for constant or freed atoms)
    pub fn ref_count(&self, atom: Atom) -> Option<u32> {
        if atom.is_const() {
            return None;
        }
        match self.slots.get(atom.slot()) {
            Some(Slot::Used(entry)) => Some(entry.ref_count),
            _ => None,
        }
    }

    pub fn is_live(&self, atom: Atom) -> bool {
        atom.is_tagged_int() || matches!(self.slots.get(atom.slot()), Some(Slot::Used(_)))
    }

    /// Number of live table entries
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn hash_size(&self) -> usize {
        self.buckets.len()
    }

    /// Visit the text of every live entry.
    pub(crate) fn for_each_text(&self, mut f: impl FnMut(&JsString)) {
        for slot in &self.slots {
            if let Slot::Used(entry) = slot {
                f(&entry.text);
            }
        }
    }

    pub(crate) fn table_bytes(&self) -> usize {
        self.slots.capacity() * mem::size_of::<Slot>() + self.buckets.len() * 4
    }
}
