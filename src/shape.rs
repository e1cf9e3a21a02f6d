//! Shapes (hidden classes)
//!
//! A shape lists the own properties of an object in insertion order, each
//! with its atom and flags, plus the object's prototype. Objects that start
//! from the same prototype and add the same properties in the same order
//! share one shape, found through the runtime's shape hash table.
//!
//! Shared shapes are never mutated. Any structural change to an object whose
//! shape is shared first gives the object a private, unhashed copy.

use bitflags::bitflags;
use hashbrown::HashTable;

use crate::atom::Atom;
use crate::gc::{Gc, GcKind, GcPayload, Trace, Tracer, WeakGc};
use crate::memory::MemoryUsage;
use crate::prelude::*;
use crate::runtime::RuntimeInner;
use crate::value::JsObjectRef;

/// Property slots reserved by a fresh shape
pub const INITIAL_PROP_SIZE: usize = 2;
/// Hash buckets of a fresh shape
pub const INITIAL_HASH_SIZE: usize = 4;

/// Deleted entries tolerated before a shape is compacted
const COMPACT_MIN_DELETED: usize = 8;

bitflags! {
    /// Property attributes and slot kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropFlags: u32 {
        const CONFIGURABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const ENUMERABLE = 1 << 2;
        const C_W_E = Self::CONFIGURABLE.bits() | Self::WRITABLE.bits() | Self::ENUMERABLE.bits();
        /// The `length` slot of an array
        const LENGTH = 1 << 3;
        /// Slot holds a getter/setter pair
        const GETSET = 1 << 4;
        /// Slot holds a variable reference cell
        const VARREF = 1 << 5;
        /// Slot is initialized on first access
        const AUTOINIT = 1 << 6;
        const TMASK = Self::GETSET.bits() | Self::VARREF.bits() | Self::AUTOINIT.bits();

        /// Call flag, never stored: report failures as a TypeError
        const THROW = 1 << 14;
    }
}

impl PropFlags {
    /// The bits that are stored in a shape entry.
    pub fn stored(self) -> PropFlags {
        self - PropFlags::THROW
    }
}

/// One entry of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeProperty {
    atom: Atom,
    flags: PropFlags,
    /// Next entry (1-based) in the same bucket, 0 ends the chain
    hash_next: u32,
}

impl ShapeProperty {
    /// The property name, or [`Atom::NULL`] for a deleted entry
    pub fn atom(&self) -> Atom {
        self.atom
    }

    pub fn flags(&self) -> PropFlags {
        self.flags
    }

    pub fn is_deleted(&self) -> bool {
        self.atom.is_null()
    }
}

fn shape_hash(h: u32, v: u32) -> u32 {
    h.wrapping_add(v).wrapping_mul(0x9e37_0001)
}

fn initial_hash(proto: Option<&JsObjectRef>) -> u32 {
    let addr = proto.map_or(0, |p| p.id()) as u64;
    let h = shape_hash(1, addr as u32);
    shape_hash(h, (addr >> 32) as u32)
}

fn prop_hash(h: u32, atom: Atom, flags: PropFlags) -> u32 {
    shape_hash(shape_hash(h, atom.raw()), flags.bits())
}

fn same_proto(a: Option<&JsObjectRef>, b: Option<&JsObjectRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Gc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Property layout shared by objects.
pub struct Shape {
    id: u64,
    hash: u32,
    hashed: bool,
    proto: Option<JsObjectRef>,
    props: Vec<ShapeProperty>,
    /// Capacity of the property-value array of objects using this shape
    prop_size: usize,
    /// Bucket heads (1-based entry indices), length is a power of two
    buckets: Vec<u32>,
    deleted_count: usize,
    rt: Weak<RuntimeInner>,
}

impl Shape {
    fn empty(
        rt: &Rc<RuntimeInner>,
        proto: Option<JsObjectRef>,
        hash_size: usize,
        prop_size: usize,
    ) -> Self {
        let id = rt.shapes.borrow_mut().next_id();
        Self {
            id,
            hash: initial_hash(proto.as_ref()),
            hashed: false,
            proto,
            props: Vec::with_capacity(prop_size),
            prop_size,
            buckets: vec![0; hash_size.next_power_of_two()],
            deleted_count: 0,
            rt: Rc::downgrade(rt),
        }
    }

    /// Stable identity of this shape
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn proto(&self) -> Option<&JsObjectRef> {
        self.proto.as_ref()
    }

    /// Whether the shape is indexed by the shape hash table
    pub fn is_hashed(&self) -> bool {
        self.hashed
    }

    /// Entries including deleted ones
    pub fn prop_count(&self) -> usize {
        self.props.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted_count
    }

    /// Capacity of the property-value array
    pub fn prop_size(&self) -> usize {
        self.prop_size
    }

    pub fn hash_size(&self) -> usize {
        self.buckets.len()
    }

    pub fn properties(&self) -> &[ShapeProperty] {
        &self.props
    }

    /// Slot index of `atom`.
    pub fn find(&self, atom: Atom) -> Option<usize> {
        if atom.is_null() {
            return None;
        }
        let mut next = self.bucket_head(atom);
        while next != 0 {
            let index = next as usize - 1;
            let prop = self.props.get(index)?;
            if prop.atom == atom {
                return Some(index);
            }
            next = prop.hash_next;
        }
        None
    }

    fn bucket_head(&self, atom: Atom) -> u32 {
        let mask = self.buckets.len() - 1;
        self.buckets.get(atom.raw() as usize & mask).copied().unwrap_or(0)
    }

    fn rebuild_index(&mut self, hash_size: usize) {
        let mut buckets = vec![0u32; hash_size];
        let mask = hash_size - 1;
        for (index, prop) in self.props.iter_mut().enumerate() {
            prop.hash_next = 0;
            if prop.atom.is_null() {
                continue;
            }
            if let Some(head) = buckets.get_mut(prop.atom.raw() as usize & mask) {
                prop.hash_next = *head;
                *head = index as u32 + 1;
            }
        }
        self.buckets = buckets;
    }

    /// Append an entry. The caller owns `atom`'s reference count bump.
    fn push(&mut self, atom: Atom, flags: PropFlags) {
        let count = self.props.len();
        if count >= self.prop_size {
            let new_size = (self.prop_size * 3 / 2).max(count + 1);
            self.props.reserve_exact(new_size - self.props.len());
            self.prop_size = new_size;
            let mut hash_size = self.buckets.len();
            while hash_size < new_size {
                hash_size *= 2;
            }
            if hash_size != self.buckets.len() {
                log::trace!("shape {}: {} buckets", self.id, hash_size);
                self.rebuild_index(hash_size);
            }
        }
        let mask = self.buckets.len() - 1;
        let head = self.buckets.get_mut(atom.raw() as usize & mask);
        let hash_next = head.as_deref().copied().unwrap_or(0);
        if let Some(head) = head {
            *head = count as u32 + 1;
        }
        self.props.push(ShapeProperty {
            atom,
            flags,
            hash_next,
        });
        self.hash = prop_hash(self.hash, atom, flags);
    }

    /// Tombstone the entry for `atom`, returning its slot.
    ///
    /// The atom reference now belongs to the caller.
    pub(crate) fn remove(&mut self, atom: Atom) -> Option<usize> {
        if atom.is_null() {
            return None;
        }
        let bucket = atom.raw() as usize & (self.buckets.len() - 1);
        let mut prev: Option<usize> = None;
        let mut next = self.bucket_head(atom);
        while next != 0 {
            let index = next as usize - 1;
            let entry = *self.props.get(index)?;
            if entry.atom == atom {
                let link = match prev {
                    Some(p) => self.props.get_mut(p).map(|p| &mut p.hash_next),
                    None => self.buckets.get_mut(bucket),
                };
                if let Some(link) = link {
                    *link = entry.hash_next;
                }
                if let Some(slot) = self.props.get_mut(index) {
                    *slot = ShapeProperty {
                        atom: Atom::NULL,
                        flags: PropFlags::empty(),
                        hash_next: 0,
                    };
                }
                self.deleted_count += 1;
                return Some(index);
            }
            prev = Some(index);
            next = entry.hash_next;
        }
        None
    }

    pub(crate) fn set_flags(&mut self, index: usize, flags: PropFlags) {
        if let Some(prop) = self.props.get_mut(index) {
            prop.flags = flags.stored();
        }
    }

    pub(crate) fn set_proto(&mut self, proto: Option<JsObjectRef>) -> Option<JsObjectRef> {
        mem::replace(&mut self.proto, proto)
    }

    pub(crate) fn needs_compaction(&self) -> bool {
        self.deleted_count >= COMPACT_MIN_DELETED && self.deleted_count >= self.props.len() / 2
    }

    /// Drop deleted entries. Returns the old slot index of every kept entry,
    /// in order, so the owner can rebuild its value array.
    pub(crate) fn compact(&mut self) -> Vec<usize> {
        let kept: Vec<usize> = self
            .props
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.atom.is_null())
            .map(|(i, _)| i)
            .collect();
        let size = kept.len().max(INITIAL_PROP_SIZE);
        let mut hash_size = self.buckets.len();
        while hash_size / 2 >= size && hash_size > INITIAL_HASH_SIZE {
            hash_size /= 2;
        }
        let props: Vec<ShapeProperty> = self
            .props
            .iter()
            .filter(|p| !p.atom.is_null())
            .copied()
            .collect();
        self.props = Vec::with_capacity(size);
        self.props.extend(props);
        self.prop_size = size;
        self.deleted_count = 0;
        self.rebuild_index(hash_size);
        log::trace!("shape {}: compacted to {} entries", self.id, self.props.len());
        kept
    }

    fn content_hash(&self) -> u32 {
        self.props
            .iter()
            .fold(initial_hash(self.proto.as_ref()), |h, p| {
                prop_hash(h, p.atom, p.flags)
            })
    }

    fn unlink(&mut self) {
        if !self.hashed {
            return;
        }
        self.hashed = false;
        if let Some(rt) = self.rt.upgrade() {
            match rt.shapes.try_borrow_mut() {
                Ok(mut table) => table.unlink(self.hash, self.id),
                Err(_) => {
                    // Left for the next link to purge
                    log::debug!("shape {} unlinked while the shape table is busy", self.id);
                    rt.stale_shapes.set(rt.stale_shapes.get() + 1);
                }
            }
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("hashed", &self.hashed)
            .field("props", &self.props.len())
            .field("deleted", &self.deleted_count)
            .finish()
    }
}

impl Trace for Shape {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        self.proto.trace(tracer);
    }
}

impl GcPayload for Shape {
    const KIND: GcKind = GcKind::Shape;

    fn take_edges(&mut self) -> Box<dyn Any> {
        self.unlink();
        Box::new(self.proto.take())
    }

    fn extra_size(&self) -> usize {
        self.props.capacity() * mem::size_of::<ShapeProperty>()
            + self.buckets.capacity() * mem::size_of::<u32>()
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.shape_count += 1;
        usage.shape_size += mem::size_of::<Shape>() + self.extra_size();
    }
}

impl Drop for Shape {
    fn drop(&mut self) {
        self.unlink();
        if let Some(rt) = self.rt.upgrade() {
            for prop in &self.props {
                if !prop.atom.is_null() {
                    rt.release_atom(prop.atom);
                }
            }
        }
    }
}

// ============================================================================
// Shape hash table
// ============================================================================

struct ShapeEntry {
    hash: u32,
    id: u64,
    shape: WeakGc<Shape>,
}

impl ShapeEntry {
    fn is_current(&self, shape: &Shape) -> bool {
        shape.hashed && shape.id == self.id && shape.hash == self.hash
    }
}

fn spread(hash: u32) -> u64 {
    (hash as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Index of every hashed shape of a runtime.
#[derive(Default)]
pub(crate) struct ShapeTable {
    table: HashTable<ShapeEntry>,
    next_id: u64,
}

impl ShapeTable {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn link(&mut self, hash: u32, id: u64, shape: WeakGc<Shape>) {
        self.table
            .insert_unique(spread(hash), ShapeEntry { hash, id, shape }, |e| spread(e.hash));
    }

    fn unlink(&mut self, hash: u32, id: u64) {
        if let Ok(entry) = self.table.find_entry(spread(hash), |e| e.id == id) {
            entry.remove();
        }
    }

    fn find(&self, hash: u32, matches: impl Fn(&Shape) -> bool) -> Option<Gc<Shape>> {
        self.table
            .find(spread(hash), |e| {
                e.hash == hash
                    && e.shape.upgrade().is_some_and(|sh| {
                        sh.try_borrow()
                            .is_some_and(|s| e.is_current(&s) && matches(&s))
                    })
            })
            .and_then(|e| e.shape.upgrade())
    }

    /// Drop entries whose shape died or left the table without unlinking.
    fn purge_stale(&mut self) -> usize {
        let before = self.table.len();
        self.table.retain(|e| {
            e.shape
                .upgrade()
                .is_some_and(|sh| sh.try_borrow().is_none_or(|s| e.is_current(&s)))
        });
        before - self.table.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn table_bytes(&self) -> usize {
        self.table.capacity() * mem::size_of::<ShapeEntry>()
    }
}

// ============================================================================
// Shape operations
// ============================================================================

fn hash_link(rt: &Rc<RuntimeInner>, shape: &Gc<Shape>) {
    let (hash, id) = {
        let mut sh = shape.borrow_mut();
        sh.hashed = true;
        (sh.hash, sh.id)
    };
    let mut table = rt.shapes.borrow_mut();
    if rt.stale_shapes.replace(0) > 0 {
        let purged = table.purge_stale();
        log::trace!("purged {purged} stale shape entries");
    }
    table.link(hash, id, shape.downgrade());
}

/// Allocate an empty, hashed shape for `proto`.
pub(crate) fn new_shape(
    rt: &Rc<RuntimeInner>,
    proto: Option<JsObjectRef>,
    hash_size: usize,
    prop_size: usize,
) -> Gc<Shape> {
    let shape = rt.heap.alloc(Shape::empty(rt, proto, hash_size, prop_size));
    hash_link(rt, &shape);
    log::trace!("new shape {}", shape.borrow().id);
    shape
}

/// The shared empty shape of objects created with prototype `proto`.
pub(crate) fn shape_for_proto(rt: &Rc<RuntimeInner>, proto: Option<&JsObjectRef>) -> Gc<Shape> {
    let hash = initial_hash(proto);
    let found = rt.shapes.borrow().find(hash, |sh| {
        sh.props.is_empty() && same_proto(sh.proto.as_ref(), proto)
    });
    match found {
        Some(shape) => shape,
        None => new_shape(rt, proto.cloned(), INITIAL_HASH_SIZE, INITIAL_PROP_SIZE),
    }
}

/// The hashed shape equal to `sh` plus a trailing `(atom, flags)` entry.
pub(crate) fn find_hashed_shape_prop(
    rt: &Rc<RuntimeInner>,
    sh: &Shape,
    atom: Atom,
    flags: PropFlags,
) -> Option<Gc<Shape>> {
    let hash = prop_hash(sh.hash, atom, flags);
    let count = sh.props.len();
    rt.shapes.borrow().find(hash, |candidate| {
        candidate.props.len() == count + 1
            && same_proto(candidate.proto.as_ref(), sh.proto.as_ref())
            && candidate
                .props
                .last()
                .is_some_and(|last| last.atom == atom && last.flags == flags)
            && candidate
                .props
                .iter()
                .zip(&sh.props)
                .all(|(a, b)| a.atom == b.atom && a.flags == b.flags)
    })
}

/// Unhashed private copy of `sh`.
pub(crate) fn clone_shape(rt: &Rc<RuntimeInner>, sh: &Shape) -> Gc<Shape> {
    let id = rt.shapes.borrow_mut().next_id();
    for prop in &sh.props {
        if !prop.atom.is_null() {
            rt.dup_atom(prop.atom);
        }
    }
    let mut props = Vec::with_capacity(sh.prop_size);
    props.extend_from_slice(&sh.props);
    rt.heap.alloc(Shape {
        id,
        hash: sh.hash,
        hashed: false,
        proto: sh.proto.clone(),
        props,
        prop_size: sh.prop_size,
        buckets: sh.buckets.clone(),
        deleted_count: sh.deleted_count,
        rt: Rc::downgrade(rt),
    })
}

/// Append `(atom, flags)` to an exclusively owned shape.
///
/// Takes a new reference on `atom`. A hashed shape is re-indexed under its
/// new content hash.
pub(crate) fn append_property(rt: &Rc<RuntimeInner>, shape: &Gc<Shape>, atom: Atom, flags: PropFlags) {
    let was_hashed = {
        let mut sh = shape.borrow_mut();
        let was_hashed = sh.hashed;
        sh.unlink();
        rt.dup_atom(atom);
        sh.push(atom, flags.stored());
        was_hashed
    };
    if was_hashed {
        let mut sh = shape.borrow_mut();
        sh.hash = sh.content_hash();
        drop(sh);
        hash_link(rt, shape);
    }
}

/// Hash a freshly cloned shape so later objects can share it.
pub(crate) fn rehash(rt: &Rc<RuntimeInner>, shape: &Gc<Shape>) {
    let hashed = shape.borrow().hashed;
    if !hashed {
        hash_link(rt, shape);
    }
}

/// Take a shape out of the hash table before an in-place change.
pub(crate) fn unhash(shape: &Gc<Shape>) {
    shape.borrow_mut().unlink();
}
