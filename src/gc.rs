//! Reference counting with trial-deletion cycle collection.
//!
//! Every heap node is owned through [`Gc`] handles: cloning a handle adds a
//! reference, dropping one removes it, and a node is freed the moment its
//! count reaches zero. Freed payloads are parked on a zero-count queue and
//! dropped one at a time, so releasing a long chain never recurses deeply.
//!
//! Cycles are found by trial deletion. For every live node the collector
//! subtracts the references coming from other heap nodes; whatever still has
//! a positive count is referenced from outside the heap (a root). Everything
//! reachable from a root is restored, the rest is garbage whose edges are
//! cleared, which lets plain reference counting free it.

use crate::memory::MemoryUsage;
use crate::prelude::*;

// ============================================================================
// Trace - for discovering node references
// ============================================================================

/// Types that hold [`Gc`] handles.
///
/// `trace` must report every handle owned by the value. A missing edge makes
/// the collector treat its target as externally referenced, which leaks
/// cycles through it but never frees live data.
pub trait Trace {
    fn trace(&self, tracer: &mut Tracer<'_>);
}

/// Visitor passed to [`Trace::trace`].
pub struct Tracer<'a> {
    visit: &'a mut dyn FnMut(usize),
}

impl Tracer<'_> {
    /// Report one owned handle
    #[inline]
    pub fn edge<T: GcPayload>(&mut self, gc: &Gc<T>) {
        (self.visit)(gc.inner.slot.get());
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        if let Some(item) = self {
            item.trace(tracer);
        }
    }
}

impl<T: GcPayload> Trace for Gc<T> {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        tracer.edge(self);
    }
}

// ============================================================================
// GcPayload - what a node stores
// ============================================================================

/// Node categories, used for statistics and memory accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcKind {
    Object,
    Shape,
    VarRef,
    FunctionBytecode,
    AsyncFrame,
    Module,
    Realm,
}

impl GcKind {
    const COUNT: usize = 7;
}

/// Data stored in a heap node.
pub trait GcPayload: Trace + 'static {
    const KIND: GcKind;

    /// Move out every owned reference.
    ///
    /// Called when the node is freed and when the collector breaks a garbage
    /// cycle. The returned box is dropped later from the zero-count queue.
    fn take_edges(&mut self) -> Box<dyn Any>;

    /// Bytes owned by the payload besides the node itself
    fn extra_size(&self) -> usize {
        0
    }

    /// Add this node to a memory usage report
    fn account(&self, _usage: &mut MemoryUsage) {}
}

// ============================================================================
// GcBox - the internal storage for heap nodes
// ============================================================================

struct GcBox<T: GcPayload> {
    heap: Weak<HeapCore>,
    /// Index in the node table
    slot: Cell<usize>,
    /// Accounted bytes
    size: Cell<usize>,
    data: RefCell<T>,
}

impl<T: GcPayload> Drop for GcBox<T> {
    fn drop(&mut self) {
        let Some(heap) = self.heap.upgrade() else {
            return; // Heap is gone, payload drops inline
        };
        heap.unregister(self.slot.get(), T::KIND, self.size.get());
        let edges = self.data.get_mut().take_edges();
        heap.park(edges);
    }
}

/// Type-erased view of a node used by the collector.
trait HeapNode {
    fn slot(&self) -> usize;
    fn kind(&self) -> GcKind;
    /// Visit child slots. Returns false when the payload is mutably borrowed.
    fn trace_edges(&self, visit: &mut dyn FnMut(usize)) -> bool;
    fn clear_edges(&self) -> Option<Box<dyn Any>>;
    fn account(&self, usage: &mut MemoryUsage);
}

impl<T: GcPayload> HeapNode for GcBox<T> {
    fn slot(&self) -> usize {
        self.slot.get()
    }

    fn kind(&self) -> GcKind {
        T::KIND
    }

    fn trace_edges(&self, visit: &mut dyn FnMut(usize)) -> bool {
        match self.data.try_borrow() {
            Ok(data) => {
                let mut tracer = Tracer { visit };
                data.trace(&mut tracer);
                true
            }
            Err(_) => false,
        }
    }

    fn clear_edges(&self) -> Option<Box<dyn Any>> {
        self.data
            .try_borrow_mut()
            .ok()
            .map(|mut data| data.take_edges())
    }

    fn account(&self, usage: &mut MemoryUsage) {
        if let Ok(data) = self.data.try_borrow() {
            data.account(usage);
        }
    }
}

// ============================================================================
// Gc - handle to a heap node
// ============================================================================

/// A counted handle to a heap node.
///
/// Works like `Rc<RefCell<T>>`: cloning adds a reference, dropping removes
/// one, and the payload is borrowed through `borrow`/`borrow_mut`.
pub struct Gc<T: GcPayload> {
    inner: Rc<GcBox<T>>,
}

impl<T: GcPayload> Clone for Gc<T> {
    fn clone(&self) -> Self {
        Gc {
            inner: self.inner.clone(),
        }
    }
}

impl<T: GcPayload> Gc<T> {
    /// Borrow the payload immutably
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.data.borrow()
    }

    /// Borrow the payload mutably
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.data.borrow_mut()
    }

    pub fn try_borrow(&self) -> Option<Ref<'_, T>> {
        self.inner.data.try_borrow().ok()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, T>> {
        self.inner.data.try_borrow_mut().ok()
    }

    /// Address-based identity of the node
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Check if two handles point to the same node
    pub fn ptr_eq(a: &Gc<T>, b: &Gc<T>) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Number of handles to this node
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    pub fn downgrade(&self) -> WeakGc<T> {
        WeakGc(Rc::downgrade(&self.inner))
    }

    /// Re-account the payload size after it grew or shrank.
    pub(crate) fn update_size(&self) {
        let extra = match self.inner.data.try_borrow() {
            Ok(data) => data.extra_size(),
            Err(_) => return,
        };
        let new_size = mem::size_of::<GcBox<T>>() + extra;
        let old_size = self.inner.size.replace(new_size);
        if let Some(heap) = self.inner.heap.upgrade() {
            heap.resize(old_size, new_size);
        }
    }
}

impl<T: GcPayload> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        Gc::ptr_eq(self, other)
    }
}

impl<T: GcPayload> Eq for Gc<T> {}

impl<T: GcPayload> Hash for Gc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<T: GcPayload> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gc")
            .field("kind", &T::KIND)
            .field("id", &self.id())
            .finish()
    }
}

/// Non-owning handle, used by tables that must not keep nodes alive.
pub struct WeakGc<T: GcPayload>(Weak<GcBox<T>>);

impl<T: GcPayload> WeakGc<T> {
    pub fn upgrade(&self) -> Option<Gc<T>> {
        self.0.upgrade().map(|inner| Gc { inner })
    }

    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl<T: GcPayload> Clone for WeakGc<T> {
    fn clone(&self) -> Self {
        WeakGc(self.0.clone())
    }
}

// ============================================================================
// HeapCore - node table, zero-count queue and collector
// ============================================================================

/// Collector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    None,
    /// Subtracting internal references and scanning for roots
    Decref,
    /// Clearing the edges of garbage nodes
    RemoveCycles,
}

#[derive(Default)]
struct NodeTable {
    slots: Vec<Option<Weak<dyn HeapNode>>>,
    free: Vec<usize>,
    live: usize,
    by_kind: [usize; GcKind::COUNT],
}

impl NodeTable {
    fn insert(&mut self, node: Weak<dyn HeapNode>, kind: GcKind) -> usize {
        self.live += 1;
        if let Some(count) = self.by_kind.get_mut(kind as usize) {
            *count += 1;
        }
        while let Some(slot) = self.free.pop() {
            if let Some(entry) = self.slots.get_mut(slot) {
                if entry.is_none() {
                    *entry = Some(node);
                    return slot;
                }
            }
        }
        self.slots.push(Some(node));
        self.slots.len() - 1
    }

    fn remove(&mut self, slot: usize, kind: GcKind) {
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.take().is_some() {
                self.free.push(slot);
                self.live -= 1;
                if let Some(count) = self.by_kind.get_mut(kind as usize) {
                    *count -= 1;
                }
            }
        }
    }

    fn count(&self, kind: GcKind) -> usize {
        self.by_kind.get(kind as usize).copied().unwrap_or(0)
    }

    fn snapshot(&self) -> Vec<Rc<dyn HeapNode>> {
        self.slots
            .iter()
            .filter_map(|entry| entry.as_ref().and_then(Weak::upgrade))
            .collect()
    }
}

struct HeapCore {
    nodes: RefCell<NodeTable>,
    zero_list: RefCell<Vec<Box<dyn Any>>>,
    phase: Cell<GcPhase>,
    draining: Cell<bool>,
    /// Accounted bytes of live nodes
    malloc_size: Cell<usize>,
    /// Collect when an allocation would exceed this (0 = never)
    gc_threshold: Cell<usize>,
    collections: Cell<usize>,
}

impl HeapCore {
    fn unregister(&self, slot: usize, kind: GcKind, size: usize) {
        self.nodes.borrow_mut().remove(slot, kind);
        self.malloc_size
            .set(self.malloc_size.get().saturating_sub(size));
    }

    fn resize(&self, old_size: usize, new_size: usize) {
        let current = self.malloc_size.get().saturating_sub(old_size);
        self.malloc_size.set(current + new_size);
    }

    fn park(&self, edges: Box<dyn Any>) {
        self.zero_list.borrow_mut().push(edges);
        if self.phase.get() == GcPhase::None && !self.draining.get() {
            self.drain();
        }
    }

    /// Drop parked payloads until the queue is empty.
    fn drain(&self) {
        self.draining.set(true);
        loop {
            let next = self.zero_list.borrow_mut().pop();
            match next {
                Some(edges) => drop(edges),
                None => break,
            }
        }
        self.draining.set(false);
    }

    fn collect(&self) -> GcCycleStats {
        if self.phase.get() != GcPhase::None || self.draining.get() {
            return GcCycleStats::default();
        }
        self.drain();

        self.phase.set(GcPhase::Decref);
        let nodes = self.nodes.borrow().snapshot();
        let table_len = self.nodes.borrow().slots.len();

        let mut by_slot: Vec<Option<usize>> = vec![None; table_len];
        let mut trial: Vec<isize> = vec![0; table_len];
        for (i, node) in nodes.iter().enumerate() {
            let slot = node.slot();
            if let (Some(index), Some(count)) = (by_slot.get_mut(slot), trial.get_mut(slot)) {
                *index = Some(i);
                // The snapshot itself holds one reference
                *count = Rc::strong_count(node) as isize - 1;
            }
        }

        // Subtract references held by other nodes
        for node in &nodes {
            node.trace_edges(&mut |child| {
                if matches!(by_slot.get(child), Some(Some(_))) {
                    if let Some(count) = trial.get_mut(child) {
                        *count -= 1;
                    }
                }
            });
        }

        // Restore everything reachable from a node with outside references
        let mut alive = vec![false; table_len];
        let mut stack: Vec<usize> = Vec::new();
        for node in &nodes {
            let slot = node.slot();
            if trial.get(slot).is_some_and(|&count| count > 0) {
                if let Some(flag) = alive.get_mut(slot) {
                    *flag = true;
                    stack.push(slot);
                }
            }
        }
        while let Some(slot) = stack.pop() {
            let Some(node) = by_slot.get(slot).copied().flatten().and_then(|i| nodes.get(i)) else {
                continue;
            };
            node.trace_edges(&mut |child| {
                if !matches!(by_slot.get(child), Some(Some(_))) {
                    return;
                }
                if let Some(flag) = alive.get_mut(child) {
                    if !*flag {
                        *flag = true;
                        stack.push(child);
                    }
                }
            });
        }

        self.phase.set(GcPhase::RemoveCycles);
        let mut freed = 0;
        for node in &nodes {
            if alive.get(node.slot()) != Some(&false) {
                continue;
            }
            // A node still borrowed elsewhere keeps its edges
            if let Some(edges) = node.clear_edges() {
                self.zero_list.borrow_mut().push(edges);
                freed += 1;
            }
        }
        let scanned = nodes.len();
        drop(nodes);

        self.phase.set(GcPhase::None);
        self.drain();
        self.collections.set(self.collections.get() + 1);
        log::debug!(
            "gc: scanned {scanned} nodes, freed {freed} in cycles, {} bytes live",
            self.malloc_size.get()
        );
        GcCycleStats { scanned, freed }
    }
}

// ============================================================================
// Heap - the public wrapper
// ============================================================================

/// Result of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcCycleStats {
    /// Nodes examined
    pub scanned: usize,
    /// Nodes found unreachable and released
    pub freed: usize,
}

/// Heap statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub live_nodes: usize,
    pub live_objects: usize,
    pub live_shapes: usize,
    pub allocated_bytes: usize,
    pub gc_threshold: usize,
    pub collections: usize,
}

/// Owner of all heap nodes of a runtime.
pub struct Heap {
    inner: Rc<HeapCore>,
}

impl Heap {
    /// Create a new heap
    pub fn new(gc_threshold: usize) -> Self {
        Self {
            inner: Rc::new(HeapCore {
                nodes: RefCell::new(NodeTable::default()),
                zero_list: RefCell::new(Vec::new()),
                phase: Cell::new(GcPhase::None),
                draining: Cell::new(false),
                malloc_size: Cell::new(0),
                gc_threshold: Cell::new(gc_threshold),
                collections: Cell::new(0),
            }),
        }
    }

    /// Place `data` in a new node. The returned handle holds the only reference.
    pub fn alloc<T: GcPayload>(&self, data: T) -> Gc<T> {
        let size = mem::size_of::<GcBox<T>>() + data.extra_size();
        let inner = Rc::new(GcBox {
            heap: Rc::downgrade(&self.inner),
            slot: Cell::new(usize::MAX),
            size: Cell::new(size),
            data: RefCell::new(data),
        });
        let weak: Weak<GcBox<T>> = Rc::downgrade(&inner);
        let weak: Weak<dyn HeapNode> = weak;
        let slot = self.inner.nodes.borrow_mut().insert(weak, T::KIND);
        inner.slot.set(slot);
        self.inner
            .malloc_size
            .set(self.inner.malloc_size.get() + size);
        Gc { inner }
    }

    /// Bytes a node of type `T` needs before its payload grows
    pub fn node_size<T: GcPayload>(data: &T) -> usize {
        mem::size_of::<GcBox<T>>() + data.extra_size()
    }

    /// Run a collection if allocating `upcoming` bytes would cross the threshold.
    ///
    /// Afterwards the threshold is raised to 1.5 times the bytes still live.
    pub fn maybe_collect(&self, upcoming: usize) -> bool {
        let threshold = self.inner.gc_threshold.get();
        if threshold == 0 || self.inner.malloc_size.get() + upcoming <= threshold {
            return false;
        }
        self.inner.collect();
        let live = self.inner.malloc_size.get();
        self.inner.gc_threshold.set((live + live / 2).max(1));
        true
    }

    /// Force a collection cycle
    pub fn collect(&self) -> GcCycleStats {
        self.inner.collect()
    }

    pub fn phase(&self) -> GcPhase {
        self.inner.phase.get()
    }

    /// Set the collection threshold (0 = disable automatic collection)
    pub fn set_gc_threshold(&self, threshold: usize) {
        self.inner.gc_threshold.set(threshold);
    }

    pub fn gc_threshold(&self) -> usize {
        self.inner.gc_threshold.get()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.inner.malloc_size.get()
    }

    /// Get statistics
    pub fn stats(&self) -> GcStats {
        let nodes = self.inner.nodes.borrow();
        GcStats {
            live_nodes: nodes.live,
            live_objects: nodes.count(GcKind::Object),
            live_shapes: nodes.count(GcKind::Shape),
            allocated_bytes: self.inner.malloc_size.get(),
            gc_threshold: self.inner.gc_threshold.get(),
            collections: self.inner.collections.get(),
        }
    }

    pub fn live_count(&self, kind: GcKind) -> usize {
        self.inner.nodes.borrow().count(kind)
    }

    /// Let every live node report itself into `usage`.
    pub(crate) fn account(&self, usage: &mut MemoryUsage) {
        let nodes = self.inner.nodes.borrow().snapshot();
        for node in &nodes {
            node.account(usage);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
