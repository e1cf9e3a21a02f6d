//! Runtime: the state shared by every context of one engine instance.
//!
//! A [`Runtime`] owns the atom table, the shape table, the class registry,
//! the object heap, the pending-job queue and the exception slot. Contexts
//! created from it share all of these. Everything is single-threaded: a
//! runtime and its values are neither `Send` nor `Sync`.

use crate::atom::{Atom, AtomKind, AtomTable};
use crate::class::{ClassDef, ClassId, ClassRegistry};
use crate::config::RuntimeConfig;
use crate::context::{Context, Realm};
use crate::error::JsResult;
use crate::gc::{Gc, GcCycleStats, GcStats, Heap};
use crate::memory::MemoryUsage;
use crate::prelude::*;
use crate::shape::ShapeTable;
use crate::string::JsString;
use crate::value::JsValue;

/// Deferred callback run by [`Runtime::execute_pending_job`].
pub type JobFn = fn(&Context, &[JsValue]) -> JsResult<JsValue>;

/// Polled by long-running operations. Returning true interrupts them.
pub type InterruptHandler = Box<dyn FnMut() -> bool>;

pub(crate) struct Job {
    pub(crate) func: JobFn,
    pub(crate) realm: Gc<Realm>,
    pub(crate) args: Vec<JsValue>,
}

/// Shared state behind every [`Runtime`] handle.
pub struct RuntimeInner {
    pub(crate) heap: Heap,
    pub(crate) atoms: RefCell<AtomTable>,
    /// Reference count changes requested while `atoms` was borrowed
    pub(crate) deferred_atoms: RefCell<Vec<(Atom, AtomRefChange)>>,
    pub(crate) shapes: RefCell<ShapeTable>,
    /// Shapes that died while `shapes` was borrowed and are still linked
    pub(crate) stale_shapes: Cell<usize>,
    pub(crate) classes: RefCell<ClassRegistry>,
    pub(crate) jobs: RefCell<VecDeque<Job>>,
    /// The pending exception, if any
    pub(crate) exception: RefCell<Option<JsValue>>,
    /// Set while an out-of-memory error is being built
    pub(crate) in_out_of_memory: Cell<bool>,
    pub(crate) interrupt_handler: RefCell<Option<InterruptHandler>>,
    pub(crate) interrupt_counter: Cell<u32>,
    pub(crate) call_depth: Cell<usize>,
    /// Arrays being joined by `to_string`, for cycle detection
    pub(crate) join_stack: RefCell<FxHashSet<usize>>,
    pub(crate) config: RefCell<RuntimeConfig>,
    pub(crate) opaque: RefCell<Option<Box<dyn Any>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AtomRefChange {
    Dup,
    Release,
}

impl RuntimeInner {
    pub(crate) fn dup_atom(&self, atom: Atom) -> Atom {
        match self.atoms.try_borrow_mut() {
            Ok(mut atoms) => {
                self.apply_deferred_atoms(&mut atoms);
                atoms.dup(atom)
            }
            Err(_) => {
                log::trace!("atom {atom:?} duplicated while the table is busy");
                self.deferred_atoms.borrow_mut().push((atom, AtomRefChange::Dup));
                atom
            }
        }
    }

    pub(crate) fn release_atom(&self, atom: Atom) {
        match self.atoms.try_borrow_mut() {
            Ok(mut atoms) => {
                self.apply_deferred_atoms(&mut atoms);
                atoms.release(atom);
            }
            Err(_) => {
                log::trace!("atom {atom:?} released while the table is busy");
                self.deferred_atoms.borrow_mut().push((atom, AtomRefChange::Release));
            }
        }
    }

    /// Replay queued count changes. Increments go first so a queued release
    /// never frees a slot that is still owed a reference.
    fn apply_deferred_atoms(&self, atoms: &mut AtomTable) {
        let pending = mem::take(&mut *self.deferred_atoms.borrow_mut());
        if pending.is_empty() {
            return;
        }
        for (atom, _) in pending.iter().filter(|(_, c)| *c == AtomRefChange::Dup) {
            atoms.dup(*atom);
        }
        for (atom, _) in pending.iter().filter(|(_, c)| *c == AtomRefChange::Release) {
            atoms.release(*atom);
        }
    }

    pub(crate) fn atom_text(&self, atom: Atom) -> JsString {
        self.atoms.borrow().text(atom)
    }

    /// Intern `text`, returning an owned reference.
    pub(crate) fn intern_atom(&self, text: &str) -> Atom {
        let mut atoms = self.atoms.borrow_mut();
        self.apply_deferred_atoms(&mut atoms);
        atoms.intern_str(text)
    }

    /// Count down to the next handler call. True when the handler asks to stop.
    pub(crate) fn poll_interrupt(&self) -> bool {
        let left = self.interrupt_counter.get();
        if left > 1 {
            self.interrupt_counter.set(left - 1);
            return false;
        }
        let interval = self.config.borrow().interrupt_poll_interval.max(1);
        self.interrupt_counter.set(interval);
        // The handler may replace itself, so it runs outside the borrow
        let taken = self.interrupt_handler.borrow_mut().take();
        let Some(mut handler) = taken else {
            return false;
        };
        let stop = handler();
        let mut slot = self.interrupt_handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
        stop
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.jobs.get_mut().clear();
        self.exception.get_mut().take();
        self.opaque.get_mut().take();
        let stats = self.heap.collect();
        let left = self.heap.stats().live_nodes;
        log::debug!(
            "runtime teardown: {} nodes freed, {} still referenced",
            stats.freed,
            left
        );
    }
}

/// Handle to a runtime. Clones share the same runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("stats", &self.inner.heap.stats())
            .field("atoms", &self.inner.atoms.borrow().len())
            .finish()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        log::debug!("creating runtime with {config:?}");
        let inner = RuntimeInner {
            heap: Heap::new(config.gc_threshold),
            atoms: RefCell::new(AtomTable::new()),
            deferred_atoms: RefCell::new(Vec::new()),
            shapes: RefCell::new(ShapeTable::default()),
            stale_shapes: Cell::new(0),
            classes: RefCell::new(ClassRegistry::new()),
            jobs: RefCell::new(VecDeque::new()),
            exception: RefCell::new(None),
            in_out_of_memory: Cell::new(false),
            interrupt_handler: RefCell::new(None),
            interrupt_counter: Cell::new(config.interrupt_poll_interval.max(1)),
            call_depth: Cell::new(0),
            join_stack: RefCell::new(FxHashSet::default()),
            config: RefCell::new(config),
            opaque: RefCell::new(None),
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    /// Current configuration
    pub fn config(&self) -> RuntimeConfig {
        self.inner.config.borrow().clone()
    }

    /// Whether two handles refer to the same runtime
    pub fn ptr_eq(a: &Runtime, b: &Runtime) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    // ------------------------------------------------------------------
    // Limits
    // ------------------------------------------------------------------

    pub fn set_gc_threshold(&self, threshold: usize) {
        self.inner.config.borrow_mut().gc_threshold = threshold;
        self.inner.heap.set_gc_threshold(threshold);
    }

    pub fn gc_threshold(&self) -> usize {
        self.inner.heap.gc_threshold()
    }

    /// Cap on accounted heap bytes (0 = unlimited)
    pub fn set_memory_limit(&self, limit: usize) {
        self.inner.config.borrow_mut().memory_limit = limit;
    }

    pub fn set_max_stack_size(&self, size: usize) {
        self.inner.config.borrow_mut().max_stack_size = size;
    }

    pub fn max_stack_size(&self) -> usize {
        self.inner.config.borrow().max_stack_size
    }

    // ------------------------------------------------------------------
    // Host data
    // ------------------------------------------------------------------

    /// Attach a host value to the runtime, replacing any previous one.
    pub fn set_opaque<T: Any>(&self, value: T) {
        *self.inner.opaque.borrow_mut() = Some(Box::new(value));
    }

    /// The host value, if one of type `T` is attached.
    pub fn opaque<T: Any>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.inner.opaque.borrow(), |o| {
            o.as_ref().and_then(|b| (**b).downcast_ref::<T>())
        })
        .ok()
    }

    pub fn take_opaque(&self) -> Option<Box<dyn Any>> {
        self.inner.opaque.borrow_mut().take()
    }

    // ------------------------------------------------------------------
    // Garbage collection and memory
    // ------------------------------------------------------------------

    /// Run a full cycle collection.
    pub fn run_gc(&self) -> GcCycleStats {
        self.inner.heap.collect()
    }

    pub fn gc_stats(&self) -> GcStats {
        self.inner.heap.stats()
    }

    pub fn heap(&self) -> &Heap {
        &self.inner.heap
    }

    /// Snapshot of memory use by category.
    pub fn memory_usage(&self) -> MemoryUsage {
        let rt = &self.inner;
        let mut usage = MemoryUsage::default();
        {
            let atoms = rt.atoms.borrow();
            usage.atom_count = atoms.len();
            let mut text_bytes = 0;
            atoms.for_each_text(|s| text_bytes += s.heap_size());
            usage.atom_size = atoms.table_bytes() + text_bytes;
        }
        rt.heap.account(&mut usage);
        usage.shape_size += rt.shapes.borrow().table_bytes();
        let stats = rt.heap.stats();
        usage.malloc_size = stats.allocated_bytes;
        usage.gc_threshold = stats.gc_threshold;
        usage.memory_used_count = stats.live_nodes;
        usage.malloc_limit = rt.config.borrow().memory_limit;
        usage
    }

    // ------------------------------------------------------------------
    // Atoms
    // ------------------------------------------------------------------

    /// Intern `text`. The caller owns the returned reference.
    pub fn new_atom(&self, text: &str) -> Atom {
        self.inner.intern_atom(text)
    }

    pub fn new_atom_string(&self, text: &JsString) -> Atom {
        self.inner.atoms.borrow_mut().intern(text, AtomKind::String)
    }

    pub fn dup_atom(&self, atom: Atom) -> Atom {
        self.inner.dup_atom(atom)
    }

    pub fn free_atom(&self, atom: Atom) {
        self.inner.release_atom(atom);
    }

    /// Text of a string atom or description of a symbol
    pub fn atom_to_string(&self, atom: Atom) -> JsString {
        self.inner.atom_text(atom)
    }

    pub fn atom_kind(&self, atom: Atom) -> Option<AtomKind> {
        self.inner.atoms.borrow().kind(atom)
    }

    pub fn atom_ref_count(&self, atom: Atom) -> Option<u32> {
        self.inner.atoms.borrow().ref_count(atom)
    }

    pub fn is_atom_live(&self, atom: Atom) -> bool {
        self.inner.atoms.borrow().is_live(atom)
    }

    /// Live entries in the atom table
    pub fn atom_count(&self) -> usize {
        self.inner.atoms.borrow().len()
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    /// Reserve a fresh class id.
    pub fn new_class_id(&self) -> ClassId {
        self.inner.classes.borrow_mut().new_class_id()
    }

    pub fn register_class(&self, id: ClassId, def: ClassDef) -> JsResult<()> {
        self.inner.classes.borrow_mut().register(id, def)
    }

    pub fn is_registered_class(&self, id: ClassId) -> bool {
        self.inner.classes.borrow().is_registered(id)
    }

    /// Registered name of a class
    pub fn class_name(&self, id: ClassId) -> Option<String> {
        self.inner.classes.borrow().get(id).map(|def| def.name.clone())
    }

    // ------------------------------------------------------------------
    // Interrupts, jobs and exceptions
    // ------------------------------------------------------------------

    /// Install (or with `None`, remove) the interrupt handler.
    pub fn set_interrupt_handler(&self, handler: Option<InterruptHandler>) {
        *self.inner.interrupt_handler.borrow_mut() = handler;
    }

    pub fn is_job_pending(&self) -> bool {
        !self.inner.jobs.borrow().is_empty()
    }

    pub fn pending_job_count(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    fn pop_job(&self) -> Option<Job> {
        self.inner.jobs.borrow_mut().pop_front()
    }

    /// Run the oldest pending job.
    ///
    /// Returns `Ok(false)` when the queue is empty. A job that throws
    /// returns `Err` with its exception left in the exception slot.
    pub fn execute_pending_job(&self) -> JsResult<bool> {
        let Some(job) = self.pop_job() else {
            return Ok(false);
        };
        let ctx = Context::from_realm(self.clone(), job.realm);
        (job.func)(&ctx, &job.args)?;
        Ok(true)
    }

    /// Drain the job queue, including jobs enqueued while draining.
    ///
    /// Exceptions are logged and do not stop the loop. Returns how many
    /// jobs failed.
    pub fn run_pending_jobs(&self) -> usize {
        let mut failures = 0;
        while let Some(job) = self.pop_job() {
            let ctx = Context::from_realm(self.clone(), job.realm);
            if let Err(err) = (job.func)(&ctx, &job.args) {
                failures += 1;
                let report = ctx.exception_report(err);
                log::error!("uncaught exception in job: {report}");
            }
        }
        failures
    }

    /// Take the pending exception, clearing the slot.
    pub fn take_exception(&self) -> Option<JsValue> {
        self.inner.exception.borrow_mut().take()
    }

    pub fn has_exception(&self) -> bool {
        self.inner.exception.borrow().is_some()
    }
}
