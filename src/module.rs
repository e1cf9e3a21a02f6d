//! Module records and namespace objects.
//!
//! A module exports named bindings held in [`VarRef`] cells. Its namespace
//! object exposes those cells directly as properties, so later writes to
//! a binding are visible through the namespace without copying.

use crate::atom::{AtomKind, atoms};
use crate::class::ClassId;
use crate::context::Context;
use crate::error::JsResult;
use crate::function::VarRef;
use crate::gc::{Gc, GcKind, GcPayload, Heap, Trace, Tracer};
use crate::memory::MemoryUsage;
use crate::object::{ObjectData, PropertySlot};
use crate::prelude::*;
use crate::shape::PropFlags;
use crate::string::JsString;
use crate::value::{JsObjectRef, JsValue};

/// A loaded module.
pub struct ModuleDef {
    pub(crate) name: JsString,
    pub(crate) exports: Vec<(JsString, Gc<VarRef>)>,
    /// Built on first request
    pub(crate) namespace: Option<JsObjectRef>,
}

impl ModuleDef {
    pub fn name(&self) -> &JsString {
        &self.name
    }

    /// Exported names in declaration order.
    pub fn export_names(&self) -> impl Iterator<Item = &JsString> {
        self.exports.iter().map(|(name, _)| name)
    }

    pub(crate) fn find_export(&self, name: &JsString) -> Option<Gc<VarRef>> {
        self.exports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cell)| cell.clone())
    }
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("exports", &self.exports.len())
            .finish()
    }
}

impl Trace for ModuleDef {
    fn trace(&self, tracer: &mut Tracer<'_>) {
        for (_, cell) in &self.exports {
            tracer.edge(cell);
        }
        self.namespace.trace(tracer);
    }
}

impl GcPayload for ModuleDef {
    const KIND: GcKind = GcKind::Module;

    fn take_edges(&mut self) -> Box<dyn Any> {
        Box::new((mem::take(&mut self.exports), self.namespace.take()))
    }

    fn account(&self, usage: &mut MemoryUsage) {
        usage.module_count += 1;
        usage.add_string(&self.name);
    }
}

impl Context {
    /// Create a module and register it with this realm under `name`.
    pub fn new_module(&self, name: &str) -> JsResult<Gc<ModuleDef>> {
        let def = ModuleDef {
            name: JsString::from(name),
            exports: Vec::new(),
            namespace: None,
        };
        self.reserve_memory(Heap::node_size(&def))?;
        let module = self.inner().heap.alloc(def);
        let previous = self
            .realm()
            .borrow_mut()
            .modules
            .insert(JsString::from(name), module.clone());
        if previous.is_some() {
            log::warn!("module {name:?} registered twice, the newer one wins");
        }
        Ok(module)
    }

    /// Module registered under `name` in this realm.
    pub fn find_module(&self, name: &str) -> Option<Gc<ModuleDef>> {
        self.realm()
            .borrow()
            .modules
            .get(&JsString::from(name))
            .cloned()
    }

    /// Declare an export. Without `initial` the binding starts uninitialized.
    pub fn add_module_export(
        &self,
        module: &Gc<ModuleDef>,
        name: &str,
        initial: Option<JsValue>,
    ) -> JsResult<Gc<VarRef>> {
        let name = JsString::from(name);
        let (duplicate, frozen) = {
            let m = module.borrow();
            (m.find_export(&name).is_some(), m.namespace.is_some())
        };
        if duplicate {
            return Err(self.throw_error(
                crate::error::ErrorKind::SyntaxError,
                format!("duplicate exported name '{name}'"),
            ));
        }
        if frozen {
            return Err(self.throw_type_error("cannot add exports after the namespace was created"));
        }
        let cell = self.new_var_ref(initial)?;
        module.borrow_mut().exports.push((name, cell.clone()));
        Ok(cell)
    }

    /// Assign an exported binding, initializing it if needed.
    pub fn set_module_export(&self, module: &Gc<ModuleDef>, name: &str, value: JsValue) -> JsResult<()> {
        let cell = module.borrow().find_export(&JsString::from(name));
        match cell {
            Some(cell) => {
                self.initialize_var_ref(&cell, value);
                Ok(())
            }
            None => Err(self.throw_reference_error(format!("'{name}' is not exported"))),
        }
    }

    /// Namespace object of `module`: exports sorted by name, each a live
    /// view of its binding. Built once, then cached.
    pub fn module_namespace(&self, module: &Gc<ModuleDef>) -> JsResult<JsObjectRef> {
        if let Some(ns) = module.borrow().namespace.clone() {
            return Ok(ns);
        }
        let mut exports = module.borrow().exports.clone();
        exports.sort_by(|a, b| a.0.cmp(&b.0));

        let ns = self.new_object_with_data(
            None,
            ClassId::MODULE_NS,
            ObjectData::ModuleNamespace(module.clone()),
        )?;
        let rt = self.inner();
        for (name, cell) in exports {
            let atom = rt.atoms.borrow_mut().intern(&name, AtomKind::String);
            self.add_property(
                &ns,
                atom,
                PropFlags::VARREF | PropFlags::WRITABLE | PropFlags::ENUMERABLE,
                PropertySlot::VarRef(cell),
            );
            rt.release_atom(atom);
        }
        self.add_property(
            &ns,
            atoms::SYMBOL_TO_STRING_TAG,
            PropFlags::empty(),
            PropertySlot::Value(JsValue::from("Module")),
        );
        ns.borrow_mut().extensible = false;
        module.borrow_mut().namespace = Some(ns.clone());
        Ok(ns)
    }
}
