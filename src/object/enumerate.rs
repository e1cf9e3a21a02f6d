//! Own property key enumeration.

use bitflags::bitflags;

use crate::atom::{Atom, AtomKind};
use crate::context::Context;
use crate::error::JsResult;
use crate::shape::PropFlags;
use crate::value::{JsObjectRef, JsValue};

use super::ObjectData;

bitflags! {
    /// Which keys [`Context::get_own_property_names`] reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GpnFlags: u32 {
        const STRING_MASK = 1 << 0;
        const SYMBOL_MASK = 1 << 1;
        const PRIVATE_MASK = 1 << 2;
        /// Only enumerable properties
        const ENUM_ONLY = 1 << 4;
    }
}

/// One enumerated key. The atom is owned: hand the list back to
/// [`Context::free_property_names`] when done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyEnum {
    pub atom: Atom,
    pub is_enumerable: bool,
}

#[derive(Default)]
struct KeyLists {
    indices: Vec<(u32, PropertyEnum)>,
    strings: Vec<PropertyEnum>,
    symbols: Vec<PropertyEnum>,
}

impl KeyLists {
    fn into_ordered(mut self) -> Vec<PropertyEnum> {
        self.indices.sort_by_key(|(index, _)| *index);
        let mut out =
            Vec::with_capacity(self.indices.len() + self.strings.len() + self.symbols.len());
        out.extend(self.indices.into_iter().map(|(_, e)| e));
        out.append(&mut self.strings);
        out.append(&mut self.symbols);
        out
    }
}

impl Context {
    /// Own keys of `obj`: integer indices ascending, then strings in
    /// insertion order, then symbols in insertion order.
    pub fn get_own_property_names(
        &self,
        obj: &JsObjectRef,
        flags: GpnFlags,
    ) -> JsResult<Vec<PropertyEnum>> {
        let rt = self.inner();
        let mut keys = KeyLists::default();

        let entries: Vec<(Atom, PropFlags)> = {
            let o = obj.borrow();
            let shape = o.shape.borrow();
            shape
                .properties()
                .iter()
                .filter(|p| !p.is_deleted())
                .map(|p| (p.atom(), p.flags()))
                .collect()
        };
        for &(atom, prop_flags) in &entries {
            let enumerable = prop_flags.contains(PropFlags::ENUMERABLE);
            if self.key_wanted(atom, enumerable, flags) {
                self.push_key(&mut keys, rt.dup_atom(atom), enumerable);
            }
        }

        // Elements held outside the shape
        if flags.contains(GpnFlags::STRING_MASK) {
            let count = {
                let o = obj.borrow();
                match (&o.data, o.dense_elements()) {
                    (_, Some(elements)) => elements.len(),
                    (ObjectData::TypedArray(t), _) => super::typed_array::live_length(t),
                    (ObjectData::Primitive(JsValue::String(s)), _) => s.len(),
                    _ => 0,
                }
            };
            for i in 0..count {
                keys.indices.push((
                    i as u32,
                    PropertyEnum {
                        atom: self.index_atom(i as u32),
                        is_enumerable: true,
                    },
                ));
            }
        }

        if let Some(exotic) = self.class_exotic(obj) {
            for atom in exotic.own_property_names(self, obj)? {
                if entries.iter().any(|(a, _)| *a == atom) {
                    rt.release_atom(atom);
                    continue;
                }
                let enumerable = match exotic.get_own_property(self, obj, atom) {
                    Ok(desc) => desc.is_some_and(|d| d.enumerable == Some(true)),
                    Err(e) => {
                        rt.release_atom(atom);
                        self.free_property_names(keys.into_ordered());
                        return Err(e);
                    }
                };
                if self.key_wanted(atom, enumerable, flags) {
                    self.push_key(&mut keys, atom, enumerable);
                } else {
                    rt.release_atom(atom);
                }
            }
        }
        Ok(keys.into_ordered())
    }

    fn key_wanted(&self, atom: Atom, enumerable: bool, flags: GpnFlags) -> bool {
        if flags.contains(GpnFlags::ENUM_ONLY) && !enumerable {
            return false;
        }
        let kind = self.inner().atoms.borrow().kind(atom);
        match kind {
            Some(AtomKind::String) => flags.contains(GpnFlags::STRING_MASK),
            Some(AtomKind::Symbol | AtomKind::GlobalSymbol) => flags.contains(GpnFlags::SYMBOL_MASK),
            Some(AtomKind::Private) => flags.contains(GpnFlags::PRIVATE_MASK),
            None => false,
        }
    }

    fn push_key(&self, keys: &mut KeyLists, atom: Atom, enumerable: bool) {
        let entry = PropertyEnum {
            atom,
            is_enumerable: enumerable,
        };
        if let Some(index) = self.atom_index(atom) {
            keys.indices.push((index, entry));
        } else if self.inner().atoms.borrow().is_symbol(atom) {
            keys.symbols.push(entry);
        } else {
            keys.strings.push(entry);
        }
    }

    /// Release the atoms of an enumeration result.
    pub fn free_property_names(&self, names: Vec<PropertyEnum>) {
        let rt = self.inner();
        for entry in names {
            rt.release_atom(entry.atom);
        }
    }
}
