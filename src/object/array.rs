//! Arrays: dense element storage, the `length` slot, and conversion to the
//! general property representation.

use crate::atom::{Atom, atoms};
use crate::class::ClassId;
use crate::context::Context;
use crate::error::JsResult;
use crate::prelude::*;
use crate::shape::PropFlags;
use crate::value::{JsObjectRef, JsValue};

use super::{ObjectData, PropertyDescriptor, PropertySlot, SetOutcome};

impl Context {
    /// New empty array
    pub fn new_array(&self) -> JsResult<JsObjectRef> {
        self.new_array_from(Vec::new())
    }

    /// New dense array holding `values`.
    pub fn new_array_from(&self, values: Vec<JsValue>) -> JsResult<JsObjectRef> {
        let length = JsValue::from_i64(values.len() as i64);
        let shape = self.array_shape();
        let obj = self.new_object_from_shape(shape, ClassId::ARRAY, ObjectData::Array(values))?;
        self.store_length(&obj, length);
        obj.update_size();
        Ok(obj)
    }

    /// Arguments object holding `values`.
    pub fn new_arguments(&self, values: Vec<JsValue>) -> JsResult<JsObjectRef> {
        let length = JsValue::from_i64(values.len() as i64);
        let proto = self.object_proto();
        let obj = self.new_object_with_data(
            proto.as_ref(),
            ClassId::ARGUMENTS,
            ObjectData::Arguments(values),
        )?;
        self.add_property(
            &obj,
            atoms::LENGTH,
            PropFlags::WRITABLE | PropFlags::CONFIGURABLE,
            PropertySlot::Value(length),
        );
        Ok(obj)
    }

    /// Whether `value` is an Array-class object
    pub fn is_array(&self, value: &JsValue) -> bool {
        value
            .as_object()
            .is_some_and(|o| o.borrow().class_id == ClassId::ARRAY)
    }

    /// Current `length` of an array.
    pub fn array_length(&self, obj: &JsObjectRef) -> u32 {
        let o = obj.borrow();
        let Some((index, _)) = o.find_own(atoms::LENGTH) else {
            return 0;
        };
        match o.props.get(index) {
            Some(PropertySlot::Value(v)) => v.as_number().map_or(0, |n| n as u32),
            _ => 0,
        }
    }

    fn length_writable(&self, obj: &JsObjectRef) -> bool {
        obj.borrow()
            .find_own(atoms::LENGTH)
            .is_some_and(|(_, flags)| flags.contains(PropFlags::WRITABLE))
    }

    fn store_length(&self, obj: &JsObjectRef, length: JsValue) {
        let found = obj.borrow().find_own(atoms::LENGTH);
        if let Some((index, _)) = found {
            let old = {
                let mut o = obj.borrow_mut();
                o.props
                    .get_mut(index)
                    .map(|slot| mem::replace(slot, PropertySlot::Value(length)))
            };
            drop(old);
        }
    }

    /// Append `value` at index `length`.
    pub fn array_push(&self, obj: &JsObjectRef, value: JsValue) -> JsResult<()> {
        let length = self.array_length(obj);
        let atom = self.index_atom(length);
        let result = self.set_property(&JsValue::Object(obj.clone()), atom, value, PropFlags::THROW);
        self.inner().release_atom(atom);
        result.map(|_| ())
    }

    /// Move dense elements into ordinary properties. One-way.
    pub(crate) fn convert_to_slow_array(&self, obj: &JsObjectRef) {
        let elements = {
            let mut o = obj.borrow_mut();
            if !o.fast_array || o.class_id.is_typed_array() {
                return;
            }
            let taken = o.dense_elements_mut().map(mem::take).unwrap_or_default();
            o.fast_array = false;
            taken
        };
        log::trace!("converting array of {} elements to properties", elements.len());
        for (i, value) in elements.into_iter().enumerate() {
            let atom = self.index_atom(i as u32);
            self.add_property(obj, atom, PropFlags::C_W_E, PropertySlot::Value(value));
            self.inner().release_atom(atom);
        }
        obj.update_size();
    }

    /// Create element `index` on an array that lacks it.
    pub(crate) fn add_array_element(
        &self,
        obj: &JsObjectRef,
        index: u32,
        atom: Atom,
        value: JsValue,
        flags: PropFlags,
    ) -> JsResult<SetOutcome> {
        let length = self.array_length(obj);
        if index >= length && !self.length_writable(obj) {
            return Ok(SetOutcome::ReadOnly);
        }
        let appended = {
            let mut o = obj.borrow_mut();
            match o.dense_elements_mut() {
                Some(elements) if flags == PropFlags::C_W_E && index as usize == elements.len() => {
                    elements.push(value.clone());
                    true
                }
                _ => false,
            }
        };
        if !appended {
            self.convert_to_slow_array(obj);
            self.add_property(obj, atom, flags, PropertySlot::Value(value));
        }
        if index >= length {
            self.store_length(obj, JsValue::from_i64(index as i64 + 1));
        }
        obj.update_size();
        Ok(SetOutcome::Done)
    }

    pub(crate) fn define_new_array_element(
        &self,
        obj: &JsObjectRef,
        index: u32,
        atom: Atom,
        desc: &PropertyDescriptor,
        flags: PropFlags,
    ) -> JsResult<bool> {
        if desc.is_accessor() {
            let length = self.array_length(obj);
            if index >= length && !self.length_writable(obj) {
                return self.define_result(false, atom, flags);
            }
            self.convert_to_slow_array(obj);
            self.create_property(obj, atom, desc);
            if index >= length {
                self.store_length(obj, JsValue::from_i64(index as i64 + 1));
            }
            return Ok(true);
        }
        let value = desc.value.clone().unwrap_or_default();
        let outcome = self.add_array_element(obj, index, atom, value, desc.flags())?;
        self.define_result(outcome.is_done(), atom, flags)
    }

    /// `array.length = value`, with the ToUint32 check of array lengths.
    pub(crate) fn set_array_length_value(
        &self,
        obj: &JsObjectRef,
        value: &JsValue,
    ) -> JsResult<SetOutcome> {
        let length = self.to_array_length(value)?;
        let done = self.set_array_length(obj, length)?;
        Ok(if done {
            SetOutcome::Done
        } else {
            SetOutcome::ReadOnly
        })
    }

    fn to_array_length(&self, value: &JsValue) -> JsResult<u32> {
        let n = self.to_float64(value)?;
        if n >= 0.0 && n <= u32::MAX as f64 && n.fract() == 0.0 {
            Ok(n as u32)
        } else {
            Err(self.throw_range_error("invalid array length"))
        }
    }

    /// Set the length of an array, deleting elements past it.
    ///
    /// Returns false if `length` is read-only, or if a non-configurable
    /// element stopped the truncation (the length then ends just past it).
    pub fn set_array_length(&self, obj: &JsObjectRef, length: u32) -> JsResult<bool> {
        let old_length = self.array_length(obj);
        if !self.length_writable(obj) {
            return Ok(length == old_length);
        }
        let dense = obj.borrow().dense_elements().is_some();
        if dense {
            let removed = {
                let mut o = obj.borrow_mut();
                o.dense_elements_mut()
                    .map(|elements| {
                        if elements.len() > length as usize {
                            elements.split_off(length as usize)
                        } else {
                            Vec::new()
                        }
                    })
                    .unwrap_or_default()
            };
            drop(removed);
            self.store_length(obj, JsValue::from_i64(length as i64));
            obj.update_size();
            return Ok(true);
        }
        if length >= old_length {
            self.store_length(obj, JsValue::from_i64(length as i64));
            return Ok(true);
        }
        // Slow array: the highest non-configurable element bounds the cut
        let mut new_length = length;
        let mut doomed: Vec<(u32, Atom)> = Vec::new();
        {
            let o = obj.borrow();
            let shape = o.shape.borrow();
            for prop in shape.properties() {
                if prop.is_deleted() {
                    continue;
                }
                let Some(index) = self.atom_index(prop.atom()) else {
                    continue;
                };
                if index < length {
                    continue;
                }
                if !prop.flags().contains(PropFlags::CONFIGURABLE) {
                    new_length = new_length.max(index + 1);
                }
                doomed.push((index, prop.atom()));
            }
        }
        for (index, atom) in doomed {
            if index >= new_length {
                self.remove_shape_property(obj, atom);
            }
        }
        self.store_length(obj, JsValue::from_i64(new_length as i64));
        Ok(new_length == length)
    }

    pub(crate) fn define_array_length(
        &self,
        obj: &JsObjectRef,
        desc: &PropertyDescriptor,
        flags: PropFlags,
    ) -> JsResult<bool> {
        if desc.is_accessor()
            || desc.configurable == Some(true)
            || desc.enumerable == Some(true)
        {
            return self.define_result(false, atoms::LENGTH, flags);
        }
        let writable = self.length_writable(obj);
        let mut done = true;
        if let Some(value) = &desc.value {
            let length = self.to_array_length(value)?;
            if writable {
                done = self.set_array_length(obj, length)?;
            } else {
                done = length == self.array_length(obj);
            }
        }
        if desc.writable == Some(true) && !writable {
            done = false;
        }
        if desc.writable == Some(false) && writable {
            let found = obj.borrow().find_own(atoms::LENGTH);
            if let Some((index, current)) = found {
                self.set_slot_flags(obj, index, current - PropFlags::WRITABLE);
            }
        }
        self.define_result(done, atoms::LENGTH, flags)
    }
}
