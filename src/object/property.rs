//! Property access: get, set, define, delete, has and prototype links.

use crate::atom::{Atom, atoms};
use crate::class::ClassId;
use crate::context::Context;
use crate::error::JsResult;
use crate::gc::Gc;
use crate::prelude::*;
use crate::shape::PropFlags;
use crate::value::{JsObjectRef, JsValue};

use super::{ObjectData, PropertySlot};

/// A property descriptor. Absent fields keep their current value when
/// redefining and default to false/undefined when creating.
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    /// Getter function, `Some(Undefined)` for none
    pub get: Option<JsValue>,
    pub set: Option<JsValue>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// Complete data descriptor with attributes taken from `flags`.
    pub fn data(value: JsValue, flags: PropFlags) -> Self {
        Self {
            value: Some(value),
            writable: Some(flags.contains(PropFlags::WRITABLE)),
            get: None,
            set: None,
            enumerable: Some(flags.contains(PropFlags::ENUMERABLE)),
            configurable: Some(flags.contains(PropFlags::CONFIGURABLE)),
        }
    }

    /// Complete accessor descriptor with attributes taken from `flags`.
    pub fn accessor(get: JsValue, set: JsValue, flags: PropFlags) -> Self {
        Self {
            value: None,
            writable: None,
            get: Some(get),
            set: Some(set),
            enumerable: Some(flags.contains(PropFlags::ENUMERABLE)),
            configurable: Some(flags.contains(PropFlags::CONFIGURABLE)),
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// Attribute flags of the fields that are present and true.
    pub fn flags(&self) -> PropFlags {
        let mut flags = PropFlags::empty();
        flags.set(PropFlags::CONFIGURABLE, self.configurable == Some(true));
        flags.set(PropFlags::ENUMERABLE, self.enumerable == Some(true));
        flags.set(PropFlags::WRITABLE, self.writable == Some(true));
        flags
    }

    fn getter_object(&self) -> Option<JsObjectRef> {
        self.get.as_ref().and_then(|g| g.as_object().cloned())
    }

    fn setter_object(&self) -> Option<JsObjectRef> {
        self.set.as_ref().and_then(|s| s.as_object().cloned())
    }
}

/// How a [`Context::set_property`] call ended when it did not throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Done,
    ReadOnly,
    NotExtensible,
    /// Write to a typed array index past its length
    OutOfBounds,
    /// Property creation on a primitive receiver
    NotAnObject,
}

impl SetOutcome {
    pub fn is_done(self) -> bool {
        self == SetOutcome::Done
    }
}

/// Own property as seen by lookups, with values already dereferenced.
pub(crate) enum OwnProperty {
    Data {
        value: JsValue,
        flags: PropFlags,
    },
    Accessor {
        getter: Option<JsObjectRef>,
        setter: Option<JsObjectRef>,
        flags: PropFlags,
    },
}

impl OwnProperty {
    fn from_descriptor(desc: PropertyDescriptor) -> Self {
        let flags = desc.flags();
        if desc.is_accessor() {
            OwnProperty::Accessor {
                getter: desc.getter_object(),
                setter: desc.setter_object(),
                flags: flags | PropFlags::GETSET,
            }
        } else {
            OwnProperty::Data {
                value: desc.value.unwrap_or_default(),
                flags,
            }
        }
    }

    fn into_descriptor(self) -> PropertyDescriptor {
        match self {
            OwnProperty::Data { value, flags } => PropertyDescriptor::data(value, flags),
            OwnProperty::Accessor {
                getter,
                setter,
                flags,
            } => PropertyDescriptor::accessor(
                getter.map_or(JsValue::Undefined, JsValue::Object),
                setter.map_or(JsValue::Undefined, JsValue::Object),
                flags,
            ),
        }
    }
}

fn same_object(a: Option<&JsObjectRef>, b: Option<&JsObjectRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Gc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Slot `index` of `obj` with its shape flags.
fn own_slot(obj: &JsObjectRef, atom: Atom) -> Option<(usize, PropFlags, PropertySlot)> {
    let o = obj.borrow();
    let (index, flags) = o.find_own(atom)?;
    let slot = o.props.get(index)?.clone();
    Some((index, flags, slot))
}

fn store_slot(obj: &JsObjectRef, index: usize, slot: PropertySlot) {
    let old = {
        let mut o = obj.borrow_mut();
        o.props.get_mut(index).map(|s| mem::replace(s, slot))
    };
    drop(old);
}

impl Context {
    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Own property of `obj`, realizing lazy slots.
    pub(crate) fn get_own_internal(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
    ) -> JsResult<Option<OwnProperty>> {
        while let Some((_, flags, slot)) = own_slot(obj, atom) {
            let prop = match slot {
                PropertySlot::Value(value) => OwnProperty::Data { value, flags },
                PropertySlot::GetSet { getter, setter } => OwnProperty::Accessor {
                    getter,
                    setter,
                    flags,
                },
                PropertySlot::VarRef(cell) => OwnProperty::Data {
                    value: self.read_var_ref(&cell, atom)?,
                    flags,
                },
                PropertySlot::AutoInit { init, data } => {
                    self.realize_autoinit(obj, atom, init, &data)?;
                    continue;
                }
            };
            return Ok(Some(prop));
        }
        if let Some(index) = self.atom_index(atom) {
            if let Some(prop) = self.get_own_element(obj, index) {
                return Ok(Some(prop));
            }
        }
        if let Some(exotic) = self.class_exotic(obj) {
            if let Some(desc) = exotic.get_own_property(self, obj, atom)? {
                return Ok(Some(OwnProperty::from_descriptor(desc)));
            }
        }
        Ok(None)
    }

    /// Element `index` held outside the shape: dense arrays, typed arrays
    /// and string wrappers.
    fn get_own_element(&self, obj: &JsObjectRef, index: u32) -> Option<OwnProperty> {
        let o = obj.borrow();
        if let Some(elements) = o.dense_elements() {
            return elements.get(index as usize).map(|value| OwnProperty::Data {
                value: value.clone(),
                flags: PropFlags::C_W_E,
            });
        }
        match &o.data {
            ObjectData::TypedArray(t) => {
                super::typed_array::read_element(t, index as usize).map(|value| {
                    OwnProperty::Data {
                        value,
                        flags: PropFlags::C_W_E,
                    }
                })
            }
            ObjectData::Primitive(JsValue::String(s)) if (index as usize) < s.len() => {
                let i = index as usize;
                Some(OwnProperty::Data {
                    value: JsValue::String(s.substring(i, i + 1)),
                    flags: PropFlags::ENUMERABLE,
                })
            }
            _ => None,
        }
    }

    fn realize_autoinit(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        init: super::AutoInitFn,
        data: &JsValue,
    ) -> JsResult<()> {
        let value = init(self, obj, atom, data)?;
        let found = obj.borrow().find_own(atom);
        if let Some((index, flags)) = found {
            if flags.contains(PropFlags::AUTOINIT) {
                self.set_slot_flags(obj, index, flags - PropFlags::AUTOINIT);
                store_slot(obj, index, PropertySlot::Value(value));
            }
        }
        Ok(())
    }

    /// Read `atom` from `receiver`, walking the prototype chain.
    ///
    /// Missing properties read as `undefined`. Getters run with `receiver`
    /// as `this`.
    pub fn get_property(&self, receiver: &JsValue, atom: Atom) -> JsResult<JsValue> {
        let mut current = match receiver {
            JsValue::Object(obj) => obj.clone(),
            JsValue::Undefined | JsValue::Null => {
                return Err(self.throw_type_error(format!(
                    "cannot read property '{}' of {:?}",
                    self.atom_text(atom),
                    receiver
                )));
            }
            JsValue::String(s) => {
                if atom == atoms::LENGTH {
                    return Ok(JsValue::from_i64(s.len() as i64));
                }
                if let Some(index) = self.atom_index(atom) {
                    let i = index as usize;
                    if i < s.len() {
                        return Ok(JsValue::String(s.substring(i, i + 1)));
                    }
                }
                match self.primitive_proto(receiver) {
                    Some(proto) => proto,
                    None => return Ok(JsValue::Undefined),
                }
            }
            other => match self.primitive_proto(other) {
                Some(proto) => proto,
                None => return Ok(JsValue::Undefined),
            },
        };
        loop {
            if let Some(prop) = self.get_own_internal(&current, atom)? {
                return match prop {
                    OwnProperty::Data { value, .. } => Ok(value),
                    OwnProperty::Accessor {
                        getter: Some(getter),
                        ..
                    } => self.call(&JsValue::Object(getter), receiver, &[]),
                    OwnProperty::Accessor { getter: None, .. } => Ok(JsValue::Undefined),
                };
            }
            let (typed, next) = {
                let o = current.borrow();
                (o.class_id.is_typed_array(), o.proto())
            };
            // Integer keys of typed arrays never reach the prototype
            if typed && self.atom_index(atom).is_some() {
                return Ok(JsValue::Undefined);
            }
            match next {
                Some(proto) => current = proto,
                None => return Ok(JsValue::Undefined),
            }
        }
    }

    /// Own property descriptor of `obj`, if the property exists.
    pub fn get_own_property(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
    ) -> JsResult<Option<PropertyDescriptor>> {
        Ok(self
            .get_own_internal(obj, atom)?
            .map(OwnProperty::into_descriptor))
    }

    fn has_own(&self, obj: &JsObjectRef, atom: Atom) -> JsResult<bool> {
        if obj.borrow().find_own(atom).is_some() {
            return Ok(true);
        }
        if let Some(index) = self.atom_index(atom) {
            let i = index as usize;
            let o = obj.borrow();
            let present = match (&o.data, o.dense_elements()) {
                (_, Some(elements)) => i < elements.len(),
                (ObjectData::TypedArray(t), _) => i < super::typed_array::live_length(t),
                (ObjectData::Primitive(JsValue::String(s)), _) => i < s.len(),
                _ => false,
            };
            if present {
                return Ok(true);
            }
        }
        match self.class_exotic(obj) {
            Some(exotic) => Ok(exotic.get_own_property(self, obj, atom)?.is_some()),
            None => Ok(false),
        }
    }

    /// Whether `atom` is an own or inherited property of `obj`.
    pub fn has_property(&self, obj: &JsObjectRef, atom: Atom) -> JsResult<bool> {
        let mut current = obj.clone();
        loop {
            if self.has_own(&current, atom)? {
                return Ok(true);
            }
            let (typed, next) = {
                let o = current.borrow();
                (o.class_id.is_typed_array(), o.proto())
            };
            if typed && self.atom_index(atom).is_some() {
                return Ok(false);
            }
            match next {
                Some(proto) => current = proto,
                None => return Ok(false),
            }
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    /// Assign `receiver[atom] = value`.
    ///
    /// Failures are reported as a [`SetOutcome`], or thrown as a TypeError
    /// when `flags` contains [`PropFlags::THROW`].
    pub fn set_property(
        &self,
        receiver: &JsValue,
        atom: Atom,
        value: JsValue,
        flags: PropFlags,
    ) -> JsResult<SetOutcome> {
        let outcome = self.set_property_internal(receiver, atom, value)?;
        self.check_set_outcome(outcome, atom, flags)
    }

    pub(crate) fn check_set_outcome(
        &self,
        outcome: SetOutcome,
        atom: Atom,
        flags: PropFlags,
    ) -> JsResult<SetOutcome> {
        if outcome.is_done() || !flags.contains(PropFlags::THROW) {
            return Ok(outcome);
        }
        let name = self.atom_text(atom);
        let message = match outcome {
            SetOutcome::ReadOnly => format!("'{name}' is read-only"),
            SetOutcome::NotExtensible => format!("cannot add property '{name}', object is not extensible"),
            SetOutcome::OutOfBounds => "out-of-bound numeric index".to_string(),
            SetOutcome::NotAnObject | SetOutcome::Done => {
                format!("cannot create property '{name}' on a primitive")
            }
        };
        Err(self.throw_type_error(message))
    }

    fn set_property_internal(
        &self,
        receiver: &JsValue,
        atom: Atom,
        value: JsValue,
    ) -> JsResult<SetOutcome> {
        let obj = match receiver {
            JsValue::Object(obj) => Some(obj.clone()),
            JsValue::Undefined | JsValue::Null => {
                return Err(self.throw_type_error(format!(
                    "cannot set property '{}' of {:?}",
                    self.atom_text(atom),
                    receiver
                )));
            }
            _ => None,
        };

        if let Some(obj) = &obj {
            if let Some(outcome) = self.set_own(obj, receiver, atom, &value)? {
                return Ok(outcome);
            }
        }

        // Look for a setter or a read-only data property up the chain
        let mut proto = match &obj {
            Some(obj) => obj.borrow().proto(),
            None => self.primitive_proto(receiver),
        };
        while let Some(current) = proto {
            match self.get_own_internal(&current, atom)? {
                Some(OwnProperty::Accessor { setter, .. }) => {
                    return match setter {
                        Some(setter) => {
                            self.call(&JsValue::Object(setter), receiver, &[value])?;
                            Ok(SetOutcome::Done)
                        }
                        None => Ok(SetOutcome::ReadOnly),
                    };
                }
                Some(OwnProperty::Data { flags, .. }) => {
                    if !flags.contains(PropFlags::WRITABLE) {
                        return Ok(SetOutcome::ReadOnly);
                    }
                    break;
                }
                None => {
                    let (typed, next) = {
                        let o = current.borrow();
                        (o.class_id.is_typed_array(), o.proto())
                    };
                    if typed && self.atom_index(atom).is_some() {
                        break;
                    }
                    proto = next;
                }
            }
        }

        let Some(obj) = obj else {
            return Ok(SetOutcome::NotAnObject);
        };
        if !obj.borrow().extensible {
            return Ok(SetOutcome::NotExtensible);
        }
        let class_id = obj.borrow().class_id;
        if class_id == ClassId::ARRAY {
            if let Some(index) = self.atom_index(atom) {
                return self.add_array_element(&obj, index, atom, value, PropFlags::C_W_E);
            }
        }
        self.add_property(&obj, atom, PropFlags::C_W_E, PropertySlot::Value(value));
        Ok(SetOutcome::Done)
    }

    /// Write to an existing own property. `None` when `obj` has no own `atom`.
    fn set_own(
        &self,
        obj: &JsObjectRef,
        receiver: &JsValue,
        atom: Atom,
        value: &JsValue,
    ) -> JsResult<Option<SetOutcome>> {
        while let Some((index, flags, slot)) = own_slot(obj, atom) {
            if flags.contains(PropFlags::LENGTH) {
                return self.set_array_length_value(obj, value).map(Some);
            }
            let outcome = match slot {
                PropertySlot::Value(_) => {
                    if !flags.contains(PropFlags::WRITABLE) {
                        SetOutcome::ReadOnly
                    } else {
                        store_slot(obj, index, PropertySlot::Value(value.clone()));
                        SetOutcome::Done
                    }
                }
                PropertySlot::GetSet { setter, .. } => match setter {
                    Some(setter) => {
                        self.call(&JsValue::Object(setter), receiver, &[value.clone()])?;
                        SetOutcome::Done
                    }
                    None => SetOutcome::ReadOnly,
                },
                PropertySlot::VarRef(cell) => {
                    let namespace = obj.borrow().class_id == ClassId::MODULE_NS;
                    if namespace || !flags.contains(PropFlags::WRITABLE) {
                        SetOutcome::ReadOnly
                    } else {
                        self.write_var_ref(&cell, atom, value.clone())?;
                        SetOutcome::Done
                    }
                }
                PropertySlot::AutoInit { init, data } => {
                    self.realize_autoinit(obj, atom, init, &data)?;
                    continue;
                }
            };
            return Ok(Some(outcome));
        }

        let Some(index) = self.atom_index(atom) else {
            return self.set_own_exotic(obj, receiver, atom, value);
        };
        let i = index as usize;
        enum Element {
            Dense(usize),
            Typed,
            StringChar(usize),
            Other,
        }
        let element = {
            let o = obj.borrow();
            match (&o.data, o.dense_elements()) {
                (_, Some(elements)) => Element::Dense(elements.len()),
                (ObjectData::TypedArray(_), _) => Element::Typed,
                (ObjectData::Primitive(JsValue::String(s)), _) => Element::StringChar(s.len()),
                _ => Element::Other,
            }
        };
        match element {
            Element::Dense(len) if i < len => {
                let old = {
                    let mut o = obj.borrow_mut();
                    o.dense_elements_mut()
                        .and_then(|elements| elements.get_mut(i))
                        .map(|slot| mem::replace(slot, value.clone()))
                };
                drop(old);
                Ok(Some(SetOutcome::Done))
            }
            Element::Typed => {
                let number = self.to_float64(value)?;
                let written = super::typed_array::write_element(obj, i, number);
                Ok(Some(if written {
                    SetOutcome::Done
                } else {
                    SetOutcome::OutOfBounds
                }))
            }
            Element::StringChar(len) if i < len => Ok(Some(SetOutcome::ReadOnly)),
            _ => self.set_own_exotic(obj, receiver, atom, value),
        }
    }

    fn set_own_exotic(
        &self,
        obj: &JsObjectRef,
        receiver: &JsValue,
        atom: Atom,
        value: &JsValue,
    ) -> JsResult<Option<SetOutcome>> {
        let Some(exotic) = self.class_exotic(obj) else {
            return Ok(None);
        };
        let Some(desc) = exotic.get_own_property(self, obj, atom)? else {
            return Ok(None);
        };
        if desc.is_accessor() {
            return match desc.setter_object() {
                Some(setter) => {
                    self.call(&JsValue::Object(setter), receiver, &[value.clone()])?;
                    Ok(Some(SetOutcome::Done))
                }
                None => Ok(Some(SetOutcome::ReadOnly)),
            };
        }
        if desc.writable != Some(true) {
            return Ok(Some(SetOutcome::ReadOnly));
        }
        let update = PropertyDescriptor {
            value: Some(value.clone()),
            ..Default::default()
        };
        let done = exotic
            .define_own_property(self, obj, atom, &update)?
            .unwrap_or(false);
        Ok(Some(if done {
            SetOutcome::Done
        } else {
            SetOutcome::ReadOnly
        }))
    }

    // ------------------------------------------------------------------
    // Definition
    // ------------------------------------------------------------------

    /// Create or reconfigure an own property.
    ///
    /// Returns false when the definition is refused, or throws a TypeError
    /// if `flags` contains [`PropFlags::THROW`]. Malformed descriptors
    /// always throw.
    pub fn define_property(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        desc: &PropertyDescriptor,
        flags: PropFlags,
    ) -> JsResult<bool> {
        if desc.is_accessor() && desc.is_data() {
            return Err(self.throw_type_error("invalid property descriptor: both accessor and value"));
        }
        for func in [&desc.get, &desc.set].into_iter().flatten() {
            if !func.is_undefined() && !func.is_callable() {
                return Err(self.throw_type_error("property accessor is not a function"));
            }
        }
        if let Some(exotic) = self.class_exotic(obj) {
            if let Some(done) = exotic.define_own_property(self, obj, atom, desc)? {
                return self.define_result(done, atom, flags);
            }
        }
        let class_id = obj.borrow().class_id;
        if class_id == ClassId::ARRAY && atom == atoms::LENGTH {
            return self.define_array_length(obj, desc, flags);
        }
        loop {
            let found = obj.borrow().find_own(atom);
            let Some((index, current)) = found else { break };
            if current.contains(PropFlags::AUTOINIT) {
                if let Some((_, _, PropertySlot::AutoInit { init, data })) = own_slot(obj, atom) {
                    self.realize_autoinit(obj, atom, init, &data)?;
                }
                continue;
            }
            let done = self.redefine_property(obj, atom, index, current, desc)?;
            return self.define_result(done, atom, flags);
        }
        if let Some(index) = self.atom_index(atom) {
            if let Some(done) = self.define_own_element(obj, atom, index, desc)? {
                return self.define_result(done, atom, flags);
            }
        }
        if !obj.borrow().extensible {
            return self.define_result(false, atom, flags);
        }
        if class_id == ClassId::ARRAY {
            if let Some(index) = self.atom_index(atom) {
                return self.define_new_array_element(obj, index, atom, desc, flags);
            }
        }
        self.create_property(obj, atom, desc);
        Ok(true)
    }

    /// Define a data property with the attributes in `flags`.
    pub fn define_property_value(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        value: JsValue,
        flags: PropFlags,
    ) -> JsResult<bool> {
        let desc = PropertyDescriptor::data(value, flags);
        self.define_property(obj, atom, &desc, flags & PropFlags::THROW)
    }

    /// Define an accessor property; pass `Undefined` for a missing half.
    pub fn define_property_getset(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        getter: JsValue,
        setter: JsValue,
        flags: PropFlags,
    ) -> JsResult<bool> {
        let desc = PropertyDescriptor::accessor(getter, setter, flags);
        self.define_property(obj, atom, &desc, flags & PropFlags::THROW)
    }

    /// Install a property whose value is computed on first access.
    pub fn define_property_autoinit(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        init: super::AutoInitFn,
        data: JsValue,
        flags: PropFlags,
    ) -> JsResult<bool> {
        if self.has_own(obj, atom)? {
            return self.define_result(false, atom, flags);
        }
        let stored = (flags & PropFlags::C_W_E) | PropFlags::AUTOINIT;
        self.add_property(obj, atom, stored, PropertySlot::AutoInit { init, data });
        Ok(true)
    }

    pub(crate) fn define_result(&self, done: bool, atom: Atom, flags: PropFlags) -> JsResult<bool> {
        if done || !flags.contains(PropFlags::THROW) {
            return Ok(done);
        }
        Err(self.throw_type_error(format!(
            "cannot redefine property '{}'",
            self.atom_text(atom)
        )))
    }

    /// New own property from a descriptor; the caller checked absence and
    /// extensibility.
    pub(crate) fn create_property(&self, obj: &JsObjectRef, atom: Atom, desc: &PropertyDescriptor) {
        let mut flags = desc.flags();
        let slot = if desc.is_accessor() {
            flags.remove(PropFlags::WRITABLE);
            flags.insert(PropFlags::GETSET);
            PropertySlot::GetSet {
                getter: desc.getter_object(),
                setter: desc.setter_object(),
            }
        } else {
            PropertySlot::Value(desc.value.clone().unwrap_or_default())
        };
        self.add_property(obj, atom, flags, slot);
    }

    fn redefine_property(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        index: usize,
        current: PropFlags,
        desc: &PropertyDescriptor,
    ) -> JsResult<bool> {
        let Some((_, _, slot)) = own_slot(obj, atom) else {
            return Ok(false);
        };
        let was_accessor = current.contains(PropFlags::GETSET);
        let namespace = obj.borrow().class_id == ClassId::MODULE_NS;

        if !current.contains(PropFlags::CONFIGURABLE) || namespace {
            if desc.configurable == Some(true) {
                return Ok(false);
            }
            if desc
                .enumerable
                .is_some_and(|e| e != current.contains(PropFlags::ENUMERABLE))
            {
                return Ok(false);
            }
            if desc.is_accessor() || desc.is_data() {
                if desc.is_accessor() != was_accessor {
                    return Ok(false);
                }
                if let PropertySlot::GetSet { getter, setter } = &slot {
                    if let Some(get) = &desc.get {
                        if !same_object(get.as_object(), getter.as_ref()) {
                            return Ok(false);
                        }
                    }
                    if let Some(set) = &desc.set {
                        if !same_object(set.as_object(), setter.as_ref()) {
                            return Ok(false);
                        }
                    }
                } else if !current.contains(PropFlags::WRITABLE) || namespace {
                    if desc.writable == Some(!current.contains(PropFlags::WRITABLE)) {
                        return Ok(false);
                    }
                    if let Some(value) = &desc.value {
                        let stored = self.slot_value(&slot, atom)?;
                        if !stored.same_value(value) {
                            return Ok(false);
                        }
                    }
                    // Nothing to change
                    return Ok(true);
                }
            }
        }

        let mut flags = current;
        if let Some(c) = desc.configurable {
            flags.set(PropFlags::CONFIGURABLE, c);
        }
        if let Some(e) = desc.enumerable {
            flags.set(PropFlags::ENUMERABLE, e);
        }

        if desc.is_accessor() {
            let (mut getter, mut setter) = match slot {
                PropertySlot::GetSet { getter, setter } => (getter, setter),
                _ => (None, None),
            };
            if desc.get.is_some() {
                getter = desc.getter_object();
            }
            if desc.set.is_some() {
                setter = desc.setter_object();
            }
            flags.remove(PropFlags::WRITABLE | PropFlags::VARREF | PropFlags::LENGTH);
            flags.insert(PropFlags::GETSET);
            self.set_slot_flags(obj, index, flags);
            store_slot(obj, index, PropertySlot::GetSet { getter, setter });
        } else if was_accessor && desc.is_data() {
            flags.remove(PropFlags::GETSET);
            flags.set(PropFlags::WRITABLE, desc.writable == Some(true));
            self.set_slot_flags(obj, index, flags);
            store_slot(
                obj,
                index,
                PropertySlot::Value(desc.value.clone().unwrap_or_default()),
            );
        } else if !was_accessor {
            if let Some(w) = desc.writable {
                flags.set(PropFlags::WRITABLE, w);
            }
            self.set_slot_flags(obj, index, flags);
            if let Some(value) = &desc.value {
                match slot {
                    PropertySlot::VarRef(cell) => self.write_var_ref(&cell, atom, value.clone())?,
                    _ => store_slot(obj, index, PropertySlot::Value(value.clone())),
                }
            }
        } else {
            self.set_slot_flags(obj, index, flags);
        }
        Ok(true)
    }

    fn slot_value(&self, slot: &PropertySlot, atom: Atom) -> JsResult<JsValue> {
        match slot {
            PropertySlot::Value(v) => Ok(v.clone()),
            PropertySlot::VarRef(cell) => self.read_var_ref(cell, atom),
            _ => Ok(JsValue::Undefined),
        }
    }

    /// Define an element held outside the shape. `None` when `obj` has no
    /// such storage for `index`.
    fn define_own_element(
        &self,
        obj: &JsObjectRef,
        atom: Atom,
        index: u32,
        desc: &PropertyDescriptor,
    ) -> JsResult<Option<bool>> {
        let i = index as usize;
        enum Element {
            Dense(usize),
            Typed(usize),
            StringChar(usize),
            Other,
        }
        let element = {
            let o = obj.borrow();
            match (&o.data, o.dense_elements()) {
                (_, Some(elements)) => Element::Dense(elements.len()),
                (ObjectData::TypedArray(t), _) => Element::Typed(super::typed_array::live_length(t)),
                (ObjectData::Primitive(JsValue::String(s)), _) => Element::StringChar(s.len()),
                _ => Element::Other,
            }
        };
        let plain = !desc.is_accessor()
            && desc.configurable != Some(false)
            && desc.enumerable != Some(false)
            && desc.writable != Some(false);
        match element {
            Element::Dense(len) if i < len => {
                if plain {
                    if let Some(value) = &desc.value {
                        let old = {
                            let mut o = obj.borrow_mut();
                            o.dense_elements_mut()
                                .and_then(|elements| elements.get_mut(i))
                                .map(|slot| mem::replace(slot, value.clone()))
                        };
                        drop(old);
                    }
                    return Ok(Some(true));
                }
                self.convert_to_slow_array(obj);
                let found = obj.borrow().find_own(atom);
                match found {
                    Some((slot, current)) => self.redefine_property(obj, atom, slot, current, desc).map(Some),
                    None => Ok(Some(false)),
                }
            }
            Element::Typed(len) => {
                if i >= len || !plain {
                    return Ok(Some(false));
                }
                if let Some(value) = &desc.value {
                    let number = self.to_float64(value)?;
                    super::typed_array::write_element(obj, i, number);
                }
                Ok(Some(true))
            }
            Element::StringChar(len) if i < len => {
                let unchanged = !desc.is_accessor()
                    && desc.configurable != Some(true)
                    && desc.enumerable != Some(false)
                    && desc.writable != Some(true);
                if !unchanged {
                    return Ok(Some(false));
                }
                let same = match &desc.value {
                    Some(value) => {
                        let current = self.get_own_element(obj, index).map(|p| match p {
                            OwnProperty::Data { value, .. } => value,
                            OwnProperty::Accessor { .. } => JsValue::Undefined,
                        });
                        current.is_some_and(|c| c.same_value(value))
                    }
                    None => true,
                };
                Ok(Some(same))
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete an own property. Returns false when it is not configurable.
    pub fn delete_property(&self, obj: &JsObjectRef, atom: Atom) -> JsResult<bool> {
        if let Some(exotic) = self.class_exotic(obj) {
            if let Some(done) = exotic.delete_property(self, obj, atom)? {
                return Ok(done);
            }
        }
        let found = obj.borrow().find_own(atom);
        if let Some((_, flags)) = found {
            if !flags.contains(PropFlags::CONFIGURABLE) {
                return Ok(false);
            }
            self.remove_shape_property(obj, atom);
            return Ok(true);
        }
        let Some(index) = self.atom_index(atom) else {
            return Ok(true);
        };
        let i = index as usize;
        enum Element {
            Dense(usize),
            Fixed(usize),
            Other,
        }
        let element = {
            let o = obj.borrow();
            match (&o.data, o.dense_elements()) {
                (_, Some(elements)) => Element::Dense(elements.len()),
                (ObjectData::TypedArray(t), _) => Element::Fixed(super::typed_array::live_length(t)),
                (ObjectData::Primitive(JsValue::String(s)), _) => Element::Fixed(s.len()),
                _ => Element::Other,
            }
        };
        match element {
            Element::Dense(len) if i < len => {
                if i + 1 == len {
                    // The last element: stay dense
                    let old = obj
                        .borrow_mut()
                        .dense_elements_mut()
                        .and_then(|elements| elements.pop());
                    drop(old);
                    obj.update_size();
                    return Ok(true);
                }
                self.convert_to_slow_array(obj);
                self.delete_property(obj, atom)
            }
            Element::Fixed(len) if i < len => Ok(false),
            _ => Ok(true),
        }
    }

    // ------------------------------------------------------------------
    // Prototype and extensibility
    // ------------------------------------------------------------------

    pub fn get_prototype(&self, obj: &JsObjectRef) -> Option<JsObjectRef> {
        obj.borrow().proto()
    }

    /// Change the prototype of `obj`. Refused for non-extensible objects,
    /// module namespaces and when the change would create a cycle.
    pub fn set_prototype(&self, obj: &JsObjectRef, proto: Option<&JsObjectRef>) -> JsResult<bool> {
        let (current, extensible, class_id) = {
            let o = obj.borrow();
            (o.proto(), o.extensible, o.class_id)
        };
        if same_object(current.as_ref(), proto) {
            return Ok(true);
        }
        if !extensible || class_id == ClassId::MODULE_NS {
            return Ok(false);
        }
        let mut walk = proto.cloned();
        while let Some(p) = walk {
            if Gc::ptr_eq(&p, obj) {
                return Ok(false);
            }
            walk = p.borrow().proto();
        }
        self.prepare_shape_update(obj);
        let old = obj
            .borrow()
            .shape
            .borrow_mut()
            .set_proto(proto.cloned());
        drop(old);
        Ok(true)
    }

    pub fn is_extensible(&self, obj: &JsObjectRef) -> bool {
        obj.borrow().extensible
    }

    /// Forbid new own properties.
    pub fn prevent_extensions(&self, obj: &JsObjectRef) -> bool {
        let dense = obj.borrow().dense_elements().is_some();
        if dense {
            self.convert_to_slow_array(obj);
        }
        obj.borrow_mut().extensible = false;
        true
    }

    // ------------------------------------------------------------------
    // Convenience wrappers taking names as text
    // ------------------------------------------------------------------

    /// [`get_property`](Self::get_property) by name.
    pub fn get_property_str(&self, receiver: &JsValue, name: &str) -> JsResult<JsValue> {
        let atom = self.inner().intern_atom(name);
        let result = self.get_property(receiver, atom);
        self.inner().release_atom(atom);
        result
    }

    /// [`set_property`](Self::set_property) by name, throwing on failure.
    pub fn set_property_str(&self, receiver: &JsValue, name: &str, value: JsValue) -> JsResult<()> {
        let atom = self.inner().intern_atom(name);
        let result = self.set_property(receiver, atom, value, PropFlags::THROW);
        self.inner().release_atom(atom);
        result.map(|_| ())
    }

    /// [`define_property_value`](Self::define_property_value) by name.
    pub fn define_property_value_str(
        &self,
        obj: &JsObjectRef,
        name: &str,
        value: JsValue,
        flags: PropFlags,
    ) -> JsResult<bool> {
        let atom = self.inner().intern_atom(name);
        let result = self.define_property_value(obj, atom, value, flags);
        self.inner().release_atom(atom);
        result
    }
}
