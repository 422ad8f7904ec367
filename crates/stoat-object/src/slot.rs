//! Property slots: one named/indexed cell with attributes.
//!
//! A slot is either a plain data cell or a getter/setter pair. The two
//! forms are an explicit sum so accessor promotion is visible in the type,
//! not inferred from nullable fields.

use crate::value::{PropertyKey, Value};

/// Property attribute bits.
pub mod attrib {
    /// Writes are rejected.
    pub const READONLY: u8 = 0x01;
    /// Skipped by enumeration.
    pub const DONTENUM: u8 = 0x02;
    /// Cannot be deleted or reconfigured.
    pub const PERMANENT: u8 = 0x04;
    /// Declared const, not yet initialized; cleared by the first write.
    pub const UNINITIALIZED_CONST: u8 = 0x08;
    /// All defined bits.
    pub const MASK: u8 = READONLY | DONTENUM | PERMANENT | UNINITIALIZED_CONST;
    /// No attributes.
    pub const EMPTY: u8 = 0;
}

/// Abort on attribute values outside the defined mask.
///
/// Malformed attributes are an engine/embedding bug, not a script error.
pub fn check_attributes(attributes: u8) {
    assert!(
        attributes & !attrib::MASK == 0,
        "invalid property attributes: {attributes:#04x}"
    );
}

/// The payload of a slot: data cell or accessor pair.
#[derive(Clone, Debug)]
pub enum SlotValue {
    /// A plain stored value.
    Data(Value),
    /// A promoted accessor; either side may be absent.
    Accessor {
        /// Called on reads; absent getter reads as undefined.
        getter: Option<Value>,
        /// Called on writes; absent setter makes writes fail or no-op.
        setter: Option<Value>,
    },
}

/// One property cell.
#[derive(Clone, Debug)]
pub struct Slot {
    /// The key this slot is stored under.
    pub key: PropertyKey,
    attributes: u8,
    /// Data or accessor payload.
    pub value: SlotValue,
}

impl Slot {
    /// Create a data slot.
    pub fn data(key: PropertyKey, value: Value, attributes: u8) -> Self {
        check_attributes(attributes);
        Self {
            key,
            attributes,
            value: SlotValue::Data(value),
        }
    }

    /// Create an accessor slot.
    pub fn accessor(
        key: PropertyKey,
        getter: Option<Value>,
        setter: Option<Value>,
        attributes: u8,
    ) -> Self {
        check_attributes(attributes);
        Self {
            key,
            attributes,
            value: SlotValue::Accessor { getter, setter },
        }
    }

    /// The attribute bitset.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Replace the attribute bitset (bits outside the mask are fatal).
    pub fn set_attributes(&mut self, attributes: u8) {
        check_attributes(attributes);
        self.attributes = attributes;
    }

    /// READONLY is set.
    pub fn is_readonly(&self) -> bool {
        self.attributes & attrib::READONLY != 0
    }

    /// DONTENUM is set.
    pub fn is_dont_enum(&self) -> bool {
        self.attributes & attrib::DONTENUM != 0
    }

    /// PERMANENT is set.
    pub fn is_permanent(&self) -> bool {
        self.attributes & attrib::PERMANENT != 0
    }

    /// UNINITIALIZED_CONST is set.
    pub fn is_uninitialized_const(&self) -> bool {
        self.attributes & attrib::UNINITIALIZED_CONST != 0
    }

    /// Clear UNINITIALIZED_CONST; the transition is one-way.
    pub fn initialize_const(&mut self) {
        self.attributes &= !attrib::UNINITIALIZED_CONST;
    }

    /// True for the data form.
    pub fn is_data(&self) -> bool {
        matches!(self.value, SlotValue::Data(_))
    }

    /// A descriptor describing this slot's current state.
    pub fn to_descriptor(&self) -> PropertyDescriptor {
        match &self.value {
            SlotValue::Data(value) => PropertyDescriptor {
                value: Some(value.clone()),
                writable: Some(!self.is_readonly()),
                enumerable: Some(!self.is_dont_enum()),
                configurable: Some(!self.is_permanent()),
                getter: None,
                setter: None,
            },
            SlotValue::Accessor { getter, setter } => PropertyDescriptor {
                value: None,
                writable: None,
                enumerable: Some(!self.is_dont_enum()),
                configurable: Some(!self.is_permanent()),
                getter: getter.clone(),
                setter: setter.clone(),
            },
        }
    }
}

/// A (possibly partial) property descriptor for `define_own_property`.
#[derive(Clone, Debug, Default)]
pub struct PropertyDescriptor {
    /// Data value, if this describes a data property.
    pub value: Option<Value>,
    /// Writability, if specified.
    pub writable: Option<bool>,
    /// Enumerability, if specified.
    pub enumerable: Option<bool>,
    /// Configurability, if specified.
    pub configurable: Option<bool>,
    /// Getter, if this describes an accessor property.
    pub getter: Option<Value>,
    /// Setter, if this describes an accessor property.
    pub setter: Option<Value>,
}

impl PropertyDescriptor {
    /// A full data descriptor.
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            getter: None,
            setter: None,
        }
    }

    /// A full accessor descriptor.
    pub fn accessor(
        getter: Option<Value>,
        setter: Option<Value>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        Self {
            value: None,
            writable: None,
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            getter,
            setter,
        }
    }

    /// Mentions data fields.
    pub fn is_data_descriptor(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// Mentions accessor fields.
    pub fn is_accessor_descriptor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }

    /// Attribute bits implied by this descriptor, with absent fields
    /// defaulting to the most restrictive setting.
    pub fn attributes(&self) -> u8 {
        let mut attributes = attrib::EMPTY;
        if !self.writable.unwrap_or(false) && !self.is_accessor_descriptor() {
            attributes |= attrib::READONLY;
        }
        if !self.enumerable.unwrap_or(false) {
            attributes |= attrib::DONTENUM;
        }
        if !self.configurable.unwrap_or(false) {
            attributes |= attrib::PERMANENT;
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_initialization_is_one_way() {
        let mut slot = Slot::data(
            PropertyKey::new("c"),
            Value::undefined(),
            attrib::PERMANENT | attrib::UNINITIALIZED_CONST,
        );
        assert!(slot.is_uninitialized_const());
        slot.initialize_const();
        assert!(!slot.is_uninitialized_const());
        assert!(slot.is_permanent());
    }

    #[test]
    #[should_panic(expected = "invalid property attributes")]
    fn test_undefined_attribute_bits_are_fatal() {
        Slot::data(PropertyKey::new("x"), Value::null(), 0x40);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let slot = Slot::data(PropertyKey::new("x"), Value::int32(1), attrib::DONTENUM);
        let desc = slot.to_descriptor();
        assert_eq!(desc.writable, Some(true));
        assert_eq!(desc.enumerable, Some(false));
        assert_eq!(desc.configurable, Some(true));
        assert_eq!(desc.attributes(), attrib::DONTENUM);
    }
}
