//! Property, method and argument descriptors shared by libraries and the catalog.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::string_name::StringName;
use crate::variant::VariantType;

bitflags! {
    /// How a property is used by the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyUsage: u32 {
        const NONE = 0;
        /// Serialized, and captured in reload snapshots.
        const STORAGE = 1 << 1;
        const EDITOR = 1 << 2;
        const INTERNAL = 1 << 3;
        const CHECKABLE = 1 << 4;
        const CHECKED = 1 << 5;
        /// Group header in a property list.
        const GROUP = 1 << 6;
        const CATEGORY = 1 << 7;
        /// Subgroup header in a property list.
        const SUBGROUP = 1 << 8;
        const READ_ONLY = 1 << 12;
        /// Stored even when equal to the zero value of its type.
        const STORE_IF_NULL = 1 << 14;
        const DEFAULT = Self::STORAGE.bits() | Self::EDITOR.bits();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u32 {
        const NORMAL = 1;
        const EDITOR = 1 << 1;
        const CONST = 1 << 2;
        const VIRTUAL = 1 << 3;
        const VARARG = 1 << 4;
        const STATIC = 1 << 5;
        const DEFAULT = Self::NORMAL.bits();
    }
}

/// Editor hint attached to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum PropertyHint {
    #[default]
    None = 0,
    Range = 1,
    Enum = 2,
    EnumSuggestion = 3,
    ExpEasing = 4,
    Link = 5,
    Flags = 6,
    File = 13,
    Dir = 14,
    ResourceType = 17,
    MultilineText = 18,
    Placeholder = 20,
    NodeType = 34,
}

/// Native width of a numeric argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum TypeMetadata {
    #[default]
    None = 0,
    IntIsInt8 = 1,
    IntIsInt16 = 2,
    IntIsInt32 = 3,
    IntIsInt64 = 4,
    IntIsUint8 = 5,
    IntIsUint16 = 6,
    IntIsUint32 = 7,
    IntIsUint64 = 8,
    RealIsFloat = 9,
    RealIsDouble = 10,
    IntIsChar16 = 11,
    IntIsChar32 = 12,
}

/// Describes a property, argument or return slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: StringName,
    pub variant_type: VariantType,
    /// Class of the value for `Object` slots; empty otherwise.
    pub class_name: StringName,
    pub hint: PropertyHint,
    pub hint_string: String,
    pub usage: PropertyUsage,
}

impl PropertyInfo {
    pub fn new(name: impl Into<StringName>, variant_type: VariantType) -> Self {
        Self {
            name: name.into(),
            variant_type,
            class_name: StringName::empty(),
            hint: PropertyHint::None,
            hint_string: String::new(),
            usage: PropertyUsage::DEFAULT,
        }
    }

    /// Group header; properties whose names start with `prefix` belong to it.
    pub fn group(name: impl Into<StringName>, prefix: impl Into<String>) -> Self {
        Self {
            hint_string: prefix.into(),
            usage: PropertyUsage::GROUP,
            ..Self::new(name, VariantType::Nil)
        }
    }

    pub fn subgroup(name: impl Into<StringName>, prefix: impl Into<String>) -> Self {
        Self {
            hint_string: prefix.into(),
            usage: PropertyUsage::SUBGROUP,
            ..Self::new(name, VariantType::Nil)
        }
    }

    pub fn with_usage(mut self, usage: PropertyUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<StringName>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_hint(mut self, hint: PropertyHint, hint_string: impl Into<String>) -> Self {
        self.hint = hint;
        self.hint_string = hint_string.into();
        self
    }

    pub fn is_group_header(&self) -> bool {
        self.usage
            .intersects(PropertyUsage::GROUP | PropertyUsage::SUBGROUP | PropertyUsage::CATEGORY)
    }

    pub fn is_stored(&self) -> bool {
        self.usage.contains(PropertyUsage::STORAGE) && !self.is_group_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_usage_is_stored() {
        let info = PropertyInfo::new("health", VariantType::Int);
        assert!(info.is_stored());
        assert!(!info.is_group_header());
    }

    #[test]
    fn group_headers_are_not_stored() {
        let group = PropertyInfo::group("Stats", "stat_");
        assert!(group.is_group_header());
        assert!(!group.is_stored());
        assert_eq!(group.hint_string, "stat_");
        assert!(PropertyInfo::subgroup("Sub", "").is_group_header());
    }

    #[test]
    fn editor_only_property_is_not_stored() {
        let info = PropertyInfo::new("preview", VariantType::Bool).with_usage(PropertyUsage::EDITOR);
        assert!(!info.is_stored());
    }

    #[test]
    fn method_flags_compose() {
        let flags = MethodFlags::DEFAULT | MethodFlags::CONST;
        assert!(flags.contains(MethodFlags::NORMAL));
        assert!(flags.contains(MethodFlags::CONST));
        assert!(!flags.contains(MethodFlags::STATIC));
    }

    #[test]
    fn hint_from_raw_value() {
        assert_eq!(PropertyHint::try_from(2u32).unwrap(), PropertyHint::Enum);
        assert!(PropertyHint::try_from(999u32).is_err());
    }
}
