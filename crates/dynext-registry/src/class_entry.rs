//! Catalog row for one class.

use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use dynext_core::{
    ExtensionToken, MethodBind, MethodFlags, PropertyInfo, StringName, TypeMetadata, Variant,
};

/// Where a class comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiType {
    Core,
    Editor,
    Extension,
    EditorExtension,
}

impl ApiType {
    pub fn is_extension(self) -> bool {
        matches!(self, ApiType::Extension | ApiType::EditorExtension)
    }

    pub fn is_native(self) -> bool {
        !self.is_extension()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u32 {
        /// Has virtual methods a subclass must implement; can't be instantiated.
        const VIRTUAL = 1;
        const ABSTRACT = 1 << 1;
        /// Listed in the public class list.
        const EXPOSED = 1 << 2;
        /// Only runs in the game; tooling sees placeholders.
        const RUNTIME = 1 << 3;
        /// Has a create callback.
        const INSTANTIABLE = 1 << 4;
        const RELOADABLE = 1 << 5;
    }
}

/// A property as the catalog records it.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub info: PropertyInfo,
    /// Empty when the property has no setter method.
    pub setter: StringName,
    /// Empty when the property has no getter method.
    pub getter: StringName,
    /// Passed as the first argument to the accessors of indexed properties.
    pub index: Option<i64>,
    /// Declared default, used by builtin classes.
    pub default_value: Option<Variant>,
}

impl PropertyEntry {
    pub fn new(info: PropertyInfo) -> Self {
        Self {
            info,
            setter: StringName::empty(),
            getter: StringName::empty(),
            index: None,
            default_value: None,
        }
    }

    pub fn with_accessors(mut self, setter: StringName, getter: StringName) -> Self {
        self.setter = setter;
        self.getter = getter;
        self
    }

    pub fn with_index(mut self, index: Option<i64>) -> Self {
        self.index = index;
        self
    }

    pub fn with_default(mut self, value: Variant) -> Self {
        self.default_value = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalInfo {
    pub name: StringName,
    pub arguments: Vec<PropertyInfo>,
}

/// A method the library expects scripts or subclasses to override.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMethodInfo {
    pub name: StringName,
    pub flags: MethodFlags,
    pub return_value: Option<PropertyInfo>,
    pub return_metadata: TypeMetadata,
    pub arguments: Vec<PropertyInfo>,
    pub arguments_metadata: Vec<TypeMetadata>,
}

impl VirtualMethodInfo {
    pub fn new(name: impl Into<StringName>) -> Self {
        Self {
            name: name.into(),
            flags: MethodFlags::DEFAULT | MethodFlags::VIRTUAL,
            return_value: None,
            return_metadata: TypeMetadata::None,
            arguments: Vec::new(),
            arguments_metadata: Vec::new(),
        }
    }

    pub fn with_return(mut self, info: PropertyInfo) -> Self {
        self.return_value = Some(info);
        self
    }

    pub fn with_argument(mut self, info: PropertyInfo) -> Self {
        self.arguments.push(info);
        self.arguments_metadata.push(TypeMetadata::None);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantEntry {
    pub name: StringName,
    pub value: i64,
    pub enum_name: Option<StringName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    pub name: StringName,
    pub is_bitfield: bool,
    pub constants: Vec<StringName>,
}

/// Catalog entry for a class.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub name: StringName,
    pub parent: Option<StringName>,
    pub api: ApiType,
    pub flags: ClassFlags,
    /// Owning library for extension classes.
    pub library: Option<ExtensionToken>,

    // === Members ===
    pub methods: FxHashMap<StringName, Arc<MethodBind>>,
    pub virtual_methods: Vec<VirtualMethodInfo>,
    /// Properties and group headers in registration order.
    pub property_list: Vec<PropertyInfo>,
    pub properties: FxHashMap<StringName, PropertyEntry>,
    pub signals: Vec<SignalInfo>,
    pub constants: Vec<ConstantEntry>,
    pub enums: Vec<EnumEntry>,
}

impl ClassEntry {
    fn new(name: StringName, parent: Option<StringName>, api: ApiType) -> Self {
        Self {
            name,
            parent,
            api,
            flags: ClassFlags::EXPOSED,
            library: None,
            methods: FxHashMap::default(),
            virtual_methods: Vec::new(),
            property_list: Vec::new(),
            properties: FxHashMap::default(),
            signals: Vec::new(),
            constants: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// A class built into the host.
    pub fn builtin(name: impl Into<StringName>, parent: Option<&str>) -> Self {
        let mut entry = Self::new(name.into(), parent.map(StringName::from), ApiType::Core);
        entry.flags |= ClassFlags::INSTANTIABLE;
        entry
    }

    /// A class registered by a library.
    pub fn extension(
        name: impl Into<StringName>,
        parent: impl Into<StringName>,
        library: ExtensionToken,
    ) -> Self {
        let mut entry = Self::new(name.into(), Some(parent.into()), ApiType::Extension);
        entry.library = Some(library);
        entry
    }

    pub fn with_api(mut self, api: ApiType) -> Self {
        self.api = api;
        self
    }

    pub fn with_flags(mut self, flags: ClassFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Add a builtin property with a declared default.
    pub fn with_property(mut self, info: PropertyInfo, default_value: Variant) -> Self {
        self.add_property(PropertyEntry::new(info).with_default(default_value));
        self
    }

    pub fn is_instantiable(&self) -> bool {
        self.flags.contains(ClassFlags::INSTANTIABLE)
            && !self.flags.intersects(ClassFlags::VIRTUAL | ClassFlags::ABSTRACT)
    }

    pub fn find_method(&self, name: &StringName) -> Option<&Arc<MethodBind>> {
        self.methods.get(name)
    }

    pub fn find_property(&self, name: &StringName) -> Option<&PropertyEntry> {
        self.properties.get(name)
    }

    pub fn find_constant(&self, name: &StringName) -> Option<&ConstantEntry> {
        self.constants.iter().find(|c| &c.name == name)
    }

    pub fn find_signal(&self, name: &StringName) -> Option<&SignalInfo> {
        self.signals.iter().find(|s| &s.name == name)
    }

    pub(crate) fn add_property(&mut self, entry: PropertyEntry) {
        self.property_list.push(entry.info.clone());
        self.properties.insert(entry.info.name.clone(), entry);
    }

    pub(crate) fn add_constant(
        &mut self,
        enum_name: Option<StringName>,
        name: StringName,
        value: i64,
        is_bitfield: bool,
    ) {
        if let Some(enum_name) = &enum_name {
            match self.enums.iter_mut().find(|e| &e.name == enum_name) {
                Some(entry) => {
                    entry.is_bitfield |= is_bitfield;
                    entry.constants.push(name.clone());
                }
                None => self.enums.push(EnumEntry {
                    name: enum_name.clone(),
                    is_bitfield,
                    constants: vec![name.clone()],
                }),
            }
        }
        self.constants.push(ConstantEntry {
            name,
            value,
            enum_name,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynext_core::VariantType;

    #[test]
    fn builtin_is_instantiable() {
        let entry = ClassEntry::builtin("Object", None);
        assert!(entry.is_instantiable());
        assert!(entry.api.is_native());
        assert!(entry.parent.is_none());
    }

    #[test]
    fn extension_needs_create_to_be_instantiable() {
        let token = ExtensionToken::new(1);
        let entry = ClassEntry::extension("Foo", "RefCounted", token);
        assert!(!entry.is_instantiable());
        assert!(entry.api.is_extension());
        assert_eq!(entry.library, Some(token));

        let entry = entry.with_flags(ClassFlags::EXPOSED | ClassFlags::INSTANTIABLE | ClassFlags::ABSTRACT);
        assert!(!entry.is_instantiable());
    }

    #[test]
    fn builtin_property_keeps_order_and_default() {
        let entry = ClassEntry::builtin("Node", Some("Object"))
            .with_property(PropertyInfo::new("name", VariantType::StringName), Variant::from(StringName::empty()))
            .with_property(PropertyInfo::new("owner", VariantType::Object), Variant::null_object());
        let names: Vec<&str> = entry.property_list.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["name", "owner"]);
        let owner = entry.find_property(&StringName::new("owner")).unwrap();
        assert_eq!(owner.default_value, Some(Variant::null_object()));
    }

    #[test]
    fn enum_constants_group_by_enum() {
        let mut entry = ClassEntry::builtin("Node", None);
        let mode = Some(StringName::new("Mode"));
        entry.add_constant(mode.clone(), StringName::new("MODE_A"), 0, false);
        entry.add_constant(mode, StringName::new("MODE_B"), 1, false);
        entry.add_constant(None, StringName::new("LOOSE"), 7, false);
        assert_eq!(entry.enums.len(), 1);
        assert_eq!(entry.enums[0].constants.len(), 2);
        assert_eq!(entry.find_constant(&StringName::new("LOOSE")).unwrap().value, 7);
    }
}
