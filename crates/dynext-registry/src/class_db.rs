//! ClassDb - the reflection catalog.
//!
//! Holds one [`ClassEntry`] per known class, builtin or extension, and answers
//! inheritance, method, property, signal and constant queries. Member lookups
//! walk the inheritance chain from the queried class towards the root.
//!
//! # Example
//!
//! ```
//! use dynext_core::{ExtensionToken, StringName};
//! use dynext_registry::{ClassDb, ClassEntry};
//!
//! let mut db = ClassDb::with_builtin_classes();
//! db.register_extension_class(ClassEntry::extension("Foo", "RefCounted", ExtensionToken::new(1)))
//!     .unwrap();
//! assert!(db.is_parent_class(&StringName::new("Foo"), &StringName::new("Object")));
//! ```

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use dynext_core::{
    ExtensionToken, MethodBind, PropertyInfo, RegistrationError, StringName, Variant, VariantType,
};

use crate::class_entry::{ClassEntry, PropertyEntry, SignalInfo, VirtualMethodInfo};

/// Reflection catalog of all classes.
#[derive(Debug, Default)]
pub struct ClassDb {
    classes: FxHashMap<StringName, ClassEntry>,
    /// Default property values per class, filled on first request.
    default_values: FxHashMap<StringName, FxHashMap<StringName, Variant>>,
}

impl ClassDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the builtin class hierarchy.
    pub fn with_builtin_classes() -> Self {
        let mut db = Self::new();
        db.register_builtin_classes();
        db
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register `Object`, `RefCounted`, `Resource` and `Node`.
    pub fn register_builtin_classes(&mut self) {
        let builtins = [
            ClassEntry::builtin("Object", None),
            ClassEntry::builtin("RefCounted", Some("Object")),
            ClassEntry::builtin("Resource", Some("RefCounted")).with_property(
                PropertyInfo::new("resource_name", VariantType::String),
                Variant::String(String::new()),
            ),
            ClassEntry::builtin("Node", Some("Object")).with_property(
                PropertyInfo::new("name", VariantType::StringName),
                Variant::StringName(StringName::empty()),
            ),
        ];
        for entry in builtins {
            self.classes.insert(entry.name.clone(), entry);
        }
    }

    /// Register a builtin class. Its parent must already exist.
    pub fn register_builtin_class(&mut self, entry: ClassEntry) -> Result<(), RegistrationError> {
        self.insert_checked(entry)
    }

    /// Register an extension class. Its parent must already exist.
    pub fn register_extension_class(&mut self, entry: ClassEntry) -> Result<(), RegistrationError> {
        self.insert_checked(entry)
    }

    /// Register an extension class in place of an existing row of the same
    /// name, as a reload does.
    pub fn replace_extension_class(&mut self, entry: ClassEntry) -> Option<ClassEntry> {
        self.default_values.remove(&entry.name);
        trace!(class = %entry.name, "replacing class row");
        self.classes.insert(entry.name.clone(), entry)
    }

    fn insert_checked(&mut self, entry: ClassEntry) -> Result<(), RegistrationError> {
        if self.classes.contains_key(&entry.name) {
            return Err(RegistrationError::AlreadyExists(entry.name));
        }
        if let Some(parent) = &entry.parent
            && !self.classes.contains_key(parent)
        {
            return Err(RegistrationError::UnknownParent {
                class: entry.name.clone(),
                parent: parent.clone(),
            });
        }
        trace!(class = %entry.name, parent = ?entry.parent, "registered class");
        self.classes.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Remove a class row, returning it.
    pub fn unregister_class(&mut self, name: &StringName) -> Option<ClassEntry> {
        self.default_values.remove(name);
        self.classes.remove(name)
    }

    // ==========================================================================
    // Member Registration
    // ==========================================================================

    fn class_mut_for(
        &mut self,
        class: &StringName,
        member: impl FnOnce() -> String,
    ) -> Result<&mut ClassEntry, RegistrationError> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| RegistrationError::UnknownClass {
                class: class.clone(),
                member: member(),
            })
    }

    /// Bind a method, replacing any bind of the same name on the class.
    pub fn bind_method(
        &mut self,
        class: &StringName,
        bind: Arc<MethodBind>,
    ) -> Result<Option<Arc<MethodBind>>, RegistrationError> {
        let entry = self.class_mut_for(class, || format!("method '{}'", bind.name()))?;
        Ok(entry.methods.insert(bind.name().clone(), bind))
    }

    pub fn unbind_method(&mut self, class: &StringName, method: &StringName) -> Option<Arc<MethodBind>> {
        self.classes.get_mut(class)?.methods.remove(method)
    }

    pub fn add_virtual_method(
        &mut self,
        class: &StringName,
        info: VirtualMethodInfo,
    ) -> Result<(), RegistrationError> {
        let entry = self.class_mut_for(class, || format!("virtual method '{}'", info.name))?;
        entry.virtual_methods.retain(|m| m.name != info.name);
        entry.virtual_methods.push(info);
        Ok(())
    }

    pub fn add_property(
        &mut self,
        class: &StringName,
        property: PropertyEntry,
    ) -> Result<(), RegistrationError> {
        self.default_values.remove(class);
        let entry = self.class_mut_for(class, || format!("property '{}'", property.info.name))?;
        entry.add_property(property);
        Ok(())
    }

    pub fn add_property_group(
        &mut self,
        class: &StringName,
        name: &str,
        prefix: &str,
    ) -> Result<(), RegistrationError> {
        let entry = self.class_mut_for(class, || format!("property group '{name}'"))?;
        entry.property_list.push(PropertyInfo::group(name, prefix));
        Ok(())
    }

    pub fn add_property_subgroup(
        &mut self,
        class: &StringName,
        name: &str,
        prefix: &str,
    ) -> Result<(), RegistrationError> {
        let entry = self.class_mut_for(class, || format!("property subgroup '{name}'"))?;
        entry.property_list.push(PropertyInfo::subgroup(name, prefix));
        Ok(())
    }

    pub fn add_signal(&mut self, class: &StringName, signal: SignalInfo) -> Result<(), RegistrationError> {
        let entry = self.class_mut_for(class, || format!("signal '{}'", signal.name))?;
        entry.signals.retain(|s| s.name != signal.name);
        entry.signals.push(signal);
        Ok(())
    }

    pub fn bind_integer_constant(
        &mut self,
        class: &StringName,
        enum_name: Option<StringName>,
        name: StringName,
        value: i64,
        is_bitfield: bool,
    ) -> Result<(), RegistrationError> {
        let entry = self.class_mut_for(class, || format!("constant '{name}'"))?;
        entry.add_constant(enum_name, name, value, is_bitfield);
        Ok(())
    }

    // ==========================================================================
    // Class Lookup
    // ==========================================================================

    pub fn get(&self, name: &StringName) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &StringName) -> Option<&mut ClassEntry> {
        self.classes.get_mut(name)
    }

    pub fn class_exists(&self, name: &StringName) -> bool {
        self.classes.contains_key(name)
    }

    pub fn parent_of(&self, name: &StringName) -> Option<&StringName> {
        self.classes.get(name)?.parent.as_ref()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values()
    }

    /// Names of the classes a library registered.
    pub fn classes_of_library(&self, library: ExtensionToken) -> Vec<StringName> {
        let mut names: Vec<StringName> = self
            .classes
            .values()
            .filter(|entry| entry.library == Some(library))
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names
    }

    // ==========================================================================
    // Inheritance Helpers
    // ==========================================================================

    /// The class and its ancestors, from the class itself to the root.
    pub fn inheritance_chain(&self, name: &StringName) -> Vec<&ClassEntry> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(name);
        while let Some(entry) = current {
            chain.push(entry);
            current = entry.parent.as_ref().and_then(|p| self.classes.get(p));
        }
        chain
    }

    /// Whether `class` is `ancestor` or inherits from it.
    pub fn is_parent_class(&self, class: &StringName, ancestor: &StringName) -> bool {
        self.inheritance_chain(class)
            .iter()
            .any(|entry| &entry.name == ancestor)
    }

    /// Closest builtin class in the chain, the class itself included.
    pub fn nearest_native_ancestor(&self, name: &StringName) -> Option<&StringName> {
        self.inheritance_chain(name)
            .into_iter()
            .find(|entry| entry.api.is_native())
            .map(|entry| &entry.name)
    }

    // ==========================================================================
    // Member Lookup
    // ==========================================================================

    /// Find a method on the class or its ancestors.
    pub fn get_method(&self, class: &StringName, method: &StringName) -> Option<Arc<MethodBind>> {
        self.inheritance_chain(class)
            .into_iter()
            .find_map(|entry| entry.find_method(method))
            .cloned()
    }

    pub fn has_method(&self, class: &StringName, method: &StringName, no_inheritance: bool) -> bool {
        if no_inheritance {
            return self
                .classes
                .get(class)
                .is_some_and(|entry| entry.methods.contains_key(method));
        }
        self.get_method(class, method).is_some()
    }

    /// Find a property on the class or its ancestors.
    pub fn get_property(&self, class: &StringName, property: &StringName) -> Option<&PropertyEntry> {
        self.inheritance_chain(class)
            .into_iter()
            .find_map(|entry| entry.find_property(property))
    }

    /// Property list, most-derived class first, group headers included.
    pub fn get_property_list(&self, class: &StringName, no_inheritance: bool) -> Vec<PropertyInfo> {
        let chain = self.inheritance_chain(class);
        let take = if no_inheritance { 1 } else { chain.len() };
        chain
            .into_iter()
            .take(take)
            .flat_map(|entry| entry.property_list.iter().cloned())
            .collect()
    }

    /// Names of properties that persist, used for defaults and reload snapshots.
    pub fn stored_properties(&self, class: &StringName) -> Vec<StringName> {
        self.get_property_list(class, false)
            .into_iter()
            .filter(PropertyInfo::is_stored)
            .map(|info| info.name)
            .collect()
    }

    pub fn get_virtual_methods(&self, class: &StringName) -> Vec<&VirtualMethodInfo> {
        self.inheritance_chain(class)
            .into_iter()
            .flat_map(|entry| entry.virtual_methods.iter())
            .collect()
    }

    pub fn get_signal(&self, class: &StringName, signal: &StringName) -> Option<&SignalInfo> {
        self.inheritance_chain(class)
            .into_iter()
            .find_map(|entry| entry.find_signal(signal))
    }

    pub fn get_integer_constant(&self, class: &StringName, name: &StringName) -> Option<i64> {
        self.inheritance_chain(class)
            .into_iter()
            .find_map(|entry| entry.find_constant(name))
            .map(|constant| constant.value)
    }

    /// Constants of one enum, in registration order.
    pub fn get_enum_constants(&self, class: &StringName, enum_name: &StringName) -> Vec<StringName> {
        self.inheritance_chain(class)
            .into_iter()
            .find_map(|entry| entry.enums.iter().find(|e| &e.name == enum_name))
            .map(|e| e.constants.clone())
            .unwrap_or_default()
    }

    pub fn is_enum_bitfield(&self, class: &StringName, enum_name: &StringName) -> bool {
        self.inheritance_chain(class)
            .into_iter()
            .find_map(|entry| entry.enums.iter().find(|e| &e.name == enum_name))
            .is_some_and(|e| e.is_bitfield)
    }

    // ==========================================================================
    // Default Values
    // ==========================================================================

    /// Cached default values for a class, if computed.
    pub fn cached_default_values(&self, class: &StringName) -> Option<&FxHashMap<StringName, Variant>> {
        self.default_values.get(class)
    }

    pub fn cache_default_values(&mut self, class: StringName, values: FxHashMap<StringName, Variant>) {
        self.default_values.insert(class, values);
    }

    /// Declared defaults along the inheritance chain.
    pub fn declared_default_values(&self, class: &StringName) -> FxHashMap<StringName, Variant> {
        let mut values = FxHashMap::default();
        for entry in self.inheritance_chain(class).into_iter().rev() {
            for property in entry.properties.values() {
                if let Some(value) = &property.default_value {
                    values.insert(property.info.name.clone(), value.clone());
                }
            }
        }
        values
    }

    pub fn invalidate_default_values(&mut self, class: &StringName) {
        self.default_values.remove(class);
    }
}
