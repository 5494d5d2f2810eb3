//! Host-side object record.

use std::any::Any;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::ids::ExtensionToken;
use crate::string_name::StringName;
use crate::variant::Variant;

/// Per-object state owned by a library: the instance behind an extension
/// object, or a binding a library attached to a foreign object.
pub type InstanceData = Box<dyn Any + Send + Sync>;

/// Notification sent to every rebound instance once a reload completes.
pub const NOTIFICATION_EXTENSION_RELOADED: i32 = 2;
/// Notification sent right after an extension instance is created.
pub const NOTIFICATION_POSTINITIALIZE: i32 = 0;
/// Notification sent right before an object is freed.
pub const NOTIFICATION_PREDELETE: i32 = 1;

/// Which extension class an object is an instance of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionBinding {
    pub library: ExtensionToken,
    pub class: StringName,
    /// The object only keeps property values; the library has no instance for it.
    pub placeholder: bool,
}

impl ExtensionBinding {
    pub fn new(library: ExtensionToken, class: impl Into<StringName>) -> Self {
        Self {
            library,
            class: class.into(),
            placeholder: false,
        }
    }

    pub fn placeholder(library: ExtensionToken, class: impl Into<StringName>) -> Self {
        Self {
            library,
            class: class.into(),
            placeholder: true,
        }
    }
}

/// A live object.
///
/// Every object has a builtin (native) class. Objects of extension classes
/// additionally carry an [`ExtensionBinding`] and, unless they are
/// placeholders, the library's instance data.
pub struct Object {
    native_class: StringName,
    extension: Option<ExtensionBinding>,
    instance: Option<InstanceData>,
    storage: FxHashMap<StringName, Variant>,
    instance_bindings: FxHashMap<ExtensionToken, InstanceData>,
}

impl Object {
    pub fn new(native_class: impl Into<StringName>) -> Self {
        Self {
            native_class: native_class.into(),
            extension: None,
            instance: None,
            storage: FxHashMap::default(),
            instance_bindings: FxHashMap::default(),
        }
    }

    /// Most-derived class: the extension class when bound, else the native class.
    pub fn class_name(&self) -> &StringName {
        self.extension
            .as_ref()
            .map_or(&self.native_class, |binding| &binding.class)
    }

    pub fn native_class(&self) -> &StringName {
        &self.native_class
    }

    pub fn set_native_class(&mut self, class: impl Into<StringName>) {
        self.native_class = class.into();
    }

    pub fn extension(&self) -> Option<&ExtensionBinding> {
        self.extension.as_ref()
    }

    pub fn is_extension_placeholder(&self) -> bool {
        self.extension.as_ref().is_some_and(|b| b.placeholder)
    }

    /// Bind to an extension class, returning the previous instance data.
    pub fn reset_internal_extension(
        &mut self,
        binding: ExtensionBinding,
        instance: Option<InstanceData>,
    ) -> Option<InstanceData> {
        self.extension = Some(binding);
        std::mem::replace(&mut self.instance, instance)
    }

    /// Drop the extension binding, returning the instance data for disposal.
    pub fn clear_internal_extension(&mut self) -> Option<InstanceData> {
        self.extension = None;
        self.instance.take()
    }

    pub fn instance(&self) -> Option<&InstanceData> {
        self.instance.as_ref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut InstanceData> {
        self.instance.as_mut()
    }

    /// Downcast the instance data.
    pub fn instance_as<T: Any>(&self) -> Option<&T> {
        self.instance.as_ref()?.downcast_ref::<T>()
    }

    pub fn instance_as_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.instance.as_mut()?.downcast_mut::<T>()
    }

    /// Host-side value of a property without a setter.
    pub fn stored(&self, name: &StringName) -> Option<&Variant> {
        self.storage.get(name)
    }

    pub fn store(&mut self, name: StringName, value: Variant) {
        self.storage.insert(name, value);
    }

    pub fn instance_binding(&self, library: ExtensionToken) -> Option<&InstanceData> {
        self.instance_bindings.get(&library)
    }

    pub fn set_instance_binding(
        &mut self,
        library: ExtensionToken,
        binding: InstanceData,
    ) -> Option<InstanceData> {
        self.instance_bindings.insert(library, binding)
    }

    pub fn free_instance_binding(&mut self, library: ExtensionToken) -> Option<InstanceData> {
        self.instance_bindings.remove(&library)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("native_class", &self.native_class)
            .field("extension", &self.extension)
            .field("has_instance", &self.instance.is_some())
            .field("storage", &self.storage)
            .field("instance_bindings", &self.instance_bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_name_prefers_extension_binding() {
        let mut object = Object::new("RefCounted");
        assert_eq!(object.class_name(), "RefCounted");

        let token = ExtensionToken::new(1);
        object.reset_internal_extension(ExtensionBinding::new(token, "Foo"), Some(Box::new(5i64)));
        assert_eq!(object.class_name(), "Foo");
        assert_eq!(object.native_class(), "RefCounted");
        assert_eq!(object.instance_as::<i64>(), Some(&5));

        let old = object.clear_internal_extension();
        assert!(old.is_some());
        assert_eq!(object.class_name(), "RefCounted");
        assert!(object.instance().is_none());
    }

    #[test]
    fn placeholder_binding() {
        let mut object = Object::new("Object");
        object.reset_internal_extension(ExtensionBinding::placeholder(ExtensionToken::new(2), "Tool"), None);
        assert!(object.is_extension_placeholder());
        assert!(object.instance().is_none());
    }

    #[test]
    fn reset_returns_previous_instance() {
        let token = ExtensionToken::new(1);
        let mut object = Object::new("Object");
        object.reset_internal_extension(ExtensionBinding::new(token, "A"), Some(Box::new(1u8)));
        let previous = object.reset_internal_extension(ExtensionBinding::new(token, "A"), Some(Box::new(2u8)));
        assert_eq!(previous.unwrap().downcast_ref::<u8>(), Some(&1));
        assert_eq!(object.instance_as::<u8>(), Some(&2));
    }

    #[test]
    fn storage_and_instance_bindings() {
        let mut object = Object::new("Node");
        object.store(StringName::new("name"), Variant::from("root"));
        assert_eq!(object.stored(&StringName::new("name")), Some(&Variant::from("root")));

        let token = ExtensionToken::new(9);
        assert!(object.set_instance_binding(token, Box::new("binding")).is_none());
        assert!(object.instance_binding(token).is_some());
        assert!(object.free_instance_binding(token).is_some());
        assert!(object.instance_binding(token).is_none());
    }
}
