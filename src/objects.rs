//! Object API: instantiation, property access, notifications and method
//! dispatch on live objects.

use std::ffi::c_void;
use std::sync::Arc;

use dynext_core::{
    CallError, CallErrorKind, ExtensionBinding, ExtensionError, ExtensionToken, InstanceData,
    InstanceId, MethodBind, NOTIFICATION_POSTINITIALIZE, NOTIFICATION_PREDELETE, Object,
    ObjectError, StringName, Variant,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::extension::{ClassCallbacks, ClassLink};
use crate::runtime::Runtime;

impl Runtime {
    // ==========================================================================
    // Lifetime
    // ==========================================================================

    /// Create an object of `class`.
    ///
    /// Extension classes get their instance from the library's create
    /// callback; instances of reloadable classes are tracked.
    pub fn instantiate(&mut self, class: &StringName) -> Result<InstanceId, ExtensionError> {
        let result = self.instantiate_internal(class, true, true);
        self.report(None, result)
    }

    pub(crate) fn instantiate_internal(
        &mut self,
        class: &StringName,
        track: bool,
        notify: bool,
    ) -> Result<InstanceId, ExtensionError> {
        let entry = self
            .class_db
            .get(class)
            .ok_or_else(|| ObjectError::UnknownClass(class.clone()))?;
        if !entry.is_instantiable() {
            return Err(ObjectError::NotInstantiable(class.clone()).into());
        }
        let Some(library) = entry.library.filter(|_| entry.api.is_extension()) else {
            return Ok(self.objects.insert(Object::new(class.clone())));
        };

        let link = ClassLink::new(library, class.clone());
        let callbacks = self
            .extension_class(&link)
            .map(|ext_class| ext_class.callbacks.clone())
            .ok_or_else(|| ObjectError::UnknownClass(class.clone()))?;
        let native = self.native_class_of(class);

        let id = self.objects.insert(Object::new(native));
        let userdata = callbacks.userdata.as_ref();
        let (instance, postinitialize) = match (
            callbacks.create_instance,
            callbacks.legacy_create_instance(),
        ) {
            (Some(create), _) => (create(userdata, id, notify), notify),
            (None, Some(create)) => (create(userdata, id), true),
            (None, None) => {
                self.objects.remove(id);
                return Err(ObjectError::NotInstantiable(class.clone()).into());
            }
        };
        if let Some(object) = self.objects.get_mut(id) {
            object.reset_internal_extension(ExtensionBinding::new(library, class.clone()), Some(instance));
        }
        if track {
            self.track_instance(&link, id);
        }
        if postinitialize {
            self.notify(id, NOTIFICATION_POSTINITIALIZE);
        }
        trace!(class = %class, id = %id, "instantiated");
        Ok(id)
    }

    /// Create an object of an extension class that only keeps property values.
    pub fn instantiate_placeholder(&mut self, class: &StringName) -> Result<InstanceId, ExtensionError> {
        let result = self.instantiate_placeholder_internal(class);
        self.report(None, result)
    }

    fn instantiate_placeholder_internal(&mut self, class: &StringName) -> Result<InstanceId, ExtensionError> {
        let library = self
            .class_owner(class)
            .ok_or_else(|| ObjectError::UnknownClass(class.clone()))?;
        let native = self.native_class_of(class);
        let mut object = Object::new(native);
        object.reset_internal_extension(ExtensionBinding::placeholder(library, class.clone()), None);
        let id = self.objects.insert(object);
        self.track_instance(&ClassLink::new(library, class.clone()), id);
        Ok(id)
    }

    /// Destroy an object, returning its instance to the owning library.
    pub fn free_object(&mut self, id: InstanceId) -> Result<(), ExtensionError> {
        if !self.objects.contains(id) {
            return Err(ObjectError::InvalidInstance(id).into());
        }
        self.notify(id, NOTIFICATION_PREDELETE);
        let mut object = self
            .objects
            .remove(id)
            .ok_or(ObjectError::InvalidInstance(id))?;
        if let Some(binding) = object.extension().cloned() {
            let link = ClassLink::new(binding.library, binding.class);
            self.untrack_instance(&link, id);
            if let Some(instance) = object.clear_internal_extension() {
                self.free_instance_data(&link, instance);
            }
        }
        for ext in self.extensions.values_mut() {
            ext.instance_bindings.remove(&id);
        }
        trace!(id = %id, "freed");
        Ok(())
    }

    /// Hand instance data back to the class's free callback, or drop it.
    pub(crate) fn free_instance_data(&self, link: &ClassLink, instance: InstanceData) {
        let callbacks = self.extension_class(link).map(|class| &class.callbacks);
        match callbacks.and_then(|c| c.free_instance.map(|free| (free, c.userdata.as_ref()))) {
            Some((free, userdata)) => free(userdata, instance),
            None => drop(instance),
        }
    }

    pub(crate) fn native_class_of(&self, class: &StringName) -> StringName {
        self.class_db
            .nearest_native_ancestor(class)
            .cloned()
            .unwrap_or_else(|| StringName::new("Object"))
    }

    fn callbacks_of(&self, binding: &ExtensionBinding) -> Option<&ClassCallbacks> {
        self.extensions
            .get(&binding.library)?
            .classes
            .get(&binding.class)
            .map(|class| &class.callbacks)
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    pub fn is_instance_valid(&self, id: InstanceId) -> bool {
        self.objects.contains(id)
    }

    pub fn object(&self, id: InstanceId) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn object_mut(&mut self, id: InstanceId) -> Option<&mut Object> {
        self.objects.get_mut(id)
    }

    /// Most-derived class name of a live object.
    pub fn object_class(&self, id: InstanceId) -> Option<StringName> {
        self.objects.get(id).map(|object| object.class_name().clone())
    }

    /// Text form of an object, via the class's `to_string` callback if any.
    pub fn object_to_string(&self, id: InstanceId) -> Option<String> {
        let object = self.objects.get(id)?;
        let custom = object
            .extension()
            .filter(|binding| !binding.placeholder)
            .and_then(|binding| self.callbacks_of(binding))
            .and_then(|callbacks| callbacks.to_string)
            .zip(object.instance())
            .and_then(|(to_string, instance)| to_string(instance));
        Some(custom.unwrap_or_else(|| format!("<{}#{}>", object.class_name(), id.raw())))
    }

    // ==========================================================================
    // Properties
    // ==========================================================================

    /// Read a property: getter bind, then the class `get` callback, then
    /// host storage, then the declared default.
    pub fn object_get(&mut self, id: InstanceId, property: &StringName) -> Option<Variant> {
        let object = self.objects.get(id)?;
        let class = object.class_name().clone();
        let binding = object.extension().cloned();
        let placeholder = object.is_extension_placeholder();
        let entry = self.class_db.get_property(&class, property).cloned();

        if !placeholder
            && let Some(entry) = &entry
            && !entry.getter.is_empty()
            && let Some(getter) = self.class_db.get_method(&class, &entry.getter)
        {
            let index = entry.index.map(Variant::Int);
            let args: Vec<&Variant> = index.iter().collect();
            let mut error = CallError::ok();
            let value = getter.call(self.objects.get_mut(id), &args, &mut error);
            if error.is_ok() {
                return Some(value);
            }
            warn!(class = %class, property = %property, "getter failed: {error}");
        }

        if !placeholder
            && let Some(binding) = &binding
            && let Some(get) = self.callbacks_of(binding).and_then(|callbacks| callbacks.get)
            && let Some(value) = self
                .objects
                .get(id)
                .and_then(Object::instance)
                .and_then(|instance| get(instance, property))
        {
            return Some(value);
        }

        if let Some(value) = self.objects.get(id).and_then(|object| object.stored(property)) {
            return Some(value.clone());
        }
        entry.map(|entry| {
            entry
                .default_value
                .unwrap_or_else(|| Variant::default_for(entry.info.variant_type))
        })
    }

    /// Write a property: setter bind, then the class `set` callback, then host
    /// storage for declared properties. Unknown properties are ignored.
    pub fn object_set(&mut self, id: InstanceId, property: &StringName, value: Variant) -> bool {
        let Some(object) = self.objects.get(id) else {
            return false;
        };
        let class = object.class_name().clone();
        let binding = object.extension().cloned();
        let placeholder = object.is_extension_placeholder();
        let entry = self.class_db.get_property(&class, property).cloned();

        if !placeholder
            && let Some(entry) = &entry
            && !entry.setter.is_empty()
            && let Some(setter) = self.class_db.get_method(&class, &entry.setter)
        {
            let index = entry.index.map(Variant::Int);
            let args: Vec<&Variant> = index.iter().chain(std::iter::once(&value)).collect();
            let mut error = CallError::ok();
            setter.call(self.objects.get_mut(id), &args, &mut error);
            if !error.is_ok() {
                warn!(class = %class, property = %property, "setter failed: {error}");
            }
            return error.is_ok();
        }

        if !placeholder
            && let Some(binding) = &binding
            && let Some(set) = self.callbacks_of(binding).and_then(|callbacks| callbacks.set)
            && let Some(instance) = self.objects.get_mut(id).and_then(Object::instance_mut)
            && set(instance, property, &value)
        {
            return true;
        }

        match (entry, self.objects.get_mut(id)) {
            (Some(_), Some(object)) => {
                object.store(property.clone(), value);
                true
            }
            _ => false,
        }
    }

    // ==========================================================================
    // Notifications
    // ==========================================================================

    /// Deliver a notification to the extension instance behind an object.
    pub fn notify(&mut self, id: InstanceId, what: i32) {
        let Some(binding) = self
            .objects
            .get(id)
            .and_then(Object::extension)
            .filter(|binding| !binding.placeholder)
            .cloned()
        else {
            return;
        };
        let Some(callbacks) = self.callbacks_of(&binding) else {
            return;
        };
        let notification = callbacks.notification;
        let legacy = callbacks.legacy_notification();
        let Some(instance) = self.objects.get_mut(id).and_then(Object::instance_mut) else {
            return;
        };
        if let Some(notification) = notification {
            notification(instance, what, false);
        } else if let Some(notification) = legacy {
            notification(instance, what);
        }
    }

    // ==========================================================================
    // Method Calls
    // ==========================================================================

    fn resolve_method(&self, id: InstanceId, method: &StringName) -> Result<Arc<MethodBind>, ExtensionError> {
        let class = self
            .object_class(id)
            .ok_or(ObjectError::InvalidInstance(id))?;
        self.class_db.get_method(&class, method).ok_or_else(|| {
            ObjectError::UnknownMethod {
                class,
                method: method.clone(),
            }
            .into()
        })
    }

    fn call_result(method: &StringName, value: Variant, error: CallError) -> Result<Variant, ExtensionError> {
        if error.is_ok() {
            Ok(value)
        } else {
            debug!(method = %method, "call failed: {error}");
            Err(ObjectError::Call {
                method: method.clone(),
                error,
            }
            .into())
        }
    }

    /// Call a method through the generic path.
    pub fn call_method(
        &mut self,
        id: InstanceId,
        method: &StringName,
        args: &[Variant],
    ) -> Result<Variant, ExtensionError> {
        let bind = self.resolve_method(id, method)?;
        let refs: Vec<&Variant> = args.iter().collect();
        let mut error = CallError::ok();
        let value = bind.call(self.objects.get_mut(id), &refs, &mut error);
        Self::call_result(method, value, error)
    }

    /// Call a method that must not mutate the object.
    pub fn call_method_const(
        &mut self,
        id: InstanceId,
        method: &StringName,
        args: &[Variant],
    ) -> Result<Variant, ExtensionError> {
        let bind = self.resolve_method(id, method)?;
        if !bind.is_const() {
            let error = CallError::new(CallErrorKind::MethodNotConst);
            return Self::call_result(method, Variant::Nil, error);
        }
        self.call_method(id, method, args)
    }

    /// Call a static method of `class`.
    pub fn call_static(
        &mut self,
        class: &StringName,
        method: &StringName,
        args: &[Variant],
    ) -> Result<Variant, ExtensionError> {
        let bind = self
            .class_db
            .get_method(class, method)
            .ok_or_else(|| ObjectError::UnknownMethod {
                class: class.clone(),
                method: method.clone(),
            })?;
        let refs: Vec<&Variant> = args.iter().collect();
        let mut error = CallError::ok();
        let value = bind.call(None, &refs, &mut error);
        Self::call_result(method, value, error)
    }

    /// Call through the validated path.
    ///
    /// # Safety
    ///
    /// `args` must match the method's declared argument count and types, as
    /// for [`MethodBind::validated_call`].
    pub unsafe fn call_method_validated(
        &mut self,
        id: InstanceId,
        method: &StringName,
        args: &[Variant],
    ) -> Result<Variant, ExtensionError> {
        let bind = self.resolve_method(id, method)?;
        let refs: Vec<&Variant> = args.iter().collect();
        let mut ret = Variant::Nil;
        unsafe { bind.validated_call(self.objects.get_mut(id), &refs, &mut ret) };
        Ok(ret)
    }

    /// Call through the raw path.
    ///
    /// # Safety
    ///
    /// Every pointer in `args` must point at a value of the declared argument
    /// type, and `ret` at a value of the declared return type.
    pub unsafe fn call_method_raw(
        &mut self,
        id: InstanceId,
        method: &StringName,
        args: &[*const c_void],
        ret: *mut c_void,
    ) -> Result<(), ExtensionError> {
        let bind = self.resolve_method(id, method)?;
        unsafe { bind.ptrcall(self.objects.get_mut(id), args, ret) };
        Ok(())
    }

    // ==========================================================================
    // Instance Bindings
    // ==========================================================================

    /// Attach per-library data to an object.
    pub fn set_instance_binding(
        &mut self,
        library: ExtensionToken,
        id: InstanceId,
        binding: InstanceData,
    ) -> Result<(), ExtensionError> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or(ObjectError::InvalidInstance(id))?;
        object.set_instance_binding(library, binding);
        self.extension_mut(library)?.instance_bindings.insert(id);
        Ok(())
    }

    pub fn instance_binding(&self, library: ExtensionToken, id: InstanceId) -> Option<&InstanceData> {
        self.objects.get(id)?.instance_binding(library)
    }

    pub fn free_instance_binding(&mut self, library: ExtensionToken, id: InstanceId) -> Option<InstanceData> {
        if let Some(ext) = self.extensions.get_mut(&library) {
            ext.instance_bindings.remove(&id);
        }
        self.objects.get_mut(id)?.free_instance_binding(library)
    }

    // ==========================================================================
    // Default Values
    // ==========================================================================

    /// Default value of a stored property, computed once per class.
    pub fn class_default_property_value(
        &mut self,
        class: &StringName,
        property: &StringName,
    ) -> Option<Variant> {
        self.ensure_default_values(class);
        self.class_db
            .cached_default_values(class)?
            .get(property)
            .cloned()
    }

    fn ensure_default_values(&mut self, class: &StringName) {
        if self.class_db.cached_default_values(class).is_some() {
            return;
        }
        let Some(entry) = self.class_db.get(class) else {
            return;
        };
        let probe = entry.is_instantiable() && entry.api.is_extension();
        let mut values: FxHashMap<StringName, Variant> = self.class_db.declared_default_values(class);

        if probe {
            match self.instantiate_internal(class, false, false) {
                Ok(id) => {
                    for name in self.class_db.stored_properties(class) {
                        if let Some(value) = self.object_get(id, &name) {
                            values.insert(name, value);
                        }
                    }
                    if let Some(mut object) = self.objects.remove(id)
                        && let Some(binding) = object.extension().cloned()
                        && let Some(instance) = object.clear_internal_extension()
                    {
                        self.free_instance_data(&ClassLink::new(binding.library, binding.class), instance);
                    }
                }
                Err(err) => debug!(class = %class, "default values without instance: {err}"),
            }
        }
        self.class_db.cache_default_values(class.clone(), values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynext_core::PropertyInfo;
    use dynext_core::VariantType;
    use dynext_registry::ClassEntry;

    #[test]
    fn instantiate_builtin() {
        let mut runtime = Runtime::default();
        let id = runtime.instantiate(&StringName::new("Node")).unwrap();
        assert_eq!(runtime.object_class(id).unwrap(), "Node");
        assert!(runtime.object(id).unwrap().extension().is_none());
    }

    #[test]
    fn instantiate_unknown_class() {
        let mut runtime = Runtime::default();
        let err = runtime.instantiate(&StringName::new("Ghost")).unwrap_err();
        assert!(matches!(err, ExtensionError::Object(ObjectError::UnknownClass(_))));
        assert_eq!(runtime.diagnostics().error_count(), 1);
    }

    #[test]
    fn builtin_storage_properties() {
        let mut runtime = Runtime::default();
        let id = runtime.instantiate(&StringName::new("Resource")).unwrap();
        let name = StringName::new("resource_name");

        assert_eq!(runtime.object_get(id, &name), Some(Variant::from("")));
        assert!(runtime.object_set(id, &name, Variant::from("hero")));
        assert_eq!(runtime.object_get(id, &name), Some(Variant::from("hero")));

        let unknown = StringName::new("nope");
        assert!(!runtime.object_set(id, &unknown, Variant::Int(1)));
        assert_eq!(runtime.object_get(id, &unknown), None);
    }

    #[test]
    fn free_object_twice() {
        let mut runtime = Runtime::default();
        let id = runtime.instantiate(&StringName::new("Object")).unwrap();
        runtime.free_object(id).unwrap();
        assert!(!runtime.is_instance_valid(id));
        assert!(matches!(
            runtime.free_object(id).unwrap_err(),
            ExtensionError::Object(ObjectError::InvalidInstance(_))
        ));
    }

    #[test]
    fn builtin_defaults_use_declared_values() {
        let mut runtime = Runtime::default();
        let class = StringName::new("Resource");
        assert_eq!(
            runtime.class_default_property_value(&class, &StringName::new("resource_name")),
            Some(Variant::from(""))
        );
        assert!(runtime.class_db().cached_default_values(&class).is_some());
    }

    #[test]
    fn unknown_method() {
        let mut runtime = Runtime::default();
        let id = runtime.instantiate(&StringName::new("Object")).unwrap();
        let err = runtime
            .call_method(id, &StringName::new("missing"), &[])
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Object(ObjectError::UnknownMethod { .. })));
    }

    #[test]
    fn instance_bindings_are_tracked_per_library() {
        let mut runtime = Runtime::default();
        let token = runtime.create_extension("res://binding.dylib");
        let id = runtime.instantiate(&StringName::new("Object")).unwrap();
        runtime.set_instance_binding(token, id, Box::new(7u8)).unwrap();

        let stored = runtime.instance_binding(token, id).unwrap();
        assert_eq!(stored.downcast_ref::<u8>(), Some(&7));
        assert!(runtime.extension(token).unwrap().instance_bindings.contains(&id));

        assert!(runtime.free_instance_binding(token, id).is_some());
        assert!(runtime.instance_binding(token, id).is_none());
    }

    #[test]
    fn non_instantiable_class() {
        let mut runtime = Runtime::new(crate::RuntimeConfig::default().with_builtin_classes(false));
        let token = runtime.create_extension("res://abstract.dylib");
        runtime
            .class_db
            .register_builtin_class(
                ClassEntry::builtin("Object", None)
                    .with_property(PropertyInfo::new("name", VariantType::String), Variant::from("")),
            )
            .unwrap();
        runtime
            .class_db
            .register_extension_class(ClassEntry::extension("Shape", "Object", token))
            .unwrap();
        let err = runtime.instantiate(&StringName::new("Shape")).unwrap_err();
        assert!(matches!(err, ExtensionError::Object(ObjectError::NotInstantiable(_))));
    }
}
