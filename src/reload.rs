//! Hot-reload coordinator.
//!
//! A reload is a two-phase transaction around closing and reopening a
//! library:
//!
//! 1. [`Runtime::prepare_reload`] marks every class and method bind of the
//!    library as awaiting re-registration and snapshots the stored property
//!    values of every tracked instance.
//! 2. The library is closed, reopened and initialized again. Classes and
//!    methods it registers again are updated in place.
//! 3. [`Runtime::finish_reload`] retires whatever did not come back, then
//!    rebinds every snapshotted instance, restores its properties and notifies
//!    it.
//!    Each of the three passes completes for all instances before the next
//!    one starts.

use std::mem;
use std::sync::Arc;

use dynext_core::{
    ExtensionBinding, ExtensionError, ExtensionToken, InstanceId, MethodBind,
    NOTIFICATION_EXTENSION_RELOADED, PropertyUsage, ReloadError, StringName, Variant, VariantType,
};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::extension::{ClassLink, ExtensionClass, InstanceState};
use crate::runtime::Runtime;

/// Where an instance of a removed class ends up.
enum Fallback {
    Extension(ClassLink),
    Native(StringName),
    Placeholder,
}

impl Runtime {
    // ==========================================================================
    // Prepare
    // ==========================================================================

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn prepare_reload(&mut self, library: ExtensionToken) -> Result<(), ExtensionError> {
        let result = self.prepare_reload_internal(library);
        self.report(Some(library), result)
    }

    fn prepare_reload_internal(&mut self, library: ExtensionToken) -> Result<(), ExtensionError> {
        if !self.config.tools_enabled {
            return Err(ReloadError::ToolsDisabled.into());
        }
        let ext = self.extension_mut(library)?;
        if !ext.reloadable {
            return Err(ReloadError::NotReloadable(ext.path.clone()).into());
        }
        if ext.reloading {
            return Err(ReloadError::InProgress(ext.path.clone()).into());
        }
        ext.reloading = true;

        let mut tracked = Vec::new();
        for (name, class) in &mut ext.classes {
            class.reloading = true;
            for method in class.methods.values() {
                method.set_reloading(true);
            }
            tracked.push((name.clone(), class.tracked_instances()));
        }

        let mut captured = 0;
        for (class_name, ids) in tracked {
            for id in ids {
                let Some(state) = self.capture_instance_state(id) else {
                    continue;
                };
                if let Some(class) = self.extension_class_mut(&ClassLink::new(library, class_name.clone())) {
                    class.instance_state.insert(id, state);
                    captured += 1;
                }
            }
        }
        debug!(library = %self.library_label(library), instances = captured, "reload prepared");
        Ok(())
    }

    /// Release a class that is being unregistered mid-reload: hierarchy links
    /// are dropped because they may change, and every instance gives its data
    /// back to the library generation that created it. The tracked set and
    /// snapshots stay so the instances can be rebound afterwards.
    pub(crate) fn clear_extension_class(&mut self, link: &ClassLink) {
        let Some(class) = self.extension_class_mut(link) else {
            return;
        };
        let parent = class.parent.take();
        let children = mem::take(&mut class.children);
        let ids = class.tracked_instances();

        if let Some(parent) = parent {
            self.detach_child(&parent, link);
        }
        for child in children {
            if let Some(child) = self.extension_class_mut(&child) {
                child.parent = None;
            }
        }

        let mut cleared = 0;
        for id in ids {
            let Some(object) = self.objects.get_mut(id) else {
                continue;
            };
            let bound_here = object
                .extension()
                .is_some_and(|binding| binding.library == link.library && binding.class == link.class);
            if !bound_here {
                continue;
            }
            if let Some(instance) = object.clear_internal_extension() {
                self.free_instance_data(link, instance);
                cleared += 1;
            }
        }
        debug!(class = %link.class, instances = cleared, "cleared class for reload");
    }

    /// Stored properties of an object that differ from the class defaults.
    fn capture_instance_state(&mut self, id: InstanceId) -> Option<InstanceState> {
        let object = self.objects.get(id)?;
        let class = object.class_name().clone();
        let is_placeholder = object.is_extension_placeholder();

        let mut properties = Vec::new();
        for info in self.class_db.get_property_list(&class, false) {
            if !info.is_stored() {
                continue;
            }
            let Some(value) = self.object_get(id, &info.name) else {
                continue;
            };
            let default = self.class_default_property_value(&class, &info.name);
            if default.as_ref().is_some_and(|default| {
                !is_unset(default) && default.equals(&value)
            }) {
                continue;
            }
            if info.variant_type == VariantType::Object
                && value.is_zero()
                && !info.usage.contains(PropertyUsage::STORE_IF_NULL)
            {
                continue;
            }
            properties.push((info.name, value));
        }
        Some(InstanceState {
            properties,
            is_placeholder,
        })
    }

    // ==========================================================================
    // Finish
    // ==========================================================================

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn finish_reload(&mut self, library: ExtensionToken) -> Result<(), ExtensionError> {
        let result = self.finish_reload_internal(library);
        self.report(Some(library), result)
    }

    fn finish_reload_internal(&mut self, library: ExtensionToken) -> Result<(), ExtensionError> {
        let ext = self.extension_mut(library)?;
        if !ext.reloading {
            return Err(ReloadError::NotInProgress(ext.path.clone()).into());
        }
        ext.reloading = false;

        let mut retired: Vec<Arc<MethodBind>> = Vec::new();
        for class in ext.classes.values_mut() {
            class.methods.retain(|_, method| {
                if !method.is_reloading() {
                    return true;
                }
                method.set_reloading(false);
                method.invalidate();
                retired.push(Arc::clone(method));
                false
            });
        }
        ext.invalid_methods.extend(retired.iter().cloned());

        let stale: Vec<StringName> = ext
            .classes
            .iter()
            .filter(|(_, class)| class.reloading)
            .map(|(name, _)| name.clone())
            .collect();
        let removed: Vec<ExtensionClass> = stale
            .iter()
            .filter_map(|name| ext.classes.remove(name))
            .collect();
        for name in &stale {
            ext.class_icon_paths.remove(name);
        }

        // Only snapshotted instances are rebound; anything the new generation
        // created while initializing is already bound to it.
        let mut pending: Vec<(ClassLink, InstanceId, InstanceState)> = Vec::new();
        for (name, class) in &mut ext.classes {
            for (id, state) in take_snapshots(class) {
                pending.push((ClassLink::new(library, name.clone()), id, state));
            }
        }
        pending.retain(|(_, id, _)| self.objects.contains(*id));

        for method in &retired {
            let current = self.class_db.get(method.instance_class()).and_then(|entry| entry.find_method(method.name()));
            if current.is_some_and(|current| Arc::ptr_eq(current, method)) {
                self.class_db.unbind_method(method.instance_class(), method.name());
            }
        }

        let removed_count = removed.len();
        let orphans = self.retire_removed_classes(library, removed);

        // Pass 1: rebind instances to the current class definitions.
        for (link, id, state) in &pending {
            self.rebind_instance(link, *id, state.is_placeholder);
        }

        // Pass 2: restore property values.
        for (_, id, state) in pending.iter().chain(orphans.iter()) {
            for (name, value) in &state.properties {
                self.object_set(*id, name, value.clone());
            }
        }

        // Pass 3: tell every rebound instance the reload happened.
        for (_, id, _) in pending.iter().chain(orphans.iter()) {
            self.notify(*id, NOTIFICATION_EXTENSION_RELOADED);
        }

        info!(
            library = %self.library_label(library),
            instances = pending.len() + orphans.len(),
            removed_classes = removed_count,
            retired_methods = retired.len(),
            "reload finished"
        );
        Ok(())
    }

    /// Drop catalog rows of classes that did not come back and move their
    /// instances onto the nearest surviving ancestor. Instances rebound to an
    /// extension class are returned for the restore pass.
    fn retire_removed_classes(
        &mut self,
        library: ExtensionToken,
        removed: Vec<ExtensionClass>,
    ) -> Vec<(ClassLink, InstanceId, InstanceState)> {
        let removed_parents: FxHashMap<StringName, StringName> = removed
            .iter()
            .map(|class| (class.name.clone(), class.parent_name.clone()))
            .collect();

        let mut orphans = Vec::new();
        for mut class in removed {
            let link = ClassLink::new(library, class.name.clone());
            if self.class_owner(&class.name) == Some(library) {
                self.class_db.unregister_class(&class.name);
            }
            if let Some(parent) = class.parent.take() {
                self.detach_child(&parent, &link);
            }
            for child in mem::take(&mut class.children) {
                if let Some(child) = self.extension_class_mut(&child) {
                    child.parent = None;
                }
            }
            for method in class.methods.values() {
                method.invalidate();
            }

            let fallback = self.fallback_for(&class.parent_name, &removed_parents);
            for (id, state) in take_snapshots(&mut class) {
                if let Some(state) = self.rebind_orphan(library, &class.name, &fallback, id, state) {
                    orphans.push((link.clone(), id, state));
                }
            }
            self.report_warning(
                Some(library),
                format!("class '{}' was not registered again after reload", class.name),
            );
        }
        orphans
    }

    fn fallback_for(
        &self,
        parent: &StringName,
        removed_parents: &FxHashMap<StringName, StringName>,
    ) -> Fallback {
        let mut current = Some(parent.clone());
        while let Some(name) = current {
            if let Some(entry) = self.class_db.get(&name) {
                if entry.api.is_native() {
                    return Fallback::Native(name);
                }
                if let Some(owner) = entry.library {
                    let link = ClassLink::new(owner, name.clone());
                    if self.extension_class(&link).is_some() {
                        return Fallback::Extension(link);
                    }
                }
                current = entry.parent.clone();
            } else {
                current = removed_parents.get(&name).cloned();
            }
        }
        Fallback::Placeholder
    }

    /// Move one instance of a removed class to its fallback. Returns the
    /// snapshot still to restore, if any.
    fn rebind_orphan(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        fallback: &Fallback,
        id: InstanceId,
        state: InstanceState,
    ) -> Option<InstanceState> {
        if !self.objects.contains(id) {
            return None;
        }
        match fallback {
            Fallback::Extension(link) => {
                self.rebind_instance(link, id, state.is_placeholder);
                Some(state)
            }
            Fallback::Native(native) => {
                let object = self.objects.get_mut(id)?;
                drop(object.clear_internal_extension());
                object.set_native_class(native.clone());
                Some(state)
            }
            Fallback::Placeholder => {
                let object = self.objects.get_mut(id)?;
                object.reset_internal_extension(ExtensionBinding::placeholder(library, class.clone()), None);
                for (name, value) in state.properties {
                    object.store(name, value);
                }
                None
            }
        }
    }

    /// Point an object at the current definition of `link`, recreating its
    /// instance through the library unless it is a placeholder.
    fn rebind_instance(&mut self, link: &ClassLink, id: InstanceId, placeholder: bool) {
        if !self.objects.contains(id) {
            return;
        }
        let native = self.native_class_of(&link.class);
        let callbacks = self.extension_class(link).map(|class| class.callbacks.clone());
        let instance = callbacks.filter(|_| !placeholder).and_then(|callbacks| {
            let userdata = callbacks.userdata.as_ref();
            if let Some(recreate) = callbacks.recreate_instance {
                Some(recreate(userdata, id))
            } else if let Some(create) = callbacks.create_instance {
                Some(create(userdata, id, false))
            } else {
                callbacks.legacy_create_instance().map(|create| create(userdata, id))
            }
        });
        let binding = if instance.is_some() {
            ExtensionBinding::new(link.library, link.class.clone())
        } else {
            ExtensionBinding::placeholder(link.library, link.class.clone())
        };

        let Some(object) = self.objects.get_mut(id) else {
            return;
        };
        object.set_native_class(native);
        // Previous instance comes from the closed library generation, whose
        // handle stays mapped until the loader is dropped.
        drop(object.reset_internal_extension(binding, instance));
        self.track_instance(link, id);
    }
}

/// Drain a class's snapshots in instance order.
fn take_snapshots(class: &mut ExtensionClass) -> Vec<(InstanceId, InstanceState)> {
    let mut states: Vec<(InstanceId, InstanceState)> = class.instance_state.drain().collect();
    states.sort_by_key(|(id, _)| *id);
    states
}

/// A default that does not count as a value of its own: nil or a null object.
fn is_unset(value: &Variant) -> bool {
    value.is_nil() || (value.get_type() == VariantType::Object && value.is_zero())
}
