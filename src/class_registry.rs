//! Class registry: registration and removal of extension classes and their
//! members.
//!
//! Every operation here is reached through the interface function table.
//! Failures are reported through the diagnostics channel and leave the
//! catalog untouched. While a library reloads, members registered again
//! for a class still awaiting re-registration are skipped.

use std::mem;
use std::sync::Arc;

use dynext_core::{
    ExtensionError, ExtensionToken, InitializationLevel, MethodBind, PropertyInfo,
    RegistrationError, StringName,
};
use dynext_registry::{ApiType, ClassEntry, ClassFlags, PropertyEntry, SignalInfo};
use tracing::{debug, trace};

use crate::abi::{
    ClassCreationInfo5, ClassMethodInfo, ClassesUsedFn, LegacyClassCallbacks, MainLoopCallbacks,
    VirtualMethodInfo,
};
use crate::extension::{ClassCallbacks, ClassLink, ExtensionClass};
use crate::runtime::Runtime;

impl Runtime {
    // ==========================================================================
    // Classes
    // ==========================================================================

    /// Register a class on behalf of a library.
    ///
    /// During a reload a class awaiting re-registration is updated in place
    /// when its parent and runtime flag are unchanged. Otherwise its old
    /// definition is retired and replaced; tracked instances carry over.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn register_extension_class(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        parent: &StringName,
        info: ClassCreationInfo5,
        legacy: LegacyClassCallbacks,
    ) -> Result<(), ExtensionError> {
        let result = self.register_class_internal(library, class, parent, info, legacy);
        self.report(Some(library), result)
    }

    fn register_class_internal(
        &mut self,
        library: ExtensionToken,
        class_name: &StringName,
        parent_name: &StringName,
        info: ClassCreationInfo5,
        legacy: LegacyClassCallbacks,
    ) -> Result<(), ExtensionError> {
        let tools = self.config.tools_enabled;
        let ext = self.extension_ref(library)?;

        if !class_name.is_valid_identifier() {
            return Err(RegistrationError::InvalidIdentifier(class_name.clone()).into());
        }
        let reload_in_place = tools
            && ext.reloading
            && ext.classes.get(class_name).is_some_and(|class| class.reloading);
        if self.class_db.class_exists(class_name) && !reload_in_place {
            return Err(RegistrationError::AlreadyExists(class_name.clone()).into());
        }
        if parent_name == class_name || !self.class_db.class_exists(parent_name) {
            return Err(RegistrationError::UnknownParent {
                class: class_name.clone(),
                parent: parent_name.clone(),
            }
            .into());
        }
        let parent_link = if ext.classes.contains_key(parent_name) {
            Some(ClassLink::new(library, parent_name.clone()))
        } else {
            self.class_owner(parent_name)
                .map(|owner| ClassLink::new(owner, parent_name.clone()))
        };

        let callbacks = ClassCallbacks::from_info(&info, legacy);
        let ext = self.extension_mut(library)?;
        let mut disabled_reload = false;
        if ext.reloadable && callbacks.recreate_instance.is_none() && callbacks.can_create() {
            ext.reloadable = false;
            disabled_reload = true;
        }
        let reloadable = ext.reloadable;
        let editor_class = ext.level_initialized == Some(InitializationLevel::Editor);

        let mut replaced_definition = false;
        let previous_parent = match ext.classes.get_mut(class_name) {
            Some(existing) if reload_in_place => {
                let previous_parent = existing.parent.take();
                if existing.parent_name == *parent_name && existing.is_runtime == info.is_runtime {
                    existing.configure(&info, callbacks, reloadable, editor_class);
                } else {
                    replaced_definition = true;
                    let mut replacement = ExtensionClass::new(class_name.clone(), parent_name.clone());
                    replacement.configure(&info, callbacks, reloadable, editor_class);
                    replacement.children = mem::take(&mut existing.children);
                    replacement.instances = mem::take(&mut existing.instances);
                    replacement.instance_state = mem::take(&mut existing.instance_state);
                    let retired = mem::replace(existing, replacement);
                    for method in retired.methods.into_values() {
                        method.invalidate();
                        ext.invalid_methods.push(method);
                    }
                }
                previous_parent
            }
            _ => {
                let mut class = ExtensionClass::new(class_name.clone(), parent_name.clone());
                class.configure(&info, callbacks, reloadable, editor_class);
                ext.classes.insert(class_name.clone(), class);
                None
            }
        };
        if info.icon_path.is_empty() {
            ext.class_icon_paths.remove(class_name);
        } else {
            ext.class_icon_paths
                .insert(class_name.clone(), info.icon_path.clone());
        }
        let can_create = ext
            .classes
            .get(class_name)
            .is_some_and(|class| class.callbacks.can_create());

        let link = ClassLink::new(library, class_name.clone());
        if let Some(previous) = previous_parent {
            self.detach_child(&previous, &link);
        }
        if let Some(parent) = parent_link {
            self.attach_child(&parent, link.clone());
            if let Some(class) = self.extension_class_mut(&link) {
                class.parent = Some(parent);
            }
        }

        let mut flags = ClassFlags::empty();
        flags.set(ClassFlags::VIRTUAL, info.is_virtual);
        flags.set(ClassFlags::ABSTRACT, info.is_abstract);
        flags.set(ClassFlags::EXPOSED, info.is_exposed);
        flags.set(ClassFlags::RUNTIME, info.is_runtime);
        flags.set(
            ClassFlags::INSTANTIABLE,
            can_create && !info.is_virtual && !info.is_abstract,
        );
        flags.set(ClassFlags::RELOADABLE, reloadable);
        let api = if editor_class {
            ApiType::EditorExtension
        } else {
            ApiType::Extension
        };
        let entry = ClassEntry::extension(class_name.clone(), parent_name.clone(), library)
            .with_api(api)
            .with_flags(flags);
        if reload_in_place && self.class_db.class_exists(class_name) {
            self.class_db.replace_extension_class(entry);
        } else {
            self.class_db.register_extension_class(entry)?;
        }

        if disabled_reload {
            self.report_error(
                Some(library),
                format!(
                    "extension marked as reloadable, but attempted to register class '{class_name}' \
                     which doesn't support reloading; perhaps your language binding doesn't support it? \
                     reloading disabled for this extension"
                ),
            );
        }
        if replaced_definition {
            self.report_warning(
                Some(library),
                format!(
                    "class '{class_name}' changed its parent or runtime flag while reloading; \
                     its previous definition was replaced"
                ),
            );
        }
        debug!(class = %class_name, parent = %parent_name, reload = reload_in_place, "registered extension class");
        Ok(())
    }

    /// Remove a class registered by a library.
    ///
    /// Outside a reload the class must have no children. During a reload the
    /// library's record of the class survives so re-registration can reuse it.
    pub fn unregister_extension_class(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
    ) -> Result<(), ExtensionError> {
        let result = self.unregister_class_internal(library, class);
        self.report(Some(library), result)
    }

    fn unregister_class_internal(
        &mut self,
        library: ExtensionToken,
        class_name: &StringName,
    ) -> Result<(), ExtensionError> {
        let ext = self.extension_ref(library)?;
        let class = ext
            .classes
            .get(class_name)
            .ok_or_else(|| RegistrationError::NotRegistered(class_name.clone()))?;
        let reloading = class.reloading;
        if !reloading && !class.children.is_empty() {
            return Err(RegistrationError::HasChildren(class_name.clone()).into());
        }

        let link = ClassLink::new(library, class_name.clone());
        if reloading {
            self.clear_extension_class(&link);
        } else if let Some(parent) = self
            .extension_class_mut(&link)
            .and_then(|class| class.parent.take())
        {
            self.detach_child(&parent, &link);
        }
        if self.class_owner(class_name) == Some(library) {
            self.class_db.unregister_class(class_name);
        }

        let ext = self.extension_mut(library)?;
        if !reloading {
            if let Some(removed) = ext.classes.remove(class_name) {
                for method in removed.methods.values() {
                    method.invalidate();
                }
            }
            ext.class_icon_paths.remove(class_name);
        }
        debug!(class = %class_name, reloading, "unregistered extension class");
        Ok(())
    }

    // ==========================================================================
    // Members
    // ==========================================================================

    /// Whether members for `class` should be registered now. `false` means the
    /// class is still awaiting re-registration during a reload.
    fn accepts_members(
        &self,
        library: ExtensionToken,
        class: &StringName,
        member: impl FnOnce() -> String,
    ) -> Result<bool, ExtensionError> {
        let ext = self.extension_ref(library)?;
        let class = ext
            .classes
            .get(class)
            .ok_or_else(|| RegistrationError::UnknownClass {
                class: class.clone(),
                member: member(),
            })?;
        Ok(!class.reloading)
    }

    /// Bind a method. During a reload an existing compatible bind is updated
    /// in place so callers holding it keep working; an incompatible one is
    /// retired and replaced.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn register_extension_class_method(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        info: ClassMethodInfo,
    ) -> Result<(), ExtensionError> {
        let result = self.register_method_internal(library, class, info);
        self.report(Some(library), result)
    }

    fn register_method_internal(
        &mut self,
        library: ExtensionToken,
        class_name: &StringName,
        info: ClassMethodInfo,
    ) -> Result<(), ExtensionError> {
        let method_name = info.name.clone();
        if !self.accepts_members(library, class_name, || format!("method '{method_name}'"))? {
            trace!(class = %class_name, method = %method_name, "class awaiting reload, method skipped");
            return Ok(());
        }

        let ext = self.extension_mut(library)?;
        let reloading = ext.reloading;
        let Some(class) = ext.classes.get_mut(class_name) else {
            return Ok(());
        };
        let mut retired = None;
        let bind = match class.methods.get(&method_name).cloned() {
            Some(existing) if reloading => {
                let outcome = if existing.is_reloading() {
                    existing.try_update(info)
                } else {
                    Err(info)
                };
                match outcome {
                    Ok(()) => {
                        existing.set_reloading(false);
                        existing
                    }
                    Err(info) => {
                        existing.invalidate();
                        retired = Some(existing);
                        Arc::new(MethodBind::new(info).with_instance_class(class_name.clone()))
                    }
                }
            }
            Some(_) => {
                return Err(RegistrationError::DuplicateMethod {
                    class: class_name.clone(),
                    method: method_name,
                }
                .into());
            }
            None => Arc::new(MethodBind::new(info).with_instance_class(class_name.clone())),
        };
        class.methods.insert(method_name.clone(), Arc::clone(&bind));
        if let Some(old) = retired {
            ext.invalid_methods.push(old);
        }
        self.class_db.bind_method(class_name, bind)?;
        trace!(class = %class_name, method = %method_name, "registered method");
        Ok(())
    }

    pub fn register_extension_class_virtual_method(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        info: VirtualMethodInfo,
    ) -> Result<(), ExtensionError> {
        let result = self
            .accepts_members(library, class, || format!("virtual method '{}'", info.name))
            .and_then(|accepted| {
                if accepted {
                    self.class_db.add_virtual_method(class, info)?;
                }
                Ok(())
            });
        self.report(Some(library), result)
    }

    /// Bind an integer constant. An empty `enum_name` means a loose constant.
    pub fn register_extension_class_integer_constant(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        enum_name: &StringName,
        constant: &StringName,
        value: i64,
        is_bitfield: bool,
    ) -> Result<(), ExtensionError> {
        let result = self
            .accepts_members(library, class, || format!("constant '{constant}'"))
            .and_then(|accepted| {
                if accepted {
                    let enum_name = (!enum_name.is_empty()).then(|| enum_name.clone());
                    self.class_db.bind_integer_constant(
                        class,
                        enum_name,
                        constant.clone(),
                        value,
                        is_bitfield,
                    )?;
                }
                Ok(())
            });
        self.report(Some(library), result)
    }

    /// Register a property backed by optional setter and getter binds.
    /// Empty names mean no accessor.
    pub fn register_extension_class_property(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        info: PropertyInfo,
        setter: &StringName,
        getter: &StringName,
    ) -> Result<(), ExtensionError> {
        let result = self.register_property_internal(library, class, info, setter, getter, None);
        self.report(Some(library), result)
    }

    /// Register a property whose accessors take `index` as first argument.
    pub fn register_extension_class_property_indexed(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        info: PropertyInfo,
        setter: &StringName,
        getter: &StringName,
        index: i64,
    ) -> Result<(), ExtensionError> {
        let result =
            self.register_property_internal(library, class, info, setter, getter, Some(index));
        self.report(Some(library), result)
    }

    fn register_property_internal(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        info: PropertyInfo,
        setter: &StringName,
        getter: &StringName,
        index: Option<i64>,
    ) -> Result<(), ExtensionError> {
        if !self.accepts_members(library, class, || format!("property '{}'", info.name))? {
            return Ok(());
        }
        for accessor in [setter, getter] {
            if !accessor.is_empty() && self.class_db.get_method(class, accessor).is_none() {
                self.report_warning(
                    Some(library),
                    format!(
                        "property '{}' of class '{class}' uses accessor '{accessor}', which is not bound",
                        info.name
                    ),
                );
            }
        }
        let entry = PropertyEntry::new(info)
            .with_accessors(setter.clone(), getter.clone())
            .with_index(index);
        self.class_db.add_property(class, entry)?;
        Ok(())
    }

    pub fn register_extension_class_property_group(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        group: &str,
        prefix: &str,
    ) -> Result<(), ExtensionError> {
        let result = self
            .accepts_members(library, class, || format!("property group '{group}'"))
            .and_then(|accepted| {
                if accepted {
                    self.class_db.add_property_group(class, group, prefix)?;
                }
                Ok(())
            });
        self.report(Some(library), result)
    }

    pub fn register_extension_class_property_subgroup(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        subgroup: &str,
        prefix: &str,
    ) -> Result<(), ExtensionError> {
        let result = self
            .accepts_members(library, class, || format!("property subgroup '{subgroup}'"))
            .and_then(|accepted| {
                if accepted {
                    self.class_db.add_property_subgroup(class, subgroup, prefix)?;
                }
                Ok(())
            });
        self.report(Some(library), result)
    }

    pub fn register_extension_class_signal(
        &mut self,
        library: ExtensionToken,
        class: &StringName,
        signal: &StringName,
        arguments: Vec<PropertyInfo>,
    ) -> Result<(), ExtensionError> {
        let result = self
            .accepts_members(library, class, || format!("signal '{signal}'"))
            .and_then(|accepted| {
                if accepted {
                    self.class_db.add_signal(
                        class,
                        SignalInfo {
                            name: signal.clone(),
                            arguments,
                        },
                    )?;
                }
                Ok(())
            });
        self.report(Some(library), result)
    }

    // ==========================================================================
    // Library Callbacks
    // ==========================================================================

    pub fn register_classes_used_callback(
        &mut self,
        library: ExtensionToken,
        callback: ClassesUsedFn,
    ) -> Result<(), ExtensionError> {
        let result = self
            .extension_mut(library)
            .map(|ext| ext.classes_used_callback = Some(callback))
            .map_err(ExtensionError::from);
        self.report(Some(library), result)
    }

    pub fn register_main_loop_callbacks(
        &mut self,
        library: ExtensionToken,
        callbacks: MainLoopCallbacks,
    ) -> Result<(), ExtensionError> {
        let result = self
            .extension_mut(library)
            .map(|ext| ext.main_loop = callbacks)
            .map_err(ExtensionError::from);
        self.report(Some(library), result)
    }

    // ==========================================================================
    // Parent Links
    // ==========================================================================

    pub(crate) fn attach_child(&mut self, parent: &ClassLink, child: ClassLink) {
        if let Some(parent) = self.extension_class_mut(parent)
            && !parent.children.contains(&child)
        {
            parent.children.push(child);
        }
    }

    pub(crate) fn detach_child(&mut self, parent: &ClassLink, child: &ClassLink) {
        if let Some(parent) = self.extension_class_mut(parent) {
            parent.children.retain(|link| link != child);
        }
    }
}
