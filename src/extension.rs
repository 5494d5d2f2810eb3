//! Per-library bookkeeping.

use std::fmt;
use std::sync::Arc;

use dynext_core::{
    ExtensionToken, InitializationLevel, InstanceId, MethodBind, StringName, Variant,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::abi::{
    ClassCreationInfo5, ClassUserdata, ClassesUsedFn, CreateInstanceFn, FreeInstanceFn, GetFn,
    Initialization, LegacyClassCallbacks, LegacyCreateInstanceFn, LegacyNotificationFn,
    MainLoopCallbacks, NotificationFn, RecreateInstanceFn, SetFn, ToStringFn,
};
use crate::library::LibraryLoader;

/// Address of an extension class: owning library and class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassLink {
    pub library: ExtensionToken,
    pub class: StringName,
}

impl ClassLink {
    pub fn new(library: ExtensionToken, class: impl Into<StringName>) -> Self {
        Self {
            library,
            class: class.into(),
        }
    }
}

/// Property values captured from one instance before a reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceState {
    pub properties: Vec<(StringName, Variant)>,
    pub is_placeholder: bool,
}

/// Lifecycle callbacks of a class, after version widening.
#[derive(Clone, Default)]
pub struct ClassCallbacks {
    pub set: Option<SetFn>,
    pub get: Option<GetFn>,
    pub to_string: Option<ToStringFn>,
    pub notification: Option<NotificationFn>,
    pub create_instance: Option<CreateInstanceFn>,
    pub free_instance: Option<FreeInstanceFn>,
    pub recreate_instance: Option<RecreateInstanceFn>,
    pub legacy: LegacyClassCallbacks,
    pub userdata: Option<ClassUserdata>,
}

impl ClassCallbacks {
    pub(crate) fn from_info(info: &ClassCreationInfo5, legacy: LegacyClassCallbacks) -> Self {
        Self {
            set: info.set_func,
            get: info.get_func,
            to_string: info.to_string_func,
            notification: info.notification_func,
            create_instance: info.create_instance_func,
            free_instance: info.free_instance_func,
            recreate_instance: info.recreate_instance_func,
            legacy,
            userdata: info.class_userdata.clone(),
        }
    }

    /// Whether the class supplies any create callback.
    pub fn can_create(&self) -> bool {
        self.create_instance.is_some() || self.legacy.create_instance.is_some()
    }

    pub fn legacy_create_instance(&self) -> Option<LegacyCreateInstanceFn> {
        self.legacy.create_instance
    }

    pub fn legacy_notification(&self) -> Option<LegacyNotificationFn> {
        self.legacy.notification
    }
}

impl fmt::Debug for ClassCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassCallbacks")
            .field("create", &self.can_create())
            .field("recreate", &self.recreate_instance.is_some())
            .field("free", &self.free_instance.is_some())
            .field("notification", &self.notification.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Extension Class
// ============================================================================

/// A class as the owning library registered it.
#[derive(Debug)]
pub struct ExtensionClass {
    pub(crate) name: StringName,
    pub(crate) parent_name: StringName,
    /// Set when the parent is itself an extension class.
    pub(crate) parent: Option<ClassLink>,
    pub(crate) children: Vec<ClassLink>,
    pub(crate) is_virtual: bool,
    pub(crate) is_abstract: bool,
    pub(crate) is_exposed: bool,
    pub(crate) is_runtime: bool,
    pub(crate) editor_class: bool,
    pub(crate) reloadable: bool,
    pub(crate) callbacks: ClassCallbacks,
    pub(crate) methods: FxHashMap<StringName, Arc<MethodBind>>,
    pub(crate) instances: FxHashSet<InstanceId>,
    pub(crate) instance_state: FxHashMap<InstanceId, InstanceState>,
    /// Awaiting re-registration during a reload.
    pub(crate) reloading: bool,
}

impl ExtensionClass {
    pub(crate) fn new(name: StringName, parent_name: StringName) -> Self {
        Self {
            name,
            parent_name,
            parent: None,
            children: Vec::new(),
            is_virtual: false,
            is_abstract: false,
            is_exposed: true,
            is_runtime: false,
            editor_class: false,
            reloadable: false,
            callbacks: ClassCallbacks::default(),
            methods: FxHashMap::default(),
            instances: FxHashSet::default(),
            instance_state: FxHashMap::default(),
            reloading: false,
        }
    }

    pub(crate) fn configure(
        &mut self,
        info: &ClassCreationInfo5,
        callbacks: ClassCallbacks,
        reloadable: bool,
        editor_class: bool,
    ) {
        self.is_virtual = info.is_virtual;
        self.is_abstract = info.is_abstract;
        self.is_exposed = info.is_exposed;
        self.is_runtime = info.is_runtime;
        self.callbacks = callbacks;
        self.reloadable = reloadable;
        self.editor_class = editor_class;
        self.reloading = false;
    }

    pub fn name(&self) -> &StringName {
        &self.name
    }

    pub fn parent_name(&self) -> &StringName {
        &self.parent_name
    }

    pub fn parent(&self) -> Option<&ClassLink> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[ClassLink] {
        &self.children
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_exposed(&self) -> bool {
        self.is_exposed
    }

    pub fn is_runtime(&self) -> bool {
        self.is_runtime
    }

    pub fn is_editor_class(&self) -> bool {
        self.editor_class
    }

    pub fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    pub fn callbacks(&self) -> &ClassCallbacks {
        &self.callbacks
    }

    pub fn method(&self, name: &StringName) -> Option<&Arc<MethodBind>> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> Vec<StringName> {
        let mut names: Vec<StringName> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn instance_state(&self, id: InstanceId) -> Option<&InstanceState> {
        self.instance_state.get(&id)
    }
}

// ============================================================================
// Extension
// ============================================================================

/// A loaded library and everything it registered.
///
/// Fields drop in declaration order; the loader comes last so method binds
/// and callbacks above it never outlive the code they point into.
pub struct Extension {
    pub(crate) token: ExtensionToken,
    pub(crate) path: String,
    pub(crate) initialization: Initialization,
    pub(crate) level_initialized: Option<InitializationLevel>,
    pub(crate) reloadable: bool,
    pub(crate) reloading: bool,
    pub(crate) classes: FxHashMap<StringName, ExtensionClass>,
    /// Binds retired by reloads, kept until teardown for stale references.
    pub(crate) invalid_methods: Vec<Arc<MethodBind>>,
    pub(crate) class_icon_paths: FxHashMap<StringName, String>,
    /// Objects carrying an instance binding of this library.
    pub(crate) instance_bindings: FxHashSet<InstanceId>,
    pub(crate) classes_used_callback: Option<ClassesUsedFn>,
    pub(crate) main_loop: MainLoopCallbacks,
    pub(crate) loader: Option<Box<dyn LibraryLoader>>,
}

impl Extension {
    pub(crate) fn new(token: ExtensionToken, path: impl Into<String>) -> Self {
        Self {
            token,
            path: path.into(),
            initialization: Initialization::default(),
            level_initialized: None,
            reloadable: false,
            reloading: false,
            classes: FxHashMap::default(),
            invalid_methods: Vec::new(),
            class_icon_paths: FxHashMap::default(),
            instance_bindings: FxHashSet::default(),
            classes_used_callback: None,
            main_loop: MainLoopCallbacks::default(),
            loader: None,
        }
    }

    pub fn token(&self) -> ExtensionToken {
        self.token
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_library_open(&self) -> bool {
        self.loader.as_ref().is_some_and(|loader| loader.is_library_open())
    }

    pub fn has_library_changed(&self) -> bool {
        self.loader.as_ref().is_some_and(|loader| loader.has_library_changed())
    }

    pub fn minimum_level(&self) -> InitializationLevel {
        self.initialization.minimum_level
    }

    pub fn level_initialized(&self) -> Option<InitializationLevel> {
        self.level_initialized
    }

    pub fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    pub fn class(&self, name: &StringName) -> Option<&ExtensionClass> {
        self.classes.get(name)
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<StringName> {
        let mut names: Vec<StringName> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn class_icon_path(&self, class: &StringName) -> Option<&str> {
        self.class_icon_paths.get(class).map(String::as_str)
    }

    pub fn invalid_method_count(&self) -> usize {
        self.invalid_methods.len()
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("token", &self.token)
            .field("path", &self.path)
            .field("level_initialized", &self.level_initialized)
            .field("reloadable", &self.reloadable)
            .field("reloading", &self.reloading)
            .field("classes", &self.class_names())
            .field("invalid_methods", &self.invalid_methods.len())
            .finish_non_exhaustive()
    }
}
