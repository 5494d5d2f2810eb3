//! Structures and callback types a library hands to the host.
//!
//! Class creation info exists in five versions. Older versions are widened
//! into [`ClassCreationInfo5`] before they reach the class registry; the
//! callbacks that changed shape over time survive as [`LegacyClassCallbacks`].

use std::any::Any;
use std::sync::Arc;

use dynext_core::{
    ExtensionToken, InitializationLevel, InstanceData, InstanceId, MethodDefinition, StringName,
    Variant,
};

use crate::interface::InterfaceRegistry;
use crate::runtime::Runtime;

pub use dynext_registry::VirtualMethodInfo;

/// Opaque data a library attaches to a class.
pub type ClassUserdata = Arc<dyn Any + Send + Sync>;
/// Opaque data a library attaches to itself during the entry handshake.
pub type ExtensionUserdata = Arc<dyn Any + Send + Sync>;

/// Method registration payload.
pub type ClassMethodInfo = MethodDefinition;

// ============================================================================
// Class Callbacks
// ============================================================================

/// Create the instance for a new object. The flag asks the host to deliver
/// the post-initialize notification once the object is bound.
pub type CreateInstanceFn = fn(Option<&ClassUserdata>, InstanceId, bool) -> InstanceData;
/// Create callback without post-initialize control; always notified.
pub type LegacyCreateInstanceFn = fn(Option<&ClassUserdata>, InstanceId) -> InstanceData;
/// Rebuild the instance of an existing object after its library reloaded.
pub type RecreateInstanceFn = fn(Option<&ClassUserdata>, InstanceId) -> InstanceData;
pub type FreeInstanceFn = fn(Option<&ClassUserdata>, InstanceData);
/// Notification with the `reversed` flag.
pub type NotificationFn = fn(&mut InstanceData, i32, bool);
pub type LegacyNotificationFn = fn(&mut InstanceData, i32);
/// Property write fallback; returns whether the instance handled it.
pub type SetFn = fn(&mut InstanceData, &StringName, &Variant) -> bool;
/// Property read fallback.
pub type GetFn = fn(&InstanceData, &StringName) -> Option<Variant>;
pub type ToStringFn = fn(&InstanceData) -> Option<String>;

/// Callbacks only older creation-info versions can supply.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyClassCallbacks {
    pub notification: Option<LegacyNotificationFn>,
    pub create_instance: Option<LegacyCreateInstanceFn>,
}

impl LegacyClassCallbacks {
    pub fn is_empty(&self) -> bool {
        self.notification.is_none() && self.create_instance.is_none()
    }
}

// ============================================================================
// Class Creation Info
// ============================================================================

/// Version 1: no reload support, no runtime classes.
#[derive(Clone, Default)]
pub struct ClassCreationInfo {
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub set_func: Option<SetFn>,
    pub get_func: Option<GetFn>,
    pub notification_func: Option<LegacyNotificationFn>,
    pub to_string_func: Option<ToStringFn>,
    pub create_instance_func: Option<LegacyCreateInstanceFn>,
    pub free_instance_func: Option<FreeInstanceFn>,
    pub class_userdata: Option<ClassUserdata>,
}

/// Version 2 adds instance recreation and the reversible notification.
#[derive(Clone, Default)]
pub struct ClassCreationInfo2 {
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub set_func: Option<SetFn>,
    pub get_func: Option<GetFn>,
    pub notification_func: Option<NotificationFn>,
    pub to_string_func: Option<ToStringFn>,
    pub create_instance_func: Option<LegacyCreateInstanceFn>,
    pub free_instance_func: Option<FreeInstanceFn>,
    pub recreate_instance_func: Option<RecreateInstanceFn>,
    pub class_userdata: Option<ClassUserdata>,
}

/// Version 3 adds runtime-only classes.
#[derive(Clone, Default)]
pub struct ClassCreationInfo3 {
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub is_runtime: bool,
    pub set_func: Option<SetFn>,
    pub get_func: Option<GetFn>,
    pub notification_func: Option<NotificationFn>,
    pub to_string_func: Option<ToStringFn>,
    pub create_instance_func: Option<LegacyCreateInstanceFn>,
    pub free_instance_func: Option<FreeInstanceFn>,
    pub recreate_instance_func: Option<RecreateInstanceFn>,
    pub class_userdata: Option<ClassUserdata>,
}

/// Current version.
#[derive(Clone)]
pub struct ClassCreationInfo5 {
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub is_exposed: bool,
    pub is_runtime: bool,
    pub icon_path: String,
    pub set_func: Option<SetFn>,
    pub get_func: Option<GetFn>,
    pub notification_func: Option<NotificationFn>,
    pub to_string_func: Option<ToStringFn>,
    pub create_instance_func: Option<CreateInstanceFn>,
    pub free_instance_func: Option<FreeInstanceFn>,
    pub recreate_instance_func: Option<RecreateInstanceFn>,
    pub class_userdata: Option<ClassUserdata>,
}

/// Version 4 shares the layout of version 5 but cannot hide classes.
pub type ClassCreationInfo4 = ClassCreationInfo5;

impl Default for ClassCreationInfo5 {
    fn default() -> Self {
        Self {
            is_virtual: false,
            is_abstract: false,
            is_exposed: true,
            is_runtime: false,
            icon_path: String::new(),
            set_func: None,
            get_func: None,
            notification_func: None,
            to_string_func: None,
            create_instance_func: None,
            free_instance_func: None,
            recreate_instance_func: None,
            class_userdata: None,
        }
    }
}

/// Conversion of any creation-info version into the current one.
pub trait IntoLatestCreationInfo {
    fn into_latest(self) -> (ClassCreationInfo5, LegacyClassCallbacks);
}

impl IntoLatestCreationInfo for ClassCreationInfo {
    fn into_latest(self) -> (ClassCreationInfo5, LegacyClassCallbacks) {
        let info = ClassCreationInfo5 {
            is_virtual: self.is_virtual,
            is_abstract: self.is_abstract,
            set_func: self.set_func,
            get_func: self.get_func,
            to_string_func: self.to_string_func,
            free_instance_func: self.free_instance_func,
            class_userdata: self.class_userdata,
            ..ClassCreationInfo5::default()
        };
        let legacy = LegacyClassCallbacks {
            notification: self.notification_func,
            create_instance: self.create_instance_func,
        };
        (info, legacy)
    }
}

impl IntoLatestCreationInfo for ClassCreationInfo2 {
    fn into_latest(self) -> (ClassCreationInfo5, LegacyClassCallbacks) {
        let info = ClassCreationInfo5 {
            is_virtual: self.is_virtual,
            is_abstract: self.is_abstract,
            set_func: self.set_func,
            get_func: self.get_func,
            notification_func: self.notification_func,
            to_string_func: self.to_string_func,
            free_instance_func: self.free_instance_func,
            recreate_instance_func: self.recreate_instance_func,
            class_userdata: self.class_userdata,
            ..ClassCreationInfo5::default()
        };
        let legacy = LegacyClassCallbacks {
            notification: None,
            create_instance: self.create_instance_func,
        };
        (info, legacy)
    }
}

impl IntoLatestCreationInfo for ClassCreationInfo3 {
    fn into_latest(self) -> (ClassCreationInfo5, LegacyClassCallbacks) {
        let info = ClassCreationInfo5 {
            is_virtual: self.is_virtual,
            is_abstract: self.is_abstract,
            is_runtime: self.is_runtime,
            set_func: self.set_func,
            get_func: self.get_func,
            notification_func: self.notification_func,
            to_string_func: self.to_string_func,
            free_instance_func: self.free_instance_func,
            recreate_instance_func: self.recreate_instance_func,
            class_userdata: self.class_userdata,
            ..ClassCreationInfo5::default()
        };
        let legacy = LegacyClassCallbacks {
            notification: None,
            create_instance: self.create_instance_func,
        };
        (info, legacy)
    }
}

impl IntoLatestCreationInfo for ClassCreationInfo5 {
    fn into_latest(self) -> (ClassCreationInfo5, LegacyClassCallbacks) {
        (self, LegacyClassCallbacks::default())
    }
}

/// Version 4 registration: identical to version 5 with exposure forced on.
pub fn widen_v4(info: ClassCreationInfo4) -> (ClassCreationInfo5, LegacyClassCallbacks) {
    let (mut info, legacy) = info.into_latest();
    info.is_exposed = true;
    (info, legacy)
}

// ============================================================================
// Library Entry
// ============================================================================

/// Per-level initialization callback of a library.
pub type InitializeFn =
    fn(&mut Runtime, ExtensionToken, Option<&ExtensionUserdata>, InitializationLevel);

/// What a library reports from its entry function.
#[derive(Clone)]
pub struct Initialization {
    pub minimum_level: InitializationLevel,
    pub reloadable: bool,
    pub userdata: Option<ExtensionUserdata>,
    pub initialize: Option<InitializeFn>,
    pub deinitialize: Option<InitializeFn>,
}

impl Default for Initialization {
    fn default() -> Self {
        Self {
            minimum_level: InitializationLevel::Core,
            reloadable: false,
            userdata: None,
            initialize: None,
            deinitialize: None,
        }
    }
}

/// Entry function of a library: fills `Initialization`, returns success.
pub type EntryFn = fn(&InterfaceRegistry, ExtensionToken, &mut Initialization) -> bool;

// ============================================================================
// Host Callbacks
// ============================================================================

/// Frame-loop hooks a library may install.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainLoopCallbacks {
    pub startup: Option<fn()>,
    pub shutdown: Option<fn()>,
    pub frame: Option<fn()>,
}

/// Reports the class names a library's exported build still needs.
pub type ClassesUsedFn = fn(&mut Vec<StringName>);
