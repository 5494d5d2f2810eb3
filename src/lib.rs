//! Dynamic extension runtime.
//!
//! Native libraries are loaded at runtime and register classes, methods,
//! properties and signals into the host's reflection catalog through a table
//! of named interface functions. In tools builds a library can be reloaded
//! in place: live objects keep their identity while their instance data and
//! method binds are swapped to the new code.
//!
//! # Layout
//!
//! - [`interface`]: the named function table handed to libraries
//! - [`class_registry`]: class and member registration
//! - [`tracker`] and [`reload`]: instance tracking and the reload transaction
//! - [`library`] and [`loader`]: opening libraries and staged initialization
//! - [`manager`]: loading by path, host levels and the extension list
//!
//! # Example
//!
//! ```no_run
//! use dynext::prelude::*;
//!
//! let mut runtime = Runtime::new(RuntimeConfig::default());
//! runtime.initialize_extensions(InitializationLevel::Core).unwrap();
//! let status = runtime
//!     .load_extension("res://bin/libdemo.so", Box::new(DylibLoader::new()))
//!     .unwrap();
//! assert_eq!(status, LoadStatus::Ok);
//! ```

pub mod abi;
pub mod class_registry;
pub mod config;
pub mod extension;
pub mod interface;
pub mod library;
pub mod loader;
pub mod manager;
pub mod objects;
pub mod reload;
pub mod runtime;
pub mod tracker;

pub use abi::{
    ClassCreationInfo, ClassCreationInfo2, ClassCreationInfo3, ClassCreationInfo4,
    ClassCreationInfo5, ClassMethodInfo, ClassUserdata, ClassesUsedFn, CreateInstanceFn, EntryFn,
    ExtensionUserdata, FreeInstanceFn, GetFn, InitializeFn, Initialization,
    IntoLatestCreationInfo, LegacyClassCallbacks, LegacyCreateInstanceFn, LegacyNotificationFn,
    MainLoopCallbacks, NotificationFn, RecreateInstanceFn, SetFn, ToStringFn, widen_v4,
};
pub use config::RuntimeConfig;
pub use extension::{ClassCallbacks, ClassLink, Extension, ExtensionClass, InstanceState};
pub use interface::{InterfaceFunction, InterfaceRegistry, names};
pub use library::LibraryLoader;
pub use loader::{DEFAULT_ENTRY_SYMBOL, DylibLoader, EmbeddedEntry, EmbeddedLoader};
pub use manager::LoadStatus;
pub use runtime::Runtime;

pub use dynext_core::{
    CallError, CallErrorKind, Diagnostic, DiagnosticKind, Diagnostics, ExtensionBinding,
    ExtensionError, ExtensionToken, InitializationLevel, InstanceData, InstanceId,
    InterfaceError, LibraryError, MethodBind, MethodCallFn, MethodDefinition, MethodFlags,
    MethodPtrCallFn, MethodUserdata, MethodValidatedCallFn, NOTIFICATION_EXTENSION_RELOADED,
    NOTIFICATION_POSTINITIALIZE, NOTIFICATION_PREDELETE, Object, ObjectDb, ObjectError,
    ObjectHandle, ObjectVariant, PropertyHint, PropertyInfo, PropertyUsage, RegistrationError,
    ReloadError, StringName, TypeMetadata, Variant, VariantType, ptrcall,
};
pub use dynext_registry::{
    ApiType, ClassDb, ClassEntry, ClassFlags, ConstantEntry, EnumEntry, PropertyEntry, SignalInfo,
    VirtualMethodInfo,
};

/// Everything a host or a library usually needs.
pub mod prelude {
    pub use crate::abi::*;
    pub use crate::config::RuntimeConfig;
    pub use crate::extension::{ClassLink, Extension, ExtensionClass};
    pub use crate::interface::{InterfaceFunction, InterfaceRegistry, names};
    pub use crate::library::LibraryLoader;
    pub use crate::loader::{DylibLoader, EmbeddedLoader};
    pub use crate::manager::LoadStatus;
    pub use crate::runtime::Runtime;
    pub use dynext_core::{
        CallError, CallErrorKind, ExtensionError, ExtensionToken, InitializationLevel,
        InstanceData, InstanceId, MethodFlags, PropertyInfo, PropertyUsage, StringName, Variant,
        VariantType,
    };
}
