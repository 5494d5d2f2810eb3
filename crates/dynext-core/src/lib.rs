//! Core vocabulary for the dynext extension runtime.
//!
//! This crate holds the pieces shared by the host, the class catalog and the
//! libraries themselves:
//!
//! - [`StringName`]: hashed names for classes and members
//! - [`Variant`]: the boxed dynamic value
//! - [`ObjectDb`] and [`Object`]: live objects addressed by [`InstanceId`]
//! - [`MethodBind`]: the adapter behind every library-implemented method
//! - error types, [`Diagnostics`] and [`InitializationLevel`]

mod call_error;
mod diagnostics;
mod error;
mod ids;
mod init_level;
mod method_bind;
mod object;
mod object_db;
mod property_info;
pub mod ptrcall;
mod string_name;
mod variant;

pub use call_error::{CallError, CallErrorKind};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{
    ExtensionError, InterfaceError, LibraryError, ObjectError, RegistrationError, ReloadError,
};
pub use ids::{ExtensionToken, InstanceId};
pub use init_level::{InitializationLevel, level_label};
pub use method_bind::{
    MethodBind, MethodCallFn, MethodDefinition, MethodPtrCallFn, MethodUserdata,
    MethodValidatedCallFn,
};
pub use object::{
    ExtensionBinding, InstanceData, NOTIFICATION_EXTENSION_RELOADED, NOTIFICATION_POSTINITIALIZE,
    NOTIFICATION_PREDELETE, Object,
};
pub use object_db::{ObjectDb, ObjectHandle};
pub use property_info::{MethodFlags, PropertyHint, PropertyInfo, PropertyUsage, TypeMetadata};
pub use string_name::StringName;
pub use variant::{ObjectVariant, Variant, VariantType};
