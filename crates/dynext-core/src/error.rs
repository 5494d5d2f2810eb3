//! Error types for the extension runtime.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ExtensionError (top-level wrapper)
//! ├── RegistrationError - class and member registration
//! ├── LibraryError      - opening, entry points and initialization levels
//! ├── ReloadError       - reload transaction ordering
//! ├── InterfaceError    - interface function table
//! ├── ObjectError       - instantiation and method dispatch on objects
//! └── Io                - extension list persistence
//! ```

use thiserror::Error;

use crate::call_error::CallError;
use crate::ids::{ExtensionToken, InstanceId};
use crate::init_level::{InitializationLevel, level_label};
use crate::string_name::StringName;

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while a library registers or unregisters classes and members.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("attempt to register extension class '{0}', which is not a valid class identifier")]
    InvalidIdentifier(StringName),

    #[error("attempt to register extension class '{0}', which appears to be already registered")]
    AlreadyExists(StringName),

    #[error("attempt to register extension class '{class}' using non-existing parent class '{parent}'")]
    UnknownParent { class: StringName, parent: StringName },

    /// A member was registered on, or removal was requested for, a class this
    /// library never registered.
    #[error("attempt to register extension {member} for unexisting class '{class}'")]
    UnknownClass { class: StringName, member: String },

    #[error("attempt to unregister unexisting extension class '{0}'")]
    NotRegistered(StringName),

    #[error("attempt to unregister class '{0}' while other extension classes inherit from it")]
    HasChildren(StringName),

    #[error("method '{method}' is already bound on class '{class}'")]
    DuplicateMethod { class: StringName, method: StringName },

    #[error("unknown extension library {0}")]
    UnknownLibrary(ExtensionToken),
}

// ============================================================================
// Library Errors
// ============================================================================

/// Errors raised by the library lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error("library '{0}' is already open")]
    AlreadyOpen(String),

    #[error("library is not open")]
    NotOpen,

    #[error("library file not found: '{0}'")]
    NotFound(String),

    #[error("can't open dynamic library '{path}': {reason}")]
    OpenError { path: String, reason: String },

    #[error("no entry point '{0}' found in library")]
    EntryPointMissing(String),

    #[error("library entry point '{0}' reported failure")]
    InitializationFailed(String),

    #[error("initialization level '{requested}' is out of order (current level: {})", current_label(.current))]
    LevelOutOfOrder {
        requested: InitializationLevel,
        current: Option<InitializationLevel>,
    },

    #[error("no loader is attached to the library")]
    NoLoader,
}

fn current_label(current: &Option<InitializationLevel>) -> &'static str {
    level_label(*current)
}

// ============================================================================
// Reload Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReloadError {
    #[error("hot reload requires the tools build")]
    ToolsDisabled,

    #[error("extension '{0}' is not reloadable")]
    NotReloadable(String),

    #[error("a reload of '{0}' is already in progress")]
    InProgress(String),

    #[error("no reload of '{0}' is in progress")]
    NotInProgress(String),
}

// ============================================================================
// Interface Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceError {
    #[error("interface function '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("interface function '{0}' is not registered")]
    NotFound(String),
}

// ============================================================================
// Object Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("class '{0}' does not exist")]
    UnknownClass(StringName),

    #[error("class '{0}' can't be instantiated")]
    NotInstantiable(StringName),

    #[error("object {0} does not exist")]
    InvalidInstance(InstanceId),

    #[error("method '{method}' not found on class '{class}'")]
    UnknownMethod { class: StringName, method: StringName },

    #[error("call to '{method}' failed: {error}")]
    Call { method: StringName, error: CallError },
}

// ============================================================================
// Unified Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error(transparent)]
    Interface(#[from] InterfaceError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error("extension list i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
