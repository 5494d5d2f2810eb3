//! Interface function registry.
//!
//! Libraries never link against host symbols. During the entry handshake they
//! receive an [`InterfaceRegistry`] and resolve every host operation they need
//! by its stable name.

use std::fmt;

use dynext_core::{
    ExtensionError, ExtensionToken, InterfaceError, PropertyInfo, StringName, Variant,
};
use rustc_hash::FxHashMap;
use tracing::{error, trace};

use crate::abi::{
    ClassCreationInfo, ClassCreationInfo2, ClassCreationInfo3, ClassCreationInfo4,
    ClassCreationInfo5, ClassMethodInfo, ClassesUsedFn, IntoLatestCreationInfo, MainLoopCallbacks,
    VirtualMethodInfo, widen_v4,
};
use crate::runtime::Runtime;

/// Stable names of the standard interface functions.
pub mod names {
    pub const REGISTER_CLASS: &str = "classdb_register_extension_class";
    pub const REGISTER_CLASS2: &str = "classdb_register_extension_class2";
    pub const REGISTER_CLASS3: &str = "classdb_register_extension_class3";
    pub const REGISTER_CLASS4: &str = "classdb_register_extension_class4";
    pub const REGISTER_CLASS5: &str = "classdb_register_extension_class5";
    pub const REGISTER_METHOD: &str = "classdb_register_extension_class_method";
    pub const REGISTER_VIRTUAL_METHOD: &str = "classdb_register_extension_class_virtual_method";
    pub const REGISTER_INTEGER_CONSTANT: &str = "classdb_register_extension_class_integer_constant";
    pub const REGISTER_PROPERTY: &str = "classdb_register_extension_class_property";
    pub const REGISTER_PROPERTY_INDEXED: &str =
        "classdb_register_extension_class_property_indexed";
    pub const REGISTER_PROPERTY_GROUP: &str = "classdb_register_extension_class_property_group";
    pub const REGISTER_PROPERTY_SUBGROUP: &str =
        "classdb_register_extension_class_property_subgroup";
    pub const REGISTER_SIGNAL: &str = "classdb_register_extension_class_signal";
    pub const UNREGISTER_CLASS: &str = "classdb_unregister_extension_class";
    pub const GET_LIBRARY_PATH: &str = "get_library_path";
    pub const REGISTER_CLASSES_USED_CALLBACK: &str = "editor_register_get_classes_used_callback";
    pub const REGISTER_MAIN_LOOP_CALLBACKS: &str = "register_main_loop_callbacks";
}

// ============================================================================
// Function Signatures
// ============================================================================

pub type RegisterClassFn<I> =
    fn(&mut Runtime, ExtensionToken, &StringName, &StringName, I) -> Result<(), ExtensionError>;
pub type RegisterMethodFn =
    fn(&mut Runtime, ExtensionToken, &StringName, ClassMethodInfo) -> Result<(), ExtensionError>;
pub type RegisterVirtualMethodFn =
    fn(&mut Runtime, ExtensionToken, &StringName, VirtualMethodInfo) -> Result<(), ExtensionError>;
/// Arguments: class, enum name (empty for none), constant name, value, bitfield.
pub type RegisterIntegerConstantFn = fn(
    &mut Runtime,
    ExtensionToken,
    &StringName,
    &StringName,
    &StringName,
    i64,
    bool,
) -> Result<(), ExtensionError>;
/// Arguments: class, property, setter, getter.
pub type RegisterPropertyFn = fn(
    &mut Runtime,
    ExtensionToken,
    &StringName,
    PropertyInfo,
    &StringName,
    &StringName,
) -> Result<(), ExtensionError>;
pub type RegisterPropertyIndexedFn = fn(
    &mut Runtime,
    ExtensionToken,
    &StringName,
    PropertyInfo,
    &StringName,
    &StringName,
    i64,
) -> Result<(), ExtensionError>;
/// Arguments: class, group name, prefix.
pub type RegisterPropertyGroupFn =
    fn(&mut Runtime, ExtensionToken, &StringName, &str, &str) -> Result<(), ExtensionError>;
pub type RegisterSignalFn = fn(
    &mut Runtime,
    ExtensionToken,
    &StringName,
    &StringName,
    Vec<PropertyInfo>,
) -> Result<(), ExtensionError>;
pub type UnregisterClassFn =
    fn(&mut Runtime, ExtensionToken, &StringName) -> Result<(), ExtensionError>;
pub type GetLibraryPathFn = fn(&Runtime, ExtensionToken) -> Result<String, ExtensionError>;
pub type RegisterClassesUsedCallbackFn =
    fn(&mut Runtime, ExtensionToken, ClassesUsedFn) -> Result<(), ExtensionError>;
pub type RegisterMainLoopCallbacksFn =
    fn(&mut Runtime, ExtensionToken, MainLoopCallbacks) -> Result<(), ExtensionError>;
/// Host-specific function registered by the embedder.
pub type CustomFn =
    fn(&mut Runtime, ExtensionToken, &[Variant]) -> Result<Variant, ExtensionError>;

/// A host operation exposed to libraries.
#[derive(Clone, Copy)]
pub enum InterfaceFunction {
    RegisterClass(RegisterClassFn<ClassCreationInfo>),
    RegisterClass2(RegisterClassFn<ClassCreationInfo2>),
    RegisterClass3(RegisterClassFn<ClassCreationInfo3>),
    RegisterClass4(RegisterClassFn<ClassCreationInfo4>),
    RegisterClass5(RegisterClassFn<ClassCreationInfo5>),
    RegisterMethod(RegisterMethodFn),
    RegisterVirtualMethod(RegisterVirtualMethodFn),
    RegisterIntegerConstant(RegisterIntegerConstantFn),
    RegisterProperty(RegisterPropertyFn),
    RegisterPropertyIndexed(RegisterPropertyIndexedFn),
    RegisterPropertyGroup(RegisterPropertyGroupFn),
    RegisterPropertySubgroup(RegisterPropertyGroupFn),
    RegisterSignal(RegisterSignalFn),
    UnregisterClass(UnregisterClassFn),
    GetLibraryPath(GetLibraryPathFn),
    RegisterClassesUsedCallback(RegisterClassesUsedCallbackFn),
    RegisterMainLoopCallbacks(RegisterMainLoopCallbacksFn),
    Custom(CustomFn),
}

impl InterfaceFunction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegisterClass(_) => "RegisterClass",
            Self::RegisterClass2(_) => "RegisterClass2",
            Self::RegisterClass3(_) => "RegisterClass3",
            Self::RegisterClass4(_) => "RegisterClass4",
            Self::RegisterClass5(_) => "RegisterClass5",
            Self::RegisterMethod(_) => "RegisterMethod",
            Self::RegisterVirtualMethod(_) => "RegisterVirtualMethod",
            Self::RegisterIntegerConstant(_) => "RegisterIntegerConstant",
            Self::RegisterProperty(_) => "RegisterProperty",
            Self::RegisterPropertyIndexed(_) => "RegisterPropertyIndexed",
            Self::RegisterPropertyGroup(_) => "RegisterPropertyGroup",
            Self::RegisterPropertySubgroup(_) => "RegisterPropertySubgroup",
            Self::RegisterSignal(_) => "RegisterSignal",
            Self::UnregisterClass(_) => "UnregisterClass",
            Self::GetLibraryPath(_) => "GetLibraryPath",
            Self::RegisterClassesUsedCallback(_) => "RegisterClassesUsedCallback",
            Self::RegisterMainLoopCallbacks(_) => "RegisterMainLoopCallbacks",
            Self::Custom(_) => "Custom",
        }
    }
}

impl fmt::Debug for InterfaceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterfaceFunction::{}", self.kind())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Name to function table handed to every library.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    functions: FxHashMap<String, InterfaceFunction>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the standard registration functions.
    pub fn with_standard_functions() -> Self {
        let mut registry = Self::new();
        registry.install_standard_functions();
        registry
    }

    /// Register a function under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: InterfaceFunction,
    ) -> Result<(), InterfaceError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(InterfaceError::AlreadyRegistered(name));
        }
        trace!(name = %name, kind = function.kind(), "registered interface function");
        self.functions.insert(name, function);
        Ok(())
    }

    /// Look a function up by name. Misses are logged.
    pub fn resolve(&self, name: &str) -> Result<InterfaceFunction, InterfaceError> {
        match self.functions.get(name) {
            Some(function) => Ok(*function),
            None => {
                error!(name, "interface function not found");
                Err(InterfaceError::NotFound(name.to_owned()))
            }
        }
    }

    /// Look a function up without logging a miss.
    pub fn get(&self, name: &str) -> Option<InterfaceFunction> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drop every function.
    pub fn teardown(&mut self) {
        self.functions.clear();
    }

    /// Install the standard registration functions, keeping any existing entry.
    pub fn install_standard_functions(&mut self) {
        for (name, function) in standard_functions() {
            self.functions.entry(name.to_owned()).or_insert(function);
        }
    }
}

// ============================================================================
// Standard Functions
// ============================================================================

fn standard_functions() -> [(&'static str, InterfaceFunction); 17] {
    use InterfaceFunction as F;
    [
        (names::REGISTER_CLASS, F::RegisterClass(register_class)),
        (names::REGISTER_CLASS2, F::RegisterClass2(register_class2)),
        (names::REGISTER_CLASS3, F::RegisterClass3(register_class3)),
        (names::REGISTER_CLASS4, F::RegisterClass4(register_class4)),
        (names::REGISTER_CLASS5, F::RegisterClass5(register_class5)),
        (names::REGISTER_METHOD, F::RegisterMethod(Runtime::register_extension_class_method)),
        (
            names::REGISTER_VIRTUAL_METHOD,
            F::RegisterVirtualMethod(Runtime::register_extension_class_virtual_method),
        ),
        (
            names::REGISTER_INTEGER_CONSTANT,
            F::RegisterIntegerConstant(Runtime::register_extension_class_integer_constant),
        ),
        (
            names::REGISTER_PROPERTY,
            F::RegisterProperty(Runtime::register_extension_class_property),
        ),
        (
            names::REGISTER_PROPERTY_INDEXED,
            F::RegisterPropertyIndexed(Runtime::register_extension_class_property_indexed),
        ),
        (
            names::REGISTER_PROPERTY_GROUP,
            F::RegisterPropertyGroup(Runtime::register_extension_class_property_group),
        ),
        (
            names::REGISTER_PROPERTY_SUBGROUP,
            F::RegisterPropertySubgroup(Runtime::register_extension_class_property_subgroup),
        ),
        (names::REGISTER_SIGNAL, F::RegisterSignal(Runtime::register_extension_class_signal)),
        (names::UNREGISTER_CLASS, F::UnregisterClass(Runtime::unregister_extension_class)),
        (names::GET_LIBRARY_PATH, F::GetLibraryPath(Runtime::get_library_path)),
        (
            names::REGISTER_CLASSES_USED_CALLBACK,
            F::RegisterClassesUsedCallback(Runtime::register_classes_used_callback),
        ),
        (
            names::REGISTER_MAIN_LOOP_CALLBACKS,
            F::RegisterMainLoopCallbacks(Runtime::register_main_loop_callbacks),
        ),
    ]
}

fn register_class(
    runtime: &mut Runtime,
    library: ExtensionToken,
    class: &StringName,
    parent: &StringName,
    info: ClassCreationInfo,
) -> Result<(), ExtensionError> {
    let (info, legacy) = info.into_latest();
    runtime.register_extension_class(library, class, parent, info, legacy)
}

fn register_class2(
    runtime: &mut Runtime,
    library: ExtensionToken,
    class: &StringName,
    parent: &StringName,
    info: ClassCreationInfo2,
) -> Result<(), ExtensionError> {
    let (info, legacy) = info.into_latest();
    runtime.register_extension_class(library, class, parent, info, legacy)
}

fn register_class3(
    runtime: &mut Runtime,
    library: ExtensionToken,
    class: &StringName,
    parent: &StringName,
    info: ClassCreationInfo3,
) -> Result<(), ExtensionError> {
    let (info, legacy) = info.into_latest();
    runtime.register_extension_class(library, class, parent, info, legacy)
}

fn register_class4(
    runtime: &mut Runtime,
    library: ExtensionToken,
    class: &StringName,
    parent: &StringName,
    info: ClassCreationInfo4,
) -> Result<(), ExtensionError> {
    let (info, legacy) = widen_v4(info);
    runtime.register_extension_class(library, class, parent, info, legacy)
}

fn register_class5(
    runtime: &mut Runtime,
    library: ExtensionToken,
    class: &StringName,
    parent: &StringName,
    info: ClassCreationInfo5,
) -> Result<(), ExtensionError> {
    let (info, legacy) = info.into_latest();
    runtime.register_extension_class(library, class, parent, info, legacy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(_: &mut Runtime, _: ExtensionToken, _: &[Variant]) -> Result<Variant, ExtensionError> {
        Ok(Variant::Int(42))
    }

    #[test]
    fn standard_table_is_complete() {
        let registry = InterfaceRegistry::with_standard_functions();
        assert_eq!(registry.len(), 17);
        assert!(matches!(
            registry.resolve(names::REGISTER_CLASS5),
            Ok(InterfaceFunction::RegisterClass5(_))
        ));
        assert!(matches!(
            registry.resolve(names::GET_LIBRARY_PATH),
            Ok(InterfaceFunction::GetLibraryPath(_))
        ));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = InterfaceRegistry::new();
        registry
            .register("answer", InterfaceFunction::Custom(answer))
            .unwrap();
        let err = registry
            .register("answer", InterfaceFunction::Custom(answer))
            .unwrap_err();
        assert_eq!(err, InterfaceError::AlreadyRegistered("answer".to_owned()));
    }

    #[test]
    fn resolve_unknown_name() {
        let registry = InterfaceRegistry::new();
        assert_eq!(
            registry.resolve("mem_alloc").unwrap_err(),
            InterfaceError::NotFound("mem_alloc".to_owned())
        );
        assert!(registry.get("mem_alloc").is_none());
    }

    #[test]
    fn teardown_clears_table() {
        let mut registry = InterfaceRegistry::with_standard_functions();
        registry.teardown();
        assert!(registry.is_empty());
        assert!(registry.resolve(names::REGISTER_METHOD).is_err());
    }

    #[test]
    fn install_keeps_host_overrides() {
        let mut registry = InterfaceRegistry::new();
        registry
            .register(names::GET_LIBRARY_PATH, InterfaceFunction::Custom(answer))
            .unwrap();
        registry.install_standard_functions();
        assert!(matches!(
            registry.get(names::GET_LIBRARY_PATH),
            Some(InterfaceFunction::Custom(_))
        ));
    }

    #[test]
    fn names_are_sorted() {
        let registry = InterfaceRegistry::with_standard_functions();
        let names = registry.names();
        assert_eq!(names.first(), Some(&names::REGISTER_CLASS));
        assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
