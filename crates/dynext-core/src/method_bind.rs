//! Adapter presenting a library-implemented method through the host's
//! uniform invocation contract.
//!
//! Three invocation paths exist:
//!
//! - **generic** ([`MethodBind::call`]): boxed arguments, arity and type
//!   checks, trailing defaults appended, failures reported in a [`CallError`].
//! - **validated** ([`MethodBind::validated_call`]): boxed arguments the caller
//!   already checked. Synthesized from the raw path when the library only
//!   supplies that, which is why the path is `unsafe`.
//! - **raw** ([`MethodBind::ptrcall`]): untyped pointers to payload storage.
//!
//! Vararg methods only support the generic path.
//!
//! A bind is shared as `Arc<MethodBind>` so callers may cache it. During a
//! reload the definition is swapped in place when the new one is compatible,
//! which keeps cached binds usable. Binds that could not be updated are
//! invalidated and refuse every call.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::error;

use crate::call_error::CallError;
use crate::object::{InstanceData, Object};
use crate::property_info::{MethodFlags, PropertyInfo, TypeMetadata};
use crate::string_name::StringName;
use crate::variant::{Variant, VariantType};

/// Opaque per-method state handed back to every call.
pub type MethodUserdata = Arc<dyn Any + Send + Sync>;

/// Generic entry: boxed arguments, boxed return, error slot.
pub type MethodCallFn =
    fn(&MethodUserdata, Option<&mut InstanceData>, &[&Variant], &mut Variant, &mut CallError);

/// Validated entry: boxed arguments already checked against the signature.
pub type MethodValidatedCallFn =
    fn(&MethodUserdata, Option<&mut InstanceData>, &[&Variant], &mut Variant);

/// Raw entry: pointers to argument payloads and to the return payload.
///
/// # Safety
///
/// Every pointer must address an initialized payload of the declared type.
pub type MethodPtrCallFn =
    unsafe fn(&MethodUserdata, Option<&mut InstanceData>, &[*const c_void], *mut c_void);

/// A method as described by the library that implements it.
#[derive(Clone)]
pub struct MethodDefinition {
    pub name: StringName,
    pub userdata: MethodUserdata,
    pub call_func: MethodCallFn,
    pub validated_call_func: Option<MethodValidatedCallFn>,
    pub ptrcall_func: Option<MethodPtrCallFn>,
    pub flags: MethodFlags,
    pub return_value: Option<PropertyInfo>,
    pub return_metadata: TypeMetadata,
    pub arguments: Vec<PropertyInfo>,
    pub arguments_metadata: Vec<TypeMetadata>,
    /// Defaults for the trailing arguments.
    pub default_arguments: Vec<Variant>,
}

impl MethodDefinition {
    pub fn new(name: impl Into<StringName>, userdata: MethodUserdata, call_func: MethodCallFn) -> Self {
        Self {
            name: name.into(),
            userdata,
            call_func,
            validated_call_func: None,
            ptrcall_func: None,
            flags: MethodFlags::DEFAULT,
            return_value: None,
            return_metadata: TypeMetadata::None,
            arguments: Vec::new(),
            arguments_metadata: Vec::new(),
            default_arguments: Vec::new(),
        }
    }

    pub fn with_ptrcall(mut self, ptrcall: MethodPtrCallFn) -> Self {
        self.ptrcall_func = Some(ptrcall);
        self
    }

    pub fn with_validated_call(mut self, validated: MethodValidatedCallFn) -> Self {
        self.validated_call_func = Some(validated);
        self
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_return(mut self, info: PropertyInfo) -> Self {
        self.return_value = Some(info);
        self
    }

    pub fn with_return_metadata(mut self, metadata: TypeMetadata) -> Self {
        self.return_metadata = metadata;
        self
    }

    pub fn with_argument(mut self, info: PropertyInfo) -> Self {
        self.arguments.push(info);
        self.arguments_metadata.push(TypeMetadata::None);
        self
    }

    pub fn with_argument_metadata(mut self, info: PropertyInfo, metadata: TypeMetadata) -> Self {
        self.arguments.push(info);
        self.arguments_metadata.push(metadata);
        self
    }

    pub fn with_default_argument(mut self, value: Variant) -> Self {
        self.default_arguments.push(value);
        self
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    pub fn is_vararg(&self) -> bool {
        self.flags.contains(MethodFlags::VARARG)
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(MethodFlags::CONST)
    }

    pub fn has_return(&self) -> bool {
        self.return_value.is_some()
    }

    pub fn return_type(&self) -> VariantType {
        self.return_value
            .as_ref()
            .map_or(VariantType::Nil, |info| info.variant_type)
    }

    /// Whether `other` can replace this definition without changing the
    /// calling convention.
    pub fn is_compatible_with(&self, other: &MethodDefinition) -> bool {
        self.is_static() == other.is_static()
            && self.is_vararg() == other.is_vararg()
            && self.has_return() == other.has_return()
            && self.return_type() == other.return_type()
            && self.arguments.len() == other.arguments.len()
            && self
                .arguments
                .iter()
                .zip(&other.arguments)
                .all(|(a, b)| a.variant_type == b.variant_type)
    }

    /// Whether `args` fill every declared argument with an accepted value.
    fn matches_signature(&self, args: &[&Variant]) -> bool {
        args.len() == self.arguments.len()
            && args
                .iter()
                .zip(&self.arguments)
                .all(|(arg, info)| info.variant_type.accepts(arg))
    }

    /// Check a generic call's arguments and collect the defaults that pad it.
    fn check_arguments(&self, args: &[&Variant]) -> Result<Vec<Variant>, CallError> {
        if self.is_vararg() {
            return Ok(Vec::new());
        }
        let declared = self.arguments.len();
        if args.len() > declared {
            return Err(CallError::too_many_arguments(declared));
        }
        let defaults = self.default_arguments.len().min(declared);
        let required = declared - defaults;
        if args.len() < required {
            return Err(CallError::too_few_arguments(required));
        }
        for (index, (arg, info)) in args.iter().zip(&self.arguments).enumerate() {
            if !info.variant_type.accepts(arg) {
                return Err(CallError::invalid_argument(index, info.variant_type));
            }
        }
        let missing = declared - args.len();
        let first = self.default_arguments.len() - missing;
        Ok(self.default_arguments[first..].to_vec())
    }
}

impl fmt::Debug for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("return_value", &self.return_value)
            .field("arguments", &self.arguments)
            .field("default_arguments", &self.default_arguments)
            .field("validated", &self.validated_call_func.is_some())
            .field("ptrcall", &self.ptrcall_func.is_some())
            .finish()
    }
}

/// Everything needed to run one call, copied out so the definition lock is
/// released before library code runs.
struct Dispatch {
    userdata: MethodUserdata,
    call_func: MethodCallFn,
    validated_call_func: Option<MethodValidatedCallFn>,
    ptrcall_func: Option<MethodPtrCallFn>,
    is_static: bool,
    is_vararg: bool,
    return_type: VariantType,
}

impl From<&MethodDefinition> for Dispatch {
    fn from(def: &MethodDefinition) -> Self {
        Self {
            userdata: Arc::clone(&def.userdata),
            call_func: def.call_func,
            validated_call_func: def.validated_call_func,
            ptrcall_func: def.ptrcall_func,
            is_static: def.is_static(),
            is_vararg: def.is_vararg(),
            return_type: def.return_type(),
        }
    }
}

/// A registered method.
pub struct MethodBind {
    name: StringName,
    instance_class: StringName,
    definition: RwLock<MethodDefinition>,
    reloading: AtomicBool,
    valid: AtomicBool,
}

impl MethodBind {
    pub fn new(definition: MethodDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            instance_class: StringName::empty(),
            definition: RwLock::new(definition),
            reloading: AtomicBool::new(false),
            valid: AtomicBool::new(true),
        }
    }

    /// Set the class this method is bound on.
    pub fn with_instance_class(mut self, class: impl Into<StringName>) -> Self {
        self.instance_class = class.into();
        self
    }

    pub fn name(&self) -> &StringName {
        &self.name
    }

    pub fn instance_class(&self) -> &StringName {
        &self.instance_class
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Refuse every further call. Irreversible.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::Acquire)
    }

    pub fn set_reloading(&self, reloading: bool) {
        self.reloading.store(reloading, Ordering::Release);
    }

    pub fn flags(&self) -> MethodFlags {
        self.definition.read().flags
    }

    pub fn is_static(&self) -> bool {
        self.definition.read().is_static()
    }

    pub fn is_const(&self) -> bool {
        self.definition.read().is_const()
    }

    pub fn is_vararg(&self) -> bool {
        self.definition.read().is_vararg()
    }

    pub fn has_return(&self) -> bool {
        self.definition.read().has_return()
    }

    pub fn return_type(&self) -> VariantType {
        self.definition.read().return_type()
    }

    pub fn argument_count(&self) -> usize {
        self.definition.read().arguments.len()
    }

    pub fn argument_types(&self) -> Vec<VariantType> {
        self.definition
            .read()
            .arguments
            .iter()
            .map(|info| info.variant_type)
            .collect()
    }

    pub fn default_arguments(&self) -> Vec<Variant> {
        self.definition.read().default_arguments.clone()
    }

    /// Snapshot of the current definition.
    pub fn definition(&self) -> MethodDefinition {
        self.definition.read().clone()
    }

    /// Whether `definition` could replace the current one in place.
    pub fn is_compatible(&self, definition: &MethodDefinition) -> bool {
        self.definition.read().is_compatible_with(definition)
    }

    /// Replace the definition in place if the calling convention is unchanged.
    ///
    /// Hands the definition back when it is incompatible.
    pub fn try_update(&self, definition: MethodDefinition) -> Result<(), MethodDefinition> {
        let mut current = self.definition.write();
        if !current.is_compatible_with(&definition) {
            return Err(definition);
        }
        *current = definition;
        Ok(())
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::from(&*self.definition.read())
    }

    /// Common gate for every path: the bind must be valid and the receiver
    /// must not be a placeholder.
    fn check_callable(&self, object: Option<&Object>) -> Result<(), CallError> {
        if !self.is_valid() {
            error!(
                method = %self.name,
                class = %self.instance_class,
                "attempted to call invalid method bind '{}', it may have been cached across a reload",
                self.name
            );
            return Err(CallError::invalid_method());
        }
        if let Some(object) = object
            && object.is_extension_placeholder()
        {
            error!(
                method = %self.name,
                class = %object.class_name(),
                "attempted to call '{}' on a placeholder instance",
                self.name
            );
            return Err(CallError::invalid_method());
        }
        Ok(())
    }

    /// Generic call.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(
        &self,
        object: Option<&mut Object>,
        args: &[&Variant],
        error: &mut CallError,
    ) -> Variant {
        *error = CallError::ok();
        if let Err(err) = self.check_callable(object.as_deref()) {
            *error = err;
            return Variant::Nil;
        }

        let (dispatch, defaults) = {
            let definition = self.definition.read();
            match definition.check_arguments(args) {
                Ok(defaults) => (Dispatch::from(&*definition), defaults),
                Err(err) => {
                    *error = err;
                    return Variant::Nil;
                }
            }
        };

        let instance = if dispatch.is_static {
            None
        } else {
            match object {
                Some(object) => object.instance_mut(),
                None => {
                    *error = CallError::instance_is_null();
                    return Variant::Nil;
                }
            }
        };

        let mut ret = Variant::Nil;
        if defaults.is_empty() {
            (dispatch.call_func)(&dispatch.userdata, instance, args, &mut ret, error);
        } else {
            let mut full: Vec<&Variant> = Vec::with_capacity(args.len() + defaults.len());
            full.extend_from_slice(args);
            full.extend(defaults.iter());
            (dispatch.call_func)(&dispatch.userdata, instance, &full, &mut ret, error);
        }
        ret
    }

    /// Validated call.
    ///
    /// # Safety
    ///
    /// `args` must hold exactly one value per declared argument, each of the
    /// declared type (`Nil` is allowed for object parameters). When the
    /// library only supplies a raw entry, the arguments are handed to it as
    /// untyped payload pointers and nothing else checks them.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn validated_call(&self, object: Option<&mut Object>, args: &[&Variant], ret: &mut Variant) {
        if self.check_callable(object.as_deref()).is_err() {
            return;
        }
        let (dispatch, argument_types) = {
            let definition = self.definition.read();
            debug_assert!(
                !definition.is_vararg(),
                "vararg method '{}' has no validated call path",
                self.name
            );
            debug_assert!(
                definition.is_vararg() || definition.matches_signature(args),
                "validated call of '{}' with arguments that do not match its signature",
                self.name
            );
            let argument_types: Vec<VariantType> = if definition.validated_call_func.is_none() {
                definition.arguments.iter().map(|info| info.variant_type).collect()
            } else {
                Vec::new()
            };
            (Dispatch::from(&*definition), argument_types)
        };
        if dispatch.is_vararg {
            error!(method = %self.name, "vararg methods have no validated call path");
            return;
        }
        if !dispatch.is_static && object.is_none() {
            error!(method = %self.name, "validated call of a non-static method without an instance");
            return;
        }
        let instance = if dispatch.is_static {
            None
        } else {
            object.and_then(Object::instance_mut)
        };

        if let Some(validated) = dispatch.validated_call_func {
            validated(&dispatch.userdata, instance, args, ret);
        } else if let Some(ptrcall) = dispatch.ptrcall_func {
            let null = Variant::null_object();
            let argptrs: Vec<*const c_void> = args
                .iter()
                .zip(&argument_types)
                .map(|(arg, ty)| match ty {
                    VariantType::Nil => ptr::from_ref::<Variant>(*arg).cast(),
                    VariantType::Object if arg.is_nil() => null.opaque_ptr(),
                    _ => arg.opaque_ptr(),
                })
                .collect();
            ret.initialize(dispatch.return_type);
            let ret_opaque = if dispatch.return_type == VariantType::Nil {
                ptr::from_mut(ret).cast::<c_void>()
            } else {
                ret.opaque_ptr_mut()
            };
            // SAFETY: the caller guarantees `args` match the declared
            // signature; `argptrs` borrow from `args` and `null`, and `ret`
            // was initialized to the declared return type.
            unsafe { ptrcall(&dispatch.userdata, instance, &argptrs, ret_opaque) };
            if ret.get_type() == VariantType::Object {
                ret.update_object_id();
            }
        } else {
            let mut ignored = CallError::ok();
            (dispatch.call_func)(&dispatch.userdata, instance, args, ret, &mut ignored);
        }
    }

    /// Raw call.
    ///
    /// # Safety
    ///
    /// `args` must point to initialized payloads of the declared argument
    /// types and `ret` to an initialized payload of the declared return type.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn ptrcall(&self, object: Option<&mut Object>, args: &[*const c_void], ret: *mut c_void) {
        if self.check_callable(object.as_deref()).is_err() {
            return;
        }
        let dispatch = self.dispatch();
        debug_assert!(
            !dispatch.is_vararg,
            "vararg method '{}' has no raw call path",
            self.name
        );
        if dispatch.is_vararg {
            error!(method = %self.name, "vararg methods have no raw call path");
            return;
        }
        let Some(ptrcall) = dispatch.ptrcall_func else {
            error!(method = %self.name, "method has no raw call entry");
            return;
        };
        if !dispatch.is_static && object.is_none() {
            error!(method = %self.name, "raw call of a non-static method without an instance");
            return;
        }
        let instance = if dispatch.is_static {
            None
        } else {
            object.and_then(Object::instance_mut)
        };
        unsafe { ptrcall(&dispatch.userdata, instance, args, ret) };
    }
}

impl fmt::Debug for MethodBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBind")
            .field("name", &self.name)
            .field("instance_class", &self.instance_class)
            .field("valid", &self.is_valid())
            .field("reloading", &self.is_reloading())
            .field("definition", &*self.definition.read())
            .finish()
    }
}
