//! Boxed dynamic value passed through the generic and validated call paths.

use std::ffi::c_void;
use std::fmt;
use std::ptr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ids::InstanceId;
use crate::object_db::ObjectHandle;
use crate::string_name::StringName;

/// Declared type of a value, argument or return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum VariantType {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    StringName = 5,
    Object = 6,
    Array = 7,
}

impl VariantType {
    /// Human-readable type name.
    pub const fn name(self) -> &'static str {
        match self {
            VariantType::Nil => "Nil",
            VariantType::Bool => "bool",
            VariantType::Int => "int",
            VariantType::Float => "float",
            VariantType::String => "String",
            VariantType::StringName => "StringName",
            VariantType::Object => "Object",
            VariantType::Array => "Array",
        }
    }

    /// Whether a value may be passed for a parameter of this type.
    ///
    /// `Nil` parameters accept anything. `Object` parameters also accept `Nil`
    /// as the null object.
    pub fn accepts(self, value: &Variant) -> bool {
        match self {
            VariantType::Nil => true,
            VariantType::Object => matches!(value, Variant::Nil | Variant::Object(_)),
            ty => value.get_type() == ty,
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Object slot of a [`Variant`].
///
/// Holds the raw handle written by pointer calls and the cached identity used
/// for comparisons. [`ObjectVariant::update_id`] refreshes the identity after
/// the handle was written through a raw pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectVariant {
    handle: Option<ObjectHandle>,
    id: InstanceId,
}

impl ObjectVariant {
    pub const fn null() -> Self {
        Self {
            handle: None,
            id: InstanceId::NULL,
        }
    }

    pub fn new(id: InstanceId) -> Self {
        if id.is_null() {
            return Self::null();
        }
        Self {
            handle: Some(ObjectHandle::from(id)),
            id,
        }
    }

    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[inline]
    pub fn handle(&self) -> Option<ObjectHandle> {
        self.handle
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.handle.is_none()
    }

    pub fn update_id(&mut self) {
        self.id = self
            .handle
            .map(ObjectHandle::instance_id)
            .unwrap_or(InstanceId::NULL);
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringName(StringName),
    Object(ObjectVariant),
    Array(Vec<Variant>),
}

impl Variant {
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Float(_) => VariantType::Float,
            Variant::String(_) => VariantType::String,
            Variant::StringName(_) => VariantType::StringName,
            Variant::Object(_) => VariantType::Object,
            Variant::Array(_) => VariantType::Array,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.get_type().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    /// Whether the value equals the zero value of its type.
    pub fn is_zero(&self) -> bool {
        match self {
            Variant::Nil => true,
            Variant::Bool(v) => !v,
            Variant::Int(v) => *v == 0,
            Variant::Float(v) => *v == 0.0,
            Variant::String(v) => v.is_empty(),
            Variant::StringName(v) => v.is_empty(),
            Variant::Object(v) => v.is_null(),
            Variant::Array(v) => v.is_empty(),
        }
    }

    pub fn object(id: InstanceId) -> Self {
        Variant::Object(ObjectVariant::new(id))
    }

    pub fn null_object() -> Self {
        Variant::Object(ObjectVariant::null())
    }

    /// The zero value of `ty`.
    pub fn default_for(ty: VariantType) -> Self {
        match ty {
            VariantType::Nil => Variant::Nil,
            VariantType::Bool => Variant::Bool(false),
            VariantType::Int => Variant::Int(0),
            VariantType::Float => Variant::Float(0.0),
            VariantType::String => Variant::String(String::new()),
            VariantType::StringName => Variant::StringName(StringName::empty()),
            VariantType::Object => Variant::null_object(),
            VariantType::Array => Variant::Array(Vec::new()),
        }
    }

    /// Reset to the zero value of `ty`, ready to receive a raw write.
    pub fn initialize(&mut self, ty: VariantType) {
        *self = Variant::default_for(ty);
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(v) => Some(*v),
            Variant::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(v) => Some(v),
            Variant::StringName(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<InstanceId> {
        match self {
            Variant::Object(v) => Some(v.id()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Value equality with numeric widening between `Int` and `Float`.
    pub fn equals(&self, other: &Variant) -> bool {
        match (self, other) {
            (Variant::Int(a), Variant::Float(b)) | (Variant::Float(b), Variant::Int(a)) => {
                (*a as f64) == *b
            }
            (Variant::Object(a), Variant::Object(b)) => a.id() == b.id(),
            (Variant::Nil, Variant::Object(o)) | (Variant::Object(o), Variant::Nil) => o.is_null(),
            (Variant::Array(a), Variant::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            _ => self == other,
        }
    }

    /// Pointer to the raw storage of the payload.
    ///
    /// Raw layouts: `bool`, `i64`, `f64`, `String`, `StringName`,
    /// `Option<ObjectHandle>` and `Vec<Variant>`. A `Nil` value exposes the
    /// variant itself.
    pub fn opaque_ptr(&self) -> *const c_void {
        match self {
            Variant::Nil => ptr::from_ref(self).cast(),
            Variant::Bool(v) => ptr::from_ref(v).cast(),
            Variant::Int(v) => ptr::from_ref(v).cast(),
            Variant::Float(v) => ptr::from_ref(v).cast(),
            Variant::String(v) => ptr::from_ref(v).cast(),
            Variant::StringName(v) => ptr::from_ref(v).cast(),
            Variant::Object(v) => ptr::from_ref(&v.handle).cast(),
            Variant::Array(v) => ptr::from_ref(v).cast(),
        }
    }

    /// Mutable counterpart of [`Variant::opaque_ptr`].
    pub fn opaque_ptr_mut(&mut self) -> *mut c_void {
        match self {
            Variant::Nil => ptr::from_mut(self).cast(),
            Variant::Bool(v) => ptr::from_mut(v).cast(),
            Variant::Int(v) => ptr::from_mut(v).cast(),
            Variant::Float(v) => ptr::from_mut(v).cast(),
            Variant::String(v) => ptr::from_mut(v).cast(),
            Variant::StringName(v) => ptr::from_mut(v).cast(),
            Variant::Object(v) => ptr::from_mut(&mut v.handle).cast(),
            Variant::Array(v) => ptr::from_mut(v).cast(),
        }
    }

    /// Refresh the cached object identity after a raw write.
    pub fn update_object_id(&mut self) {
        if let Variant::Object(v) = self {
            v.update_id();
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => f.write_str("<null>"),
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::Int(v) => write!(f, "{v}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::String(v) => f.write_str(v),
            Variant::StringName(v) => write!(f, "{v}"),
            Variant::Object(v) if v.is_null() => f.write_str("<Object#null>"),
            Variant::Object(v) => write!(f, "{}", v.id()),
            Variant::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v as i64)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_owned())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<StringName> for Variant {
    fn from(v: StringName) -> Self {
        Variant::StringName(v)
    }
}

impl From<InstanceId> for Variant {
    fn from(id: InstanceId) -> Self {
        Variant::object(id)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::Array(v)
    }
}
