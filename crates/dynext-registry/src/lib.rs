//! Reflection catalog for the dynext runtime.
//!
//! [`ClassDb`] stores builtin classes next to classes registered by extension
//! libraries, keyed by [`StringName`](dynext_core::StringName).

mod class_db;
mod class_entry;

pub use class_db::ClassDb;
pub use class_entry::{
    ApiType, ClassEntry, ClassFlags, ConstantEntry, EnumEntry, PropertyEntry, SignalInfo,
    VirtualMethodInfo,
};
