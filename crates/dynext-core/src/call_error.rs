//! Outcome of a generic method call.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::variant::VariantType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum CallErrorKind {
    #[default]
    Ok = 0,
    InvalidMethod = 1,
    InvalidArgument = 2,
    TooManyArguments = 3,
    TooFewArguments = 4,
    InstanceIsNull = 5,
    MethodNotConst = 6,
}

/// Error slot filled by the generic call path.
///
/// For `InvalidArgument`, `argument` is the offending position and `expected`
/// the declared [`VariantType`] as a raw value. For `TooManyArguments` and
/// `TooFewArguments`, `expected` is the acceptable argument count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallError {
    pub kind: CallErrorKind,
    pub argument: i32,
    pub expected: i32,
}

impl CallError {
    pub const fn ok() -> Self {
        Self {
            kind: CallErrorKind::Ok,
            argument: 0,
            expected: 0,
        }
    }

    pub const fn new(kind: CallErrorKind) -> Self {
        Self {
            kind,
            argument: 0,
            expected: 0,
        }
    }

    pub const fn invalid_method() -> Self {
        Self::new(CallErrorKind::InvalidMethod)
    }

    pub const fn instance_is_null() -> Self {
        Self::new(CallErrorKind::InstanceIsNull)
    }

    pub fn invalid_argument(argument: usize, expected: VariantType) -> Self {
        Self {
            kind: CallErrorKind::InvalidArgument,
            argument: argument as i32,
            expected: u32::from(expected) as i32,
        }
    }

    pub fn too_many_arguments(expected: usize) -> Self {
        Self {
            kind: CallErrorKind::TooManyArguments,
            argument: 0,
            expected: expected as i32,
        }
    }

    pub fn too_few_arguments(expected: usize) -> Self {
        Self {
            kind: CallErrorKind::TooFewArguments,
            argument: 0,
            expected: expected as i32,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.kind == CallErrorKind::Ok
    }

    /// Declared type for an `InvalidArgument` error.
    pub fn expected_type(&self) -> Option<VariantType> {
        if self.kind != CallErrorKind::InvalidArgument {
            return None;
        }
        VariantType::try_from(self.expected as u32).ok()
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallErrorKind::Ok => f.write_str("ok"),
            CallErrorKind::InvalidMethod => f.write_str("invalid method"),
            CallErrorKind::InvalidArgument => match self.expected_type() {
                Some(ty) => write!(f, "invalid argument #{}: expected {ty}", self.argument),
                None => write!(f, "invalid argument #{}", self.argument),
            },
            CallErrorKind::TooManyArguments => {
                write!(f, "too many arguments: expected {}", self.expected)
            }
            CallErrorKind::TooFewArguments => {
                write!(f, "too few arguments: expected {}", self.expected)
            }
            CallErrorKind::InstanceIsNull => f.write_str("instance is null"),
            CallErrorKind::MethodNotConst => f.write_str("method is not const"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_ok() {
        assert!(CallError::default().is_ok());
        assert_eq!(CallError::default(), CallError::ok());
    }

    #[test]
    fn invalid_argument_reports_type() {
        let err = CallError::invalid_argument(1, VariantType::Int);
        assert_eq!(err.kind, CallErrorKind::InvalidArgument);
        assert_eq!(err.argument, 1);
        assert_eq!(err.expected_type(), Some(VariantType::Int));
        assert_eq!(err.to_string(), "invalid argument #1: expected int");
    }

    #[test]
    fn arity_errors_report_count() {
        assert_eq!(CallError::too_few_arguments(2).expected, 2);
        assert_eq!(CallError::too_many_arguments(0).to_string(), "too many arguments: expected 0");
        assert_eq!(CallError::too_many_arguments(0).expected_type(), None);
    }

    #[test]
    fn kind_round_trips_through_raw_value() {
        let raw: u32 = CallErrorKind::MethodNotConst.into();
        assert_eq!(raw, 6);
        assert_eq!(CallErrorKind::try_from(raw).unwrap(), CallErrorKind::MethodNotConst);
    }
}
