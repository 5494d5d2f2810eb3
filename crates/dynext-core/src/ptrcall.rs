//! Accessors for the raw pointer-call path.
//!
//! Argument and return pointers address the payload storage described on
//! [`Variant::opaque_ptr`](crate::Variant::opaque_ptr): `bool`, `i64`, `f64`,
//! `String`, `StringName`, `Option<ObjectHandle>` or `Vec<Variant>`.

use std::ffi::c_void;

use crate::object_db::ObjectHandle;

/// Raw layout of an object slot.
pub type RawObject = Option<ObjectHandle>;

/// Read argument `index` as `T`.
///
/// # Safety
///
/// `args[index]` must point to a live, initialized `T` for the lifetime `'a`.
#[inline]
pub unsafe fn arg<'a, T>(args: &[*const c_void], index: usize) -> &'a T {
    unsafe { &*args[index].cast::<T>() }
}

/// Overwrite the return slot with `value`.
///
/// # Safety
///
/// `ret` must point to a live, initialized `T`.
#[inline]
pub unsafe fn write_return<T>(ret: *mut c_void, value: T) {
    unsafe { *ret.cast::<T>() = value };
}

/// Pointer to a typed value, for building raw argument lists.
#[inline]
pub fn arg_ptr<T>(value: &T) -> *const c_void {
    std::ptr::from_ref(value).cast()
}

/// Mutable pointer to a typed return slot.
#[inline]
pub fn ret_ptr<T>(value: &mut T) -> *mut c_void {
    std::ptr::from_mut(value).cast()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes_typed_slots() {
        let a = 20i64;
        let b = 2.5f64;
        let args = [arg_ptr(&a), arg_ptr(&b)];
        let mut out = 0i64;
        unsafe {
            let x = *arg::<i64>(&args, 0);
            let y = *arg::<f64>(&args, 1);
            write_return(ret_ptr(&mut out), x + y as i64);
        }
        assert_eq!(out, 22);
    }
}
