//! Cost of the three method call paths on one bind.
//!
//! ```bash
//! cargo bench --bench call_paths
//! ```

use std::ffi::c_void;
use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use dynext::ptrcall::{self, arg_ptr, ret_ptr};
use dynext::{
    CallError, InstanceData, MethodBind, MethodDefinition, MethodFlags, MethodUserdata,
    PropertyInfo, Variant, VariantType,
};

fn mul_call(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[&Variant], ret: &mut Variant, error: &mut CallError) {
    match (args[0].as_int(), args[1].as_int()) {
        (Some(a), Some(b)) => *ret = Variant::Int(a * b),
        (None, _) => *error = CallError::invalid_argument(0, VariantType::Int),
        (_, None) => *error = CallError::invalid_argument(1, VariantType::Int),
    }
}

fn mul_validated(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[&Variant], ret: &mut Variant) {
    let a = args[0].as_int().unwrap_or_default();
    let b = args[1].as_int().unwrap_or_default();
    *ret = Variant::Int(a * b);
}

unsafe fn mul_ptrcall(_: &MethodUserdata, _: Option<&mut InstanceData>, args: &[*const c_void], ret: *mut c_void) {
    unsafe {
        let a = *ptrcall::arg::<i64>(args, 0);
        let b = *ptrcall::arg::<i64>(args, 1);
        ptrcall::write_return(ret, a * b);
    }
}

fn mul_bind(validated: bool, raw: bool) -> MethodBind {
    let mut definition = MethodDefinition::new("mul", Arc::new(()), mul_call)
        .with_flags(MethodFlags::NORMAL | MethodFlags::STATIC)
        .with_argument(PropertyInfo::new("a", VariantType::Int))
        .with_argument(PropertyInfo::new("b", VariantType::Int))
        .with_return(PropertyInfo::new("", VariantType::Int));
    if validated {
        definition = definition.with_validated_call(mul_validated);
    }
    if raw {
        definition = definition.with_ptrcall(mul_ptrcall);
    }
    MethodBind::new(definition)
}

fn bench_call_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_paths");
    let a = Variant::Int(6);
    let b = Variant::Int(7);

    let bind = mul_bind(true, true);
    group.bench_function("generic", |bencher| {
        bencher.iter(|| {
            let mut error = CallError::ok();
            let value = bind.call(None, &[black_box(&a), black_box(&b)], &mut error);
            black_box(value)
        })
    });

    group.bench_function("validated", |bencher| {
        bencher.iter(|| {
            let mut ret = Variant::Nil;
            unsafe { bind.validated_call(None, &[black_box(&a), black_box(&b)], &mut ret) };
            black_box(ret)
        })
    });

    let raw_only = mul_bind(false, true);
    group.bench_function("validated_from_raw", |bencher| {
        bencher.iter(|| {
            let mut ret = Variant::Nil;
            unsafe { raw_only.validated_call(None, &[black_box(&a), black_box(&b)], &mut ret) };
            black_box(ret)
        })
    });

    group.bench_function("raw", |bencher| {
        let (x, y) = (6i64, 7i64);
        bencher.iter(|| {
            let mut ret = 0i64;
            let args = [arg_ptr(black_box(&x)), arg_ptr(black_box(&y))];
            unsafe { bind.ptrcall(None, &args, ret_ptr(&mut ret)) };
            black_box(ret)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_call_paths);
criterion_main!(benches);
