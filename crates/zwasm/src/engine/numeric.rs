//! Floating-point helpers the dispatch loop needs beyond what `core`
//! exposes without `std` (rounding, `sqrt`, `min`/`max` with Wasm's NaN/
//! signed-zero rules, and the `trunc`/`trunc_sat` conversion families).
//!
//! `libm` backs everything that needs an actual transcendental/rounding
//! routine; `abs`/`copysign`/`is_nan` are plain bit tests `core` already
//! provides on both `std` and `no_std` builds.

use zwasm_core::TrapCode;

pub fn f32_min(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() || b.is_sign_negative() { -0.0 } else { 0.0 }
    } else {
        a.min(b)
    }
}

pub fn f32_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() && b.is_sign_negative() { -0.0 } else { 0.0 }
    } else {
        a.max(b)
    }
}

pub fn f64_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() || b.is_sign_negative() { -0.0 } else { 0.0 }
    } else {
        a.min(b)
    }
}

pub fn f64_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() && b.is_sign_negative() { -0.0 } else { 0.0 }
    } else {
        a.max(b)
    }
}

pub fn f32_sqrt(a: f32) -> f32 {
    libm::sqrtf(a)
}

pub fn f64_sqrt(a: f64) -> f64 {
    libm::sqrt(a)
}

pub fn f32_ceil(a: f32) -> f32 {
    libm::ceilf(a)
}

pub fn f32_floor(a: f32) -> f32 {
    libm::floorf(a)
}

pub fn f32_trunc(a: f32) -> f32 {
    libm::truncf(a)
}

pub fn f32_nearest(a: f32) -> f32 {
    libm::rintf(a)
}

pub fn f64_ceil(a: f64) -> f64 {
    libm::ceil(a)
}

pub fn f64_floor(a: f64) -> f64 {
    libm::floor(a)
}

pub fn f64_trunc(a: f64) -> f64 {
    libm::trunc(a)
}

pub fn f64_nearest(a: f64) -> f64 {
    libm::rint(a)
}

macro_rules! trunc_fn {
    ($name:ident, $src:ty, $dst:ty, $min:expr, $max:expr) => {
        pub fn $name(v: $src) -> Result<$dst, TrapCode> {
            if v.is_nan() {
                return Err(TrapCode::InvalidConversion);
            }
            if v < $min || v >= $max {
                return Err(TrapCode::InvalidConversion);
            }
            Ok(v as $dst)
        }
    };
}

trunc_fn!(i32_trunc_f32_s, f32, i32, -2147483648.0f32, 2147483648.0f32);
trunc_fn!(i32_trunc_f32_u, f32, u32, 0.0f32, 4294967296.0f32);
trunc_fn!(i32_trunc_f64_s, f64, i32, -2147483648.0f64, 2147483648.0f64);
trunc_fn!(i32_trunc_f64_u, f64, u32, 0.0f64, 4294967296.0f64);
trunc_fn!(i64_trunc_f32_s, f32, i64, -9223372036854775808.0f32, 9223372036854775808.0f32);
trunc_fn!(i64_trunc_f32_u, f32, u64, 0.0f32, 18446744073709551616.0f32);
trunc_fn!(i64_trunc_f64_s, f64, i64, -9223372036854775808.0f64, 9223372036854775808.0f64);
trunc_fn!(i64_trunc_f64_u, f64, u64, 0.0f64, 18446744073709551616.0f64);

macro_rules! trunc_sat_fn {
    ($name:ident, $src:ty, $dst:ty, $min:expr, $max:expr) => {
        pub fn $name(v: $src) -> $dst {
            if v.is_nan() {
                0 as $dst
            } else if v < $min {
                <$dst>::MIN
            } else if v >= $max {
                <$dst>::MAX
            } else {
                v as $dst
            }
        }
    };
}

trunc_sat_fn!(i32_trunc_sat_f32_s, f32, i32, -2147483648.0f32, 2147483648.0f32);
trunc_sat_fn!(i32_trunc_sat_f32_u, f32, u32, 0.0f32, 4294967296.0f32);
trunc_sat_fn!(i32_trunc_sat_f64_s, f64, i32, -2147483648.0f64, 2147483648.0f64);
trunc_sat_fn!(i32_trunc_sat_f64_u, f64, u32, 0.0f64, 4294967296.0f64);
trunc_sat_fn!(i64_trunc_sat_f32_s, f32, i64, -9223372036854775808.0f32, 9223372036854775808.0f32);
trunc_sat_fn!(i64_trunc_sat_f32_u, f32, u64, 0.0f32, 18446744073709551616.0f32);
trunc_sat_fn!(i64_trunc_sat_f64_s, f64, i64, -9223372036854775808.0f64, 9223372036854775808.0f64);
trunc_sat_fn!(i64_trunc_sat_f64_u, f64, u64, 0.0f64, 18446744073709551616.0f64);
