use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Scalar element type of a [`Tensor`](crate::Tensor).
/// Implemented for `f32` and `f64`.
pub trait Float:
    Copy
    + Default
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + Sum
    + Serialize
    + for<'de> Deserialize<'de>
    + 'static
{
    const ZERO: Self;
    const ONE: Self;
    const EPSILON: Self;
    const NEG_INFINITY: Self;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    fn from_usize(v: usize) -> Self;

    fn abs(self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn powf(self, n: Self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
    fn is_nan(self) -> bool;
    fn is_finite(self) -> bool;
}

macro_rules! impl_float {
    ($t:ident) => {
        impl Float for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;
            const EPSILON: Self = $t::EPSILON;
            const NEG_INFINITY: Self = $t::NEG_INFINITY;

            #[inline] fn from_f64(v: f64) -> Self { v as $t }
            #[inline] fn to_f64(self) -> f64 { self as f64 }
            #[inline] fn from_usize(v: usize) -> Self { v as $t }
            #[inline] fn abs(self) -> Self { $t::abs(self) }
            #[inline] fn sqrt(self) -> Self { $t::sqrt(self) }
            #[inline] fn exp(self) -> Self { $t::exp(self) }
            #[inline] fn ln(self) -> Self { $t::ln(self) }
            #[inline] fn powf(self, n: Self) -> Self { $t::powf(self, n) }
            #[inline] fn sin(self) -> Self { $t::sin(self) }
            #[inline] fn cos(self) -> Self { $t::cos(self) }
            #[inline] fn max(self, other: Self) -> Self { $t::max(self, other) }
            #[inline] fn min(self, other: Self) -> Self { $t::min(self, other) }
            #[inline] fn is_nan(self) -> bool { $t::is_nan(self) }
            #[inline] fn is_finite(self) -> bool { $t::is_finite(self) }
        }
    };
}

impl_float!(f32);
impl_float!(f64);
