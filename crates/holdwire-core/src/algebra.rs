#![forbid(unsafe_code)]

//! Numeric and boolean operator algebra over holders.
//!
//! Each numeric kind implements one fixed operation table, [`Numeric`], so
//! kind-specific semantics stay next to the kind:
//!
//! | op | Int / Long | Float / Double |
//! |---|---|---|
//! | add, sub, mult | wrapping fixed-width | IEEE 754 |
//! | div | truncating; zero divisor is [`ArithmeticError::DivideByZero`] | IEEE 754 (±inf, NaN) |
//! | rem | zero divisor is [`ArithmeticError::RemainderByZero`] | IEEE 754 |
//! | gt, ge, lt, le, eq, ne | native ordering | IEEE 754 (NaN compares false except `ne`) |
//!
//! Operator holders are ordinary derived holders: "holder op holder" is a
//! two-source combine and "holder op constant" is a map closing over the
//! constant. Integer faults land on the derived holder as
//! [`HolderError::Arithmetic`]; floating-point operations never fault.
//!
//! `ceil` and `floor` convert Float/Double to Int: `ceil(x)` is the least
//! integer ≥ x and `floor(x)` the greatest integer ≤ x (not truncation).

use std::fmt;

use crate::combine::{combine2, map, try_combine2, try_map};
use crate::error::{ArithmeticError, HolderError};
use crate::holder::Holder;

/// Tag naming a numeric kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 float.
    Double,
}

impl NumericKind {
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Long)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-kind arithmetic table. Comparisons come from `PartialOrd`, which
/// already gives native integer ordering and IEEE 754 float ordering.
pub trait Numeric: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const KIND: NumericKind;

    fn plus(self, rhs: Self) -> Self;
    fn minus(self, rhs: Self) -> Self;
    fn times(self, rhs: Self) -> Self;
    fn divide(self, rhs: Self) -> Result<Self, ArithmeticError>;
    fn remainder(self, rhs: Self) -> Result<Self, ArithmeticError>;
}

macro_rules! impl_integer {
    ($ty:ty, $kind:ident) => {
        impl Numeric for $ty {
            const KIND: NumericKind = NumericKind::$kind;

            fn plus(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            fn minus(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }

            fn times(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            fn divide(self, rhs: Self) -> Result<Self, ArithmeticError> {
                if rhs == 0 {
                    return Err(ArithmeticError::DivideByZero);
                }
                // MIN / -1 wraps to MIN.
                Ok(self.wrapping_div(rhs))
            }

            fn remainder(self, rhs: Self) -> Result<Self, ArithmeticError> {
                if rhs == 0 {
                    return Err(ArithmeticError::RemainderByZero);
                }
                Ok(self.wrapping_rem(rhs))
            }
        }
    };
}

macro_rules! impl_float {
    ($ty:ty, $kind:ident) => {
        impl Numeric for $ty {
            const KIND: NumericKind = NumericKind::$kind;

            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            fn minus(self, rhs: Self) -> Self {
                self - rhs
            }

            fn times(self, rhs: Self) -> Self {
                self * rhs
            }

            fn divide(self, rhs: Self) -> Result<Self, ArithmeticError> {
                Ok(self / rhs)
            }

            fn remainder(self, rhs: Self) -> Result<Self, ArithmeticError> {
                Ok(self % rhs)
            }
        }

        impl FloatNumeric for $ty {
            fn ceil_to_int(self) -> Result<i32, ArithmeticError> {
                to_int(f64::from(self.ceil()))
            }

            fn floor_to_int(self) -> Result<i32, ArithmeticError> {
                to_int(f64::from(self.floor()))
            }
        }
    };
}

/// Float kinds that round to Int.
pub trait FloatNumeric: Numeric {
    /// Least integer ≥ `self`.
    fn ceil_to_int(self) -> Result<i32, ArithmeticError>;
    /// Greatest integer ≤ `self`.
    fn floor_to_int(self) -> Result<i32, ArithmeticError>;
}

fn to_int(rounded: f64) -> Result<i32, ArithmeticError> {
    if rounded.is_finite() && rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
        Ok(rounded as i32)
    } else {
        Err(ArithmeticError::NotRepresentable { value: rounded })
    }
}

impl_integer!(i32, Int);
impl_integer!(i64, Long);
impl_float!(f32, Float);
impl_float!(f64, Double);

fn derive_binary<T, U>(
    op: &'static str,
    lhs: &Holder<T>,
    rhs: &Holder<T>,
    f: impl Fn(T, T) -> Result<U, ArithmeticError> + Send + Sync + 'static,
) -> Holder<U>
where
    T: Numeric,
    U: Clone + Send + Sync + 'static,
{
    tracing::trace!(
        message = "algebra.derive",
        op,
        kind = T::KIND.as_str(),
        lhs = lhs.id().raw(),
        rhs = rhs.id().raw()
    );
    try_combine2(lhs, rhs, move |a: &T, b: &T| f(*a, *b).map_err(HolderError::from))
}

fn derive_const<T, U>(
    op: &'static str,
    lhs: &Holder<T>,
    rhs: T,
    f: impl Fn(T, T) -> Result<U, ArithmeticError> + Send + Sync + 'static,
) -> Holder<U>
where
    T: Numeric,
    U: Clone + Send + Sync + 'static,
{
    tracing::trace!(
        message = "algebra.derive",
        op,
        kind = T::KIND.as_str(),
        lhs = lhs.id().raw(),
        rhs = ?rhs
    );
    try_map(lhs, move |a: &T| f(*a, rhs).map_err(HolderError::from))
}

/// Arithmetic and comparison operators on numeric holders.
///
/// Every method returns a new derived holder; `*_const` forms close over a
/// constant right-hand side.
pub trait NumericHolderExt<T: Numeric> {
    fn add(&self, rhs: &Holder<T>) -> Holder<T>;
    fn add_const(&self, rhs: T) -> Holder<T>;
    fn sub(&self, rhs: &Holder<T>) -> Holder<T>;
    fn sub_const(&self, rhs: T) -> Holder<T>;
    fn mult(&self, rhs: &Holder<T>) -> Holder<T>;
    fn mult_const(&self, rhs: T) -> Holder<T>;
    fn div(&self, rhs: &Holder<T>) -> Holder<T>;
    fn div_const(&self, rhs: T) -> Holder<T>;
    fn rem(&self, rhs: &Holder<T>) -> Holder<T>;
    fn rem_const(&self, rhs: T) -> Holder<T>;

    fn gt(&self, rhs: &Holder<T>) -> Holder<bool>;
    fn gt_const(&self, rhs: T) -> Holder<bool>;
    fn ge(&self, rhs: &Holder<T>) -> Holder<bool>;
    fn ge_const(&self, rhs: T) -> Holder<bool>;
    fn lt(&self, rhs: &Holder<T>) -> Holder<bool>;
    fn lt_const(&self, rhs: T) -> Holder<bool>;
    fn le(&self, rhs: &Holder<T>) -> Holder<bool>;
    fn le_const(&self, rhs: T) -> Holder<bool>;
    fn eq(&self, rhs: &Holder<T>) -> Holder<bool>;
    fn eq_const(&self, rhs: T) -> Holder<bool>;
    fn ne(&self, rhs: &Holder<T>) -> Holder<bool>;
    fn ne_const(&self, rhs: T) -> Holder<bool>;
}

impl<T: Numeric> NumericHolderExt<T> for Holder<T> {
    fn add(&self, rhs: &Holder<T>) -> Holder<T> {
        derive_binary("add", self, rhs, |a, b| Ok(a.plus(b)))
    }

    fn add_const(&self, rhs: T) -> Holder<T> {
        derive_const("add", self, rhs, |a, b| Ok(a.plus(b)))
    }

    fn sub(&self, rhs: &Holder<T>) -> Holder<T> {
        derive_binary("sub", self, rhs, |a, b| Ok(a.minus(b)))
    }

    fn sub_const(&self, rhs: T) -> Holder<T> {
        derive_const("sub", self, rhs, |a, b| Ok(a.minus(b)))
    }

    fn mult(&self, rhs: &Holder<T>) -> Holder<T> {
        derive_binary("mult", self, rhs, |a, b| Ok(a.times(b)))
    }

    fn mult_const(&self, rhs: T) -> Holder<T> {
        derive_const("mult", self, rhs, |a, b| Ok(a.times(b)))
    }

    fn div(&self, rhs: &Holder<T>) -> Holder<T> {
        derive_binary("div", self, rhs, T::divide)
    }

    fn div_const(&self, rhs: T) -> Holder<T> {
        derive_const("div", self, rhs, T::divide)
    }

    fn rem(&self, rhs: &Holder<T>) -> Holder<T> {
        derive_binary("rem", self, rhs, T::remainder)
    }

    fn rem_const(&self, rhs: T) -> Holder<T> {
        derive_const("rem", self, rhs, T::remainder)
    }

    fn gt(&self, rhs: &Holder<T>) -> Holder<bool> {
        derive_binary("gt", self, rhs, |a, b| Ok(a > b))
    }

    fn gt_const(&self, rhs: T) -> Holder<bool> {
        derive_const("gt", self, rhs, |a, b| Ok(a > b))
    }

    fn ge(&self, rhs: &Holder<T>) -> Holder<bool> {
        derive_binary("ge", self, rhs, |a, b| Ok(a >= b))
    }

    fn ge_const(&self, rhs: T) -> Holder<bool> {
        derive_const("ge", self, rhs, |a, b| Ok(a >= b))
    }

    fn lt(&self, rhs: &Holder<T>) -> Holder<bool> {
        derive_binary("lt", self, rhs, |a, b| Ok(a < b))
    }

    fn lt_const(&self, rhs: T) -> Holder<bool> {
        derive_const("lt", self, rhs, |a, b| Ok(a < b))
    }

    fn le(&self, rhs: &Holder<T>) -> Holder<bool> {
        derive_binary("le", self, rhs, |a, b| Ok(a <= b))
    }

    fn le_const(&self, rhs: T) -> Holder<bool> {
        derive_const("le", self, rhs, |a, b| Ok(a <= b))
    }

    fn eq(&self, rhs: &Holder<T>) -> Holder<bool> {
        derive_binary("eq", self, rhs, |a, b| Ok(a == b))
    }

    fn eq_const(&self, rhs: T) -> Holder<bool> {
        derive_const("eq", self, rhs, |a, b| Ok(a == b))
    }

    fn ne(&self, rhs: &Holder<T>) -> Holder<bool> {
        derive_binary("ne", self, rhs, |a, b| Ok(a != b))
    }

    fn ne_const(&self, rhs: T) -> Holder<bool> {
        derive_const("ne", self, rhs, |a, b| Ok(a != b))
    }
}

/// Rounding conversions from Float/Double holders to Int holders.
pub trait FloatHolderExt {
    /// Least integer ≥ the source value, recomputed on every update.
    fn ceil(&self) -> Holder<i32>;
    /// Greatest integer ≤ the source value, recomputed on every update.
    fn floor(&self) -> Holder<i32>;
}

impl<T: FloatNumeric> FloatHolderExt for Holder<T> {
    fn ceil(&self) -> Holder<i32> {
        try_map(self, |v: &T| v.ceil_to_int().map_err(HolderError::from))
    }

    fn floor(&self) -> Holder<i32> {
        try_map(self, |v: &T| v.floor_to_int().map_err(HolderError::from))
    }
}

/// Logical operators on boolean holders.
pub trait BoolHolderExt {
    fn and(&self, rhs: &Holder<bool>) -> Holder<bool>;
    fn and_const(&self, rhs: bool) -> Holder<bool>;
    fn or(&self, rhs: &Holder<bool>) -> Holder<bool>;
    fn or_const(&self, rhs: bool) -> Holder<bool>;
    fn xor(&self, rhs: &Holder<bool>) -> Holder<bool>;
    fn xor_const(&self, rhs: bool) -> Holder<bool>;
    fn not(&self) -> Holder<bool>;
}

impl BoolHolderExt for Holder<bool> {
    fn and(&self, rhs: &Holder<bool>) -> Holder<bool> {
        combine2(self, rhs, |a: &bool, b: &bool| *a && *b)
    }

    fn and_const(&self, rhs: bool) -> Holder<bool> {
        map(self, move |a: &bool| *a && rhs)
    }

    fn or(&self, rhs: &Holder<bool>) -> Holder<bool> {
        combine2(self, rhs, |a: &bool, b: &bool| *a || *b)
    }

    fn or_const(&self, rhs: bool) -> Holder<bool> {
        map(self, move |a: &bool| *a || rhs)
    }

    fn xor(&self, rhs: &Holder<bool>) -> Holder<bool> {
        combine2(self, rhs, |a: &bool, b: &bool| *a ^ *b)
    }

    fn xor_const(&self, rhs: bool) -> Holder<bool> {
        map(self, move |a: &bool| *a ^ rhs)
    }

    fn not(&self) -> Holder<bool> {
        map(self, |a: &bool| !*a)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::RwHolder;

    #[test]
    fn integer_table() {
        assert_eq!(7i32.plus(5), 12);
        assert_eq!(7i32.minus(9), -2);
        assert_eq!(i32::MAX.plus(1), i32::MIN);
        assert_eq!(i64::MAX.times(2), -2);
        assert_eq!(7i32.divide(2), Ok(3));
        assert_eq!((-7i32).divide(2), Ok(-3));
        assert_eq!(i32::MIN.divide(-1), Ok(i32::MIN));
        assert_eq!(7i32.divide(0), Err(ArithmeticError::DivideByZero));
        assert_eq!(7i64.remainder(0), Err(ArithmeticError::RemainderByZero));
        assert_eq!((-7i32).remainder(3), Ok(-1));
    }

    #[test]
    fn float_table_never_faults() {
        assert_eq!(1.0f64.divide(0.0), Ok(f64::INFINITY));
        assert_eq!((-1.0f32).divide(0.0), Ok(f32::NEG_INFINITY));
        assert!(0.0f64.divide(0.0).unwrap().is_nan());
        assert!(1.0f64.remainder(0.0).unwrap().is_nan());
        assert_eq!(0.5f32.plus(0.25), 0.75);
    }

    #[test]
    fn rounding_is_not_truncation() {
        assert_eq!(2.3f64.ceil_to_int(), Ok(3));
        assert_eq!(2.7f64.floor_to_int(), Ok(2));
        assert_eq!((-2.3f64).ceil_to_int(), Ok(-2));
        assert_eq!((-2.7f64).floor_to_int(), Ok(-3));
        assert_eq!((-2.7f32).floor_to_int(), Ok(-3));
        assert_eq!(4.0f32.ceil_to_int(), Ok(4));
    }

    #[test]
    fn rounding_out_of_range_is_not_representable() {
        assert!(matches!(
            f64::NAN.ceil_to_int(),
            Err(ArithmeticError::NotRepresentable { .. })
        ));
        assert!(matches!(
            f64::INFINITY.floor_to_int(),
            Err(ArithmeticError::NotRepresentable { .. })
        ));
        assert_eq!(
            3.0e9f64.floor_to_int(),
            Err(ArithmeticError::NotRepresentable { value: 3.0e9 })
        );
        assert_eq!((-2147483648.5f64).ceil_to_int(), Ok(i32::MIN));
    }

    #[test]
    fn kind_tags() {
        assert_eq!(<i32 as Numeric>::KIND, NumericKind::Int);
        assert_eq!(<i64 as Numeric>::KIND, NumericKind::Long);
        assert_eq!(<f32 as Numeric>::KIND, NumericKind::Float);
        assert_eq!(<f64 as Numeric>::KIND, NumericKind::Double);
        assert!(NumericKind::Long.is_integer());
        assert!(!NumericKind::Double.is_integer());
        assert_eq!(NumericKind::Double.to_string(), "double");
    }

    #[test]
    fn holder_add_recomputes() {
        let a = RwHolder::<i32>::new();
        let b = RwHolder::<i32>::new();
        let sum = a.add(&b);
        a.set(3);
        b.set(4);
        assert_eq!(sum.get(), Some(7));
        a.set(5);
        assert_eq!(sum.get(), Some(9));
    }

    #[test]
    fn holder_const_ops() {
        let a = RwHolder::with_value(10i64);
        assert_eq!(a.add_const(5).get(), Some(15));
        assert_eq!(a.sub_const(15).get(), Some(-5));
        assert_eq!(a.mult_const(3).get(), Some(30));
        assert_eq!(a.div_const(4).get(), Some(2));
        assert_eq!(a.rem_const(4).get(), Some(2));
        assert_eq!(a.gt_const(9).get(), Some(true));
        assert_eq!(a.ge_const(10).get(), Some(true));
        assert_eq!(a.lt_const(10).get(), Some(false));
        assert_eq!(a.le_const(10).get(), Some(true));
        assert_eq!(a.eq_const(10).get(), Some(true));
        assert_eq!(a.ne_const(10).get(), Some(false));
    }

    #[test]
    fn integer_div_by_zero_faults_holder() {
        let x = RwHolder::with_value(8i32);
        let zero = RwHolder::with_value(0i32);
        let q = x.div(&zero);
        assert_eq!(
            q.error(),
            Some(HolderError::Arithmetic(ArithmeticError::DivideByZero))
        );
        assert!(!q.is_available());

        zero.set(2);
        assert_eq!(q.outcome(), Some(Ok(4)));
    }

    #[test]
    fn float_div_by_zero_yields_infinity() {
        let x = RwHolder::with_value(1.0f64);
        let q = x.div_const(0.0);
        assert_eq!(q.get(), Some(f64::INFINITY));
        assert!(!q.is_failed());
    }

    #[test]
    fn nan_comparisons_follow_ieee() {
        let nan = RwHolder::with_value(f64::NAN);
        let one = RwHolder::with_value(1.0f64);
        assert_eq!(nan.gt(&one).get(), Some(false));
        assert_eq!(nan.ge(&one).get(), Some(false));
        assert_eq!(nan.lt(&one).get(), Some(false));
        assert_eq!(nan.le(&one).get(), Some(false));
        assert_eq!(nan.eq(&nan).get(), Some(false));
        assert_eq!(nan.ne(&nan).get(), Some(true));
    }

    #[test]
    fn comparison_holders_follow_sources() {
        let a = RwHolder::<f32>::new();
        let b = RwHolder::<f32>::new();
        let bigger = a.gt(&b);
        a.set(2.5f32);
        b.set(1.0f32);
        assert_eq!(bigger.get(), Some(true));
        b.set(3.0);
        assert_eq!(bigger.get(), Some(false));
    }

    #[test]
    fn ceil_and_floor_holders() {
        let x = RwHolder::<f64>::new();
        let up = x.ceil();
        let down = x.floor();
        x.set(2.3f64);
        assert_eq!(up.get(), Some(3));
        assert_eq!(down.get(), Some(2));
        x.set(-2.7);
        assert_eq!(up.get(), Some(-2));
        assert_eq!(down.get(), Some(-3));
        x.set(f64::NAN);
        assert!(up.is_failed());
        assert_eq!(up.get(), Some(-2), "last good value kept");
    }

    #[test]
    fn boolean_algebra() {
        let a = RwHolder::with_value(false);
        let b = RwHolder::with_value(true);
        assert_eq!(a.xor(&b).get(), Some(true));
        assert_eq!(a.and(&b).get(), Some(false));
        assert_eq!(a.or(&b).get(), Some(true));
        assert_eq!(a.not().get(), Some(true));
        assert_eq!(b.and_const(true).get(), Some(true));
        assert_eq!(a.or_const(false).get(), Some(false));
        assert_eq!(b.xor_const(true).get(), Some(false));
    }

    #[test]
    fn boolean_holders_recompute() {
        let a = RwHolder::<bool>::new();
        let b = RwHolder::<bool>::new();
        let both = a.and(&b);
        a.set(true);
        b.set(true);
        assert_eq!(both.get(), Some(true));
        b.set(false);
        assert_eq!(both.get(), Some(false));
    }
}
