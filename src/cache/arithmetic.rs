//! Arithmetic Module
//!
//! In-place increment and decrement of numeric values. Every operation is a
//! single critical section under the storage's exclusive lock and keeps the
//! entry's expiration and refresh deadline.

use crate::cache::value::{Delta, Numeric};
use crate::cache::Cache;
use crate::error::{CacheError, Result};

impl Cache {
    // == Untyped ==
    /// Adds `n` to a numeric value of any width.
    ///
    /// `n` is truncated to the stored type and the sum wraps on overflow, so
    /// an `i8` holding 127 becomes -128 after `increment(key, 1)`. Use one of
    /// the typed variants (e.g. `increment_i64`) to get the new value back.
    pub async fn increment(&self, key: &str, n: i64) -> Result<()> {
        self.apply_untyped(key, n, Delta::Increment).await
    }

    /// Subtracts `n` from a numeric value of any width. See `increment`.
    pub async fn decrement(&self, key: &str, n: i64) -> Result<()> {
        self.apply_untyped(key, n, Delta::Decrement).await
    }

    /// Adds `n` to an `f32` or `f64` value.
    pub async fn increment_float(&self, key: &str, n: f64) -> Result<()> {
        self.apply_float(key, n, Delta::Increment).await
    }

    /// Subtracts `n` from an `f32` or `f64` value.
    pub async fn decrement_float(&self, key: &str, n: f64) -> Result<()> {
        self.apply_float(key, n, Delta::Decrement).await
    }

    // == Typed ==
    /// Adds `n` to a value stored with exactly type `T` and returns the result.
    pub async fn increment_by<T: Numeric>(&self, key: &str, n: T) -> Result<T> {
        self.apply_typed(key, n, Delta::Increment).await
    }

    /// Subtracts `n` from a value stored with exactly type `T` and returns
    /// the result.
    pub async fn decrement_by<T: Numeric>(&self, key: &str, n: T) -> Result<T> {
        self.apply_typed(key, n, Delta::Decrement).await
    }

    async fn apply_untyped(&self, key: &str, n: i64, delta: Delta) -> Result<()> {
        self.update_live(key, move |value| {
            let next = value
                .offset(n, delta)
                .ok_or_else(|| CacheError::type_mismatch(key, "an integer"))?;
            Ok((next, ()))
        })
        .await
    }

    async fn apply_float(&self, key: &str, n: f64, delta: Delta) -> Result<()> {
        self.update_live(key, move |value| {
            let next = value
                .offset_float(n, delta)
                .ok_or_else(|| CacheError::type_mismatch(key, "an f32 or f64"))?;
            Ok((next, ()))
        })
        .await
    }

    async fn apply_typed<T: Numeric>(&self, key: &str, n: T, delta: Delta) -> Result<T> {
        self.update_live(key, move |value| {
            let current =
                T::from_value(value).ok_or_else(|| CacheError::type_mismatch(key, T::KIND))?;
            let next = delta.apply(current, n);
            Ok((next.into_value(), next))
        })
        .await
    }
}

macro_rules! typed_arithmetic {
    ($($ty:ty => $increment:ident, $decrement:ident;)*) => {
        impl Cache {
            $(
                #[doc = concat!("Adds `n` to a `", stringify!($ty), "` value and returns the result.")]
                pub async fn $increment(&self, key: &str, n: $ty) -> Result<$ty> {
                    self.apply_typed(key, n, Delta::Increment).await
                }

                #[doc = concat!("Subtracts `n` from a `", stringify!($ty), "` value and returns the result.")]
                pub async fn $decrement(&self, key: &str, n: $ty) -> Result<$ty> {
                    self.apply_typed(key, n, Delta::Decrement).await
                }
            )*
        }
    };
}

typed_arithmetic! {
    isize => increment_isize, decrement_isize;
    i8 => increment_i8, decrement_i8;
    i16 => increment_i16, decrement_i16;
    i32 => increment_i32, decrement_i32;
    i64 => increment_i64, decrement_i64;
    usize => increment_usize, decrement_usize;
    u8 => increment_u8, decrement_u8;
    u16 => increment_u16, decrement_u16;
    u32 => increment_u32, decrement_u32;
    u64 => increment_u64, decrement_u64;
    f32 => increment_f32, decrement_f32;
    f64 => increment_f64, decrement_f64;
}
