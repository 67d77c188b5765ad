//! Cache Value Module
//!
//! Dynamically typed payload stored in an entry. Numeric variants support
//! fixed-width arithmetic; everything else is carried opaquely.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// == Value ==
/// A value held by the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    #[serde(with = "float_repr::single")]
    F32(f32),
    #[serde(with = "float_repr::double")]
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// Structured data that survives a round trip through a remote store
    Json(serde_json::Value),
    /// Arbitrary shared object. Only usable with in-memory storage.
    #[serde(skip)]
    Object(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps an arbitrary object.
    pub fn object<T: Any + Send + Sync>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Returns the wrapped object if this is an `Object` of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns true for the integer and floating-point variants.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::I8(_)
                | Value::I16(_)
                | Value::I32(_)
                | Value::I64(_)
                | Value::Isize(_)
                | Value::U8(_)
                | Value::U16(_)
                | Value::U32(_)
                | Value::U64(_)
                | Value::Usize(_)
                | Value::F32(_)
                | Value::F64(_)
        )
    }

    /// Converts the payload to JSON. Returns None for opaque objects.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        let json = match self {
            Value::I8(v) => serde_json::Value::from(*v),
            Value::I16(v) => serde_json::Value::from(*v),
            Value::I32(v) => serde_json::Value::from(*v),
            Value::I64(v) => serde_json::Value::from(*v),
            Value::Isize(v) => serde_json::Value::from(*v),
            Value::U8(v) => serde_json::Value::from(*v),
            Value::U16(v) => serde_json::Value::from(*v),
            Value::U32(v) => serde_json::Value::from(*v),
            Value::U64(v) => serde_json::Value::from(*v),
            Value::Usize(v) => serde_json::Value::from(*v),
            Value::F32(v) => serde_json::Value::from(*v),
            Value::F64(v) => serde_json::Value::from(*v),
            Value::Bool(v) => serde_json::Value::from(*v),
            Value::Str(v) => serde_json::Value::from(v.as_str()),
            Value::Bytes(v) => serde_json::Value::from(v.clone()),
            Value::Json(v) => v.clone(),
            Value::Object(_) => return None,
        };
        Some(json)
    }

    // == Untyped Arithmetic ==
    /// Applies `n` to a numeric value using the stored type's own width.
    ///
    /// `n` is truncated to the stored width first, so an `I8` holding 127
    /// incremented by 1 wraps to -128. Returns None for non-numeric values.
    pub(crate) fn offset(&self, n: i64, delta: Delta) -> Option<Value> {
        let next = match self {
            Value::I8(v) => Value::I8(delta.apply(*v, n as i8)),
            Value::I16(v) => Value::I16(delta.apply(*v, n as i16)),
            Value::I32(v) => Value::I32(delta.apply(*v, n as i32)),
            Value::I64(v) => Value::I64(delta.apply(*v, n)),
            Value::Isize(v) => Value::Isize(delta.apply(*v, n as isize)),
            Value::U8(v) => Value::U8(delta.apply(*v, n as u8)),
            Value::U16(v) => Value::U16(delta.apply(*v, n as u16)),
            Value::U32(v) => Value::U32(delta.apply(*v, n as u32)),
            Value::U64(v) => Value::U64(delta.apply(*v, n as u64)),
            Value::Usize(v) => Value::Usize(delta.apply(*v, n as usize)),
            Value::F32(v) => Value::F32(delta.apply(*v, n as f32)),
            Value::F64(v) => Value::F64(delta.apply(*v, n as f64)),
            _ => return None,
        };
        Some(next)
    }

    /// Applies a float `n` to an `F32` or `F64` value.
    pub(crate) fn offset_float(&self, n: f64, delta: Delta) -> Option<Value> {
        match self {
            Value::F32(v) => Some(Value::F32(delta.apply(*v, n as f32))),
            Value::F64(v) => Some(Value::F64(delta.apply(*v, n))),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::Isize(a), Value::Isize(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::Usize(a), Value::Usize(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

// == Delta ==
/// Direction of an arithmetic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delta {
    Increment,
    Decrement,
}

impl Delta {
    pub(crate) fn apply<T: Numeric>(self, current: T, n: T) -> T {
        match self {
            Delta::Increment => current.add_wrapping(n),
            Delta::Decrement => current.sub_wrapping(n),
        }
    }
}

// == Numeric ==
/// A primitive with a dedicated `Value` variant and fixed-width arithmetic.
///
/// Integers wrap on overflow; floats use plain IEEE arithmetic.
pub trait Numeric: Copy + Send + Sync + 'static {
    /// Human readable type name used in mismatch errors.
    const KIND: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
    fn add_wrapping(self, rhs: Self) -> Self;
    fn sub_wrapping(self, rhs: Self) -> Self;
}

macro_rules! numeric_int {
    ($($ty:ty => $variant:ident, $kind:literal;)*) => {
        $(
            impl Numeric for $ty {
                const KIND: &'static str = $kind;

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn add_wrapping(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }

                fn sub_wrapping(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

macro_rules! numeric_float {
    ($($ty:ty => $variant:ident, $kind:literal;)*) => {
        $(
            impl Numeric for $ty {
                const KIND: &'static str = $kind;

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn add_wrapping(self, rhs: Self) -> Self {
                    self + rhs
                }

                fn sub_wrapping(self, rhs: Self) -> Self {
                    self - rhs
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

numeric_int! {
    i8 => I8, "an i8";
    i16 => I16, "an i16";
    i32 => I32, "an i32";
    i64 => I64, "an i64";
    isize => Isize, "an isize";
    u8 => U8, "a u8";
    u16 => U16, "a u16";
    u32 => U32, "a u32";
    u64 => U64, "a u64";
    usize => Usize, "a usize";
}

numeric_float! {
    f32 => F32, "an f32";
    f64 => F64, "an f64";
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// == Float Encoding ==
/// Floats are written as numbers when finite and as `"inf"`, `"-inf"` or
/// `"NaN"` otherwise. JSON has no literal for non-finite values.
mod float_repr {
    macro_rules! float_repr {
        ($module:ident, $name:ident, $serialize:ident) => {
            pub mod $module {
                use std::fmt;

                use serde::de::{self, Visitor};
                use serde::{Deserializer, Serializer};

                pub fn serialize<S: Serializer>(
                    v: &$name,
                    serializer: S,
                ) -> Result<S::Ok, S::Error> {
                    if v.is_finite() {
                        serializer.$serialize(*v)
                    } else if v.is_nan() {
                        serializer.serialize_str("NaN")
                    } else if v.is_sign_positive() {
                        serializer.serialize_str("inf")
                    } else {
                        serializer.serialize_str("-inf")
                    }
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(
                    deserializer: D,
                ) -> Result<$name, D::Error> {
                    deserializer.deserialize_any(FloatVisitor)
                }

                struct FloatVisitor;

                impl<'de> Visitor<'de> for FloatVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a number or one of \"inf\", \"-inf\", \"NaN\"")
                    }

                    fn visit_f64<E: de::Error>(self, v: f64) -> Result<$name, E> {
                        Ok(v as $name)
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<$name, E> {
                        Ok(v as $name)
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<$name, E> {
                        Ok(v as $name)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$name, E> {
                        match v {
                            "inf" => Ok($name::INFINITY),
                            "-inf" => Ok($name::NEG_INFINITY),
                            "NaN" => Ok($name::NAN),
                            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                        }
                    }
                }
            }
        };
    }

    float_repr!(single, f32, serialize_f32);
    float_repr!(double, f64, serialize_f64);
}
