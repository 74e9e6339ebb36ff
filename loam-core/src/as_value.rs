use crate::{Error, Result, Value};
use rust_decimal::Decimal;
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Conversion between native field types and [`Value`]. Field accessors are
/// built on top of this so the engine never touches a concrete field type
/// directly.
pub trait AsValue: Sized + Send + Sync + 'static {
    fn as_value(&self) -> Value;
    /// Typed null of this type's storage variant.
    fn null_value() -> Value;
    fn try_from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value) -> Result<T> {
    Err(Error::Conversion(format!(
        "cannot read {} out of {:?}",
        std::any::type_name::<T>(),
        value
    )))
}

macro_rules! impl_as_value_integer {
    ($native:ty, $variant:ident) => {
        impl AsValue for $native {
            fn as_value(&self) -> Value {
                Value::$variant(Some(*self))
            }
            fn null_value() -> Value {
                Value::$variant(None)
            }
            fn try_from_value(value: Value) -> Result<Self> {
                let wide = match value.as_integer() {
                    Some(v) => v,
                    None => return mismatch(&value),
                };
                <$native>::try_from(wide).map_err(|_| {
                    Error::Conversion(format!(
                        "{} is out of range for {}",
                        wide,
                        std::any::type_name::<$native>()
                    ))
                })
            }
        }
    };
}

macro_rules! impl_as_value_simple {
    ($native:ty, $variant:ident) => {
        impl AsValue for $native {
            fn as_value(&self) -> Value {
                Value::$variant(Some(self.clone()))
            }
            fn null_value() -> Value {
                Value::$variant(None)
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(Some(v)) => Ok(v),
                    other => mismatch(&other),
                }
            }
        }
    };
}

impl_as_value_integer!(u8, UInt8);
impl_as_value_integer!(i16, Int16);
impl_as_value_integer!(i32, Int32);
impl_as_value_integer!(i64, Int64);

impl_as_value_simple!(Decimal, Decimal);
impl_as_value_simple!(String, Varchar);
impl_as_value_simple!(Date, Date);
impl_as_value_simple!(Time, Time);
impl_as_value_simple!(PrimitiveDateTime, Timestamp);
impl_as_value_simple!(Uuid, Uuid);

impl AsValue for bool {
    fn as_value(&self) -> Value {
        Value::Boolean(Some(*self))
    }
    fn null_value() -> Value {
        Value::Boolean(None)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(Some(v)) => Ok(v),
            ref other => match other.as_integer() {
                Some(v) => Ok(v != 0),
                None => mismatch(other),
            },
        }
    }
}

impl AsValue for f32 {
    fn as_value(&self) -> Value {
        Value::Float32(Some(*self))
    }
    fn null_value() -> Value {
        Value::Float32(None)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(Some(v)) => Ok(v),
            other => mismatch(&other),
        }
    }
}

impl AsValue for f64 {
    fn as_value(&self) -> Value {
        Value::Float64(Some(*self))
    }
    fn null_value() -> Value {
        Value::Float64(None)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float64(Some(v)) => Ok(v),
            Value::Float32(Some(v)) => Ok(v as f64),
            other => mismatch(&other),
        }
    }
}

impl AsValue for Vec<u8> {
    fn as_value(&self) -> Value {
        Value::Blob(Some(self.clone().into_boxed_slice()))
    }
    fn null_value() -> Value {
        Value::Blob(None)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v.into_vec()),
            other => mismatch(&other),
        }
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_value(&self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::null_value(),
        }
    }
    fn null_value() -> Value {
        T::null_value()
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::try_from_value(value).map(Some)
        }
    }
}
