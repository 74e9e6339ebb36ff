use rust_decimal::Decimal;
use std::fmt::{self, Display};
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

/// A single database value. Each variant carries `Option` so a null keeps the
/// type it was declared with (`Int32(None)` is a null integer, distinct from
/// an untyped `Null`).
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    UInt8(Option<u8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    Uuid(Option<Uuid>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
        }
    }

    pub fn same_type(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Integer payload regardless of declared width.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::UInt8(Some(v)) => Some(*v as i64),
            Value::Int16(Some(v)) => Some(*v as i64),
            Value::Int32(Some(v)) => Some(*v as i64),
            Value::Int64(Some(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Varchar(Some(v)) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            v if v.is_null() => write!(f, "NULL"),
            Value::Boolean(Some(v)) => write!(f, "{}", v),
            Value::UInt8(Some(v)) => write!(f, "{}", v),
            Value::Int16(Some(v)) => write!(f, "{}", v),
            Value::Int32(Some(v)) => write!(f, "{}", v),
            Value::Int64(Some(v)) => write!(f, "{}", v),
            Value::Float32(Some(v)) => write!(f, "{}", v),
            Value::Float64(Some(v)) => write!(f, "{}", v),
            Value::Decimal(Some(v)) => write!(f, "{}", v),
            Value::Varchar(Some(v)) => write!(f, "{}", v),
            Value::Blob(Some(v)) => write!(f, "<{} bytes>", v.len()),
            Value::Date(Some(v)) => write!(f, "{}", v),
            Value::Time(Some(v)) => write!(f, "{}", v),
            Value::Timestamp(Some(v)) => write!(f, "{}", v),
            Value::Uuid(Some(v)) => write!(f, "{}", v),
            _ => unreachable!(),
        }
    }
}
