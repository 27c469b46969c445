//! The core types for interacting with riofpga objects
use num_traits::ToPrimitive;
use std::fmt::Display;

pub use kstring::KString;
pub use rio_utils::image::{
    header::Header,
    DeviceImage,
    Direction,
    Fifo,
    Fifos,
    Kind,
    Register,
    Registers,
};

/// A register or FIFO element value, tagged with its kind
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
}

impl Value {
    #[must_use]
    pub fn kind(self) -> Kind {
        match self {
            Value::Bool(_) => Kind::Bool,
            Value::I8(_) => Kind::I8,
            Value::U8(_) => Kind::U8,
            Value::I16(_) => Kind::I16,
            Value::U16(_) => Kind::U16,
            Value::I32(_) => Kind::I32,
            Value::U32(_) => Kind::U32,
            Value::I64(_) => Kind::I64,
            Value::U64(_) => Kind::U64,
        }
    }

    /// The power-on value of a register of kind `kind`
    #[must_use]
    pub fn zero(kind: Kind) -> Self {
        match kind {
            Kind::Bool => Value::Bool(false),
            Kind::I8 => Value::I8(0),
            Kind::U8 => Value::U8(0),
            Kind::I16 => Value::I16(0),
            Kind::U16 => Value::U16(0),
            Kind::I32 => Value::I32(0),
            Kind::U32 => Value::U32(0),
            Kind::I64 => Value::I64(0),
            Kind::U64 => Value::U64(0),
        }
    }

    /// Converts `n` into a value of kind `kind`, or `None` if `n` isn't representable in that
    /// width. Booleans only accept 0 and 1.
    #[must_use]
    pub fn from_int(kind: Kind, n: i128) -> Option<Self> {
        Some(match kind {
            Kind::Bool => match n {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => return None,
            },
            Kind::I8 => Value::I8(n.to_i8()?),
            Kind::U8 => Value::U8(n.to_u8()?),
            Kind::I16 => Value::I16(n.to_i16()?),
            Kind::U16 => Value::U16(n.to_u16()?),
            Kind::I32 => Value::I32(n.to_i32()?),
            Kind::U32 => Value::U32(n.to_u32()?),
            Kind::I64 => Value::I64(n.to_i64()?),
            Kind::U64 => Value::U64(n.to_u64()?),
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}i8"),
            Value::U8(v) => write!(f, "{v}u8"),
            Value::I16(v) => write!(f, "{v}i16"),
            Value::U16(v) => write!(f, "{v}u16"),
            Value::I32(v) => write!(f, "{v}i32"),
            Value::U32(v) => write!(f, "{v}u32"),
            Value::I64(v) => write!(f, "{v}i64"),
            Value::U64(v) => write!(f, "{v}u64"),
        }
    }
}

/// Rust types that can be stored in a register or streamed through a FIFO
pub trait RegisterValue: Sized + Copy {
    /// The register kind this type maps to, exactly
    const KIND: Kind;
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! register_value {
    ($ty:ty, $variant:ident) => {
        impl RegisterValue for $ty {
            const KIND: Kind = Kind::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

// Every kind the session API can address
register_value!(bool, Bool);
register_value!(i8, I8);
register_value!(u8, U8);
register_value!(i16, I16);
register_value!(u16, U16);
register_value!(i32, I32);
register_value!(u32, U32);
register_value!(i64, I64);
register_value!(u64, U64);
