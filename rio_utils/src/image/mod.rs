//! Types describing a compiled device image

use kstring::KString;
use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
};

pub mod header;

/// The numeric type stored in a register or carried by a FIFO
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Kind::Bool => "Bool",
                Kind::I8 => "I8",
                Kind::U8 => "U8",
                Kind::I16 => "I16",
                Kind::U16 => "U16",
                Kind::I32 => "I32",
                Kind::U32 => "U32",
                Kind::I64 => "I64",
                Kind::U64 => "U64",
            }
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown register kind `{0}`")]
pub struct UnknownKind(pub String);

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Bool" => Kind::Bool,
            "I8" => Kind::I8,
            "U8" => Kind::U8,
            "I16" => Kind::I16,
            "U16" => Kind::U16,
            "I32" => Kind::I32,
            "U32" => Kind::U32,
            "I64" => Kind::I64,
            "U64" => Kind::U64,
            _ => return Err(UnknownKind(s.to_owned())),
        })
    }
}

/// The IO direction of a register, as seen from the host
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Front panel controls, the host can both write and read these
    Control,
    /// Front panel indicators, driven by the FPGA and read-only to the host
    Indicator,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A scalar register in the device image
pub struct Register {
    pub name: KString,
    pub addr: u32,
    pub kind: Kind,
    pub direction: Direction,
}

impl Register {
    #[must_use]
    pub fn new(name: &str, addr: u32, kind: Kind, direction: Direction) -> Self {
        Self {
            name: KString::from_ref(name),
            addr,
            kind,
            direction,
        }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.direction == Direction::Control
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A target-to-host DMA FIFO in the device image
pub struct Fifo {
    pub name: KString,
    /// The FIFO number the session API addresses this channel by
    pub number: u32,
    /// Element type
    pub kind: Kind,
}

impl Fifo {
    #[must_use]
    pub fn new(name: &str, number: u32, kind: Kind) -> Self {
        Self {
            name: KString::from_ref(name),
            number,
            kind,
        }
    }
}

/// A map from register name to [`Register`]
pub type Registers = HashMap<KString, Register>;

/// A map from FIFO name to [`Fifo`]
pub type Fifos = HashMap<KString, Fifo>;

/// Any type that fully describes a compiled device image implements [`DeviceImage`]. Right now
/// this is just the generated C API header, but could be extended to the bitfile itself.
pub trait DeviceImage {
    /// The bitfile name (or path) passed to the session API when opening
    fn bitfile(&self) -> &str;

    /// The signature the session API uses to validate the bitfile
    fn signature(&self) -> &str;

    /// The scalar registers of this image
    fn registers(&self) -> &Registers;

    /// The DMA FIFOs of this image
    fn fifos(&self) -> &Fifos;
}
