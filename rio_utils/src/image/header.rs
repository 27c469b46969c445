//! This module contains the logic for parsing the C API header the FPGA toolchain generates for a
//! compiled device image (`NiFpga_<target>.h`). We only care about a handful of declarations in
//! it:
//!
//! - `#define <target>_Bitfile "<file>"`
//! - `static const char* const <target>_Signature = "<hex>";` (older generators use a `#define`)
//! - `typedef enum { <target>_<Category>_<name> = <addr>, ... } <target>_<Category>;`
//!
//! Every other line is skipped.
use super::{
    DeviceImage,
    Direction,
    Fifo,
    Fifos,
    Kind,
    Register,
    Registers,
};
use kstring::KString;
use nom::{
    branch::alt,
    bytes::complete::{
        escaped_transform,
        is_not,
        tag,
        take_while1,
    },
    character::complete::{
        char,
        digit1,
        hex_digit1,
        line_ending,
        multispace0,
        multispace1,
        not_line_ending,
        space1,
    },
    combinator::{
        map,
        map_res,
        opt,
        value,
        verify,
    },
    multi::many0,
    sequence::{
        delimited,
        preceded,
        terminated,
        tuple,
    },
    IResult,
};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The target prefix every declaration starts with, e.g. `NiFpga_main_FPGA`
    pub target: String,
    pub bitfile: String,
    pub signature: String,
    pub registers: Registers,
    pub fifos: Fifos,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Parsing failed to match the grammar")]
    ParseMatch,
    #[error("The header doesn't declare a bitfile")]
    MissingBitfile,
    #[error("The header doesn't declare a signature")]
    MissingSignature,
}

impl DeviceImage for Header {
    fn bitfile(&self) -> &str {
        &self.bitfile
    }

    fn signature(&self) -> &str {
        &self.signature
    }

    fn registers(&self) -> &Registers {
        &self.registers
    }

    fn fifos(&self) -> &Fifos {
        &self.fifos
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item<'a> {
    Enum {
        name: &'a str,
        entries: Vec<(&'a str, u32)>,
    },
    Define {
        name: &'a str,
        value: String,
    },
    Other,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Category {
    Register(Direction, Kind),
    Fifo(Kind),
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn number(input: &str) -> IResult<&str, u32> {
    alt((
        map_res(
            preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
            |hex: &str| u32::from_str_radix(hex, 16),
        ),
        map_res(digit1, |dec: &str| dec.parse::<u32>()),
    ))(input)
}

/// A C string literal. Paths on windows hosts come with escaped backslashes, and names may carry
/// escaped quotes.
fn quoted(input: &str) -> IResult<&str, String> {
    let escape = alt((
        value("\\", char('\\')),
        value("\"", char('"')),
        value("\n", char('n')),
        value("\t", char('t')),
    ));
    delimited(
        char('"'),
        // `escaped_transform` refuses an empty literal
        map(
            opt(escaped_transform(is_not("\\\""), '\\', escape)),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)
}

fn enum_entry(input: &str) -> IResult<&str, (&str, u32)> {
    let (remaining, name) = preceded(multispace0, identifier)(input)?;
    let (remaining, addr) =
        preceded(delimited(multispace0, char('='), multispace0), number)(remaining)?;
    let (remaining, _) = opt(preceded(multispace0, char(',')))(remaining)?;
    Ok((remaining, (name, addr)))
}

fn typedef_enum(input: &str) -> IResult<&str, Item> {
    let (remaining, _) = tuple((tag("typedef"), multispace1, tag("enum")))(input)?;
    let (remaining, _) = preceded(multispace0, char('{'))(remaining)?;
    let (remaining, entries) = many0(enum_entry)(remaining)?;
    let (remaining, _) = preceded(multispace0, char('}'))(remaining)?;
    let (remaining, name) = preceded(multispace0, identifier)(remaining)?;
    let (remaining, _) = preceded(multispace0, char(';'))(remaining)?;
    Ok((remaining, Item::Enum { name, entries }))
}

fn define_string(input: &str) -> IResult<&str, Item> {
    let (remaining, _) = tag("#define")(input)?;
    let (remaining, name) = preceded(space1, identifier)(remaining)?;
    let (remaining, value) = preceded(space1, quoted)(remaining)?;
    Ok((remaining, Item::Define { name, value }))
}

fn static_string(input: &str) -> IResult<&str, Item> {
    let (remaining, _) = tuple((
        tag("static"),
        multispace1,
        tag("const"),
        multispace1,
        tag("char"),
        multispace0,
        char('*'),
        multispace0,
        tag("const"),
        multispace1,
    ))(input)?;
    let (remaining, name) = identifier(remaining)?;
    let (remaining, value) =
        preceded(delimited(multispace0, char('='), multispace0), quoted)(remaining)?;
    let (remaining, _) = preceded(multispace0, char(';'))(remaining)?;
    Ok((remaining, Item::Define { name, value }))
}

fn skip_line(input: &str) -> IResult<&str, Item> {
    value(
        Item::Other,
        terminated(
            verify(not_line_ending, |line: &str| !line.is_empty()),
            opt(line_ending),
        ),
    )(input)
}

fn items(input: &str) -> IResult<&str, Vec<Item>> {
    many0(preceded(
        multispace0,
        alt((typedef_enum, define_string, static_string, skip_line)),
    ))(input)
}

/// Split an enum typedef name like `NiFpga_main_FPGA_ControlI16` into its category
fn category(typedef: &str) -> Option<Category> {
    let (_, category) = typedef.rsplit_once('_')?;
    if let Some(kind) = category.strip_prefix("Control") {
        Some(Category::Register(Direction::Control, kind.parse().ok()?))
    } else if let Some(kind) = category.strip_prefix("Indicator") {
        Some(Category::Register(Direction::Indicator, kind.parse().ok()?))
    } else if let Some(kind) = category.strip_prefix("TargetToHostFifo") {
        Some(Category::Fifo(kind.parse().ok()?))
    } else {
        // Arrays, fixed point, floats and host-to-target FIFOs don't map to anything here
        None
    }
}

/// Entries repeat the typedef name as their prefix
fn entry_name<'a>(typedef: &str, entry: &'a str) -> &'a str {
    entry
        .strip_prefix(typedef)
        .and_then(|s| s.strip_prefix('_'))
        .unwrap_or(entry)
}

/// Parses the contents of a generated C API header
/// # Errors
/// Returns an error if the header doesn't declare both a bitfile and a signature
pub fn parse_header(input: &str) -> Result<Header, Error> {
    let (remaining, parsed) = items(input).map_err(|_| Error::ParseMatch)?;
    if !remaining.trim().is_empty() {
        return Err(Error::ParseMatch);
    }

    let mut target = None;
    let mut bitfile = None;
    let mut signature = None;
    let mut registers = Registers::new();
    let mut fifos = Fifos::new();

    for item in parsed {
        match item {
            Item::Define { name, value } => {
                if let Some(prefix) = name.strip_suffix("_Bitfile") {
                    target = Some(prefix.to_owned());
                    bitfile = Some(value);
                } else if name.ends_with("_Signature") {
                    signature = Some(value);
                }
            }
            Item::Enum { name, entries } => match category(name) {
                Some(Category::Register(direction, kind)) => {
                    for (entry, addr) in entries {
                        let reg_name = entry_name(name, entry);
                        registers.insert(
                            KString::from_ref(reg_name),
                            Register::new(reg_name, addr, kind, direction),
                        );
                    }
                }
                Some(Category::Fifo(kind)) => {
                    for (entry, number) in entries {
                        let fifo_name = entry_name(name, entry);
                        fifos.insert(
                            KString::from_ref(fifo_name),
                            Fifo::new(fifo_name, number, kind),
                        );
                    }
                }
                None => (),
            },
            Item::Other => (),
        }
    }

    let bitfile = bitfile.ok_or(Error::MissingBitfile)?;
    Ok(Header {
        target: target.unwrap_or_default(),
        bitfile,
        signature: signature.ok_or(Error::MissingSignature)?,
        registers,
        fifos,
    })
}

/// Reads a generated C API header from disk
/// # Errors
/// Returns an error on IO errors or an invalid header
pub fn read_header_file<T>(filename: T) -> Result<Header, Error>
where
    T: AsRef<Path>,
{
    let contents = std::fs::read_to_string(filename)?;
    parse_header(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number() {
        assert_eq!(number("0x8112,"), Ok((",", 0x8112)));
        assert_eq!(number("0"), Ok(("", 0)));
        assert!(number("zz").is_err());
    }

    #[test]
    fn test_enum_entry() {
        let (remaining, (name, addr)) =
            enum_entry("\n   NiFpga_main_FPGA_ControlI16_N_x = 0x813A,\n").unwrap();
        assert_eq!(remaining, "\n");
        assert_eq!(name, "NiFpga_main_FPGA_ControlI16_N_x");
        assert_eq!(addr, 0x813A);
    }

    #[test]
    fn test_typedef_enum() {
        let input = "typedef enum
{
   NiFpga_main_FPGA_IndicatorBool_Connector1DIO0 = 0x8112,
   NiFpga_main_FPGA_IndicatorBool_executingsubscript = 0x8116
} NiFpga_main_FPGA_IndicatorBool;";
        let (remaining, item) = typedef_enum(input).unwrap();
        assert_eq!(remaining, "");
        assert_eq!(
            item,
            Item::Enum {
                name: "NiFpga_main_FPGA_IndicatorBool",
                entries: vec![
                    ("NiFpga_main_FPGA_IndicatorBool_Connector1DIO0", 0x8112),
                    ("NiFpga_main_FPGA_IndicatorBool_executingsubscript", 0x8116),
                ]
            }
        );
    }

    #[test]
    fn test_static_string() {
        let input = "static const char* const NiFpga_main_FPGA_Signature = \"C0FFEE\";";
        let (remaining, item) = static_string(input).unwrap();
        assert_eq!(remaining, "");
        assert_eq!(
            item,
            Item::Define {
                name: "NiFpga_main_FPGA_Signature",
                value: "C0FFEE".to_owned()
            }
        );
    }

    #[test]
    fn test_define_unescapes_paths() {
        let input = r#"#define NiFpga_main_FPGA_Bitfile "C:\\lib\\NiFpga_main_FPGA.lvbitx""#;
        let (_, item) = define_string(input).unwrap();
        assert_eq!(
            item,
            Item::Define {
                name: "NiFpga_main_FPGA_Bitfile",
                value: r"C:\lib\NiFpga_main_FPGA.lvbitx".to_owned()
            }
        );
    }

    #[test]
    fn test_define_escaped_quotes() {
        let input = r#"#define NiFpga_main_FPGA_Bitfile "C:\\lib\\my \"fpga\".lvbitx""#;
        let (_, item) = define_string(input).unwrap();
        assert_eq!(
            item,
            Item::Define {
                name: "NiFpga_main_FPGA_Bitfile",
                value: r#"C:\lib\my "fpga".lvbitx"#.to_owned()
            }
        );
        let (rest, empty) = quoted(r#""";"#).unwrap();
        assert_eq!((rest, empty.as_str()), (";", ""));
        assert_eq!(quoted(r#""a\tb""#).unwrap().1, "a\tb");
        assert!(quoted(r#""unterminated"#).is_err());
    }

    #[test]
    fn test_category() {
        assert_eq!(
            category("NiFpga_main_FPGA_ControlU16"),
            Some(Category::Register(Direction::Control, Kind::U16))
        );
        assert_eq!(
            category("NiFpga_main_FPGA_IndicatorI32"),
            Some(Category::Register(Direction::Indicator, Kind::I32))
        );
        assert_eq!(
            category("NiFpga_main_FPGA_TargetToHostFifoI32"),
            Some(Category::Fifo(Kind::I32))
        );
        assert_eq!(category("NiFpga_main_FPGA_ControlArrayI16"), None);
        assert_eq!(category("NiFpga_main_FPGA_HostToTargetFifoU8"), None);
    }

    #[test]
    fn test_header() {
        let input = "/*
 * Generated with the FPGA Interface C API Generator 14.0.0
 */

#ifndef __NiFpga_main_FPGA_h__
#define __NiFpga_main_FPGA_h__

#ifndef NiFpga_Version
   #define NiFpga_Version 1400
#endif

#include \"NiFpga.h\"

#define NiFpga_main_FPGA_Bitfile \"NiFpga_main_FPGA.lvbitx\"

static const char* const NiFpga_main_FPGA_Signature = \"D0D9E5A2B4E86F3F\";

typedef enum
{
   NiFpga_main_FPGA_ControlU16_run_mode = 0x8112,
} NiFpga_main_FPGA_ControlU16;

typedef enum
{
   NiFpga_main_FPGA_IndicatorI16_Connector1AI0 = 0x8116,
} NiFpga_main_FPGA_IndicatorI16;

typedef enum
{
   NiFpga_main_FPGA_ControlArrayI16_waveform = 0x811A,
} NiFpga_main_FPGA_ControlArrayI16;

typedef enum
{
   NiFpga_main_FPGA_TargetToHostFifoI32_DMA = 0,
} NiFpga_main_FPGA_TargetToHostFifoI32;

#endif
";
        let header = parse_header(input).unwrap();
        assert_eq!(header.target, "NiFpga_main_FPGA");
        assert_eq!(header.bitfile(), "NiFpga_main_FPGA.lvbitx");
        assert_eq!(header.signature(), "D0D9E5A2B4E86F3F");
        assert_eq!(header.registers().len(), 2);
        assert_eq!(
            header.registers().get("run_mode"),
            Some(&Register::new("run_mode", 0x8112, Kind::U16, Direction::Control))
        );
        assert_eq!(
            header.registers().get("Connector1AI0"),
            Some(&Register::new(
                "Connector1AI0",
                0x8116,
                Kind::I16,
                Direction::Indicator
            ))
        );
        assert!(header.registers().get("waveform").is_none());
        assert_eq!(
            header.fifos().get("DMA"),
            Some(&Fifo::new("DMA", 0, Kind::I32))
        );
    }

    #[test]
    fn test_missing_signature() {
        let input = "#define NiFpga_x_Bitfile \"x.lvbitx\"\n";
        assert!(matches!(parse_header(input), Err(Error::MissingSignature)));
    }

    #[test]
    fn test_missing_bitfile() {
        assert!(matches!(parse_header(""), Err(Error::MissingBitfile)));
    }
}
