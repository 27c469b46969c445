//! Methods for translating generated C API headers into Rust datatypes

use quote::{
    format_ident,
    quote,
};
use rio_utils::image::{
    header::Header,
    Direction,
    Fifo,
    Kind,
    Register,
};
use syn::{
    parse::{
        Parse,
        ParseStream,
    },
    Ident,
    LitStr,
    Token,
};

pub(crate) struct HeaderFpga {
    pub name: Ident,
    pub filename: LitStr,
}

impl Parse for HeaderFpga {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name = input.parse()?;
        input.parse::<Token![,]>()?;
        let filename = input.parse()?;
        Ok(HeaderFpga { name, filename })
    }
}

fn kind_to_type(kind: Kind) -> proc_macro2::TokenStream {
    match kind {
        Kind::Bool => quote!(bool),
        Kind::I8 => quote!(i8),
        Kind::U8 => quote!(u8),
        Kind::I16 => quote!(i16),
        Kind::U16 => quote!(u16),
        Kind::I32 => quote!(i32),
        Kind::U32 => quote!(u32),
        Kind::I64 => quote!(i64),
        Kind::U64 => quote!(u64),
    }
}

fn kind_path(kind: Kind) -> proc_macro2::TokenStream {
    let variant = format_ident!("{}", kind.to_string());
    quote!(riofpga::core::Kind::#variant)
}

fn direction_path(direction: Direction) -> proc_macro2::TokenStream {
    match direction {
        Direction::Control => quote!(riofpga::core::Direction::Control),
        Direction::Indicator => quote!(riofpga::core::Direction::Indicator),
    }
}

/// Names the generated struct already uses for itself
const RESERVED_FIELDS: [&str; 1] = ["transport"];

/// Keywords that can't be raw identifiers either
const NOT_RAW: [&str; 5] = ["_", "crate", "self", "Self", "super"];

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The field for an FPGA name, falling back to a raw identifier (`r#type`) for Rust keywords
fn field_ident(name: &str, span: proc_macro2::Span) -> syn::Result<Ident> {
    if RESERVED_FIELDS.contains(&name) {
        return Err(syn::Error::new(
            span,
            format!("FPGA name `{name}` collides with the generated `{name}` field"),
        ));
    }
    if let Ok(ident) = syn::parse_str::<Ident>(name) {
        return Ok(Ident::new(&ident.to_string(), span));
    }
    if is_identifier(name) && !NOT_RAW.contains(&name) {
        return Ok(Ident::new_raw(name, span));
    }
    Err(syn::Error::new(
        span,
        format!("FPGA name `{name}` is not a valid rust identifier"),
    ))
}

/// Registers and FIFOs become fields of one struct, so they can't share a name
pub(crate) fn check_unique_names(header: &Header, span: proc_macro2::Span) -> syn::Result<()> {
    let mut names: Vec<&str> = header.fifos.keys().map(|name| name.as_str()).collect();
    names.sort_unstable();
    match names
        .into_iter()
        .find(|name| header.registers.contains_key(*name))
    {
        Some(name) => Err(syn::Error::new(
            span,
            format!("FPGA name `{name}` is both a register and a FIFO"),
        )),
        None => Ok(()),
    }
}

fn register_type(reg: &Register) -> proc_macro2::TokenStream {
    let ty = kind_to_type(reg.kind);
    match reg.direction {
        Direction::Control => quote!(riofpga::registers::Control::<T, #ty>),
        Direction::Indicator => quote!(riofpga::registers::Indicator::<T, #ty>),
    }
}

fn fifo_type(fifo: &Fifo) -> proc_macro2::TokenStream {
    let ty = kind_to_type(fifo.kind);
    quote!(riofpga::fifo::FifoChannel::<T, #ty>)
}

fn register_descriptor(reg: &Register) -> proc_macro2::TokenStream {
    let name = reg.name.as_str();
    let addr = reg.addr;
    let kind = kind_path(reg.kind);
    let direction = direction_path(reg.direction);
    quote!(riofpga::core::Register::new(#name, #addr, #kind, #direction))
}

fn fifo_descriptor(fifo: &Fifo) -> proc_macro2::TokenStream {
    let name = fifo.name.as_str();
    let number = fifo.number;
    let kind = kind_path(fifo.kind);
    quote!(riofpga::core::Fifo::new(#name, #number, #kind))
}

/// Registers in address order, so the generated code doesn't depend on hash order
fn sorted_registers(header: &Header) -> Vec<&Register> {
    let mut registers: Vec<_> = header.registers.values().collect();
    registers.sort_by_key(|r| r.addr);
    registers
}

fn sorted_fifos(header: &Header) -> Vec<&Fifo> {
    let mut fifos: Vec<_> = header.fifos.values().collect();
    fifos.sort_by_key(|f| f.number);
    fifos
}

pub(crate) fn generate_struct_fields(
    header: &Header,
    span: proc_macro2::Span,
) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    let registers = sorted_registers(header).into_iter().map(|reg| -> syn::Result<proc_macro2::TokenStream> {
        let ident = field_ident(&reg.name, span)?;
        let ty = register_type(reg);
        Ok(quote! {
            pub #ident: #ty
        })
    });
    let fifos = sorted_fifos(header).into_iter().map(|fifo| -> syn::Result<proc_macro2::TokenStream> {
        let ident = field_ident(&fifo.name, span)?;
        let ty = fifo_type(fifo);
        Ok(quote! {
            pub #ident: #ty
        })
    });
    registers.chain(fifos).collect()
}

pub(crate) fn generate_field_names(
    header: &Header,
    span: proc_macro2::Span,
) -> syn::Result<Vec<Ident>> {
    sorted_registers(header)
        .into_iter()
        .map(|reg| field_ident(&reg.name, span))
        .chain(
            sorted_fifos(header)
                .into_iter()
                .map(|fifo| field_ident(&fifo.name, span)),
        )
        .collect()
}

pub(crate) fn generate_fifo_names(
    header: &Header,
    span: proc_macro2::Span,
) -> syn::Result<Vec<Ident>> {
    sorted_fifos(header)
        .into_iter()
        .map(|fifo| field_ident(&fifo.name, span))
        .collect()
}

/// Every constructor begins with the weak transport pointer `tweak`, followed by the descriptor
pub(crate) fn generate_constructors(
    header: &Header,
    span: proc_macro2::Span,
) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    let registers = sorted_registers(header).into_iter().map(|reg| -> syn::Result<proc_macro2::TokenStream> {
        let ident = field_ident(&reg.name, span)?;
        let ty = register_type(reg);
        let descriptor = register_descriptor(reg);
        Ok(quote! {let #ident = #ty::from_descriptor(tweak.clone(), #descriptor)?;})
    });
    let fifos = sorted_fifos(header).into_iter().map(|fifo| -> syn::Result<proc_macro2::TokenStream> {
        let ident = field_ident(&fifo.name, span)?;
        let ty = fifo_type(fifo);
        let descriptor = fifo_descriptor(fifo);
        Ok(quote! {let #ident = #ty::from_descriptor(tweak.clone(), #descriptor)?;})
    });
    registers.chain(fifos).collect()
}

/// Map entries rebuilding the register and FIFO maps at runtime
pub(crate) fn generate_image_entries(
    header: &Header,
) -> (Vec<proc_macro2::TokenStream>, Vec<proc_macro2::TokenStream>) {
    let registers = sorted_registers(header)
        .into_iter()
        .map(|reg| {
            let name = reg.name.as_str();
            let descriptor = register_descriptor(reg);
            quote! {(riofpga::core::KString::from_static(#name), #descriptor)}
        })
        .collect();
    let fifos = sorted_fifos(header)
        .into_iter()
        .map(|fifo| {
            let name = fifo.name.as_str();
            let descriptor = fifo_descriptor(fifo);
            quote! {(riofpga::core::KString::from_static(#name), #descriptor)}
        })
        .collect();
    (registers, fifos)
}
