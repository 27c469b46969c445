//! Procedural macros for the riofpga rust library

mod header;

use header::HeaderFpga;
use proc_macro::TokenStream;
use quote::quote;
use rio_utils::image::header::read_header_file;
use std::path::PathBuf;
use syn::parse_macro_input;

/// Generate a typed device struct from the C API header of a compiled device image.
///
/// `fpga_from_header!(MainFpga, "images/NiFpga_main_FPGA.h")` produces `MainFpga<T>` with one
/// public field per register (a `Control` or `Indicator` of the matching Rust type) and per
/// target-to-host FIFO (an unconfigured `FifoChannel`). Names that are Rust keywords become raw
/// identifiers, so a register `type` is `fpga.r#type`. Relative paths resolve against the
/// invoking crate's manifest directory.
#[proc_macro]
pub fn fpga_from_header(tokens: TokenStream) -> TokenStream {
    let HeaderFpga { name, filename } = parse_macro_input!(tokens as HeaderFpga);
    match expand(&name, &filename) {
        Ok(generated) => TokenStream::from(generated),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn expand(name: &syn::Ident, filename: &syn::LitStr) -> syn::Result<proc_macro2::TokenStream> {
    let span = filename.span();
    let mut path = PathBuf::from(filename.value());
    if path.is_relative() {
        if let Ok(root) = std::env::var("CARGO_MANIFEST_DIR") {
            path = PathBuf::from(root).join(path);
        }
    }
    let header = read_header_file(&path).map_err(|e| {
        syn::Error::new(
            span,
            format!("Couldn't read the FPGA header `{}`: {e}", path.display()),
        )
    })?;

    header::check_unique_names(&header, span)?;
    let fields = header::generate_struct_fields(&header, span)?;
    let names = header::generate_field_names(&header, span)?;
    let constructors = header::generate_constructors(&header, span)?;
    let fifo_names = header::generate_fifo_names(&header, span)?;
    let (register_entries, fifo_entries) = header::generate_image_entries(&header);
    let target = header.target.as_str();
    let bitfile = header.bitfile.as_str();
    let signature = header.signature.as_str();
    let path = path.display().to_string();

    Ok(quote! {
        #[derive(Debug)]
        #[allow(non_snake_case)]
        pub struct #name<T> {
            pub transport: std::sync::Arc<std::sync::Mutex<T>>,
            #(#fields),*
        }

        impl<T> #name<T> {
            pub const TARGET: &'static str = #target;
            pub const BITFILE: &'static str = #bitfile;
            pub const SIGNATURE: &'static str = #signature;

            /// The device image this type was generated from
            #[must_use]
            pub fn image() -> riofpga::core::Header {
                // Rebuild when the header changes
                const _: &[u8] = include_bytes!(#path);
                riofpga::core::Header {
                    target: Self::TARGET.to_owned(),
                    bitfile: Self::BITFILE.to_owned(),
                    signature: Self::SIGNATURE.to_owned(),
                    registers: riofpga::core::Registers::from([#(#register_entries),*]),
                    fifos: riofpga::core::Fifos::from([#(#fifo_entries),*]),
                }
            }
        }

        impl<T> #name<T>
        where
            T: riofpga::transport::Transport,
        {
            /// # Errors
            /// Returns an error if a register handle can't be built
            #[allow(non_snake_case)]
            pub fn new(transport: T) -> riofpga::transport::TransportResult<Self> {
                let tarc = std::sync::Arc::new(std::sync::Mutex::new(transport));
                let tweak = std::sync::Arc::downgrade(&tarc);
                #(#constructors)*
                Ok(Self {
                    transport: tarc,
                    #(#names),*
                })
            }

            /// Reset the VI. Running FIFO channels are left `Stopped`.
            /// # Errors
            /// Returns an error on bad transport
            pub fn reset(&self) -> riofpga::transport::TransportResult<()> {
                let mut transport = self
                    .transport
                    .lock()
                    .map_err(|_| riofpga::transport::Error::InvalidSession)?;
                riofpga::transport::Transport::reset(&mut *transport)?;
                drop(transport);
                #(self.#fifo_names.mark_reset();)*
                Ok(())
            }
        }
    })
}
