//! # RIO Utilities
//!
//! This small library contains the types that describe a compiled FPGA device image (its
//! register map, DMA FIFOs, bitfile and signature) and the parser for the C API header that the
//! FPGA toolchain generates alongside every image.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod image;
