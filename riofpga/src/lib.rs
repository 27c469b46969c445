//! # riofpga
//!
//! Monitor and control of session-based FPGA targets: typed reads and writes of the front panel
//! registers of a compiled device image, and streaming from its target-to-host DMA FIFOs.
//!
//! The device itself sits behind the [`transport::Transport`] trait and the session lifecycle
//! behind [`session::Driver`]. [`transport::mock`] provides a simulated target.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod core;
pub mod device;
pub mod fifo;
pub mod prelude;
pub mod registers;
pub mod session;
pub mod status;
pub mod transport;
