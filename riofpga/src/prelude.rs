//! Prelude (helpful reexports) for this package

pub use crate::{
    core::{
        DeviceImage,
        Kind,
        RegisterValue,
        Value,
    },
    device::Device,
    fifo::{
        FifoChannel,
        FifoState,
    },
    session::{
        Driver,
        OpenAttributes,
        Runtime,
        Session,
        DEFAULT_RESOURCE,
    },
    status::Status,
    transport::{
        mock::{
            Mock,
            MockDriver,
        },
        Transport,
    },
};
pub use rio_utils::image::header::read_header_file;
pub use riofpga_derive::fpga_from_header;
