//! In this example, we bring up a simulated target, program a galvo raster scan and stream the
//! detector counts back over DMA, one scan line at a time.

use indicatif::ProgressBar;
use riofpga::{
    core::Value,
    prelude::*,
};
use std::{
    thread,
    time::Duration,
};

fpga_from_header!(MainFpga, "images/NiFpga_main_FPGA.h");

const N_X: i16 = 64;
const N_Y: i16 = 48;

fn main() -> anyhow::Result<()> {
    let image = MainFpga::<Mock>::image();
    let busy = image.registers["executingsubscript"].addr;
    let runtime = Runtime::initialize(MockDriver::new(&image))?;
    let mut fpga = MainFpga::new(runtime.start(&image, DEFAULT_RESOURCE)?)?;

    // Scan parameters, in DAC counts
    fpga.N_x.write(N_X)?;
    fpga.N_y.write(N_Y)?;
    fpga.Vmin_x.write(-8000)?;
    fpga.Vmin_y.write(-6000)?;
    fpga.dVmin_x.write(250)?;
    fpga.dVmin_y.write(250)?;
    fpga.scanmodex.write(0)?;
    fpga.scanmodey.write(0)?;
    fpga.detector_mode.write(1)?;
    fpga.settle_time_us.write(20)?;
    fpga.measurements_per_pt.write(4)?;

    let line = usize::try_from(N_X)?;
    let depth = fpga.DMA.configure(line * 8)?;
    println!("DMA depth - {depth}");
    fpga.DMA.start()?;

    // Play the FPGA: one count per pixel, a line at a time
    let feeder = fpga.transport.lock().unwrap().feeder(fpga.DMA.fifo()).unwrap();
    let producer = thread::spawn(move || {
        for y in 0..i32::from(N_Y) {
            let counts: Vec<i32> = (0..i32::from(N_X)).map(|x| (x * y) % 97).collect();
            let mut sent = 0;
            while sent < counts.len() {
                sent += feeder.push(&counts[sent..]).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        }
        feeder.end_stream().unwrap();
    });

    fpga.transport
        .lock()
        .unwrap()
        .poke(busy, Value::Bool(true))?;
    fpga.run_mode.write(2)?;

    let bar = ProgressBar::new(u64::try_from(N_Y)?);
    bar.set_message("Scanning");
    let mut buf = vec![0i32; depth];
    let mut image_counts = Vec::with_capacity(line * usize::try_from(N_Y)?);
    let mut status = Status::new();
    while fpga.executingsubscript.read()? {
        let timeout = Some(Duration::from_secs(1));
        let Some(read) = status.merge(fpga.DMA.read_bulk(&mut buf, line, timeout)) else {
            break;
        };
        image_counts.extend_from_slice(&buf[..read.read]);
        if read.read < line {
            // End of stream
            fpga.transport
                .lock()
                .unwrap()
                .poke(busy, Value::Bool(false))?;
        } else {
            bar.inc(1);
        }
    }
    bar.finish();
    producer.join().unwrap();
    status.into_result()?;

    fpga.DMA.stop()?;
    fpga.run_mode.write(0)?;
    let total: i64 = image_counts.iter().map(|&c| i64::from(c)).sum();
    println!("Pixels - {}, total counts - {total}", image_counts.len());
    Ok(())
}
