//! Blocking reads from an array of HX711 chips.
//!
//! Runs against the simulated board used by the integration tests, so it
//! works on any host. On a real RP2040, pass your board's `Hardware`
//! implementation to `Hx711Multi::init` instead.
//!
//! Run with: cargo run --example sync_read

#[path = "../tests/common/mod.rs"]
mod sim;

use hx711_multi::{Error, Gain, GpioPin, Hx711Multi, Hx711MultiConfig, PioBlock, Rate};
use sim::SimHardware;

const CHIPS: usize = 4;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("HX711 Multi Blocking Read Example");
    println!("=================================\n");

    let board = SimHardware::new();

    // 1. Open the array
    println!("1. Opening the Array");
    println!("--------------------");
    let config = Hx711MultiConfig::new(
        GpioPin::new(2)?, // clock
        GpioPin::new(3)?, // first data pin
        CHIPS,
        PioBlock::Pio0,
    );
    let hxm = Hx711Multi::init(board.clone(), &config);
    println!(
        "✓ {} chips on GPIO{}..=GPIO{}, clock on GPIO{}",
        hxm.chips_len(),
        config.data_pin_base.number(),
        config.data_pin_base.number() as usize + CHIPS - 1,
        config.clock_pin.number()
    );

    // 2. Bring every chip into the same phase
    println!("\n2. Power Cycle and Settle");
    println!("-------------------------");
    hxm.sync(Gain::A128);
    hxm.wait_settle(Rate::Sps10);
    if hxm.is_syncd() {
        println!("✓ All chips in phase (busy mask {:#06b})", hxm.sync_state());
    } else {
        println!("✗ Chips out of phase (busy mask {:#06b})", hxm.sync_state());
    }

    // 3. Read
    println!("\n3. Reading Values");
    println!("-----------------");
    board.set_chip_values(&[120_345, -4_096, 0, 8_388_607]);
    let mut values = [0i32; CHIPS];
    hxm.get_values(&mut values);
    for (chip, value) in values.iter().enumerate() {
        println!("  chip {chip}: {value}");
    }

    let raw = hxm.get_values_raw();
    println!("  raw bit-planes: {:08X?}", &raw[..4]);

    // 4. Reads with a deadline
    println!("\n4. Reading With a Timeout");
    println!("-------------------------");
    match hxm.get_values_timeout(&mut values, 250_000) {
        Ok(()) => println!("✓ Read within 250ms: {values:?}"),
        Err(e) => println!("✗ Read failed: {e}"),
    }

    board.set_dma_stalled(true);
    match hxm.get_values_timeout(&mut values, 1_000) {
        Err(Error::Timeout) => println!("✓ Stalled transfer timed out, values kept: {values:?}"),
        Ok(()) => println!("✗ Stalled transfer completed"),
        Err(e) => println!("✗ Unexpected error: {e}"),
    }
    board.set_dma_stalled(false);

    // 5. Gain and power
    println!("\n5. Gain and Power");
    println!("-----------------");
    hxm.set_gain(Gain::A64);
    println!("✓ Gain set to {:?}", Gain::A64);
    hxm.power_down();
    println!("✓ Powered down (running: {})", hxm.is_running());
    hxm.power_up(Gain::A128);
    hxm.wait_settle(Rate::Sps10);
    println!("✓ Powered up (running: {})", hxm.is_running());

    hxm.close();
    println!("\n✓ Array closed");
    Ok(())
}
