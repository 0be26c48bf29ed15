//! Interrupt-driven reads with a reusable `AsyncRequest`.
//!
//! On hardware the PIO and DMA interrupt vectors call the shared handlers on
//! a static `DispatchTable`. Here the simulated board never raises interrupts,
//! so the main loop calls the handlers itself where the vectors would fire.
//!
//! Run with: cargo run --example async_request

#[path = "../tests/common/mod.rs"]
mod sim;

use hx711_multi::{
    AsyncRequest, DispatchTable, DmaIrqLine, Error, Gain, GpioPin, Hx711Multi, Hx711MultiConfig,
    PioBlock, PioIrqIndex, RequestState,
};
use sim::SimHardware;
use std::pin::pin;

const CHIPS: usize = 3;

static DISPATCH: DispatchTable<SimHardware> = DispatchTable::new();

/// Stands in for the PIO0_IRQ_0 and DMA_IRQ_0 vectors.
fn service_interrupts() {
    DISPATCH.on_pio_irq();
    DISPATCH.on_dma_irq();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("HX711 Multi Async Request Example");
    println!("=================================\n");

    let board = SimHardware::new();
    let config = Hx711MultiConfig::new(GpioPin::new(2)?, GpioPin::new(3)?, CHIPS, PioBlock::Pio0);
    let hxm = Hx711Multi::init(board.clone(), &config);
    hxm.sync(Gain::A128);

    // 1. Open a request on PIO0_IRQ_0 / DMA_IRQ_0
    println!("1. Opening a Request");
    println!("--------------------");
    let mut req = pin!(AsyncRequest::open(
        &hxm,
        &DISPATCH,
        PioIrqIndex::Irq0,
        DmaIrqLine::Dma0
    )?);
    println!(
        "✓ Request bound to {} / {}",
        req.pio_irq_line(),
        req.dma_irq_line()
    );

    // 2. Start, do other work, collect; then reuse the same request
    println!("\n2. Background Captures");
    println!("----------------------");
    let mut values = [0i32; CHIPS];
    for round in 1..=3i32 {
        board.set_chip_values(&[round * 1_000, -round, round << 16]);
        req.as_ref().start()?;

        let mut polls = 0;
        while !req.is_done() {
            polls += 1;
            service_interrupts();
        }
        req.get_values(&mut values);
        println!("  round {round}: {values:?} after {polls} poll(s)");
    }

    // 3. Contention on the same interrupt lines
    println!("\n3. Sharing Interrupt Lines");
    println!("--------------------------");
    let other = pin!(AsyncRequest::open(
        &hxm,
        &DISPATCH,
        PioIrqIndex::Irq0,
        DmaIrqLine::Dma0
    )?);
    board.set_chips_ready(false);
    req.as_ref().start()?;
    match other.as_ref().start() {
        Err(Error::DispatchTableFull { pio_irq, dma_irq }) => {
            println!("✓ Second start refused: {pio_irq} / {dma_irq} busy")
        }
        Ok(()) => println!("✗ Second start accepted on busy lines"),
        Err(e) => println!("✗ Unexpected error: {e}"),
    }
    println!("  first request is {:?}", req.state());

    // 4. Closing a pending request unregisters it
    println!("\n4. Closing");
    println!("----------");
    req.as_mut().close();
    assert_eq!(req.state(), RequestState::None);
    board.set_chips_ready(true);
    other.as_ref().start()?;
    while !other.is_done() {
        service_interrupts();
    }
    other.get_values(&mut values);
    println!("✓ Lines reused by the second request: {values:?}");

    Ok(())
}
