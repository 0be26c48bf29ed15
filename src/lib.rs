//! # hx711-multi
//!
//! A Rust crate for reading up to 32 HX711 load-cell amplifiers at once,
//! bit-synchronously, using two cooperating PIO state machines and a DMA
//! channel instead of CPU-timed bit-banging.
//!
//! All chips share one clock line and each has its own data line. The data
//! lines are consecutive GPIOs, so every clock edge samples all chips in a
//! single 32-bit word.
//!
//! ## Features
//!
//! *   Device lifecycle (`Hx711Multi::init`, `Hx711Multi::close`), with resources
//!     released on drop.
//! *   Blocking reads:
//!     *   Converted values (`get_values`, `get_values_timeout`).
//!     *   Raw bit-plane words (`get_values_raw`, `get_values_timeout_raw`).
//! *   Interrupt-driven reads through a reusable `AsyncRequest`:
//!     *   `start`, poll `is_done`, collect with `get_values`.
//!     *   Shared PIO and DMA handlers dispatched through a static `DispatchTable`.
//! *   Power and synchronisation:
//!     *   `power_up`, `power_down`, `sync`.
//!     *   Phase check across chips (`sync_state`, `is_syncd`).
//!     *   Gain changes (`set_gain`) and settling helpers (`wait_settle`).
//! *   Replaceable microcode and pin/timing init callbacks via `Hx711MultiConfig`.
//!
//! ## How a capture works
//!
//! 1.  The *Awaiter* program waits until every data line is low (all chips
//!     have a conversion ready) and raises PIO IRQ 1 ("conversion running").
//! 2.  The *Reader* program clocks 24 pulses and pushes one word per pulse,
//!     MSB first, bit `i` holding chip `i`. It then emits the gain pulses.
//! 3.  A DMA channel pulls the 24 words from the Reader's RX FIFO. Its
//!     completion is the signal that the capture is ready.
//!
//! ## Hardware access
//!
//! The driver never touches registers directly. Implement [`hal::Hardware`]
//! for your board (usually a thin layer over its PAC or HAL) and pass it to
//! [`Hx711Multi::init`].
//!
//! ## Basic Usage
//!
//! ```ignore
//! use hx711_multi::{Gain, GpioPin, Hx711Multi, Hx711MultiConfig, PioBlock, Rate, Result};
//!
//! fn run(board: Board) -> Result<()> {
//!     let config = Hx711MultiConfig::new(
//!         GpioPin::new(2)?,  // clock
//!         GpioPin::new(3)?,  // first data pin
//!         4,                 // chips on GPIO3..=GPIO6
//!         PioBlock::Pio0,
//!     );
//!     let hxm = Hx711Multi::init(board, &config);
//!
//!     hxm.sync(Gain::A128);
//!     hxm.wait_settle(Rate::Sps10);
//!
//!     let mut values = [0i32; 4];
//!     hxm.get_values(&mut values);
//!
//!     // or with a 250ms deadline
//!     hxm.get_values_timeout(&mut values, 250_000)?;
//!
//!     if !hxm.is_syncd() {
//!         hxm.sync(Gain::A128);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Async Usage
//!
//! ```ignore
//! use core::pin::pin;
//! use hx711_multi::{AsyncRequest, DispatchTable, DmaIrqLine, PioIrqIndex};
//!
//! static DISPATCH: DispatchTable<Board> = DispatchTable::new();
//!
//! // bind PIO0_IRQ_0 to DISPATCH.on_pio_irq() and DMA_IRQ_0 to DISPATCH.on_dma_irq()
//!
//! let req = pin!(AsyncRequest::open(&hxm, &DISPATCH, PioIrqIndex::Irq0, DmaIrqLine::Dma0)?);
//! req.as_ref().start()?;
//! while !req.is_done() {
//!     // do other work
//! }
//! req.get_values(&mut values);
//! req.as_ref().start()?; // reuse
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **Data pins** must be consecutive GPIOs starting at `data_pin_base`, in
//!     chip order. The clock pin must not be one of them.
//! *   **RATE pin:** all chips should run at the same output data rate.
//! *   **Powering down** holds the clock high for at least 60µs. Any code that
//!     drives the clock pin outside this driver can power the chips down.

mod consts;
mod error;
pub mod capture;
pub mod gpio;
pub mod hal;
pub mod hx711;
pub mod interrupt;
pub mod program;
pub mod request;
mod device;
mod read;

pub use capture::CaptureBuffer;
pub use device::{is_syncd_mask, Hx711Multi, Hx711MultiConfig};
pub use error::{Error, Result};
pub use gpio::{GpioLevel, GpioPin};
pub use hal::{DmaIrqLine, Hardware, IrqLine, PioBlock, PioIrqIndex, PioIrqLine};
pub use hx711::{Gain, Rate};
pub use interrupt::DispatchTable;
pub use request::{AsyncRequest, RequestState};
// Re-export only the public limits
pub use consts::{MAX_CHIPS, MIN_CHIPS, READ_BITS};

/// Hardware limits that size the driver's fixed tables.
pub mod limits {
    pub use crate::consts::dma::NUM_CHANNELS as DMA_CHANNELS;
    pub use crate::consts::pio::INSTRUCTION_MEMORY_LEN as PIO_INSTRUCTION_WORDS;
    pub use crate::consts::pio::NUM_STATE_MACHINES as STATE_MACHINES_PER_PIO;
    pub use crate::consts::{NUM_DMA_IRQ_LINES as DMA_IRQ_LINES, NUM_PIO_IRQ_LINES as PIO_IRQ_LINES};
}
