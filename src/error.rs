use crate::hal::{DmaIrqLine, IrqLine, PioIrqLine};
use thiserror::Error;

/// Errors that can occur while sampling an HX711 array.
///
/// Only recoverable runtime conditions are reported here. Misuse of the API
/// (closed handles, out-of-range chip counts, restarting an in-flight request)
/// panics instead, because the hardware state after such a call is undefined.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The capture did not complete before the deadline. The DMA transfer was
    /// aborted and the Reader's FIFO cleared, so the next capture can proceed.
    #[error("Timed out waiting for the DMA capture to complete")]
    Timeout,
    /// Every dispatch slot for the request's interrupt lines is in use.
    #[error(
        "No free dispatch slot for {pio_irq} / {dma_irq}: too many concurrent async requests for this hardware. Wait for an in-flight request to finish and retry."
    )]
    DispatchTableFull {
        /// The PIO interrupt line the request is bound to.
        pio_irq: PioIrqLine,
        /// The DMA interrupt line the request is bound to.
        dma_irq: DmaIrqLine,
    },
    /// GPIO pin number is outside the valid bank-0 range.
    #[error("GPIO pin {pin} argument out of range (0-{max})")]
    PinArgumentOutOfRange {
        /// The invalid pin number that was specified.
        pin: u8,
        /// Highest valid pin number.
        max: u8,
    },
    /// An interrupt line could not be claimed for an async request.
    #[error("Interrupt line {0} is not available")]
    IrqLineUnavailable(IrqLine),
}

/// Result type alias for HX711 array operations.
///
/// This is a convenience alias for `std::result::Result<T, Error>` used
/// throughout the crate to reduce boilerplate.
pub type Result<T> = std::result::Result<T, Error>;
