//! Internal constants, IRQ flag numbers, and hardware limits.

/// Fewest chips a single handle can drive.
pub const MIN_CHIPS: usize = 1;
/// Most chips a single handle can drive (one bit per chip in a 32-bit word).
pub const MAX_CHIPS: usize = 32;

/// Number of bits clocked out of every chip per conversion.
pub const READ_BITS: usize = 24;

// --- PIO Related Constants ---
pub mod pio {
    /// Number of PIO blocks on the chip.
    pub const NUM_PIOS: usize = 2;
    /// State machines per PIO block.
    pub const NUM_STATE_MACHINES: u8 = 4;
    /// Instruction memory words per PIO block.
    pub const INSTRUCTION_MEMORY_LEN: usize = 32;
    /// Interrupt outputs per PIO block (PIOx_IRQ_0, PIOx_IRQ_1).
    pub const IRQ_LINES_PER_PIO: usize = 2;

    /// Target state machine frequency (10MHz), independent of `clk_sys`.
    pub const SM_TARGET_HZ: u32 = 10_000_000;

    // PIO IRQ flags used by the Awaiter/Reader handshake
    /// Raised by the Reader while it is parked waiting for the Awaiter.
    pub const APP_WAIT_IRQ_NUM: u8 = 0;
    /// Raised by the Awaiter once every chip reports data ready.
    pub const CONVERSION_RUNNING_IRQ_NUM: u8 = 1;
    /// Cleared by the Reader at the start of every capture.
    pub const DATA_READY_IRQ_NUM: u8 = 2;
}

// --- DMA Related Constants ---
pub mod dma {
    /// Number of DMA channels.
    pub const NUM_CHANNELS: u8 = 12;
    /// Shared DMA interrupt outputs (DMA_IRQ_0, DMA_IRQ_1).
    pub const NUM_IRQ_LINES: usize = 2;
}

/// Distinct PIO interrupt-line identities (2 per PIO block).
pub const NUM_PIO_IRQ_LINES: usize = pio::NUM_PIOS * pio::IRQ_LINES_PER_PIO;
/// Distinct DMA interrupt-line identities.
pub const NUM_DMA_IRQ_LINES: usize = dma::NUM_IRQ_LINES;

/// Highest bank-0 GPIO number on the largest package (QFN-80).
pub const MAX_GPIO: u8 = 47;
