//! Hardware capability primitives consumed by the driver.
//!
//! The driver never touches registers itself. Everything it needs from the
//! chip (claiming state machines and DMA channels, loading programs, moving
//! FIFO words, routing interrupts, reading the timer) goes through the
//! [`Hardware`] trait, so a board support crate implements it once on top of
//! its register access layer and the driver logic stays testable on the host.
//!
//! All methods take `&self`: the same implementation is used from foreground
//! code and from interrupt handlers, so any bookkeeping it keeps must be
//! interior-mutable and interrupt-safe.

use crate::capture::CaptureBuffer;
use crate::consts;
use crate::gpio::{GpioLevel, GpioPin};
use crate::program::ProgramImage;
use std::fmt;

/// One of the PIO blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PioBlock {
    Pio0,
    Pio1,
}

impl PioBlock {
    /// Block index (0 or 1).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            PioBlock::Pio0 => 0,
            PioBlock::Pio1 => 1,
        }
    }
}

impl fmt::Display for PioBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PIO{}", self.index())
    }
}

/// A state machine slot within a PIO block (0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateMachine(u8);

impl StateMachine {
    /// Creates a state machine identifier.
    ///
    /// # Panics
    /// If `index` is not below the number of state machines per block.
    pub const fn new(index: u8) -> Self {
        assert!(index < consts::pio::NUM_STATE_MACHINES);
        StateMachine(index)
    }

    #[inline]
    pub fn index(self) -> u8 {
        self.0
    }

    /// Bit for this state machine in a `CTRL.SM_ENABLE`-style mask.
    #[inline]
    pub fn mask(self) -> u32 {
        1 << self.0
    }
}

/// A DMA channel (0-11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmaChannel(u8);

impl DmaChannel {
    /// Creates a DMA channel identifier.
    ///
    /// # Panics
    /// If `index` is not below the number of DMA channels.
    pub const fn new(index: u8) -> Self {
        assert!(index < consts::dma::NUM_CHANNELS);
        DmaChannel(index)
    }

    #[inline]
    pub fn index(self) -> u8 {
        self.0
    }
}

/// Which of a PIO block's two interrupt outputs to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PioIrqIndex {
    Irq0,
    Irq1,
}

/// A physical PIO interrupt line: `PIOx_IRQ_y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PioIrqLine {
    pub pio: PioBlock,
    pub index: PioIrqIndex,
}

impl PioIrqLine {
    pub fn new(pio: PioBlock, index: PioIrqIndex) -> Self {
        Self { pio, index }
    }

    /// Position of this line among all PIO interrupt lines.
    #[inline]
    pub fn slot(self) -> usize {
        let index = match self.index {
            PioIrqIndex::Irq0 => 0,
            PioIrqIndex::Irq1 => 1,
        };
        self.pio.index() * consts::pio::IRQ_LINES_PER_PIO + index
    }
}

impl fmt::Display for PioIrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = match self.index {
            PioIrqIndex::Irq0 => 0,
            PioIrqIndex::Irq1 => 1,
        };
        write!(f, "{}_IRQ_{}", self.pio, index)
    }
}

/// A physical DMA interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaIrqLine {
    Dma0,
    Dma1,
}

impl DmaIrqLine {
    /// Position of this line among all DMA interrupt lines.
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            DmaIrqLine::Dma0 => 0,
            DmaIrqLine::Dma1 => 1,
        }
    }
}

impl fmt::Display for DmaIrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DMA_IRQ_{}", self.slot())
    }
}

/// Any interrupt line the driver may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqLine {
    Pio(PioIrqLine),
    Dma(DmaIrqLine),
}

impl fmt::Display for IrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqLine::Pio(line) => line.fmt(f),
            IrqLine::Dma(line) => line.fmt(f),
        }
    }
}

/// Side-set configuration of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideSet {
    /// Bits reserved for side-set, including the enable bit when optional.
    pub bit_count: u8,
    pub optional: bool,
    pub pindirs: bool,
}

/// State machine configuration, applied by [`Hardware::pio_sm_init`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateMachineConfig {
    pub clkdiv_int: u16,
    pub clkdiv_frac: u8,
    pub wrap_target: u8,
    pub wrap: u8,
    pub side_set: Option<SideSet>,
    pub side_set_base: u8,
    pub set_pins_base: u8,
    pub set_pins_count: u8,
    pub out_pins_base: u8,
    pub out_pins_count: u8,
    pub in_pins_base: u8,
    pub in_shift_right: bool,
    pub in_autopush: bool,
    pub in_push_threshold: u8,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        StateMachineConfig {
            clkdiv_int: 1,
            clkdiv_frac: 0,
            wrap_target: 0,
            wrap: 31,
            side_set: None,
            side_set_base: 0,
            set_pins_base: 0,
            set_pins_count: 0,
            out_pins_base: 0,
            out_pins_count: 32,
            in_pins_base: 0,
            in_shift_right: true,
            in_autopush: false,
            in_push_threshold: 32,
        }
    }
}

impl StateMachineConfig {
    /// Sets the clock divider from a floating point value, as 16.8 fixed point.
    pub fn set_clkdiv(&mut self, div: f32) {
        let div = div.clamp(1.0, 65536.0);
        let int = div as u32;
        if int >= 65536 {
            // 0 encodes a divider of 65536
            self.clkdiv_int = 0;
            self.clkdiv_frac = 0;
        } else {
            self.clkdiv_int = int as u16;
            self.clkdiv_frac = ((div - int as f32) * 256.0) as u8;
        }
    }

    /// The effective divider encoded in this configuration.
    pub fn clkdiv(&self) -> f32 {
        let int = if self.clkdiv_int == 0 {
            65536.0
        } else {
            f32::from(self.clkdiv_int)
        };
        int + f32::from(self.clkdiv_frac) / 256.0
    }

    pub fn set_set_pins(&mut self, base: GpioPin, count: u8) {
        self.set_pins_base = base.number();
        self.set_pins_count = count;
    }

    pub fn set_out_pins(&mut self, base: GpioPin, count: u8) {
        self.out_pins_base = base.number();
        self.out_pins_count = count;
    }

    pub fn set_side_set_pins(&mut self, base: GpioPin) {
        self.side_set_base = base.number();
    }

    pub fn set_in_pins(&mut self, base: GpioPin) {
        self.in_pins_base = base.number();
    }

    pub fn set_in_shift(&mut self, shift_right: bool, autopush: bool, push_threshold: u8) {
        self.in_shift_right = shift_right;
        self.in_autopush = autopush;
        self.in_push_threshold = push_threshold;
    }
}

/// DMA channel setup for a capture: a fixed number of 32-bit words paced by
/// a state machine's RX DREQ, read address fixed on the RX FIFO, write
/// address incrementing through the destination buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaCaptureConfig {
    pub pio: PioBlock,
    pub sm: StateMachine,
    pub transfer_count: u32,
}

/// Chip-level operations the driver relies on.
///
/// Implementations map these one-to-one onto the register level (the
/// pico-sdk `hardware_pio`, `hardware_dma` and `hardware_irq` calls of the
/// same names are the reference semantics).
pub trait Hardware {
    // --- Clocks and time ---

    /// Current `clk_sys` frequency.
    fn system_clock_hz(&self) -> u32;
    /// Monotonic microsecond timer.
    fn time_us(&self) -> u64;
    /// Busy or low-power wait for at least `us` microseconds.
    fn sleep_us(&self, us: u64);

    // --- GPIO ---

    /// Hands `pin` to the given PIO block (`pio_gpio_init`).
    fn gpio_set_function_pio(&self, pio: PioBlock, pin: GpioPin);
    /// Current input level of `pin`, whatever function drives it.
    fn gpio_get(&self, pin: GpioPin) -> GpioLevel;

    // --- PIO resources ---

    fn pio_claim_unused_sm(&self, pio: PioBlock) -> Option<StateMachine>;
    fn pio_unclaim_sm(&self, pio: PioBlock, sm: StateMachine);
    fn pio_sm_is_claimed(&self, pio: PioBlock, sm: StateMachine) -> bool;

    /// Loads `program` into instruction memory, returning its offset.
    fn pio_add_program(&self, pio: PioBlock, program: &ProgramImage) -> Option<u8>;
    fn pio_remove_program(&self, pio: PioBlock, program: &ProgramImage, offset: u8);
    /// Overwrites one loaded instruction word.
    fn pio_write_instruction(&self, pio: PioBlock, address: u8, instruction: u16);

    // --- State machine control ---

    /// Resets `sm`, applies `config` and jumps to `initial_pc`. Leaves it disabled.
    fn pio_sm_init(
        &self,
        pio: PioBlock,
        sm: StateMachine,
        initial_pc: u8,
        config: &StateMachineConfig,
    );
    /// Enables or disables every state machine in `mask` in one register write,
    /// which keeps their clock dividers in phase.
    fn pio_set_sm_mask_enabled(&self, pio: PioBlock, mask: u32, enabled: bool);
    fn pio_sm_is_enabled(&self, pio: PioBlock, sm: StateMachine) -> bool;
    fn pio_sm_set_consecutive_pindirs(
        &self,
        pio: PioBlock,
        sm: StateMachine,
        base: GpioPin,
        count: u8,
        is_out: bool,
    );
    /// Executes one instruction immediately.
    fn pio_sm_exec(&self, pio: PioBlock, sm: StateMachine, instruction: u16);
    /// Pushes a word into the TX FIFO, dropping it if the FIFO is full.
    fn pio_sm_put(&self, pio: PioBlock, sm: StateMachine, word: u32);
    fn pio_sm_clear_fifos(&self, pio: PioBlock, sm: StateMachine);
    /// Discards every word waiting in the RX FIFO.
    fn pio_sm_drain_rx_fifo(&self, pio: PioBlock, sm: StateMachine);

    // --- PIO interrupts ---

    /// Whether PIO IRQ flag `flag` is currently set.
    fn pio_interrupt_get(&self, pio: PioBlock, flag: u8) -> bool;
    fn pio_interrupt_clear(&self, pio: PioBlock, flag: u8);
    /// Routes (or stops routing) PIO IRQ flag `flag` to `line`.
    fn pio_set_irq_source_enabled(&self, line: PioIrqLine, flag: u8, enabled: bool);

    // --- DMA ---

    fn dma_claim_unused_channel(&self) -> Option<DmaChannel>;
    fn dma_unclaim_channel(&self, channel: DmaChannel);
    fn dma_channel_is_claimed(&self, channel: DmaChannel) -> bool;
    /// Configures `channel` without starting it.
    fn dma_configure_capture(&self, channel: DmaChannel, config: &DmaCaptureConfig);
    /// Points `channel` at `dest` and triggers it.
    fn dma_start_capture(&self, channel: DmaChannel, dest: &CaptureBuffer);
    fn dma_is_busy(&self, channel: DmaChannel) -> bool;
    /// Aborts any in-flight transfer and waits for the channel to go idle.
    fn dma_abort(&self, channel: DmaChannel);
    /// Routes (or stops routing) `channel`'s completion to `line`.
    fn dma_set_irq_channel_enabled(&self, line: DmaIrqLine, channel: DmaChannel, enabled: bool);
    /// Whether `channel` has a pending completion on `line`.
    fn dma_irq_channel_status(&self, line: DmaIrqLine, channel: DmaChannel) -> bool;
    fn dma_acknowledge_irq(&self, line: DmaIrqLine, channel: DmaChannel);

    // --- Interrupt lines ---

    /// Claims a shared interrupt line and enables it at the interrupt
    /// controller. Returns `false` if the line is reserved by something else.
    fn irq_claim(&self, line: IrqLine) -> bool;
    /// Drops one claim on `line`, disabling it once nothing holds it.
    fn irq_release(&self, line: IrqLine);
}
