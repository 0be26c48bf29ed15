//! The Awaiter/Reader program pair and how they are wired to the pins.
//!
//! Both programs are fixed, pre-assembled images. The only run-time change is
//! one `in pins, N` instruction per image whose bit count is patched to the
//! number of chips, so the same image drives 1 to 32 chips.
//!
//! Handshake between the two state machines:
//!
//! 1. the Reader raises IRQ 0 and parks until it is cleared;
//! 2. the Awaiter clears IRQ 0, then polls the data lines until every chip
//!    pulls its line low (conversion ready) and raises IRQ 1 ("conversion
//!    running");
//! 3. the Reader wakes on IRQ 1, emits 24 clock pulses sampling every data
//!    line on each one and pushing one word per pulse into its RX FIFO;
//! 4. the Reader emits the gain pulses and loops back to 1: one on the
//!    side-set path, then as many more as the last word pulled from its TX
//!    FIFO says (0 to 2).

use crate::consts;
use crate::gpio::GpioPin;
use crate::hal::{Hardware, PioBlock, SideSet, StateMachine, StateMachineConfig};
use log::trace;

/// A pre-assembled PIO program with an optional patchable pin-count slot.
///
/// Jump targets are relative to the start of the image; the [`Hardware`]
/// implementation relocates them when loading, as `pio_add_program` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramImage {
    pub name: &'static str,
    pub instructions: &'static [u16],
    /// Fixed load address, or `None` to load anywhere.
    pub origin: Option<u8>,
    pub wrap_target: u8,
    pub wrap: u8,
    pub side_set: Option<SideSet>,
    /// Index of the `in pins, N` instruction whose bit count is the chip count.
    pub pin_count_slot: Option<u8>,
}

impl ProgramImage {
    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The configuration the assembler would emit for this image loaded at `offset`.
    pub fn default_config(&self, offset: u8) -> StateMachineConfig {
        StateMachineConfig {
            wrap_target: offset + self.wrap_target,
            wrap: offset + self.wrap,
            side_set: self.side_set,
            ..StateMachineConfig::default()
        }
    }

    /// Rewrites the pin-count slot of this image, loaded at `offset`, to
    /// sample `pin_count` pins. Returns `false` if the image has no slot.
    pub fn patch_pin_count<H: Hardware>(
        &self,
        hw: &H,
        pio: PioBlock,
        offset: u8,
        pin_count: usize,
    ) -> bool {
        let Some(slot) = self.pin_count_slot else {
            return false;
        };
        let instruction = encode_in_pins(pin_count);
        trace!(
            "Patching {} at {}+{}: {:#06X} (in pins, {})",
            self.name,
            offset,
            slot,
            instruction,
            pin_count
        );
        hw.pio_write_instruction(pio, offset + slot, instruction);
        true
    }
}

const READER_INSTRUCTIONS: [u16; 18] = [
    0xe020, //  0: set    x, 0
    0x8080, //  1: pull   noblock
    0xa027, //  2: mov    x, osr
    //     .wrap_target
    0xe057, //  3: set    y, 23
    0xc020, //  4: irq    wait 0
    0xc042, //  5: irq    clear 2
    0x20c1, //  6: wait   1 irq, 1
    0xe001, //  7: set    pins, 1
    0x4001, //  8: in     pins, 1          <- chip count
    0xe000, //  9: set    pins, 0
    0x8020, // 10: push   block
    0x0087, // 11: jmp    y--, 7
    0x9880, // 12: pull   noblock   side 1
    0x6022, // 13: out    x, 2
    0x1023, // 14: jmp    !x, 3     side 0
    0x0050, // 15: jmp    x--, 16
    0xe101, // 16: set    pins, 1       [1]
    0x1150, // 17: jmp    x--, 16   side 0 [1]
            //     .wrap
];

/// Samples every data line on each clock pulse and emits the gain pulses.
pub const READER_PROGRAM: ProgramImage = ProgramImage {
    name: "hx711_multi_reader",
    instructions: &READER_INSTRUCTIONS,
    origin: None,
    wrap_target: 3,
    wrap: 17,
    side_set: Some(SideSet {
        bit_count: 2,
        optional: true,
        pindirs: false,
    }),
    pin_count_slot: Some(8),
};

const AWAITER_INSTRUCTIONS: [u16; 7] = [
    //     .wrap_target
    0x20c0, //  0: wait   1 irq, 0
    0xa0c3, //  1: mov    isr, null
    0x4001, //  2: in     pins, 1          <- chip count
    0xa026, //  3: mov    x, isr
    0x0026, //  4: jmp    !x, 6
    0x0001, //  5: jmp    1
    0xc001, //  6: irq    nowait 1
            //     .wrap
];

/// Waits for the Reader to park, then for every chip to be ready, then
/// raises the "conversion running" flag.
pub const AWAITER_PROGRAM: ProgramImage = ProgramImage {
    name: "hx711_multi_awaiter",
    instructions: &AWAITER_INSTRUCTIONS,
    origin: None,
    wrap_target: 0,
    wrap: 6,
    side_set: None,
    pin_count_slot: Some(2),
};

/// Encodes `in pins, bit_count`.
///
/// # Panics
/// If `bit_count` is not in 1..=32.
pub fn encode_in_pins(bit_count: usize) -> u16 {
    assert!(
        (1..=32).contains(&bit_count),
        "in bit count {bit_count} out of range (1-32)"
    );
    // 32 is encoded as 0
    0x4000 | (bit_count as u16 & 0x1f)
}

/// Bit count of an `in pins, N` instruction, or `None` for anything else.
pub fn decode_in_pins(instruction: u16) -> Option<usize> {
    let is_in = instruction & 0xe000 == 0x4000;
    let from_pins = instruction & 0x00e0 == 0;
    if !(is_in && from_pins) {
        return None;
    }
    match usize::from(instruction & 0x1f) {
        0 => Some(32),
        n => Some(n),
    }
}

/// Encodes `set pins, value`.
pub fn encode_set_pins(value: u8) -> u16 {
    0xe000 | u16::from(value & 0x1f)
}

/// Divider that runs a state machine at `target_hz` from `system_clock_hz`.
pub fn clock_divider(system_clock_hz: u32, target_hz: u32) -> f32 {
    system_clock_hz as f32 / target_hz as f32
}

/// Where the chip array is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLayout {
    pub pio: PioBlock,
    pub clock_pin: GpioPin,
    pub data_pin_base: GpioPin,
    pub chips_len: usize,
}

impl PinLayout {
    /// Data pins in chip order.
    pub fn data_pins(&self) -> impl Iterator<Item = GpioPin> + '_ {
        (0..self.chips_len).filter_map(move |i| self.data_pin_base.offset(i))
    }
}

/// What a program-init callback is configuring.
#[derive(Debug, Clone, Copy)]
pub struct ProgramContext<'a> {
    pub layout: PinLayout,
    pub sm: StateMachine,
    pub program: &'a ProgramImage,
    pub offset: u8,
}

/// Prepares pins and PIO flags before any program is loaded.
pub type PioInit<H> = fn(&H, &PinLayout);
/// Configures one loaded program's state machine and returns its default configuration.
pub type ProgramInit<H> = fn(&H, &ProgramContext<'_>) -> StateMachineConfig;

/// Hands the clock and data pins to the PIO block and clears the handshake flags.
pub fn pio_init<H: Hardware>(hw: &H, layout: &PinLayout) {
    hw.gpio_set_function_pio(layout.pio, layout.clock_pin);
    for pin in layout.data_pins() {
        hw.gpio_set_function_pio(layout.pio, pin);
    }
    hw.pio_interrupt_clear(layout.pio, consts::pio::APP_WAIT_IRQ_NUM);
    hw.pio_interrupt_clear(layout.pio, consts::pio::CONVERSION_RUNNING_IRQ_NUM);
    hw.pio_interrupt_clear(layout.pio, consts::pio::DATA_READY_IRQ_NUM);
}

/// Default Reader setup: chip-count patch, 10MHz clock, clock pin on the
/// set/out/side-set paths, data pins as inputs shifted in left.
pub fn reader_program_init<H: Hardware>(hw: &H, ctx: &ProgramContext<'_>) -> StateMachineConfig {
    let layout = &ctx.layout;
    ctx.program
        .patch_pin_count(hw, layout.pio, ctx.offset, layout.chips_len);

    let mut cfg = ctx.program.default_config(ctx.offset);
    cfg.set_clkdiv(clock_divider(
        hw.system_clock_hz(),
        consts::pio::SM_TARGET_HZ,
    ));

    // clock pin
    hw.pio_sm_set_consecutive_pindirs(layout.pio, ctx.sm, layout.clock_pin, 1, true);
    cfg.set_set_pins(layout.clock_pin, 1);
    cfg.set_out_pins(layout.clock_pin, 1);
    cfg.set_side_set_pins(layout.clock_pin);

    // data pins
    hw.pio_sm_set_consecutive_pindirs(
        layout.pio,
        ctx.sm,
        layout.data_pin_base,
        layout.chips_len as u8,
        false,
    );
    cfg.set_in_pins(layout.data_pin_base);
    cfg.set_in_shift(false, false, 32);

    hw.pio_sm_clear_fifos(layout.pio, ctx.sm);
    cfg
}

/// Default Awaiter setup: chip-count patch, 10MHz clock, data pins as inputs.
pub fn awaiter_program_init<H: Hardware>(hw: &H, ctx: &ProgramContext<'_>) -> StateMachineConfig {
    let layout = &ctx.layout;
    ctx.program
        .patch_pin_count(hw, layout.pio, ctx.offset, layout.chips_len);

    let mut cfg = ctx.program.default_config(ctx.offset);
    cfg.set_clkdiv(clock_divider(
        hw.system_clock_hz(),
        consts::pio::SM_TARGET_HZ,
    ));

    hw.pio_sm_set_consecutive_pindirs(
        layout.pio,
        ctx.sm,
        layout.data_pin_base,
        layout.chips_len as u8,
        false,
    );
    cfg.set_in_pins(layout.data_pin_base);
    cfg.set_in_shift(false, false, 32);

    hw.pio_sm_clear_fifos(layout.pio, ctx.sm);
    cfg
}
