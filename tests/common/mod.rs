//! Simulated RP2040 peripherals for driving `Hx711Multi` without hardware.
//!
//! The simulator does not execute PIO microcode. It keeps just enough state
//! (claims, instruction memory, enabled state machines, TX FIFO writes,
//! interrupt routing, DMA busy flags) for the driver's observable behaviour to
//! be checked, and completes a capture from a configurable set of chip values.

#![allow(dead_code)]

use hx711_multi::capture::{self, CaptureBuffer};
use hx711_multi::hal::{
    DmaCaptureConfig, DmaChannel, Hardware, StateMachine, StateMachineConfig,
};
use hx711_multi::program::{self, ProgramImage, READER_PROGRAM};
use hx711_multi::{DmaIrqLine, GpioLevel, GpioPin, IrqLine, PioBlock, PioIrqLine, MAX_CHIPS};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

const NUM_SMS: usize = 4;
const NUM_DMA_CHANNELS: usize = 12;
const INSTRUCTION_MEMORY_LEN: usize = 32;

/// Initialise logging once per test binary; `RUST_LOG=trace` shows driver output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug)]
pub struct LoadedImage {
    pub pio: PioBlock,
    pub name: &'static str,
    pub offset: u8,
    pub len: usize,
}

#[derive(Debug)]
pub struct SimState {
    pub now_us: u64,
    pub system_clock_hz: u32,
    /// Total time spent in `sleep_us`.
    pub slept_us: u64,

    pub claimed_sms: [[bool; NUM_SMS]; 2],
    pub enabled_sms: [[bool; NUM_SMS]; 2],
    pub sm_configs: HashMap<(usize, u8), (u8, StateMachineConfig)>,
    pub instruction_memory: [[Option<u16>; INSTRUCTION_MEMORY_LEN]; 2],
    pub programs: Vec<LoadedImage>,
    pub pio_pins: HashSet<(usize, u8)>,
    pub pindirs: HashMap<u8, bool>,

    /// Every word written to a TX FIFO, in order.
    pub tx_words: Vec<u32>,
    /// Every instruction executed with `pio_sm_exec`, in order.
    pub executed: Vec<u16>,
    pub clock_high: bool,
    pub rx_drains: usize,
    pub pio_flags_cleared: Vec<u8>,
    pub pio_irq_sources: HashSet<(PioIrqLine, u8)>,

    pub claimed_dma: [bool; NUM_DMA_CHANNELS],
    pub dma_configs: HashMap<u8, DmaCaptureConfig>,
    pub dma_busy: [bool; NUM_DMA_CHANNELS],
    pub dma_irq_routes: HashSet<(DmaIrqLine, u8)>,
    pub dma_irq_pending: HashSet<(DmaIrqLine, u8)>,
    pub captures_started: usize,
    pub dma_aborts: usize,

    pub irq_claims: HashMap<IrqLine, u32>,
    pub reserved_irqs: HashSet<IrqLine>,

    /// Values the chips report on the next capture, in chip order.
    pub chip_values: Vec<i32>,
    /// Whether the Awaiter sees every chip ready (drives PIO flag 1).
    pub chips_ready: bool,
    /// While set, DMA transfers never complete.
    pub dma_stalled: bool,
    /// GPIO input levels, one bit per pin number.
    pub pin_levels: u64,
}

impl Default for SimState {
    fn default() -> Self {
        SimState {
            now_us: 0,
            system_clock_hz: 125_000_000,
            slept_us: 0,
            claimed_sms: [[false; NUM_SMS]; 2],
            enabled_sms: [[false; NUM_SMS]; 2],
            sm_configs: HashMap::new(),
            instruction_memory: [[None; INSTRUCTION_MEMORY_LEN]; 2],
            programs: Vec::new(),
            pio_pins: HashSet::new(),
            pindirs: HashMap::new(),
            tx_words: Vec::new(),
            executed: Vec::new(),
            clock_high: false,
            rx_drains: 0,
            pio_flags_cleared: Vec::new(),
            pio_irq_sources: HashSet::new(),
            claimed_dma: [false; NUM_DMA_CHANNELS],
            dma_configs: HashMap::new(),
            dma_busy: [false; NUM_DMA_CHANNELS],
            dma_irq_routes: HashSet::new(),
            dma_irq_pending: HashSet::new(),
            captures_started: 0,
            dma_aborts: 0,
            irq_claims: HashMap::new(),
            reserved_irqs: HashSet::new(),
            chip_values: vec![0; MAX_CHIPS],
            chips_ready: true,
            dma_stalled: false,
            pin_levels: 0,
        }
    }
}

impl SimState {
    /// Chip count the loaded Reader samples, read back from its patched slot.
    pub fn reader_pin_count(&self) -> Option<usize> {
        let image = self
            .programs
            .iter()
            .find(|p| p.name == READER_PROGRAM.name)?;
        let slot = READER_PROGRAM.pin_count_slot?;
        let word = self.instruction_memory[image.pio.index()][usize::from(image.offset + slot)]?;
        program::decode_in_pins(word)
    }

    pub fn is_sm_enabled(&self, pio: PioBlock, sm: u8) -> bool {
        self.enabled_sms[pio.index()][usize::from(sm)]
    }

    pub fn enabled_sm_count(&self) -> usize {
        self.enabled_sms.iter().flatten().filter(|e| **e).count()
    }

    pub fn claimed_sm_count(&self) -> usize {
        self.claimed_sms.iter().flatten().filter(|c| **c).count()
    }

    pub fn claimed_dma_count(&self) -> usize {
        self.claimed_dma.iter().filter(|c| **c).count()
    }

    pub fn used_instruction_words(&self) -> usize {
        self.instruction_memory.iter().flatten().filter(|w| w.is_some()).count()
    }

    pub fn irq_claim_count(&self, line: IrqLine) -> u32 {
        self.irq_claims.get(&line).copied().unwrap_or(0)
    }

    /// Words the DMA channel would move for the current chip values.
    fn capture_words(&self) -> [u32; hx711_multi::READ_BITS] {
        let chips = self.reader_pin_count().unwrap_or(MAX_CHIPS);
        capture::values_to_pinvals(&self.chip_values[..chips])
    }
}

/// Cloneable handle to a shared [`SimState`]; the test keeps one clone and
/// gives the other to the driver.
#[derive(Debug, Clone, Default)]
pub struct SimHardware {
    state: Arc<Mutex<SimState>>,
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("simulator state poisoned")
    }

    pub fn set_chip_values(&self, values: &[i32]) {
        let mut state = self.state();
        state.chip_values = vec![0; MAX_CHIPS];
        state.chip_values[..values.len()].copy_from_slice(values);
    }

    /// Sets the data lines of chips in `busy_mask` high, the rest low.
    pub fn set_busy_mask(&self, data_pin_base: u8, chips_len: usize, busy_mask: u32) {
        let mut state = self.state();
        for chip in 0..chips_len {
            let bit = 1u64 << (usize::from(data_pin_base) + chip);
            if busy_mask & (1 << chip) != 0 {
                state.pin_levels |= bit;
            } else {
                state.pin_levels &= !bit;
            }
        }
    }

    pub fn set_dma_stalled(&self, stalled: bool) {
        self.state().dma_stalled = stalled;
    }

    pub fn set_chips_ready(&self, ready: bool) {
        self.state().chips_ready = ready;
    }

    pub fn reserve_irq(&self, line: IrqLine) {
        self.state().reserved_irqs.insert(line);
    }
}

impl Hardware for SimHardware {
    fn system_clock_hz(&self) -> u32 {
        self.state().system_clock_hz
    }

    fn time_us(&self) -> u64 {
        // every poll costs a microsecond so deadlines always arrive
        let mut state = self.state();
        state.now_us += 1;
        state.now_us
    }

    fn sleep_us(&self, us: u64) {
        let mut state = self.state();
        state.now_us += us;
        state.slept_us += us;
    }

    fn gpio_set_function_pio(&self, pio: PioBlock, pin: GpioPin) {
        self.state().pio_pins.insert((pio.index(), pin.number()));
    }

    fn gpio_get(&self, pin: GpioPin) -> GpioLevel {
        GpioLevel::from(self.state().pin_levels & (1 << pin.number()) != 0)
    }

    fn pio_claim_unused_sm(&self, pio: PioBlock) -> Option<StateMachine> {
        let mut state = self.state();
        let claimed = &mut state.claimed_sms[pio.index()];
        let index = claimed.iter().position(|c| !c)?;
        claimed[index] = true;
        Some(StateMachine::new(index as u8))
    }

    fn pio_unclaim_sm(&self, pio: PioBlock, sm: StateMachine) {
        self.state().claimed_sms[pio.index()][usize::from(sm.index())] = false;
    }

    fn pio_sm_is_claimed(&self, pio: PioBlock, sm: StateMachine) -> bool {
        self.state().claimed_sms[pio.index()][usize::from(sm.index())]
    }

    fn pio_add_program(&self, pio: PioBlock, image: &ProgramImage) -> Option<u8> {
        let mut state = self.state();
        let memory = &mut state.instruction_memory[pio.index()];
        let len = image.len();
        let fits = |offset: usize| memory[offset..offset + len].iter().all(Option::is_none);
        let offset = match image.origin {
            Some(origin) => Some(usize::from(origin))
                .filter(|&o| o + len <= INSTRUCTION_MEMORY_LEN && fits(o)),
            // allocate from the top, as the SDK does
            None => (0..=INSTRUCTION_MEMORY_LEN - len).rev().find(|&o| fits(o)),
        }?;
        for (i, word) in image.instructions.iter().enumerate() {
            memory[offset + i] = Some(*word);
        }
        state.programs.push(LoadedImage {
            pio,
            name: image.name,
            offset: offset as u8,
            len,
        });
        Some(offset as u8)
    }

    fn pio_remove_program(&self, pio: PioBlock, image: &ProgramImage, offset: u8) {
        let mut state = self.state();
        let start = usize::from(offset);
        for word in &mut state.instruction_memory[pio.index()][start..start + image.len()] {
            *word = None;
        }
        state
            .programs
            .retain(|p| !(p.pio == pio && p.offset == offset && p.name == image.name));
    }

    fn pio_write_instruction(&self, pio: PioBlock, address: u8, instruction: u16) {
        self.state().instruction_memory[pio.index()][usize::from(address)] = Some(instruction);
    }

    fn pio_sm_init(
        &self,
        pio: PioBlock,
        sm: StateMachine,
        initial_pc: u8,
        config: &StateMachineConfig,
    ) {
        let mut state = self.state();
        state.enabled_sms[pio.index()][usize::from(sm.index())] = false;
        state
            .sm_configs
            .insert((pio.index(), sm.index()), (initial_pc, *config));
    }

    fn pio_set_sm_mask_enabled(&self, pio: PioBlock, mask: u32, enabled: bool) {
        let mut state = self.state();
        for (sm, slot) in state.enabled_sms[pio.index()].iter_mut().enumerate() {
            if mask & (1 << sm) != 0 {
                *slot = enabled;
            }
        }
    }

    fn pio_sm_is_enabled(&self, pio: PioBlock, sm: StateMachine) -> bool {
        self.state().is_sm_enabled(pio, sm.index())
    }

    fn pio_sm_set_consecutive_pindirs(
        &self,
        _pio: PioBlock,
        _sm: StateMachine,
        base: GpioPin,
        count: u8,
        is_out: bool,
    ) {
        let mut state = self.state();
        for pin in base.number()..base.number() + count {
            state.pindirs.insert(pin, is_out);
        }
    }

    fn pio_sm_exec(&self, _pio: PioBlock, _sm: StateMachine, instruction: u16) {
        let mut state = self.state();
        if instruction == program::encode_set_pins(1) {
            state.clock_high = true;
        } else if instruction == program::encode_set_pins(0) {
            state.clock_high = false;
        }
        state.executed.push(instruction);
    }

    fn pio_sm_put(&self, _pio: PioBlock, _sm: StateMachine, word: u32) {
        self.state().tx_words.push(word);
    }

    fn pio_sm_clear_fifos(&self, _pio: PioBlock, _sm: StateMachine) {}

    fn pio_sm_drain_rx_fifo(&self, _pio: PioBlock, _sm: StateMachine) {
        self.state().rx_drains += 1;
    }

    fn pio_interrupt_get(&self, _pio: PioBlock, flag: u8) -> bool {
        flag == 1 && self.state().chips_ready
    }

    fn pio_interrupt_clear(&self, _pio: PioBlock, flag: u8) {
        self.state().pio_flags_cleared.push(flag);
    }

    fn pio_set_irq_source_enabled(&self, line: PioIrqLine, flag: u8, enabled: bool) {
        let mut state = self.state();
        if enabled {
            state.pio_irq_sources.insert((line, flag));
        } else {
            state.pio_irq_sources.remove(&(line, flag));
        }
    }

    fn dma_claim_unused_channel(&self) -> Option<DmaChannel> {
        let mut state = self.state();
        let index = state.claimed_dma.iter().position(|c| !c)?;
        state.claimed_dma[index] = true;
        Some(DmaChannel::new(index as u8))
    }

    fn dma_unclaim_channel(&self, channel: DmaChannel) {
        self.state().claimed_dma[usize::from(channel.index())] = false;
    }

    fn dma_channel_is_claimed(&self, channel: DmaChannel) -> bool {
        self.state().claimed_dma[usize::from(channel.index())]
    }

    fn dma_configure_capture(&self, channel: DmaChannel, config: &DmaCaptureConfig) {
        self.state().dma_configs.insert(channel.index(), *config);
    }

    fn dma_start_capture(&self, channel: DmaChannel, dest: &CaptureBuffer) {
        let mut state = self.state();
        let ch = channel.index();
        state.captures_started += 1;
        if state.dma_stalled {
            state.dma_busy[usize::from(ch)] = true;
            return;
        }
        for (i, word) in state.capture_words().into_iter().enumerate() {
            dest.store(i, word);
        }
        state.dma_busy[usize::from(ch)] = false;
        let routed: Vec<DmaIrqLine> = state
            .dma_irq_routes
            .iter()
            .filter(|(_, c)| *c == ch)
            .map(|(line, _)| *line)
            .collect();
        for line in routed {
            state.dma_irq_pending.insert((line, ch));
        }
    }

    fn dma_is_busy(&self, channel: DmaChannel) -> bool {
        self.state().dma_busy[usize::from(channel.index())]
    }

    fn dma_abort(&self, channel: DmaChannel) {
        let mut state = self.state();
        state.dma_busy[usize::from(channel.index())] = false;
        state.dma_aborts += 1;
    }

    fn dma_set_irq_channel_enabled(&self, line: DmaIrqLine, channel: DmaChannel, enabled: bool) {
        let mut state = self.state();
        if enabled {
            state.dma_irq_routes.insert((line, channel.index()));
        } else {
            state.dma_irq_routes.remove(&(line, channel.index()));
        }
    }

    fn dma_irq_channel_status(&self, line: DmaIrqLine, channel: DmaChannel) -> bool {
        self.state()
            .dma_irq_pending
            .contains(&(line, channel.index()))
    }

    fn dma_acknowledge_irq(&self, line: DmaIrqLine, channel: DmaChannel) {
        self.state()
            .dma_irq_pending
            .remove(&(line, channel.index()));
    }

    fn irq_claim(&self, line: IrqLine) -> bool {
        let mut state = self.state();
        if state.reserved_irqs.contains(&line) {
            return false;
        }
        *state.irq_claims.entry(line).or_insert(0) += 1;
        true
    }

    fn irq_release(&self, line: IrqLine) {
        let mut state = self.state();
        if let Some(count) = state.irq_claims.get_mut(&line) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.irq_claims.remove(&line);
            }
        }
    }
}
