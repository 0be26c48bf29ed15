//! Device handle lifecycle and the power/sync controller.

use crate::consts;
use crate::gpio::GpioPin;
use crate::hal::{
    DmaCaptureConfig, DmaChannel, Hardware, PioBlock, StateMachine, StateMachineConfig,
};
use crate::hx711::{self, Gain, Rate};
use crate::program::{
    self, encode_set_pins, PinLayout, PioInit, ProgramContext, ProgramImage, ProgramInit,
    AWAITER_PROGRAM, READER_PROGRAM,
};
use log::{debug, trace};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Everything needed to bring up one chip array.
///
/// `new` fills in the bundled programs and their default init callbacks;
/// replace them to use a different pin layout or microcode.
pub struct Hx711MultiConfig<H> {
    pub clock_pin: GpioPin,
    pub data_pin_base: GpioPin,
    pub chips_len: usize,
    pub pio: PioBlock,
    pub pio_init: PioInit<H>,
    pub awaiter_program: &'static ProgramImage,
    pub awaiter_program_init: ProgramInit<H>,
    pub reader_program: &'static ProgramImage,
    pub reader_program_init: ProgramInit<H>,
}

impl<H: Hardware> Hx711MultiConfig<H> {
    pub fn new(
        clock_pin: GpioPin,
        data_pin_base: GpioPin,
        chips_len: usize,
        pio: PioBlock,
    ) -> Self {
        Self {
            clock_pin,
            data_pin_base,
            chips_len,
            pio,
            pio_init: program::pio_init::<H>,
            awaiter_program: &AWAITER_PROGRAM,
            awaiter_program_init: program::awaiter_program_init::<H>,
            reader_program: &READER_PROGRAM,
            reader_program_init: program::reader_program_init::<H>,
        }
    }
}

/// A state machine slot together with the program it runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadedProgram {
    pub(crate) sm: StateMachine,
    pub(crate) image: &'static ProgramImage,
    pub(crate) offset: u8,
    pub(crate) default_config: StateMachineConfig,
}

/// A handle to one array of HX711 chips sharing a clock line.
///
/// Owns the two state machines, the DMA channel and the lock serialising
/// foreground access to them. Dropping the handle (or calling
/// [`Hx711Multi::close`]) stops the state machines and releases everything.
/// Async requests borrow the handle, so it always outlives them.
pub struct Hx711Multi<H: Hardware> {
    pub(crate) hw: H,
    pub(crate) layout: PinLayout,
    pub(crate) awaiter: LoadedProgram,
    pub(crate) reader: LoadedProgram,
    pub(crate) dma_channel: DmaChannel,
    lock: Mutex<()>,
}

impl<H: Hardware> Hx711Multi<H> {
    // --- Lifecycle ---

    /// Claims two state machines and a DMA channel on `config.pio`, loads
    /// and configures both programs, and starts them together.
    ///
    /// The chips are not powered up with a particular gain; call
    /// [`Hx711Multi::power_up`] or [`Hx711Multi::sync`] for that.
    ///
    /// # Panics
    /// - if `config.chips_len` is outside 1..=32;
    /// - if the data pins run past the last GPIO or include the clock pin;
    /// - if no state machine, DMA channel or instruction memory is free.
    ///
    /// These are configuration errors, not runtime conditions.
    pub fn init(hw: H, config: &Hx711MultiConfig<H>) -> Self {
        assert!(
            (consts::MIN_CHIPS..=consts::MAX_CHIPS).contains(&config.chips_len),
            "chips_len {} out of range ({}-{})",
            config.chips_len,
            consts::MIN_CHIPS,
            consts::MAX_CHIPS
        );
        let layout = PinLayout {
            pio: config.pio,
            clock_pin: config.clock_pin,
            data_pin_base: config.data_pin_base,
            chips_len: config.chips_len,
        };
        let last_data_pin = config.data_pin_base.offset(config.chips_len - 1);
        assert!(
            last_data_pin.is_some(),
            "data pins {}+{} run past GPIO{}",
            config.data_pin_base,
            config.chips_len,
            consts::MAX_GPIO
        );
        assert!(
            !layout.data_pins().any(|pin| pin == config.clock_pin),
            "clock pin {} overlaps the data pins",
            config.clock_pin
        );

        debug!(
            "Initialising HX711 array: {} chips, clock={}, data={}.., {}",
            config.chips_len, config.clock_pin, config.data_pin_base, config.pio
        );

        let awaiter_sm = hw
            .pio_claim_unused_sm(config.pio)
            .unwrap_or_else(|| panic!("no free state machine on {} for the awaiter", config.pio));
        let reader_sm = hw
            .pio_claim_unused_sm(config.pio)
            .unwrap_or_else(|| panic!("no free state machine on {} for the reader", config.pio));
        let dma_channel = hw
            .dma_claim_unused_channel()
            .unwrap_or_else(|| panic!("no free DMA channel"));

        (config.pio_init)(&hw, &layout);

        let awaiter = load_program(
            &hw,
            &layout,
            awaiter_sm,
            config.awaiter_program,
            config.awaiter_program_init,
        );
        let reader = load_program(
            &hw,
            &layout,
            reader_sm,
            config.reader_program,
            config.reader_program_init,
        );

        hw.dma_configure_capture(
            dma_channel,
            &DmaCaptureConfig {
                pio: config.pio,
                sm: reader_sm,
                transfer_count: consts::READ_BITS as u32,
            },
        );

        let hxm = Hx711Multi {
            hw,
            layout,
            awaiter,
            reader,
            dma_channel,
            lock: Mutex::new(()),
        };
        hxm.restart_state_machines();
        debug!(
            "HX711 array ready: awaiter sm{}@{}, reader sm{}@{}, dma ch{}",
            awaiter.sm.index(),
            awaiter.offset,
            reader.sm.index(),
            reader.offset,
            dma_channel.index()
        );
        hxm
    }

    /// Stops communication with every chip and releases all resources.
    pub fn close(self) {
        // Drop does the work
    }

    /// Whether every resource this handle claimed is still claimed.
    pub fn is_initialized(&self) -> bool {
        let pio = self.layout.pio;
        self.hw.pio_sm_is_claimed(pio, self.awaiter.sm)
            && self.hw.pio_sm_is_claimed(pio, self.reader.sm)
            && self.hw.dma_channel_is_claimed(self.dma_channel)
    }

    /// Whether both state machines are running.
    pub fn is_running(&self) -> bool {
        let pio = self.layout.pio;
        self.hw.pio_sm_is_enabled(pio, self.awaiter.sm)
            && self.hw.pio_sm_is_enabled(pio, self.reader.sm)
    }

    // --- Info ---

    pub fn clock_pin(&self) -> GpioPin {
        self.layout.clock_pin
    }

    pub fn data_pin_base(&self) -> GpioPin {
        self.layout.data_pin_base
    }

    /// Number of chips sampled per capture.
    pub fn chips_len(&self) -> usize {
        self.layout.chips_len
    }

    pub fn pio(&self) -> PioBlock {
        self.layout.pio
    }

    pub fn layout(&self) -> &PinLayout {
        &self.layout
    }

    /// The hardware implementation this handle drives.
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    // --- Gain ---

    /// Sets the gain every chip uses from the next conversion on.
    ///
    /// The chips latch a new gain at the end of a read, so this performs one
    /// capture and discards it. Blocks until that capture completes.
    pub fn set_gain(&self, gain: Gain) {
        let _guard = self.lock();
        debug!("Setting gain {:?} on {} chips", gain, self.layout.chips_len);
        self.hw
            .pio_sm_put(self.layout.pio, self.reader.sm, gain.pio_value());
        // ignore: the value was read with the previous gain
        let _ = self.capture_locked(None);
    }

    // --- Power / sync ---

    /// Powers every chip up and starts the state machines with `gain`.
    ///
    /// Values are not valid until the chips have settled; see
    /// [`Hx711Multi::wait_settle`].
    pub fn power_up(&self, gain: Gain) {
        let _guard = self.lock();
        self.power_up_locked(gain);
    }

    /// Stops the state machines and holds the clock high so every chip
    /// powers down.
    pub fn power_down(&self) {
        let _guard = self.lock();
        self.power_down_locked();
    }

    /// Power-cycles every chip so they restart their conversion cycles in
    /// step. Does not wait for the chips to settle.
    pub fn sync(&self, gain: Gain) {
        let _guard = self.lock();
        debug!("Synchronising {} chips", self.layout.chips_len);
        self.power_down_locked();
        self.hw.sleep_us(hx711::POWER_DOWN_TIMEOUT_US);
        self.power_up_locked(gain);
    }

    /// Polls every chip's data line once. Bit `i` is set if chip `i` is busy
    /// (line high, conversion not ready).
    pub fn sync_state(&self) -> u32 {
        let state = self
            .layout
            .data_pins()
            .enumerate()
            .fold(0u32, |mask, (chip, pin)| {
                if self.hw.gpio_get(pin).is_high() {
                    mask | (1 << chip)
                } else {
                    mask
                }
            });
        trace!("Sync state: {:#010X}", state);
        state
    }

    /// Whether every chip is in the same phase of its conversion cycle.
    /// If not, call [`Hx711Multi::sync`] before trusting further reads.
    pub fn is_syncd(&self) -> bool {
        is_syncd_mask(self.sync_state(), self.layout.chips_len)
    }

    /// Sleeps for the chips' settling time at `rate`.
    pub fn wait_settle(&self, rate: Rate) {
        self.hw.sleep_us(rate.settling_time_us());
    }

    /// Sleeps for the chips' power-down time.
    pub fn wait_power_down(&self) {
        self.hw.sleep_us(hx711::POWER_DOWN_TIMEOUT_US);
    }

    // --- Internal helpers ---

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        // the guarded state is the hardware itself, a panic elsewhere does not corrupt it
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sm_mask(&self) -> u32 {
        self.awaiter.sm.mask() | self.reader.sm.mask()
    }

    /// Re-initialises both state machines from their default configuration and
    /// enables them in one write.
    fn restart_state_machines(&self) {
        let pio = self.layout.pio;
        for program in [&self.reader, &self.awaiter] {
            self.hw
                .pio_sm_init(pio, program.sm, program.offset, &program.default_config);
        }
        self.hw.pio_set_sm_mask_enabled(pio, self.sm_mask(), true);
    }

    fn power_up_locked(&self, gain: Gain) {
        debug!("Powering up {} chips with gain {:?}", self.layout.chips_len, gain);
        let pio = self.layout.pio;
        self.hw.pio_sm_exec(pio, self.reader.sm, encode_set_pins(0));
        self.hw.pio_sm_init(
            pio,
            self.reader.sm,
            self.reader.offset,
            &self.reader.default_config,
        );
        // pulled by the reader's first `pull noblock`
        self.hw.pio_sm_put(pio, self.reader.sm, gain.pio_value());
        self.hw.pio_sm_init(
            pio,
            self.awaiter.sm,
            self.awaiter.offset,
            &self.awaiter.default_config,
        );
        self.hw.pio_set_sm_mask_enabled(pio, self.sm_mask(), true);
    }

    fn power_down_locked(&self) {
        debug!("Powering down {} chips", self.layout.chips_len);
        let pio = self.layout.pio;
        self.hw.pio_set_sm_mask_enabled(pio, self.sm_mask(), false);
        self.hw.pio_sm_exec(pio, self.reader.sm, encode_set_pins(1));
        self.hw.sleep_us(hx711::POWER_DOWN_TIMEOUT_US);
    }
}

impl<H: Hardware> Drop for Hx711Multi<H> {
    fn drop(&mut self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let pio = self.layout.pio;
        debug!(
            "Closing HX711 array on {} (dma ch{})",
            pio,
            self.dma_channel.index()
        );
        self.hw.dma_abort(self.dma_channel);
        self.hw.pio_set_sm_mask_enabled(pio, self.sm_mask(), false);
        self.hw.pio_sm_clear_fifos(pio, self.reader.sm);
        self.hw.dma_unclaim_channel(self.dma_channel);
        for program in [&self.awaiter, &self.reader] {
            self.hw.pio_remove_program(pio, program.image, program.offset);
            self.hw.pio_unclaim_sm(pio, program.sm);
        }
    }
}

/// `true` if `mask` says every one of `chips_len` chips is in the same state.
pub fn is_syncd_mask(mask: u32, chips_len: usize) -> bool {
    let all = if chips_len >= 32 {
        u32::MAX
    } else {
        (1u32 << chips_len) - 1
    };
    let mask = mask & all;
    mask == 0 || mask == all
}

fn load_program<H: Hardware>(
    hw: &H,
    layout: &PinLayout,
    sm: StateMachine,
    image: &'static ProgramImage,
    init: ProgramInit<H>,
) -> LoadedProgram {
    let offset = hw
        .pio_add_program(layout.pio, image)
        .unwrap_or_else(|| panic!("no room on {} for program {}", layout.pio, image.name));
    let default_config = init(
        hw,
        &ProgramContext {
            layout: *layout,
            sm,
            program: image,
            offset,
        },
    );
    trace!("Loaded {} at offset {} on sm{}", image.name, offset, sm.index());
    LoadedProgram {
        sm,
        image,
        offset,
        default_config,
    }
}
