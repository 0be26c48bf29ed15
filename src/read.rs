//! Blocking captures: arm the Reader's DMA channel and wait for it.

use crate::capture::{self, CaptureBuffer};
use crate::consts::READ_BITS;
use crate::device::Hx711Multi;
use crate::error::{Error, Result};
use crate::hal::Hardware;
use log::{trace, warn};

impl<H: Hardware> Hx711Multi<H> {
    // --- Raw captures ---

    /// Captures one conversion from every chip as 24 bit-plane words,
    /// blocking until the chips are ready and the transfer completes.
    pub fn get_values_raw(&self) -> [u32; READ_BITS] {
        let _guard = self.lock();
        match self.capture_locked(None) {
            Ok(pinvals) => pinvals,
            Err(_) => unreachable!("capture without a deadline cannot time out"),
        }
    }

    /// Like [`Hx711Multi::get_values_raw`], but gives up once the microsecond
    /// timer reaches `deadline_us`.
    ///
    /// On timeout the transfer is aborted and the Reader's FIFO cleared, so
    /// the next capture starts clean. Nothing from the partial capture is
    /// returned.
    pub fn get_values_timeout_raw(&self, deadline_us: u64) -> Result<[u32; READ_BITS]> {
        let _guard = self.lock();
        self.capture_locked(Some(deadline_us))
    }

    // --- Values ---

    /// Fills `values[..chips_len]` with one reading per chip, in chip order.
    /// Blocks until the reading is available.
    ///
    /// # Panics
    /// If `values` is shorter than [`Hx711Multi::chips_len`].
    pub fn get_values(&self, values: &mut [i32]) {
        let chips_len = self.check_values_len(values);
        let pinvals = self.get_values_raw();
        capture::pinvals_to_values(&pinvals, &mut values[..chips_len]);
    }

    /// Fills `values[..chips_len]` with one reading per chip, giving up after
    /// `timeout_us` microseconds. `values` is left untouched on timeout.
    ///
    /// # Panics
    /// If `values` is shorter than [`Hx711Multi::chips_len`].
    pub fn get_values_timeout(&self, values: &mut [i32], timeout_us: u64) -> Result<()> {
        let chips_len = self.check_values_len(values);
        let deadline_us = self.hw.time_us().saturating_add(timeout_us);
        let pinvals = self.get_values_timeout_raw(deadline_us)?;
        capture::pinvals_to_values(&pinvals, &mut values[..chips_len]);
        Ok(())
    }

    // --- Internal helpers ---

    fn check_values_len(&self, values: &[i32]) -> usize {
        let chips_len = self.chips_len();
        assert!(
            values.len() >= chips_len,
            "values buffer too small (expected at least {}, got {})",
            chips_len,
            values.len()
        );
        chips_len
    }

    /// Runs one capture. The caller must hold the device lock.
    pub(crate) fn capture_locked(&self, deadline_us: Option<u64>) -> Result<[u32; READ_BITS]> {
        let pio = self.layout.pio;
        let buffer = CaptureBuffer::new();

        // words left over from an aborted capture must not leak into this one
        self.hw.pio_sm_drain_rx_fifo(pio, self.reader.sm);
        self.hw.dma_start_capture(self.dma_channel, &buffer);
        trace!("Capture armed on dma ch{}", self.dma_channel.index());

        while self.hw.dma_is_busy(self.dma_channel) {
            if let Some(deadline_us) = deadline_us {
                if self.hw.time_us() >= deadline_us {
                    self.hw.dma_abort(self.dma_channel);
                    self.hw.pio_sm_drain_rx_fifo(pio, self.reader.sm);
                    warn!(
                        "Capture timed out on dma ch{}, transfer aborted",
                        self.dma_channel.index()
                    );
                    return Err(Error::Timeout);
                }
            }
            std::hint::spin_loop();
        }

        let pinvals = buffer.snapshot();
        trace!("Captured {:08X?}", pinvals);
        Ok(pinvals)
    }
}
