//! Interrupt-driven captures.
//!
//! An [`AsyncRequest`] lets the foreground start a capture and come back for
//! it later. Its lifecycle:
//!
//! ```text
//! NONE --start--> WAITING --PIO irq--> READING --DMA irq--> DONE
//!   ^                                                         |
//!   +-------------------------- start ------------------------+
//! ```
//!
//! The handlers in [`DispatchTable`] drive the middle transitions, so the
//! request must stay at a fixed address while registered. That is what the
//! `Pin` in [`AsyncRequest::start`] enforces.

use crate::capture::{self, CaptureBuffer};
use crate::consts::{pio::CONVERSION_RUNNING_IRQ_NUM, READ_BITS};
use crate::device::Hx711Multi;
use crate::error::{Error, Result};
use crate::hal::{DmaIrqLine, Hardware, IrqLine, PioIrqIndex, PioIrqLine};
use crate::interrupt::DispatchTable;
use log::{debug, trace, warn};
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Where an [`AsyncRequest`] is in its capture cycle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Opened but never started, or closed.
    None = 0,
    /// Registered, waiting for the chips to start a conversion.
    Waiting = 1,
    /// Conversion running, DMA transfer in flight.
    Reading = 2,
    /// Values captured and ready to collect.
    Done = 3,
}

impl RequestState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RequestState::Waiting,
            2 => RequestState::Reading,
            3 => RequestState::Done,
            _ => RequestState::None,
        }
    }
}

/// A capture that completes in the background, driven by the PIO and DMA
/// interrupt handlers.
///
/// Borrows the device handle and the dispatch table, so both outlive it.
/// Dropping the request (or [`AsyncRequest::close`]) unregisters it, stops
/// any transfer in flight, and releases its interrupt lines.
///
/// ```ignore
/// let req = pin!(AsyncRequest::open(&hxm, &DISPATCH, PioIrqIndex::Irq0, DmaIrqLine::Dma0)?);
/// req.as_ref().start()?;
/// while !req.is_done() {
///     // other work
/// }
/// req.get_values(&mut values);
/// ```
pub struct AsyncRequest<'d, H: Hardware> {
    hxm: &'d Hx711Multi<H>,
    table: &'d DispatchTable<H>,
    pio_irq: PioIrqLine,
    dma_irq: DmaIrqLine,
    state: AtomicU8,
    bound: AtomicBool,
    buffer: CaptureBuffer,
    _pinned: PhantomPinned,
}

impl<'d, H: Hardware> AsyncRequest<'d, H> {
    /// Binds a request to `hxm`, claiming PIO interrupt line `pio_irq` of the
    /// handle's PIO block and DMA interrupt line `dma_irq`.
    ///
    /// Several requests may share the same lines; only one of them can be
    /// started at a time.
    pub fn open(
        hxm: &'d Hx711Multi<H>,
        table: &'d DispatchTable<H>,
        pio_irq: PioIrqIndex,
        dma_irq: DmaIrqLine,
    ) -> Result<Self> {
        let _guard = hxm.lock();
        let pio_irq = PioIrqLine::new(hxm.pio(), pio_irq);
        let hw = hxm.hardware();

        if !hw.irq_claim(IrqLine::Pio(pio_irq)) {
            return Err(Error::IrqLineUnavailable(IrqLine::Pio(pio_irq)));
        }
        if !hw.irq_claim(IrqLine::Dma(dma_irq)) {
            hw.irq_release(IrqLine::Pio(pio_irq));
            return Err(Error::IrqLineUnavailable(IrqLine::Dma(dma_irq)));
        }
        debug!("Opened async request on {} / {}", pio_irq, dma_irq);

        Ok(Self {
            hxm,
            table,
            pio_irq,
            dma_irq,
            state: AtomicU8::new(RequestState::None as u8),
            bound: AtomicBool::new(true),
            buffer: CaptureBuffer::new(),
            _pinned: PhantomPinned,
        })
    }

    /// Registers the request and arms the PIO interrupt; the capture then
    /// completes in the background.
    ///
    /// Fails with [`Error::DispatchTableFull`] if another request already
    /// holds either interrupt line.
    ///
    /// # Panics
    /// If the request is closed, or already `WAITING` or `READING`.
    pub fn start(self: Pin<&Self>) -> Result<()> {
        let state = self.state();
        assert!(
            matches!(state, RequestState::None | RequestState::Done),
            "cannot start a request that is {:?}",
            state
        );
        assert!(
            self.bound.load(Ordering::Acquire),
            "cannot start a closed request"
        );

        let hxm = self.hxm;
        let _guard = hxm.lock();
        if !self.table.add_request(self) {
            warn!(
                "Dispatch table full: {} or {} already in use",
                self.pio_irq, self.dma_irq
            );
            return Err(Error::DispatchTableFull {
                pio_irq: self.pio_irq,
                dma_irq: self.dma_irq,
            });
        }

        let hw = hxm.hardware();
        self.buffer.clear();
        hw.pio_sm_drain_rx_fifo(hxm.pio(), hxm.reader.sm);
        self.set_state(RequestState::Waiting);
        hw.pio_set_irq_source_enabled(self.pio_irq, CONVERSION_RUNNING_IRQ_NUM, true);
        trace!("Async request started on {}", self.pio_irq);
        Ok(())
    }

    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the capture has finished and values can be collected.
    pub fn is_done(&self) -> bool {
        self.state() == RequestState::Done
    }

    /// Fills `values[..chips_len]` from the finished capture.
    ///
    /// # Panics
    /// If the request is not `DONE`, or `values` is shorter than the chip count.
    pub fn get_values(&self, values: &mut [i32]) {
        let chips_len = self.hxm.chips_len();
        assert!(
            values.len() >= chips_len,
            "values buffer too small (expected at least {}, got {})",
            chips_len,
            values.len()
        );
        let pinvals = self.get_values_raw();
        capture::pinvals_to_values(&pinvals, &mut values[..chips_len]);
    }

    /// The finished capture as 24 bit-plane words.
    ///
    /// # Panics
    /// If the request is not `DONE`.
    pub fn get_values_raw(&self) -> [u32; READ_BITS] {
        let state = self.state();
        assert!(
            state == RequestState::Done,
            "values requested while the request is {:?}",
            state
        );
        self.buffer.snapshot()
    }

    pub fn pio_irq_line(&self) -> PioIrqLine {
        self.pio_irq
    }

    pub fn dma_irq_line(&self) -> DmaIrqLine {
        self.dma_irq
    }

    /// Unregisters the request, stops any capture in flight and releases both
    /// interrupt lines. The request cannot be started again.
    pub fn close(self: Pin<&mut Self>) {
        self.as_ref().get_ref().release();
    }

    // --- Handler stages, called by the dispatch table in a critical section ---

    pub(crate) fn pio_irq_asserted(&self) -> bool {
        self.state() == RequestState::Waiting
            && self
                .hxm
                .hardware()
                .pio_interrupt_get(self.hxm.pio(), CONVERSION_RUNNING_IRQ_NUM)
    }

    pub(crate) fn on_conversion_running(&self) {
        let hxm = self.hxm;
        let hw = hxm.hardware();
        hw.pio_set_irq_source_enabled(self.pio_irq, CONVERSION_RUNNING_IRQ_NUM, false);
        hw.pio_sm_drain_rx_fifo(hxm.pio(), hxm.reader.sm);
        hw.dma_set_irq_channel_enabled(self.dma_irq, hxm.dma_channel, true);
        self.set_state(RequestState::Reading);
        hw.dma_start_capture(hxm.dma_channel, &self.buffer);
    }

    pub(crate) fn dma_irq_asserted(&self) -> bool {
        self.state() == RequestState::Reading
            && self
                .hxm
                .hardware()
                .dma_irq_channel_status(self.dma_irq, self.hxm.dma_channel)
    }

    pub(crate) fn on_capture_complete(&self) {
        let hxm = self.hxm;
        let hw = hxm.hardware();
        hw.dma_acknowledge_irq(self.dma_irq, hxm.dma_channel);
        hw.dma_set_irq_channel_enabled(self.dma_irq, hxm.dma_channel, false);
        self.set_state(RequestState::Done);
    }

    // --- Internal helpers ---

    pub(crate) fn is_registered_with(&self, table: &DispatchTable<H>) -> bool {
        std::ptr::eq(self.table, table)
    }

    fn set_state(&self, state: RequestState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn release(&self) {
        if !self.bound.swap(false, Ordering::AcqRel) {
            return;
        }
        let hxm = self.hxm;
        let hw = hxm.hardware();
        let _guard = hxm.lock();

        // no handler may reach the request once teardown starts
        self.table.remove_request(self);
        hw.pio_set_irq_source_enabled(self.pio_irq, CONVERSION_RUNNING_IRQ_NUM, false);
        hw.dma_set_irq_channel_enabled(self.dma_irq, hxm.dma_channel, false);
        if self.state() == RequestState::Reading {
            hw.dma_abort(hxm.dma_channel);
            hw.pio_sm_drain_rx_fifo(hxm.pio(), hxm.reader.sm);
            debug!("Aborted in-flight capture on dma ch{}", hxm.dma_channel.index());
        }
        hw.irq_release(IrqLine::Dma(self.dma_irq));
        hw.irq_release(IrqLine::Pio(self.pio_irq));
        self.set_state(RequestState::None);
        debug!("Closed async request on {} / {}", self.pio_irq, self.dma_irq);
    }
}

impl<H: Hardware> Drop for AsyncRequest<'_, H> {
    fn drop(&mut self) {
        self.release();
    }
}
