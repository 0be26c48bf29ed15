//! Interrupt dispatch for async requests.
//!
//! Interrupt handlers get no user context, so the requests currently waiting
//! on each physical interrupt line are kept in a [`DispatchTable`]. The table
//! has one slot per PIO interrupt line and one per DMA interrupt line; that
//! is a hardware ceiling, not a tunable.
//!
//! The application binds its interrupt vectors to the two shared handlers:
//!
//! ```ignore
//! static DISPATCH: DispatchTable<Board> = DispatchTable::new();
//!
//! #[interrupt]
//! fn PIO0_IRQ_0() {
//!     DISPATCH.on_pio_irq();
//! }
//!
//! #[interrupt]
//! fn DMA_IRQ_0() {
//!     DISPATCH.on_dma_irq();
//! }
//! ```

use crate::consts::{NUM_DMA_IRQ_LINES, NUM_PIO_IRQ_LINES};
use crate::hal::Hardware;
use crate::request::AsyncRequest;
use critical_section::CriticalSection;
use std::marker::PhantomData;
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Maps each physical interrupt line to the request currently using it.
///
/// Slots are written by foreground code (`add_request`/`remove_request`) and
/// cleared by the matching handler. Every access happens inside a critical
/// section, which is what makes the stored pointers safe to follow: a request
/// removes itself (in a critical section) before its memory goes away, so a
/// handler never sees a dangling entry.
pub struct DispatchTable<H> {
    pio_slots: [AtomicPtr<()>; NUM_PIO_IRQ_LINES],
    dma_slots: [AtomicPtr<()>; NUM_DMA_IRQ_LINES],
    _hardware: PhantomData<fn() -> H>,
}

impl<H: Hardware> DispatchTable<H> {
    pub const fn new() -> Self {
        Self {
            pio_slots: [const { AtomicPtr::new(ptr::null_mut()) }; NUM_PIO_IRQ_LINES],
            dma_slots: [const { AtomicPtr::new(ptr::null_mut()) }; NUM_DMA_IRQ_LINES],
            _hardware: PhantomData,
        }
    }

    /// Registers `req` under both of its interrupt lines.
    ///
    /// Returns `false` without changing anything if either slot is taken:
    /// too many concurrent requests for this hardware. Only the request's own
    /// table may hold it, since that is the table it leaves on drop.
    pub(crate) fn add_request(&self, req: Pin<&AsyncRequest<'_, H>>) -> bool {
        debug_assert!(req.is_registered_with(self), "request bound to another table");
        let entry = erase(req.get_ref());
        let pio = &self.pio_slots[req.pio_irq_line().slot()];
        let dma = &self.dma_slots[req.dma_irq_line().slot()];
        critical_section::with(|_| {
            if !pio.load(Ordering::Acquire).is_null() || !dma.load(Ordering::Acquire).is_null() {
                return false;
            }
            pio.store(entry, Ordering::Release);
            dma.store(entry, Ordering::Release);
            true
        })
    }

    /// Clears every slot holding `req`.
    pub(crate) fn remove_request(&self, req: &AsyncRequest<'_, H>) {
        let entry = erase(req);
        critical_section::with(|_| {
            for slot in self.pio_slots.iter().chain(self.dma_slots.iter()) {
                let _ = slot.compare_exchange(
                    entry,
                    ptr::null_mut(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        });
    }

    /// Whether `req` occupies any slot.
    pub fn contains(&self, req: &AsyncRequest<'_, H>) -> bool {
        let entry = erase(req);
        critical_section::with(|_| {
            self.pio_slots
                .iter()
                .chain(self.dma_slots.iter())
                .any(|slot| slot.load(Ordering::Acquire) == entry)
        })
    }

    /// Number of free PIO slots.
    pub fn free_pio_slots(&self) -> usize {
        self.pio_slots
            .iter()
            .filter(|slot| slot.load(Ordering::Acquire).is_null())
            .count()
    }

    // --- Handlers ---

    /// Shared handler for every PIO interrupt line: moves the request whose
    /// conversion just started from `WAITING` to `READING`.
    pub fn on_pio_irq(&self) {
        critical_section::with(|cs| {
            if let Some(req) = self.get_pio_irq_request(cs) {
                req.on_conversion_running();
            }
        });
    }

    /// Shared handler for every DMA interrupt line: moves the request whose
    /// transfer just finished from `READING` to `DONE`.
    pub fn on_dma_irq(&self) {
        critical_section::with(|cs| {
            if let Some(req) = self.get_dma_irq_request(cs) {
                req.on_capture_complete();
            }
        });
    }

    /// Takes the request whose PIO interrupt is asserted out of its slot.
    fn get_pio_irq_request<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Option<&'cs AsyncRequest<'cs, H>> {
        take_matching(&self.pio_slots, cs, AsyncRequest::pio_irq_asserted)
    }

    /// Takes the request whose DMA interrupt is asserted out of its slot.
    fn get_dma_irq_request<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Option<&'cs AsyncRequest<'cs, H>> {
        take_matching(&self.dma_slots, cs, AsyncRequest::dma_irq_asserted)
    }
}

impl<H: Hardware> Default for DispatchTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

fn erase<H: Hardware>(req: &AsyncRequest<'_, H>) -> *mut () {
    ptr::from_ref(req).cast_mut().cast()
}

fn take_matching<'cs, H: Hardware>(
    slots: &'cs [AtomicPtr<()>],
    _cs: CriticalSection<'cs>,
    asserted: impl Fn(&AsyncRequest<'cs, H>) -> bool,
) -> Option<&'cs AsyncRequest<'cs, H>> {
    for slot in slots {
        let entry = slot.load(Ordering::Acquire);
        if entry.is_null() {
            continue;
        }
        // SAFETY: only pinned requests are stored, always in the table they
        // borrow, and they remove themselves inside a critical section before
        // being dropped. Both the reference and the request's own borrows are
        // shortened to `'cs`: a registered request and everything it borrows
        // are alive for the whole critical section, and nothing tied to `'cs`
        // outlives it.
        let req = unsafe { &*entry.cast::<AsyncRequest<'cs, H>>() };
        if asserted(req) {
            slot.store(ptr::null_mut(), Ordering::Release);
            return Some(req);
        }
    }
    None
}
