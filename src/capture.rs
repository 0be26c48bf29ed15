//! The DMA destination for one capture and its conversion into chip values.

use crate::consts::{MAX_CHIPS, READ_BITS};
use std::sync::atomic::{AtomicU32, Ordering};

/// Sign bit of a 24-bit two's-complement value.
const SIGN_BIT: u32 = 1 << (READ_BITS - 1);
/// Mask of a 24-bit value.
const VALUE_MASK: u32 = (1 << READ_BITS) - 1;

/// Twenty-four 32-bit words, one per clock pulse, MSB first. Bit `c` of word
/// `p` is the bit chip `c` put on its data line during pulse `p`.
///
/// The words are atomics so the buffer can be written by DMA (or, in a
/// simulator, by another context) while the driver only holds a shared
/// reference to it. `AtomicU32` has the layout of `u32`, so
/// [`CaptureBuffer::as_mut_ptr`] is a valid DMA write address.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    words: [AtomicU32; READ_BITS],
}

impl CaptureBuffer {
    pub const fn new() -> Self {
        Self {
            words: [const { AtomicU32::new(0) }; READ_BITS],
        }
    }

    /// Address for a DMA channel's write pointer.
    pub fn as_mut_ptr(&self) -> *mut u32 {
        self.words.as_ptr().cast::<u32>().cast_mut()
    }

    /// Stores one captured word, as a DMA transfer would.
    pub fn store(&self, index: usize, word: u32) {
        self.words[index].store(word, Ordering::Relaxed);
    }

    /// Copies the current contents out.
    pub fn snapshot(&self) -> [u32; READ_BITS] {
        std::array::from_fn(|i| self.words[i].load(Ordering::Relaxed))
    }

    /// Zeroes every word.
    pub fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }
}

/// Sign-extends a 24-bit two's-complement value.
#[inline]
pub fn i24_to_i32(raw: u32) -> i32 {
    let raw = raw & VALUE_MASK;
    if raw & SIGN_BIT != 0 {
        raw as i32 - (1 << READ_BITS)
    } else {
        raw as i32
    }
}

/// Rebuilds chip `chip`'s 24-bit value from the captured bit-planes.
///
/// # Panics
/// If `chip` is not below [`MAX_CHIPS`].
#[inline]
pub fn pinvals_to_value(pinvals: &[u32; READ_BITS], chip: usize) -> i32 {
    assert!(chip < MAX_CHIPS, "chip {chip} out of range (0-{})", MAX_CHIPS - 1);
    let raw = pinvals
        .iter()
        .enumerate()
        .fold(0u32, |acc, (pulse, word)| {
            acc | (((word >> chip) & 1) << (READ_BITS - 1 - pulse))
        });
    i24_to_i32(raw)
}

/// Converts a capture into one value per chip, filling `values` in chip order.
/// Entries past the 32nd are left untouched.
pub fn pinvals_to_values(pinvals: &[u32; READ_BITS], values: &mut [i32]) {
    for (chip, value) in values.iter_mut().take(MAX_CHIPS).enumerate() {
        *value = pinvals_to_value(pinvals, chip);
    }
}

/// Builds the capture a set of chips would produce for `values`. The inverse
/// of [`pinvals_to_values`], useful for simulators and tests. Only the first
/// 32 values fit in a word.
pub fn values_to_pinvals(values: &[i32]) -> [u32; READ_BITS] {
    std::array::from_fn(|pulse| {
        values.iter().take(MAX_CHIPS).enumerate().fold(0u32, |word, (chip, &value)| {
            let bit = ((value as u32) >> (READ_BITS - 1 - pulse)) & 1;
            word | (bit << chip)
        })
    })
}
