use crate::consts;
use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

impl GpioLevel {
    /// `true` for [`GpioLevel::High`].
    #[inline]
    pub fn is_high(self) -> bool {
        self == GpioLevel::High
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

/// Represents a valid bank-0 GPIO number.
/// Use `GpioPin::new(num)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpioPin(pub(crate) u8); // Make field private to enforce constructor use

impl GpioPin {
    /// Creates a new GpioPin, returning an error if the number is out of range.
    pub fn new(pin_num: u8) -> Result<Self> {
        if pin_num <= consts::MAX_GPIO {
            Ok(GpioPin(pin_num))
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: pin_num,
                max: consts::MAX_GPIO,
            })
        }
    }

    /// Returns the underlying pin number.
    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Returns the pin `n` positions above this one, if it exists.
    pub fn offset(&self, n: usize) -> Option<GpioPin> {
        let pin = usize::from(self.0).checked_add(n)?;
        u8::try_from(pin).ok().and_then(|p| GpioPin::new(p).ok())
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}
