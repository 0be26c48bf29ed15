//! Single-chip HX711 timing and gain definitions shared by every chip in the array.

/// Largest value a chip can report.
pub const MAX_VALUE: i32 = (1 << 23) - 1;
/// Smallest value a chip can report.
pub const MIN_VALUE: i32 = -(1 << 23);

/// Clock pulses per conversion before the gain pulses (one per data bit).
pub const READ_PULSES: u32 = 24;

/// How long the clock must be held high before a chip powers down.
pub const POWER_DOWN_TIMEOUT_US: u64 = 60;

/// Output settling time after power up or a gain/channel change, at 10 SPS.
pub const SETTLING_TIME_10SPS_US: u64 = 400_000;
/// Output settling time after power up or a gain/channel change, at 80 SPS.
pub const SETTLING_TIME_80SPS_US: u64 = 50_000;

/// Input channel and gain for the next conversion.
///
/// Selected by the number of clock pulses sent after the 24 data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// Channel A, gain 128 (25 pulses).
    #[default]
    A128,
    /// Channel B, gain 32 (26 pulses).
    B32,
    /// Channel A, gain 64 (27 pulses).
    A64,
}

impl Gain {
    /// Total clock pulses per conversion for this gain.
    pub fn pulses(self) -> u32 {
        match self {
            Gain::A128 => 25,
            Gain::B32 => 26,
            Gain::A64 => 27,
        }
    }

    /// Word the Reader pulls from its TX FIFO: the number of gain pulses it
    /// must emit beyond the first one.
    pub fn pio_value(self) -> u32 {
        self.pulses() - READ_PULSES - 1
    }
}

/// Output data rate, set by the RATE pin of each chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rate {
    #[default]
    Sps10,
    Sps80,
}

impl Rate {
    /// Time to wait after power up before values are trustworthy.
    pub fn settling_time_us(self) -> u64 {
        match self {
            Rate::Sps10 => SETTLING_TIME_10SPS_US,
            Rate::Sps80 => SETTLING_TIME_80SPS_US,
        }
    }
}
