// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The MLX90640 memory map.
//!
//! The camera is word-addressed (16-bit words), with big-endian words on the wire.
use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Marker newtype for addresses accessible over I²C.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Address(u16);

impl Address {
    pub const fn new(address: u16) -> Self {
        Self(address)
    }

    /// The address as it is written on the bus.
    pub(crate) fn as_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#06X})", self.0)
    }
}

impl From<u16> for Address {
    fn from(raw_address: u16) -> Self {
        Self::new(raw_address)
    }
}

impl From<Address> for u16 {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Calibration EEPROM layout.
///
/// Most of these words pack more than one value; the comments list what is in each one. The
/// discriminants are written out so they can be checked against the datasheet.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub(crate) enum EepromAddress {
    /// Start of the EEPROM. The first 16 words are device configuration, not calibration.
    Base = 0x2400,

    /// Holds the calibration mode flag and the device-select bit that marks a valid dump.
    DeviceOptions = 0x240A,

    /// α<sub>PTAT</sub> and the offset row/column/remainder scales.
    OffsetScale = 0x2410,

    OffsetAverage = 0x2411,

    OffsetRowStart = 0x2412,

    OffsetColumnStart = 0x2418,

    /// α scale, α compensation pixel scale, and α row/column/remainder scales.
    SensitivityScale = 0x2420,

    SensitivityAverage = 0x2421,

    SensitivityRowStart = 0x2422,

    SensitivityColumnStart = 0x2428,

    Gain = 0x2430,

    Ptat25 = 0x2431,

    /// K<sub>V<sub>PTAT</sub></sub> and K<sub>T<sub>PTAT</sub></sub>.
    PtatConstants = 0x2432,

    /// K<sub>V<sub>DD</sub></sub> and V<sub>DD<sub>25</sub></sub>.
    VddConstants = 0x2433,

    /// The four K<sub>V</sub> chessboard values.
    KvAverage = 0x2434,

    /// The three interleave/chess correction constants.
    InterleaveCorrection = 0x2435,

    /// K<sub>Ta</sub> for even columns; even rows in the high byte, odd rows in the low byte.
    KtaAverageEvenColumns = 0x2436,

    /// K<sub>Ta</sub> for odd columns, laid out like the even columns.
    KtaAverageOddColumns = 0x2437,

    /// K<sub>V</sub> and K<sub>Ta</sub> scales, plus the calibration ADC resolution.
    KvKtaScale = 0x2438,

    CompensationPixelSensitivity = 0x2439,

    CompensationPixelOffset = 0x243A,

    /// K<sub>V</sub> and K<sub>Ta</sub> for the compensation pixels.
    CompensationPixelConstants = 0x243B,

    /// K<sub>S<sub>Ta</sub></sub> and the temperature gradient coefficient.
    KsTaTgc = 0x243C,

    /// K<sub>S<sub>To</sub></sub> for ranges 0 and 1.
    KsToRange01 = 0x243D,

    /// K<sub>S<sub>To</sub></sub> for ranges 2 and 3.
    KsToRange23 = 0x243E,

    /// Corner temperatures, the corner temperature step and the K<sub>S<sub>To</sub></sub> scale.
    CornerTemperatures = 0x243F,

    /// First of the per-pixel calibration words, in row-major order.
    PixelStart = 0x2440,
}

impl EepromAddress {
    /// The index of this word in an EEPROM dump starting at [`EepromAddress::Base`].
    pub(crate) fn offset(self) -> usize {
        (u16::from(self) - u16::from(Self::Base)) as usize
    }
}

impl From<EepromAddress> for Address {
    fn from(eeprom_address: EepromAddress) -> Self {
        Address::new(eeprom_address.into())
    }
}

/// RAM layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub(crate) enum RamAddress {
    /// Start of RAM, which is also the first pixel. Pixels are in row-major order.
    Base = 0x0400,

    /// V<sub>BE</sub>, one half of the ambient temperature measurement.
    AmbientTemperatureVbe = 0x0700,

    /// Compensation pixel for subpage 0.
    CompensationPixelZero = 0x0708,

    /// The gain measured along with this frame.
    Gain = 0x070A,

    /// V<sub>PTAT</sub>, the other half of the ambient temperature measurement.
    AmbientTemperaturePtat = 0x0720,

    /// Compensation pixel for subpage 1.
    CompensationPixelOne = 0x0728,

    /// V<sub>DD<sub>pix</sub></sub>, the pixel supply voltage.
    PixelSupplyVoltage = 0x072A,
}

impl RamAddress {
    /// The index of this word in a RAM dump starting at [`RamAddress::Base`].
    pub(crate) fn offset(self) -> usize {
        (u16::from(self) - u16::from(Self::Base)) as usize
    }
}

impl From<RamAddress> for Address {
    fn from(ram_address: RamAddress) -> Self {
        Address::new(ram_address.into())
    }
}

/// The number of words in the calibration EEPROM.
pub const EEPROM_WORDS: usize = 0x2740 - 0x2400;

/// The number of RAM words holding a frame (pixels plus auxiliary measurements).
pub const RAM_WORDS: usize = 0x0740 - 0x0400;
