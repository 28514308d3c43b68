// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The two registers the driver uses, and the values packed into them.
use core::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::address::Address;
use crate::error::ParameterError;
use crate::util::is_bit_set;

/// Trait for common register functionality.
pub trait Register: Into<u16> + From<u16> {
    /// A bit mask of which bits can be modified by the controller.
    ///
    /// When changing register values on the camera, the current value should be read, then
    /// bitwise-ANDed with the complement of this mask, then bitwise-ORd with the new value. This
    /// preserves the values of any reserved bits in the registers.
    fn write_mask() -> u16;

    /// The address of this register in the camera's memory map.
    fn address() -> Address;
}

/// The status register (0x8000).
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct StatusRegister {
    /// The subpage which was last updated by the camera. Read-only.
    last_updated_subpage: Subpage,

    /// Set by the camera when there's a new subpage in RAM. Only the controller can clear it.
    new_data: bool,

    /// Whether data in RAM can be overwritten.
    overwrite_enabled: bool,

    /// Start a measurement in step mode. The camera clears this once the measurement is done.
    start_measurement: bool,
}

impl StatusRegister {
    pub fn last_updated_subpage(&self) -> Subpage {
        self.last_updated_subpage
    }

    pub fn new_data(&self) -> bool {
        self.new_data
    }

    pub fn overwrite_enabled(&self) -> bool {
        self.overwrite_enabled
    }

    pub fn start_measurement(&self) -> bool {
        self.start_measurement
    }

    pub fn set_overwrite_enabled(&mut self, enabled: bool) {
        self.overwrite_enabled = enabled;
    }

    /// The value written back after reading a frame out: clear the new data flag, let the camera
    /// overwrite RAM, and kick off the next measurement.
    ///
    /// This is the 0x0030 the vendor driver writes.
    pub(crate) fn acknowledged(mut self) -> Self {
        self.new_data = false;
        self.overwrite_enabled = true;
        self.start_measurement = true;
        self
    }
}

impl Register for StatusRegister {
    fn write_mask() -> u16 {
        // The three least significant bits are read-only.
        0x0038
    }

    fn address() -> Address {
        Address::new(0x8000)
    }
}

impl From<u16> for StatusRegister {
    fn from(raw: u16) -> Self {
        // Only the lowest bit is used for the subpage, the other two are reserved.
        let last_updated_subpage = if is_bit_set(raw, 0) {
            Subpage::One
        } else {
            Subpage::Zero
        };
        Self {
            last_updated_subpage,
            new_data: is_bit_set(raw, 3),
            overwrite_enabled: is_bit_set(raw, 4),
            start_measurement: is_bit_set(raw, 5),
        }
    }
}

impl From<StatusRegister> for u16 {
    fn from(status: StatusRegister) -> Self {
        let subpage_int: usize = status.last_updated_subpage.into();
        subpage_int as u16
            | (status.new_data as u16) << 3
            | (status.overwrite_enabled as u16) << 4
            | (status.start_measurement as u16) << 5
    }
}

/// The control register (0x800D).
///
/// The refresh rate, ADC resolution and access pattern live here, so this is where most of the
/// device configuration is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
// skip formatting in here as rustfmt will remove the extra blank lines around the "extra" bit
// comments.
#[rustfmt::skip]
pub struct ControlRegister {
    // Fields are in order of the bits they occupy, least significant first.

    /// Whether or not to use subpages. Default on.
    use_subpages: bool,

    /// "Step mode", where the camera idles until told to measure. Default off.
    step_mode: bool,

    /// Only copy measurements to RAM when the overwrite flag is set. Default off.
    data_hold: bool,

    /// Keep measuring the same subpage (`subpage`) instead of alternating. Default off.
    subpage_repeat: bool,

    /// The subpage measured in subpage repeat mode.
    subpage: Subpage,

    // `subpage` takes up three bits.

    /// See the note on [`FrameRate`] for bus speed requirements. Default 2Hz.
    frame_rate: FrameRate,

    // `frame_rate` takes up three bits

    /// Default 18 bits.
    resolution: Resolution,

    // `resolution` takes up two bits.

    /// Default chess.
    access_pattern: AccessPattern,

    // The rest of the bits are reserved.
}

impl ControlRegister {
    pub fn use_subpages(&self) -> bool {
        self.use_subpages
    }

    pub fn step_mode(&self) -> bool {
        self.step_mode
    }

    pub fn data_hold(&self) -> bool {
        self.data_hold
    }

    pub fn subpage_repeat(&self) -> bool {
        self.subpage_repeat
    }

    pub fn subpage(&self) -> Subpage {
        self.subpage
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn access_pattern(&self) -> AccessPattern {
        self.access_pattern
    }

    pub fn set_frame_rate(&mut self, frame_rate: FrameRate) {
        self.frame_rate = frame_rate;
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    pub fn set_access_pattern(&mut self, access_pattern: AccessPattern) {
        self.access_pattern = access_pattern;
    }
}

impl Default for ControlRegister {
    /// The power-on defaults from the datasheet.
    fn default() -> Self {
        Self {
            use_subpages: true,
            step_mode: false,
            data_hold: false,
            subpage_repeat: false,
            subpage: Subpage::Zero,
            frame_rate: FrameRate::default(),
            resolution: Resolution::default(),
            access_pattern: AccessPattern::Chess,
        }
    }
}

impl Register for ControlRegister {
    fn write_mask() -> u16 {
        // *Technically* it's 0x1FFD, but the second bit is documented to always be 0
        0x1FFF
    }

    fn address() -> Address {
        Address::new(0x800D)
    }
}

impl From<u16> for ControlRegister {
    fn from(raw: u16) -> Self {
        let subpage = if is_bit_set(raw, 4) {
            Subpage::One
        } else {
            Subpage::Zero
        };
        let access_pattern = if is_bit_set(raw, 12) {
            AccessPattern::Chess
        } else {
            AccessPattern::Interleave
        };
        Self {
            use_subpages: is_bit_set(raw, 0),
            step_mode: is_bit_set(raw, 1),
            data_hold: is_bit_set(raw, 2),
            subpage_repeat: is_bit_set(raw, 3),
            subpage,
            frame_rate: FrameRate::from_bits(raw >> 7),
            resolution: Resolution::from_bits(raw >> 10),
            access_pattern,
        }
    }
}

impl From<ControlRegister> for u16 {
    fn from(register: ControlRegister) -> Self {
        let subpage_int: usize = register.subpage.into();
        let access_pattern_int: u8 = register.access_pattern.into();
        register.use_subpages as u16
            | (register.step_mode as u16) << 1
            | (register.data_hold as u16) << 2
            | (register.subpage_repeat as u16) << 3
            | (subpage_int as u16) << 4
            | register.frame_rate.as_raw() << 7
            | register.resolution.as_raw() << 10
            | (access_pattern_int as u16) << 12
    }
}

/// Identify which subpage to access.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum Subpage {
    Zero = 0,
    One = 1,
}

impl Subpage {
    /// The subpage that isn't this one.
    pub fn other(self) -> Self {
        match self {
            Subpage::Zero => Subpage::One,
            Subpage::One => Subpage::Zero,
        }
    }
}

/// The possible refresh rates supported by the camera. Before using the higher refresh rates,
/// ensure your I²C bus is fast enough. A quick rundown of the the maximum frame rate some common
/// I²C bus speeds can support:
///
/// * 100kHz: [4Hz][FrameRate::Four]
/// * 400kHz: [16Hz][FrameRate::Sixteen]
/// * 1MHz: [64Hz][FrameRate::SixtyFour] (barely, [32Hz][FrameRate::ThirtyTwo] is safer)
///
/// Each "frame" here is one subpage, so a full image takes two.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum FrameRate {
    /// 0.5 Hz, one frame every two seconds.
    Half,

    /// 1Hz.
    One,

    /// 2Hz, the default.
    Two,

    // 4Hz.
    Four,

    // 8Hz.
    Eight,

    // 16 Hz.
    Sixteen,

    // 32Hz.
    ThirtyTwo,

    // 64Hz.
    SixtyFour,
}

impl FrameRate {
    /// Attempt to create a `FrameRate` from the 3-bit value used in the control register.
    pub fn from_raw(raw_value: u16) -> Result<Self, ParameterError> {
        if raw_value > 7 {
            Err(ParameterError::InvalidRefreshRate(raw_value as f32))
        } else {
            Ok(Self::from_bits(raw_value))
        }
    }

    /// Decode the lowest three bits, ignoring the rest.
    fn from_bits(raw_value: u16) -> Self {
        match raw_value & 0x7 {
            0 => Self::Half,
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Four,
            4 => Self::Eight,
            5 => Self::Sixteen,
            6 => Self::ThirtyTwo,
            _ => Self::SixtyFour,
        }
    }

    /// The 3-bit value used in the control register.
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Half => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 3,
            Self::Eight => 4,
            Self::Sixteen => 5,
            Self::ThirtyTwo => 6,
            Self::SixtyFour => 7,
        }
    }

    /// Time between subpages, in milliseconds.
    pub fn period_ms(&self) -> u16 {
        match self {
            Self::Half => 2000,
            Self::One => 1000,
            Self::Two => 500,
            Self::Four => 250,
            Self::Eight => 125,
            // Rounded up so that waiting a period always lands after the new subpage.
            Self::Sixteen => 63,
            Self::ThirtyTwo => 32,
            Self::SixtyFour => 16,
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::Two
    }
}

impl TryFrom<f32> for FrameRate {
    type Error = ParameterError;

    /// Attempt to create a `FrameRate` from a number of Hz.
    ///
    /// This will only work if the source number *exactly* matches one of the rates.
    /// ```
    /// # use core::convert::TryFrom;
    /// # use mlx90640::FrameRate;
    /// assert_eq!(FrameRate::try_from(0.5), Ok(FrameRate::Half));
    /// let almost_half = 0.50001;
    /// assert!(FrameRate::try_from(almost_half).is_err());
    /// ```
    #[allow(clippy::float_cmp)]
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        // Feeling a little lispy in here
        [
            Self::Half,
            Self::One,
            Self::Two,
            Self::Four,
            Self::Eight,
            Self::Sixteen,
            Self::ThirtyTwo,
            Self::SixtyFour,
        ]
        .iter()
        .copied()
        .find(|rate| f32::from(*rate) == value)
        .ok_or(ParameterError::InvalidRefreshRate(value))
    }
}

impl TryFrom<u8> for FrameRate {
    type Error = ParameterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        // No way to say 0.5, so skipping it
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            32 => Ok(Self::ThirtyTwo),
            64 => Ok(Self::SixtyFour),
            _ => Err(ParameterError::InvalidRefreshRate(f32::from(value))),
        }
    }
}

impl From<FrameRate> for f32 {
    fn from(frame_rate: FrameRate) -> Self {
        match frame_rate {
            FrameRate::Half => 0.5,
            FrameRate::One => 1f32,
            FrameRate::Two => 2f32,
            FrameRate::Four => 4f32,
            FrameRate::Eight => 8f32,
            FrameRate::Sixteen => 16f32,
            FrameRate::ThirtyTwo => 32f32,
            FrameRate::SixtyFour => 64f32,
        }
    }
}

/// The resolution of the internal ADC.
///
/// Changing it changes the scale of the raw counts, which the compensation step corrects for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Resolution {
    /// 16-bit.
    Sixteen,

    /// 17-bit.
    Seventeen,

    /// 18-bit, the default.
    Eighteen,

    /// 19-bit.
    Nineteen,
}

impl Resolution {
    /// Attempt to create a `Resolution` from the 2-bit value used in the control register.
    pub fn from_raw(raw_value: u16) -> Result<Self, ParameterError> {
        if raw_value > 3 {
            Err(ParameterError::InvalidResolution(raw_value as u8))
        } else {
            Ok(Self::from_bits(raw_value))
        }
    }

    fn from_bits(raw_value: u16) -> Self {
        match raw_value & 0x3 {
            0 => Self::Sixteen,
            1 => Self::Seventeen,
            2 => Self::Eighteen,
            _ => Self::Nineteen,
        }
    }

    /// The 2-bit value used in the control register (and the calibration data).
    pub fn as_raw(&self) -> u16 {
        match self {
            Self::Sixteen => 0,
            Self::Seventeen => 1,
            Self::Eighteen => 2,
            Self::Nineteen => 3,
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = ParameterError;

    /// Create a `Resolution` from a number of bits.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            16 => Ok(Self::Sixteen),
            17 => Ok(Self::Seventeen),
            18 => Ok(Self::Eighteen),
            19 => Ok(Self::Nineteen),
            _ => Err(ParameterError::InvalidResolution(value)),
        }
    }
}

impl From<Resolution> for u8 {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Sixteen => 16,
            Resolution::Seventeen => 17,
            Resolution::Eighteen => 18,
            Resolution::Nineteen => 19,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Eighteen
    }
}

/// How pixels are split between the two subpages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessPattern {
    /// Pixels alternate between subpages like the squares of a chess board.
    ///
    /// This is the default, and the mode the camera is calibrated in.
    Chess = 1,

    /// Whole rows belong to one subpage, alternating row by row.
    Interleave = 0,
}
