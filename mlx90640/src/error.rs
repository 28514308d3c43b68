// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
#[cfg(feature = "std")]
extern crate std;

use core::fmt;

use embedded_hal::blocking::i2c;

use crate::eeprom::Mlx90640Calibration;

/// A failed bus transaction, split by which half of the `embedded-hal` API failed.
pub enum BusFault<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// A combined write-read (every read from the camera is one of these).
    Read(<I2C as i2c::WriteRead>::Error),

    /// A plain write (register updates).
    Write(<I2C as i2c::Write>::Error),
}

// Custom Debug implementation so that I2C itself doesn't need to implement Debug (like the one
// from linux-embedded-hal), only its error types.
impl<I2C> fmt::Debug for BusFault<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusFault::Read(err) => f.debug_tuple("BusFault::Read").field(err).finish(),
            BusFault::Write(err) => f.debug_tuple("BusFault::Write").field(err).finish(),
        }
    }
}

impl<I2C> Clone for BusFault<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: Clone,
    <I2C as i2c::Write>::Error: Clone,
{
    fn clone(&self) -> Self {
        match self {
            BusFault::Read(err) => BusFault::Read(err.clone()),
            BusFault::Write(err) => BusFault::Write(err.clone()),
        }
    }
}

impl<I2C> PartialEq for BusFault<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: PartialEq,
    <I2C as i2c::Write>::Error: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BusFault::Read(a), BusFault::Read(b)) => a == b,
            (BusFault::Write(a), BusFault::Write(b)) => a == b,
            _ => false,
        }
    }
}

/// Errors talking to the camera.
///
/// None of these are retried by this crate; when to try again is up to the caller.
pub enum CommError<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// The bus implementation reported an error.
    BusFault(BusFault<I2C>),

    /// There is no new frame in RAM, or the camera published a new frame while the previous one
    /// was being read out.
    DataNotReady,
}

impl<I2C> CommError<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    pub(crate) fn read(err: <I2C as i2c::WriteRead>::Error) -> Self {
        Self::BusFault(BusFault::Read(err))
    }

    pub(crate) fn write(err: <I2C as i2c::Write>::Error) -> Self {
        Self::BusFault(BusFault::Write(err))
    }
}

impl<I2C> fmt::Debug for CommError<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::BusFault(fault) => f.debug_tuple("CommError::BusFault").field(fault).finish(),
            CommError::DataNotReady => f.write_str("CommError::DataNotReady"),
        }
    }
}

impl<I2C> fmt::Display for CommError<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::BusFault(BusFault::Read(err)) => write!(f, "I²C read error: {:?}", err),
            CommError::BusFault(BusFault::Write(err)) => write!(f, "I²C write error: {:?}", err),
            CommError::DataNotReady => write!(f, "no complete frame is available yet"),
        }
    }
}

impl<I2C> Clone for CommError<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    BusFault<I2C>: Clone,
{
    fn clone(&self) -> Self {
        match self {
            CommError::BusFault(fault) => CommError::BusFault(fault.clone()),
            CommError::DataNotReady => CommError::DataNotReady,
        }
    }
}

impl<I2C> PartialEq for CommError<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    BusFault<I2C>: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CommError::BusFault(a), CommError::BusFault(b)) => a == b,
            (CommError::DataNotReady, CommError::DataNotReady) => true,
            _ => false,
        }
    }
}

/// Problems with a calibration dump.
///
/// The pixel anomaly variants still carry the extracted calibration, as the rest of the data is
/// fine and it is up to the caller whether flagged pixels are acceptable.
#[derive(Clone, PartialEq)]
// The calibration is large, but there's no allocator to box it with.
#[allow(clippy::large_enum_variant)]
pub enum ExtractionError {
    /// The dump isn't an MLX90640 calibration block.
    InvalidFormat(&'static str),

    /// More than 5 broken pixels, or more than 5 outlier pixels.
    TooManyBrokenPixels {
        broken: usize,
        outliers: usize,
        calibration: Mlx90640Calibration,
    },

    /// Two deviating pixels are next to each other, so neither can be interpolated reliably.
    AdjacentDeviatingPixels {
        first: u16,
        second: u16,
        calibration: Mlx90640Calibration,
    },
}

impl ExtractionError {
    /// The extracted calibration, if the dump was readable.
    pub fn calibration(&self) -> Option<&Mlx90640Calibration> {
        match self {
            ExtractionError::InvalidFormat(_) => None,
            ExtractionError::TooManyBrokenPixels { calibration, .. }
            | ExtractionError::AdjacentDeviatingPixels { calibration, .. } => Some(calibration),
        }
    }

    /// Take the extracted calibration, if the dump was readable.
    pub fn into_calibration(self) -> Option<Mlx90640Calibration> {
        match self {
            ExtractionError::InvalidFormat(_) => None,
            ExtractionError::TooManyBrokenPixels { calibration, .. }
            | ExtractionError::AdjacentDeviatingPixels { calibration, .. } => Some(calibration),
        }
    }

    /// A copy of this error without the calibration attached.
    pub fn fault(&self) -> ExtractionFault {
        match self {
            ExtractionError::InvalidFormat(msg) => ExtractionFault::InvalidFormat(msg),
            ExtractionError::TooManyBrokenPixels {
                broken, outliers, ..
            } => ExtractionFault::TooManyBrokenPixels {
                broken: *broken,
                outliers: *outliers,
            },
            ExtractionError::AdjacentDeviatingPixels { first, second, .. } => {
                ExtractionFault::AdjacentDeviatingPixels {
                    first: *first,
                    second: *second,
                }
            }
        }
    }
}

// The calibration has a few thousand numbers in it, leave it out.
impl fmt::Debug for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::InvalidFormat(msg) => f
                .debug_tuple("ExtractionError::InvalidFormat")
                .field(msg)
                .finish(),
            ExtractionError::TooManyBrokenPixels {
                broken, outliers, ..
            } => f
                .debug_struct("ExtractionError::TooManyBrokenPixels")
                .field("broken", broken)
                .field("outliers", outliers)
                .finish_non_exhaustive(),
            ExtractionError::AdjacentDeviatingPixels { first, second, .. } => f
                .debug_struct("ExtractionError::AdjacentDeviatingPixels")
                .field("first", first)
                .field("second", second)
                .finish_non_exhaustive(),
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.fault(), f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ExtractionError {}

/// [`ExtractionError`] without the calibration, small enough to pass around freely.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtractionFault {
    InvalidFormat(&'static str),
    TooManyBrokenPixels { broken: usize, outliers: usize },
    AdjacentDeviatingPixels { first: u16, second: u16 },
}

impl fmt::Display for ExtractionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionFault::InvalidFormat(msg) => write!(f, "invalid calibration data: {}", msg),
            ExtractionFault::TooManyBrokenPixels { broken, outliers } => write!(
                f,
                "too many deviating pixels ({} broken, {} outliers)",
                broken, outliers
            ),
            ExtractionFault::AdjacentDeviatingPixels { first, second } => write!(
                f,
                "deviating pixels {} and {} are adjacent",
                first, second
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ExtractionFault {}

#[cfg(feature = "defmt")]
impl defmt::Format for ExtractionFault {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InvalidFormat(msg) => defmt::write!(fmt, "Invalid calibration data: {}", msg),
            Self::TooManyBrokenPixels { broken, outliers } => {
                defmt::write!(fmt, "{} broken, {} outlier pixels", broken, outliers)
            }
            Self::AdjacentDeviatingPixels { first, second } => {
                defmt::write!(fmt, "Pixels {} and {} are adjacent", first, second)
            }
        }
    }
}

/// Values rejected before anything is computed or sent to the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterError {
    /// Emissivity must be in (0, 1].
    InvalidEmissivity(f32),

    /// Not one of the four ADC resolutions (given in bits, or as the raw register value).
    InvalidResolution(u8),

    /// Not one of the eight refresh rates (in Hz).
    InvalidRefreshRate(f32),

    /// Two frames of the same subpage were given where one of each is needed.
    SubpageMismatch,

    /// A buffer had the wrong length.
    BufferLength { expected: usize, actual: usize },
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::InvalidEmissivity(value) => {
                write!(f, "emissivity {} is outside of (0, 1]", value)
            }
            ParameterError::InvalidResolution(value) => {
                write!(f, "{} is not a supported ADC resolution", value)
            }
            ParameterError::InvalidRefreshRate(value) => {
                write!(f, "{}Hz is not a supported refresh rate", value)
            }
            ParameterError::SubpageMismatch => {
                write!(f, "both subpages are needed to build a full frame")
            }
            ParameterError::BufferLength { expected, actual } => write!(
                f,
                "buffer is {} elements long, expected {}",
                actual, expected
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParameterError {}

#[cfg(feature = "defmt")]
impl defmt::Format for ParameterError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InvalidEmissivity(value) => defmt::write!(fmt, "Emissivity {} not in (0, 1]", value),
            Self::InvalidResolution(value) => defmt::write!(fmt, "Unsupported resolution {}", value),
            Self::InvalidRefreshRate(value) => defmt::write!(fmt, "Unsupported refresh rate {}Hz", value),
            Self::SubpageMismatch => defmt::write!(fmt, "Subpage mismatch"),
            Self::BufferLength { expected, actual } => {
                defmt::write!(fmt, "Buffer length {}, expected {}", actual, expected)
            }
        }
    }
}

/// Everything the high-level driver can fail with.
pub enum Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    Comm(CommError<I2C>),

    Extraction(ExtractionFault),

    Parameter(ParameterError),
}

impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Comm(err) => f.debug_tuple("Error::Comm").field(err).finish(),
            Error::Extraction(err) => f.debug_tuple("Error::Extraction").field(err).finish(),
            Error::Parameter(err) => f.debug_tuple("Error::Parameter").field(err).finish(),
        }
    }
}

impl<I2C> fmt::Display for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Comm(err) => write!(f, "Communication Error: {}", err),
            Error::Extraction(err) => write!(f, "Calibration Error: {}", err),
            Error::Parameter(err) => write!(f, "Parameter Error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Comm(_) => None,
            Error::Extraction(err) => Some(err),
            Error::Parameter(err) => Some(err),
        }
    }
}

impl<I2C> PartialEq for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    CommError<I2C>: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Comm(a), Error::Comm(b)) => a == b,
            (Error::Extraction(a), Error::Extraction(b)) => a == b,
            (Error::Parameter(a), Error::Parameter(b)) => a == b,
            _ => false,
        }
    }
}

impl<I2C> From<CommError<I2C>> for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    fn from(err: CommError<I2C>) -> Self {
        Self::Comm(err)
    }
}

impl<I2C> From<ParameterError> for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    fn from(err: ParameterError) -> Self {
        Self::Parameter(err)
    }
}

impl<I2C> From<ExtractionError> for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    fn from(err: ExtractionError) -> Self {
        Self::Extraction(err.fault())
    }
}
