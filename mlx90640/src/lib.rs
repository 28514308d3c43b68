// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! A pure-Rust library for the Melexis MLX90640 32×24 thermal camera, covering both talking to the
//! camera over I²C and the calibration pipeline that turns its raw counts into temperatures.
//!
//! The camera ships with a large amount of per-device calibration data in its EEPROM, and every
//! frame needs a fair bit of processing with that data before it means anything. This crate has
//! two levels of API: a high-level [`Mlx90640Driver`] that handles the bus, calibration and
//! processing for you, and the individual pipeline stages underneath it for when you need more
//! control (processing frames captured elsewhere, or calibration data stored somewhere other than
//! the camera).
//!
//! This library uses the [`embedded-hal`][embedded-hal] I²C and delay traits, so it should work on
//! any platform with an `embedded-hal` implementation. It is also `no_std` compatible, with the
//! `libm` feature providing the floating point functions in place of `std`. Be aware that the
//! calibration data alone is about 12kB.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/0.2/embedded_hal/blocking/index.html
//!
//! # High-Level API
//! ```no_run
//! use mlx90640::Mlx90640Driver;
//! use linux_embedded_hal::{Delay, I2cdev};
//!
//! let i2c_bus = I2cdev::new("/dev/i2c-1").expect("/dev/i2c-1 needs to be an I2C controller");
//! // Default address for these cameras is 0x33
//! let mut camera = Mlx90640Driver::new(i2c_bus, Delay, 0x33)?;
//! // A buffer for storing the temperature "image"
//! let mut temperatures = vec![f32::NAN; camera.height() * camera.width()];
//! // One subpage at a time, so twice for the full image.
//! for _ in 0..2 {
//!     camera.wait_frame_period();
//!     camera.generate_image_if_ready(&mut temperatures)?;
//! }
//! # Ok::<(), mlx90640::Error<I2cdev>>(())
//! ```
//!
//! # Low-Level API
//! The pipeline the driver runs is available piece by piece:
//!
//! 1. [`Mlx90640Calibration::from_words`] extracts the calibration from an EEPROM dump.
//! 2. [`RawFrame`] wraps a RAM dump along with the register state it was read under, and gives the
//!    supply voltage and ambient temperature.
//! 3. [`compensate`] (and [`compensate_into`] to merge subpages) removes offsets, gain and
//!    drift, producing a [`CompensatedFrame`].
//! 4. [`to_temperatures`] turns compensated signal into object temperatures.
//! 5. [`correct`] fills in the broken and outlier pixels listed in the calibration. It works on
//!    temperatures, or on raw counts before compensation through [`RawFrame::correct`].
//!
//! # Subpages and Access Patterns
//! Not all of the image is updated at once. The imaging area is divided into two
//! [subpages][Subpage], each being updated in turn. The pixels are split into subpages depending
//! on the current [access pattern][AccessPattern]. In chess board mode (the default, and the one
//! the camera is calibrated in), the pixels alternate subpages in both the X and Y axes:
//! ```text
//! 0 1 0 1 0 1 0 1
//! 1 0 1 0 1 0 1 0
//! 0 1 0 1 0 1 0 1
//! 1 0 1 0 1 0 1 0
//! ```
//! The other access mode interleaves each row, so pixels will alternate subpages only on the Y
//! axis. This is also referred to as "TV" mode in the manufacturer's datasheet.
//! ```text
//! 0 0 0 0 0 0 0 0
//! 1 1 1 1 1 1 1 1
//! 0 0 0 0 0 0 0 0
//! 1 1 1 1 1 1 1 1
//! ```

#![no_std]
#![allow(clippy::float_cmp)]

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("Either the 'std' or 'libm' feature must be enabled.");

pub mod address;
pub mod compensation;
pub mod correction;
#[doc(hidden)]
pub mod driver;
pub mod eeprom;
#[doc(hidden)]
pub mod error;
pub mod frame;
pub mod layout;
pub mod radiometric;
pub mod register;
mod util;

pub use address::{Address, EEPROM_WORDS, RAM_WORDS};
pub use compensation::{compensate, compensate_full_frame, compensate_into, CompensatedFrame};
pub use correction::{correct, correct_pixels, CorrectionScope};
#[doc(inline)]
pub use driver::{dump_eeprom, dump_eeprom_bytes, Mlx90640Driver};
pub use eeprom::{DeviatingPixels, Mlx90640Calibration, MAX_DEVIATING_PIXELS};
#[doc(inline)]
pub use error::{BusFault, CommError, Error, ExtractionError, ExtractionFault, ParameterError};
pub use frame::RawFrame;
pub use layout::{belongs_to_subpage, pixel_index, HEIGHT, NUM_PIXELS, WIDTH};
pub use radiometric::{to_temperatures, to_temperatures_into, ReflectedTemperature, TemperatureFrame};
pub use register::*;
