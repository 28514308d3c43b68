// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Fixtures shared by the `mlx90640` unit tests, integration tests and benchmarks.
//!
//! Everything in here is expressed in terms of raw 16-bit words (the camera's word size) so that
//! this crate does not need to depend on the driver crate it is testing.
mod eeprom_data;
mod i2c_mock;
mod ram_data;

pub use eeprom_data::{datasheet_eeprom_words, words_to_bytes, EepromEditor, EEPROM_WORDS};
pub use i2c_mock::{
    datasheet_camera_at_address, I2cOperation, MockCameraBus, MockDelay, MockError,
    CONTROL_REGISTER_ADDRESS, STATUS_REGISTER_ADDRESS,
};
pub use ram_data::{
    datasheet_ram_words, datasheet_status_register, RamOffset, DATASHEET_CONTROL_REGISTER,
    RAM_WORDS,
};
