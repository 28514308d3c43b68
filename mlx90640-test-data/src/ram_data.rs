// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The number of RAM words the camera uses (0x0400 through 0x073F).
///
/// The first 768 are pixels, and the last 64 are auxiliary measurements (half of which are
/// reserved).
pub const RAM_WORDS: usize = 0x0740 - 0x0400;

/// Offsets (in words from 0x0400) of the auxiliary measurements in RAM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum RamOffset {
    AmbientTemperatureVbe = 0x0300,
    CompensationPixelZero = 0x0308,
    Gain = 0x030A,
    AmbientTemperaturePtat = 0x0320,
    CompensationPixelOne = 0x0328,
    PixelSupplyVoltage = 0x032A,
}

/// Control register value for the worked example: chess pattern, 18-bit ADC, 2Hz, subpages on.
pub const DATASHEET_CONTROL_REGISTER: u16 = 0x1901;

/// The RAM contents from the datasheet's worked example.
pub fn datasheet_ram_words() -> [u16; RAM_WORDS] {
    let mut ram = [0u16; RAM_WORDS];
    ram[..768].iter_mut().for_each(|pixel| *pixel = 0x0261);
    ram[RamOffset::AmbientTemperatureVbe as usize] = 0x4bf2;
    ram[RamOffset::CompensationPixelZero as usize] = 0xffca;
    ram[RamOffset::Gain as usize] = 0x1881;
    ram[RamOffset::AmbientTemperaturePtat as usize] = 0x06af;
    ram[RamOffset::CompensationPixelOne as usize] = 0xffc8;
    ram[RamOffset::PixelSupplyVoltage as usize] = 0xccc5;
    ram
}

/// A status register value with the new data flag set for the given subpage.
pub fn datasheet_status_register(subpage: u16) -> u16 {
    0x0008 | (subpage & 0x0001)
}
