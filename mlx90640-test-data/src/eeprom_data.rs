// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The number of 16-bit words in the calibration EEPROM (0x2400 through 0x273F).
pub const EEPROM_WORDS: usize = 0x2740 - 0x2400;

/// The number of words before the per-pixel calibration data starts.
const HEADER_WORDS: usize = 0x40;

/// The shared calibration words from the worked example in the datasheet.
///
/// The first 16 words are device configuration and aren't needed for calibration, so they're
/// zeroed here.
#[rustfmt::skip]
const DATASHEET_HEADER: [u16; HEADER_WORDS] = [
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x4210, 0xffbb, 0x0202, 0xf202, 0xf2f2, 0xe2e2, 0xd1e1, 0xb1d1,
    0xf10f, 0xf00f, 0xe0ef, 0xe0ef, 0xe1e1, 0xf3f2, 0xf404, 0xe504,
    0x79a6, 0x2f44, 0xffdd, 0x2210, 0x3333, 0x2233, 0xef01, 0x9acc,
    0xeedc, 0x10ff, 0x2221, 0x3333, 0x2333, 0x0112, 0xeeff, 0xbbdd,
    0x18ef, 0x2ff1, 0x5952, 0x9d68, 0x5454, 0x0994, 0x6956, 0x5354,
    0x2363, 0xe446, 0xfbb5, 0x044b, 0xf020, 0x9797, 0x9797, 0x2889,
];

/// The pixel calibration word used for the worked example pixel.
const DATASHEET_PIXEL: u16 = 0x08a0;

/// The datasheet's example EEPROM, with every pixel using the worked example's calibration word.
pub fn datasheet_eeprom_words() -> [u16; EEPROM_WORDS] {
    let mut words = [DATASHEET_PIXEL; EEPROM_WORDS];
    words[..HEADER_WORDS].copy_from_slice(&DATASHEET_HEADER);
    words
}

/// Serialize words into the big-endian byte order they are sent over I²C in.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

/// Small helper for building synthetic EEPROM images out of the datasheet one.
///
/// All offsets are word offsets from the start of the EEPROM (0x2400).
#[derive(Clone, Debug, PartialEq)]
pub struct EepromEditor {
    words: [u16; EEPROM_WORDS],
}

impl EepromEditor {
    pub fn from_datasheet() -> Self {
        Self {
            words: datasheet_eeprom_words(),
        }
    }

    /// Replace a single word.
    pub fn set_word(mut self, offset: usize, value: u16) -> Self {
        self.words[offset] = value;
        self
    }

    /// Replace a run of words with the same value.
    pub fn fill_words(mut self, start: usize, count: usize, value: u16) -> Self {
        self.words[start..(start + count)]
            .iter_mut()
            .for_each(|word| *word = value);
        self
    }

    /// Replace the calibration word for a pixel (row-major index).
    pub fn set_pixel(self, pixel_index: usize, value: u16) -> Self {
        self.set_word(HEADER_WORDS + pixel_index, value)
    }

    /// Replace every pixel calibration word.
    pub fn fill_pixels(self, value: u16) -> Self {
        self.fill_words(HEADER_WORDS, EEPROM_WORDS - HEADER_WORDS, value)
    }

    /// Zero out every offset term, both for the pixels and the compensation pixels.
    ///
    /// The pixel words are replaced with one that keeps a non-zero sensitivity remainder (so the
    /// pixel isn't treated as broken) but has a zero offset and K<sub>Ta</sub> remainder.
    pub fn without_offsets(self) -> Self {
        self
            // Offset average
            .set_word(0x11, 0x0000)
            // Row and column offsets
            .fill_words(0x12, 14, 0x0000)
            // Compensation pixel offsets
            .set_word(0x3A, 0x0000)
            .fill_pixels(0x00a0)
    }

    pub fn words(&self) -> &[u16; EEPROM_WORDS] {
        &self.words
    }

    pub fn into_words(self) -> [u16; EEPROM_WORDS] {
        self.words
    }
}
