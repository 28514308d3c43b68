// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Calibration data extraction.
//!
//! Every MLX90640 has a block of factory calibration data in its EEPROM. The datasheet describes
//! how to unpack it with pages of formulas, but the majority of them are converting unsigned
//! integers to signed ones (`if x > 2^(n-1) - 1 { x -= 2^n }`) or masking and dividing by a power
//! of two (a shift). Those are written here with [`signed_field`] and [`unsigned_field`].
use arrayvec::ArrayVec;

use crate::address::{EepromAddress, EEPROM_WORDS};
use crate::error::ExtractionError;
use crate::layout::{pixel_coordinates, HEIGHT, NUM_PIXELS, WIDTH};
use crate::register::{AccessPattern, Resolution, Subpage};
use crate::util::{
    bytes_to_words, is_bit_set, log_debug, log_warn, pow2, signed_field, unsigned_field,
    word_to_i4s, WORD_SIZE,
};

/// The most broken pixels (and separately, outlier pixels) a camera can have.
pub const MAX_DEVIATING_PIXELS: usize = 5;

/// The number of corner temperatures (and temperature ranges).
pub const NUM_CORNER_TEMPERATURES: usize = 4;

/// A list of deviating pixel indices.
pub type DeviatingPixels = ArrayVec<u16, MAX_DEVIATING_PIXELS>;

/// MLX90640 calibration data, unpacked.
///
/// This is immutable once extracted, so a single instance can be shared between any number of
/// frame conversions.
#[derive(Clone, Debug, PartialEq)]
pub struct Mlx90640Calibration {
    k_v_dd: i16,

    v_dd_25: i16,

    resolution: Resolution,

    k_v_ptat: f32,

    k_t_ptat: f32,

    v_ptat_25: f32,

    alpha_ptat: f32,

    gain: f32,

    k_s_ta: f32,

    temperature_gradient_coefficient: f32,

    corner_temperatures: [i16; NUM_CORNER_TEMPERATURES],

    k_s_to: [f32; NUM_CORNER_TEMPERATURES],

    /// Sensitivity correction for each temperature range, derived from `k_s_to` and the corner
    /// temperatures.
    alpha_correction: [f32; NUM_CORNER_TEMPERATURES],

    alpha_pixels: [f32; NUM_PIXELS],

    offset_pixels: [i16; NUM_PIXELS],

    k_ta_pixels: [f32; NUM_PIXELS],

    k_v_pixels: [f32; NUM_PIXELS],

    alpha_cp: [f32; 2],

    offset_cp: [i16; 2],

    k_ta_cp: f32,

    k_v_cp: f32,

    calibration_pattern: AccessPattern,

    interleave_correction: [f32; 3],

    broken_pixels: DeviatingPixels,

    outlier_pixels: DeviatingPixels,
}

/// Unpack a row/column/remainder encoded pixel array (used for both offsets and sensitivities).
///
/// `scale_word` holds the remainder, column and row scales in its three lowest nibbles. The row
/// and column deltas are signed nibbles, least significant first, 4 to a word. Returns the sum
/// of the reference and the row and column deltas; the caller adds the per-pixel remainder.
fn row_column_base(
    words: &[u16],
    scale_word: EepromAddress,
    reference: i32,
    row_start: EepromAddress,
    column_start: EepromAddress,
) -> [i32; NUM_PIXELS] {
    let scales = words[scale_word.offset()];
    let column_scale = unsigned_field(scales, 4, 4);
    let row_scale = unsigned_field(scales, 8, 4);
    let row_words = &words[row_start.offset()..(row_start.offset() + HEIGHT / 4)];
    let column_words = &words[column_start.offset()..(column_start.offset() + WIDTH / 4)];
    let mut rows = [0i32; HEIGHT];
    for (chunk, word) in rows.chunks_exact_mut(4).zip(row_words) {
        for (row, delta) in chunk.iter_mut().zip(word_to_i4s(*word).iter()) {
            *row = i32::from(*delta) << row_scale;
        }
    }
    let mut columns = [0i32; WIDTH];
    for (chunk, word) in columns.chunks_exact_mut(4).zip(column_words) {
        for (column, delta) in chunk.iter_mut().zip(word_to_i4s(*word).iter()) {
            *column = i32::from(*delta) << column_scale;
        }
    }
    let mut base = [reference; NUM_PIXELS];
    for (index, value) in base.iter_mut().enumerate() {
        let (row, column) = pixel_coordinates(index);
        *value += rows[row] + columns[column];
    }
    base
}

/// Index into the four-value chessboard tables (K<sub>Ta</sub> and K<sub>V</sub>).
fn chessboard_index(row: usize, column: usize) -> usize {
    2 * (row % 2) + column % 2
}

/// Two deviating pixels are adjacent if they touch, diagonals included.
fn are_adjacent(first: u16, second: u16) -> bool {
    let (first_row, first_column) = pixel_coordinates(first as usize);
    let (second_row, second_column) = pixel_coordinates(second as usize);
    first_row.abs_diff(second_row) < 2 && first_column.abs_diff(second_column) < 2
}

impl Mlx90640Calibration {
    /// Extract the calibration data from a dump of the whole EEPROM, as words.
    ///
    /// Pixel anomalies (too many deviating pixels, or deviating pixels next to each other) are
    /// reported as errors that still carry the extracted calibration.
    pub fn from_words(words: &[u16]) -> Result<Self, ExtractionError> {
        if words.len() != EEPROM_WORDS {
            return Err(ExtractionError::InvalidFormat(
                "calibration dump must cover the entire EEPROM",
            ));
        }
        // The device-select bit is always clear on a programmed MLX90640, and blank EEPROMs
        // (all ones) will have it set.
        let options = words[EepromAddress::DeviceOptions.offset()];
        if is_bit_set(options, 6) {
            return Err(ExtractionError::InvalidFormat(
                "device options word does not belong to an MLX90640",
            ));
        }
        let calibration = Self::extract(words);
        log_debug!(
            "Calibration extracted: resolution {:?}, {} broken and {} outlier pixels",
            calibration.resolution,
            calibration.broken_pixels.len(),
            calibration.outlier_pixels.len()
        );
        calibration.check_deviating_pixels(words)
    }

    /// Extract the calibration data from a dump of the whole EEPROM, as big-endian bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractionError> {
        if bytes.len() != EEPROM_WORDS * WORD_SIZE {
            return Err(ExtractionError::InvalidFormat(
                "calibration dump must cover the entire EEPROM",
            ));
        }
        let mut words = [0u16; EEPROM_WORDS];
        bytes_to_words(bytes, &mut words);
        Self::from_words(&words)
    }

    fn extract(words: &[u16]) -> Self {
        let word = |address: EepromAddress| words[address.offset()];
        let pixel_words = &words[EepromAddress::PixelStart.offset()..];

        // Supply voltage
        let vdd_word = word(EepromAddress::VddConstants);
        let k_v_dd = signed_field(vdd_word, 8, 8) * 32;
        let v_dd_25 = ((unsigned_field(vdd_word, 0, 8) as i16 - 256) << 5) - 8192;

        // Ambient temperature
        let ptat_word = word(EepromAddress::PtatConstants);
        let k_v_ptat = f32::from(signed_field(ptat_word, 10, 6)) / 4096f32;
        let k_t_ptat = f32::from(signed_field(ptat_word, 0, 10)) / 8f32;
        let v_ptat_25 = f32::from(word(EepromAddress::Ptat25) as i16);
        let offset_scale = word(EepromAddress::OffsetScale);
        let alpha_ptat = f32::from(unsigned_field(offset_scale, 12, 4)) / 4f32 + 8f32;

        let gain = f32::from(word(EepromAddress::Gain) as i16);

        let ks_ta_tgc = word(EepromAddress::KsTaTgc);
        let temperature_gradient_coefficient = f32::from(signed_field(ks_ta_tgc, 0, 8)) / 32f32;
        let k_s_ta = f32::from(signed_field(ks_ta_tgc, 8, 8)) / 8192f32;

        let kv_kta_scale = word(EepromAddress::KvKtaScale);
        let k_ta_scale_2 = i32::from(unsigned_field(kv_kta_scale, 0, 4));
        let k_ta_scale_1 = i32::from(unsigned_field(kv_kta_scale, 4, 4)) + 8;
        let k_v_scale = i32::from(unsigned_field(kv_kta_scale, 8, 4));
        // Two bits, so this can't fail.
        let resolution = Resolution::from_raw(unsigned_field(kv_kta_scale, 12, 2))
            .unwrap_or_default();

        // Temperature ranges
        let corners = word(EepromAddress::CornerTemperatures);
        let step = unsigned_field(corners, 12, 2) as i16 * 10;
        let corner_2 = unsigned_field(corners, 4, 4) as i16 * step;
        let corner_3 = corner_2 + unsigned_field(corners, 8, 4) as i16 * step;
        let corner_temperatures = [-40, 0, corner_2, corner_3];
        let k_s_to_scale = pow2(i32::from(unsigned_field(corners, 0, 4)) + 8);
        let range_01 = word(EepromAddress::KsToRange01);
        let range_23 = word(EepromAddress::KsToRange23);
        let k_s_to = [
            f32::from(signed_field(range_01, 0, 8)) / k_s_to_scale,
            f32::from(signed_field(range_01, 8, 8)) / k_s_to_scale,
            f32::from(signed_field(range_23, 0, 8)) / k_s_to_scale,
            f32::from(signed_field(range_23, 8, 8)) / k_s_to_scale,
        ];
        let mut alpha_correction = [0f32; NUM_CORNER_TEMPERATURES];
        alpha_correction[0] = 1f32 / (1f32 + k_s_to[0] * 40f32);
        alpha_correction[1] = 1f32;
        alpha_correction[2] = 1f32 + k_s_to[1] * f32::from(corner_temperatures[2]);
        alpha_correction[3] = alpha_correction[2]
            * (1f32 + k_s_to[2] * f32::from(corner_temperatures[3] - corner_temperatures[2]));

        // Per-pixel sensitivity
        let sensitivity_scale = word(EepromAddress::SensitivityScale);
        let alpha_remainder_scale = unsigned_field(sensitivity_scale, 0, 4);
        let alpha_scale = pow2(i32::from(unsigned_field(sensitivity_scale, 12, 4)) + 30);
        let alpha_base = row_column_base(
            words,
            EepromAddress::SensitivityScale,
            i32::from(word(EepromAddress::SensitivityAverage)),
            EepromAddress::SensitivityRowStart,
            EepromAddress::SensitivityColumnStart,
        );

        // Per-pixel offset
        let offset_remainder_scale = unsigned_field(offset_scale, 0, 4);
        let offset_base = row_column_base(
            words,
            EepromAddress::OffsetScale,
            i32::from(word(EepromAddress::OffsetAverage) as i16),
            EepromAddress::OffsetRowStart,
            EepromAddress::OffsetColumnStart,
        );

        let kta_even_columns = word(EepromAddress::KtaAverageEvenColumns);
        let kta_odd_columns = word(EepromAddress::KtaAverageOddColumns);
        let k_ta_average = [
            signed_field(kta_even_columns, 8, 8),
            signed_field(kta_odd_columns, 8, 8),
            signed_field(kta_even_columns, 0, 8),
            signed_field(kta_odd_columns, 0, 8),
        ];
        let kv_word = word(EepromAddress::KvAverage);
        let k_v_average = [
            signed_field(kv_word, 12, 4),
            signed_field(kv_word, 4, 4),
            signed_field(kv_word, 8, 4),
            signed_field(kv_word, 0, 4),
        ];
        let k_ta_divisor = pow2(k_ta_scale_1);
        let k_v_divisor = pow2(k_v_scale);

        let mut alpha_pixels = [0f32; NUM_PIXELS];
        let mut offset_pixels = [0i16; NUM_PIXELS];
        let mut k_ta_pixels = [0f32; NUM_PIXELS];
        let mut k_v_pixels = [0f32; NUM_PIXELS];
        let mut broken_pixels = DeviatingPixels::new();
        let mut outlier_pixels = DeviatingPixels::new();
        for (index, pixel_word) in pixel_words.iter().copied().enumerate().take(NUM_PIXELS) {
            let (row, column) = pixel_coordinates(index);
            let chessboard = chessboard_index(row, column);
            let alpha_remainder =
                i32::from(signed_field(pixel_word, 4, 6)) << alpha_remainder_scale;
            alpha_pixels[index] = (alpha_base[index] + alpha_remainder) as f32 / alpha_scale;
            let offset_remainder =
                i32::from(signed_field(pixel_word, 10, 6)) << offset_remainder_scale;
            offset_pixels[index] = (offset_base[index] + offset_remainder) as i16;
            let k_ta_remainder = i32::from(signed_field(pixel_word, 1, 3)) << k_ta_scale_2;
            k_ta_pixels[index] =
                (i32::from(k_ta_average[chessboard]) + k_ta_remainder) as f32 / k_ta_divisor;
            k_v_pixels[index] = f32::from(k_v_average[chessboard]) / k_v_divisor;
            // Only the first few are kept, the rest are counted in `check_deviating_pixels`.
            if pixel_word == 0 {
                let _ = broken_pixels.try_push(index as u16);
            } else if is_bit_set(pixel_word, 0) {
                let _ = outlier_pixels.try_push(index as u16);
            }
        }

        // Compensation pixels
        let cp_alpha_scale = pow2(i32::from(unsigned_field(sensitivity_scale, 12, 4)) + 27);
        let cp_sensitivity = word(EepromAddress::CompensationPixelSensitivity);
        let alpha_cp_0 = f32::from(signed_field(cp_sensitivity, 0, 10)) / cp_alpha_scale;
        let alpha_cp_1 =
            (1f32 + f32::from(signed_field(cp_sensitivity, 10, 6)) / 128f32) * alpha_cp_0;
        let cp_offset = word(EepromAddress::CompensationPixelOffset);
        let offset_cp_0 = signed_field(cp_offset, 0, 10);
        let offset_cp_1 = signed_field(cp_offset, 10, 6) + offset_cp_0;
        let cp_constants = word(EepromAddress::CompensationPixelConstants);
        let k_ta_cp = f32::from(signed_field(cp_constants, 0, 8)) / k_ta_divisor;
        let k_v_cp = f32::from(signed_field(cp_constants, 8, 8)) / k_v_divisor;

        // A clear bit 11 means the camera was calibrated in chess mode.
        let calibration_pattern = if is_bit_set(word(EepromAddress::DeviceOptions), 11) {
            AccessPattern::Interleave
        } else {
            AccessPattern::Chess
        };
        let il_chess = word(EepromAddress::InterleaveCorrection);
        let interleave_correction = [
            f32::from(signed_field(il_chess, 0, 6)) / 16f32,
            f32::from(signed_field(il_chess, 6, 5)) / 2f32,
            f32::from(signed_field(il_chess, 11, 5)) / 8f32,
        ];

        Self {
            k_v_dd,
            v_dd_25,
            resolution,
            k_v_ptat,
            k_t_ptat,
            v_ptat_25,
            alpha_ptat,
            gain,
            k_s_ta,
            temperature_gradient_coefficient,
            corner_temperatures,
            k_s_to,
            alpha_correction,
            alpha_pixels,
            offset_pixels,
            k_ta_pixels,
            k_v_pixels,
            alpha_cp: [alpha_cp_0, alpha_cp_1],
            offset_cp: [offset_cp_0, offset_cp_1],
            k_ta_cp,
            k_v_cp,
            calibration_pattern,
            interleave_correction,
            broken_pixels,
            outlier_pixels,
        }
    }

    /// Count every deviating pixel and make sure the result can actually be corrected.
    fn check_deviating_pixels(self, words: &[u16]) -> Result<Self, ExtractionError> {
        let pixel_words = &words[EepromAddress::PixelStart.offset()..];
        let broken = pixel_words.iter().filter(|word| **word == 0).count();
        let outliers = pixel_words
            .iter()
            .filter(|word| **word != 0 && is_bit_set(**word, 0))
            .count();
        if broken > MAX_DEVIATING_PIXELS || outliers > MAX_DEVIATING_PIXELS {
            log_warn!(
                "Calibration has {} broken and {} outlier pixels",
                broken,
                outliers
            );
            return Err(ExtractionError::TooManyBrokenPixels {
                broken,
                outliers,
                calibration: self,
            });
        }
        let adjacent = {
            let mut deviating = self.deviating_pixels();
            let mut found = None;
            while let Some(first) = deviating.next() {
                if let Some(second) = deviating.clone().find(|other| are_adjacent(first, *other)) {
                    found = Some((first, second));
                    break;
                }
            }
            found
        };
        match adjacent {
            Some((first, second)) => {
                log_warn!("Deviating pixels {} and {} are adjacent", first, second);
                Err(ExtractionError::AdjacentDeviatingPixels {
                    first,
                    second,
                    calibration: self,
                })
            }
            None => Ok(self),
        }
    }

    /// Pixel supply voltage constant (K<sub>V<sub>DD</sub></sub>).
    pub fn k_v_dd(&self) -> i16 {
        self.k_v_dd
    }

    /// Pixel supply voltage reading at 25℃ (V<sub>DD<sub>25</sub></sub>).
    pub fn v_dd_25(&self) -> i16 {
        self.v_dd_25
    }

    /// The supply voltage the camera was calibrated at.
    pub fn v_dd_0(&self) -> f32 {
        3.3f32
    }

    /// ADC resolution the camera was calibrated at.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// K<sub>V<sub>PTAT</sub></sub>
    pub fn k_v_ptat(&self) -> f32 {
        self.k_v_ptat
    }

    /// K<sub>T<sub>PTAT</sub></sub>
    pub fn k_t_ptat(&self) -> f32 {
        self.k_t_ptat
    }

    /// V<sub>PTAT<sub>25</sub></sub>
    pub fn v_ptat_25(&self) -> f32 {
        self.v_ptat_25
    }

    /// α<sub>PTAT</sub>
    pub fn alpha_ptat(&self) -> f32 {
        self.alpha_ptat
    }

    /// The gain the camera was calibrated with (the per-frame gain is divided into this).
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// K<sub>S<sub>T<sub>a</sub></sub></sub>
    pub fn k_s_ta(&self) -> f32 {
        self.k_s_ta
    }

    /// TGC, how much of the compensation pixel signal is removed from each pixel.
    pub fn temperature_gradient_coefficient(&self) -> f32 {
        self.temperature_gradient_coefficient
    }

    /// The lower bound of each temperature range, in ℃.
    pub fn corner_temperatures(&self) -> &[i16; NUM_CORNER_TEMPERATURES] {
        &self.corner_temperatures
    }

    /// K<sub>S<sub>T<sub>o</sub></sub></sub> for each temperature range.
    pub fn k_s_to(&self) -> &[f32; NUM_CORNER_TEMPERATURES] {
        &self.k_s_to
    }

    /// The extra sensitivity correction for each temperature range.
    pub fn alpha_correction(&self) -> &[f32; NUM_CORNER_TEMPERATURES] {
        &self.alpha_correction
    }

    pub fn alpha_pixels(&self) -> &[f32; NUM_PIXELS] {
        &self.alpha_pixels
    }

    pub fn offset_pixels(&self) -> &[i16; NUM_PIXELS] {
        &self.offset_pixels
    }

    pub fn k_ta_pixels(&self) -> &[f32; NUM_PIXELS] {
        &self.k_ta_pixels
    }

    pub fn k_v_pixels(&self) -> &[f32; NUM_PIXELS] {
        &self.k_v_pixels
    }

    /// Sensitivity of the compensation pixel for a subpage.
    pub fn alpha_cp(&self, subpage: Subpage) -> f32 {
        self.alpha_cp[usize::from(subpage)]
    }

    /// Offset of the compensation pixel for a subpage.
    pub fn offset_cp(&self, subpage: Subpage) -> i16 {
        self.offset_cp[usize::from(subpage)]
    }

    pub fn k_ta_cp(&self) -> f32 {
        self.k_ta_cp
    }

    pub fn k_v_cp(&self) -> f32 {
        self.k_v_cp
    }

    /// The access pattern the camera was calibrated in. When a frame uses a different one the
    /// interleave correction is applied.
    pub fn calibration_pattern(&self) -> AccessPattern {
        self.calibration_pattern
    }

    /// The three chess/interleave correction constants.
    pub fn interleave_correction(&self) -> &[f32; 3] {
        &self.interleave_correction
    }

    /// Pixels the factory marked as broken (no calibration data).
    pub fn broken_pixels(&self) -> &[u16] {
        &self.broken_pixels
    }

    /// Pixels the factory marked as outliers.
    pub fn outlier_pixels(&self) -> &[u16] {
        &self.outlier_pixels
    }

    /// Broken pixels followed by outlier pixels.
    pub fn deviating_pixels(&self) -> impl Iterator<Item = u16> + Clone + '_ {
        self.broken_pixels
            .iter()
            .chain(self.outlier_pixels.iter())
            .copied()
    }

    /// Check if a pixel is broken or an outlier.
    pub fn is_deviating(&self, pixel_index: usize) -> bool {
        self.deviating_pixels()
            .any(|deviating| usize::from(deviating) == pixel_index)
    }
}
