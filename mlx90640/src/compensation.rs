// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Turning raw counts into compensated infrared signal.
//!
//! Every pixel goes through the same chain: scale by the frame gain, remove the pixel's offset
//! (itself drifting with ambient temperature and supply voltage), optionally correct for reading
//! in a different access pattern than the camera was calibrated in, and finally remove the
//! self-heating signal measured by the compensation pixel.
use bitvec::array::BitArray;

use crate::eeprom::Mlx90640Calibration;
use crate::error::ParameterError;
use crate::frame::RawFrame;
use crate::layout::{conversion_pattern, pixel_coordinates, subpage_of, subpage_pixels, NUM_PIXELS};
use crate::register::{AccessPattern, Subpage};

type PixelMask = BitArray<[usize; NUM_PIXELS / usize::BITS as usize]>;

/// Compensated infrared signal for (up to) a full image.
///
/// Pixels are only valid once a subpage covering them has been merged in.
#[derive(Clone, Debug, PartialEq)]
pub struct CompensatedFrame {
    pixels: [f32; NUM_PIXELS],

    valid: PixelMask,

    access_pattern: AccessPattern,

    ambient_temperature: f32,

    supply_voltage: f32,
}

impl CompensatedFrame {
    /// An empty frame, with no valid pixels.
    pub fn new(access_pattern: AccessPattern) -> Self {
        Self {
            pixels: [0f32; NUM_PIXELS],
            valid: PixelMask::default(),
            access_pattern,
            ambient_temperature: f32::NAN,
            supply_voltage: f32::NAN,
        }
    }

    /// A frame where every pixel is valid, from already-compensated values.
    pub fn from_signal(
        pixels: [f32; NUM_PIXELS],
        access_pattern: AccessPattern,
        ambient_temperature: f32,
        supply_voltage: f32,
    ) -> Self {
        let mut valid = PixelMask::default();
        valid.fill(true);
        Self {
            pixels,
            valid,
            access_pattern,
            ambient_temperature,
            supply_voltage,
        }
    }

    pub fn pixels(&self) -> &[f32; NUM_PIXELS] {
        &self.pixels
    }

    /// Check if a pixel has been filled in.
    pub fn is_valid(&self, index: usize) -> bool {
        self.valid[index]
    }

    /// Indices of the pixels that have been filled in.
    pub fn valid_pixels(&self) -> impl Iterator<Item = usize> + '_ {
        self.valid.iter_ones()
    }

    /// Check if every pixel has been filled in.
    pub fn is_complete(&self) -> bool {
        self.valid.all()
    }

    /// The access pattern the merged subpages were read with.
    pub fn access_pattern(&self) -> AccessPattern {
        self.access_pattern
    }

    /// The ambient temperature of the most recently merged subpage.
    pub fn ambient_temperature(&self) -> f32 {
        self.ambient_temperature
    }

    /// The supply voltage of the most recently merged subpage.
    pub fn supply_voltage(&self) -> f32 {
        self.supply_voltage
    }

    /// The subpage a pixel belongs to, under this frame's access pattern.
    pub fn pixel_subpage(&self, index: usize) -> Subpage {
        let (row, column) = pixel_coordinates(index);
        subpage_of(row, column, self.access_pattern)
    }

    fn reset(&mut self, access_pattern: AccessPattern) {
        self.valid.fill(false);
        self.access_pattern = access_pattern;
    }

    /// Divide each valid pixel by its compensated sensitivity, giving a "raw" image.
    ///
    /// These are not temperatures, but they are proportional to the radiation each pixel saw,
    /// which is plenty for applications that only need an image. Only the valid pixels are
    /// written to `destination`.
    pub fn raw_image_into(
        &self,
        calibration: &Mlx90640Calibration,
        destination: &mut [f32],
    ) -> Result<(), ParameterError> {
        if destination.len() != NUM_PIXELS {
            return Err(ParameterError::BufferLength {
                expected: NUM_PIXELS,
                actual: destination.len(),
            });
        }
        let alpha_coefficient = alpha_coefficient(calibration, self.ambient_temperature);
        for index in self.valid_pixels() {
            let alpha = compensated_alpha(
                calibration,
                index,
                self.pixel_subpage(index),
                alpha_coefficient,
            );
            destination[index] = self.pixels[index] / alpha;
        }
        Ok(())
    }

    /// [`CompensatedFrame::raw_image_into`] into a new array. Pixels that aren't valid are NaN.
    pub fn raw_image(&self, calibration: &Mlx90640Calibration) -> [f32; NUM_PIXELS] {
        let mut image = [f32::NAN; NUM_PIXELS];
        // The length is right by construction.
        let _ = self.raw_image_into(calibration, &mut image);
        image
    }
}

/// The sensitivity drift with ambient temperature, shared by every pixel.
pub(crate) fn alpha_coefficient(calibration: &Mlx90640Calibration, ambient_temperature: f32) -> f32 {
    1f32 + calibration.k_s_ta() * (ambient_temperature - 25f32)
}

/// A pixel's sensitivity, with the compensation pixel's share removed and corrected for the
/// ambient temperature.
pub(crate) fn compensated_alpha(
    calibration: &Mlx90640Calibration,
    index: usize,
    subpage: Subpage,
    alpha_coefficient: f32,
) -> f32 {
    let tgc = calibration.temperature_gradient_coefficient();
    (calibration.alpha_pixels()[index] - tgc * calibration.alpha_cp(subpage)) * alpha_coefficient
}

/// Compensate one subpage into a new frame.
pub fn compensate(raw: &RawFrame, calibration: &Mlx90640Calibration) -> CompensatedFrame {
    let mut compensated = CompensatedFrame::new(raw.access_pattern());
    compensate_into(raw, calibration, &mut compensated);
    compensated
}

/// Compensate one subpage, merging it into an existing frame.
///
/// The ADC resolution doesn't need separate handling for the pixels. The gain measured with each
/// frame scales with the resolution just like the pixel counts do, so `gainEE / gain` already
/// brings the counts back to the calibration's scale. Only the supply voltage reading needs the
/// resolution correction.
///
/// Only the pixels belonging to the raw frame's subpage are touched. If the raw frame was read
/// with a different access pattern than the pixels already in `destination`, those pixels are
/// dropped first, as they no longer line up with the subpages.
pub fn compensate_into(
    raw: &RawFrame,
    calibration: &Mlx90640Calibration,
    destination: &mut CompensatedFrame,
) {
    let access_pattern = raw.access_pattern();
    if destination.access_pattern != access_pattern {
        destination.reset(access_pattern);
    }
    let subpage = raw.subpage();
    let supply_voltage = raw.supply_voltage(calibration);
    let ambient_temperature = raw.ambient_temperature_at(calibration, supply_voltage);
    let delta_t_a = ambient_temperature - 25f32;
    let delta_v = supply_voltage - calibration.v_dd_0();
    let gain = calibration.gain() / f32::from(raw.gain());
    // Reading in the other access pattern than the calibration needs an extra correction.
    let pattern_mismatch = access_pattern != calibration.calibration_pattern();
    let interleave_correction = calibration.interleave_correction();

    let mut offset_cp = f32::from(calibration.offset_cp(subpage));
    if pattern_mismatch && subpage == Subpage::One {
        offset_cp += interleave_correction[0];
    }
    let compensation_pixel = f32::from(raw.compensation_pixel(subpage)) * gain
        - offset_cp
            * (1f32 + calibration.k_ta_cp() * delta_t_a)
            * (1f32 + calibration.k_v_cp() * delta_v);
    let gradient = calibration.temperature_gradient_coefficient() * compensation_pixel;

    let offsets = calibration.offset_pixels();
    let k_ta = calibration.k_ta_pixels();
    let k_v = calibration.k_v_pixels();
    for index in subpage_pixels(access_pattern, subpage) {
        let mut ir = f32::from(raw.pixel(index)) * gain
            - f32::from(offsets[index])
                * (1f32 + k_ta[index] * delta_t_a)
                * (1f32 + k_v[index] * delta_v);
        if pattern_mismatch {
            let (row, column) = pixel_coordinates(index);
            let row_sign = if row % 2 == 0 { -1f32 } else { 1f32 };
            ir += interleave_correction[2] * row_sign
                - interleave_correction[1] * conversion_pattern(row, column);
        }
        destination.pixels[index] = ir - gradient;
        destination.valid.set(index, true);
    }
    destination.ambient_temperature = ambient_temperature;
    destination.supply_voltage = supply_voltage;
}

/// Compensate both subpages of a full image.
///
/// The two frames must cover different subpages, with the same access pattern.
pub fn compensate_full_frame(
    first: &RawFrame,
    second: &RawFrame,
    calibration: &Mlx90640Calibration,
) -> Result<CompensatedFrame, ParameterError> {
    if first.subpage() == second.subpage() || first.access_pattern() != second.access_pattern() {
        return Err(ParameterError::SubpageMismatch);
    }
    let mut compensated = compensate(first, calibration);
    compensate_into(second, calibration, &mut compensated);
    Ok(compensated)
}
