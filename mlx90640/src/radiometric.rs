// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Converting compensated signal into object temperatures.
use num_traits::Float;

use crate::compensation::{alpha_coefficient, compensated_alpha, CompensatedFrame};
use crate::eeprom::Mlx90640Calibration;
use crate::error::ParameterError;
use crate::layout::{pixel_index, NUM_PIXELS};
use crate::register::Subpage;

/// Constant needed a few times for the final pixel temperature calculations.
pub const KELVINS_TO_CELSIUS: f32 = 273.15;

/// The offset from ambient the datasheet suggests using as the reflected temperature, for a
/// camera sitting in open air.
pub const DEFAULT_REFLECTED_OFFSET: f32 = -8f32;

/// Where the temperature of the surroundings reflected by the object comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReflectedTemperature {
    /// A fixed offset from the ambient temperature of each frame.
    RelativeToAmbient(f32),

    /// A fixed temperature, in ℃.
    Fixed(f32),
}

impl ReflectedTemperature {
    /// The reflected temperature to use for a frame with the given ambient temperature.
    pub fn resolve(&self, ambient_temperature: f32) -> f32 {
        match self {
            ReflectedTemperature::RelativeToAmbient(offset) => ambient_temperature + offset,
            ReflectedTemperature::Fixed(temperature) => *temperature,
        }
    }
}

impl Default for ReflectedTemperature {
    fn default() -> Self {
        Self::RelativeToAmbient(DEFAULT_REFLECTED_OFFSET)
    }
}

/// A full image of object temperatures, in ℃.
#[derive(Clone, Debug, PartialEq)]
pub struct TemperatureFrame {
    pixels: [f32; NUM_PIXELS],
}

impl TemperatureFrame {
    pub fn pixels(&self) -> &[f32; NUM_PIXELS] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [f32; NUM_PIXELS] {
        &mut self.pixels
    }

    /// The temperature at a pixel.
    pub fn get(&self, row: usize, column: usize) -> f32 {
        self.pixels[pixel_index(row, column)]
    }

    pub fn into_inner(self) -> [f32; NUM_PIXELS] {
        self.pixels
    }
}

impl From<TemperatureFrame> for [f32; NUM_PIXELS] {
    fn from(frame: TemperatureFrame) -> Self {
        frame.pixels
    }
}

/// Check that an emissivity is in (0, 1].
pub fn validate_emissivity(emissivity: f32) -> Result<f32, ParameterError> {
    // Written this way so NaN fails too.
    if emissivity > 0f32 && emissivity <= 1f32 {
        Ok(emissivity)
    } else {
        Err(ParameterError::InvalidEmissivity(emissivity))
    }
}

/// T<sub>a-r</sub>, the fourth-power background radiation term shared by every pixel (in K⁴).
///
/// The object emits only `emissivity` of a black body, and reflects the rest of what its
/// surroundings (at `reflected_temperature`) emit.
pub fn background_radiation(
    ambient_temperature: f32,
    reflected_temperature: f32,
    emissivity: f32,
) -> f32 {
    let t_a_k4 = (ambient_temperature + KELVINS_TO_CELSIUS).powi(4);
    let t_r_k4 = (reflected_temperature + KELVINS_TO_CELSIUS).powi(4);
    t_r_k4 - ((t_r_k4 - t_a_k4) / emissivity)
}

/// Values shared by every pixel when converting to temperatures.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RadiometricConstants {
    emissivity: f32,

    background: f32,

    alpha_coefficient: f32,
}

impl RadiometricConstants {
    fn new(
        calibration: &Mlx90640Calibration,
        ambient_temperature: f32,
        emissivity: f32,
        reflected_temperature: f32,
    ) -> Result<Self, ParameterError> {
        let emissivity = validate_emissivity(emissivity)?;
        Ok(Self {
            emissivity,
            background: background_radiation(
                ambient_temperature,
                reflected_temperature,
                emissivity,
            ),
            alpha_coefficient: alpha_coefficient(calibration, ambient_temperature),
        })
    }
}

/// Pick the temperature range a temperature falls in.
fn temperature_range(calibration: &Mlx90640Calibration, temperature: f32) -> usize {
    let corners = calibration.corner_temperatures();
    corners
        .iter()
        .skip(1)
        .take_while(|corner| temperature >= f32::from(**corner))
        .count()
}

/// The per-pixel calculations to go from compensated signal to a temperature.
///
/// A first estimate is made with the basic range (0℃ up to the second corner temperature), then
/// the range that estimate falls in is used for the final value.
fn pixel_temperature(
    calibration: &Mlx90640Calibration,
    v_ir: f32,
    alpha: f32,
    background: f32,
) -> f32 {
    let k_s_to = calibration.k_s_to();
    let k_s_to_basic = k_s_to[1];
    let s_x = k_s_to_basic * (alpha.powi(3) * (v_ir + alpha * background)).powf(0.25);
    let estimate = (v_ir / (alpha * (1f32 - k_s_to_basic * KELVINS_TO_CELSIUS) + s_x)
        + background)
        .powf(0.25)
        - KELVINS_TO_CELSIUS;

    let range = temperature_range(calibration, estimate);
    let corner = f32::from(calibration.corner_temperatures()[range]);
    let range_alpha = alpha
        * calibration.alpha_correction()[range]
        * (1f32 + k_s_to[range] * (estimate - corner));
    (v_ir / range_alpha + background).powf(0.25) - KELVINS_TO_CELSIUS
}

fn temperature_at(
    compensated: &CompensatedFrame,
    calibration: &Mlx90640Calibration,
    constants: &RadiometricConstants,
    index: usize,
    subpage: Subpage,
) -> f32 {
    let v_ir = compensated.pixels()[index] / constants.emissivity;
    let alpha = compensated_alpha(calibration, index, subpage, constants.alpha_coefficient);
    pixel_temperature(calibration, v_ir, alpha, constants.background)
}

/// Convert the valid pixels of a compensated frame to temperatures, writing them into
/// `destination`.
///
/// Pixels that aren't valid in `compensated` are left alone, so a buffer can be updated one
/// subpage at a time.
pub fn to_temperatures_into(
    compensated: &CompensatedFrame,
    calibration: &Mlx90640Calibration,
    ambient_temperature: f32,
    emissivity: f32,
    reflected_temperature: f32,
    destination: &mut [f32],
) -> Result<(), ParameterError> {
    let constants = RadiometricConstants::new(
        calibration,
        ambient_temperature,
        emissivity,
        reflected_temperature,
    )?;
    if destination.len() != NUM_PIXELS {
        return Err(ParameterError::BufferLength {
            expected: NUM_PIXELS,
            actual: destination.len(),
        });
    }
    for index in compensated.valid_pixels() {
        let subpage = compensated.pixel_subpage(index);
        destination[index] = temperature_at(compensated, calibration, &constants, index, subpage);
    }
    Ok(())
}

/// Convert a compensated frame to temperatures. Pixels that aren't valid in `compensated` are NaN.
pub fn to_temperatures(
    compensated: &CompensatedFrame,
    calibration: &Mlx90640Calibration,
    ambient_temperature: f32,
    emissivity: f32,
    reflected_temperature: f32,
) -> Result<TemperatureFrame, ParameterError> {
    let mut pixels = [f32::NAN; NUM_PIXELS];
    to_temperatures_into(
        compensated,
        calibration,
        ambient_temperature,
        emissivity,
        reflected_temperature,
        &mut pixels,
    )?;
    Ok(TemperatureFrame { pixels })
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;
    use mlx90640_test_data::{datasheet_eeprom_words, datasheet_ram_words, DATASHEET_CONTROL_REGISTER};

    use crate::compensation::compensate;
    use crate::frame::RawFrame;
    use crate::register::{AccessPattern, ControlRegister};

    use super::*;

    fn datasheet_calibration() -> Mlx90640Calibration {
        Mlx90640Calibration::from_words(&datasheet_eeprom_words()).unwrap()
    }

    fn datasheet_compensated(subpage: Subpage) -> CompensatedFrame {
        let raw = RawFrame::from_words(
            &datasheet_ram_words(),
            subpage,
            ControlRegister::from(DATASHEET_CONTROL_REGISTER),
        )
        .unwrap();
        compensate(&raw, &datasheet_calibration())
    }

    #[test]
    fn reflected_temperature() {
        let default = ReflectedTemperature::default();
        assert_eq!(default, ReflectedTemperature::RelativeToAmbient(-8.0));
        assert_eq!(default.resolve(33.0), 25.0);
        assert_eq!(ReflectedTemperature::Fixed(20.0).resolve(33.0), 20.0);
    }

    #[test]
    fn emissivity_bounds() {
        assert_eq!(validate_emissivity(1.0), Ok(1.0));
        assert_eq!(validate_emissivity(0.95), Ok(0.95));
        assert_eq!(
            validate_emissivity(0.0),
            Err(ParameterError::InvalidEmissivity(0.0))
        );
        assert_eq!(
            validate_emissivity(1.01),
            Err(ParameterError::InvalidEmissivity(1.01))
        );
        assert_eq!(
            validate_emissivity(-0.5),
            Err(ParameterError::InvalidEmissivity(-0.5))
        );
        assert!(validate_emissivity(f32::NAN).is_err());
    }

    #[test]
    fn invalid_emissivity_is_rejected() {
        let clb = datasheet_calibration();
        let compensated = datasheet_compensated(Subpage::Zero);
        let t_a = compensated.ambient_temperature();
        for emissivity in [0.0, 1.5] {
            assert_eq!(
                to_temperatures(&compensated, &clb, t_a, emissivity, t_a - 8.0),
                Err(ParameterError::InvalidEmissivity(emissivity))
            );
        }
        // The destination isn't touched either
        let mut destination = [1f32; NUM_PIXELS];
        assert!(
            to_temperatures_into(&compensated, &clb, t_a, 0.0, t_a - 8.0, &mut destination)
                .is_err()
        );
        assert!(destination.iter().all(|t| *t == 1.0));
    }

    #[test]
    fn background_radiation_at_unit_emissivity() {
        // With a perfect emitter, only the ambient temperature matters.
        let t_a_k4 = (39.184424f32 + KELVINS_TO_CELSIUS).powi(4);
        assert!(approx_eq!(
            f32,
            background_radiation(39.184424, 31.184424, 1.0) / t_a_k4,
            1.0,
            epsilon = 0.000001
        ));
    }

    #[test]
    fn temperature_ranges() {
        let clb = datasheet_calibration();
        // Corners are [-40, 0, 160, 320]
        assert_eq!(temperature_range(&clb, -20.0), 0);
        assert_eq!(temperature_range(&clb, 0.0), 1);
        assert_eq!(temperature_range(&clb, 80.0), 1);
        assert_eq!(temperature_range(&clb, 160.0), 2);
        assert_eq!(temperature_range(&clb, 400.0), 3);
    }

    #[test]
    fn datasheet_pixel() {
        let clb = datasheet_calibration();
        let compensated = datasheet_compensated(Subpage::Zero);
        let t_a = compensated.ambient_temperature();
        let temperatures = to_temperatures(&compensated, &clb, t_a, 1.0, t_a - 8.0).unwrap();
        let t_o = temperatures.get(11, 15);
        assert!(approx_eq!(f32, t_o, 80.216371, epsilon = 0.01), "{}", t_o);
    }

    #[test]
    fn datasheet_pixel_other_subpage() {
        let clb = datasheet_calibration();
        let compensated = datasheet_compensated(Subpage::One);
        let t_a = compensated.ambient_temperature();
        let temperatures = to_temperatures(&compensated, &clb, t_a, 1.0, t_a - 8.0).unwrap();
        let t_o = temperatures.get(11, 16);
        assert!(approx_eq!(f32, t_o, 79.810957, epsilon = 0.01), "{}", t_o);
    }

    #[test]
    fn lower_emissivity() {
        let clb = datasheet_calibration();
        let compensated = datasheet_compensated(Subpage::Zero);
        let t_a = compensated.ambient_temperature();
        let temperatures = to_temperatures(&compensated, &clb, t_a, 0.95, 25.0).unwrap();
        let t_o = temperatures.get(11, 15);
        assert!(approx_eq!(f32, t_o, 82.55873, epsilon = 0.01), "{}", t_o);
    }

    #[test]
    fn uncovered_pixels_are_nan() {
        let clb = datasheet_calibration();
        let compensated = datasheet_compensated(Subpage::Zero);
        let t_a = compensated.ambient_temperature();
        let temperatures = to_temperatures(&compensated, &clb, t_a, 1.0, t_a - 8.0).unwrap();
        assert!(temperatures.get(0, 1).is_nan());
        assert!(!temperatures.get(0, 0).is_nan());
        let nan_count = temperatures.pixels().iter().filter(|t| t.is_nan()).count();
        assert_eq!(nan_count, NUM_PIXELS / 2);
    }

    #[test]
    fn merging_subpages() {
        let clb = datasheet_calibration();
        let mut destination = [f32::NAN; NUM_PIXELS];
        for subpage in [Subpage::Zero, Subpage::One] {
            let compensated = datasheet_compensated(subpage);
            let t_a = compensated.ambient_temperature();
            to_temperatures_into(&compensated, &clb, t_a, 1.0, t_a - 8.0, &mut destination)
                .unwrap();
        }
        assert!(destination.iter().all(|t| !t.is_nan()));
        assert!(approx_eq!(
            f32,
            destination[pixel_index(11, 15)],
            80.216371,
            epsilon = 0.01
        ));
    }

    #[test]
    fn signal_free_frame_reads_ambient() {
        // No signal at all (beyond the background) means the object is at the background
        // temperature.
        let clb = datasheet_calibration();
        let compensated =
            CompensatedFrame::from_signal([0f32; NUM_PIXELS], AccessPattern::Chess, 25.0, 3.3);
        let temperatures = to_temperatures(&compensated, &clb, 25.0, 0.95, 25.0).unwrap();
        for t_o in temperatures.pixels().iter() {
            assert!(approx_eq!(f32, *t_o, 25.0, epsilon = 0.01), "{}", t_o);
        }
    }
}
