// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Raw frames, as read out of the camera's RAM.
//!
//! A frame is one subpage worth of measurements. The pixel area always has all 768 pixels in it,
//! but only the pixels belonging to [`RawFrame::subpage`] are fresh; the rest are left over from
//! the previous frame.
use crate::address::{RamAddress, RAM_WORDS};
use crate::correction::{correct, CorrectionScope};
use crate::eeprom::Mlx90640Calibration;
use crate::error::ParameterError;
use crate::layout::NUM_PIXELS;
use crate::register::{AccessPattern, ControlRegister, FrameRate, Resolution, Subpage};
use crate::util::{bytes_to_words, pow2, WORD_SIZE};

/// One subpage of raw measurements, with the register state it was captured under.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    ram: [u16; RAM_WORDS],

    subpage: Subpage,

    control: ControlRegister,
}

impl RawFrame {
    /// Create a frame from a RAM dump (as words, starting at 0x0400).
    ///
    /// `subpage` comes from the status register, and `control` is the control register at the
    /// time the frame was read.
    pub fn from_words(
        words: &[u16],
        subpage: Subpage,
        control: ControlRegister,
    ) -> Result<Self, ParameterError> {
        if words.len() != RAM_WORDS {
            return Err(ParameterError::BufferLength {
                expected: RAM_WORDS,
                actual: words.len(),
            });
        }
        let mut ram = [0u16; RAM_WORDS];
        ram.copy_from_slice(words);
        Ok(Self {
            ram,
            subpage,
            control,
        })
    }

    /// Create a frame from a RAM dump, as big-endian bytes.
    pub fn from_bytes(
        bytes: &[u8],
        subpage: Subpage,
        control: ControlRegister,
    ) -> Result<Self, ParameterError> {
        if bytes.len() != RAM_WORDS * WORD_SIZE {
            return Err(ParameterError::BufferLength {
                expected: RAM_WORDS * WORD_SIZE,
                actual: bytes.len(),
            });
        }
        let mut ram = [0u16; RAM_WORDS];
        bytes_to_words(bytes, &mut ram);
        Ok(Self {
            ram,
            subpage,
            control,
        })
    }

    /// The subpage this frame updated.
    pub fn subpage(&self) -> Subpage {
        self.subpage
    }

    pub fn control(&self) -> ControlRegister {
        self.control
    }

    pub fn access_pattern(&self) -> AccessPattern {
        self.control.access_pattern()
    }

    pub fn resolution(&self) -> Resolution {
        self.control.resolution()
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.control.frame_rate()
    }

    /// The raw RAM contents.
    pub fn words(&self) -> &[u16; RAM_WORDS] {
        &self.ram
    }

    /// The raw reading of a pixel. All RAM values are signed.
    pub fn pixel(&self, index: usize) -> i16 {
        self.ram[index] as i16
    }

    /// All pixel readings, in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = i16> + '_ {
        self.ram[..NUM_PIXELS].iter().map(|word| *word as i16)
    }

    /// Replace the calibration's broken and outlier pixels with the mean of their neighbours,
    /// before the frame is compensated.
    ///
    /// Only the pixels of this frame's subpage are fresh, so
    /// [`CorrectionScope::Subpage`] with this frame's access pattern is usually what you want.
    pub fn correct(
        &mut self,
        calibration: &Mlx90640Calibration,
        scope: CorrectionScope,
    ) -> Result<(), ParameterError> {
        let mut counts = [0i16; NUM_PIXELS];
        for (count, word) in counts.iter_mut().zip(self.ram.iter()) {
            *count = *word as i16;
        }
        correct(&mut counts, calibration, scope)?;
        for (word, count) in self.ram.iter_mut().zip(counts.iter()) {
            *word = *count as u16;
        }
        Ok(())
    }

    fn auxiliary(&self, address: RamAddress) -> i16 {
        self.ram[address.offset()] as i16
    }

    /// The gain measured with this frame.
    pub fn gain(&self) -> i16 {
        self.auxiliary(RamAddress::Gain)
    }

    /// The raw compensation pixel reading for a subpage.
    pub fn compensation_pixel(&self, subpage: Subpage) -> i16 {
        match subpage {
            Subpage::Zero => self.auxiliary(RamAddress::CompensationPixelZero),
            Subpage::One => self.auxiliary(RamAddress::CompensationPixelOne),
        }
    }

    /// The raw pixel supply voltage reading.
    pub fn v_dd_pixel(&self) -> i16 {
        self.auxiliary(RamAddress::PixelSupplyVoltage)
    }

    /// The raw V<sub>PTAT</sub> reading.
    pub fn t_a_ptat(&self) -> i16 {
        self.auxiliary(RamAddress::AmbientTemperaturePtat)
    }

    /// The raw V<sub>BE</sub> reading.
    pub fn t_a_v_be(&self) -> i16 {
        self.auxiliary(RamAddress::AmbientTemperatureVbe)
    }

    /// The scaling between the ADC resolution used for calibration and the one used for this
    /// frame. Each step in resolution doubles the raw counts.
    pub fn resolution_correction(&self, calibration: &Mlx90640Calibration) -> f32 {
        let calibrated = calibration.resolution().as_raw() as i32;
        let current = self.resolution().as_raw() as i32;
        pow2(calibrated - current)
    }

    /// The supply voltage of the camera when this frame was captured, in volts.
    pub fn supply_voltage(&self, calibration: &Mlx90640Calibration) -> f32 {
        let resolution_correction = self.resolution_correction(calibration);
        let delta_v = (resolution_correction * f32::from(self.v_dd_pixel())
            - f32::from(calibration.v_dd_25()))
            / f32::from(calibration.k_v_dd());
        delta_v + calibration.v_dd_0()
    }

    /// The ambient (die) temperature when this frame was captured, in ℃.
    pub fn ambient_temperature(&self, calibration: &Mlx90640Calibration) -> f32 {
        let supply_voltage = self.supply_voltage(calibration);
        self.ambient_temperature_at(calibration, supply_voltage)
    }

    /// [`RawFrame::ambient_temperature`] when the supply voltage has already been calculated.
    pub(crate) fn ambient_temperature_at(
        &self,
        calibration: &Mlx90640Calibration,
        supply_voltage: f32,
    ) -> f32 {
        let t_a_ptat = f32::from(self.t_a_ptat());
        // Labelled V_PTAT_art in the datasheet.
        let v_ptat_art = t_a_ptat / (t_a_ptat * calibration.alpha_ptat() + f32::from(self.t_a_v_be()))
            * pow2(18);
        let delta_v = supply_voltage - calibration.v_dd_0();
        let numerator =
            v_ptat_art / (1f32 + calibration.k_v_ptat() * delta_v) - calibration.v_ptat_25();
        numerator / calibration.k_t_ptat() + 25f32
    }
}

#[cfg(test)]
mod test {
    use float_cmp::{approx_eq, assert_approx_eq};
    use mlx90640_test_data::{
        datasheet_eeprom_words, datasheet_ram_words, words_to_bytes, EepromEditor,
        DATASHEET_CONTROL_REGISTER,
    };

    use crate::compensation::compensate;
    use crate::layout::pixel_index;

    use super::*;

    fn datasheet_calibration() -> Mlx90640Calibration {
        Mlx90640Calibration::from_words(&datasheet_eeprom_words()).unwrap()
    }

    fn datasheet_frame() -> RawFrame {
        RawFrame::from_words(
            &datasheet_ram_words(),
            Subpage::Zero,
            ControlRegister::from(DATASHEET_CONTROL_REGISTER),
        )
        .unwrap()
    }

    #[test]
    fn auxiliary_values() {
        let frame = datasheet_frame();
        assert_eq!(frame.t_a_v_be(), 19442);
        assert_eq!(frame.compensation_pixel(Subpage::Zero), -54);
        assert_eq!(frame.gain(), 6273);
        assert_eq!(frame.t_a_ptat(), 1711);
        assert_eq!(frame.compensation_pixel(Subpage::One), -56);
        assert_eq!(frame.v_dd_pixel(), -13115);
        assert_eq!(frame.pixel(367), 609);
        assert_eq!(frame.pixels().count(), NUM_PIXELS);
    }

    #[test]
    fn register_echo() {
        let frame = datasheet_frame();
        assert_eq!(frame.subpage(), Subpage::Zero);
        assert_eq!(frame.access_pattern(), AccessPattern::Chess);
        assert_eq!(frame.resolution(), Resolution::Eighteen);
        assert_eq!(frame.frame_rate(), FrameRate::Two);
    }

    #[test]
    fn supply_voltage() {
        let clb = datasheet_calibration();
        let frame = datasheet_frame();
        assert_approx_eq!(f32, frame.resolution_correction(&clb), 1.0);
        assert!(approx_eq!(
            f32,
            frame.supply_voltage(&clb),
            3.3186237,
            epsilon = 0.00001
        ));
    }

    #[test]
    fn ambient_temperature() {
        let clb = datasheet_calibration();
        let frame = datasheet_frame();
        // The datasheet works in doubles, f32 loses a little.
        assert!(approx_eq!(
            f32,
            frame.ambient_temperature(&clb),
            39.184424,
            epsilon = 0.0005
        ));
    }

    #[test]
    fn resolution_correction() {
        let clb = datasheet_calibration();
        let mut control = ControlRegister::from(DATASHEET_CONTROL_REGISTER);
        control.set_resolution(Resolution::Nineteen);
        let frame = RawFrame::from_words(&datasheet_ram_words(), Subpage::One, control).unwrap();
        assert_approx_eq!(f32, frame.resolution_correction(&clb), 0.5);
        control.set_resolution(Resolution::Sixteen);
        let frame = RawFrame::from_words(&datasheet_ram_words(), Subpage::One, control).unwrap();
        assert_approx_eq!(f32, frame.resolution_correction(&clb), 4.0);
    }

    #[test]
    fn correct_negative_counts() {
        let broken = pixel_index(5, 5);
        let clb = Mlx90640Calibration::from_words(
            EepromEditor::from_datasheet()
                .set_pixel(broken, 0x0000)
                .words(),
        )
        .unwrap();
        let mut ram = datasheet_ram_words();
        ram[broken] = 5000;
        ram[pixel_index(4, 5)] = -100i16 as u16;
        ram[pixel_index(6, 5)] = -101i16 as u16;
        ram[pixel_index(5, 4)] = -102i16 as u16;
        ram[pixel_index(5, 6)] = -103i16 as u16;
        let control = ControlRegister::from(DATASHEET_CONTROL_REGISTER);
        let mut frame = RawFrame::from_words(&ram, Subpage::Zero, control).unwrap();
        frame
            .correct(&clb, CorrectionScope::FullFrame)
            .unwrap();
        // -101.5, truncated
        assert_eq!(frame.pixel(broken), -101);
        assert_eq!(frame.pixel(pixel_index(4, 5)), -100);

        ram[broken] = -101i16 as u16;
        let expected = RawFrame::from_words(&ram, Subpage::Zero, control).unwrap();
        assert_eq!(frame, expected);
        assert_approx_eq!(
            f32,
            compensate(&frame, &clb).pixels()[broken],
            compensate(&expected, &clb).pixels()[broken]
        );
    }

    #[test]
    fn correct_subpage_counts() {
        let broken = pixel_index(5, 5);
        let clb = Mlx90640Calibration::from_words(
            EepromEditor::from_datasheet()
                .set_pixel(broken, 0x0000)
                .words(),
        )
        .unwrap();
        let mut ram = datasheet_ram_words();
        ram[broken] = 0x7fff;
        // The orthogonal neighbours are from the other subpage, and are stale.
        ram[pixel_index(4, 5)] = 0x7fff;
        ram[pixel_index(4, 4)] = -10i16 as u16;
        ram[pixel_index(4, 6)] = -20i16 as u16;
        ram[pixel_index(6, 4)] = -30i16 as u16;
        ram[pixel_index(6, 6)] = -40i16 as u16;
        let control = ControlRegister::from(DATASHEET_CONTROL_REGISTER);
        let mut frame = RawFrame::from_words(&ram, Subpage::Zero, control).unwrap();
        frame
            .correct(&clb, CorrectionScope::Subpage(frame.access_pattern()))
            .unwrap();
        assert_eq!(frame.pixel(broken), -25);
        assert_eq!(frame.pixel(pixel_index(4, 5)), 0x7fff);
    }

    #[test]
    fn from_bytes_matches_words() {
        let words = datasheet_ram_words();
        let control = ControlRegister::from(DATASHEET_CONTROL_REGISTER);
        let from_bytes =
            RawFrame::from_bytes(&words_to_bytes(&words), Subpage::Zero, control).unwrap();
        assert_eq!(from_bytes, datasheet_frame());
    }

    #[test]
    fn wrong_length() {
        let control = ControlRegister::default();
        assert_eq!(
            RawFrame::from_words(&[0u16; 768], Subpage::Zero, control),
            Err(ParameterError::BufferLength {
                expected: RAM_WORDS,
                actual: 768
            })
        );
        assert_eq!(
            RawFrame::from_bytes(&[0u8; 10], Subpage::Zero, control),
            Err(ParameterError::BufferLength {
                expected: RAM_WORDS * 2,
                actual: 10
            })
        );
    }
}
