// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The device handle, tying the bus, the calibration and the processing pipeline together.
use core::convert::TryFrom;

use embedded_hal::blocking::{delay, i2c};
use paste::paste;

use crate::address::{Address, EepromAddress, RamAddress, EEPROM_WORDS, RAM_WORDS};
use crate::compensation::compensate;
use crate::correction::{correct, CorrectionScope};
use crate::eeprom::Mlx90640Calibration;
use crate::error::{CommError, Error, ParameterError};
use crate::frame::RawFrame;
use crate::layout::{HEIGHT, NUM_PIXELS, WIDTH};
use crate::radiometric::{to_temperatures_into, validate_emissivity, ReflectedTemperature};
use crate::register::*;
use crate::util::{bytes_to_words, log_debug, WORD_SIZE};

/// DRY macro for the set_* methods in `Mlx90640Driver` that modify a register field.
///
/// The method is named after the field unless a different name is given before a `=>`.
macro_rules! set_register_field {
    { $register_access:ident, $name:ident => $field:ident, $typ:ty, $doc:literal } => {
    paste! {
        #[doc = $doc]
        pub fn [< set_ $name >](&mut self, new_value: $typ) -> Result<(), Error<I2C>> {
            let mut current = self.$register_access()?;
            if current.$field() != new_value {
                log_debug!("Setting {} to {:?}", stringify!($field), new_value);
                current.[< set_ $field >](new_value);
                self.[< set_ $register_access >](current)
            } else {
                Ok(())
            }
        }
    }};
    { $register_access:ident, $field:ident, $typ:ty, $doc:literal } => {
        set_register_field! {
            $register_access,
            $field => $field,
            $typ,
            $doc
        }
    };
}

/// Driver for an MLX90640 thermal camera.
///
/// The camera measures half of its pixels at a time (a "subpage"), so one of the
/// `generate_*_if_ready` methods will need to be called twice (once for each subpage) before a
/// full image is available in the destination buffer.
///
/// Changing the refresh rate, resolution or access pattern while the camera is part-way through
/// a measurement is not coordinated in any way; the first subpage read after a change may have
/// been measured with the old settings.
#[derive(Clone, Debug)]
pub struct Mlx90640Driver<I2C, D> {
    /// The I²C bus this camera is accessible on.
    bus: I2C,

    /// The I²C address this camera is accessible at.
    address: u8,

    delay: D,

    /// The factory calibration data for this camera.
    calibration: Mlx90640Calibration,

    /// The control register as of the last time it was read or written.
    control: ControlRegister,

    /// The raw control register value, used to preserve the reserved bits when writing.
    control_raw: u16,

    /// The most recently acquired frame.
    last_frame: Option<RawFrame>,

    /// The emissivity value to use when calculating pixel temperature.
    emissivity: f32,

    reflected_temperature: ReflectedTemperature,
}

impl<I2C, D> Mlx90640Driver<I2C, D>
where
    I2C: i2c::WriteRead + i2c::Write,
    D: delay::DelayMs<u16>,
{
    /// Create a new driver, reading the calibration data from the camera.
    ///
    /// A camera with too many (or adjacent) broken or outlier pixels is reported as an error. If
    /// you want to use such a camera anyway, [dump the EEPROM][dump_eeprom], pull the calibration
    /// out of the [`ExtractionError`][crate::ExtractionError] and use
    /// [`new_with_calibration`][Mlx90640Driver::new_with_calibration].
    pub fn new(bus: I2C, delay: D, address: u8) -> Result<Self, Error<I2C>> {
        let mut bus = bus;
        let eeprom = dump_eeprom(&mut bus, address)?;
        let calibration = Mlx90640Calibration::from_words(&eeprom)?;
        Self::new_with_calibration(bus, delay, address, calibration)
    }

    /// Create a driver with calibration data that has already been loaded.
    ///
    /// MLX90640s can be configured to use any I²C address (except 0x00), but the default address
    /// is 0x33.
    pub fn new_with_calibration(
        bus: I2C,
        delay: D,
        address: u8,
        calibration: Mlx90640Calibration,
    ) -> Result<Self, Error<I2C>> {
        let mut bus = bus;
        let control_raw = read_raw_register(&mut bus, address, ControlRegister::address())?;
        Ok(Self {
            bus,
            address,
            delay,
            calibration,
            control: ControlRegister::from(control_raw),
            control_raw,
            last_frame: None,
            emissivity: 1f32,
            reflected_temperature: ReflectedTemperature::default(),
        })
    }

    /// Give back the bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.bus, self.delay)
    }

    pub fn calibration(&self) -> &Mlx90640Calibration {
        &self.calibration
    }

    /// Read the camera's EEPROM again.
    pub fn dump_eeprom(&mut self) -> Result<[u16; EEPROM_WORDS], Error<I2C>> {
        Ok(dump_eeprom(&mut self.bus, self.address)?)
    }

    /// Read the camera's EEPROM again, as big-endian bytes.
    pub fn dump_eeprom_bytes(&mut self, destination: &mut [u8]) -> Result<(), Error<I2C>> {
        dump_eeprom_bytes(&mut self.bus, self.address, destination)
    }

    fn status_register(&mut self) -> Result<StatusRegister, Error<I2C>> {
        let register = read_register(&mut self.bus, self.address)?;
        Ok(register)
    }

    fn set_status_register(&mut self, register: StatusRegister) -> Result<(), Error<I2C>> {
        // The bits outside of the write mask are read-only, the camera ignores them.
        write_register(&mut self.bus, self.address, register, 0)?;
        Ok(())
    }

    fn control_register(&mut self) -> Result<ControlRegister, Error<I2C>> {
        let raw = read_raw_register(&mut self.bus, self.address, ControlRegister::address())?;
        self.control_raw = raw;
        self.control = ControlRegister::from(raw);
        Ok(self.control)
    }

    fn set_control_register(&mut self, register: ControlRegister) -> Result<(), Error<I2C>> {
        write_register(&mut self.bus, self.address, register, self.control_raw)?;
        let mask = ControlRegister::write_mask();
        self.control_raw = (self.control_raw & !mask) | (u16::from(register) & mask);
        self.control = register;
        Ok(())
    }

    /// Get the subpage the camera measured most recently.
    pub fn last_subpage(&mut self) -> Result<Subpage, Error<I2C>> {
        Ok(self.status_register()?.last_updated_subpage())
    }

    /// Check if there is new data available, and if so, which subpage.
    pub fn data_available(&mut self) -> Result<Option<Subpage>, Error<I2C>> {
        let register = self.status_register()?;
        Ok(if register.new_data() {
            Some(register.last_updated_subpage())
        } else {
            None
        })
    }

    /// Read the refresh rate from the camera.
    ///
    /// The default refresh rate is [2 Hz][FrameRate::Two].
    pub fn refresh_rate(&mut self) -> Result<FrameRate, Error<I2C>> {
        Ok(self.control_register()?.frame_rate())
    }

    set_register_field! {
        control_register,
        refresh_rate => frame_rate,
        FrameRate,
        "Set the camera's refresh rate."
    }

    /// Set the refresh rate from a number of Hz.
    ///
    /// Only the exact rates the camera supports are accepted; anything else is rejected before
    /// the camera is touched.
    pub fn set_refresh_rate_hz(&mut self, hertz: f32) -> Result<(), Error<I2C>> {
        let frame_rate = FrameRate::try_from(hertz)?;
        self.set_refresh_rate(frame_rate)
    }

    /// Get the current resolution of the ADC in the camera.
    ///
    /// The default resolution is [18 bits][Resolution::Eighteen].
    pub fn resolution(&mut self) -> Result<Resolution, Error<I2C>> {
        Ok(self.control_register()?.resolution())
    }

    set_register_field! {
        control_register,
        resolution,
        Resolution,
        "Set ADC resolution within the camera."
    }

    /// Set the ADC resolution from a number of bits (16 through 19).
    pub fn set_resolution_bits(&mut self, bits: u8) -> Result<(), Error<I2C>> {
        let resolution = Resolution::try_from(bits)?;
        self.set_resolution(resolution)
    }

    /// Get the current access pattern used by the camera when updating subpages.
    ///
    /// The default is the chess pattern.
    pub fn access_pattern(&mut self) -> Result<AccessPattern, Error<I2C>> {
        Ok(self.control_register()?.access_pattern())
    }

    set_register_field! {
        control_register,
        access_pattern,
        AccessPattern,
        "Set the access pattern used by the camera."
    }

    /// Switch the camera to the chess pattern.
    pub fn set_chess_mode(&mut self) -> Result<(), Error<I2C>> {
        self.set_access_pattern(AccessPattern::Chess)
    }

    /// Switch the camera to the interleaved (row by row) pattern.
    pub fn set_interleaved_mode(&mut self) -> Result<(), Error<I2C>> {
        self.set_access_pattern(AccessPattern::Interleave)
    }

    /// Get the emissivity value that is being used for calculations currently.
    ///
    /// The default emissivity is 1.
    pub fn emissivity(&self) -> f32 {
        self.emissivity
    }

    /// Set the emissivity used in temperature calculations. It must be in (0, 1].
    pub fn set_emissivity(&mut self, emissivity: f32) -> Result<(), ParameterError> {
        self.emissivity = validate_emissivity(emissivity)?;
        Ok(())
    }

    /// The reflected temperature used in temperature calculations.
    ///
    /// The default is 8℃ below the ambient temperature of each frame, which is what the sensor
    /// sees when sitting in open air.
    pub fn reflected_temperature(&self) -> ReflectedTemperature {
        self.reflected_temperature
    }

    pub fn set_reflected_temperature(&mut self, reflected_temperature: ReflectedTemperature) {
        self.reflected_temperature = reflected_temperature;
    }

    /// The time between subpages at the last known refresh rate, in milliseconds.
    pub fn frame_period_ms(&self) -> u16 {
        self.control.frame_rate().period_ms()
    }

    /// Block for one subpage period.
    pub fn wait_frame_period(&mut self) {
        let period = self.frame_period_ms();
        self.delay.delay_ms(period);
    }

    /// The most recently acquired frame.
    pub fn last_frame(&self) -> Option<&RawFrame> {
        self.last_frame.as_ref()
    }

    /// The supply voltage when the last frame was captured.
    pub fn supply_voltage(&self) -> Option<f32> {
        self.last_frame
            .as_ref()
            .map(|frame| frame.supply_voltage(&self.calibration))
    }

    /// The ambient temperature when the last frame was captured.
    ///
    /// This is calculated during image processing anyways, but it's kept around for those
    /// applications that want the ambient temperature without processing a full image.
    pub fn ambient_temperature(&self) -> Option<f32> {
        self.last_frame
            .as_ref()
            .map(|frame| frame.ambient_temperature(&self.calibration))
    }

    pub fn height(&self) -> usize {
        HEIGHT
    }

    pub fn width(&self) -> usize {
        WIDTH
    }

    /// Read the camera's RAM into `buffer` if there's a new subpage.
    ///
    /// `None` is returned if there isn't a new subpage, or if the camera finished another one
    /// while RAM was being read (in which case `buffer` may be a mix of the two).
    fn read_frame_into(
        &mut self,
        buffer: &mut [u8],
    ) -> Result<Option<(Subpage, ControlRegister)>, Error<I2C>> {
        let status = self.status_register()?;
        if !status.new_data() {
            log_debug!("No new data available");
            return Ok(None);
        }
        self.set_status_register(status.acknowledged())?;
        read_block(&mut self.bus, self.address, RamAddress::Base.into(), buffer)?;
        if self.status_register()?.new_data() {
            log_debug!("Camera finished another subpage while RAM was being read");
            return Ok(None);
        }
        let control = self.control_register()?;
        let subpage = status.last_updated_subpage();
        log_debug!("Read subpage {:?}", subpage);
        Ok(Some((subpage, control)))
    }

    fn try_acquire(&mut self) -> Result<Option<RawFrame>, Error<I2C>> {
        let mut buffer = [0u8; RAM_WORDS * WORD_SIZE];
        match self.read_frame_into(&mut buffer)? {
            Some((subpage, control)) => Ok(Some(RawFrame::from_bytes(&buffer, subpage, control)?)),
            None => Ok(None),
        }
    }

    /// Read a new subpage from the camera.
    ///
    /// If there isn't new data, [`CommError::DataNotReady`] is returned. Retrying is up to the
    /// caller; [`wait_frame_period`][Mlx90640Driver::wait_frame_period] is one way to pace it.
    pub fn acquire(&mut self) -> Result<&RawFrame, Error<I2C>> {
        match self.try_acquire()? {
            Some(frame) => Ok(self.last_frame.insert(frame)),
            None => Err(CommError::DataNotReady.into()),
        }
    }

    /// Read a new subpage from the camera into `destination`, as big-endian bytes.
    ///
    /// `destination` needs to be able to hold all of RAM (1664 bytes). The subpage that was read
    /// is returned.
    pub fn acquire_bytes(&mut self, destination: &mut [u8]) -> Result<Subpage, Error<I2C>> {
        check_length(destination, RAM_WORDS * WORD_SIZE)?;
        match self.read_frame_into(destination)? {
            Some((subpage, control)) => {
                self.last_frame = Some(RawFrame::from_bytes(destination, subpage, control)?);
                Ok(subpage)
            }
            None => Err(CommError::DataNotReady.into()),
        }
    }

    /// Generate a "raw" image from the camera's current data, if there's new data.
    ///
    /// The pixels of the new subpage are compensated and divided by their sensitivity, and
    /// written into `destination`; the other pixels are left untouched. The `Ok` value is whether
    /// there was new data.
    pub fn generate_raw_image_if_ready(
        &mut self,
        destination: &mut [f32],
    ) -> Result<bool, Error<I2C>> {
        check_length(destination, NUM_PIXELS)?;
        let raw = match self.try_acquire()? {
            Some(raw) => raw,
            None => return Ok(false),
        };
        let compensated = compensate(&raw, &self.calibration);
        compensated.raw_image_into(&self.calibration, destination)?;
        self.last_frame = Some(raw);
        Ok(true)
    }

    /// Generate a thermal image from the camera's current data, if there's new data.
    ///
    /// The temperatures (in ℃) of the new subpage's pixels are written into `destination`, and
    /// the other pixels are left untouched. The `Ok` value is whether there was new data.
    pub fn generate_image_if_ready(&mut self, destination: &mut [f32]) -> Result<bool, Error<I2C>> {
        check_length(destination, NUM_PIXELS)?;
        let raw = match self.try_acquire()? {
            Some(raw) => raw,
            None => return Ok(false),
        };
        let compensated = compensate(&raw, &self.calibration);
        let ambient_temperature = compensated.ambient_temperature();
        to_temperatures_into(
            &compensated,
            &self.calibration,
            ambient_temperature,
            self.emissivity,
            self.reflected_temperature.resolve(ambient_temperature),
            destination,
        )?;
        self.last_frame = Some(raw);
        Ok(true)
    }

    /// Fill in this camera's broken and outlier pixels from their neighbours.
    pub fn correct_image<T>(
        &self,
        pixels: &mut [T],
        scope: CorrectionScope,
    ) -> Result<(), ParameterError>
    where
        T: Copy + num_traits::NumCast,
    {
        correct(pixels, &self.calibration, scope)
    }
}

fn check_length<T>(buffer: &[T], expected: usize) -> Result<(), ParameterError> {
    if buffer.len() == expected {
        Ok(())
    } else {
        Err(ParameterError::BufferLength {
            expected,
            actual: buffer.len(),
        })
    }
}

/// Read the entire EEPROM of the camera at `i2c_address`.
pub fn dump_eeprom<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
) -> Result<[u16; EEPROM_WORDS], CommError<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut bytes = [0u8; EEPROM_WORDS * WORD_SIZE];
    read_block(bus, i2c_address, EepromAddress::Base.into(), &mut bytes)?;
    let mut words = [0u16; EEPROM_WORDS];
    bytes_to_words(&bytes, &mut words);
    Ok(words)
}

/// Read the entire EEPROM of the camera at `i2c_address` as big-endian bytes.
///
/// `destination` must be exactly 1664 bytes long.
pub fn dump_eeprom_bytes<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    destination: &mut [u8],
) -> Result<(), Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    check_length(destination, EEPROM_WORDS * WORD_SIZE)?;
    read_block(bus, i2c_address, EepromAddress::Base.into(), destination)?;
    Ok(())
}

fn read_block<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    start: Address,
    destination: &mut [u8],
) -> Result<(), CommError<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    bus.write_read(i2c_address, &start.as_bytes(), destination)
        .map_err(CommError::read)
}

fn read_raw_register<I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    register_address: Address,
) -> Result<u16, CommError<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut register_bytes = [0u8; 2];
    read_block(bus, i2c_address, register_address, &mut register_bytes)?;
    Ok(u16::from_be_bytes(register_bytes))
}

fn read_register<R, I2C>(bus: &mut I2C, i2c_address: u8) -> Result<R, CommError<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
    R: Register,
{
    let raw = read_raw_register(bus, i2c_address, R::address())?;
    Ok(R::from(raw))
}

/// Write a register, keeping the bits of `current` that aren't writeable.
fn write_register<R, I2C>(
    bus: &mut I2C,
    i2c_address: u8,
    register: R,
    current: u16,
) -> Result<(), CommError<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
    R: Register,
{
    let mask = R::write_mask();
    let new_value: u16 = register.into();
    let value = (current & !mask) | (new_value & mask);
    let address_bytes = R::address().as_bytes();
    let value_bytes = value.to_be_bytes();
    let combined: [u8; 4] = [
        address_bytes[0],
        address_bytes[1],
        value_bytes[0],
        value_bytes[1],
    ];
    bus.write(i2c_address, &combined).map_err(CommError::write)
}

#[cfg(test)]
mod test {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use float_cmp::approx_eq;
    use mlx90640_test_data::{
        datasheet_camera_at_address, datasheet_eeprom_words, datasheet_ram_words,
        datasheet_status_register, words_to_bytes, EepromEditor, I2cOperation, MockCameraBus,
        MockDelay, MockError, DATASHEET_CONTROL_REGISTER, STATUS_REGISTER_ADDRESS,
    };

    use crate::error::{BusFault, ExtractionFault};
    use crate::layout::pixel_index;

    use super::*;

    // Specifically using a non-default address to make sure assumptions aren't being made about
    // the address.
    const ADDRESS: u8 = 0x30;

    type MockDriver = Mlx90640Driver<MockCameraBus, MockDelay>;

    fn create_driver(subpage: u16) -> (MockDriver, MockCameraBus) {
        let mock_bus = datasheet_camera_at_address(ADDRESS, subpage);
        let driver = Mlx90640Driver::new(mock_bus.clone(), MockDelay::new(), ADDRESS).unwrap();
        mock_bus.clear_recent_operations();
        (driver, mock_bus)
    }

    #[test]
    fn smoke_test() {
        let (driver, _) = create_driver(0);
        let expected = Mlx90640Calibration::from_words(&datasheet_eeprom_words()).unwrap();
        assert_eq!(driver.calibration(), &expected);
        assert_eq!(driver.height(), 24);
        assert_eq!(driver.width(), 32);
        assert!(driver.last_frame().is_none());
        assert!(driver.ambient_temperature().is_none());
        assert!(driver.supply_voltage().is_none());
    }

    #[test]
    fn creation_operations() {
        let mock_bus = datasheet_camera_at_address(ADDRESS, 0);
        Mlx90640Driver::new(mock_bus.clone(), MockDelay::new(), ADDRESS).unwrap();
        let ops = mock_bus.recent_operations();
        // Most recent first
        assert_eq!(
            ops.iter().copied().collect::<Vec<_>>(),
            vec![
                I2cOperation::Read {
                    address: 0x800D,
                    length: 2
                },
                I2cOperation::Read {
                    address: 0x2400,
                    length: EEPROM_WORDS * 2
                },
            ]
        );
    }

    #[test]
    fn too_many_broken_pixels() {
        let eeprom = EepromEditor::from_datasheet()
            .fill_words(EepromAddress::PixelStart.offset(), 6, 0x0000)
            .into_words();
        let mock_bus = MockCameraBus::new(
            ADDRESS,
            &eeprom,
            &datasheet_ram_words(),
            DATASHEET_CONTROL_REGISTER,
            datasheet_status_register(0),
        );
        let res = Mlx90640Driver::new(mock_bus.clone(), MockDelay::new(), ADDRESS);
        assert!(matches!(
            res,
            Err(Error::Extraction(ExtractionFault::TooManyBrokenPixels {
                broken: 6,
                outliers: 0
            }))
        ));
        // The calibration can still be pulled out and used.
        let mut bus = mock_bus.clone();
        let words = super::dump_eeprom(&mut bus, ADDRESS).unwrap();
        let calibration = Mlx90640Calibration::from_words(&words)
            .unwrap_err()
            .into_calibration()
            .unwrap();
        let driver = Mlx90640Driver::new_with_calibration(bus, MockDelay::new(), ADDRESS, calibration);
        assert!(driver.is_ok());
    }

    #[test]
    fn read_register() {
        let (mut driver, mock_bus) = create_driver(0);
        let register: ControlRegister = super::read_register(&mut driver.bus, ADDRESS).unwrap();
        assert_eq!(register, ControlRegister::from(DATASHEET_CONTROL_REGISTER));
        assert_eq!(
            mock_bus.recent_operations().front(),
            Some(&I2cOperation::Read {
                address: 0x800D,
                length: 2
            })
        );
    }

    #[test]
    fn read_write_register() {
        let (mut driver, mock_bus) = create_driver(1);
        // Using the status register for this test as it has read-only bits.
        let mut status = driver.status_register().unwrap();
        assert_eq!(mock_bus.recent_operations().len(), 1);
        assert!(!status.overwrite_enabled());
        status.set_overwrite_enabled(true);
        driver.set_status_register(status).unwrap();
        assert_eq!(mock_bus.recent_operations().len(), 2);
        // The subpage bit stays put
        assert_eq!(mock_bus.status_register(), 0x0019);
    }

    #[test]
    fn get_register_minimal_operations() {
        let (mut driver, mock_bus) = create_driver(0);
        driver.refresh_rate().unwrap();
        assert_eq!(
            mock_bus.recent_operations().len(),
            1,
            "There should only be one operation to check a register"
        );
    }

    #[test]
    fn set_register_minimal_operations() {
        let (mut driver, mock_bus) = create_driver(0);
        driver.set_refresh_rate(FrameRate::SixtyFour).unwrap();
        assert_eq!(
            mock_bus.recent_operations().len(),
            2,
            "There should only be two operations to update a register"
        );
        assert_eq!(mock_bus.control_register(), 0x1B81);
        assert_eq!(driver.frame_period_ms(), 16);
    }

    #[test]
    fn set_unchanged_register() {
        let (mut driver, mock_bus) = create_driver(0);
        driver.set_resolution(Resolution::Eighteen).unwrap();
        assert_eq!(mock_bus.recent_operations().len(), 1);
        assert_eq!(mock_bus.control_register(), DATASHEET_CONTROL_REGISTER);
    }

    #[test]
    fn resolution() {
        let (mut driver, mock_bus) = create_driver(0);
        assert_eq!(driver.resolution().unwrap(), Resolution::Eighteen);
        driver.set_resolution(Resolution::Nineteen).unwrap();
        assert_eq!(mock_bus.control_register(), 0x1D01);
        driver.set_resolution_bits(16).unwrap();
        assert_eq!(driver.resolution().unwrap(), Resolution::Sixteen);
    }

    #[test]
    fn invalid_settings_skip_the_bus() {
        let (mut driver, mock_bus) = create_driver(0);
        assert_eq!(
            driver.set_resolution_bits(20),
            Err(Error::Parameter(ParameterError::InvalidResolution(20)))
        );
        assert_eq!(
            driver.set_refresh_rate_hz(3.0),
            Err(Error::Parameter(ParameterError::InvalidRefreshRate(3.0)))
        );
        assert!(mock_bus.recent_operations().is_empty());
        assert_eq!(mock_bus.control_register(), DATASHEET_CONTROL_REGISTER);
    }

    #[test]
    fn refresh_rate() {
        let (mut driver, mock_bus) = create_driver(0);
        assert_eq!(driver.refresh_rate().unwrap(), FrameRate::Two);
        assert_eq!(driver.frame_period_ms(), 500);
        driver.set_refresh_rate_hz(0.5).unwrap();
        assert_eq!(driver.refresh_rate().unwrap(), FrameRate::Half);
        assert_eq!(mock_bus.control_register(), 0x1801);
        assert_eq!(driver.frame_period_ms(), 2000);
    }

    #[test]
    fn access_pattern() {
        let (mut driver, mock_bus) = create_driver(0);
        assert_eq!(driver.access_pattern().unwrap(), AccessPattern::Chess);
        driver.set_interleaved_mode().unwrap();
        assert_eq!(mock_bus.control_register(), 0x0901);
        assert_eq!(driver.access_pattern().unwrap(), AccessPattern::Interleave);
        driver.set_chess_mode().unwrap();
        assert_eq!(mock_bus.control_register(), DATASHEET_CONTROL_REGISTER);
    }

    #[test]
    fn last_subpage() {
        let (mut driver, _) = create_driver(1);
        assert_eq!(driver.last_subpage().unwrap(), Subpage::One);
        assert_eq!(driver.data_available().unwrap(), Some(Subpage::One));
    }

    #[test]
    fn emissivity() {
        let (mut driver, _) = create_driver(0);
        assert_eq!(driver.emissivity(), 1.0);
        driver.set_emissivity(0.92).unwrap();
        assert_eq!(driver.emissivity(), 0.92);
        assert_eq!(
            driver.set_emissivity(0.0),
            Err(ParameterError::InvalidEmissivity(0.0))
        );
        assert_eq!(
            driver.set_emissivity(1.5),
            Err(ParameterError::InvalidEmissivity(1.5))
        );
        // Failed updates don't change anything
        assert_eq!(driver.emissivity(), 0.92);
    }

    #[test]
    fn reflected_temperature() {
        let (mut driver, _) = create_driver(0);
        assert_eq!(
            driver.reflected_temperature(),
            ReflectedTemperature::RelativeToAmbient(-8.0)
        );
        driver.set_reflected_temperature(ReflectedTemperature::Fixed(25.0));
        assert_eq!(
            driver.reflected_temperature(),
            ReflectedTemperature::Fixed(25.0)
        );
    }

    #[test]
    fn acquire() {
        let (mut driver, mock_bus) = create_driver(0);
        let frame = driver.acquire().unwrap();
        assert_eq!(frame.subpage(), Subpage::Zero);
        assert_eq!(frame.words(), &datasheet_ram_words());
        let ops: Vec<_> = mock_bus.recent_operations().iter().copied().collect();
        assert_eq!(
            ops,
            vec![
                I2cOperation::Read {
                    address: 0x800D,
                    length: 2
                },
                I2cOperation::Read {
                    address: STATUS_REGISTER_ADDRESS,
                    length: 2
                },
                I2cOperation::Read {
                    address: 0x0400,
                    length: RAM_WORDS * 2
                },
                I2cOperation::Write {
                    address: STATUS_REGISTER_ADDRESS,
                    length: 2
                },
                I2cOperation::Read {
                    address: STATUS_REGISTER_ADDRESS,
                    length: 2
                },
            ]
        );
        // New data cleared, overwrite and start measurement set.
        assert_eq!(mock_bus.status_register(), 0x0030);
        assert!(approx_eq!(
            f32,
            driver.supply_voltage().unwrap(),
            3.3186237,
            epsilon = 0.00001
        ));
        assert!(approx_eq!(
            f32,
            driver.ambient_temperature().unwrap(),
            39.184424,
            epsilon = 0.0005
        ));
    }

    #[test]
    fn acquire_not_ready() {
        let (mut driver, mock_bus) = create_driver(0);
        mock_bus.set_data_available(false);
        assert_eq!(
            driver.acquire().map(|frame| frame.subpage()),
            Err(Error::Comm(CommError::DataNotReady))
        );
        // Only the status register is checked.
        assert_eq!(mock_bus.recent_operations().len(), 1);
        assert!(driver.last_frame().is_none());
    }

    #[test]
    fn acquire_torn_frame() {
        let (mut driver, mock_bus) = create_driver(0);
        mock_bus.set_new_data_during_ram_read(true);
        assert_eq!(
            driver.acquire().map(|frame| frame.subpage()),
            Err(Error::Comm(CommError::DataNotReady))
        );
        assert!(driver.last_frame().is_none());
        // A retry after the camera calms down works.
        mock_bus.set_new_data_during_ram_read(false);
        assert_eq!(
            driver.acquire().map(|frame| frame.subpage()),
            Ok(Subpage::Zero)
        );
    }

    #[test]
    fn acquire_bytes() {
        let (mut driver, _) = create_driver(1);
        let mut buffer = [0u8; RAM_WORDS * 2];
        assert_eq!(driver.acquire_bytes(&mut buffer), Ok(Subpage::One));
        assert_eq!(&buffer[..], &words_to_bytes(&datasheet_ram_words())[..]);
        assert_eq!(driver.last_frame().unwrap().subpage(), Subpage::One);
        let mut short = [0u8; 12];
        assert_eq!(
            driver.acquire_bytes(&mut short),
            Err(Error::Parameter(ParameterError::BufferLength {
                expected: RAM_WORDS * 2,
                actual: 12
            }))
        );
    }

    #[test]
    fn bus_faults() {
        let (mut driver, mock_bus) = create_driver(0);
        mock_bus.set_fail_reads(true);
        assert_eq!(
            driver.refresh_rate(),
            Err(Error::Comm(CommError::BusFault(BusFault::Read(
                MockError::Injected
            ))))
        );
        mock_bus.set_fail_reads(false);
        mock_bus.set_fail_writes(true);
        assert_eq!(
            driver.set_resolution(Resolution::Sixteen),
            Err(Error::Comm(CommError::BusFault(BusFault::Write(
                MockError::Injected
            ))))
        );
        let mut buffer = [f32::NAN; NUM_PIXELS];
        assert!(driver.generate_image_if_ready(&mut buffer).is_err());
        assert!(buffer.iter().all(|t| t.is_nan()));
    }

    #[test]
    fn datasheet_integration() {
        let (mut driver, _) = create_driver(0);
        let mut temperatures = [f32::NAN; NUM_PIXELS];
        let res = driver.generate_image_if_ready(&mut temperatures);
        assert_eq!(res, Ok(true));
        let t_o = temperatures[pixel_index(11, 15)];
        assert!(approx_eq!(f32, t_o, 80.216371, epsilon = 0.01), "{}", t_o);
        // Only the chess squares of subpage 0 were filled in
        assert!(temperatures[pixel_index(11, 16)].is_nan());
        // And the data has been consumed
        assert_eq!(driver.generate_image_if_ready(&mut temperatures), Ok(false));
    }

    #[test]
    fn datasheet_emissivity_and_reflected() {
        let (mut driver, _) = create_driver(0);
        driver.set_emissivity(0.95).unwrap();
        driver.set_reflected_temperature(ReflectedTemperature::Fixed(25.0));
        let mut temperatures = [f32::NAN; NUM_PIXELS];
        assert_eq!(driver.generate_image_if_ready(&mut temperatures), Ok(true));
        let t_o = temperatures[pixel_index(11, 15)];
        assert!(approx_eq!(f32, t_o, 82.55873, epsilon = 0.01), "{}", t_o);
    }

    #[test]
    fn full_image() {
        let (mut driver, mock_bus) = create_driver(0);
        let mut temperatures = [f32::NAN; NUM_PIXELS];
        assert_eq!(driver.generate_image_if_ready(&mut temperatures), Ok(true));
        mock_bus.update_frame(&datasheet_ram_words(), datasheet_status_register(1));
        assert_eq!(driver.generate_image_if_ready(&mut temperatures), Ok(true));
        assert!(temperatures.iter().all(|t| !t.is_nan()));
        let t_o = temperatures[pixel_index(11, 16)];
        assert!(approx_eq!(f32, t_o, 79.810957, epsilon = 0.01), "{}", t_o);
    }

    #[test]
    fn raw_image() {
        let (mut driver, _) = create_driver(0);
        let mut image = [f32::NAN; NUM_PIXELS];
        assert_eq!(driver.generate_raw_image_if_ready(&mut image), Ok(true));
        let ratio = image[pixel_index(11, 15)] / 5685320857.08;
        assert!(approx_eq!(f32, ratio, 1.0, epsilon = 0.0001), "{}", ratio);
        assert!(image[pixel_index(11, 16)].is_nan());
    }

    #[test]
    fn image_not_ready() {
        let (mut driver, mock_bus) = create_driver(0);
        mock_bus.set_data_available(false);
        let mut temperatures = [f32::NAN; NUM_PIXELS];
        assert_eq!(driver.generate_image_if_ready(&mut temperatures), Ok(false));
        assert_eq!(driver.generate_raw_image_if_ready(&mut temperatures), Ok(false));
        assert!(temperatures.iter().all(|t| t.is_nan()));
    }

    #[test]
    fn image_wrong_length() {
        let (mut driver, mock_bus) = create_driver(0);
        let mut temperatures = [0f32; 10];
        assert_eq!(
            driver.generate_image_if_ready(&mut temperatures),
            Err(Error::Parameter(ParameterError::BufferLength {
                expected: NUM_PIXELS,
                actual: 10
            }))
        );
        // Checked before touching the camera, so the data is still there.
        assert!(mock_bus.recent_operations().is_empty());
        assert_eq!(driver.data_available().unwrap(), Some(Subpage::Zero));
    }

    #[test]
    fn wait_frame_period() {
        let mock_bus = datasheet_camera_at_address(ADDRESS, 0);
        let delay = MockDelay::new();
        let mut driver = Mlx90640Driver::new(mock_bus, delay.clone(), ADDRESS).unwrap();
        driver.wait_frame_period();
        assert_eq!(delay.total_ms(), 500);
        driver.set_refresh_rate(FrameRate::Eight).unwrap();
        driver.wait_frame_period();
        assert_eq!(delay.total_ms(), 625);
    }

    #[test]
    fn dump_eeprom() {
        let (mut driver, _) = create_driver(0);
        assert_eq!(driver.dump_eeprom().unwrap(), datasheet_eeprom_words());
        let mut bytes = [0u8; EEPROM_WORDS * 2];
        driver.dump_eeprom_bytes(&mut bytes).unwrap();
        assert_eq!(&bytes[..], &words_to_bytes(&datasheet_eeprom_words())[..]);
        let mut short = [0u8; 100];
        assert_eq!(
            driver.dump_eeprom_bytes(&mut short),
            Err(Error::Parameter(ParameterError::BufferLength {
                expected: EEPROM_WORDS * 2,
                actual: 100
            }))
        );
    }

    #[test]
    fn correct_image() {
        let broken = pixel_index(5, 5);
        let eeprom = EepromEditor::from_datasheet()
            .set_pixel(broken, 0x0000)
            .into_words();
        let mock_bus = MockCameraBus::new(
            ADDRESS,
            &eeprom,
            &datasheet_ram_words(),
            DATASHEET_CONTROL_REGISTER,
            datasheet_status_register(0),
        );
        let driver = Mlx90640Driver::new(mock_bus, MockDelay::new(), ADDRESS).unwrap();
        let mut pixels = [20f32; NUM_PIXELS];
        pixels[broken] = -273.0;
        driver
            .correct_image(&mut pixels, CorrectionScope::FullFrame)
            .unwrap();
        assert_eq!(pixels[broken], 20.0);
    }

    #[test]
    fn release() {
        let (driver, mock_bus) = create_driver(0);
        let (bus, _delay) = driver.release();
        drop(bus);
        // The test's handle still works afterwards.
        assert_eq!(mock_bus.control_register(), DATASHEET_CONTROL_REGISTER);
    }
}
