// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::ops::Range;
use std::rc::Rc;

use embedded_hal::blocking::{delay, i2c};

use crate::eeprom_data::{datasheet_eeprom_words, EEPROM_WORDS};
use crate::ram_data::{
    datasheet_ram_words, datasheet_status_register, DATASHEET_CONTROL_REGISTER, RAM_WORDS,
};

pub const STATUS_REGISTER_ADDRESS: u16 = 0x8000;

pub const CONTROL_REGISTER_ADDRESS: u16 = 0x800D;

const RAM_RANGE: Range<u16> = 0x0400..(0x0400 + RAM_WORDS as u16);

const EEPROM_RANGE: Range<u16> = 0x2400..(0x2400 + EEPROM_WORDS as u16);

// Bits 3 through 5 are the only ones the controller may change.
const STATUS_REGISTER_WRITE_MASK: u16 = 0x0038;

// Only the top three bits of the control register are reserved.
const CONTROL_REGISTER_WRITE_MASK: u16 = 0x1FFF;

const NEW_DATA_FLAG: u16 = 0x0008;

const RECENT_OPERATIONS_QUEUE_LENGTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    /// The given address can't be read from or written to.
    IllegalAccess(u16),

    /// The write would have changed reserved bits of a register.
    IllegalWriteValue(u16, u16),

    /// An unknown I²C address was given.
    UnknownI2cAddress(u8),

    /// The transaction was malformed (odd byte counts, zero-length reads, that sort of thing).
    IllegalOperation,

    /// A bus failure injected by the test.
    Injected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cOperation {
    Write { address: u16, length: usize },
    Read { address: u16, length: usize },
}

#[derive(Clone, Debug)]
struct MockState {
    eeprom: [u16; EEPROM_WORDS],
    ram: [u16; RAM_WORDS],
    status: u16,
    control: u16,
    recent_operations: VecDeque<I2cOperation>,
    fail_reads: bool,
    fail_writes: bool,
    new_data_during_ram_read: bool,
}

/// An in-memory MLX90640.
///
/// Clones share the same state, so a test can keep a handle to the camera after handing a clone
/// to the driver.
#[derive(Clone, Debug)]
pub struct MockCameraBus {
    i2c_address: u8,
    state: Rc<RefCell<MockState>>,
}

impl MockCameraBus {
    pub fn new(
        i2c_address: u8,
        eeprom: &[u16; EEPROM_WORDS],
        ram: &[u16; RAM_WORDS],
        control: u16,
        status: u16,
    ) -> Self {
        Self {
            i2c_address,
            state: Rc::new(RefCell::new(MockState {
                eeprom: *eeprom,
                ram: *ram,
                status,
                control,
                recent_operations: VecDeque::new(),
                fail_reads: false,
                fail_writes: false,
                new_data_during_ram_read: false,
            })),
        }
    }

    /// Replace RAM and the status register, simulating the camera finishing a measurement.
    ///
    /// The status register value is used as-is, so include the new data flag if it should be set.
    pub fn update_frame(&self, ram: &[u16; RAM_WORDS], status: u16) {
        let mut state = self.state.borrow_mut();
        state.ram = *ram;
        state.status = status;
    }

    /// Set (or clear) the "new data available" flag in the status register.
    pub fn set_data_available(&self, available: bool) {
        let mut state = self.state.borrow_mut();
        if available {
            state.status |= NEW_DATA_FLAG;
        } else {
            state.status &= !NEW_DATA_FLAG;
        }
    }

    /// Make every following read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.borrow_mut().fail_reads = fail;
    }

    /// Make every following write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    /// Have the camera publish another frame while RAM is being read.
    pub fn set_new_data_during_ram_read(&self, enabled: bool) {
        self.state.borrow_mut().new_data_during_ram_read = enabled;
    }

    pub fn status_register(&self) -> u16 {
        self.state.borrow().status
    }

    pub fn control_register(&self) -> u16 {
        self.state.borrow().control
    }

    pub fn recent_operations(&self) -> Ref<VecDeque<I2cOperation>> {
        Ref::map(self.state.borrow(), |state| &state.recent_operations)
    }

    pub fn clear_recent_operations(&self) {
        self.state.borrow_mut().recent_operations.clear()
    }

    fn add_operation(&self, operation: I2cOperation) {
        let mut state = self.state.borrow_mut();
        state.recent_operations.push_front(operation);
        state
            .recent_operations
            .truncate(RECENT_OPERATIONS_QUEUE_LENGTH);
    }

    fn read_words(&self, address: u16, out_buffer: &mut [u8]) -> Result<(), MockError> {
        let word_count = (out_buffer.len() / 2) as u16;
        let end_address = address
            .checked_add(word_count)
            .ok_or(MockError::IllegalAccess(address))?;
        let mut state = self.state.borrow_mut();
        let source: &[u16] = if RAM_RANGE.contains(&address) && end_address <= RAM_RANGE.end {
            let start = (address - RAM_RANGE.start) as usize;
            &state.ram[start..(start + word_count as usize)]
        } else if EEPROM_RANGE.contains(&address) && end_address <= EEPROM_RANGE.end {
            let start = (address - EEPROM_RANGE.start) as usize;
            &state.eeprom[start..(start + word_count as usize)]
        } else if word_count == 1 && address == STATUS_REGISTER_ADDRESS {
            core::slice::from_ref(&state.status)
        } else if word_count == 1 && address == CONTROL_REGISTER_ADDRESS {
            core::slice::from_ref(&state.control)
        } else {
            return Err(MockError::IllegalAccess(address));
        };
        for (chunk, word) in out_buffer.chunks_exact_mut(2).zip(source.iter()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        if RAM_RANGE.contains(&address) && state.new_data_during_ram_read {
            state.status |= NEW_DATA_FLAG;
        }
        Ok(())
    }

    fn write_word(&self, address: u16, value: u16) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        let (register, mask) = match address {
            STATUS_REGISTER_ADDRESS => (&mut state.status, STATUS_REGISTER_WRITE_MASK),
            CONTROL_REGISTER_ADDRESS => (&mut state.control, CONTROL_REGISTER_WRITE_MASK),
            _ => return Err(MockError::IllegalAccess(address)),
        };
        if address == CONTROL_REGISTER_ADDRESS && (value & !mask) != (*register & !mask) {
            return Err(MockError::IllegalWriteValue(address, value));
        }
        // Read-only bits in the status register are silently kept.
        *register = (*register & !mask) | (value & mask);
        Ok(())
    }
}

impl i2c::Write for MockCameraBus {
    type Error = MockError;

    fn write(&mut self, i2c_address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        if i2c_address != self.i2c_address {
            return Err(MockError::UnknownI2cAddress(i2c_address));
        }
        if self.state.borrow().fail_writes {
            return Err(MockError::Injected);
        }
        // Only single word writes are supported (address + value).
        if bytes.len() != 4 {
            return Err(MockError::IllegalOperation);
        }
        let address = u16::from_be_bytes([bytes[0], bytes[1]]);
        let value = u16::from_be_bytes([bytes[2], bytes[3]]);
        self.write_word(address, value)?;
        self.add_operation(I2cOperation::Write { address, length: 2 });
        Ok(())
    }
}

impl i2c::WriteRead for MockCameraBus {
    type Error = MockError;

    fn write_read(
        &mut self,
        i2c_address: u8,
        write_buffer: &[u8],
        out_buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        if i2c_address != self.i2c_address {
            return Err(MockError::UnknownI2cAddress(i2c_address));
        }
        if self.state.borrow().fail_reads {
            return Err(MockError::Injected);
        }
        // The write half is only ever the starting address, and reads are whole words.
        if write_buffer.len() != 2 || out_buffer.is_empty() || out_buffer.len() % 2 != 0 {
            return Err(MockError::IllegalOperation);
        }
        let address = u16::from_be_bytes([write_buffer[0], write_buffer[1]]);
        self.read_words(address, out_buffer)?;
        self.add_operation(I2cOperation::Read {
            address,
            length: out_buffer.len(),
        });
        Ok(())
    }
}

/// A delay provider that doesn't wait, it just keeps a tally.
#[derive(Clone, Debug, Default)]
pub struct MockDelay {
    total_ms: Rc<Cell<u32>>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of milliseconds requested so far (across all clones).
    pub fn total_ms(&self) -> u32 {
        self.total_ms.get()
    }
}

impl delay::DelayMs<u16> for MockDelay {
    fn delay_ms(&mut self, ms: u16) {
        self.total_ms.set(self.total_ms.get() + u32::from(ms));
    }
}

/// A mock camera loaded with the datasheet's worked example, with new data ready for `subpage`.
pub fn datasheet_camera_at_address(i2c_address: u8, subpage: u16) -> MockCameraBus {
    MockCameraBus::new(
        i2c_address,
        &datasheet_eeprom_words(),
        &datasheet_ram_words(),
        DATASHEET_CONTROL_REGISTER,
        datasheet_status_register(subpage),
    )
}
