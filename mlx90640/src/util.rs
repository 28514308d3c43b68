// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The word size of the camera in terms of 8-bit bytes.
pub(crate) const WORD_SIZE: usize = (u16::BITS / u8::BITS) as usize;

// Logging shims so the rest of the crate doesn't need to care whether `log` is enabled.
#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug;
pub(crate) use log_warn;

/// Check if the n-th bit is set.
///
/// Bits are 0-indexed, from the LSB.
pub(crate) fn is_bit_set<B>(value: B, index: usize) -> bool
where
    B: num_traits::PrimInt + num_traits::Unsigned,
{
    (value & (B::one() << index)) > B::zero()
}

/// Pull out `num_bits` bits of `word` starting at bit `shift`, treating them as a two's
/// complement signed integer.
pub(crate) fn signed_field(word: u16, shift: u32, num_bits: u32) -> i16 {
    let unused = 16 - num_bits;
    // Move the field to the top of the word, then let the arithmetic shift do the sign extension.
    (((word >> shift) << unused) as i16) >> unused
}

/// Pull out `num_bits` bits of `word` starting at bit `shift`.
pub(crate) fn unsigned_field(word: u16, shift: u32, num_bits: u32) -> u16 {
    (word >> shift) & ((1u16 << num_bits) - 1)
}

/// Split a word into its four nibbles, least significant first, as signed 4-bit values.
pub(crate) fn word_to_i4s(word: u16) -> [i16; 4] {
    [
        signed_field(word, 0, 4),
        signed_field(word, 4, 4),
        signed_field(word, 8, 4),
        signed_field(word, 12, 4),
    ]
}

/// Convert a big-endian byte buffer into words.
///
/// Trailing odd bytes are ignored. `words` is filled up to the shorter of the two lengths.
pub(crate) fn bytes_to_words(bytes: &[u8], words: &mut [u16]) {
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(WORD_SIZE)) {
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
}

/// `2^exponent` as a float, for the many scaling factors the calibration data uses.
pub(crate) fn pow2(exponent: i32) -> f32 {
    num_traits::Float::powi(2f32, exponent)
}

#[cfg(test)]
mod test {
    #[test]
    fn is_bit_set() {
        for n in 0..16 {
            let value: u16 = 1 << n;
            assert!(
                super::is_bit_set(value, n),
                "is_bit_set was incorrect for bit {}",
                n
            );
        }
        assert!(!super::is_bit_set(0xFFFEu16, 0));
    }

    #[test]
    fn signed_field() {
        assert_eq!(super::signed_field(0x00FF, 0, 8), -1);
        assert_eq!(super::signed_field(0x03FF, 0, 10), -1);
        // Upper bits get ignored
        assert_eq!(super::signed_field(0xF07F, 0, 8), 127);
        assert_eq!(super::signed_field(0xFC00, 10, 6), -1);
        assert_eq!(super::signed_field(0x7C00, 10, 6), 31);
        assert_eq!(super::signed_field(0x8000, 0, 16), i16::MIN);
    }

    #[test]
    fn unsigned_field() {
        assert_eq!(super::unsigned_field(0x3000, 12, 2), 3);
        assert_eq!(super::unsigned_field(0xABCD, 4, 8), 0xBC);
    }

    #[test]
    fn word_to_i4s() {
        assert_eq!(super::word_to_i4s(0xF10F), [-1, 0, 1, -1]);
        assert_eq!(super::word_to_i4s(0x7008), [-8, 0, 0, 7]);
    }

    #[test]
    fn bytes_to_words() {
        let mut words = [0u16; 2];
        super::bytes_to_words(&[0xde, 0xad, 0xbe, 0xef, 0x01], &mut words);
        assert_eq!(words, [0xdead, 0xbeef]);
    }

    #[test]
    fn pow2() {
        assert_eq!(super::pow2(3), 8.0);
        assert_eq!(super::pow2(-2), 0.25);
    }
}
