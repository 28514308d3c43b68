// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Filling in broken and outlier pixels from their neighbours.
use crate::eeprom::{Mlx90640Calibration, MAX_DEVIATING_PIXELS};
use crate::error::ParameterError;
use crate::layout::{pixel_coordinates, pixel_index, HEIGHT, NUM_PIXELS, WIDTH};
use crate::register::AccessPattern;
use crate::util::log_warn;

/// Which neighbours of a pixel can be used to replace it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CorrectionScope {
    /// A complete image; the pixels directly above, below, left and right are used.
    FullFrame,

    /// A single subpage that hasn't been merged into a full image yet, so only neighbours in the
    /// same subpage have data. For chess that's the diagonal neighbours, for interleave it's the
    /// pixels to either side.
    Subpage(AccessPattern),
}

impl CorrectionScope {
    fn neighbour_offsets(&self) -> &'static [(isize, isize)] {
        match self {
            CorrectionScope::FullFrame => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            CorrectionScope::Subpage(AccessPattern::Chess) => {
                &[(-1, -1), (-1, 1), (1, -1), (1, 1)]
            }
            CorrectionScope::Subpage(AccessPattern::Interleave) => &[(0, -1), (0, 1)],
        }
    }
}

/// Replace each listed pixel with the mean of its usable neighbours.
///
/// A neighbour is usable if it is inside the image, isn't listed itself, and (for floating point
/// values) isn't NaN. Pixels with no usable neighbours are left as they are. Integer values are
/// truncated towards zero.
pub fn correct_pixels<T>(
    pixels: &mut [T],
    flagged: &[u16],
    scope: CorrectionScope,
) -> Result<(), ParameterError>
where
    T: Copy + num_traits::NumCast,
{
    if pixels.len() != NUM_PIXELS {
        return Err(ParameterError::BufferLength {
            expected: NUM_PIXELS,
            actual: pixels.len(),
        });
    }
    let is_flagged = |index: usize| flagged.iter().any(|flag| usize::from(*flag) == index);
    for pixel in flagged.iter().map(|flag| usize::from(*flag)) {
        if pixel >= NUM_PIXELS {
            continue;
        }
        let (row, column) = pixel_coordinates(pixel);
        let (sum, count) = scope
            .neighbour_offsets()
            .iter()
            .filter_map(|(row_offset, column_offset)| {
                let row = row.checked_add_signed(*row_offset).filter(|r| *r < HEIGHT)?;
                let column = column
                    .checked_add_signed(*column_offset)
                    .filter(|c| *c < WIDTH)?;
                Some(pixel_index(row, column))
            })
            .filter(|neighbour| !is_flagged(*neighbour))
            .filter_map(|neighbour| pixels[neighbour].to_f64())
            .filter(|value| !value.is_nan())
            .fold((0f64, 0u32), |(sum, count), value| (sum + value, count + 1));
        if count == 0 {
            log_warn!("Pixel {} has no usable neighbours, leaving it as-is", pixel);
            continue;
        }
        match <T as num_traits::NumCast>::from(sum / f64::from(count)) {
            Some(mean) => pixels[pixel] = mean,
            None => {
                log_warn!("Mean for pixel {} doesn't fit the pixel type", pixel);
            }
        }
    }
    Ok(())
}

/// Replace every broken and outlier pixel the calibration knows about.
pub fn correct<T>(
    pixels: &mut [T],
    calibration: &Mlx90640Calibration,
    scope: CorrectionScope,
) -> Result<(), ParameterError>
where
    T: Copy + num_traits::NumCast,
{
    let mut flagged = [0u16; 2 * MAX_DEVIATING_PIXELS];
    let mut count = 0;
    for (slot, pixel) in flagged.iter_mut().zip(calibration.deviating_pixels()) {
        *slot = pixel;
        count += 1;
    }
    correct_pixels(pixels, &flagged[..count], scope)
}
