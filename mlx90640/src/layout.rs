// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Pixel geometry.
//!
//! Pixels are stored in flat, row-major arrays indexed by `row * WIDTH + column`. Everything that
//! needs to know which subpage a pixel belongs to goes through [`belongs_to_subpage`].
use crate::register::{AccessPattern, Subpage};

/// The height of the image, in pixels.
pub const HEIGHT: usize = 24;

/// The width of the image, in pixels.
pub const WIDTH: usize = 32;

/// The total number of pixels.
pub const NUM_PIXELS: usize = HEIGHT * WIDTH;

/// The row-major index of a pixel.
#[inline]
pub const fn pixel_index(row: usize, column: usize) -> usize {
    row * WIDTH + column
}

/// The (row, column) of a row-major pixel index.
#[inline]
pub const fn pixel_coordinates(index: usize) -> (usize, usize) {
    (index / WIDTH, index % WIDTH)
}

/// Which subpage measures the pixel at (`row`, `column`).
///
/// In chess mode, the subpage alternates every pixel in both directions, with the top left pixel
/// in subpage 0. In interleave mode, each row belongs to one subpage, starting with row 0 in
/// subpage 0.
pub fn subpage_of(row: usize, column: usize, access_pattern: AccessPattern) -> Subpage {
    let parity = match access_pattern {
        AccessPattern::Chess => (row + column) % 2,
        AccessPattern::Interleave => row % 2,
    };
    if parity == 0 {
        Subpage::Zero
    } else {
        Subpage::One
    }
}

/// Check if the pixel at (`row`, `column`) is measured in `subpage`.
pub fn belongs_to_subpage(
    row: usize,
    column: usize,
    access_pattern: AccessPattern,
    subpage: Subpage,
) -> bool {
    subpage_of(row, column, access_pattern) == subpage
}

/// Iterate over the indices of every pixel in a subpage, in ascending order.
pub fn subpage_pixels(
    access_pattern: AccessPattern,
    subpage: Subpage,
) -> impl Iterator<Item = usize> + Clone {
    (0..NUM_PIXELS).filter(move |index| {
        let (row, column) = pixel_coordinates(*index);
        belongs_to_subpage(row, column, access_pattern, subpage)
    })
}

/// The "conversion pattern" used by the interleave correction.
///
/// Within each group of four columns this is 0, -1, 0, +1, with the sign flipped on odd rows.
pub(crate) fn conversion_pattern(row: usize, column: usize) -> f32 {
    let column_term = match column % 4 {
        1 => -1f32,
        3 => 1f32,
        _ => 0f32,
    };
    if row % 2 == 0 {
        column_term
    } else {
        -column_term
    }
}
