// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use criterion::{criterion_group, criterion_main, Criterion};

use mlx90640::Mlx90640Calibration;
use mlx90640_test_data::{datasheet_eeprom_words, words_to_bytes};

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Calibration Loading");

    group.bench_with_input("words", &datasheet_eeprom_words(), |b, eeprom| {
        b.iter(|| Mlx90640Calibration::from_words(eeprom))
    });
    let bytes = words_to_bytes(&datasheet_eeprom_words());
    group.bench_with_input("bytes", &bytes, |b, eeprom| {
        b.iter(|| Mlx90640Calibration::from_bytes(eeprom))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
