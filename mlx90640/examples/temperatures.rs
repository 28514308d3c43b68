// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::env;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use linux_embedded_hal::{Delay, I2cdev};

use mlx90640::{CorrectionScope, Mlx90640Driver};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 5 {
        bail!("Usage: <I2C bus> <camera address> [refresh rate in Hz] [emissivity]");
    }
    let address: u8 = if let Some(hex_digits) = args[2].strip_prefix("0x") {
        u8::from_str_radix(hex_digits, 16).context("If the address starts with 0x, it's hex")?
    } else {
        args[2].parse().context("The address should be an integer")?
    };
    let bus_path = Path::new(&args[1]);
    let bus = I2cdev::new(bus_path)
        .with_context(|| format!("{} should be an I2C device", bus_path.display()))?;
    let mut camera = Mlx90640Driver::new(bus, Delay, address)?;
    if let Some(rate) = args.get(3) {
        let rate: f32 = rate.parse().context("The refresh rate should be a number")?;
        camera.set_refresh_rate_hz(rate)?;
    }
    if let Some(emissivity) = args.get(4) {
        let emissivity: f32 = emissivity
            .parse()
            .context("The emissivity should be a number")?;
        camera.set_emissivity(emissivity)?;
    }

    let mut temperatures = vec![f32::NAN; camera.height() * camera.width()];
    // Both subpages are needed for a full image.
    let mut subpages_read = 0;
    let mut attempts = 0;
    while subpages_read < 2 {
        attempts += 1;
        if attempts > 10 {
            return Err(anyhow!("The camera never reported new data"));
        }
        camera.wait_frame_period();
        if camera.generate_image_if_ready(&mut temperatures)? {
            subpages_read += 1;
        }
    }
    camera.correct_image(&mut temperatures, CorrectionScope::FullFrame)?;

    if let (Some(ambient), Some(supply)) = (camera.ambient_temperature(), camera.supply_voltage()) {
        println!("Ambient: {:.2}℃, supply: {:.3}V", ambient, supply);
    }
    print_temperatures(&temperatures, camera.width());
    println!();
    Ok(())
}

fn print_temperatures(temperatures: &[f32], width: usize) {
    for (count, temperature) in temperatures.iter().enumerate() {
        if count % width == 0 {
            println!();
        }
        print!("{:6.2} ", temperature);
    }
}
