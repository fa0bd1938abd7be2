//! Smoothing demo: Gaussian focal filter on a noisy synthetic surface
//!
//! Builds a 200x200 tilted plane with checkerboard noise, writes it to
//! GeoTIFF, then filters it through the file store with a corner-anchored
//! and a centred kernel:
//!   1. original.tif   : the synthetic input
//!   2. corner.tif     : 5x5, sigma 1.5, corner-anchored (historical indexing)
//!   3. centered.tif   : 5x5, sigma 1.5, centred in the window
//!
//! Run:
//!   cargo run -p geofocal-algorithms --example smoothing_demo

use std::fs;
use std::path::Path;

use geofocal_algorithms::filter::{focal_filter, GaussianParams, Kernel, KernelAnchor, OutputSpec};
use geofocal_core::io::{read_geotiff, write_geotiff, CreationOptions, GeoTiffStore};
use geofocal_core::{GeoTransform, Raster, CRS};

const ROWS: usize = 200;
const COLS: usize = 200;

fn main() {
    let out_dir = Path::new("output/smoothing_demo");
    fs::create_dir_all(out_dir).expect("Cannot create output directory");

    let input = build_noisy_plane();
    let input_path = out_dir.join("original.tif");
    write_geotiff(&input, &input_path, &CreationOptions::default()).expect("write failed");
    println!("Synthetic surface: {}x{}", COLS, ROWS);
    print_roughness("  original", &input);

    for (name, anchor) in [("corner", KernelAnchor::Corner), ("centered", KernelAnchor::Center)] {
        let kernel = Kernel::gaussian_with(GaussianParams {
            height: 5,
            width: 5,
            sigma: 1.5,
            anchor,
        })
        .expect("invalid kernel");

        let output = out_dir.join(format!("{}.tif", name));
        let report = focal_filter(&GeoTiffStore, &kernel, &input_path, &output, &OutputSpec::default())
            .expect("filter failed");
        let (rows, cols) = report.output_shape();
        println!("\n{} kernel -> {}x{} ({})", name, cols, rows, output.display());

        let smoothed = read_geotiff(&output).expect("read failed");
        print_roughness("  smoothed", &smoothed);
    }
}

fn build_noisy_plane() -> Raster<f64> {
    let mut r = Raster::new(ROWS, COLS);
    r.set_transform(GeoTransform::new(300_000.0, 4_500_000.0, 10.0, -10.0));
    r.set_crs(Some(CRS::from_epsg(32633)));
    for row in 0..ROWS {
        for col in 0..COLS {
            let plane = 100.0 + 0.5 * row as f64 + 0.25 * col as f64;
            let noise = if (row + col) % 2 == 0 { 4.0 } else { -4.0 };
            r.set(row, col, plane + noise).unwrap();
        }
    }
    r
}

/// Mean absolute difference between horizontal neighbours
fn print_roughness(label: &str, r: &Raster<f64>) {
    let (rows, cols) = r.shape();
    let mut total = 0.0;
    for row in 0..rows {
        for col in 1..cols {
            total += (r.get(row, col).unwrap() - r.get(row, col - 1).unwrap()).abs();
        }
    }
    println!("{}: roughness {:.3}", label, total / (rows * (cols - 1)) as f64);
}
