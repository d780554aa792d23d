mod common;

use fitscut_core::consts::DEFAULT_BLOCK_BUDGET_BYTES;
use fitscut_core::error::FitscutError;
use fitscut_core::extract::{extract_channel, CutoutRegion, ExtractOptions, RegionSource};
use fitscut_core::image::BadPixelConfig;
use fitscut_core::pipeline::config::{Anchor, CutoutSize, RegionConfig};
use fitscut_core::quality::BadPixelPolicy;

use common::*;

fn options() -> ExtractOptions {
    ExtractOptions {
        zoom: 0.0,
        output_size: None,
        block_budget_bytes: DEFAULT_BLOCK_BUDGET_BYTES,
    }
}

fn region(width: i64, height: i64, anchor: Anchor) -> RegionConfig {
    RegionConfig {
        size: CutoutSize::Pixels { width, height },
        anchor,
    }
}

#[test]
fn test_resolve_full_and_anchors() {
    let full = CutoutRegion::resolve(&RegionConfig::default(), 6, 4, 0).unwrap();
    assert_eq!((full.x0, full.y0, full.ncols, full.nrows), (0, 0, 6, 4));

    let centered = CutoutRegion::resolve(&region(2, 2, Anchor::Center { x: 3.0, y: 2.0 }), 6, 4, 0).unwrap();
    assert_eq!((centered.x0, centered.y0), (2, 1));

    let corner = CutoutRegion::resolve(&region(3, 3, Anchor::Corner { x: -4, y: 9 }), 6, 4, 0).unwrap();
    assert_eq!((corner.x0, corner.y0), (-4, 9));
    assert!(corner.overlap(6, 4).is_none());
}

#[test]
fn test_resolve_full_ignores_anchor() {
    for anchor in [Anchor::Center { x: 1.0, y: 1.0 }, Anchor::Corner { x: 3, y: -2 }] {
        let config = RegionConfig {
            size: CutoutSize::Full,
            anchor,
        };
        let full = CutoutRegion::resolve(&config, 7, 5, 0).unwrap();
        assert_eq!((full.x0, full.y0, full.ncols, full.nrows), (0, 0, 7, 5));
        let overlap = full.overlap(7, 5).unwrap();
        assert_eq!((overlap.cols, overlap.rows), (7, 5));
    }
}

#[test]
fn test_resolve_rejects_non_positive_size() {
    let result = CutoutRegion::resolve(&region(0, 5, Anchor::ImageCenter), 6, 4, 2);
    assert!(matches!(result, Err(FitscutError::InvalidCutout { channel: 2, .. })));
}

#[test]
fn test_extract_full_image() {
    let data = build_fits_f32(6, 4, &ramp(6, 4), &[]);
    let file = write_test_fits(&data);
    let config = RegionConfig::default();

    let channel = extract_channel(
        0,
        file.path(),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &options(),
    )
    .unwrap();

    assert_eq!((channel.ncols(), channel.nrows()), (6, 4));
    assert_eq!(channel.data.as_ref().unwrap().as_slice().unwrap(), ramp(6, 4).as_slice());
    assert_eq!(channel.source_dims, (6, 4));
    assert!(channel.overlaps_source);
    assert_eq!(channel.zoom_factor, 1.0);
    assert!(channel.wcs.is_none());
}

#[test]
fn test_extract_pads_outside_with_nan() {
    let data = build_fits_f32(6, 4, &ramp(6, 4), &[]);
    let file = write_test_fits(&data);
    let config = region(4, 2, Anchor::Corner { x: -2, y: 1 });

    let channel = extract_channel(
        0,
        file.path(),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &options(),
    )
    .unwrap();
    let out = channel.data.as_ref().unwrap();
    assert_eq!(out.dim(), (2, 4));
    assert!(out[[0, 0]].is_nan() && out[[0, 1]].is_nan());
    assert_eq!((out[[0, 2]], out[[0, 3]]), (6.0, 7.0));
    assert!(out[[1, 0]].is_nan() && out[[1, 1]].is_nan());
    assert_eq!((out[[1, 2]], out[[1, 3]]), (12.0, 13.0));
}

#[test]
fn test_extract_without_overlap_is_blank() {
    let data = build_fits_f32(6, 4, &ramp(6, 4), &[]);
    let file = write_test_fits(&data);
    let config = region(3, 3, Anchor::Corner { x: 100, y: 100 });

    let channel = extract_channel(
        1,
        file.path(),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &options(),
    )
    .unwrap();
    assert!(!channel.overlaps_source);
    assert_eq!((channel.ncols(), channel.nrows()), (3, 3));
    assert!(channel.data.as_ref().unwrap().iter().all(|v| v.is_nan()));
}

#[test]
fn test_extract_streams_shrink_blocks() {
    let data = build_fits_f32(4, 4, &ramp(4, 4), &[]);
    let file = write_test_fits(&data);
    let config = RegionConfig::default();
    // One source row per budget, rounded up to a whole rebin block.
    let opts = ExtractOptions {
        zoom: 0.5,
        output_size: None,
        block_budget_bytes: 16,
    };

    let channel = extract_channel(
        0,
        file.path(),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &opts,
    )
    .unwrap();
    let out = channel.data.as_ref().unwrap();
    assert_eq!(out.dim(), (2, 2));
    assert_eq!(out.as_slice().unwrap(), &[2.5, 4.5, 10.5, 12.5]);
    assert_eq!(channel.zoom_factor, 0.5);
    assert!(channel.zoom.shrink);
}

#[test]
fn test_extract_enlarges() {
    let data = build_fits_f32(2, 2, &[1.0, 2.0, 3.0, 4.0], &[]);
    let file = write_test_fits(&data);
    let config = RegionConfig::default();
    let opts = ExtractOptions {
        zoom: 2.0,
        ..options()
    };

    let channel = extract_channel(
        0,
        file.path(),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &opts,
    )
    .unwrap();
    let out = channel.data.as_ref().unwrap();
    assert_eq!(out.dim(), (4, 4));
    assert_eq!(out.row(1).to_vec(), vec![1.0, 1.0, 2.0, 2.0]);
    assert_eq!(out.row(2).to_vec(), vec![3.0, 3.0, 4.0, 4.0]);
}

#[test]
fn test_extract_flags_sentinel() {
    let mut values = ramp(4, 2);
    values[3] = -999.0;
    values[5] = -999.0;
    let data = build_fits_f32(4, 2, &values, &[]);
    let file = write_test_fits(&data);
    let config = RegionConfig::default();
    let bad = BadPixelConfig {
        bad_data_value: -999.0,
        ..BadPixelConfig::default()
    };

    let channel = extract_channel(0, file.path(), RegionSource::Config(&config), &bad, &options()).unwrap();
    assert_eq!(channel.policy, BadPixelPolicy::Sentinel(-999.0));
    assert_eq!(channel.bad_count, 2);
    let out = channel.data.as_ref().unwrap();
    assert_eq!(out.iter().filter(|v| v.is_nan()).count(), 2);
    assert_eq!(channel.good_values().count(), 6);
}

#[test]
fn test_extract_updates_wcs() {
    let wcs = linear_wcs_cards((1.0, 1.0), (10.0, 20.0));
    let data = build_fits_f32(6, 4, &ramp(6, 4), &wcs);
    let file = write_test_fits(&data);
    let config = region(3, 2, Anchor::Corner { x: 2, y: 1 });

    let channel = extract_channel(
        0,
        file.path(),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &options(),
    )
    .unwrap();
    let wcs = channel.wcs.as_ref().unwrap();
    assert_eq!(wcs.crpix(), [-1.0, 0.0]);
    assert_eq!(wcs.naxis(), [3, 2]);
    // First cutout pixel sits on source pixel (3, 2).
    assert_eq!(wcs.pixel_to_world(1.0, 1.0), Some((12.0, 21.0)));
}

#[test]
fn test_extract_missing_file_is_error() {
    let config = RegionConfig::default();
    let result = extract_channel(
        0,
        std::path::Path::new("/nonexistent/image.fits"),
        RegionSource::Config(&config),
        &BadPixelConfig::default(),
        &options(),
    );
    assert!(matches!(result, Err(FitscutError::Io(_))));
}
