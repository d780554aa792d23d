use approx::assert_relative_eq;

use fitscut_core::histogram::{compute_histogram, eq_histogram, histogram_mode};

#[test]
fn test_histogram_under_and_overflow() {
    let values = [-5.0, 0.0, 2.5, 5.0, 7.5, 10.0, 15.0];
    let hist = compute_histogram(&values, 4, 0.0, 10.0, f32::NAN);
    assert_eq!(hist.bins, vec![2, 1, 1, 3, 0]);
    assert_eq!(hist.pixcount, 7);
    assert_eq!(hist.in_min, 0.0);
    assert_eq!(hist.in_max, 10.0);
}

#[test]
fn test_histogram_population_preserved() {
    let values: Vec<f32> = (0..500)
        .map(|i| ((i * 37) % 101) as f32 - 20.0)
        .chain([f32::NAN, f32::INFINITY, -999.0])
        .collect();
    let hist = compute_histogram(&values, 64, 0.0, 50.0, -999.0);
    assert_eq!(hist.pixcount, 500);
    assert_eq!(hist.bins.iter().sum::<u64>(), hist.pixcount);
    assert_eq!(hist.bins.len(), 65);
}

#[test]
fn test_histogram_no_value_in_domain() {
    let hist = compute_histogram(&[-3.0, 30.0], 8, 0.0, 10.0, f32::NAN);
    assert_eq!(hist.pixcount, 2);
    assert_eq!(hist.in_min, 5.0);
    assert_eq!(hist.in_max, 5.0);
}

#[test]
fn test_eq_histogram_monotonic() {
    let values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
    let hist = compute_histogram(&values, 1000, 0.0, 999.0, f32::NAN);
    let lut = eq_histogram(&hist);
    assert_eq!(lut.len(), 1001);
    assert_eq!(lut[0], 0);
    assert_eq!(lut[1000], 255);
    assert!(lut.windows(2).all(|w| w[0] <= w[1]));
    // Uniform data maps the middle of the range to the middle level.
    assert!((lut[500] as i32 - 128).abs() <= 2);
}

#[test]
fn test_eq_histogram_more_bins_than_levels() {
    let values: Vec<f32> = (0..20).map(|i| (i % 4) as f32).collect();
    let hist = compute_histogram(&values, 10_000, 0.0, 3.0, f32::NAN);
    let lut = eq_histogram(&hist);
    assert_eq!(lut.len(), 10_001);
    assert!(lut.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_histogram_mode() {
    let mut values = vec![5.0f32; 10];
    values.extend([1.0, 2.0, 9.0]);
    let mode = histogram_mode(&values, 11, 0.0, 10.0, f32::NAN);
    assert_relative_eq!(mode, 4.5);
}
