use ndarray::{array, Array2};

use fitscut_core::rebin::{
    enlarge_array, enlarge_rows_into, exact_resize, get_zoom_size, reduce_array, reduce_rows_into,
};

#[test]
fn test_reduce_constant_4x4() {
    let input = Array2::from_elem((4, 4), 100.0f32);
    let out = reduce_array(input.view(), 2, f32::NAN);
    assert_eq!(out.dim(), (2, 2));
    assert!(out.iter().all(|&v| v == 100.0));
}

#[test]
fn test_reduce_partial_edge_blocks() {
    let input = array![[1.0f32, 3.0, 5.0], [1.0, 3.0, 7.0], [9.0, 9.0, 11.0]];
    let out = reduce_array(input.view(), 2, f32::NAN);
    assert_eq!(out.dim(), (2, 2));
    assert_eq!(out[[0, 0]], 2.0);
    assert_eq!(out[[0, 1]], 6.0);
    assert_eq!(out[[1, 0]], 9.0);
    assert_eq!(out[[1, 1]], 11.0);
}

#[test]
fn test_reduce_skips_bad_pixels() {
    let input = array![
        [f32::NAN, 4.0, f32::NAN, f32::NAN],
        [-1.0, 8.0, f32::NAN, -1.0]
    ];
    let out = reduce_array(input.view(), 2, -1.0);
    assert_eq!(out[[0, 0]], 6.0);
    assert!(out[[0, 1]].is_nan());
}

#[test]
fn test_enlarge_then_reduce_is_identity() {
    let input = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
    for pixfac in 2..5 {
        let big = enlarge_array(input.view(), pixfac);
        assert_eq!(big.dim(), (2 * pixfac, 3 * pixfac));
        let back = reduce_array(big.view(), pixfac, f32::NAN);
        assert_eq!(back, input);
    }
}

#[test]
fn test_row_block_variants_match_array_versions() {
    let input = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f32);
    let slice = input.as_slice().unwrap();

    let mut reduced = vec![0.0f32; 2 * 3];
    reduce_rows_into(slice, 6, 2, f32::NAN, &mut reduced);
    assert_eq!(
        reduced,
        reduce_array(input.view(), 2, f32::NAN).into_raw_vec_and_offset().0
    );

    let mut enlarged = vec![0.0f32; 12 * 8];
    enlarge_rows_into(slice, 6, 2, &mut enlarged);
    assert_eq!(enlarged, enlarge_array(input.view(), 2).into_raw_vec_and_offset().0);
}

#[test]
fn test_zoom_plan_rules() {
    let plan = get_zoom_size(100, 40, 3.4, None);
    assert_eq!((plan.pixfac, plan.cols, plan.rows, plan.shrink), (3, 300, 120, false));
    assert_eq!(plan.zoom_factor(), 3.0);

    let plan = get_zoom_size(100, 40, 0.3, None);
    assert_eq!((plan.pixfac, plan.cols, plan.rows, plan.shrink), (3, 34, 14, true));

    // Output size wins over the zoom factor and never enlarges.
    let plan = get_zoom_size(100, 40, 4.0, Some(25));
    assert_eq!((plan.pixfac, plan.cols, plan.rows), (4, 25, 10));
    assert!(get_zoom_size(100, 40, 4.0, Some(80)).is_identity());
    assert!(get_zoom_size(100, 40, 0.0, None).is_identity());
}

#[test]
fn test_exact_resize_nearest() {
    let input = array![[1.0f32, 2.0], [3.0, 4.0]];
    let out = exact_resize(input.view(), 2.0, 4, 4);
    assert_eq!(out.dim(), (4, 4));
    assert_eq!(out.row(0).to_vec(), vec![1.0, 1.0, 2.0, 2.0]);
    assert_eq!(out.row(3).to_vec(), vec![3.0, 3.0, 4.0, 4.0]);
}
