use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use tracing::debug;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::image::{is_good, Channel, Reference};

/// Integral rebin plan for one cutout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoomPlan {
    pub pixfac: usize,
    /// Dimensions after rebinning.
    pub cols: usize,
    pub rows: usize,
    /// Block-average by `pixfac` (true) or replicate by `pixfac` (false).
    pub shrink: bool,
}

impl ZoomPlan {
    pub fn identity(cols: usize, rows: usize) -> Self {
        Self {
            pixfac: 1,
            cols,
            rows,
            shrink: false,
        }
    }

    fn shrinking(cols: usize, rows: usize, pixfac: usize) -> Self {
        Self {
            pixfac,
            cols: cols.div_ceil(pixfac),
            rows: rows.div_ceil(pixfac),
            shrink: true,
        }
    }

    fn enlarging(cols: usize, rows: usize, pixfac: usize) -> Self {
        Self {
            pixfac,
            cols: cols * pixfac,
            rows: rows * pixfac,
            shrink: false,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.pixfac <= 1
    }

    /// Net geometric zoom: `pixfac` when enlarging, `1/pixfac` when shrinking.
    pub fn zoom_factor(&self) -> f64 {
        if self.shrink {
            1.0 / self.pixfac as f64
        } else {
            self.pixfac as f64
        }
    }
}

/// Choose the integral rebin for a `ncols × nrows` cutout.
///
/// An output size only ever shrinks (by `floor(max / size)` when that
/// exceeds 1); reaching the exact size is left to [`exact_resize`].
pub fn get_zoom_size(ncols: usize, nrows: usize, zoom: f64, output_size: Option<usize>) -> ZoomPlan {
    if let Some(size) = output_size.filter(|&s| s > 0) {
        let pixfac = ncols.max(nrows) / size;
        return if pixfac > 1 {
            ZoomPlan::shrinking(ncols, nrows, pixfac)
        } else {
            ZoomPlan::identity(ncols, nrows)
        };
    }

    if zoom > 1.0 {
        let pixfac = zoom.round() as usize;
        if pixfac > 1 {
            return ZoomPlan::enlarging(ncols, nrows, pixfac);
        }
    } else if zoom > 0.0 && zoom < 1.0 {
        let pixfac = (1.0 / zoom).round() as usize;
        if pixfac > 1 {
            return ZoomPlan::shrinking(ncols, nrows, pixfac);
        }
    }
    ZoomPlan::identity(ncols, nrows)
}

/// Average the good pixels of every `pixfac × pixfac` block.
///
/// Partial edge blocks are included; blocks without a good pixel are NaN.
pub fn reduce_array(input: ArrayView2<f32>, pixfac: usize, bad_value: f32) -> Array2<f32> {
    let (rows, cols) = input.dim();
    let pixfac = pixfac.max(1);
    let out_rows = rows.div_ceil(pixfac);
    let out_cols = cols.div_ceil(pixfac);

    let reduce_row = |orow: usize, out: &mut [f32]| {
        let r0 = orow * pixfac;
        let r1 = (r0 + pixfac).min(rows);
        for (ocol, cell) in out.iter_mut().enumerate() {
            let c0 = ocol * pixfac;
            let c1 = (c0 + pixfac).min(cols);
            let mut sum = 0.0f64;
            let mut n = 0usize;
            for r in r0..r1 {
                for c in c0..c1 {
                    let v = input[[r, c]];
                    if is_good(v, bad_value) {
                        sum += v as f64;
                        n += 1;
                    }
                }
            }
            *cell = if n > 0 { (sum / n as f64) as f32 } else { f32::NAN };
        }
    };

    let mut result = Array2::<f32>::from_elem((out_rows, out_cols), f32::NAN);
    if out_cols == 0 {
        return result;
    }
    if let Some(slice) = result.as_slice_mut() {
        if rows * cols >= PARALLEL_PIXEL_THRESHOLD {
            slice
                .par_chunks_mut(out_cols)
                .enumerate()
                .for_each(|(orow, out)| reduce_row(orow, out));
        } else {
            slice
                .chunks_mut(out_cols)
                .enumerate()
                .for_each(|(orow, out)| reduce_row(orow, out));
        }
    }
    result
}

/// Reduce a row block of width `cols` into `out` (`ceil(rows/pixfac)` rows
/// of `ceil(cols/pixfac)` values).
pub fn reduce_rows_into(block: &[f32], cols: usize, pixfac: usize, bad_value: f32, out: &mut [f32]) {
    if cols == 0 {
        return;
    }
    let rows = block.len() / cols;
    let view = ArrayView2::from_shape((rows, cols), &block[..rows * cols]);
    if let Ok(view) = view {
        let reduced = reduce_array(view, pixfac, bad_value);
        for (dst, src) in out.iter_mut().zip(reduced.iter()) {
            *dst = *src;
        }
    }
}

/// Replicate every pixel into a `pixfac × pixfac` block.
pub fn enlarge_array(input: ArrayView2<f32>, pixfac: usize) -> Array2<f32> {
    let (rows, cols) = input.dim();
    let pixfac = pixfac.max(1);
    Array2::from_shape_fn((rows * pixfac, cols * pixfac), |(r, c)| {
        input[[r / pixfac, c / pixfac]]
    })
}

/// Enlarge a row block of width `cols` into `out` (`rows*pixfac` rows of
/// `cols*pixfac` values).
pub fn enlarge_rows_into(block: &[f32], cols: usize, pixfac: usize, out: &mut [f32]) {
    if cols == 0 {
        return;
    }
    let out_cols = cols * pixfac;
    for (orow, out_row) in out.chunks_mut(out_cols).enumerate() {
        let src = &block[(orow / pixfac) * cols..][..cols];
        for (ocol, cell) in out_row.iter_mut().enumerate() {
            *cell = src[ocol / pixfac];
        }
    }
}

/// Nearest-index resample of `input` to `cols × rows` at geometric `zoom`.
pub fn exact_resize(input: ArrayView2<f32>, zoom: f64, cols: usize, rows: usize) -> Array2<f32> {
    let (in_rows, in_cols) = input.dim();
    if in_rows == 0 || in_cols == 0 || zoom <= 0.0 {
        return Array2::from_elem((rows, cols), f32::NAN);
    }
    let source_index = |coord: usize, len: usize| {
        let idx = ((coord as f64 + 0.5) / zoom - 0.5).round();
        idx.clamp(0.0, (len - 1) as f64) as usize
    };
    let xs: Vec<usize> = (0..cols).map(|x| source_index(x, in_cols)).collect();
    let ys: Vec<usize> = (0..rows).map(|y| source_index(y, in_rows)).collect();
    Array2::from_shape_fn((rows, cols), |(y, x)| input[[ys[y], xs[x]]])
}

/// Zoom and dimensions that make `max(cols, rows) == output_size`.
pub fn exact_size_for(ncols: usize, nrows: usize, output_size: usize) -> (f64, usize, usize) {
    let longest = ncols.max(nrows);
    if longest == 0 || output_size == 0 {
        return (1.0, ncols, nrows);
    }
    let zoom = output_size as f64 / longest as f64;
    let scaled = |dim: usize| {
        if dim == longest {
            output_size
        } else {
            ((dim as f64 * zoom).round() as usize).clamp(1, output_size)
        }
    };
    (zoom, scaled(ncols), scaled(nrows))
}

/// Resample a channel so its longest side is exactly `output_size`.
///
/// The transform and zoom factor follow the resample. Channels without data
/// or already at that size are left alone.
pub fn exact_resize_image_channel(channel: &mut Channel, output_size: usize) {
    let Some(data) = channel.data.as_ref() else {
        return;
    };
    let (ncols, nrows) = (data.ncols(), data.nrows());
    let (zoom, cols, rows) = exact_size_for(ncols, nrows, output_size);
    if cols == ncols && rows == nrows {
        return;
    }
    debug!(channel = channel.index, zoom, cols, rows, "Exact resize");
    channel.data = Some(exact_resize(data.view(), zoom, cols, rows));
    channel.wcs = channel.wcs.as_ref().and_then(|w| w.with_update(0.0, 0.0, zoom, cols, rows));
    channel.zoom_factor *= zoom;
}

/// Apply the same exact resize to the reference frame.
pub fn exact_resize_reference(reference: &mut Reference, output_size: usize) {
    let (zoom, cols, rows) = exact_size_for(reference.ncols, reference.nrows, output_size);
    if cols == reference.ncols && rows == reference.nrows {
        return;
    }
    reference.wcs = reference.wcs.as_ref().and_then(|w| w.with_update(0.0, 0.0, zoom, cols, rows));
    reference.ncols = cols;
    reference.nrows = rows;
    reference.zoom *= zoom;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_plan_from_output_size() {
        let plan = get_zoom_size(1000, 500, 0.0, Some(300));
        assert_eq!(plan.pixfac, 3);
        assert!(plan.shrink);
        assert_eq!((plan.cols, plan.rows), (334, 167));

        let plan = get_zoom_size(100, 100, 0.0, Some(300));
        assert!(plan.is_identity());
    }

    #[test]
    fn test_zoom_plan_from_factor() {
        assert_eq!(get_zoom_size(10, 10, 2.6, None).pixfac, 3);
        let plan = get_zoom_size(10, 7, 0.25, None);
        assert_eq!((plan.pixfac, plan.cols, plan.rows), (4, 3, 2));
        assert_eq!(plan.zoom_factor(), 0.25);
        assert!(get_zoom_size(10, 10, 1.0, None).is_identity());
    }

    #[test]
    fn test_exact_size_for() {
        let (zoom, cols, rows) = exact_size_for(200, 100, 50);
        assert_eq!(zoom, 0.25);
        assert_eq!((cols, rows), (50, 25));
    }

    #[test]
    fn test_exact_resize_channel_updates_zoom() {
        let mut channel = Channel::new(0, None);
        channel.data = Some(Array2::from_elem((20, 40), 3.0));
        exact_resize_image_channel(&mut channel, 10);
        assert_eq!((channel.ncols(), channel.nrows()), (10, 5));
        assert_eq!(channel.zoom_factor, 0.25);
        assert!(channel.good_values().all(|v| v == 3.0));

        exact_resize_image_channel(&mut channel, 10);
        assert_eq!(channel.zoom_factor, 0.25);
    }
}
