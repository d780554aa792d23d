use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{FitscutError, Result};
use crate::extract::CutoutRegion;
use crate::image::{Channel, CutoutImage, Reference};
use crate::wcs::Wcs;

/// Both transforms present and identical.
pub fn wcs_equal(a: Option<&Wcs>, b: Option<&Wcs>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.same_frame(b))
}

/// Source-frame box of `channel_wcs` covering the reference cutout.
///
/// The outer edges of the reference cutout are carried through sky
/// coordinates into the channel's pixel frame; the enclosing integer box is
/// returned. `None` when the reference has no transform or a corner cannot
/// be projected.
pub fn match_footprint(reference: &Reference, channel_wcs: &Wcs) -> Option<CutoutRegion> {
    let ref_wcs = reference.source_wcs.as_ref()?;
    let r = &reference.region;
    let x_lo = r.x0 as f64 + 0.5;
    let x_hi = r.x0 as f64 + r.ncols as f64 + 0.5;
    let y_lo = r.y0 as f64 + 0.5;
    let y_hi = r.y0 as f64 + r.nrows as f64 + 0.5;

    let mut bounds = Bounds::new();
    for (x, y) in [(x_lo, y_lo), (x_lo, y_hi), (x_hi, y_lo), (x_hi, y_hi)] {
        let (lon, lat) = ref_wcs.pixel_to_world(x, y)?;
        let (cx, cy) = channel_wcs.world_to_pixel(lon, lat)?;
        bounds.add(cx, cy);
    }

    // 1-based pixel edges to 0-based pixel indices.
    const SNAP: f64 = 1e-6;
    let x0 = (bounds.xmin - 0.5 + SNAP).floor() as i64;
    let x1 = (bounds.xmax - 0.5 - SNAP).ceil() as i64;
    let y0 = (bounds.ymin - 0.5 + SNAP).floor() as i64;
    let y1 = (bounds.ymax - 0.5 - SNAP).ceil() as i64;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(CutoutRegion {
        x0,
        y0,
        ncols: (x1 - x0) as usize,
        nrows: (y1 - y0) as usize,
    })
}

struct Bounds {
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
}

impl Bounds {
    fn new() -> Self {
        Self {
            xmin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymin: f64::INFINITY,
            ymax: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, x: f64, y: f64) {
        self.xmin = self.xmin.min(x);
        self.xmax = self.xmax.max(x);
        self.ymin = self.ymin.min(y);
        self.ymax = self.ymax.max(y);
    }
}

/// Resample `channel` onto the reference grid by nearest-pixel pull mapping.
///
/// Returns `false` without touching the buffer when the transforms are
/// equal or the channel has no data.
pub fn wcs_remap_channel(channel: &mut Channel, reference: &Reference) -> Result<bool> {
    let (Some(ref_wcs), Some(in_wcs)) = (reference.wcs.as_ref(), channel.wcs.as_ref()) else {
        return Err(FitscutError::Alignment(format!(
            "channel {} or the reference has no WCS",
            channel.index
        )));
    };
    if ref_wcs.same_frame(in_wcs) {
        debug!(channel = channel.index, "WCS identical to reference, no remap");
        return Ok(false);
    }
    let Some(input) = channel.data.as_ref() else {
        return Ok(false);
    };

    let (in_rows, in_cols) = input.dim();
    let (out_cols, out_rows) = (reference.ncols, reference.nrows);

    // Reference-grid box touched by the channel's corner pixels.
    let mut bounds = Bounds::new();
    let mut all_projected = true;
    for (x, y) in [
        (1.0, 1.0),
        (1.0, in_rows as f64),
        (in_cols as f64, 1.0),
        (in_cols as f64, in_rows as f64),
    ] {
        let projected = in_wcs
            .pixel_to_world(x, y)
            .and_then(|(lon, lat)| ref_wcs.world_to_pixel(lon, lat));
        match projected {
            Some((rx, ry)) => bounds.add(rx, ry),
            None => all_projected = false,
        }
    }
    let clamp = |v: f64, hi: usize| (v + 0.5).floor().clamp(1.0, hi.max(1) as f64) as usize;
    let (j1, j2, i1, i2) = if all_projected {
        (
            clamp(bounds.xmin, out_cols),
            clamp(bounds.xmax, out_cols),
            clamp(bounds.ymin, out_rows),
            clamp(bounds.ymax, out_rows),
        )
    } else {
        (1, out_cols, 1, out_rows)
    };
    debug!(channel = channel.index, j1, j2, i1, i2, "Remap window on reference grid");

    let remap_row = |iout: usize, out: &mut [f32]| {
        if iout < i1 || iout > i2 {
            return;
        }
        for jout in j1..=j2 {
            let Some((xin, yin)) = ref_wcs
                .pixel_to_world(jout as f64, iout as f64)
                .and_then(|(lon, lat)| in_wcs.world_to_pixel(lon, lat))
            else {
                continue;
            };
            let jin = (xin + 0.5).floor() as i64 - 1;
            let iin = (yin + 0.5).floor() as i64 - 1;
            if jin >= 0 && iin >= 0 && (jin as usize) < in_cols && (iin as usize) < in_rows {
                out[jout - 1] = input[[iin as usize, jin as usize]];
            }
        }
    };

    let mut canvas = vec![f32::NAN; out_cols * out_rows];
    if out_cols > 0 {
        if out_cols * out_rows >= PARALLEL_PIXEL_THRESHOLD {
            canvas
                .par_chunks_mut(out_cols)
                .enumerate()
                .for_each(|(row, out)| remap_row(row + 1, out));
        } else {
            canvas
                .chunks_mut(out_cols)
                .enumerate()
                .for_each(|(row, out)| remap_row(row + 1, out));
        }
    }

    let remapped = Array2::from_shape_vec((out_rows, out_cols), canvas).map_err(|_| {
        FitscutError::InvalidDimensions {
            width: out_cols,
            height: out_rows,
        }
    })?;
    channel.data = Some(remapped);
    Ok(true)
}

/// Bring every channel onto the reference grid.
///
/// Afterwards each channel carries the reference transform, zoom and
/// corner. Returns the number of channels that were resampled.
pub fn align_to_reference(image: &mut CutoutImage) -> Result<usize> {
    let reference = &image.reference;
    let mut remapped = 0;

    for channel in image.channels.iter_mut() {
        if channel.data.is_none() {
            continue;
        }
        let same_size = channel.ncols() == reference.ncols && channel.nrows() == reference.nrows;
        if channel.index != reference.channel {
            if channel.wcs.is_none() || reference.wcs.is_none() {
                if !same_size {
                    return Err(FitscutError::Alignment(format!(
                        "channel {} is {}x{} without a WCS, reference is {}x{}",
                        channel.index,
                        channel.ncols(),
                        channel.nrows(),
                        reference.ncols,
                        reference.nrows
                    )));
                }
                warn!(channel = channel.index, "No WCS, assuming channel is already aligned");
            } else if wcs_remap_channel(channel, reference)? {
                remapped += 1;
            } else if !same_size {
                return Err(FitscutError::Alignment(format!(
                    "channel {} has the reference WCS but a different size",
                    channel.index
                )));
            }
        }

        channel.wcs = reference.wcs.clone();
        channel.zoom_factor = reference.zoom;
        channel.region = reference.region;
    }

    info!(remapped, "Aligned channels to reference");
    Ok(remapped)
}
