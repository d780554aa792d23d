use std::path::Path;

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::error::{FitscutError, Result};
use crate::image::{BadPixelConfig, Channel, Reference};
use crate::io::fits::{FitsFile, PixelRegion};
use crate::pipeline::config::{Anchor, CutoutSize, RegionConfig};
use crate::quality::{apply_qual, bsoften_params, invert_bsoften, resolve_policy, QualitySource};
use crate::rebin::{enlarge_rows_into, get_zoom_size, reduce_rows_into, ZoomPlan};
use crate::wcs::align::match_footprint;
use crate::wcs::Wcs;

/// Cutout box in a source raster, 0-based. The corner may lie outside the
/// raster; the size is always positive once resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CutoutRegion {
    pub x0: i64,
    pub y0: i64,
    pub ncols: usize,
    pub nrows: usize,
}

/// Part of a cutout that lies inside the source raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overlap {
    /// Source corner of the window.
    pub src_x: usize,
    pub src_y: usize,
    /// Offset of the window inside the cutout.
    pub dst_x: usize,
    pub dst_y: usize,
    pub cols: usize,
    pub rows: usize,
}

impl CutoutRegion {
    /// Resolve size and anchor against a `source_cols × source_rows` raster.
    pub fn resolve(
        config: &RegionConfig,
        source_cols: usize,
        source_rows: usize,
        channel: usize,
    ) -> Result<Self> {
        let (ncols, nrows) = match config.size {
            CutoutSize::Full => (source_cols, source_rows),
            CutoutSize::Pixels { width, height } => {
                if width <= 0 || height <= 0 {
                    return Err(FitscutError::InvalidCutout {
                        channel,
                        reason: format!("size {width}x{height} must be positive"),
                    });
                }
                (width as usize, height as usize)
            }
        };
        if ncols == 0 || nrows == 0 {
            return Err(FitscutError::InvalidDimensions {
                width: ncols,
                height: nrows,
            });
        }

        let centered = |xc: f64, yc: f64| {
            (
                (xc - ncols as f64 / 2.0).round() as i64,
                (yc - nrows as f64 / 2.0).round() as i64,
            )
        };
        // A full-size cutout always covers the whole raster.
        let (x0, y0) = match (config.size, config.anchor) {
            (CutoutSize::Full, Anchor::ImageCenter) => (0, 0),
            (CutoutSize::Full, anchor) => {
                debug!(channel, %anchor, "Ignoring anchor for full-size cutout");
                (0, 0)
            }
            (_, Anchor::ImageCenter) => centered(source_cols as f64 / 2.0, source_rows as f64 / 2.0),
            (_, Anchor::Center { x, y }) => centered(x, y),
            (_, Anchor::Corner { x, y }) => (x, y),
        };

        Ok(Self {
            x0,
            y0,
            ncols,
            nrows,
        })
    }

    /// Window shared with a `source_cols × source_rows` raster, if any.
    pub fn overlap(&self, source_cols: usize, source_rows: usize) -> Option<Overlap> {
        let span = |start: i64, len: usize, limit: usize| {
            let lo = start.max(0);
            let hi = (start + len as i64).min(limit as i64);
            (lo < hi).then(|| (lo as usize, (lo - start) as usize, (hi - lo) as usize))
        };
        let (src_x, dst_x, cols) = span(self.x0, self.ncols, source_cols)?;
        let (src_y, dst_y, rows) = span(self.y0, self.nrows, source_rows)?;
        Some(Overlap {
            src_x,
            src_y,
            dst_x,
            dst_y,
            cols,
            rows,
        })
    }
}

/// How a channel's cutout box is chosen.
#[derive(Clone, Copy, Debug)]
pub enum RegionSource<'a> {
    /// Resolve the configured region against the channel's own raster.
    Config(&'a RegionConfig),
    /// Use an already resolved box.
    Resolved(CutoutRegion),
    /// Follow the reference cutout's sky footprint; the configured region is
    /// used when either transform is missing.
    MatchReference(&'a Reference, &'a RegionConfig),
}

/// Rebin and memory settings shared by every channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractOptions {
    pub zoom: f64,
    pub output_size: Option<usize>,
    pub block_budget_bytes: usize,
}

/// Read, flag and rebin one channel's cutout.
///
/// Source rows are streamed in blocks that are whole multiples of the rebin
/// factor, so the raw cutout is never held in memory at once when shrinking.
/// Parts of the cutout outside the raster stay NaN.
pub fn extract_channel(
    index: usize,
    path: &Path,
    region: RegionSource<'_>,
    bad_pixels: &BadPixelConfig,
    options: &ExtractOptions,
) -> Result<Channel> {
    let fits = FitsFile::open(path)?;
    let hdu = fits.image_hdu()?;
    let (source_cols, source_rows) = (hdu.width(), hdu.height());
    let header = hdu.header.clone();
    let source_wcs = Wcs::from_header(&header);
    if source_wcs.is_none() {
        debug!(channel = index, "No usable WCS in header");
    }

    let region = resolve_region(region, index, source_cols, source_rows, source_wcs.as_ref())?;

    let quality = bad_pixels
        .quality_extension
        .as_ref()
        .and_then(|ext| QualitySource::open(&fits, ext, bad_pixels.quality_bad_value));
    let policy = resolve_policy(bad_pixels, &header, quality.is_some());
    let soften = bsoften_params(&header);
    let bad = bad_pixels.bad_data_value;

    let plan = get_zoom_size(region.ncols, region.nrows, options.zoom, options.output_size);
    info!(
        channel = index,
        x0 = region.x0,
        y0 = region.y0,
        ncols = region.ncols,
        nrows = region.nrows,
        pixfac = plan.pixfac,
        shrink = plan.shrink,
        "Extracting cutout"
    );

    let mut canvas = vec![f32::NAN; plan.cols * plan.rows];
    let mut bad_count = 0usize;
    let overlap = region.overlap(source_cols, source_rows);

    match overlap {
        Some(ov) => {
            let block_rows = block_rows_for(&plan, region.ncols, options.block_budget_bytes);
            debug!(channel = index, block_rows, "Streaming source rows");
            let mut block = Vec::with_capacity(region.ncols * block_rows);

            for r0 in (0..region.nrows).step_by(block_rows) {
                let r1 = (r0 + block_rows).min(region.nrows);
                let lo = r0.max(ov.dst_y);
                let hi = r1.min(ov.dst_y + ov.rows);
                if lo >= hi {
                    continue;
                }

                let read = PixelRegion::new(ov.src_x, ov.src_y + (lo - ov.dst_y), ov.cols, hi - lo);
                let mut window = fits.read_region(hdu, &read)?;
                bad_count += apply_qual(quality.as_ref(), &policy, &read, &mut window)?;
                if let Some((bsoften, boffset)) = soften {
                    invert_bsoften(bsoften, boffset, &mut window, bad);
                }

                block.clear();
                block.resize(region.ncols * (r1 - r0), f32::NAN);
                for (i, row) in window.chunks(ov.cols).enumerate() {
                    let at = (lo - r0 + i) * region.ncols + ov.dst_x;
                    block[at..at + ov.cols].copy_from_slice(row);
                }

                place_block(&block, region.ncols, r0, &plan, bad, &mut canvas);
            }
        }
        None => warn!(channel = index, "Cutout does not overlap the source image"),
    }

    let data = Array2::from_shape_vec((plan.rows, plan.cols), canvas).map_err(|_| {
        FitscutError::InvalidDimensions {
            width: plan.cols,
            height: plan.rows,
        }
    })?;

    if bad_count > 0 {
        debug!(channel = index, bad_count, "Flagged bad pixels");
    }

    let zoom_factor = plan.zoom_factor();
    let wcs = source_wcs.and_then(|w| {
        w.with_update(region.x0 as f64, region.y0 as f64, zoom_factor, plan.cols, plan.rows)
    });

    let mut channel = Channel::new(index, Some(path.to_path_buf()));
    channel.data = Some(data);
    channel.region = region;
    channel.source_dims = (source_cols, source_rows);
    channel.zoom = plan;
    channel.zoom_factor = zoom_factor;
    channel.bad_pixels = bad_pixels.clone();
    channel.policy = policy;
    channel.wcs = wcs;
    channel.header = header;
    channel.bad_count = bad_count;
    channel.overlaps_source = overlap.is_some();
    Ok(channel)
}

fn resolve_region(
    region: RegionSource<'_>,
    index: usize,
    source_cols: usize,
    source_rows: usize,
    source_wcs: Option<&Wcs>,
) -> Result<CutoutRegion> {
    match region {
        RegionSource::Config(config) => CutoutRegion::resolve(config, source_cols, source_rows, index),
        RegionSource::Resolved(region) => Ok(region),
        RegionSource::MatchReference(reference, config) => {
            let matched = match (reference.source_wcs.as_ref(), source_wcs) {
                (Some(ref_wcs), Some(wcs)) if ref_wcs.same_frame(wcs) => Some(reference.region),
                (Some(_), Some(wcs)) => match_footprint(reference, wcs),
                _ => None,
            };
            match matched {
                Some(region) => {
                    debug!(channel = index, ?region, "Matched reference footprint");
                    Ok(region)
                }
                None => {
                    warn!(channel = index, "Cannot match reference footprint, using configured region");
                    CutoutRegion::resolve(config, source_cols, source_rows, index)
                }
            }
        }
    }
}

/// Rows per working block: as many as the budget allows, a multiple of
/// `pixfac` when shrinking, and never fewer than `pixfac`.
fn block_rows_for(plan: &ZoomPlan, ncols: usize, budget_bytes: usize) -> usize {
    let row_bytes = (ncols * std::mem::size_of::<f32>()).max(1);
    let rows = (budget_bytes / row_bytes).max(1);
    if plan.shrink {
        (rows / plan.pixfac).max(1) * plan.pixfac
    } else {
        rows
    }
}

/// Rebin a block of cutout rows starting at cutout row `r0` into the canvas.
fn place_block(block: &[f32], ncols: usize, r0: usize, plan: &ZoomPlan, bad: f32, canvas: &mut [f32]) {
    let rows = block.len() / ncols;
    let p = plan.pixfac;
    if plan.shrink {
        let start = (r0 / p) * plan.cols;
        let len = rows.div_ceil(p) * plan.cols;
        reduce_rows_into(block, ncols, p, bad, &mut canvas[start..start + len]);
    } else if p > 1 {
        let start = r0 * p * plan.cols;
        let len = rows * p * plan.cols;
        enlarge_rows_into(block, ncols, p, &mut canvas[start..start + len]);
    } else {
        let start = r0 * ncols;
        canvas[start..start + block.len()].copy_from_slice(block);
    }
}
