use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::{
    AUTOSCALE_REFINE_BINS, MAX_AUTOSCALE_ITERATIONS, MIN_SAMPLE_ROWS, MIN_TAIL_PIXELS, NBINS,
    NOISE_FLOOR_FACTOR, NSAMPLE,
};
use crate::error::Result;
use crate::histogram::compute_histogram;
use crate::image::{is_good, Channel, ChannelStats, CutoutImage};
use crate::io::fits::{FitsFile, PixelRegion};
use crate::quality::{apply_qual, bsoften_params, invert_bsoften, BadPixelPolicy, QualitySource};
use crate::scale::{pixel_values, ScaleMode};

/// Good-pixel min and max, `(0, 0)` when there are none.
pub fn good_min_max(values: impl IntoIterator<Item = f32>, bad_value: f32) -> (f64, f64) {
    let (min, max) = values
        .into_iter()
        .filter(|&v| is_good(v, bad_value))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min > max {
        (0.0, 0.0)
    } else {
        (min as f64, max as f64)
    }
}

/// Record each present channel's good-pixel range as its data range.
pub fn scan_min_max(image: &mut CutoutImage) {
    for channel in image.channels.iter_mut() {
        let Some(data) = channel.data.as_ref() else {
            continue;
        };
        let (min, max) = good_min_max(data.iter().copied(), channel.bad_pixels.bad_data_value);
        channel.stats.data_min = min;
        channel.stats.data_max = max;
        debug!(channel = channel.index, min, max, "Scanned channel range");
    }
}

/// Percentile display range of `values` over the channel's data range.
///
/// When the percentiles fall within a few bins of each other while the
/// in-range values still spread, the data range is narrowed to them and the
/// histogram rebuilt, at most `MAX_AUTOSCALE_ITERATIONS` times. The result
/// satisfies `data_min <= autoscale_min <= autoscale_max <= data_max`.
///
/// A noise-like histogram raises the max to `median + 5 * (median - min)`,
/// but the final clamp to `data_max` wins: on data that is noise up to its
/// maximum, the raised max is cut back to the data range.
pub fn autoscale_range_set(stats: &mut ChannelStats, values: &[f32], bad_value: f32) {
    refine_range_set(stats, values, bad_value, MAX_AUTOSCALE_ITERATIONS);
}

fn refine_range_set(stats: &mut ChannelStats, values: &[f32], bad_value: f32, max_iterations: usize) {
    let nbins = NBINS as i64;

    for iteration in 0..max_iterations {
        let amin = stats.data_min;
        let amax = stats.data_max;
        let hist = compute_histogram(values, NBINS, amin, amax, bad_value);
        if hist.pixcount == 0 {
            stats.autoscale_min = amin;
            stats.autoscale_max = amax;
            stats.median = None;
            return;
        }

        let bin = |i: i64| hist.bins.get(i as usize).copied().unwrap_or(0);
        let pixcount = hist.pixcount as f64;

        let cutoff_high = (pixcount * (100.0 - stats.autoscale_percent_high) / 100.0) as u64;
        let mut count = 0u64;
        let mut hh = nbins;
        while hh >= 0 {
            count += bin(hh);
            if count > cutoff_high {
                break;
            }
            hh -= 1;
        }

        let cutoff_low = (pixcount * stats.autoscale_percent_low / 100.0) as u64;
        count = 0;
        let mut ll = 0i64;
        while ll <= nbins {
            count += bin(ll);
            if count > cutoff_low {
                break;
            }
            ll += 1;
        }

        let mm = if hh == ll {
            ll
        } else {
            let cutoff_median = (pixcount * 0.5) as u64;
            let mut mm = ll;
            while count <= cutoff_median {
                mm += 1;
                if mm > nbins {
                    break;
                }
                count += bin(mm);
            }
            mm
        };

        let width = (amax - amin) / (nbins - 1) as f64;
        let mut lo = if ll == nbins {
            amax
        } else {
            width * (ll - 1) as f64 + amin
        };
        let mut hi = if hh == nbins - 1 {
            amax
        } else {
            width * hh as f64 + amin
        };
        let median = width * (mm as f64 - 0.5) + amin;

        if ll + AUTOSCALE_REFINE_BINS >= hh && hist.in_min != hist.in_max {
            let new_min = hist.in_min.max(lo);
            let new_max = hist.in_max.min(hi);
            let progress = new_min < new_max && (new_min != amin || new_max != amax);
            if progress && iteration + 1 < max_iterations {
                info!(min = new_min, max = new_max, "Possible bad data, refining autoscale range");
                stats.data_min = new_min;
                stats.data_max = new_max;
                continue;
            }
            if progress {
                warn!("Autoscale refinement limit reached");
            }
        }

        if median + NOISE_FLOOR_FACTOR * (median - lo) > hi {
            debug!(lo, hi, ll, hh, "Noise-dominated histogram, raising autoscale max");
            hi = median + NOISE_FLOOR_FACTOR * (median - lo);
        }

        lo = lo.max(stats.data_min).min(stats.data_max);
        hi = hi.min(stats.data_max).max(lo);
        stats.autoscale_min = lo;
        stats.autoscale_max = hi;
        stats.median = Some(median);
        debug!(min = lo, max = hi, ll, hh, "Autoscale range");
        return;
    }
}

/// Autoscale over the channel's cutout pixels.
pub fn autoscale_channel(channel: &mut Channel) {
    let Channel {
        index,
        data,
        stats,
        bad_pixels,
        ..
    } = channel;
    let Some(data) = data.as_ref() else {
        return;
    };
    info!(
        channel = *index,
        low = stats.autoscale_percent_low,
        high = stats.autoscale_percent_high,
        "Autoscaling channel by histogram"
    );
    autoscale_range_set(stats, &pixel_values(data), bad_pixels.bad_data_value);
}

/// Rows read by full-image autoscale as `(rows_used, ydelta)`.
///
/// About `NSAMPLE` pixels are sampled, more when the narrower percentile
/// tail would otherwise hold fewer than `MIN_TAIL_PIXELS` of them.
pub fn full_sample_rows(cols: usize, rows: usize, percent_low: f64, percent_high: f64) -> (usize, usize) {
    let minfrac = (1.0 - percent_high / 100.0).min(percent_low / 100.0);
    let mut nsample = NSAMPLE;
    if minfrac > 0.0 && minfrac * (nsample as f64) < MIN_TAIL_PIXELS {
        nsample = (MIN_TAIL_PIXELS / minfrac + 0.5) as usize;
        debug!(nsample, "Increasing sample size");
    }

    let rows_used = (nsample / cols.max(1)).max(MIN_SAMPLE_ROWS).min(rows);
    let ydelta = (rows / (rows_used + 1)).max(1);
    (rows_used, ydelta)
}

/// Autoscale over evenly spaced rows of the whole source image, so every
/// cutout of one image gets the same range.
pub fn autoscale_full_channel(channel: &mut Channel) -> Result<()> {
    let Some(path) = channel.input.as_ref() else {
        return Ok(());
    };
    let fits = FitsFile::open(path)?;
    let hdu = fits.image_hdu()?;
    let (cols, rows) = (hdu.width(), hdu.height());
    let stats = &mut channel.stats;

    let (rows_used, ydelta) = full_sample_rows(
        cols,
        rows,
        stats.autoscale_percent_low,
        stats.autoscale_percent_high,
    );
    let region = PixelRegion::new(0, ydelta - 1, cols, rows_used).with_row_step(ydelta);
    info!(
        channel = channel.index,
        rows_used,
        ydelta,
        "Sampling full image for autoscale"
    );

    let mut sample = fits.read_region(hdu, &region)?;
    let quality = match &channel.policy {
        BadPixelPolicy::QualityMask {
            extension,
            bad_value,
        } => QualitySource::open(&fits, extension, *bad_value),
        _ => None,
    };
    let bad = channel.bad_pixels.bad_data_value;
    let nbad = apply_qual(quality.as_ref(), &channel.policy, &region, &mut sample)?;
    if nbad > 0 {
        debug!(channel = channel.index, nbad, "Flagged bad pixels in sample");
    }
    if let Some((bsoften, boffset)) = bsoften_params(&hdu.header) {
        invert_bsoften(bsoften, boffset, &mut sample, bad);
    }

    let (min, max) = good_min_max(sample.iter().copied(), bad);
    debug!(channel = channel.index, min, max, "Whole image range");
    stats.data_min = min;
    stats.data_max = max;
    autoscale_range_set(stats, &sample, bad);
    Ok(())
}

/// Autoscale every present channel once per image. `Full` samples the
/// source files; any other mode uses the cutout pixels.
pub fn autoscale_image(image: &mut CutoutImage, mode: ScaleMode) -> Result<()> {
    if image.autoscale_performed {
        return Ok(());
    }
    image
        .channels
        .par_iter_mut()
        .filter(|c| c.data.is_some())
        .try_for_each(|channel| match mode {
            ScaleMode::Full => autoscale_full_channel(channel),
            _ => {
                autoscale_channel(channel);
                Ok(())
            }
        })?;
    image.autoscale_performed = true;
    Ok(())
}
