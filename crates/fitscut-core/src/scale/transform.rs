use tracing::{debug, info, warn};

use crate::consts::{
    ASINH_CEILING_ONE, ASINH_CEILING_THREE, ASINH_CEILING_TWO, ASINH_NONLINEARITY, NBINS,
};
use crate::error::{FitscutError, Result};
use crate::histogram::{compute_histogram, eq_histogram};
use crate::image::{is_good, CutoutImage};
use crate::scale::autoscale::autoscale_image;
use crate::scale::{pixel_values, ScaleMode};

/// Replace every good pixel by its equalization level (0–255).
pub fn histeq_image(image: &mut CutoutImage) {
    for channel in image.channels.iter_mut() {
        let Some(data) = channel.data.as_mut() else {
            continue;
        };
        let bad = channel.bad_pixels.bad_data_value;
        let dmin = channel.stats.data_min;
        let dmax = channel.stats.data_max;
        info!(channel = channel.index, "Scaling channel (histeq)");

        let hist = compute_histogram(&pixel_values(data), NBINS, dmin, dmax, bad);
        let lut = eq_histogram(&hist);
        let binsize = (dmax - dmin) / (NBINS - 1) as f64;

        data.mapv_inplace(|v| {
            if !is_good(v, bad) {
                return v;
            }
            let index = if binsize > 0.0 {
                ((v as f64 - dmin) / binsize).ceil().clamp(0.0, NBINS as f64) as usize
            } else {
                0
            };
            lut[index] as f32
        });

        channel.stats.data_min = 0.0;
        channel.stats.data_max = 255.0;
    }
}

/// `log10(v - min + 1)` on good pixels; data and user ranges follow.
pub fn log_image(image: &mut CutoutImage) {
    let (user_min_set, user_max_set) = (image.user_min_set, image.user_max_set);
    for channel in image.channels.iter_mut() {
        let Some(data) = channel.data.as_mut() else {
            continue;
        };
        let bad = channel.bad_pixels.bad_data_value;
        let stats = &mut channel.stats;
        let (minval, maxval) = (stats.data_min, stats.data_max);
        let user_max = if user_max_set { stats.user_max } else { maxval };
        let user_min = if user_min_set { stats.user_min } else { minval };
        info!(channel = channel.index, min = minval, max = maxval, "Scaling channel (log)");

        let shift = 1.0 - minval;
        data.mapv_inplace(|v| {
            if is_good(v, bad) {
                (v as f64 + shift).log10() as f32
            } else {
                v
            }
        });

        stats.data_max = (maxval + shift).log10();
        stats.data_min = 0.0;
        stats.user_max = (user_max + shift).log10();
        stats.user_min = (user_min + shift).log10();
    }
}

/// `sqrt(max(0, v - user_min))` on good pixels; ranges start at 0 afterwards.
pub fn sqrt_image(image: &mut CutoutImage) {
    let (user_min_set, user_max_set) = (image.user_min_set, image.user_max_set);
    for channel in image.channels.iter_mut() {
        let Some(data) = channel.data.as_mut() else {
            continue;
        };
        let bad = channel.bad_pixels.bad_data_value;
        let stats = &mut channel.stats;
        let (minval, maxval) = (stats.data_min, stats.data_max);
        let user_max = if user_max_set { stats.user_max } else { maxval };
        let user_min = if user_min_set { stats.user_min } else { minval };
        info!(channel = channel.index, min = minval, max = maxval, "Scaling channel (sqrt)");

        data.mapv_inplace(|v| {
            if is_good(v, bad) {
                (v as f64 - user_min).max(0.0).sqrt() as f32
            } else {
                v
            }
        });

        stats.data_max = (maxval - user_min).max(0.0).sqrt();
        stats.data_min = 0.0;
        stats.user_max = (user_max - user_min).max(0.0).sqrt();
        stats.user_min = 0.0;
    }
}

/// Joint asinh stretch of all present channels.
///
/// Each pixel is normalised per channel to its display range; the sum over
/// channels sets a common weight `asinh(k*sum) / (k*sum)`, reduced further
/// when the brightest channel would exceed 1. Pixels blank in every channel
/// become NaN, pixels blank in some channels become 0 there.
pub fn asinh_image(image: &mut CutoutImage, mode: ScaleMode) -> Result<()> {
    if !image.autoscale_performed && !(image.user_min_set && image.user_max_set) {
        let mode = if mode == ScaleMode::Full {
            ScaleMode::Full
        } else {
            ScaleMode::Auto
        };
        autoscale_image(image, mode)?;
    }
    info!("Scaling image (asinh)");

    let (user_min_set, user_max_set) = (image.user_min_set, image.user_max_set);
    let mut dims = None;
    let mut params = Vec::new();
    for channel in image.channels.iter().filter(|c| c.data.is_some()) {
        let dim = (channel.nrows(), channel.ncols());
        if *dims.get_or_insert(dim) != dim {
            return Err(FitscutError::Alignment(
                "asinh composition needs channels of equal size".into(),
            ));
        }
        let s = &channel.stats;
        let lo = if user_min_set { s.user_min } else { s.autoscale_min };
        let hi = if user_max_set { s.user_max } else { s.autoscale_max };
        let span = if hi != lo { hi - lo } else { 1.0 };
        params.push((lo, span, channel.bad_pixels.bad_data_value));
    }

    // Composition walks every band in the same row-major pixel order.
    for data in image.channels.iter_mut().filter_map(|c| c.data.as_mut()) {
        if !data.is_standard_layout() {
            *data = data.as_standard_layout().into_owned();
        }
    }
    let mut buffers: Vec<&mut [f32]> = image
        .channels
        .iter_mut()
        .filter_map(|c| c.data.as_mut())
        .map(|d| d.as_slice_mut())
        .collect::<Option<_>>()
        .ok_or_else(|| FitscutError::Alignment("channel buffer is not contiguous".into()))?;
    let chancount_total = buffers.len();
    let npix = buffers.first().map_or(0, |b| b.len());

    let mut vals = vec![0.0f64; chancount_total];
    let mut blank = 0usize;
    for i in 0..npix {
        let mut sum = 0.0f64;
        let mut maxval = 0.0f64;
        let mut present = 0usize;
        for (k, buf) in buffers.iter().enumerate() {
            let (lo, span, bad) = params[k];
            let v = buf[i];
            if is_good(v, bad) {
                let t = (v as f64 - lo) / span;
                sum += t;
                maxval = maxval.max(t);
                vals[k] = t;
                present += 1;
            } else {
                vals[k] = 0.0;
            }
        }

        let mut weight = if present == 0 {
            blank += 1;
            f64::NAN
        } else if sum != 0.0 {
            (sum * ASINH_NONLINEARITY).asinh() / (ASINH_NONLINEARITY * sum)
        } else {
            1.0
        };
        let scaled = maxval * weight;
        if scaled > 1.0 {
            weight /= scaled;
        }
        for (k, buf) in buffers.iter_mut().enumerate() {
            buf[i] = (vals[k] * weight) as f32;
        }
    }
    debug!(blank, "Blank pixels in asinh composition");

    let ceiling = asinh_ceiling(chancount_total);
    for channel in image.channels.iter_mut().filter(|c| c.data.is_some()) {
        let s = &mut channel.stats;
        s.data_min = 0.0;
        s.data_max = ceiling;
        s.user_min = 0.0;
        s.user_max = ceiling;
        s.autoscale_min = 0.0;
        s.autoscale_max = ceiling;
    }
    Ok(())
}

/// Display ceiling after asinh composition of `channels` bands.
pub fn asinh_ceiling(channels: usize) -> f64 {
    match channels {
        0 | 1 => ASINH_CEILING_ONE,
        2 => ASINH_CEILING_TWO,
        _ => ASINH_CEILING_THREE,
    }
}

/// Multiply good pixels by each channel's scale factor, then give every
/// channel the outermost data and user ranges.
pub fn mult_image(image: &mut CutoutImage) {
    let (user_min_set, user_max_set) = (image.user_min_set, image.user_max_set);
    let mut max_max = f64::NEG_INFINITY;
    let mut min_min = f64::INFINITY;
    let mut max_usermax = f64::NEG_INFINITY;
    let mut min_usermin = f64::INFINITY;

    for channel in image.channels.iter_mut() {
        let Some(data) = channel.data.as_mut() else {
            continue;
        };
        let bad = channel.bad_pixels.bad_data_value;
        let stats = &mut channel.stats;
        let factor = stats.scale_factor;
        let (minval, maxval) = (stats.data_min, stats.data_max);
        let user_max = if user_max_set { stats.user_max } else { maxval };
        let user_min = if user_min_set { stats.user_min } else { minval };
        info!(channel = channel.index, factor, min = minval, max = maxval, "Scaling channel by factor");

        let f = factor as f32;
        data.mapv_inplace(|v| if is_good(v, bad) { v * f } else { v });

        stats.data_max = maxval * factor;
        stats.data_min = minval * factor;
        stats.user_max = user_max * factor;
        stats.user_min = user_min * factor;

        max_max = max_max.max(stats.data_max);
        min_min = min_min.min(stats.data_min);
        max_usermax = max_usermax.max(stats.user_max);
        min_usermin = min_usermin.min(stats.user_min);
    }

    debug!(min = min_min, max = max_max, "Shared data range after factor");
    for channel in image.channels.iter_mut().filter(|c| c.data.is_some()) {
        channel.stats.data_max = max_max;
        channel.stats.data_min = min_min;
        channel.stats.user_max = max_usermax;
        channel.stats.user_min = min_usermin;
    }
}

/// Convert counts to rates with `1 / EXPTIME` per channel.
pub fn rate_image(image: &mut CutoutImage) {
    for channel in image.channels.iter_mut().filter(|c| c.data.is_some()) {
        channel.stats.scale_factor = match channel.header.get_f64("EXPTIME") {
            Some(exptime) if exptime > 0.0 => {
                debug!(channel = channel.index, exptime, "Using EXPTIME");
                1.0 / exptime
            }
            _ => {
                warn!(channel = channel.index, "EXPTIME not found, using 1.0");
                1.0
            }
        };
    }
    mult_image(image);
}
