use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{FitscutError, Result};
use crate::extract::{extract_channel, CutoutRegion, ExtractOptions, RegionSource};
use crate::image::{Channel, CutoutImage, Reference};
use crate::io::fits::FitsFile;
use crate::rebin::{exact_resize_image_channel, exact_resize_reference, get_zoom_size};
use crate::scale::{scale_scanned_image, scan_min_max};
use crate::wcs::align::align_to_reference;
use crate::wcs::Wcs;

use super::config::{AlignMode, CutoutConfig};
use super::types::{NoOpReporter, PipelineStage, ProgressReporter};

/// Resolve the reference channel's cutout and the frame aligned channels
/// are brought onto.
pub fn establish_reference(config: &CutoutConfig) -> Result<Reference> {
    let k = config.alignment.reference_channel;
    let path = config
        .channels
        .get(k)
        .and_then(|c| c.input.as_ref())
        .ok_or_else(|| FitscutError::InvalidConfig(format!("reference channel {k} has no input")))?;

    let fits = FitsFile::open(path)?;
    let hdu = fits.image_hdu()?;
    let (source_cols, source_rows) = (hdu.width(), hdu.height());
    let region = CutoutRegion::resolve(config.region_for(k), source_cols, source_rows, k)?;
    let plan = get_zoom_size(
        region.ncols,
        region.nrows,
        config.zoom.factor,
        config.zoom.output_size,
    );
    let zoom = plan.zoom_factor();
    let source_wcs = Wcs::from_header(&hdu.header);
    let wcs = source_wcs.as_ref().and_then(|w| {
        w.with_update(region.x0 as f64, region.y0 as f64, zoom, plan.cols, plan.rows)
    });

    info!(
        channel = k,
        path = %path.display(),
        ncols = plan.cols,
        nrows = plan.rows,
        zoom,
        has_wcs = wcs.is_some(),
        "Reference established"
    );

    Ok(Reference {
        input: path.clone(),
        channel: k,
        source_dims: (source_cols, source_rows),
        region,
        ncols: plan.cols,
        nrows: plan.rows,
        zoom,
        source_wcs,
        wcs,
    })
}

/// Run the full cutout pipeline with a thread-safe progress reporter.
pub fn run_cutout_reported(
    config: &CutoutConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<CutoutImage> {
    config.validate()?;

    reporter.begin_stage(PipelineStage::Reference, None);
    let reference = establish_reference(config)?;
    reporter.finish_stage();

    let present = config.channels.iter().filter(|c| c.input.is_some()).count();
    let aligning = config.alignment.mode == AlignMode::Reference && present > 1;
    let options = ExtractOptions {
        zoom: config.zoom.factor,
        output_size: config.zoom.output_size,
        block_budget_bytes: config.block_budget_bytes,
    };

    reporter.begin_stage(PipelineStage::Extracting, Some(config.channels.len()));
    let counter = AtomicUsize::new(0);
    let channels: Vec<Channel> = config
        .channels
        .par_iter()
        .enumerate()
        .map(|(k, channel_config)| {
            let result = match channel_config.input.as_ref() {
                None => Ok(Channel::new(k, None)),
                Some(path) => {
                    let region = if k == reference.channel {
                        RegionSource::Resolved(reference.region)
                    } else if aligning {
                        RegionSource::MatchReference(&reference, config.region_for(k))
                    } else {
                        RegionSource::Config(config.region_for(k))
                    };
                    extract_channel(k, path, region, config.bad_pixels_for(k), &options)
                }
            };
            let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.advance(done);
            result.map(|mut channel| {
                apply_channel_scaling(config, k, &mut channel);
                channel
            })
        })
        .collect::<Result<_>>()?;
    reporter.finish_stage();

    if !channels.iter().any(|c| c.overlaps_source) {
        return Err(FitscutError::NoOverlap);
    }
    for channel in channels.iter().filter(|c| c.data.is_some() && !c.overlaps_source) {
        warn!(channel = channel.index, "Channel is blank, cutout lies outside its image");
    }

    let scaling = &config.scaling;
    let mut image = CutoutImage {
        channels,
        reference,
        autoscale_performed: false,
        user_min_set: scaling.user_min.is_some()
            || config.channels.iter().any(|c| c.user_min.is_some()),
        user_max_set: scaling.user_max.is_some()
            || config.channels.iter().any(|c| c.user_max.is_some()),
    };

    if aligning {
        reporter.begin_stage(PipelineStage::Aligning, Some(present));
        align_to_reference(&mut image)?;
        reporter.finish_stage();
    }

    if let Some(size) = config.zoom.output_size {
        reporter.begin_stage(PipelineStage::Resizing, Some(present));
        for (i, channel) in image.channels.iter_mut().enumerate() {
            exact_resize_image_channel(channel, size);
            reporter.advance(i + 1);
        }
        exact_resize_reference(&mut image.reference, size);
        reporter.finish_stage();
    }

    reporter.begin_stage(PipelineStage::Scaling, None);
    scan_min_max(&mut image);
    resolve_user_bounds(config, &mut image);
    scale_scanned_image(&mut image, scaling.scale_type, scaling.mode)?;
    reporter.finish_stage();

    info!(
        channels = image.present_count(),
        ncols = image.reference.ncols,
        nrows = image.reference.nrows,
        "Cutout complete"
    );
    Ok(image)
}

/// Run the full cutout pipeline.
pub fn run_cutout(config: &CutoutConfig) -> Result<CutoutImage> {
    let reporter = Arc::new(NoOpReporter);
    run_cutout_reported(config, reporter)
}

/// Per-channel factor and percentiles, falling back to the shared scaling
/// settings.
fn apply_channel_scaling(config: &CutoutConfig, k: usize, channel: &mut Channel) {
    let scaling = &config.scaling;
    let Some(overrides) = config.channels.get(k) else {
        return;
    };
    let stats = &mut channel.stats;
    stats.scale_factor = overrides.scale_factor.unwrap_or(scaling.scale_factor);
    stats.autoscale_percent_low = overrides.percent_low.unwrap_or(scaling.percent_low);
    stats.autoscale_percent_high = overrides.percent_high.unwrap_or(scaling.percent_high);
}

/// User bounds per channel. A bound set for any channel applies to all of
/// them, so a channel with neither its own nor a shared bound keeps its
/// scanned data range on that side.
fn resolve_user_bounds(config: &CutoutConfig, image: &mut CutoutImage) {
    let scaling = &config.scaling;
    for channel in image.channels.iter_mut() {
        let overrides = config.channels.get(channel.index);
        let stats = &mut channel.stats;
        stats.user_min = overrides
            .and_then(|c| c.user_min)
            .or(scaling.user_min)
            .unwrap_or(stats.data_min);
        stats.user_max = overrides
            .and_then(|c| c.user_max)
            .or(scaling.user_max)
            .unwrap_or(stats.data_max);
    }
}
