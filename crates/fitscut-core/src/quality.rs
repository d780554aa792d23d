use tracing::{debug, warn};

use crate::consts::BSOFTEN_K;
use crate::error::Result;
use crate::image::{is_good, BadPixelConfig};
use crate::io::fits::{ExtensionId, FitsFile, Hdu, PixelRegion};
use crate::io::header::Header;

/// How bad pixels of a channel are recognised. Exactly one policy is active.
#[derive(Clone, Debug, PartialEq)]
pub enum BadPixelPolicy {
    None,
    /// Per-pixel quality planes; bad where every plane equals `bad_value`.
    QualityMask { extension: ExtensionId, bad_value: f32 },
    /// Header-declared good range; `max = None` makes `min` a lower bound only.
    Range { min: f32, max: Option<f32> },
    /// Pixels equal to the sentinel are bad.
    Sentinel(f32),
}

/// Pick the active policy: quality extension > header range > sentinel.
pub fn resolve_policy(config: &BadPixelConfig, header: &Header, quality_available: bool) -> BadPixelPolicy {
    if let Some(extension) = &config.quality_extension {
        if quality_available {
            return BadPixelPolicy::QualityMask {
                extension: extension.clone(),
                bad_value: config.quality_bad_value,
            };
        }
        debug!(%extension, "Quality extension not present, falling back");
    }

    if config.use_badpix {
        match badpix_range(header) {
            Some((min, max)) => return BadPixelPolicy::Range { min, max },
            None => debug!("No GOODMIN/BADPIX keywords, falling back"),
        }
    }

    if config.bad_data_value.is_finite() {
        BadPixelPolicy::Sentinel(config.bad_data_value)
    } else {
        BadPixelPolicy::None
    }
}

/// Good-data range from GOODMIN/GOODMAX, or BADPIX as a lower bound.
pub fn badpix_range(header: &Header) -> Option<(f32, Option<f32>)> {
    if let Some(min) = header.get_f64("GOODMIN") {
        let max = header.get_f64("GOODMAX").map(|v| v as f32);
        return Some((min as f32, max));
    }
    header.get_f64("BADPIX").map(|v| (v as f32, None))
}

/// An opened quality extension of a source file.
pub struct QualitySource<'a> {
    fits: &'a FitsFile,
    hdu: &'a Hdu,
    bad_value: f32,
}

impl<'a> QualitySource<'a> {
    /// Look up the extension; `None` (logged) when the file has no such HDU.
    pub fn open(fits: &'a FitsFile, extension: &ExtensionId, bad_value: f32) -> Option<Self> {
        match fits.find_extension(extension) {
            Some(hdu) if hdu.naxes.len() >= 2 => {
                debug!(%extension, planes = hdu.planes(), "Using quality extension");
                Some(Self {
                    fits,
                    hdu,
                    bad_value,
                })
            }
            Some(_) => {
                warn!(%extension, "Quality extension holds no image, ignoring");
                None
            }
            None => {
                debug!(%extension, file = %fits.path().display(), "No quality extension");
                None
            }
        }
    }

    /// Number of quality planes (NAXIS3, or 1).
    pub fn planes(&self) -> usize {
        self.hdu.planes()
    }

    pub fn bad_value(&self) -> f32 {
        self.bad_value
    }

    /// Read `region` from every quality plane.
    pub fn read_planes(&self, region: &PixelRegion) -> Result<Vec<Vec<f32>>> {
        (0..self.planes())
            .map(|plane| self.fits.read_region(self.hdu, &region.on_plane(plane)))
            .collect()
    }
}

/// Flag bad pixels of `buffer` (read from `region`) as NaN under `policy`.
///
/// Returns the number of pixels that were not NaN before and are NaN after.
pub fn apply_qual(
    quality: Option<&QualitySource<'_>>,
    policy: &BadPixelPolicy,
    region: &PixelRegion,
    buffer: &mut [f32],
) -> Result<usize> {
    let count = match policy {
        BadPixelPolicy::None => 0,
        BadPixelPolicy::QualityMask { extension, .. } => match quality {
            Some(source) => {
                let planes = source.read_planes(region)?;
                flag_with_planes(&planes, source.bad_value(), buffer)
            }
            None => {
                warn!(%extension, "Quality policy without an open extension, skipping");
                0
            }
        },
        BadPixelPolicy::Range { min, max } => flag_where(buffer, |v| match max {
            Some(max) => !(v >= *min && v <= *max),
            None => v < *min,
        }),
        BadPixelPolicy::Sentinel(bad) => flag_where(buffer, |v| v == *bad),
    };
    Ok(count)
}

/// Keep a pixel when any plane differs from `bad_value`; otherwise, or when
/// the pixel is already non-finite, set it to NaN.
pub fn flag_with_planes(planes: &[Vec<f32>], bad_value: f32, buffer: &mut [f32]) -> usize {
    let mut count = 0;
    for (i, v) in buffer.iter_mut().enumerate() {
        let good = planes
            .iter()
            .any(|plane| plane.get(i).is_some_and(|&q| q != bad_value));
        if !good || !v.is_finite() {
            if !v.is_nan() {
                count += 1;
            }
            *v = f32::NAN;
        }
    }
    count
}

fn flag_where(buffer: &mut [f32], is_bad: impl Fn(f32) -> bool) -> usize {
    let mut count = 0;
    for v in buffer.iter_mut() {
        if is_bad(*v) {
            if !v.is_nan() {
                count += 1;
            }
            *v = f32::NAN;
        }
    }
    count
}

/// BSOFTEN/BOFFSET pair when both keywords are present.
pub fn bsoften_params(header: &Header) -> Option<(f64, f64)> {
    match (header.get_f64("BSOFTEN"), header.get_f64("BOFFSET")) {
        (Some(bsoften), Some(boffset)) => Some((bsoften, boffset)),
        (Some(_), None) | (None, Some(_)) => {
            debug!("Incomplete BSOFTEN/BOFFSET keywords, not inverting");
            None
        }
        (None, None) => None,
    }
}

/// Undo asinh magnitude compression on good pixels:
/// `raw = bsoften * (exp(x/k) - exp(-x/k)) + boffset`.
pub fn invert_bsoften(bsoften: f64, boffset: f64, buffer: &mut [f32], bad_value: f32) {
    for v in buffer.iter_mut().filter(|v| is_good(**v, bad_value)) {
        let x = *v as f64 / BSOFTEN_K;
        *v = (bsoften * (x.exp() - (-x).exp()) + boffset) as f32;
    }
}
