use crate::consts::EQ_LEVELS;
use crate::image::is_good;

/// Binned pixel counts over a finite domain.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// `nbins + 1` counts. Bin 0 also holds values below the domain,
    /// bin `nbins - 1` values above it.
    pub bins: Vec<u64>,
    /// Number of good pixels counted.
    pub pixcount: u64,
    /// Smallest good value inside the domain (domain midpoint if none).
    pub in_min: f64,
    /// Largest good value inside the domain (domain midpoint if none).
    pub in_max: f64,
}

impl Histogram {
    pub fn nbins(&self) -> usize {
        self.bins.len().saturating_sub(1)
    }

    /// Value at the centre-left edge of bin `index`, matching the ceil binning.
    pub fn bin_value(&self, index: f64, dmin: f64, dmax: f64) -> f64 {
        (dmax - dmin) / (self.nbins() as f64 - 1.0) * index + dmin
    }
}

/// Count good pixels of `values` into `nbins` bins spanning `[dmin, dmax]`.
///
/// Intermediate bins are `(dmax - dmin) / (nbins - 1)` wide and a value lands
/// in `ceil((v - dmin) / binsize)`. Non-finite and `bad_value` pixels are
/// skipped entirely.
pub fn compute_histogram(
    values: &[f32],
    nbins: usize,
    dmin: f64,
    dmax: f64,
    bad_value: f32,
) -> Histogram {
    let nbins = nbins.max(2);
    let mut bins = vec![0u64; nbins + 1];
    let binsize = (dmax - dmin) / (nbins - 1) as f64;
    let top = nbins - 1;

    let mut pixcount = 0u64;
    let mut fmin = f64::INFINITY;
    let mut fmax = f64::NEG_INFINITY;

    for &v in values {
        if !is_good(v, bad_value) {
            continue;
        }
        let v = v as f64;
        let index = if v < dmin {
            0
        } else if v > dmax {
            top
        } else {
            fmin = fmin.min(v);
            fmax = fmax.max(v);
            if binsize > 0.0 {
                ((v - dmin) / binsize).ceil().clamp(0.0, top as f64) as usize
            } else {
                0
            }
        };
        bins[index] += 1;
        pixcount += 1;
    }

    let (in_min, in_max) = if fmin > fmax {
        let mid = 0.5 * (dmin + dmax);
        (mid, mid)
    } else {
        (fmin, fmax)
    };

    Histogram {
        bins,
        pixcount,
        in_min,
        in_max,
    }
}

/// Equalization lookup table (`nbins + 1` entries) mapping bins to 0–255.
///
/// The cumulative histogram is split into 256 partitions of equal
/// population; each boundary is placed at the nearer of the two candidate
/// bins. The table is monotonic non-decreasing.
pub fn eq_histogram(hist: &Histogram) -> Vec<u8> {
    let nbins = hist.nbins();
    let levels = EQ_LEVELS;
    let mut lut = vec![0u8; nbins + 1];
    if hist.pixcount == 0 || nbins < 2 {
        return lut;
    }

    let count = |i: usize| hist.bins.get(i).copied().unwrap_or(0) as f64;
    let pixels_per_value = hist.pixcount as f64 / levels as f64;

    let mut part = vec![0usize; levels + 1];
    part[levels] = nbins;

    let mut j = 0usize;
    let mut sum = count(0) + count(1);
    for (i, slot) in part.iter_mut().enumerate().take(levels).skip(1) {
        let desired = i as f64 * pixels_per_value;
        while sum <= desired && j + 1 < nbins {
            j += 1;
            sum += count(j + 1);
        }
        let dif = sum - count(j);
        *slot = if sum - desired > dif / 2.0 { j } else { j + 1 };
    }

    let mut i = 0usize;
    for (j, entry) in lut.iter_mut().enumerate().take(nbins) {
        while i < levels && part[i + 1] <= j {
            i += 1;
        }
        *entry = i.min(levels - 1) as u8;
    }
    lut[nbins] = (levels - 1) as u8;
    lut
}

/// Value at the centre of the most populated bin over `[dmin, dmax]`.
pub fn histogram_mode(values: &[f32], nbins: usize, dmin: f64, dmax: f64, bad_value: f32) -> f64 {
    let hist = compute_histogram(values, nbins, dmin, dmax, bad_value);
    let mut depth = 0u64;
    let mut max_bin = 0usize;
    for (i, &n) in hist.bins.iter().enumerate() {
        if n > depth {
            depth = n;
            max_bin = i;
        }
    }
    hist.bin_value(max_bin as f64 - 0.5, dmin, dmax)
}
