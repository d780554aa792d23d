/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Number of channels a cutout can combine (R, G, B).
pub const MAX_CHANNELS: usize = 3;

/// Number of histogram bins used for autoscale, equalization and the mode.
pub const NBINS: usize = 10_000;

/// Number of output levels of the equalization lookup table.
pub const EQ_LEVELS: usize = 256;

/// Upper bound on autoscale domain refinements for one channel.
pub const MAX_AUTOSCALE_ITERATIONS: usize = 16;

/// Bins between the low and high percentile below which the histogram domain
/// is considered too wide and is refined.
pub const AUTOSCALE_REFINE_BINS: i64 = 10;

/// Multiple of (median - min) the autoscale max is pushed to for noise-dominated images.
pub const NOISE_FLOOR_FACTOR: f64 = 5.0;

/// Approximate number of pixels sampled by full-image autoscale.
pub const NSAMPLE: usize = 10_000;

/// Minimum number of rows sampled by full-image autoscale.
pub const MIN_SAMPLE_ROWS: usize = 10;

/// Expected pixel count in the narrower autoscale tail below which the
/// full-image sample is enlarged.
pub const MIN_TAIL_PIXELS: f64 = 20.0;

/// asinh stretch nonlinearity used by multi-band composition.
pub const ASINH_NONLINEARITY: f64 = 3.0;

/// Display ceiling after asinh composition of three channels.
pub const ASINH_CEILING_THREE: f64 = 0.33;

/// Display ceiling after asinh composition of two channels.
pub const ASINH_CEILING_TWO: f64 = 0.4;

/// Display ceiling after asinh composition of a single channel.
pub const ASINH_CEILING_ONE: f64 = 0.7;

/// Magnitude softening constant 2.5 / ln(10) used by BSOFTEN compression.
pub const BSOFTEN_K: f64 = 1.085_736_2;

/// Default memory budget (bytes) for one working block of source rows in the
/// shrink path. Blocks never hold fewer than `pixfac` rows.
pub const DEFAULT_BLOCK_BUDGET_BYTES: usize = 16 * 1024 * 1024;

