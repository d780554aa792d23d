use crate::image::CutoutImage;
use crate::scale::ScaleMode;

/// Display `(min, max)` of each present channel, in band order.
///
/// Autoscale modes use the autoscale range with user overrides on top,
/// `User` uses user values where set and the data range otherwise,
/// `MinMax` uses the data range.
pub fn display_range(image: &CutoutImage, mode: ScaleMode) -> Vec<(f64, f64)> {
    image
        .present()
        .map(|channel| {
            let s = &channel.stats;
            let (auto_or_data_min, auto_or_data_max) = match mode {
                ScaleMode::Auto | ScaleMode::Full => (s.autoscale_min, s.autoscale_max),
                ScaleMode::User => (s.data_min, s.data_max),
                ScaleMode::MinMax => return (s.data_min, s.data_max),
            };
            let min = if image.user_min_set { s.user_min } else { auto_or_data_min };
            let max = if image.user_max_set { s.user_max } else { auto_or_data_max };
            (min, max)
        })
        .collect()
}
