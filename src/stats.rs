/// Fraction of samples discarded from each end by [`trimmed_mean`].
pub const TRIM_FRACTION: f64 = 0.2;

pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Average after sorting and discarding `fraction` of the samples from
/// each end.
///
/// The kept window is `[floor(n * fraction), ceil(n * (1 - fraction)))`,
/// so ten samples keep the middle six and a single sample keeps itself.
pub fn trimmed_mean(samples: &[f64], fraction: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let len = sorted.len() as f64;
    let start = (len * fraction).floor() as usize;
    let end = ((len * (1.0 - fraction)).ceil() as usize).min(sorted.len());

    if start >= end {
        return mean(&sorted);
    }

    mean(&sorted[start..end])
}

/// Mean absolute difference between consecutive samples.
pub fn jitter(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }

    let jitters: Vec<f64> =
        samples.windows(2).map(|pair| (pair[0] - pair[1]).abs()).collect();

    mean(&jitters)
}
