//! Poster timestamp selection that avoids black intervals.

use rand::Rng;

use crate::blackdetect::BlackInterval;

/// Random draws attempted before falling back to gap search.
pub const MAX_RANDOM_DRAWS: usize = 50;

/// Gaps must be longer than this to be used as a fallback.
pub const MIN_GAP_SECS: f64 = 10.0;

/// Pick a seek position in `[0, duration]` outside every black interval.
///
/// Up to [`MAX_RANDOM_DRAWS`] points are drawn from the middle 80% of the
/// timeline. If all are black, a random point inside the largest gap over
/// [`MIN_GAP_SECS`] is used; failing that, any point in the middle 60%.
pub fn select_timestamp<R: Rng + ?Sized>(
    duration: f64,
    intervals: &[BlackInterval],
    rng: &mut R,
) -> f64 {
    if duration.is_nan() || duration <= 0.0 {
        return 0.0;
    }

    let (lo, hi) = (duration * 0.1, duration * 0.9);
    for _ in 0..MAX_RANDOM_DRAWS {
        let t = rng.gen_range(lo..=hi);
        if !in_black(t, intervals) {
            return t;
        }
    }

    if let Some((start, end)) = largest_gap(duration, intervals) {
        tracing::debug!("Random draws all black; using gap {start:.1}-{end:.1}s");
        return rng.gen_range(start..end);
    }

    tracing::debug!("No usable gap between black intervals; picking blindly");
    rng.gen_range(duration * 0.2..=duration * 0.8)
}

/// Whether `t` falls inside any interval.
pub fn in_black(t: f64, intervals: &[BlackInterval]) -> bool {
    intervals.iter().any(|iv| iv.contains(t))
}

/// Largest interval-free span longer than [`MIN_GAP_SECS`], including the
/// spans before the first and after the last interval.
pub fn largest_gap(duration: f64, intervals: &[BlackInterval]) -> Option<(f64, f64)> {
    let mut sorted: Vec<BlackInterval> = intervals.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut best: Option<(f64, f64)> = None;
    let mut consider = |start: f64, end: f64| {
        let len = end - start;
        if len > MIN_GAP_SECS && best.map_or(true, |(s, e)| len > e - s) {
            best = Some((start, end));
        }
    };

    let mut cursor = 0.0_f64;
    for iv in &sorted {
        consider(cursor, iv.start.min(duration));
        cursor = cursor.max(iv.end);
    }
    consider(cursor, duration);

    best
}
