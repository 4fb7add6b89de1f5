//! Sampling windows and `blackdetect` output parsing.

use std::sync::LazyLock;

use regex::Regex;

use super::BlackInterval;

/// Relative timeline positions that each start a sampling window.
pub const WINDOW_POSITIONS: [f64; 5] = [0.05, 0.25, 0.5, 0.75, 0.9];

static BLACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"black_start:(\d+(?:\.\d+)?)\s+black_end:(\d+(?:\.\d+)?)\s+black_duration:(\d+(?:\.\d+)?)",
    )
    .expect("Invalid regex")
});

/// A slice of the timeline handed to one darkness analysis run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWindow {
    pub start: f64,
    pub length: f64,
}

/// Windows at [`WINDOW_POSITIONS`], each at most `max_len` long and clipped
/// to the remaining duration; windows shorter than `min_len` are dropped.
pub fn sample_windows(total: f64, max_len: f64, min_len: f64) -> Vec<SampleWindow> {
    if total.is_nan() || total <= 0.0 {
        return Vec::new();
    }

    WINDOW_POSITIONS
        .iter()
        .filter_map(|pos| {
            let start = total * pos;
            let length = max_len.min(total - start);
            (length >= min_len).then_some(SampleWindow { start, length })
        })
        .collect()
}

/// Parse `black_start`/`black_end`/`black_duration` triples from ffmpeg's
/// diagnostic output.
///
/// Times are shifted by `offset` (the window start) and clipped to
/// `[0, total]`; intervals that collapse to `start >= end` are discarded.
pub fn parse_black_intervals(stderr: &str, offset: f64, total: f64) -> Vec<BlackInterval> {
    BLACK_RE
        .captures_iter(stderr)
        .filter_map(|caps| {
            let start: f64 = caps.get(1)?.as_str().parse().ok()?;
            let end: f64 = caps.get(2)?.as_str().parse().ok()?;
            BlackInterval::new(
                (start + offset).clamp(0.0, total),
                (end + offset).clamp(0.0, total),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_for_long_video() {
        let windows = sample_windows(7200.0, 30.0, 5.0);
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0], SampleWindow { start: 360.0, length: 30.0 });
        assert_eq!(windows[4].start, 6480.0);
        assert!(windows.iter().all(|w| w.length == 30.0));
    }

    #[test]
    fn windows_clip_to_remaining_duration() {
        // 0.9 * 150 = 135 leaves 15s.
        let windows = sample_windows(150.0, 30.0, 5.0);
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[4].length, 15.0);
    }

    #[test]
    fn short_trailing_windows_are_dropped() {
        // 0.9 * 40 = 36 leaves 4s, below the 5s minimum.
        let windows = sample_windows(40.0, 30.0, 5.0);
        assert_eq!(windows.len(), 4);
        assert!(windows.iter().all(|w| w.length >= 5.0));
        assert!(sample_windows(0.0, 30.0, 5.0).is_empty());
    }

    #[test]
    fn parse_offsets_and_clips() {
        let stderr = "\
[blackdetect @ 0x55d1c8a3c140] black_start:0 black_end:2.5 black_duration:2.5
frame=  720 fps=0.0 q=-0.0 size=N/A time=00:00:30.00 bitrate=N/A
[blackdetect @ 0x55d1c8a3c140] black_start:28.04 black_end:40 black_duration:11.96
";
        let intervals = parse_black_intervals(stderr, 100.0, 130.0);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0], BlackInterval { start: 100.0, end: 102.5 });
        assert!((intervals[1].start - 128.04).abs() < 1e-9);
        assert_eq!(intervals[1].end, 130.0);
    }

    #[test]
    fn parse_discards_collapsed_intervals() {
        let stderr = "black_start:10 black_end:12 black_duration:2\n";
        // Entirely past the end of the file once offset.
        assert!(parse_black_intervals(stderr, 200.0, 150.0).is_empty());
        assert!(parse_black_intervals("no matches here", 0.0, 100.0).is_empty());
    }
}
