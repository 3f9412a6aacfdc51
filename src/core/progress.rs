//! Parsing of rclone's human-readable progress lines.
//!
//! rclone's stats output is not a stable machine format, so the parser is
//! deliberately permissive: it looks for known field labels in
//! comma-separated segments and silently skips anything it does not
//! recognize. A malformed line never aborts processing of the stream.

use std::sync::OnceLock;

use regex::Regex;

/// Field labels recognized in a progress line.
const LABELS: [&str; 4] = ["Transferred:", "Speed:", "ETA:", "Files:"];

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d.]+)\s*%").expect("valid regex"))
}

/// Live snapshot of a transfer, rebuilt incrementally from output lines.
///
/// Fields hold display text exactly as rclone printed it. A new progress
/// line overwrites only the fields it carries; the rest keep their
/// last-known values, since partial lines are common under pipe buffering.
/// `percent` stays `None` until the first line with a percentage, which is
/// the signal to switch a progress display from indeterminate to
/// determinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferProgress {
    pub transferred: String,
    pub speed: String,
    pub eta: String,
    pub files: String,
    pub percent: Option<f64>,
}

impl TransferProgress {
    /// Whether a line carries any recognized progress field.
    pub fn is_progress_line(line: &str) -> bool {
        LABELS.iter().any(|label| line.contains(label))
    }

    /// Fold one output line into the snapshot.
    ///
    /// Returns `true` when at least one field was updated. Lines without a
    /// recognized label leave the snapshot untouched and return `false`;
    /// callers forward such lines verbatim to raw-output sinks.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || !Self::is_progress_line(line) {
            return false;
        }

        let mut changed = false;
        for segment in line.split(',') {
            if let Some(value) = field_value(segment, "Transferred:") {
                self.transferred = value;
                changed = true;
            } else if let Some(value) = field_value(segment, "Speed:") {
                self.speed = value;
                changed = true;
            } else if let Some(value) = field_value(segment, "ETA:") {
                self.eta = value;
                changed = true;
            } else if let Some(value) = field_value(segment, "Files:") {
                self.files = value;
                changed = true;
            }

            if segment.contains('%') {
                if let Some(percent) = parse_percent(segment) {
                    self.percent = Some(percent);
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Extract the display value of a labelled segment: the text after the
/// segment's first `:`, trimmed. `None` when the label is absent.
fn field_value(segment: &str, label: &str) -> Option<String> {
    if !segment.contains(label) {
        return None;
    }
    let (_, value) = segment.split_once(':')?;
    Some(value.trim().to_string())
}

fn parse_percent(segment: &str) -> Option<f64> {
    let captures = percent_re().captures(segment)?;
    captures.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_progress_line() {
        let mut progress = TransferProgress::default();
        let changed =
            progress.apply_line("Transferred: 1.5 GiB / 3 GiB, 50%, Speed: 10 MiB/s, ETA: 2m30s");

        assert!(changed);
        assert_eq!(progress.transferred, "1.5 GiB / 3 GiB");
        assert_eq!(progress.speed, "10 MiB/s");
        assert_eq!(progress.eta, "2m30s");
        assert_eq!(progress.percent, Some(50.0));
    }

    #[test]
    fn partial_line_keeps_last_known_values() {
        let mut progress = TransferProgress::default();
        progress.apply_line("Transferred: 1 GiB / 4 GiB, 25%, Speed: 8 MiB/s, ETA: 6m0s");
        progress.apply_line("Transferred: 2 GiB / 4 GiB, 50%");

        assert_eq!(progress.transferred, "2 GiB / 4 GiB");
        assert_eq!(progress.percent, Some(50.0));
        // Absent fields survive from the previous line.
        assert_eq!(progress.speed, "8 MiB/s");
        assert_eq!(progress.eta, "6m0s");
    }

    #[test]
    fn files_segment_updates_file_count() {
        let mut progress = TransferProgress::default();
        progress.apply_line("Transferred: 3 / 10, 30%, Files: 3 / 10");
        assert_eq!(progress.files, "3 / 10");
    }

    #[test]
    fn unrecognized_line_yields_no_update() {
        let mut progress = TransferProgress::default();
        let before = progress.clone();
        assert!(!progress.apply_line("Checking for changes..."));
        assert_eq!(progress, before);
    }

    #[test]
    fn empty_line_yields_no_update() {
        let mut progress = TransferProgress::default();
        assert!(!progress.apply_line("   \n"));
    }

    #[test]
    fn percent_appears_on_first_percentage_line() {
        let mut progress = TransferProgress::default();
        progress.apply_line("Transferred: 0 B / 0 B, -");
        assert_eq!(progress.percent, None);

        progress.apply_line("Transferred: 512 KiB / 1 MiB, 50%");
        assert_eq!(progress.percent, Some(50.0));
    }

    #[test]
    fn eta_with_colons_keeps_full_value() {
        let mut progress = TransferProgress::default();
        progress.apply_line("Transferred: 9 GiB / 20 GiB, 45%, ETA: 1:02:03");
        assert_eq!(progress.eta, "1:02:03");
    }

    #[test]
    fn malformed_percent_is_skipped() {
        let mut progress = TransferProgress::default();
        progress.apply_line("Transferred: 1 GiB / 2 GiB, %, Speed: 5 MiB/s");
        assert_eq!(progress.percent, None);
        assert_eq!(progress.speed, "5 MiB/s");
    }
}
