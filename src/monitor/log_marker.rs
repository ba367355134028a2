//! Completion detection by substring markers in an append-only log.

use regex::Regex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::{PollState, ProgressSource};

/// Bytes read from the end of the log on each poll.
const TAIL_BYTES: u64 = 8 * 1024;

// The energy block in an mdrun log starts with a "Step Time" header line
// followed by a line holding both values.
static STEP_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Step\s+Time\s*$").unwrap());

static STEP_VALUE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+[-+0-9.eE]+\s*$").unwrap());

/// Watches the newest lines of a log for a completion or fatal marker.
#[derive(Debug, Clone)]
pub struct LogMarkerSource {
    path: PathBuf,
    completion_marker: String,
    fatal_marker: String,
    tail_lines: usize,
}

impl LogMarkerSource {
    pub fn new(
        path: impl Into<PathBuf>,
        completion_marker: impl Into<String>,
        fatal_marker: impl Into<String>,
        tail_lines: usize,
    ) -> Self {
        Self {
            path: path.into(),
            completion_marker: completion_marker.into(),
            fatal_marker: fatal_marker.into(),
            tail_lines: tail_lines.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last few KiB of the log. A partial first line is dropped
    /// when the read did not start at offset zero.
    fn read_tail(&self) -> io::Result<String> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let start = len.saturating_sub(TAIL_BYTES);
        file.seek(SeekFrom::Start(start))?;

        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf)?;
        let text = String::from_utf8_lossy(&buf).into_owned();

        if start > 0 {
            Ok(text
                .split_once('\n')
                .map(|(_, rest)| rest.to_string())
                .unwrap_or_default())
        } else {
            Ok(text)
        }
    }

    /// Classify the newest `tail_lines` lines of `text`. A fatal marker
    /// anywhere in the window beats a completion marker.
    pub fn classify(&self, text: &str) -> PollState {
        let lines: Vec<&str> = text.lines().collect();
        let window = &lines[lines.len().saturating_sub(self.tail_lines)..];

        if let Some(pos) = window.iter().position(|l| l.contains(&self.fatal_marker)) {
            return PollState::Failed(fatal_message(&window[pos..]));
        }
        if window.iter().any(|l| l.contains(&self.completion_marker)) {
            return PollState::Done;
        }
        PollState::Pending
    }
}

/// The marker line, joined with the following detail line when the marker
/// line ends in a colon.
fn fatal_message(from_marker: &[&str]) -> String {
    let head = from_marker[0].trim();
    if head.ends_with(':')
        && let Some(detail) = from_marker[1..].iter().map(|l| l.trim()).find(|l| !l.is_empty())
    {
        return format!("{head} {detail}");
    }
    head.to_string()
}

/// Last step number reported in an energy block within `text`.
pub fn parse_latest_step(text: &str) -> Option<u64> {
    let mut latest = None;
    let mut after_header = false;
    for line in text.lines() {
        if after_header {
            if let Some(cap) = STEP_VALUE_REGEX.captures(line)
                && let Ok(step) = cap[1].parse::<u64>()
            {
                latest = Some(step);
            }
            after_header = false;
        }
        if STEP_HEADER_REGEX.is_match(line) {
            after_header = true;
        }
    }
    latest
}

impl ProgressSource for LogMarkerSource {
    fn poll_state(&mut self) -> io::Result<PollState> {
        match self.read_tail() {
            Ok(text) => Ok(self.classify(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PollState::Pending),
            Err(e) => Err(e),
        }
    }

    fn has_started(&self) -> bool {
        self.path.exists()
    }

    fn latest_step(&mut self) -> Option<u64> {
        self.read_tail().ok().and_then(|text| parse_latest_step(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn source(path: &Path) -> LogMarkerSource {
        LogMarkerSource::new(path, "Finished mdrun", "Fatal error", 20)
    }

    #[test]
    fn test_missing_log_is_pending() {
        let dir = tempdir().unwrap();
        let mut src = source(&dir.path().join("md.log"));
        assert!(!src.has_started());
        assert_eq!(src.poll_state().unwrap(), PollState::Pending);
    }

    #[test]
    fn test_completion_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("md.log");
        fs::write(&path, "Started mdrun\nStep 100\n").unwrap();

        let mut src = source(&path);
        assert!(src.has_started());
        assert_eq!(src.poll_state().unwrap(), PollState::Pending);

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "Finished mdrun on rank 0").unwrap();
        assert_eq!(src.poll_state().unwrap(), PollState::Done);
    }

    #[test]
    fn test_fatal_marker_wins_over_completion() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("md.log");
        fs::write(
            &path,
            "Fatal error:\nThe X-size of the box is too small\n\nFinished mdrun\n",
        )
        .unwrap();

        match source(&path).poll_state().unwrap() {
            PollState::Failed(line) => {
                assert_eq!(line, "Fatal error: The X-size of the box is too small")
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_markers_outside_window_are_ignored() {
        let src = LogMarkerSource::new("unused.log", "Finished mdrun", "Fatal error", 3);
        let text = "Fatal error: old\nline\nline\nline\nline\n";
        assert_eq!(src.classify(text), PollState::Pending);
    }

    #[test]
    fn test_reads_only_the_tail_of_large_logs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("md.log");
        let mut body = String::from("Fatal error: stale marker far back\n");
        body.push_str(&"x".repeat(64 * 1024));
        body.push_str("\nFinished mdrun\n");
        fs::write(&path, body).unwrap();

        assert_eq!(source(&path).poll_state().unwrap(), PollState::Done);
    }

    #[test]
    fn test_parse_latest_step() {
        let log = "\
           Step           Time
            500        1.00000

   Energies (kJ/mol)
           Step           Time
           1000        2.00000
";
        assert_eq!(parse_latest_step(log), Some(1000));
        assert_eq!(parse_latest_step("no energies yet"), None);
    }
}
