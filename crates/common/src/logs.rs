//! Bounded reads of server log files

use crate::error::LogError;
use crate::DEFAULT_LOG_LINES;
use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};
use std::collections::VecDeque;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Upper bound on the window's initial allocation
const READ_WINDOW_HINT: usize = 1024;

/// Window selection for a log read
///
/// Without an offset the window is the last `lines` lines. With an offset it
/// is `[offset, offset + lines)` counted from the start of the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogReadOptions {
    pub lines: Option<usize>,
    pub offset: Option<usize>,
}

impl LogReadOptions {
    pub fn tail(lines: usize) -> Self {
        Self {
            lines: Some(lines),
            offset: None,
        }
    }
}

/// Lines selected from a log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogExcerpt {
    pub lines: Vec<String>,
    /// Line count of the whole file
    pub total_lines: usize,
    /// Zero-based index of the first returned line
    pub start: usize,
}

impl LogExcerpt {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogReader {
    allowed_root: Option<PathBuf>,
}

impl LogReader {
    /// Reader confined to `allowed_root` when one is given.
    pub fn new(allowed_root: Option<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.map(|root| absolutize(&root).unwrap_or(root).clean()),
        }
    }

    /// Check `raw` for traversal and containment, returning the normalised
    /// absolute path. Performs no file-system access.
    pub fn check_path(&self, raw: &Path) -> Result<PathBuf, LogError> {
        let display = raw.display().to_string();
        let invalid = |reason: &str| LogError::InvalidPath {
            path: display.clone(),
            reason: reason.to_string(),
        };

        if display.contains("../")
            || display.contains("..\\")
            || raw.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(invalid("path contains traversal sequences"));
        }

        let normalized = absolutize(raw)
            .map_err(|e| invalid(&format!("cannot resolve path: {e}")))?
            .clean();

        if let Some(root) = &self.allowed_root {
            if !normalized.starts_with(root) {
                return Err(invalid(&format!(
                    "path is outside allowed directory {}",
                    root.display()
                )));
            }
        }

        Ok(normalized)
    }

    /// Stream `path` once, keeping only the requested window in memory.
    pub async fn read(&self, path: &Path, options: LogReadOptions) -> Result<LogExcerpt, LogError> {
        let resolved = self.check_path(path)?;
        let shown = path.display().to_string();

        let file = File::open(&resolved)
            .await
            .map_err(|_| LogError::FileNotFound {
                path: shown.clone(),
            })?;
        let mut reader = BufReader::new(file);

        let count = options.lines.unwrap_or(DEFAULT_LOG_LINES);
        let mut window: VecDeque<String> = VecDeque::with_capacity(count.min(READ_WINDOW_HINT));
        let mut total = 0usize;
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let n = reader
                .read_until(b'\n', &mut raw)
                .await
                .map_err(|e| LogError::ReadError {
                    path: shown.clone(),
                    message: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            let index = total;
            total += 1;

            let keep = match options.offset {
                Some(offset) => index >= offset && index - offset < count,
                None => count > 0,
            };
            if !keep {
                continue;
            }
            if options.offset.is_none() && window.len() == count {
                window.pop_front();
            }
            window.push_back(decode_line(&raw));
        }

        let start = match options.offset {
            Some(offset) => offset.min(total),
            None => total - window.len(),
        };

        debug!(
            "Read {} lines ({}..{}) from {}",
            window.len(),
            start,
            start + window.len(),
            path.display()
        );

        Ok(LogExcerpt {
            lines: window.into(),
            total_lines: total,
            start,
        })
    }

    /// Last `lines` lines of `path`, or `None` when it cannot be read.
    pub async fn tail(&self, path: &Path, lines: usize) -> Option<String> {
        self.read(path, LogReadOptions::tail(lines))
            .await
            .ok()
            .map(|excerpt| excerpt.text())
    }
}

/// One line without its terminator (`\n` or `\r\n`)
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_lines(dir: &TempDir, name: &str, count: usize) -> PathBuf {
        let path = dir.path().join(name);
        let body: String = (1..=count).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_default_window_is_last_100_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, "combined.log", 150);

        let excerpt = LogReader::default()
            .read(&path, LogReadOptions::default())
            .await
            .unwrap();

        assert_eq!(excerpt.lines.len(), 100);
        assert_eq!(excerpt.lines[0], "line 51");
        assert_eq!(excerpt.lines[99], "line 150");
        assert_eq!(excerpt.total_lines, 150);
        assert_eq!(excerpt.start, 50);
    }

    #[tokio::test]
    async fn test_short_file_returned_whole() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, "stdout.log", 3);

        let excerpt = LogReader::default()
            .read(&path, LogReadOptions::tail(10))
            .await
            .unwrap();
        assert_eq!(excerpt.text(), "line 1\nline 2\nline 3");
    }

    #[tokio::test]
    async fn test_line_terminators() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stderr.log");
        fs::write(&path, "one\r\ntwo\n\nlast without newline").unwrap();

        let excerpt = LogReader::default()
            .read(&path, LogReadOptions::default())
            .await
            .unwrap();
        assert_eq!(excerpt.lines, vec!["one", "two", "", "last without newline"]);
        assert_eq!(excerpt.total_lines, 4);
    }

    #[tokio::test]
    async fn test_tail_of_large_file() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, "combined.log", 200_000);

        let excerpt = LogReader::default()
            .read(&path, LogReadOptions::tail(3))
            .await
            .unwrap();
        assert_eq!(excerpt.lines, vec!["line 199998", "line 199999", "line 200000"]);
        assert_eq!(excerpt.total_lines, 200_000);
        assert_eq!(excerpt.start, 199_997);
    }

    #[tokio::test]
    async fn test_offset_window_counts_from_start() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(&dir, "stdout.log", 50);

        let excerpt = LogReader::default()
            .read(
                &path,
                LogReadOptions {
                    lines: Some(5),
                    offset: Some(10),
                },
            )
            .await
            .unwrap();
        assert_eq!(excerpt.lines.first().unwrap(), "line 11");
        assert_eq!(excerpt.lines.len(), 5);

        let past_end = LogReader::default()
            .read(
                &path,
                LogReadOptions {
                    lines: Some(5),
                    offset: Some(500),
                },
            )
            .await
            .unwrap();
        assert!(past_end.lines.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_rejected_before_file_access() {
        let reader = LogReader::default();
        for raw in ["../etc/passwd", "/var/log/../../etc/shadow", "logs/..\\secret"] {
            let err = reader
                .read(Path::new(raw), LogReadOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_path", "{raw}");
        }
    }

    #[tokio::test]
    async fn test_outside_allowed_root() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let path = write_lines(&other, "stderr.log", 1);

        let reader = LogReader::new(Some(root.path().to_path_buf()));
        let err = reader
            .read(&path, LogReadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_path");

        let inside = write_lines(&root, "stderr.log", 2);
        assert_eq!(reader.tail(&inside, 1).await.unwrap(), "line 2");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = LogReader::default()
            .read(&dir.path().join("missing.log"), LogReadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "file_not_found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = LogReader::default()
            .read(dir.path(), LogReadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "read_error");
    }
}
