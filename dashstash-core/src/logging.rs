//! Logging setup and the persisted log buffer.
//!
//! The log file is diagnostic only. It is appended to for the lifetime of the process and
//! trimmed back to its most recent lines once per maintenance cycle.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub fn init(log_path: &Path) {
    use env_logger::Target;

    // Prefer the persisted log buffer. If we cannot open it (read-only FS, missing
    // partition, etc.), fall back to stderr so journald still captures output.
    let target = (|| -> io::Result<Target> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        Ok(Target::Pipe(Box::new(file)))
    })()
    .unwrap_or(Target::Stderr);

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(target)
        .try_init();
}

/// Keep only the last `max_lines` lines of the log at `path`.
///
/// The file is rewritten in place rather than replaced, so a writer holding it open in
/// append mode keeps logging to the same file. Lines are handled as bytes: a write torn
/// by power loss may leave invalid UTF-8 behind. Returns whether anything was dropped.
pub fn truncate_if_oversized(path: &Path, max_lines: usize) -> io::Result<bool> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    let body = content.strip_suffix(b"\n").unwrap_or(&content);
    if body.is_empty() {
        return Ok(false);
    }
    let total = body.split(|b| *b == b'\n').count();
    if total <= max_lines {
        return Ok(false);
    }

    let mut kept = body
        .split(|b| *b == b'\n')
        .skip(total - max_lines)
        .collect::<Vec<_>>()
        .join(&b'\n');
    kept.push(b'\n');

    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(&kept)?;
    file.sync_all()?;
    log::info!(
        "Truncated {} from {} to {} lines",
        path.display(),
        total,
        max_lines
    );
    Ok(true)
}
