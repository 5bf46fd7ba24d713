//! Helpers for locating kernel threads and reading `/proc/<pid>/io`.

use std::fs;
use std::path::{Path, PathBuf};

/// Name of the kernel thread serving the mass-storage gadget.
pub const FILE_STORAGE_COMM: &str = "file-storage";

/// Find the first process under `proc_root` whose `comm` equals `comm`.
pub fn find_pid_by_comm(proc_root: &Path, comm: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(proc_root).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let is_pid = name
            .to_str()
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        let dir = entry.path();
        if let Ok(found) = fs::read_to_string(dir.join("comm")) {
            if found.trim() == comm {
                return Some(dir);
            }
        }
    }
    None
}

/// Extract `write_bytes` from the contents of a `/proc/<pid>/io` file.
pub fn parse_write_bytes(content: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "write_bytes")
            .then(|| value.trim().parse().ok())
            .flatten()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_write_bytes() {
        let io = "rchar: 10\nwchar: 20\nread_bytes: 4096\nwrite_bytes: 8192\ncancelled_write_bytes: 0\n";
        assert_eq!(parse_write_bytes(io), Some(8192));
        assert_eq!(parse_write_bytes("rchar: 1\n"), None);
    }

    #[test]
    fn finds_file_storage_thread() {
        let root = tempdir().unwrap();
        for (pid, comm) in [("1", "init"), ("412", FILE_STORAGE_COMM), ("self", "x")] {
            let dir = root.path().join(pid);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        }
        let found = find_pid_by_comm(root.path(), FILE_STORAGE_COMM).unwrap();
        assert_eq!(found, root.path().join("412"));
        assert!(find_pid_by_comm(root.path(), "nope").is_none());
    }
}
