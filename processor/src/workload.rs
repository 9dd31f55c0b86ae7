use std::fs;
use std::path::Path;

use scheduler::{Pid, ProcessEntity, Ticks};
use tracing::warn;

/// One simulated tick per this many bytes of file content.
pub const BYTES_PER_TICK: u64 = 100;

/// Burst used when a file's size cannot be read.
pub const FALLBACK_BURST: Ticks = 5;

/// Estimates the burst time of a file from its size, at least one tick.
pub fn estimate_burst(path: &Path) -> Ticks {
    match fs::metadata(path) {
        Ok(meta) => (meta.len() / BYTES_PER_TICK).max(1),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cannot read file size, using fallback burst");
            FALLBACK_BURST
        }
    }
}

/// Builds one process per file, all arriving at `arrival`.
///
/// PIDs are assigned in order starting at `first_pid`.
pub fn workload_from_files<P: AsRef<Path>>(files: &[P], arrival: Ticks, first_pid: Pid) -> Vec<ProcessEntity> {
    files
        .iter()
        .enumerate()
        .map(|(offset, path)| {
            let path = path.as_ref();
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            ProcessEntity::new(first_pid + offset, filename, arrival, estimate_burst(path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn burst_follows_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.txt");
        let large = dir.path().join("large.txt");
        fs::write(&small, "tiny").unwrap();
        fs::write(&large, vec![b'a'; 450]).unwrap();

        let processes = workload_from_files(&[&small, &large], 3, Pid::new(7));

        assert_eq!(processes[0].pid, 7);
        assert_eq!(processes[0].filename, "small.txt");
        assert_eq!(processes[0].burst_time, 1);
        assert_eq!(processes[1].pid, 8);
        assert_eq!(processes[1].burst_time, 4);
        assert!(processes.iter().all(|p| p.arrival_time == 3));
    }

    #[test]
    fn missing_file_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(estimate_burst(&dir.path().join("gone.txt")), FALLBACK_BURST);
    }
}
