//! Outcome recording.
//!
//! Every finished session is appended to a CSV log. Each record is formatted
//! in full and written with a single `write_all` on a blocking thread, so a
//! cancelled caller never leaves half a line behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dialfarm_core::error::ApiError;
use dialfarm_core::outcome::{OutcomeRecord, CSV_HEADER};
use tokio::sync::Mutex;

/// Append-only destination for outcome records.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn record(&self, record: &OutcomeRecord) -> Result<(), ApiError>;
}

/// [`OutcomeSink`] writing to a CSV file, header included on first write.
pub struct CsvRecorder {
    path: PathBuf,
    /// Serializes appends so the header check and write are not interleaved.
    lock: Mutex<()>,
}

impl CsvRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutcomeSink for CsvRecorder {
    async fn record(&self, record: &OutcomeRecord) -> Result<(), ApiError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let line = record.to_csv_line();

        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|e| ApiError::internal(format!("Outcome writer task failed: {}", e)))?
            .map_err(|e| {
                ApiError::internal(format!(
                    "Failed to append to '{}': {}",
                    self.path.display(),
                    e
                ))
            })
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut buf = String::new();
    if file.metadata()?.len() == 0 {
        buf.push_str(CSV_HEADER);
        buf.push('\n');
    }
    buf.push_str(line);
    file.write_all(buf.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialfarm_core::device::DeviceId;
    use dialfarm_core::outcome::Status;

    fn record(device: &str, status: Status) -> OutcomeRecord {
        OutcomeRecord {
            device: DeviceId::from(device),
            status,
            duration_secs: 4.0,
            timestamp: "2026-10-16 09:30:00".to_string(),
            detail: None,
        }
    }

    #[tokio::test]
    async fn header_written_once() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = CsvRecorder::new(tmp.path().join("logs").join("outcomes.csv"));

        recorder.record(&record("a", Status::Dialed)).await.unwrap();
        recorder.record(&record("b", Status::Failed)).await.unwrap();

        let text = std::fs::read_to_string(recorder.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "a,Dialed,4.00,2026-10-16 09:30:00,");
        assert_eq!(lines[2], "b,Failed,4.00,2026-10-16 09:30:00,");
    }

    #[tokio::test]
    async fn appends_to_existing_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("outcomes.csv");
        std::fs::write(&path, format!("{}\nold,Launched,1.00,x,\n", CSV_HEADER)).unwrap();

        let recorder = CsvRecorder::new(&path);
        recorder
            .record(&record("new", Status::AlreadyRunning))
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(CSV_HEADER).count(), 1);
        assert!(text.ends_with("new,Already Running,4.00,2026-10-16 09:30:00,\n"));
    }

    #[tokio::test]
    async fn concurrent_records_never_interleave() {
        let tmp = tempfile::tempdir().unwrap();
        let recorder = std::sync::Arc::new(CsvRecorder::new(tmp.path().join("outcomes.csv")));

        let mut handles = Vec::new();
        for i in 0..16 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                recorder
                    .record(&record(&format!("dev{}", i), Status::Dialed))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let text = std::fs::read_to_string(recorder.path()).unwrap();
        assert_eq!(text.lines().count(), 17);
        assert!(text.lines().skip(1).all(|l| l.split(',').count() == 5));
    }

    #[tokio::test]
    async fn unwritable_path_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the file should be.
        let recorder = CsvRecorder::new(tmp.path());
        let err = recorder.record(&record("a", Status::Dialed)).await.unwrap_err();
        assert!(err.message.contains("Failed to append"));
    }
}
