//! Append-only log-file writer
//!
//! Single-writer per container, matching the concurrency note in spec §5
//! ("log files are single-writer with concurrent append-consistent
//! readers").

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;

use super::{ensure_parent, LogRecord, LogStoreResult};

pub struct LogWriter {
    stdout: File,
    stderr: File,
}

impl LogWriter {
    pub fn open(stdout_path: PathBuf, stderr_path: PathBuf) -> LogStoreResult<Self> {
        ensure_parent(&stdout_path)?;
        ensure_parent(&stderr_path)?;
        let stdout = OpenOptions::new().create(true).append(true).open(stdout_path)?;
        let stderr = OpenOptions::new().create(true).append(true).open(stderr_path)?;
        Ok(Self { stdout, stderr })
    }

    pub fn write_stdout(&mut self, line: &str) -> LogStoreResult<()> {
        self.write_record(&mut None, "stdout", line)
    }

    pub fn write_stderr(&mut self, line: &str) -> LogStoreResult<()> {
        self.write_record(&mut None, "stderr", line)
    }

    fn write_record(&mut self, _unused: &mut Option<()>, stream: &str, line: &str) -> LogStoreResult<()> {
        let record = LogRecord {
            time: Utc::now(),
            stream: stream.to_string(),
            log: line.to_string(),
        };
        let mut json = serde_json::to_vec(&record)?;
        json.push(b'\n');
        match stream {
            "stdout" => self.stdout.write_all(&json)?,
            _ => self.stderr.write_all(&json)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_self_describing_json_lines() {
        let dir = tempdir().unwrap();
        let mut writer = LogWriter::open(dir.path().join("stdout.log"), dir.path().join("stderr.log")).unwrap();
        writer.write_stdout("hello").unwrap();

        let content = std::fs::read_to_string(dir.path().join("stdout.log")).unwrap();
        let record: LogRecord = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(record.stream, "stdout");
        assert_eq!(record.log, "hello");
    }
}
