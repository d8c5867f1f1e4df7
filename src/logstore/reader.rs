//! Log reader: batch read with since/until/tail filters, and follow mode.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::{LogRecord, LogStoreResult};

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// `None` means "all"
    pub tail: Option<usize>,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
}

pub struct LogReader {
    stdout_path: PathBuf,
    stderr_path: PathBuf,
}

impl LogReader {
    pub fn new(stdout_path: PathBuf, stderr_path: PathBuf) -> Self {
        Self {
            stdout_path,
            stderr_path,
        }
    }

    /// Read the matched historical window, merged across streams in
    /// timestamp order.
    pub fn read_batch(&self, query: &LogQuery) -> LogStoreResult<Vec<LogRecord>> {
        let mut records = Vec::new();
        if query.stdout {
            records.extend(read_file(&self.stdout_path)?);
        }
        if query.stderr {
            records.extend(read_file(&self.stderr_path)?);
        }
        records.sort_by_key(|r| r.time);

        records.retain(|r| {
            query.since.map(|s| r.time > s).unwrap_or(true)
                && query.until.map(|u| r.time < u).unwrap_or(true)
        });

        if let Some(tail) = query.tail {
            let total = records.len();
            if total > tail {
                records.drain(0..total - tail);
            }
        }

        Ok(records)
    }

    /// Follow mode: replay the matched window then stream newly appended
    /// records as they arrive, polling each file's length like `tail -f`.
    pub fn follow(
        &self,
        query: LogQuery,
    ) -> LogStoreResult<mpsc::Receiver<LogRecord>> {
        let (tx, rx) = mpsc::channel(256);
        let initial = self.read_batch(&query)?;
        let stdout_path = self.stdout_path.clone();
        let stderr_path = self.stderr_path.clone();

        tokio::spawn(async move {
            for record in initial {
                if tx.send(record).await.is_err() {
                    return;
                }
            }

            let mut stdout_offset = std::fs::metadata(&stdout_path).map(|m| m.len()).unwrap_or(0);
            let mut stderr_offset = std::fs::metadata(&stderr_path).map(|m| m.len()).unwrap_or(0);

            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;

                if query.stdout {
                    if let Ok((new_records, new_offset)) = read_from_offset(&stdout_path, stdout_offset) {
                        stdout_offset = new_offset;
                        for record in new_records {
                            if tx.send(record).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                if query.stderr {
                    if let Ok((new_records, new_offset)) = read_from_offset(&stderr_path, stderr_offset) {
                        stderr_offset = new_offset;
                        for record in new_records {
                            if tx.send(record).await.is_err() {
                                return;
                            }
                        }
                    }
                }

                if tx.is_closed() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

fn read_file(path: &PathBuf) -> LogStoreResult<Vec<LogRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = VecDeque::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<LogRecord>(&line) {
            records.push_back(record);
        }
    }
    Ok(records.into_iter().collect())
}

fn read_from_offset(path: &PathBuf, offset: u64) -> LogStoreResult<(Vec<LogRecord>, u64)> {
    if !path.exists() {
        return Ok((Vec::new(), offset));
    }
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len <= offset {
        return Ok((Vec::new(), offset));
    }
    file.seek(SeekFrom::Start(offset))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<LogRecord>(&line) {
            records.push(record);
        }
    }
    Ok((records, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logstore::LogWriter;
    use tempfile::tempdir;

    #[test]
    fn tail_limits_to_most_recent_n() {
        let dir = tempdir().unwrap();
        let stdout = dir.path().join("stdout.log");
        let stderr = dir.path().join("stderr.log");
        let mut writer = LogWriter::open(stdout.clone(), stderr.clone()).unwrap();
        for i in 0..5 {
            writer.write_stdout(&format!("line {i}")).unwrap();
        }

        let reader = LogReader::new(stdout, stderr);
        let records = reader
            .read_batch(&LogQuery {
                stdout: true,
                stderr: false,
                tail: Some(2),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].log, "line 3");
        assert_eq!(records[1].log, "line 4");
    }
}
