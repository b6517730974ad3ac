use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use huap_types::TraceEvent;

/// A destination for trace events. Errors are swallowed at the call site
/// (tracing must never abort the run it is observing) — implementations
/// return a `Result` only so the service can log the failure once.
pub trait TraceSink {
    fn write(&mut self, event: &TraceEvent) -> std::io::Result<()>;
    fn flush(&mut self) -> std::io::Result<()>;
    fn event_count(&self) -> u64;
}

/// JSONL sink with flush-after-every-write durability and size-based
/// rotation.
pub struct TraceWriter {
    path: PathBuf,
    max_size_bytes: Option<u64>,
    auto_flush: bool,
    file: Option<BufWriter<File>>,
    event_count: u64,
    bytes_written: u64,
}

impl TraceWriter {
    pub fn new(path: impl Into<PathBuf>, max_size_mb: Option<f64>, auto_flush: bool) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            max_size_bytes: max_size_mb.map(|mb| (mb * 1024.0 * 1024.0) as u64),
            auto_flush,
            file: None,
            event_count: 0,
            bytes_written: 0,
        })
    }

    fn ensure_open(&mut self) -> std::io::Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            tracing::debug!(path = %self.path.display(), "opened trace file");
            self.file = Some(BufWriter::new(file));
        }
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let rotated = self.path.with_extension(format!("{timestamp}.jsonl"));
        std::fs::rename(&self.path, &rotated)?;
        tracing::info!(rotated = %rotated.display(), "rotated trace file");
        self.bytes_written = 0;
        self.ensure_open()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for TraceWriter {
    fn write(&mut self, event: &TraceEvent) -> std::io::Result<()> {
        self.ensure_open()?;
        if let Some(max) = self.max_size_bytes {
            if self.bytes_written >= max {
                self.rotate()?;
            }
        }
        let mut line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let file = self.file.as_mut().expect("ensure_open just set this");
        file.write_all(line.as_bytes())?;
        self.bytes_written += line.len() as u64;
        self.event_count += 1;
        if self.auto_flush {
            file.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn event_count(&self) -> u64 {
        self.event_count
    }
}

/// No-op sink for disabled tracing.
#[derive(Default)]
pub struct NullSink {
    event_count: u64,
}

impl TraceSink for NullSink {
    fn write(&mut self, _event: &TraceEvent) -> std::io::Result<()> {
        self.event_count += 1;
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn event_count(&self) -> u64 {
        self.event_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huap_types::{EventName, RunId, SpanId};
    use serde_json::Map;

    fn sample_event() -> TraceEvent {
        TraceEvent::new(RunId::new(), SpanId::new(), None, EventName::RunStart, Map::new())
    }

    #[test]
    fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.trace.jsonl");
        let mut writer = TraceWriter::new(&path, None, true).unwrap();
        writer.write(&sample_event()).unwrap();
        writer.write(&sample_event()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn tolerates_reopen_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.trace.jsonl");
        {
            let mut writer = TraceWriter::new(&path, None, true).unwrap();
            writer.write(&sample_event()).unwrap();
        }
        let mut writer = TraceWriter::new(&path, None, true).unwrap();
        writer.write(&sample_event()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn null_sink_counts_without_writing_files() {
        let mut sink = NullSink::default();
        sink.write(&sample_event()).unwrap();
        assert_eq!(sink.event_count(), 1);
    }
}
