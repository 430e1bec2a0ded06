//! Serialising output records as JSON lines or a JSON array.

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

use imgflow_core::OutputRecord;
use serde::Serialize;

use super::types::OutputFormat;

/// Compact view of a record: everything except the tensor bytes.
#[derive(Debug, Serialize)]
struct RecordLine<'a> {
    id: u32,
    err_code: i32,
    #[serde(skip_serializing_if = "is_blank")]
    err_message: &'a str,
    shape: &'a [i32],
    label: Cow<'a, str>,
    data_len: usize,
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

impl<'a> From<&'a OutputRecord> for RecordLine<'a> {
    fn from(record: &'a OutputRecord) -> Self {
        Self {
            id: record.id,
            err_code: record.err_code,
            err_message: &record.err_message,
            shape: &record.shape,
            label: String::from_utf8_lossy(&record.label),
            data_len: record.data.len(),
        }
    }
}

/// Writes records to any `Write` in the selected format.
pub struct RecordSink<W: Write> {
    writer: W,
    format: OutputFormat,
    embed_data: bool,
    tensor_dir: Option<PathBuf>,
    written: u64,
}

impl<W: Write> RecordSink<W> {
    pub fn new(writer: W, format: OutputFormat, embed_data: bool) -> Self {
        Self {
            writer,
            format,
            embed_data,
            tensor_dir: None,
            written: 0,
        }
    }

    /// Also write the raw bytes of successful records to `<dir>/<id>.bin`.
    pub fn with_tensor_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.tensor_dir = dir;
        self
    }

    pub fn write(&mut self, record: &OutputRecord) -> anyhow::Result<()> {
        let json = if self.embed_data {
            serde_json::to_string(record)?
        } else {
            serde_json::to_string(&RecordLine::from(record))?
        };

        match self.format {
            OutputFormat::Jsonl => writeln!(self.writer, "{}", json)?,
            OutputFormat::Json => {
                let sep = if self.written == 0 { "[\n  " } else { ",\n  " };
                write!(self.writer, "{}{}", sep, json)?;
            }
        }
        self.written += 1;

        if let Some(dir) = &self.tensor_dir {
            if record.is_ok() {
                write_tensor(dir, record)?;
            }
        }
        Ok(())
    }

    /// Close the JSON array if needed and flush.
    pub fn finish(mut self) -> anyhow::Result<W> {
        if self.format == OutputFormat::Json {
            if self.written == 0 {
                writeln!(self.writer, "[]")?;
            } else {
                writeln!(self.writer, "\n]")?;
            }
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn write_tensor(dir: &Path, record: &OutputRecord) -> std::io::Result<()> {
    std::fs::write(dir.join(format!("{}.bin", record.id)), &record.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, ok: bool) -> OutputRecord {
        OutputRecord {
            id,
            err_code: if ok { 0 } else { 1011 },
            err_message: if ok { String::new() } else { "bad".to_string() },
            shape: if ok { vec![1, 1, 3] } else { Vec::new() },
            label: b"cat".to_vec(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_jsonl_lines() {
        let mut sink = RecordSink::new(Vec::new(), OutputFormat::Jsonl, false);
        sink.write(&record(1, true)).unwrap();
        sink.write(&record(2, false)).unwrap();
        let out = String::from_utf8(sink.finish().unwrap()).unwrap();

        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["shape"], serde_json::json!([1, 1, 3]));
        assert_eq!(lines[0]["label"], "cat");
        assert_eq!(lines[0]["data_len"], 3);
        assert!(lines[0].get("err_message").is_none());
        assert_eq!(lines[1]["err_code"], 1011);
        assert_eq!(lines[1]["err_message"], "bad");
    }

    #[test]
    fn test_json_array_is_valid() {
        let mut sink = RecordSink::new(Vec::new(), OutputFormat::Json, true);
        sink.write(&record(1, true)).unwrap();
        sink.write(&record(2, true)).unwrap();
        let out = sink.finish().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["data"], "AQID");
    }

    #[test]
    fn test_empty_json_array() {
        let sink = RecordSink::new(Vec::new(), OutputFormat::Json, false);
        let out = sink.finish().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_tensor_dir_only_gets_successes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RecordSink::new(Vec::new(), OutputFormat::Jsonl, false)
            .with_tensor_dir(Some(dir.path().to_path_buf()));
        sink.write(&record(7, true)).unwrap();
        sink.write(&record(8, false)).unwrap();
        assert_eq!(std::fs::read(dir.path().join("7.bin")).unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join("8.bin").exists());
    }
}
