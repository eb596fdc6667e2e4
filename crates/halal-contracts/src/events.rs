use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Append-only JSONL log for one session.
///
/// Every line carries `type`, `session_id`, `seq` and `ts`. Object payloads
/// are merged on top of those keys; any other non-null payload is stored
/// under `data`. `seq` follows file order.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    session_id: String,
    seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), session_id.into())
    }

    /// Builds events without writing them anywhere.
    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self::build(None, session_id.into())
    }

    fn build(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                session_id,
                seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: Value) -> anyhow::Result<Value> {
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("seq".to_string(), Value::from(seq));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        match payload {
            Value::Object(fields) => event.extend(fields),
            Value::Null => {}
            other => {
                event.insert("data".to_string(), other);
            }
        }
        let event = Value::Object(event);

        if let Some(path) = self.inner.path.as_ref() {
            append_line(path, &event)?;
        }
        Ok(event)
    }
}

fn append_line(path: &Path, event: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    fn read_lines(path: &Path) -> anyhow::Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }

    #[test]
    fn emit_writes_one_compact_line_per_event() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit("lookup_started", json!({ "query": "Nutella" }))?;
        writer.emit("lookup_failed", json!({ "kind": "oracle" }))?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], emitted);
        assert_eq!(lines[0]["session_id"], json!("session-123"));
        assert_eq!(lines[0]["query"], json!("Nutella"));
        assert_eq!(lines[1]["type"], json!("lookup_failed"));
        assert_eq!(lines[1]["seq"], json!(1));

        let ts = lines[0]["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn object_payload_can_override_defaults() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("session-123");
        let emitted = writer.emit("session_started", json!({ "type": "override" }))?;
        assert_eq!(emitted["type"], json!("override"));
        assert_eq!(emitted["session_id"], json!("session-123"));
        Ok(())
    }

    #[test]
    fn scalar_payload_is_nested_under_data() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("quiet");
        assert_eq!(writer.emit("note", json!("hi"))?["data"], json!("hi"));
        assert!(writer.emit("note", Value::Null)?.get("data").is_none());
        Ok(())
    }

    #[test]
    fn disabled_writer_still_counts_events() -> anyhow::Result<()> {
        let writer = EventWriter::disabled("quiet");
        writer.emit("favorite_toggled", Value::Null)?;
        let second = writer.clone().emit("favorite_toggled", Value::Null)?;
        assert_eq!(second["seq"], json!(1));
        assert!(writer.path().is_none());
        Ok(())
    }
}
