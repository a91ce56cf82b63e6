//! JSON-lines message source.
//!
//! Each non-empty line is one record:
//! `{"topic": "...", "url": "...", "data": "...", "headers": {"name": ["value"]}}`.
//! Lines that fail to parse are logged and skipped.

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, warn};

use contracts::{CallMessage, ContractError, Headers, MessageSource};

/// One input line
#[derive(Debug, Deserialize)]
struct FeedRecord {
    topic: String,
    url: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    headers: Headers,
}

impl From<FeedRecord> for CallMessage {
    fn from(record: FeedRecord) -> Self {
        let mut message = CallMessage::new(record.topic, record.url, record.data.into_bytes());
        message.headers = record.headers;
        message
    }
}

/// Reads `CallMessage`s from a JSON-lines stream
pub struct JsonLinesSource<R> {
    name: String,
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
    committed: u64,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
            committed: 0,
        }
    }

    /// Lines skipped because they did not parse
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Last line number covered by `commit`
    pub fn committed(&self) -> u64 {
        self.committed
    }
}

impl<R: AsyncBufRead + Unpin + Send> MessageSource for JsonLinesSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<Option<CallMessage>, ContractError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ContractError::source_read(&self.name, e.to_string()))?;

            let Some(line) = line else {
                return Ok(None);
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<FeedRecord>(line) {
                Ok(record) => return Ok(Some(record.into())),
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        source = %self.name,
                        line = self.line_no,
                        error = %e,
                        "Skipping malformed input line"
                    );
                }
            }
        }
    }

    async fn commit(&mut self) -> Result<(), ContractError> {
        self.committed = self.line_no;
        debug!(source = %self.name, line = self.committed, "Input committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_records_and_skips_bad_lines() {
        let input: &[u8] = br#"{"topic":"orders","url":"http://localhost/a","data":"hello","headers":{"X-Id":["1"]}}

not json
{"topic":"refunds","url":"http://localhost/b"}
"#;
        let mut source = JsonLinesSource::new("test", input);

        let first = source.poll().await.unwrap().unwrap();
        assert_eq!(first.topic, "orders");
        assert_eq!(first.data.as_ref(), b"hello");
        assert_eq!(first.headers["X-Id"], vec!["1".to_string()]);

        let second = source.poll().await.unwrap().unwrap();
        assert_eq!(second.topic, "refunds");
        assert!(second.is_empty());

        assert!(source.poll().await.unwrap().is_none());
        assert_eq!(source.skipped(), 1);

        source.commit().await.unwrap();
        assert_eq!(source.committed(), 4);
    }
}
