//! CallMessage - Dispatcher input
//!
//! One unit of outbound work handed over by the log consumer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Caller-supplied request headers (name -> values)
pub type Headers = BTreeMap<String, Vec<String>>;

/// A message to be POSTed to a downstream endpoint
///
/// Ownership moves into the delivery task on dispatch, so no two attempts
/// ever share a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMessage {
    /// Topic the message was read from (stats key)
    pub topic: String,

    /// Destination endpoint
    pub url: String,

    /// Opaque payload
    #[serde(default)]
    pub data: Bytes,

    /// Request headers
    #[serde(default)]
    pub headers: Headers,
}

impl CallMessage {
    /// Create a message without headers
    pub fn new(topic: impl Into<String>, url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            url: url.into(),
            data: data.into(),
            headers: Headers::new(),
        }
    }

    /// Append a header value
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Short identity used in log lines; never prints the payload
impl fmt::Display for CallMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic={} url={} bytes={}",
            self.topic,
            self.url,
            self.data.len()
        )
    }
}
