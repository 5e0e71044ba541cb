//! Captured HTTP traffic.
//!
//! A [`TrafficHistory`] is the ordered list of request/response pairs exported from an
//! intercepting proxy. Items are read once, rewritten by the substitution phase, and the
//! correlated subset is serialized back out as JSON.

mod burp;

use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::CorrelatorError;

/// The host an item was sent to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Host {
    /// Resolved IP address, as captured.
    pub ip: String,
    /// Host name.
    pub name: String,
}

/// A request or response message.
///
/// `raw` is the text exactly as captured, base64 encoded when `base64` is set.
/// `body` holds the decoded bytes when the history was loaded with base64 decoding; it is
/// emitted as (lossy) UTF-8 text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Whether the capture stored this message base64 encoded.
    pub base64: bool,
    /// Captured text.
    pub raw: String,
    /// Decoded bytes.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_lossy"
    )]
    pub body: Option<Vec<u8>>,
}

#[allow(clippy::ref_option)]
fn serialize_lossy<S>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match body {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

impl Message {
    /// Creates a plain-text message.
    pub fn plain(raw: impl Into<String>) -> Self {
        Self {
            base64: false,
            raw: raw.into(),
            body: None,
        }
    }

    /// Creates a base64 encoded message with its decoded body.
    pub fn encoded(body: impl AsRef<[u8]>) -> Self {
        let body = body.as_ref();
        Self {
            base64: true,
            raw: STANDARD.encode(body),
            body: Some(body.to_vec()),
        }
    }

    /// The text targeted by rewriting: the decoded body in base64 mode, the raw text otherwise.
    ///
    /// Bytes of the body that are not UTF-8 are shown as `U+FFFD`.
    pub fn text(&self, base64_mode: bool) -> Option<Cow<'_, str>> {
        if base64_mode {
            self.body.as_deref().map(String::from_utf8_lossy)
        } else {
            Some(Cow::Borrowed(&self.raw))
        }
    }

    /// Rewrites the targeted text, if available.
    ///
    /// In base64 mode the raw text of an encoded message is re-encoded from the new body.
    /// Only the leading UTF-8 lines of the body are rewritten; from the first line holding
    /// bytes that are not UTF-8 on, the body is kept byte for byte.
    pub fn map_text(&mut self, base64_mode: bool, rewrite: impl FnOnce(&str) -> String) {
        if !base64_mode {
            self.raw = rewrite(&self.raw);
            return;
        }

        let Some(body) = self.body.as_deref() else {
            return;
        };
        let (text, tail) = split_text(body);
        if !tail.is_empty() {
            if text.is_empty() {
                warn!(len = tail.len(), "message body is not text, leaving it unchanged");
                return;
            }
            debug!(len = tail.len(), "keeping binary tail of message body unchanged");
        }

        let mut body = rewrite(text).into_bytes();
        body.extend_from_slice(tail);
        self.raw = if self.base64 {
            STANDARD.encode(&body)
        } else {
            String::from_utf8_lossy(&body).into_owned()
        };
        self.body = Some(body);
    }
}

/// Splits bytes into their leading UTF-8 lines and the remainder.
fn split_text(bytes: &[u8]) -> (&str, &[u8]) {
    let valid = match std::str::from_utf8(bytes) {
        Ok(text) => return (text, &[]),
        Err(error) => error.valid_up_to(),
    };

    let (prefix, _) = bytes.split_at(valid);
    let end = prefix
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |position| position + 1);
    let (head, tail) = bytes.split_at(end);
    match std::str::from_utf8(head) {
        Ok(text) => (text, tail),
        Err(_) => ("", bytes),
    }
}

/// One captured request/response pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficItem {
    /// Position in the original capture.
    pub index: usize,
    /// Capture time, as exported.
    pub time: String,
    /// Full display URL.
    pub url: String,
    /// Target host.
    pub host: Host,
    /// Target port.
    pub port: String,
    /// `http` or `https`.
    pub protocol: String,
    /// HTTP method.
    pub method: String,
    /// Request path, including any query string.
    pub path: String,
    /// File extension guessed by the proxy.
    pub extension: String,
    /// The request message.
    pub request: Message,
    /// Response status code.
    pub status: String,
    /// Response length.
    pub response_length: String,
    /// Response MIME type.
    pub mime_type: String,
    /// The response message.
    pub response: Message,
    /// Operator comment.
    pub comment: String,
}

impl TrafficItem {
    /// Creates an item with a path and a request, the rest left empty.
    pub fn new(index: usize, path: impl Into<String>, request: Message) -> Self {
        Self {
            index,
            path: path.into(),
            request,
            ..Self::default()
        }
    }
}

/// Ordered traffic history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficHistory {
    items: Vec<TrafficItem>,
}

impl TrafficHistory {
    /// Creates a history from items, keeping their order.
    pub fn new(items: Vec<TrafficItem>) -> Self {
        Self { items }
    }

    /// Reads a Burp Suite XML export.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a Burp export.
    pub fn load(path: impl AsRef<Path>, decode_base64: bool) -> Result<Self, CorrelatorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|error| CorrelatorError::io(path.display().to_string(), error))?;
        Self::from_burp_xml(&text, decode_base64)
    }

    /// The items in capture order.
    pub fn items(&self) -> &[TrafficItem] {
        &self.items
    }

    /// Returns the item at a position of this history.
    pub fn get(&self, index: usize) -> Option<&TrafficItem> {
        self.items.get(index)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Checks if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Writes the history as `{"items": [...]}` JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the writer fails.
    pub fn write_json(&self, mut writer: impl Write) -> Result<(), CorrelatorError> {
        serde_json::to_writer(&mut writer, self)?;
        writer
            .write_all(b"\n")
            .map_err(|error| CorrelatorError::io("output", error))
    }
}

impl FromIterator<TrafficItem> for TrafficHistory {
    fn from_iter<I: IntoIterator<Item = TrafficItem>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
