//! Burp Suite XML export parsing.
//!
//! ```xml
//! <items burpVersion="2023.1">
//!   <item>
//!     <url><![CDATA[https://host/api/widgets/abc-123]]></url>
//!     <host ip="10.0.0.1">host</host>
//!     <path><![CDATA[/api/widgets/abc-123]]></path>
//!     <request base64="true"><![CDATA[R0VUIC8...]]></request>
//!     ...
//!   </item>
//! </items>
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, warn};

use super::{Host, Message, TrafficHistory, TrafficItem};
use crate::CorrelatorError;

impl TrafficHistory {
    /// Parses the text of a Burp Suite XML export.
    ///
    /// Items keep their document order and are indexed from zero. Missing elements are
    /// read as empty strings. With `decode_base64`, every message body is decoded; a message
    /// that fails to decode keeps no body and the rest of the history is still read.
    ///
    /// # Errors
    ///
    /// Fails if the text is not well-formed XML or its root element is not `<items>`.
    pub fn from_burp_xml(text: &str, decode_base64: bool) -> Result<Self, CorrelatorError> {
        // exports carry an inline DOCTYPE
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let document = Document::parse_with_options(text, options)?;

        let root = document.root_element();
        if !root.has_tag_name("items") {
            return Err(CorrelatorError::UnexpectedRoot {
                found: root.tag_name().name().to_string(),
            });
        }

        let items: Vec<_> = root
            .children()
            .filter(|node| node.has_tag_name("item"))
            .enumerate()
            .map(|(index, node)| parse_item(index, node, decode_base64))
            .collect();
        debug!(count = items.len(), "traffic history loaded");

        Ok(Self::new(items))
    }
}

fn parse_item(index: usize, node: Node<'_, '_>, decode_base64: bool) -> TrafficItem {
    let host = child(node, "host");

    TrafficItem {
        index,
        time: child_text(node, "time"),
        url: child_text(node, "url"),
        host: Host {
            ip: host
                .and_then(|host| host.attribute("ip"))
                .unwrap_or_default()
                .to_string(),
            name: host.map(text_of).unwrap_or_default(),
        },
        port: child_text(node, "port"),
        protocol: child_text(node, "protocol"),
        method: child_text(node, "method"),
        path: child_text(node, "path"),
        extension: child_text(node, "extension"),
        request: parse_message(index, child(node, "request"), decode_base64),
        status: child_text(node, "status"),
        response_length: child_text(node, "responselength"),
        mime_type: child_text(node, "mimetype"),
        response: parse_message(index, child(node, "response"), decode_base64),
        comment: child_text(node, "comment"),
    }
}

fn parse_message(index: usize, node: Option<Node<'_, '_>>, decode_base64: bool) -> Message {
    let Some(node) = node else {
        return Message::default();
    };

    let base64 = node.attribute("base64") == Some("true");
    let raw = text_of(node);
    let body = match (decode_base64, base64) {
        (false, _) => None,
        (true, false) => Some(raw.clone().into_bytes()),
        (true, true) => decode(index, &raw),
    };

    Message { base64, raw, body }
}

fn decode(index: usize, raw: &str) -> Option<Vec<u8>> {
    let compact: String = raw.split_whitespace().collect();
    match STANDARD.decode(compact) {
        Ok(bytes) => Some(bytes),
        Err(error) => {
            warn!(index, %error, "could not decode base64 message, leaving it undecoded");
            None
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn child_text(node: Node<'_, '_>, tag: &str) -> String {
    child(node, tag).map(text_of).unwrap_or_default()
}

/// Concatenated text and CDATA content of an element.
fn text_of(node: Node<'_, '_>) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect()
}
