//! Outbound message boundary.
//!
//! The router never talks to a transport directly; it hands rendered
//! text to a [`Sender`]. Adapters implement this trait on top of their
//! wire protocol.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SendError;
use crate::event::Target;

/// Maximum number of characters in one outbound message.
///
/// Longer text is cut at this length and [`TRUNCATION_MARKER`] is
/// appended. The limit is deliberately a fixed constant rather than
/// configuration; adapters that need a tighter platform limit apply
/// their own on top.
pub const MAX_OUTBOUND_CHARS: usize = 4096;

/// Appended to outbound text that was cut at [`MAX_OUTBOUND_CHARS`].
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Literal token adapters substitute for image content when degrading a
/// rich message to plain text.
pub const IMAGE_PLACEHOLDER: &str = "[image]";

/// Opaque identifier of a sent message, as reported by the transport.
pub type MessageId = String;

/// The outbound half of the transport boundary.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    /// Sends rendered text to a target and returns the transport's
    /// message id.
    async fn send(&self, target: Target, text: &str) -> Result<MessageId, SendError>;
}

/// A shared sender handle.
pub type BoxedSender = Arc<dyn Sender>;

/// Renders text for sending: truncates to [`MAX_OUTBOUND_CHARS`]
/// characters and appends [`TRUNCATION_MARKER`] when anything was cut.
pub fn render_outbound(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(MAX_OUTBOUND_CHARS) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(render_outbound("hello"), "hello");
    }

    #[test]
    fn exact_limit_is_not_truncated() {
        let text = "a".repeat(MAX_OUTBOUND_CHARS);
        assert_eq!(render_outbound(&text), text);
    }

    #[test]
    fn long_text_is_cut_with_marker() {
        let text = "a".repeat(MAX_OUTBOUND_CHARS + 10);
        let rendered = render_outbound(&text);
        assert_eq!(
            rendered.chars().count(),
            MAX_OUTBOUND_CHARS + TRUNCATION_MARKER.chars().count()
        );
        assert!(rendered.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(MAX_OUTBOUND_CHARS + 1);
        let rendered = render_outbound(&text);
        assert!(rendered.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            rendered.chars().filter(|&c| c == 'é').count(),
            MAX_OUTBOUND_CHARS
        );
    }
}
