use serde::{Deserialize, Serialize};

use super::fingerprint::{ContentFingerprint, fingerprint_attachment, fingerprint_text};

const COMMAND_PREFIX: char = '/';
const LINK_MARKERS: [&str; 3] = ["http://", "https://", "www."];
const MENTION_MARKER: char = '@';

/// Kind of non-text attachment as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Static image sticker.
    Sticker,
    AnimatedSticker,
    VideoSticker,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Sticker => "sticker",
            AttachmentKind::AnimatedSticker => "animated_sticker",
            AttachmentKind::VideoSticker => "video_sticker",
        }
    }
}

/// Message body, discriminated once at the platform boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Attachment {
        attachment_kind: AttachmentKind,
        /// Platform id that stays the same for the same file across uploads.
        stable_unique_id: String,
        /// Id usable to re-send the file.
        transfer_id: String,
    },
}

/// A single inbound chat message as seen by the repeat engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    /// Sent by the bot's own account.
    pub is_self: bool,
    pub chat_is_group: bool,
    pub content: MessageContent,
}

impl InboundMessage {
    /// Group text message from a regular user.
    pub fn group_text(chat_id: i64, sender_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender_id,
            is_self: false,
            chat_is_group: true,
            content: MessageContent::Text { text: text.into() },
        }
    }

    /// Group attachment message from a regular user.
    pub fn group_attachment(
        chat_id: i64,
        sender_id: i64,
        attachment_kind: AttachmentKind,
        stable_unique_id: impl Into<String>,
        transfer_id: impl Into<String>,
    ) -> Self {
        Self {
            chat_id,
            sender_id,
            is_self: false,
            chat_is_group: true,
            content: MessageContent::Attachment {
                attachment_kind,
                stable_unique_id: stable_unique_id.into(),
                transfer_id: transfer_id.into(),
            },
        }
    }
}

/// What to send back into the chat when the engine decides to join in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EchoPayload {
    /// Trimmed text, re-sent verbatim.
    Text { text: String },
    Attachment {
        attachment_kind: AttachmentKind,
        stable_unique_id: String,
        transfer_id: String,
    },
}

/// A message that passed the eligibility filter, with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub chat_id: i64,
    pub user_id: i64,
    pub fingerprint: ContentFingerprint,
    pub payload: EchoPayload,
}

/// Why a message was not considered for repetition tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotGroupChat,
    OwnMessage,
    Command,
    TooShort,
    TooLong,
    ContainsLink,
    ContainsMention,
    UnsupportedAttachment(AttachmentKind),
}

/// Decides whether a message is a candidate for repetition tracking.
///
/// Rules are checked in order and the first match rejects. Text length is
/// measured in characters after trimming.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    min_text_length: usize,
    max_text_length: usize,
    attachment_kinds: Vec<AttachmentKind>,
}

impl EligibilityFilter {
    pub fn new(
        min_text_length: usize,
        max_text_length: usize,
        attachment_kinds: Vec<AttachmentKind>,
    ) -> Self {
        Self {
            min_text_length,
            max_text_length,
            attachment_kinds,
        }
    }

    pub fn check(&self, msg: &InboundMessage) -> Result<Candidate, Rejection> {
        if !msg.chat_is_group {
            return Err(Rejection::NotGroupChat);
        }
        if msg.is_self {
            return Err(Rejection::OwnMessage);
        }

        let (fingerprint, payload) = match &msg.content {
            MessageContent::Text { text } => {
                let text = self.check_text(text)?;
                (
                    fingerprint_text(text),
                    EchoPayload::Text {
                        text: text.to_string(),
                    },
                )
            }
            MessageContent::Attachment {
                attachment_kind,
                stable_unique_id,
                transfer_id,
            } => {
                if !self.attachment_kinds.contains(attachment_kind) {
                    return Err(Rejection::UnsupportedAttachment(*attachment_kind));
                }
                (
                    fingerprint_attachment(stable_unique_id),
                    EchoPayload::Attachment {
                        attachment_kind: *attachment_kind,
                        stable_unique_id: stable_unique_id.clone(),
                        transfer_id: transfer_id.clone(),
                    },
                )
            }
        };

        Ok(Candidate {
            chat_id: msg.chat_id,
            user_id: msg.sender_id,
            fingerprint,
            payload,
        })
    }

    /// Returns the trimmed text when it is repeatable.
    fn check_text<'a>(&self, text: &'a str) -> Result<&'a str, Rejection> {
        let text = text.trim();
        if text.starts_with(COMMAND_PREFIX) {
            return Err(Rejection::Command);
        }
        let len = text.chars().count();
        if len < self.min_text_length {
            return Err(Rejection::TooShort);
        }
        if len > self.max_text_length {
            return Err(Rejection::TooLong);
        }
        if LINK_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(Rejection::ContainsLink);
        }
        if text.contains(MENTION_MARKER) {
            return Err(Rejection::ContainsMention);
        }
        Ok(text)
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new(2, 100, vec![AttachmentKind::Sticker])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeat::fingerprint::ContentClass;

    fn filter() -> EligibilityFilter {
        EligibilityFilter::default()
    }

    #[test]
    fn accepts_plain_group_text() {
        let c = filter()
            .check(&InboundMessage::group_text(42, 7, "  hello  "))
            .unwrap();
        assert_eq!(c.chat_id, 42);
        assert_eq!(c.user_id, 7);
        assert_eq!(c.fingerprint, fingerprint_text("hello"));
        assert_eq!(
            c.payload,
            EchoPayload::Text {
                text: "hello".into()
            }
        );
    }

    #[test]
    fn rejects_private_chat() {
        let mut msg = InboundMessage::group_text(42, 7, "hello");
        msg.chat_is_group = false;
        assert_eq!(filter().check(&msg), Err(Rejection::NotGroupChat));
    }

    #[test]
    fn rejects_own_message() {
        let mut msg = InboundMessage::group_text(42, 7, "hello");
        msg.is_self = true;
        assert_eq!(filter().check(&msg), Err(Rejection::OwnMessage));
    }

    #[test]
    fn group_check_precedes_self_check() {
        let mut msg = InboundMessage::group_text(42, 7, "hello");
        msg.is_self = true;
        msg.chat_is_group = false;
        assert_eq!(filter().check(&msg), Err(Rejection::NotGroupChat));
    }

    #[test]
    fn rejects_commands() {
        let msg = InboundMessage::group_text(42, 7, "/start");
        assert_eq!(filter().check(&msg), Err(Rejection::Command));
        // Leading whitespace does not hide a command.
        let msg = InboundMessage::group_text(42, 7, "  /help me");
        assert_eq!(filter().check(&msg), Err(Rejection::Command));
    }

    #[test]
    fn length_bounds_are_inclusive() {
        let f = filter();
        assert_eq!(
            f.check(&InboundMessage::group_text(1, 1, "a")),
            Err(Rejection::TooShort)
        );
        assert_eq!(
            f.check(&InboundMessage::group_text(1, 1, "   ")),
            Err(Rejection::TooShort)
        );
        assert!(f.check(&InboundMessage::group_text(1, 1, "ab")).is_ok());
        assert!(f.check(&InboundMessage::group_text(1, 1, "x".repeat(100))).is_ok());
        assert_eq!(
            f.check(&InboundMessage::group_text(1, 1, "x".repeat(101))),
            Err(Rejection::TooLong)
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 2 chars, 6 bytes
        assert!(
            filter()
                .check(&InboundMessage::group_text(1, 1, "草草"))
                .is_ok()
        );
        // 100 chars, 300 bytes
        assert!(
            filter()
                .check(&InboundMessage::group_text(1, 1, "草".repeat(100)))
                .is_ok()
        );
    }

    #[test]
    fn rejects_links() {
        let f = filter();
        for text in ["check http://x.co", "https://example.com", "see www.example"] {
            assert_eq!(
                f.check(&InboundMessage::group_text(1, 1, text)),
                Err(Rejection::ContainsLink),
                "{text}"
            );
        }
    }

    #[test]
    fn rejects_mentions() {
        assert_eq!(
            filter().check(&InboundMessage::group_text(1, 1, "hi @alice")),
            Err(Rejection::ContainsMention)
        );
        assert_eq!(
            filter().check(&InboundMessage::group_text(1, 1, "me@mail.com")),
            Err(Rejection::ContainsMention)
        );
    }

    #[test]
    fn accepts_configured_attachment_kind() {
        let msg = InboundMessage::group_attachment(42, 7, AttachmentKind::Sticker, "abc", "file-1");
        let c = filter().check(&msg).unwrap();
        assert_eq!(c.fingerprint, fingerprint_attachment("abc"));
        assert_eq!(c.fingerprint.class(), ContentClass::Attachment);
        assert_eq!(
            c.payload,
            EchoPayload::Attachment {
                attachment_kind: AttachmentKind::Sticker,
                stable_unique_id: "abc".into(),
                transfer_id: "file-1".into(),
            }
        );
    }

    #[test]
    fn rejects_unconfigured_attachment_kind() {
        let msg = InboundMessage::group_attachment(
            42,
            7,
            AttachmentKind::VideoSticker,
            "abc",
            "file-1",
        );
        assert_eq!(
            filter().check(&msg),
            Err(Rejection::UnsupportedAttachment(AttachmentKind::VideoSticker))
        );
    }

    #[test]
    fn attachments_skip_text_rules() {
        // Unique ids may contain characters that would reject a text message.
        let msg = InboundMessage::group_attachment(1, 1, AttachmentKind::Sticker, "/@", "f");
        assert!(filter().check(&msg).is_ok());
    }

    #[test]
    fn custom_length_limits() {
        let f = EligibilityFilter::new(5, 6, vec![]);
        assert_eq!(
            f.check(&InboundMessage::group_text(1, 1, "four")),
            Err(Rejection::TooShort)
        );
        assert!(f.check(&InboundMessage::group_text(1, 1, "sixsix")).is_ok());
        assert_eq!(
            f.check(&InboundMessage::group_text(1, 1, "sevenxx")),
            Err(Rejection::TooLong)
        );
    }

    #[test]
    fn attachment_kind_column_matches_config_spelling() {
        for kind in [
            AttachmentKind::Sticker,
            AttachmentKind::AnimatedSticker,
            AttachmentKind::VideoSticker,
        ] {
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.as_str().into())
            );
        }
    }

    #[test]
    fn inbound_message_serde_uses_kind_tag() {
        let msg = InboundMessage::group_text(42, 7, "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"]["kind"], "text");
        assert_eq!(json["content"]["text"], "hello");

        let msg = InboundMessage::group_attachment(42, 7, AttachmentKind::Sticker, "u", "t");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"]["kind"], "attachment");
        assert_eq!(json["content"]["attachment_kind"], "sticker");
    }
}
