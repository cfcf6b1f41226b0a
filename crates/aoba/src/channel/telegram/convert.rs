use teloxide::types::Message;

use crate::repeat::{AttachmentKind, InboundMessage, MessageContent};

/// The parts of a Telegram message the repeat pipeline looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct MessageFacts {
    pub chat_id: i64,
    pub chat_is_group: bool,
    pub sender_id: Option<i64>,
    pub text: Option<String>,
    pub sticker: Option<StickerFacts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StickerFacts {
    pub kind: AttachmentKind,
    pub unique_id: String,
    pub file_id: String,
}

impl MessageFacts {
    pub fn from_message(msg: &Message) -> Self {
        let sticker = msg.sticker().map(|s| {
            let kind = if s.is_video() {
                AttachmentKind::VideoSticker
            } else if s.is_animated() {
                AttachmentKind::AnimatedSticker
            } else {
                AttachmentKind::Sticker
            };
            StickerFacts {
                kind,
                unique_id: s.file.unique_id.0.clone(),
                file_id: s.file.id.0.clone(),
            }
        });
        Self {
            chat_id: msg.chat.id.0,
            chat_is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
            sender_id: msg.from.as_ref().map(|u| u.id.0 as i64),
            text: msg.text().map(str::to_string),
            sticker,
        }
    }

    /// Build the platform-neutral message, or `None` when there is nothing
    /// a feature could act on (no sender, or neither text nor sticker).
    pub fn into_inbound(self, self_id: i64) -> Option<InboundMessage> {
        let sender_id = self.sender_id?;
        let content = match (self.text, self.sticker) {
            (Some(text), _) => MessageContent::Text { text },
            (None, Some(sticker)) => MessageContent::Attachment {
                attachment_kind: sticker.kind,
                stable_unique_id: sticker.unique_id,
                transfer_id: sticker.file_id,
            },
            (None, None) => return None,
        };
        Some(InboundMessage {
            chat_id: self.chat_id,
            sender_id,
            is_self: sender_id == self_id,
            chat_is_group: self.chat_is_group,
            content,
        })
    }
}
