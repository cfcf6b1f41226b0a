use std::future::Future;
use std::pin::Pin;

use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, InputFile};

use crate::error::Error;
use crate::repeat::{EchoPayload, EchoSink};

/// Sends echoes back into the chat: text as a plain message, stickers by
/// their transfer id so no file is re-uploaded.
#[derive(Clone)]
pub struct TelegramEchoSink {
    bot: Bot,
}

impl TelegramEchoSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl EchoSink for TelegramEchoSink {
    fn emit<'a>(
        &'a self,
        chat_id: i64,
        payload: &'a EchoPayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            match payload {
                EchoPayload::Text { text } => {
                    self.bot
                        .send_message(ChatId(chat_id), text.clone())
                        .await
                        .map_err(|e| Error::Emit(format!("send_message: {e}")))?;
                }
                EchoPayload::Attachment { transfer_id, .. } => {
                    self.bot
                        .send_sticker(ChatId(chat_id), InputFile::file_id(FileId(transfer_id.clone())))
                        .await
                        .map_err(|e| Error::Emit(format!("send_sticker: {e}")))?;
                }
            }
            Ok(())
        })
    }
}
