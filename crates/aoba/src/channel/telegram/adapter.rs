use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::TelegramConfig;
use crate::error::Error;
use crate::feature::FeatureRegistry;

use super::convert::MessageFacts;

/// Long-polls Telegram and hands every group message to the feature registry.
pub struct TelegramAdapter {
    bot: Bot,
    config: TelegramConfig,
    registry: Arc<FeatureRegistry>,
    /// The bot's own user id, resolved via `getMe`.
    self_id: i64,
}

impl TelegramAdapter {
    /// Resolve the bot's identity and build the adapter.
    pub async fn connect(
        bot: Bot,
        config: TelegramConfig,
        registry: Arc<FeatureRegistry>,
    ) -> Result<Self, Error> {
        let me = bot
            .get_me()
            .await
            .map_err(|e| Error::Telegram(format!("getMe failed: {e}")))?;
        let self_id = me.user.id.0 as i64;
        tracing::info!(self_id, username = ?me.user.username, "telegram bot identity resolved");
        Ok(Self {
            bot,
            config,
            registry,
            self_id,
        })
    }

    /// Start long polling. Returns once `cancel` fires or Ctrl-C is received.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), Error> {
        if self.config.drop_pending_updates {
            self.bot
                .delete_webhook()
                .drop_pending_updates(true)
                .await
                .map_err(|e| Error::Telegram(format!("deleteWebhook failed: {e}")))?;
        }

        let adapter = Arc::clone(&self);
        let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![adapter])
            .default_handler(|_upd| async {})
            .enable_ctrlc_handler()
            .build();

        let shutdown = dispatcher.shutdown_token();
        let watcher = tokio::spawn(async move {
            cancel.cancelled().await;
            match shutdown.shutdown() {
                Ok(done) => done.await,
                Err(e) => tracing::debug!(error = ?e, "telegram dispatcher not running"),
            }
        });

        tracing::info!("telegram adapter polling");
        dispatcher.dispatch().await;
        watcher.abort();
        tracing::info!("telegram adapter shutting down");
        Ok(())
    }

    async fn handle(&self, msg: &Message) {
        let Some(inbound) = MessageFacts::from_message(msg).into_inbound(self.self_id) else {
            return;
        };
        self.registry.dispatch(&inbound, chrono::Utc::now()).await;
    }
}

/// Teloxide handler for incoming messages.
async fn handle_message(
    msg: Message,
    adapter: Arc<TelegramAdapter>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    adapter.handle(&msg).await;
    Ok(())
}
