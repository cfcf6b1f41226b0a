//! Message features and the registry that fans inbound messages out to them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::repeat::{InboundMessage, RepeatEngine};

/// Something that reacts to every inbound chat message.
///
/// Features own their error handling: `handle` returns nothing, so one
/// feature's failure never stops the next from seeing the message.
pub trait MessageFeature: Send + Sync {
    /// Unique name, used in logs and for duplicate detection.
    fn name(&self) -> &str;

    fn handle<'a>(
        &'a self,
        msg: &'a InboundMessage,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

impl MessageFeature for RepeatEngine {
    fn name(&self) -> &str {
        "repeat"
    }

    fn handle<'a>(
        &'a self,
        msg: &'a InboundMessage,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let outcome = self.record_and_decide(msg, now).await;
            tracing::trace!(chat_id = msg.chat_id, ?outcome, "repeat feature handled message");
        })
    }
}

/// Ordered set of features, built once at startup and shared by reference.
#[derive(Default, Clone)]
pub struct FeatureRegistry {
    features: Vec<Arc<dyn MessageFeature>>,
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.names())
            .finish()
    }
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature. Names must be unique.
    pub fn register(&mut self, feature: Arc<dyn MessageFeature>) -> Result<(), Error> {
        if self.features.iter().any(|f| f.name() == feature.name()) {
            return Err(Error::Config(format!(
                "feature '{}' registered twice",
                feature.name()
            )));
        }
        tracing::info!(feature = feature.name(), "registered message feature");
        self.features.push(feature);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Hand `msg` to every feature in registration order.
    pub async fn dispatch(&self, msg: &InboundMessage, now: DateTime<Utc>) {
        for feature in &self.features {
            feature.handle(msg, now).await;
        }
    }
}
