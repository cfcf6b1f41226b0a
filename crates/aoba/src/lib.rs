pub mod channel;
pub mod config;
pub mod error;
pub mod feature;
pub mod repeat;

pub use config::{AobaConfig, DatabaseConfig, RepeatConfig, TelegramConfig};
pub use error::Error;
pub use feature::{FeatureRegistry, MessageFeature};
pub use repeat::{
    ContentClass, ContentFingerprint, CooldownStore, EchoPayload, EchoSink, InMemoryRepeatStore,
    InboundMessage, ObservationStore, PostgresRepeatStore, RandomSource, Reaper, ReaperHandle,
    RepeatEngine, RepeatOutcome,
};
