//! Repetition detection: notice when several distinct users post the same
//! content in a group chat and, with some probability, join in once.

pub mod eligibility;
pub mod engine;
pub mod fingerprint;
pub mod policy;
pub mod postgres;
pub mod reaper;
pub mod store;

pub use eligibility::{
    AttachmentKind, Candidate, EchoPayload, EligibilityFilter, InboundMessage, MessageContent,
    Rejection,
};
pub use engine::{EchoSink, FixedDraw, RandomSource, RepeatEngine, RepeatOutcome, StdRandom};
pub use fingerprint::{ContentClass, ContentFingerprint, fingerprint_attachment, fingerprint_text};
pub use policy::{MIN_OBSERVERS, ProbabilityTable};
pub use postgres::PostgresRepeatStore;
pub use reaper::{Reaper, ReaperHandle, SweepReport};
pub use store::{CooldownMark, CooldownStore, InMemoryRepeatStore, InsertOutcome, Observation, ObservationStore};
