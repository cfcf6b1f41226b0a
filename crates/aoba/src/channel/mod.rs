//! Platform adapters that turn chat updates into [`InboundMessage`]s for the
//! feature registry and deliver echoes back.
//!
//! [`InboundMessage`]: crate::repeat::InboundMessage

#[cfg(feature = "telegram")]
pub mod telegram;
