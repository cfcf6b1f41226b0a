mod adapter;
mod convert;
mod sink;

pub use adapter::TelegramAdapter;
pub use sink::TelegramEchoSink;
