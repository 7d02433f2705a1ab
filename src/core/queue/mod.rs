// src/core/queue/mod.rs

//! The queue pump: long-polls the managed queue, runs a handler per message
//! with bounded parallelism, and keeps each in-flight message invisible to
//! other consumers until its handler finishes.

pub mod dispatcher;
pub mod visibility;

pub use dispatcher::{Dispatcher, DispatcherOptions, MAX_MESSAGES_PER_RECEIVE, MessageHandler};
pub use visibility::PostponeNotice;
