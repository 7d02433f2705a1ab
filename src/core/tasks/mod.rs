// src/core/tasks/mod.rs

//! Long-running background tasks supervised by the server.

pub mod observer;

pub use observer::{ClusterObserverTask, ClusterSample};
