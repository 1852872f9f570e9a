//! niko-rs: decision core of a Turkish voice assistant.
//!
//! Utterances are normalized, routed to a local action or to a remote chat
//! model, and answered through a serialized speech queue. Chat history,
//! conversation session and user choices persist across restarts.

pub mod api;
pub mod app_state;
pub mod assistant;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod history;
pub mod intent;
pub mod models;
pub mod normalizer;
pub mod platform;
pub mod remote;
pub mod session;
pub mod speech;
pub mod storage;
pub mod temporal;
pub mod update;
