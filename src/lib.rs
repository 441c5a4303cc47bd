//! Terminal client for the Task Master backend.
//!
//! REST calls go through [`api::ApiClient`]; live task events arrive over a
//! Socket.IO push channel ([`channel::PushChannel`]) and are folded into the
//! [`feed::LiveFeed`] of transient alerts and persisted notifications.

/// REST client and backend failure conversion.
pub mod api;
/// Subcommand dispatch and the live screen.
pub mod app;
/// Push-channel connection and reconnect loop.
pub mod channel;
/// Connection state and counters of the push channel.
pub mod channel_state;
/// Command-line argument definitions.
pub mod cli;
/// Runtime configuration model.
pub mod config;
/// Access token persistence.
pub mod credentials;
/// Error types used across the crate.
pub mod error;
/// Event bus messages between channel, feed and UI.
pub mod events;
/// Live notification feed.
pub mod feed;
/// Terminal output formatters.
pub mod formatter;
/// Process-wide owner of the push channel.
pub mod manager;
/// Metrics counters and exporter.
pub mod monitoring;
/// Engine.IO / Socket.IO frame codec.
pub mod protocol;
/// Session store and route guard.
pub mod session;
/// Task list filters, ordering and form checks.
pub mod tasks;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Backend data models.
pub mod types;
/// UI controller for the live screen.
pub mod ui;

/// Primary crate error type.
pub use error::{ApiError, TaskMasterError};
