//! HTTP layer for the mod gate.
//!
//! Access checks, the mod listing and the download relay are served from a
//! single axum router; see [`handler`].

pub mod handler;
