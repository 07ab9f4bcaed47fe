#![doc = "playcanvas-sync-core: pipeline library for playcanvas-sync."]

//! This crate drives one PlayCanvas export from start to push:
//! start the export job, poll it, download and install the archive, fetch the
//! project's script assets and hand the directory to a [`contract::Pusher`].
//!
//! # Usage
//! Build a [`context::PushContext`], wire a [`synchronise::SyncOrchestrator`]
//! with a [`client::PlayCanvasClient`] and a pusher, then call
//! [`synchronise::SyncOrchestrator::start_sync`].

pub mod archive;
pub mod assets;
pub mod client;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod log;
pub mod synchronise;

pub use error::{SyncError, SyncResult};
