//! LPMorph Engine: real-time LPC analysis/resynthesis.
//!
//! Crate layout:
//! - [`config`]     : `EngineConfig` (static), `BlockParams` (per block), limits
//! - [`error`]      : `ConfigError`
//! - [`controls`]   : lock-free controls shared with non-real-time threads
//! - [`mailbox`]    : single-slot excitation hand-off to the audio thread
//! - [`excitation`] : immutable excitation buffers
//! - [`bank`]       : selectable factory and custom excitations
//! - [`scheduler`]  : hop cadence and overlap-add cursors
//! - [`channel`]    : per-channel state and the per-sample loop
//! - [`engine`]     : `LpcEngine`, the `configure` / `begin_block` / `process` contract
//! - [`adapter`]    : `BlockProcessor` trait and a planar block renderer
//!
//! The audio path never allocates, locks, logs or returns errors. Configuration
//! changes made from other threads take effect at the next `begin_block`.

pub mod adapter;
pub mod bank;
pub mod channel;
pub mod config;
pub mod controls;
pub mod engine;
pub mod error;
pub mod excitation;
pub mod mailbox;
pub mod scheduler;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use adapter::{BlockProcessor, BlockRenderer};
pub use bank::ExcitationBank;
pub use config::{BlockParams, EngineConfig, FilterForm, HistoryPolicy};
pub use controls::Controls;
pub use engine::LpcEngine;
pub use error::{ConfigError, ConfigResult};
pub use excitation::{Excitation, ExcitationId};
pub use lpmorph_core::guard::Warnings;
