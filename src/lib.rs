//! Chan thread archiver library.
//!
//! Incrementally mirrors operator-selected imageboard threads to local
//! storage: text logs rebuilt only when stale, attachments downloaded once
//! and skipped by byte-size parity thereafter, vanished threads pruned from
//! the persisted selection.

pub mod archiver;
pub mod boards;
pub mod chan;
pub mod config;
pub mod journal;
pub mod paths;
pub mod render;
pub mod selection;
