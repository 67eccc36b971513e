//! Publish podcast episodes into a self-hosted RSS 2.0 feed.
//!
//! The feed file is read, the new episode is placed in front of the existing
//! ones, the channel metadata is rebuilt from configuration and the file is
//! rewritten behind a timestamped backup.

pub mod audio;
pub mod config;
pub mod feed;
pub mod util;
