//! Utility functions shared by the feed engine and the CLI.
//!
//! - **Text safety**: rejecting episode text that would break the feed markup
//! - **Links**: building public URLs for published files
//!
//! # Examples
//!
//! ```
//! use castfeed::util::{check_feed_text, public_link};
//!
//! assert!(check_feed_text("Title", "Pilot").is_ok());
//! let link = public_link("https://example.com/podcast/", "pilot.mp3");
//! assert_eq!(link, "https://example.com/podcast/pilot.mp3");
//! ```

mod link;
mod text;

pub use link::public_link;
pub use text::{check_episode_text, check_feed_text, has_extension, TextError};
