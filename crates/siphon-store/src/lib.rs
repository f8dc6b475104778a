//! Siphon Store - persisted harvest output
//!
//! - [`layout`] - directory conventions under the output root
//! - [`sink`] - atomic JSON and media writers

pub mod layout;
pub mod sink;

pub use layout::OutputLayout;
pub use sink::{JsonSink, MediaSink};
