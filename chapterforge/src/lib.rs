//! ChapterForge: author MP4/M4A audio files with Apple-player-compatible
//! chapter tracks (titles, optional per-chapter URLs, optional JPEG thumbnails)
//! and read them back.
//!
//! The public surface is small by design: [`mux::write_mp4`] to author a file,
//! [`read::read_m4a`] to recover chapters and metadata from one. Everything
//! else in this crate exists to support those two entry points.

pub mod aac;
pub mod boxes;
pub mod bytes;
pub mod chapters;
pub mod error;
pub mod jpeg;
pub mod mdat;
pub mod metadata;
pub mod mux;
pub mod parser;
pub mod read;
pub mod tables;
pub mod timing;
pub mod tracks;

pub use chapters::{ChapterImageSample, ChapterTextSample};
pub use error::{ChapterForgeError, Result};
pub use metadata::MetadataSet;
pub use mux::{write_mp4, ExtraTextTrack, Status};
pub use read::{read_m4a, ReadResult};
