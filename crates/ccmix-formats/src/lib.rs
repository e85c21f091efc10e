//! Archive formats of the Westwood Command & Conquer games
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Signed identifier ordering
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // Format names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! This crate reads, writes and repairs MIX archives, the flat container
//! format used by Tiberian Dawn, Red Alert, Tiberian Sun and Red Alert 2.
//!
//! # Supported Features
//!
//! - **Header classification**: legacy, flagged, encrypted and checksummed
//!   archives are told apart from their first bytes
//! - **Index codec**: signed identifier ordering and collision detection
//! - **Packing**: optional Blowfish index encryption and SHA-1 trailer
//! - **Name recovery**: local mix database records and external name tables
//! - **Repair**: relocation of a stale local mix database and in-place
//!   header rewrite
//!
//! See the [`mix`] module for examples.

#![warn(missing_docs)]

pub mod mix;
