//! ripperkit - a mod correlation, conflict, and load-order engine for
//! RED-engine (Cyberpunk 2077) PC game mods.
//!
//! This crate provides:
//! - Correlating locally staged mod archives against a Nexus-shaped catalog
//! - Detecting archive-resource, redscript, and TweakXL conflicts
//! - FOMOD installer support
//! - Direct-extraction installation with per-file ownership tracking
//! - Load-order planning (modlist.txt + rename fallback)
//! - Profile system for different mod configurations

pub const APP_VERSION: &str = "0.1.0";

pub mod archive;
pub mod config;
pub mod conflicts;
pub mod correlate;
pub mod db;
pub mod error;
pub mod filename;
pub mod game;
pub mod layout;
pub mod loadorder;
pub mod mods;
pub mod profiles;
pub mod red_archive;
pub mod scan;
pub mod updates;

pub use config::Config;
