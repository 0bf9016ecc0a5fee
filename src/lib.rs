//! ctxcrop - contextual image-crop derivatives
//!
//! Computes deterministic storage paths and URLs for image derivatives
//! cropped per usage context, generates each derivative at most once under
//! concurrent requests, and deletes derivatives when crops or styles change.

pub mod backend;
pub mod cli;
pub mod config;
pub mod crop;
pub mod derivative;
pub mod error;
pub mod inbound;
pub mod style;
pub mod ui;
pub mod uri;

pub use error::{CropError, CropResult};
