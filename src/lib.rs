//! Cascaded face detection and embedding-based identity matching.

pub mod bank;
pub mod config;
pub mod error;
pub mod faces;
pub mod logging;
pub mod scanner;

pub use error::{FaceError, Result};
