//! Export of translations as nested per-locale JSON trees.
//!
//! - `tree`: turns dotted keys into nested mappings
//! - `service`: streams rows per locale, builds trees and caches them

mod service;
pub mod tree;

pub use service::{ExportError, ExportService, LocaleExports};
pub use tree::{Node, Tree};
