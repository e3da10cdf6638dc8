pub mod config;
pub mod error;
pub mod hooks;
pub mod resolver;
pub mod scan;
pub mod scm;
pub mod store;
pub mod strategy;
pub mod ui;
pub mod version;
pub mod versioning;

pub use error::{PymetaError, Result};
