//! Quanta Core - Fundamental types
//!
//! This crate provides the types shared by every Quanta crate:
//! - `QuantaError`: the error taxonomy with machine-readable codes
//! - `PassToken`: calculation pass identity used for memoized evaluation
//! - `EngineConfig`: engine settings loaded from JSON and the environment

mod config;
mod error;
mod pass;

pub use config::{EngineConfig, DEFAULT_MAX_CONVERSION_STEPS};
pub use error::{codes, QuantaError, Result, Severity};
pub use pass::PassToken;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::codes;
    pub use crate::{PassToken, QuantaError, Result, Severity};
}
