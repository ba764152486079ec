//! Shared server types.

pub mod error;
pub mod info;

pub use error::*;
pub use info::*;
