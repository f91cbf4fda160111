//! Helpers for locating player scripts

pub mod url;

pub use url::*;
