//! Constants shared across Gatewarden crates.

#![deny(unsafe_code)]

pub mod duration;
pub mod limits;
