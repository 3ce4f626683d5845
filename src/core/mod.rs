//! TETHER Protocol - Core Types
//!
//! Configuration, protocol constants, the error taxonomy, and the trait
//! boundary to the physical device. Everything here is I/O-free.

mod config;
pub mod constants;
mod error;
mod traits;

pub use config::{LinkConfig, LinkConfigBuilder};
pub use error::TetherError;
pub use traits::{DeviceIo, Role};
