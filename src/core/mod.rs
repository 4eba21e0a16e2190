//! Core traits, types, and constants.
//!
//! This module has no dependencies on the other layers' internals and
//! defines the collaborator abstractions the host is built around.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
