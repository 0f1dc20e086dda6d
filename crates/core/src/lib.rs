//! Core business logic for parley.

pub mod services;

pub use services::*;
