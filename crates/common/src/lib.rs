//! Common utilities and shared types for parley.
//!
//! This crate provides foundational components used across all parley crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Storage**: The media collaborator that stores chat attachments
//!
//! # Example
//!
//! ```no_run
//! use parley_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {}", id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use storage::{
    ACCEPTED_MIME_TYPES, AttachmentKind, LocalStorage, MediaStore, StoredMedia,
    generate_storage_key, validate_attachment,
};
