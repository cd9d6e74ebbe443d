//! Core library for a hermetic, content-addressed monorepository builder.
//!
//! Given a directory tree organized as sibling *codebases* under a common
//! `monorepository` root, this crate builds the codebase the caller is
//! standing in, recursively building any declared dependency codebases
//! first, and installs all outputs into a shared prefix directory. Builds
//! are cached by a SHA-1 fingerprint of each codebase's inputs; a cache hit
//! restores outputs from a local content-addressable store via hard links
//! instead of rebuilding.
//!
//! The orchestrator (see [`builder`]) is single-threaded and cooperative:
//! there is no parallelism between sibling codebases, and the cache is not
//! safe for concurrent writers against the same metadata prefix.

pub mod builder;
pub mod cache;
pub mod codebase;
pub mod context;
pub mod discovery;
pub mod error;
pub mod fingerprint;
pub mod fs_util;
pub mod metadata;
pub mod stager;
pub mod types;
pub mod uploader;
pub mod upload;

pub use builder::build;
pub use context::BuildContext;
pub use error::{BuildError, Result};
pub use types::CodebaseName;
pub use upload::upload;
