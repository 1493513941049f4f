//! Common utilities and abstractions for the skewer workspace.
//!
//! This crate provides the shared error type and the line-oriented file I/O
//! used to hand artifacts from one job to the next.

pub mod error;
pub mod io;

pub use error::{CommonError, ErrorContext, Result};
pub use io::{
    KV_DELIMITER, ensure_dir_exists, format_kv, list_input_files, read_lines,
    remove_file_if_exists, split_kv, write_json_atomic, write_lines_atomic,
};
