//! CLI command implementations.

pub mod clear;
pub mod init;
pub mod list;
pub mod show;
pub mod sync;
