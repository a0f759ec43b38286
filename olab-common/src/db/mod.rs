//! Database schema for the local (SQLite) backend

pub mod init;

pub use init::*;
