//! Serve a directory reachable over SFTP (or a local one) as a WebDAV
//! endpoint.
pub mod api;
pub mod config;
pub mod dav;
pub mod error;
pub mod fs;
pub mod session;
