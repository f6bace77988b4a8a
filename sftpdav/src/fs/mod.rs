//! Filesystem adapter
//!
//! `RemoteFs` turns root-relative names into session calls; `OpenFileHandle`
//! wraps one open file and pages through a cached directory listing.
pub mod adapter;
pub mod handle;
pub mod paths;

pub use adapter::RemoteFs;
pub use handle::OpenFileHandle;
