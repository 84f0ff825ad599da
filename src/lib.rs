//! cloudframe - Dropbox photo catalog with a local preview cache
//!
//! The library holds the whole pipeline so the binary and the integration
//! tests drive the same code: [`session::Session`] owns the scan and save
//! cycles, [`remote::RemoteStorage`] is the seam to the storage provider,
//! and [`host::relay`] speaks the JSON-lines host protocol.

pub mod cache;
pub mod catalog;
pub mod enrichment;
pub mod host;
pub mod remote;
pub mod scanner;
pub mod session;
pub mod thumbnails;
