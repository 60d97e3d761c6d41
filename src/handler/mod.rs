//! Request handler module
//!
//! Request dispatch and the static file serving pipeline.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
