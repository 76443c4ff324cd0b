//! HTTP API handlers.
//!
//! Split by resource: [`auth`] covers accounts and sessions, [`files`]
//! covers uploads and download links.

pub mod auth;
pub mod files;
