//! # acctreg Mock Server
//!
//! In-process reference implementation of the remote account catalog.
//!
//! This crate provides:
//! - An account catalog with change sequencing and timestamps
//! - Both response shapes: `after` bookmarks and `UpdatedAt.gt` with
//!   `NextUrl` pagination
//! - Optional SigV4 verification of incoming requests
//! - Injectable 403 responses for credential rotation tests
//!
//! # Architecture
//!
//! Requests arrive as a full URL plus a header map and leave as a status and
//! a JSON body, so a client can route them here through a loopback transport.
//! The catalog keeps only the latest version of each account; every change
//! bumps a sequence number that doubles as the bookmark.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod catalog;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{header, ForbiddenSwitch, SignatureVerifier};
pub use catalog::AccountCatalog;
pub use config::{ServerConfig, SigningRequirement, DEFAULT_CATALOG_URL};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, PAGE_PARAM};
pub use server::AccountServer;
