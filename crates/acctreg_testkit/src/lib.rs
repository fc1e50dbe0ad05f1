//! # acctreg Testkit
//!
//! Test utilities for the account registry.
//!
//! This crate provides:
//! - Sample accounts and pre-seeded mock catalogs
//! - Property-based generators for raw accounts using proptest
//! - SigV4 reference vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use acctreg_testkit::prelude::*;
//!
//! #[test]
//! fn pages_through_the_catalog() {
//!     let server = seeded_server(ProtocolVariant::PaginationLink, 2);
//!     // ... point a client at DEFAULT_CATALOG_URL
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
    pub use acctreg_mock_server::{AccountCatalog, AccountServer, ServerConfig, DEFAULT_CATALOG_URL};
    pub use acctreg_protocol::{ProtocolVariant, RawAccount};
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
