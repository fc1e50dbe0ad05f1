//! # Account Registry Protocol
//!
//! Wire types and signing primitives shared by the account sync engine and
//! the reference remote catalog.
//!
//! This crate provides:
//! - `RawAccount`, the lenient wire record served by the remote catalog
//! - Page decoding for both protocol variants (bookmark and pagination-link)
//! - `Watermark` cursors and timestamp ordering
//! - The known AWS region catalog
//! - AWS Signature Version 4 canonicalization and signing
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod account;
mod error;
mod page;
mod regions;
pub mod sigv4;
mod watermark;

pub use account::{RawAccount, STATUS_ACTIVE, STATUS_SUSPENDED};
pub use error::{ProtocolError, ProtocolResult};
pub use page::{BookmarkPage, LinkPage, Page, PageCursor, Pagination, ProtocolVariant};
pub use regions::{RegionCatalog, KNOWN_AWS_REGIONS};
pub use watermark::{latest_timestamp, parse_timestamp, Watermark};
