//! # acctreg Engine
//!
//! Keeps a local set of cloud account credential definitions in step with a
//! remote account catalog.
//!
//! This crate provides:
//! - SigV4 request signing with static or ambient credentials
//! - A paginating remote account client with one signer regeneration on 403
//! - Conversion of raw accounts into primary and secondary definitions
//! - Reconciliation where the remote wins and local-only entries survive
//! - A sync coordinator with exponential backoff and a two-phase watermark
//! - Credential repositories, lazy lookups and a fixed-delay poller
//!
//! ## Architecture
//!
//! One cycle is **fetch → convert → reconcile → commit**:
//! 1. Fetch every account changed after the last synced watermark
//! 2. Convert them, skipping invalid records
//! 3. Merge into the current sets, remote first
//! 4. Commit the new sets and remember the new watermark as *attempted*
//!
//! The caller propagates the committed sets and then calls
//! [`SyncCoordinator::mark_synced`], which is what moves the watermark used
//! for the next fetch.
//!
//! ## Key Invariants
//!
//! - Names are unique within each map
//! - A secondary only exists alongside the primary it was derived from
//! - Deleted names are absent from both maps after a commit
//! - Watermarks never move backwards
//! - Readers never observe a half-merged set

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod client;
mod config;
mod convert;
mod defaults;
mod definition;
mod error;
mod http;
mod reconcile;
mod repository;
mod scheduler;
mod signer;
mod state;
mod template;
mod transport;

pub use client::RemoteAccountClient;
pub use config::{
    AuthMode, BackoffConfig, SyncConfig, DEFAULT_BASE_URL, DEFAULT_SIGNING_REGION,
    DEFAULT_SIGNING_SERVICE,
};
pub use convert::{apply_defaults, normalize_role, AccountConverter, Conversion, ROLE_PREFIX};
pub use defaults::DefaultsConfig;
pub use definition::{
    secondary_name_for, AccountScoped, CredentialDefinition, LifecycleHook, PrimaryDefinition,
    Region, SecondaryDefinition, SECONDARY_SUFFIX,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, LoopbackClient, LoopbackServer, ReqwestClient};
pub use reconcile::{reconcile, AccountSets, Delta, MapDelta, Reconciliation};
pub use repository::{
    mirror, propagate, CredentialRepository, LazyLoadRepository, MemoryCredentialRepository,
    PropagationSummary,
};
pub use scheduler::{Poller, PollerReport};
pub use signer::{
    credential_source, AmbientCredentials, CredentialSource, RequestSigner, StaticCredentials,
};
pub use state::{SyncCoordinator, SyncOutcome, SyncPhase, SyncStats, SyncStatus};
pub use template::{TemplateContext, MAX_TEMPLATE_PASSES};
pub use transport::{AccountSource, FetchedBatch, MockSource};

/// Re-export of the wire types.
pub use acctreg_protocol as protocol;
