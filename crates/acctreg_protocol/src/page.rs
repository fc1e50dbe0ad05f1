//! Response pages for both protocol variants.

use crate::account::RawAccount;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which response shape a remote catalog speaks.
///
/// A deployment picks exactly one variant; responses are never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    /// `{"accounts": [...], "bookmark": N}`, requested with `?after=N`.
    Bookmark,
    /// `{"Accounts": [...], "Pagination": {"NextUrl": "..."}}`, requested with
    /// `?UpdatedAt.gt=<timestamp>`.
    #[default]
    PaginationLink,
}

impl ProtocolVariant {
    /// Query parameter carrying the delta cursor.
    pub fn delta_param(&self) -> &'static str {
        match self {
            ProtocolVariant::Bookmark => "after",
            ProtocolVariant::PaginationLink => "UpdatedAt.gt",
        }
    }

    /// Whether an account without provider tags is a deletion.
    ///
    /// In the bookmark variant an empty provider list instead means the
    /// account is enabled for every capability.
    pub fn empty_providers_deletes(&self) -> bool {
        matches!(self, ProtocolVariant::PaginationLink)
    }

    /// Whether records must carry a status field to be accepted.
    pub fn requires_status(&self) -> bool {
        matches!(self, ProtocolVariant::PaginationLink)
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Bookmark => f.write_str("bookmark"),
            ProtocolVariant::PaginationLink => f.write_str("pagination-link"),
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bookmark" => Ok(ProtocolVariant::Bookmark),
            "pagination-link" | "pagination" | "link" => Ok(ProtocolVariant::PaginationLink),
            other => Err(ProtocolError::Decode(format!(
                "unknown protocol variant: {other}"
            ))),
        }
    }
}

/// Pagination block of a link-variant page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Absolute URL of the next page; empty or absent on the last page.
    #[serde(
        rename = "NextUrl",
        alias = "nextUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_url: Option<String>,
}

/// A page in the pagination-link variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPage {
    /// Accounts on this page.
    #[serde(
        rename = "Accounts",
        alias = "accounts",
        alias = "SpinnakerAccounts",
        default
    )]
    pub accounts: Option<Vec<RawAccount>>,

    /// Link to the next page.
    #[serde(
        rename = "Pagination",
        alias = "pagination",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pagination: Option<Pagination>,
}

/// A page in the bookmark variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkPage {
    /// Accounts changed after the requested bookmark.
    #[serde(default, alias = "Accounts", alias = "SpinnakerAccounts")]
    pub accounts: Option<Vec<RawAccount>>,

    /// Bookmark to resume from.
    #[serde(default, alias = "Bookmark", skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<u64>,
}

/// Where the next fetch continues from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Follow this URL for the next page.
    NextUrl(String),
    /// Resume from this bookmark on the next poll.
    Bookmark(u64),
    /// No cursor was returned.
    End,
}

/// A decoded page, independent of the wire variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Accounts on this page, in response order.
    pub accounts: Vec<RawAccount>,
    /// Continuation.
    pub cursor: PageCursor,
}

impl Page {
    /// Creates a page.
    pub fn new(accounts: Vec<RawAccount>, cursor: PageCursor) -> Self {
        Self { accounts, cursor }
    }

    /// Returns the next-page URL, if any.
    pub fn next_url(&self) -> Option<&str> {
        match &self.cursor {
            PageCursor::NextUrl(url) => Some(url),
            _ => None,
        }
    }

    /// Returns the response bookmark, if any.
    pub fn bookmark(&self) -> Option<u64> {
        match self.cursor {
            PageCursor::Bookmark(b) => Some(b),
            _ => None,
        }
    }

    /// Decodes a response body in the given variant.
    pub fn decode(variant: ProtocolVariant, bytes: &[u8]) -> ProtocolResult<Self> {
        match variant {
            ProtocolVariant::PaginationLink => {
                let page: LinkPage = serde_json::from_slice(bytes)
                    .map_err(|e| ProtocolError::Decode(e.to_string()))?;
                let cursor = match page.pagination.and_then(|p| p.next_url) {
                    Some(url) if !url.trim().is_empty() => PageCursor::NextUrl(url),
                    _ => PageCursor::End,
                };
                Ok(Self::new(page.accounts.unwrap_or_default(), cursor))
            }
            ProtocolVariant::Bookmark => {
                let page: BookmarkPage = serde_json::from_slice(bytes)
                    .map_err(|e| ProtocolError::Decode(e.to_string()))?;
                let cursor = page.bookmark.map_or(PageCursor::End, PageCursor::Bookmark);
                Ok(Self::new(page.accounts.unwrap_or_default(), cursor))
            }
        }
    }

    /// Encodes this page in the given variant.
    ///
    /// A cursor that does not belong to the variant is dropped.
    pub fn encode(&self, variant: ProtocolVariant) -> ProtocolResult<Vec<u8>> {
        let encoded = match variant {
            ProtocolVariant::PaginationLink => serde_json::to_vec(&LinkPage {
                accounts: Some(self.accounts.clone()),
                pagination: Some(Pagination {
                    next_url: Some(self.next_url().unwrap_or_default().to_string()),
                }),
            }),
            ProtocolVariant::Bookmark => serde_json::to_vec(&BookmarkPage {
                accounts: Some(self.accounts.clone()),
                bookmark: self.bookmark(),
            }),
        };
        encoded.map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
