use std::fmt;

/// Errors surfaced by collaborator calls and handlers.
///
/// Variants are discriminated by kind so callers can route on them
/// instead of string-matching messages. Ledger-side "already exists" /
/// "already voided" conditions are not errors: handlers discover them by
/// lookup and treat them as idempotent no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No stored credentials, or the refresh exchange failed.
    /// Fatal for the current request.
    Auth {
        detail: String,
    },

    /// An upstream lookup returned no usable match (unknown SKU,
    /// unknown order id). Handled locally: log, abort the handler,
    /// acknowledge the delivery.
    Resolution {
        what: &'static str,
        id: String,
    },

    /// Non-2xx from the commerce or ledger API. The full response body
    /// is retained for diagnosis.
    Downstream {
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, timeout, TLS).
    Transport {
        detail: String,
    },
}

impl SyncError {
    pub fn auth(detail: impl Into<String>) -> Self {
        SyncError::Auth { detail: detail.into() }
    }

    pub fn resolution(what: &'static str, id: impl ToString) -> Self {
        SyncError::Resolution { what, id: id.to_string() }
    }

    /// Resolution failures abort only their own handler; everything else
    /// fails the request.
    pub fn is_resolution(&self) -> bool {
        matches!(self, SyncError::Resolution { .. })
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Auth { detail } =>
                write!(f, "credentials unavailable: {}", detail),
            SyncError::Resolution { what, id } =>
                write!(f, "could not resolve {} {}", what, id),
            SyncError::Downstream { status, body } =>
                write!(f, "downstream API returned {}: {}", status, body),
            SyncError::Transport { detail } =>
                write!(f, "transport error: {}", detail),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport {
            detail: err.to_string(),
        }
    }
}

/// Final outcome of routing one verified webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// A handler ran and pushed at least one change to the ledger.
    Synced,

    /// The dedup window had already seen this logical event.
    Duplicate,

    /// The inventory change matched a recorded expectation: it was our
    /// own write echoing back, so no sync happened.
    ExpectedChange {
        reason: Option<String>,
    },

    /// A handler ran and decided no ledger work was needed
    /// (already synced, nothing to void, unresolvable reference).
    Skipped {
        reason: String,
    },

    /// Topic has no handler; delivery was acknowledged and logged.
    Received,
}

impl HandlerOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        HandlerOutcome::Skipped { reason: reason.into() }
    }

    /// Short response-body word. The upstream platform only reads the
    /// status code; this is for humans tailing delivery logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerOutcome::Synced => "synced",
            HandlerOutcome::Duplicate => "duplicate",
            HandlerOutcome::ExpectedChange { .. } => "expected",
            HandlerOutcome::Skipped { .. } => "skipped",
            HandlerOutcome::Received => "received",
        }
    }
}

impl fmt::Display for HandlerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOutcome::Synced => write!(f, "synced"),
            HandlerOutcome::Duplicate => write!(f, "duplicate"),
            HandlerOutcome::ExpectedChange { reason: Some(r) } =>
                write!(f, "expected change ({})", r),
            HandlerOutcome::ExpectedChange { reason: None } =>
                write!(f, "expected change"),
            HandlerOutcome::Skipped { reason } =>
                write!(f, "skipped: {}", reason),
            HandlerOutcome::Received => write!(f, "received"),
        }
    }
}
