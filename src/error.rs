//! Error taxonomy shared across the crate.
//!
//! Every verification failure during resolution aborts that resolution and
//! surfaces here; nothing is downgraded to "skip this entry".

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by record codecs, tree construction, and resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed textual entry or canonical encoding.
    #[error("parse error: {0}")]
    Parse(String),

    /// Signature mismatch or content-hash/label mismatch during resolution.
    #[error("verification failed: {0}")]
    Verify(String),

    /// Unsupported identity scheme, wrong public-key length, or a record
    /// signature that does not verify.
    #[error("signature error: {0}")]
    Signature(String),

    /// Record or tree entry exceeds the protocol byte budget.
    #[error("{kind} is {size} bytes, exceeds the {limit}-byte limit")]
    Size {
        kind: &'static str,
        size: usize,
        limit: usize,
    },

    /// No usable DNS data at the queried name.
    #[error("no tree data found at {0}")]
    NotFound(String),

    /// Operation requires prior signing or building that has not occurred.
    #[error("invalid state: {0}")]
    State(&'static str),
}
