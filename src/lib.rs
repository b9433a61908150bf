//! Authenticated node lists over DNS.
//!
//! A large list of node records is split across many small DNS TXT
//! records, organized as a content-addressed hash tree so that every
//! client can verify integrity and authenticity, and can detect an
//! unchanged list with a single lookup.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        PUBLISHER                           │
//! │  Enr::sign         ←── signed key/value node records       │
//! │  Tree::build       ←── bounded-fan-out hash tree           │
//! │  Tree::sign        ←── recoverable signature on the root   │
//! │  zonefile::*       ←── TXT values for the DNS zone         │
//! ├────────────────────────────────────────────────────────────┤
//! │                        RESOLVER                            │
//! │  TreeClient::sync  ←── fetch root, verify signature,       │
//! │                        walk content-hash labels (BFS),     │
//! │                        reuse unchanged entries             │
//! │  TreeSync          ←── owns the committed tree per target  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are published as `enr=…`, links to other trees as
//! `enrtree-link=…`, interior nodes as `enrtree=…`, and the signed root
//! as `enrtree-root=v1 …`. Every non-root entry lives at the DNS label
//! derived from its own content hash, which doubles as its integrity
//! check.

pub mod b64;
pub mod base32;
pub mod crypto;
pub mod error;
pub mod iptrack;
pub mod record;
pub mod resolver;
pub mod rlp;
pub mod tree;
pub mod zonefile;

pub use error::{Error, Result};
pub use iptrack::IpTracker;
pub use record::{Enr, MAX_RECORD_SIZE};
pub use resolver::{
    ClientConfig, DnsResolver, StaticResolver, SyncOutcome, SystemResolver, TreeClient, TreeSync,
};
pub use tree::{
    verify_label, Entry, LinkEntry, RecordEntry, RootEntry, SubtreeEntry, Tree, HASH_ABBREV,
    MAX_SUBTREE_CHILDREN, TXT_SIZE_BUDGET,
};

// The signing key types are part of the public API surface.
pub use secp256k1::{PublicKey, SecretKey};
