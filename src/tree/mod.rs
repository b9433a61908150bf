//! The discovery tree: a bounded-fan-out hash tree over record and link
//! leaves, rooted in a signed entry at the apex domain.
//!
//! Building and signing are publisher-side operations; the resolver
//! client in [`crate::resolver`] reconstructs and verifies the same
//! structure from DNS TXT lookups.

mod builder;
pub mod entry;

pub use entry::{
    verify_label, Entry, LinkEntry, RecordEntry, RootEntry, SubtreeEntry, HASH_ABBREV, LABEL_LEN,
    LINK_PREFIX, MAX_SUBTREE_CHILDREN, RECORD_PREFIX, ROOT_PREFIX, SUBTREE_PREFIX,
    TXT_SIZE_BUDGET, URL_SCHEME,
};

use secp256k1::SecretKey;
use std::collections::HashMap;

use crate::error::Result;
use crate::record::Enr;

/// A complete tree: the signed (or not yet signed) root plus a
/// self-verifying map of content-hash label to entry.
///
/// The root is kept apart from the map because it is published at the
/// apex name rather than under a hash label.
#[derive(Debug, Clone)]
pub struct Tree {
    root: RootEntry,
    entries: HashMap<String, Entry>,
}

impl Tree {
    /// Partition `records` and `links` into a tree of subtree entries and
    /// an unsigned root at the given sequence number.
    ///
    /// Leaves are grouped in the order given; the same leaves in the same
    /// order always produce an identical tree.
    pub fn build(records: Vec<Enr>, links: Vec<LinkEntry>, seq: u64) -> Result<Self> {
        builder::build(records, links, seq)
    }

    pub(crate) fn from_parts(root: RootEntry, entries: HashMap<String, Entry>) -> Self {
        Self { root, entries }
    }

    /// The root entry.
    pub fn root(&self) -> &RootEntry {
        &self.root
    }

    /// The tree's update sequence number.
    pub fn seq(&self) -> u64 {
        self.root.seq()
    }

    /// Sign the root. Requires a built root subtree hash.
    pub fn sign(&mut self, secret: &SecretKey) -> Result<&mut Self> {
        self.root.sign(secret)?;
        Ok(self)
    }

    /// All entries, keyed by label. The root is not included.
    pub fn entries(&self) -> &HashMap<String, Entry> {
        &self.entries
    }

    /// Look up one entry by label.
    pub fn entry(&self, label: &str) -> Option<&Entry> {
        self.entries.get(label)
    }

    /// The node records stored in the tree's leaves.
    pub fn records(&self) -> impl Iterator<Item = &Enr> {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Record(record) => Some(record.record()),
            _ => None,
        })
    }

    /// Links to other trees, as `enrtree://` URLs.
    pub fn links(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Link(link) => Some(link.to_url()),
            _ => None,
        })
    }
}
