//! Tree resolution over DNS TXT lookups.
//!
//! The client fetches the signed root at the apex domain, verifies it
//! against the expected public key, then walks the content-hash labels
//! breadth-first until the full entries map is reconstructed. Every
//! fetched entry is verified against the label it was requested under
//! before its children join the frontier. A resolution either completes
//! fully or fails as a whole; callers keep their previously committed
//! tree on any failure.
//!
//! Frontier fetches run in bounded parallel batches. Dropping an
//! in-flight resolution discards all of its partial work.

use async_trait::async_trait;
use futures::future::join_all;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tree::{entry, Entry, LinkEntry, RootEntry, Tree};
use crate::zonefile;

/// The abstract name-resolution capability.
///
/// Transport concerns (caching, retries, DNSSEC) belong to the
/// implementation; the tree client only consumes TXT value sequences.
/// An empty sequence and an explicit "no such domain" are equivalent.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// Production resolver backed by the operating system's DNS
/// configuration via hickory.
pub struct SystemResolver {
    resolver: hickory_resolver::TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> Self {
        use hickory_resolver::config::{ResolverConfig, ResolverOpts};
        Self {
            resolver: hickory_resolver::TokioAsyncResolver::tokio(
                ResolverConfig::default(),
                ResolverOpts::default(),
            ),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
        use hickory_resolver::error::ResolveErrorKind;

        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.iter()
                        .map(|data| String::from_utf8_lossy(data).to_string())
                        .collect::<Vec<_>>()
                        .join("")
                })
                .collect()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(vec![]),
            Err(e) => Err(Error::NotFound(format!("{}: {}", name, e))),
        }
    }
}

/// Map-backed resolver for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one TXT value under a name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.records.entry(name.into()).or_default().push(value.into());
    }

    /// Serve a signed tree the way its published zone would.
    pub fn from_tree(tree: &Tree, domain: &str) -> Result<Self> {
        let mut resolver = Self::new();
        for (name, value) in zonefile::txt_map(tree, domain)? {
            resolver.insert(name, value);
        }
        Ok(resolver)
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.records.get(name).cloned().unwrap_or_default())
    }
}

/// Client-side tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Concurrent TXT lookups during the tree walk.
    pub max_parallel_fetch: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_parallel_fetch: 4,
        }
    }
}

/// Outcome of one synchronization pass.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The root still points at the known subtree hash; the previous
    /// tree remains current. Costs exactly one TXT lookup.
    Unchanged,
    /// A fully verified new tree.
    Updated(Tree),
}

/// Stateless synchronization engine over a [`DnsResolver`].
pub struct TreeClient<R> {
    resolver: R,
    config: ClientConfig,
}

impl<R: DnsResolver> TreeClient<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, ClientConfig::default())
    }

    pub fn with_config(resolver: R, config: ClientConfig) -> Self {
        Self { resolver, config }
    }

    /// Fetch and verify the tree at `domain`, reusing entries from a
    /// previously resolved tree where labels are unchanged.
    ///
    /// The root signature is verified against `public_key` before any
    /// entry is fetched. Any parse, verification, or lookup failure
    /// aborts the whole pass without producing a partial tree.
    pub async fn sync(
        &self,
        domain: &str,
        public_key: &PublicKey,
        prev: Option<&Tree>,
    ) -> Result<SyncOutcome> {
        let root = self.fetch_root(domain, public_key).await?;

        if let Some(prev) = prev {
            if prev.root().subtree_root() == root.subtree_root() {
                debug!(domain, seq = root.seq(), "tree root unchanged");
                return Ok(SyncOutcome::Unchanged);
            }
        }

        let entries = self.resolve_missing(domain, &root, prev).await?;
        info!(
            "🌲 Synced tree at {}: {} entries, seq {}",
            domain,
            entries.len(),
            root.seq()
        );
        Ok(SyncOutcome::Updated(Tree::from_parts(root, entries)))
    }

    /// Like [`sync`](Self::sync), addressed by an `enrtree://` URL.
    pub async fn sync_url(&self, url: &str, prev: Option<&Tree>) -> Result<SyncOutcome> {
        let link = LinkEntry::from_url(url)?;
        self.sync(link.domain(), link.public_key(), prev).await
    }

    /// FETCH_ROOT and VERIFY_ROOT: scan apex TXT values for a root entry
    /// and check its signature before anything else happens.
    async fn fetch_root(&self, domain: &str, public_key: &PublicKey) -> Result<RootEntry> {
        let values = self.resolver.resolve_txt(domain).await?;
        for value in &values {
            match Entry::parse(value) {
                Ok(Some(Entry::Root(root))) => {
                    root.verify(public_key)?;
                    return Ok(root);
                }
                Ok(_) => continue,
                // a malformed root is worth reporting; other broken
                // values must not hide a good root
                Err(e) if value.starts_with(entry::ROOT_PREFIX) => return Err(e),
                Err(_) => continue,
            }
        }
        Err(Error::NotFound(format!("no tree root found at {}", domain)))
    }

    /// RESOLVE_MISSING: breadth-first walk over a deduplicated frontier,
    /// copying unchanged labels from `prev` and fetching the rest in
    /// bounded parallel batches.
    async fn resolve_missing(
        &self,
        domain: &str,
        root: &RootEntry,
        prev: Option<&Tree>,
    ) -> Result<HashMap<String, Entry>> {
        let mut entries = HashMap::new();
        let mut seen = HashSet::new();
        let mut frontier = VecDeque::new();

        seen.insert(root.subtree_root().to_string());
        frontier.push_back(root.subtree_root().to_string());

        while !frontier.is_empty() {
            let mut batch = Vec::new();
            while batch.len() < self.config.max_parallel_fetch.max(1) {
                let Some(label) = frontier.pop_front() else { break };
                match prev.and_then(|tree| tree.entry(&label)) {
                    Some(cached) => {
                        // cache reuse: copy without fetching, but still
                        // descend so the new map ends up complete
                        if let Entry::Subtree(subtree) = cached {
                            enqueue(subtree.children(), &mut seen, &mut frontier);
                        }
                        entries.insert(label, cached.clone());
                    }
                    None => batch.push(label),
                }
            }
            if batch.is_empty() {
                continue;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|label| self.resolve_entry(domain, label)),
            )
            .await;

            for (label, result) in batch.into_iter().zip(results) {
                let fetched = result?;
                match &fetched {
                    Entry::Subtree(subtree) => {
                        enqueue(subtree.children(), &mut seen, &mut frontier)
                    }
                    Entry::Record(_) | Entry::Link(_) => {}
                    Entry::Root(_) => {
                        return Err(Error::Parse(format!(
                            "unexpected root entry under label {}",
                            label
                        )))
                    }
                }
                entries.insert(label, fetched);
            }
        }

        Ok(entries)
    }

    /// Fetch one entry at `<label>.<domain>` and verify it against the
    /// label it was requested under.
    async fn resolve_entry(&self, domain: &str, label: &str) -> Result<Entry> {
        let name = format!("{}.{}", label, domain);
        let values = self.resolver.resolve_txt(&name).await?;
        for value in &values {
            if let Some(parsed) = Entry::parse(value)? {
                entry::verify_label(value, label)?;
                debug!(name = %name, "resolved tree entry");
                return Ok(parsed);
            }
        }
        Err(Error::NotFound(format!("no tree entry found at {}", name)))
    }
}

fn enqueue(children: &[String], seen: &mut HashSet<String>, frontier: &mut VecDeque<String>) {
    for child in children {
        if seen.insert(child.clone()) {
            frontier.push_back(child.clone());
        }
    }
}

/// Stateful wrapper that owns the committed tree for one target.
///
/// `update` swaps in a new tree only after a fully consistent
/// resolution; on any failure the previously committed tree stays
/// visible to readers.
pub struct TreeSync<R> {
    client: TreeClient<R>,
    domain: String,
    public_key: PublicKey,
    tree: Option<Tree>,
}

impl<R: DnsResolver> TreeSync<R> {
    pub fn new(client: TreeClient<R>, domain: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            client,
            domain: domain.into(),
            public_key,
            tree: None,
        }
    }

    /// Construct from an `enrtree://` URL.
    pub fn from_url(client: TreeClient<R>, url: &str) -> Result<Self> {
        let link = LinkEntry::from_url(url)?;
        Ok(Self::new(client, link.domain().to_string(), *link.public_key()))
    }

    /// The target domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The committed tree, if a resolution has completed.
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Run one synchronization pass and return the committed tree.
    pub async fn update(&mut self) -> Result<&Tree> {
        match self
            .client
            .sync(&self.domain, &self.public_key, self.tree.as_ref())
            .await?
        {
            SyncOutcome::Unchanged => {}
            SyncOutcome::Updated(tree) => self.tree = Some(tree),
        }
        self.tree
            .as_ref()
            .ok_or(Error::State("no tree committed"))
    }
}
