//! Zone-file emission for publishing a signed tree.
//!
//! Produces the TXT values verbatim from the entry text forms; nothing
//! here affects protocol correctness. The map form feeds DNS provider
//! APIs, the zone-file form feeds bind-style servers.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};
use crate::tree::Tree;

/// Map every published name to its TXT value. The apex name carries the
/// signed root; every other entry lives under its hash label.
pub fn txt_map(tree: &Tree, domain: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    map.insert(domain.to_string(), tree.root().text()?);
    for (label, entry) in tree.entries() {
        map.insert(format!("{}.{}", label, domain), entry.text()?);
    }
    Ok(map)
}

/// Render a bind-style zone file fragment with quoted TXT records.
pub fn to_zonefile(tree: &Tree, domain: &str, ttl: u32) -> Result<String> {
    let mut out = format!("$ORIGIN {}.\n", domain);
    out.push_str(&format!("@ {} IN TXT \"{}\"\n", ttl, tree.root().text()?));

    // sorted labels give stable output across runs
    let labels: BTreeMap<&String, _> = tree.entries().iter().collect();
    for (label, entry) in labels {
        out.push_str(&format!("{} {} IN TXT \"{}\"\n", label, ttl, entry.text()?));
    }
    Ok(out)
}

/// The TXT map as pretty JSON, for provider APIs that take record sets.
pub fn to_json(tree: &Tree, domain: &str) -> Result<String> {
    serde_json::to_string_pretty(&txt_map(tree, domain)?)
        .map_err(|e| Error::Parse(format!("json rendering failed: {}", e)))
}

/// Write rendered zone content to disk atomically (temp file + rename).
pub async fn write_zonefile(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("zone.tmp");
    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, path).await
}
