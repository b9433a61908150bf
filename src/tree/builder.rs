//! Tree construction from a flat leaf set.

use std::collections::HashMap;

use super::entry::{Entry, LinkEntry, RecordEntry, RootEntry, SubtreeEntry, MAX_SUBTREE_CHILDREN};
use super::Tree;
use crate::error::Result;
use crate::record::Enr;
use tracing::debug;

/// Partition leaves into consecutive groups of at most
/// [`MAX_SUBTREE_CHILDREN`], one subtree per group, then repeat on the
/// group roots until a single subtree remains. Records must already be
/// signed; an unsigned record fails with a state error.
pub(super) fn build(records: Vec<Enr>, links: Vec<LinkEntry>, seq: u64) -> Result<Tree> {
    let leaves: Vec<Entry> = records
        .into_iter()
        .map(|record| Entry::Record(RecordEntry::new(record)))
        .chain(links.into_iter().map(Entry::Link))
        .collect();

    let mut entries = HashMap::with_capacity(leaves.len() * 2);
    let mut level = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let label = leaf.label()?;
        level.push(label.clone());
        entries.insert(label, leaf);
    }

    let root_label = loop {
        if level.len() <= MAX_SUBTREE_CHILDREN {
            let subtree = SubtreeEntry::new(level);
            let label = Entry::Subtree(subtree.clone()).label()?;
            entries.insert(label.clone(), Entry::Subtree(subtree));
            break label;
        }
        let mut parents = Vec::with_capacity(level.len() / MAX_SUBTREE_CHILDREN + 1);
        for group in level.chunks(MAX_SUBTREE_CHILDREN) {
            let subtree = SubtreeEntry::new(group.to_vec());
            let label = Entry::Subtree(subtree.clone()).label()?;
            parents.push(label.clone());
            entries.insert(label, Entry::Subtree(subtree));
        }
        level = parents;
    };

    debug!(
        entries = entries.len(),
        seq, root = %root_label,
        "built discovery tree"
    );

    Ok(Tree::from_parts(RootEntry::new(root_label, seq), entries))
}

#[cfg(test)]
mod tests {
    use super::super::entry::verify_label;
    use super::*;
    use crate::crypto::{generate_keypair, public_key, secret_from_hex};
    use secp256k1::SecretKey;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;

    fn test_secret() -> SecretKey {
        secret_from_hex("45a915e4d060149eb4365960e6a7a45f334393093061116b197e3240065ff2d8")
            .unwrap()
    }

    fn make_records(n: usize) -> Vec<Enr> {
        let secret = test_secret();
        (0..n)
            .map(|i| {
                let mut record = Enr::new();
                record
                    .set_ip(Ipv4Addr::new(10, (i >> 8) as u8, i as u8, 1))
                    .set_udp(30303);
                record.sign(&secret).unwrap();
                record
            })
            .collect()
    }

    fn subtree_count(tree: &Tree) -> usize {
        tree.entries()
            .values()
            .filter(|e| matches!(e, Entry::Subtree(_)))
            .count()
    }

    #[test]
    fn test_small_tree_is_single_level() {
        let (_, link_key) = generate_keypair();
        let links = vec![LinkEntry::new("morenodes.example.org", link_key)];
        let tree = Tree::build(make_records(2), links, 3).unwrap();

        // one subtree over three leaves
        assert_eq!(tree.entries().len(), 4);
        assert_eq!(subtree_count(&tree), 1);
        assert_eq!(tree.seq(), 3);
        assert_eq!(tree.records().count(), 2);
        assert_eq!(tree.links().count(), 1);

        match tree.entry(tree.root().subtree_root()).unwrap() {
            Entry::Subtree(subtree) => assert_eq!(subtree.children().len(), 3),
            other => panic!("root label points at {:?}", other),
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = Tree::build(vec![], vec![], 1).unwrap();
        assert_eq!(tree.entries().len(), 1);
        match tree.entry(tree.root().subtree_root()).unwrap() {
            Entry::Subtree(subtree) => assert!(subtree.children().is_empty()),
            other => panic!("root label points at {:?}", other),
        }
    }

    #[test]
    fn test_large_tree_has_multiple_levels() {
        let tree = Tree::build(make_records(500), vec![], 1).unwrap();

        // 500 leaves cannot fit under one subtree within the TXT budget:
        // 42 first-level groups, 4 second-level, 1 root subtree
        assert_eq!(tree.records().count(), 500);
        assert!(subtree_count(&tree) >= 42 + 4 + 1);

        // the root subtree references other subtrees, not leaves
        match tree.entry(tree.root().subtree_root()).unwrap() {
            Entry::Subtree(top) => {
                assert!(top.children().len() <= MAX_SUBTREE_CHILDREN);
                for child in top.children() {
                    assert!(matches!(tree.entry(child), Some(Entry::Subtree(_))));
                }
            }
            other => panic!("root label points at {:?}", other),
        }
    }

    #[test]
    fn test_every_label_matches_its_entry() {
        let (_, link_key) = generate_keypair();
        let links = vec![LinkEntry::new("other.example.org", link_key)];
        let tree = Tree::build(make_records(30), links, 7).unwrap();

        for (label, entry) in tree.entries() {
            verify_label(&entry.text().unwrap(), label).unwrap();
            assert_eq!(&entry.label().unwrap(), label);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let records = make_records(40);
        let a = Tree::build(records.clone(), vec![], 5).unwrap();
        let b = Tree::build(records, vec![], 5).unwrap();

        assert_eq!(a.root().subtree_root(), b.root().subtree_root());
        let labels_a: HashSet<&String> = a.entries().keys().collect();
        let labels_b: HashSet<&String> = b.entries().keys().collect();
        assert_eq!(labels_a, labels_b);
    }

    #[test]
    fn test_unsigned_record_fails_build() {
        let mut record = Enr::new();
        record.set_udp(30303);
        assert!(Tree::build(vec![record], vec![], 1).is_err());
    }

    #[test]
    fn test_sign_and_verify_root() {
        let secret = test_secret();
        let mut tree = Tree::build(make_records(3), vec![], 2).unwrap();

        tree.sign(&secret).unwrap();
        tree.root().verify(&public_key(&secret)).unwrap();

        let (_, other_key) = generate_keypair();
        assert!(tree.root().verify(&other_key).is_err());
    }
}
