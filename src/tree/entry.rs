//! Tree entry kinds and their canonical text forms.
//!
//! Every entry is identified by the base32 abbreviation of the keccak256
//! hash of its text; the label doubles as the DNS name the entry is
//! published under and as its integrity check. The root is the one
//! exception: it lives at the apex domain and is authenticated by a
//! recoverable signature instead of a content hash.
//!
//! Exactly one protocol revision is implemented. Hash abbreviation
//! length, label alphabet, and entry prefixes belong to that revision and
//! are never mixed with constants from other revisions.

use secp256k1::{PublicKey, SecretKey};

use crate::crypto;
use crate::error::{Error, Result};
use crate::record::Enr;
use crate::{b64, base32};

/// Entry prefix for records.
pub const RECORD_PREFIX: &str = "enr=";

/// Entry prefix for links to other trees.
pub const LINK_PREFIX: &str = "enrtree-link=";

/// Entry prefix for subtrees.
pub const SUBTREE_PREFIX: &str = "enrtree=";

/// Entry prefix for the signed root.
pub const ROOT_PREFIX: &str = "enrtree-root=v1";

/// URL scheme of the standalone link form.
pub const URL_SCHEME: &str = "enrtree://";

/// Bytes of the content hash kept in a label.
pub const HASH_ABBREV: usize = 16;

/// Size budget for one TXT value.
pub const TXT_SIZE_BUDGET: usize = 300;

/// Characters of a base32 label: ceil(HASH_ABBREV * 8 / 5).
pub const LABEL_LEN: usize = (HASH_ABBREV * 8 + 4) / 5;

/// Maximum children per subtree, the TXT budget divided by the label
/// width (rounded to nearest).
pub const MAX_SUBTREE_CHILDREN: usize = (TXT_SIZE_BUDGET + LABEL_LEN / 2) / LABEL_LEN;

/// One entry of the discovery tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Root(RootEntry),
    Subtree(SubtreeEntry),
    Record(RecordEntry),
    Link(LinkEntry),
}

/// Registered textual prefixes, one per entry kind. Dispatch is strict:
/// a text matching no registered prefix is "no match", not an error, so
/// unknown record types can share a DNS zone with the tree.
const PARSERS: &[(&str, fn(&str) -> Result<Entry>)] = &[
    (ROOT_PREFIX, parse_root),
    (LINK_PREFIX, parse_link),
    (SUBTREE_PREFIX, parse_subtree),
    (RECORD_PREFIX, parse_record),
];

fn parse_root(text: &str) -> Result<Entry> {
    RootEntry::parse(text).map(Entry::Root)
}

fn parse_link(text: &str) -> Result<Entry> {
    LinkEntry::parse(text).map(Entry::Link)
}

fn parse_subtree(text: &str) -> Result<Entry> {
    SubtreeEntry::parse(text).map(Entry::Subtree)
}

fn parse_record(text: &str) -> Result<Entry> {
    RecordEntry::parse(text).map(Entry::Record)
}

impl Entry {
    /// Parse a TXT value. `Ok(None)` means no registered prefix matched;
    /// an error means the prefix matched but the body is malformed.
    pub fn parse(text: &str) -> Result<Option<Entry>> {
        for (prefix, parse) in PARSERS {
            if text.starts_with(prefix) {
                return parse(text).map(Some);
            }
        }
        Ok(None)
    }

    /// Canonical text form.
    pub fn text(&self) -> Result<String> {
        match self {
            Entry::Root(root) => root.text(),
            Entry::Subtree(subtree) => Ok(subtree.text()),
            Entry::Record(record) => record.text(),
            Entry::Link(link) => Ok(link.text()),
        }
    }

    /// Content hash of the canonical text.
    pub fn hash(&self) -> Result<[u8; 32]> {
        Ok(crypto::keccak256(self.text()?.as_bytes()))
    }

    /// DNS label: the abbreviated content hash in base32.
    pub fn label(&self) -> Result<String> {
        Ok(base32::encode(&self.hash()?[..HASH_ABBREV]))
    }
}

/// Check that `text` is the entry a label promised: the keccak256 digest
/// of the text must start with the decoded label bytes. This is the sole
/// integrity gate for every non-root entry.
pub fn verify_label(text: &str, label: &str) -> Result<()> {
    let want = base32::decode(label)?;
    if want.is_empty() {
        return Err(Error::Parse("empty hash label".into()));
    }
    let digest = crypto::keccak256(text.as_bytes());
    if !digest.starts_with(&want) {
        return Err(Error::Verify(format!("entry does not match label {}", label)));
    }
    Ok(())
}

// === Root ===

/// The signed tree root, published at the apex domain.
#[derive(Debug, Clone, PartialEq)]
pub struct RootEntry {
    subtree_root: String,
    seq: u64,
    signature: Option<[u8; crypto::RECOVERABLE_SIG_LEN]>,
}

impl RootEntry {
    /// Create an unsigned root pointing at a subtree label.
    pub fn new(subtree_root: String, seq: u64) -> Self {
        Self {
            subtree_root,
            seq,
            signature: None,
        }
    }

    /// Label of the top subtree.
    pub fn subtree_root(&self) -> &str {
        &self.subtree_root
    }

    /// Update sequence number of the tree.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The signed portion of the text form.
    pub fn signed_text(&self) -> String {
        format!(
            "{} hash={} seq={}",
            ROOT_PREFIX, self.subtree_root, self.seq
        )
    }

    fn digest(&self) -> [u8; 32] {
        crypto::keccak256(self.signed_text().as_bytes())
    }

    /// Sign the root. Re-signing overwrites the previous signature.
    pub fn sign(&mut self, secret: &SecretKey) -> Result<()> {
        if self.subtree_root.is_empty() {
            return Err(Error::State("root subtree hash has not been computed"));
        }
        self.signature = Some(crypto::sign_recoverable(secret, &self.digest()));
        Ok(())
    }

    /// Verify the root signature against an expected public key.
    pub fn verify(&self, public_key: &PublicKey) -> Result<()> {
        let signature = self.signature.ok_or(Error::State("root is not signed"))?;
        if !crypto::verify(public_key, &self.digest(), &signature[..crypto::SIG_LEN]) {
            return Err(Error::Verify("invalid signature on tree root".into()));
        }
        Ok(())
    }

    /// Full text form, including the signature.
    pub fn text(&self) -> Result<String> {
        let signature = self.signature.ok_or(Error::State("root is not signed"))?;
        Ok(format!(
            "{} sig={}",
            self.signed_text(),
            b64::encode(&signature)
        ))
    }

    fn parse(text: &str) -> Result<Self> {
        let body = text
            .strip_prefix(ROOT_PREFIX)
            .ok_or_else(|| Error::Parse(format!("invalid tree root {}", text)))?;

        let mut fields = body.split_ascii_whitespace();
        let subtree_root = parse_field(fields.next(), "hash")?;
        let seq_text = parse_field(fields.next(), "seq")?;
        let sig_text = parse_field(fields.next(), "sig")?;
        if fields.next().is_some() {
            return Err(Error::Parse(format!("trailing fields in tree root {}", text)));
        }

        if subtree_root.len() < 10 || !subtree_root.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::Parse(format!("invalid root hash {}", subtree_root)));
        }
        let seq = seq_text
            .parse::<u64>()
            .map_err(|_| Error::Parse(format!("invalid root seq {}", seq_text)))?;
        let sig_bytes = b64::decode(sig_text)?;
        let signature: [u8; crypto::RECOVERABLE_SIG_LEN] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Parse(format!("invalid signature length {}", sig_bytes.len())))?;

        Ok(Self {
            subtree_root: subtree_root.to_string(),
            seq,
            signature: Some(signature),
        })
    }
}

fn parse_field<'a>(field: Option<&'a str>, key: &str) -> Result<&'a str> {
    field
        .and_then(|f| f.strip_prefix(key))
        .and_then(|f| f.strip_prefix('='))
        .ok_or_else(|| Error::Parse(format!("missing {}= field in tree root", key)))
}

// === Subtree ===

/// An interior node referencing up to [`MAX_SUBTREE_CHILDREN`] children
/// by label.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtreeEntry {
    children: Vec<String>,
}

impl SubtreeEntry {
    pub fn new(children: Vec<String>) -> Self {
        debug_assert!(children.len() <= MAX_SUBTREE_CHILDREN);
        Self { children }
    }

    /// Labels of the children, in order.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn text(&self) -> String {
        format!("{}{}", SUBTREE_PREFIX, self.children.join(","))
    }

    fn parse(text: &str) -> Result<Self> {
        let body = text
            .strip_prefix(SUBTREE_PREFIX)
            .ok_or_else(|| Error::Parse(format!("invalid subtree entry {}", text)))?;
        if body.is_empty() {
            return Ok(Self { children: vec![] });
        }
        let children: Vec<String> = body.split(',').map(str::to_string).collect();
        if children.iter().any(String::is_empty) {
            return Err(Error::Parse(format!("empty child label in {}", text)));
        }
        Ok(Self { children })
    }
}

// === Record leaf ===

/// A leaf wrapping one signed node record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    record: Enr,
}

impl RecordEntry {
    pub fn new(record: Enr) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &Enr {
        &self.record
    }

    pub fn text(&self) -> Result<String> {
        Ok(format!("{}{}", RECORD_PREFIX, b64::encode(self.record.encode()?)))
    }

    fn parse(text: &str) -> Result<Self> {
        let body = text
            .strip_prefix(RECORD_PREFIX)
            .ok_or_else(|| Error::Parse(format!("invalid record entry {}", text)))?;
        // decoding verifies the record's own signature
        let record = Enr::from_rlp(&b64::decode(body)?)?;
        Ok(Self { record })
    }
}

// === Link leaf ===

/// A leaf referencing another independently rooted tree. Opaque to this
/// tree's verification; resolving the target is an explicit, separate
/// operation by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEntry {
    domain: String,
    public_key: PublicKey,
}

impl LinkEntry {
    pub fn new(domain: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            domain: domain.into(),
            public_key,
        }
    }

    /// Target domain of the linked tree.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Expected signer of the linked tree's root.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn body(&self) -> String {
        format!(
            "{}@{}",
            base32::encode(&self.public_key.serialize()),
            self.domain
        )
    }

    pub fn text(&self) -> String {
        format!("{}{}", LINK_PREFIX, self.body())
    }

    /// Standalone URL form: `enrtree://<key>@<domain>`.
    pub fn to_url(&self) -> String {
        format!("{}{}", URL_SCHEME, self.body())
    }

    /// Parse the standalone URL form.
    pub fn from_url(url: &str) -> Result<Self> {
        let body = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| Error::Parse(format!("invalid tree URL {}", url)))?;
        Self::parse_body(body, url)
    }

    fn parse(text: &str) -> Result<Self> {
        let body = text
            .strip_prefix(LINK_PREFIX)
            .ok_or_else(|| Error::Parse(format!("invalid link entry {}", text)))?;
        Self::parse_body(body, text)
    }

    fn parse_body(body: &str, context: &str) -> Result<Self> {
        let (key_text, domain) = body
            .split_once('@')
            .ok_or_else(|| Error::Parse(format!("missing @ in link {}", context)))?;
        if domain.is_empty() || domain.contains(char::is_whitespace) {
            return Err(Error::Parse(format!("invalid domain in link {}", context)));
        }
        let key_bytes = base32::decode(key_text)?;
        let public_key = crypto::parse_pubkey(&key_bytes)
            .map_err(|e| Error::Parse(format!("invalid public key in {}: {}", context, e)))?;
        Ok(Self {
            domain: domain.to_string(),
            public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, public_key, secret_from_hex};
    use std::net::Ipv4Addr;

    fn test_secret() -> SecretKey {
        secret_from_hex("49a7b37aa6f6645917e7b807e9d1c00d4fa71f18343b0d4122a4d2df64dd6fee")
            .unwrap()
    }

    fn signed_record() -> Enr {
        let mut record = Enr::new();
        record.set_ip(Ipv4Addr::new(203, 0, 113, 1));
        record.sign(&test_secret()).unwrap();
        record
    }

    #[test]
    fn test_constants() {
        assert_eq!(LABEL_LEN, 26);
        assert_eq!(MAX_SUBTREE_CHILDREN, 12);
    }

    #[test]
    fn test_parse_dispatch() {
        let (_, pubkey) = generate_keypair();
        let link = LinkEntry::new("nodes.example.org", pubkey);
        let subtree = SubtreeEntry::new(vec!["AAAAAAAAAAAAAAAAAAAAAAAAAA".into()]);
        let record = RecordEntry::new(signed_record());

        assert!(matches!(
            Entry::parse(&link.text()).unwrap(),
            Some(Entry::Link(_))
        ));
        assert!(matches!(
            Entry::parse(&subtree.text()).unwrap(),
            Some(Entry::Subtree(_))
        ));
        assert!(matches!(
            Entry::parse(&record.text().unwrap()).unwrap(),
            Some(Entry::Record(_))
        ));

        // unregistered prefixes are "no match", not errors
        assert!(Entry::parse("v=spf1 include:example.org ~all")
            .unwrap()
            .is_none());
        assert!(Entry::parse("").unwrap().is_none());

        // a matching prefix with a bad body is an error
        assert!(Entry::parse("enr=!!!").is_err());
    }

    #[test]
    fn test_root_sign_verify_roundtrip() {
        let secret = test_secret();
        let mut root = RootEntry::new("TO4Q75OQ2N7DX4EOOR7X66A6OM".into(), 3);

        assert!(matches!(root.text(), Err(Error::State(_))));
        root.sign(&secret).unwrap();
        root.verify(&public_key(&secret)).unwrap();

        let text = root.text().unwrap();
        let parsed = match Entry::parse(&text).unwrap() {
            Some(Entry::Root(parsed)) => parsed,
            other => panic!("expected root entry, got {:?}", other),
        };
        assert_eq!(parsed, root);
        assert_eq!(parsed.seq(), 3);
        parsed.verify(&public_key(&secret)).unwrap();

        let (_, wrong_key) = generate_keypair();
        assert!(matches!(parsed.verify(&wrong_key), Err(Error::Verify(_))));
    }

    #[test]
    fn test_root_sign_requires_subtree_hash() {
        let mut root = RootEntry::new(String::new(), 1);
        assert!(matches!(root.sign(&test_secret()), Err(Error::State(_))));
    }

    #[test]
    fn test_root_parse_rejects_malformed() {
        // signature is 64 bytes, one short of recoverable form
        let short_sig = b64::encode(&[0u8; 64]);
        let text = format!(
            "enrtree-root=v1 hash=TO4Q75OQ2N7DX4EOOR7X66A6OM seq=1 sig={}",
            short_sig
        );
        assert!(Entry::parse(&text).is_err());

        assert!(Entry::parse("enrtree-root=v1 hash=TO4Q seq=1 sig=AA").is_err());
        assert!(Entry::parse("enrtree-root=v1 seq=1").is_err());
        assert!(Entry::parse("enrtree-root=v1 hash=TO4Q75OQ2N7DX4EOOR7X66A6OM seq=x sig=AA").is_err());
    }

    #[test]
    fn test_subtree_roundtrip() {
        let children = vec![
            "TO4Q75OQ2N7DX4EOOR7X66A6OM".to_string(),
            "MHTDO6TMUBRIA2XWG5LUDACK24".to_string(),
        ];
        let subtree = SubtreeEntry::new(children.clone());
        assert_eq!(
            subtree.text(),
            "enrtree=TO4Q75OQ2N7DX4EOOR7X66A6OM,MHTDO6TMUBRIA2XWG5LUDACK24"
        );

        match Entry::parse(&subtree.text()).unwrap() {
            Some(Entry::Subtree(parsed)) => assert_eq!(parsed.children(), children.as_slice()),
            other => panic!("expected subtree entry, got {:?}", other),
        }

        // empty subtree is legal; empty labels inside a list are not
        assert!(matches!(
            Entry::parse("enrtree=").unwrap(),
            Some(Entry::Subtree(s)) if s.children().is_empty()
        ));
        assert!(Entry::parse("enrtree=AA,,BB").is_err());
    }

    #[test]
    fn test_record_entry_verifies_inner_signature() {
        let entry = RecordEntry::new(signed_record());
        let text = entry.text().unwrap();

        match Entry::parse(&text).unwrap() {
            Some(Entry::Record(parsed)) => assert_eq!(parsed.record(), entry.record()),
            other => panic!("expected record entry, got {:?}", other),
        }

        // flip one character of the body: either the encoding or the
        // record signature must now fail
        let mut tampered = text.into_bytes();
        let mid = tampered.len() / 2;
        tampered[mid] = if tampered[mid] == b'A' { b'B' } else { b'A' };
        assert!(Entry::parse(std::str::from_utf8(&tampered).unwrap()).is_err());
    }

    #[test]
    fn test_link_roundtrip() {
        let (_, pubkey) = generate_keypair();
        let link = LinkEntry::new("morenodes.example.org", pubkey);

        match Entry::parse(&link.text()).unwrap() {
            Some(Entry::Link(parsed)) => {
                assert_eq!(parsed.domain(), "morenodes.example.org");
                assert_eq!(parsed.public_key(), &pubkey);
            }
            other => panic!("expected link entry, got {:?}", other),
        }

        let url = link.to_url();
        assert!(url.starts_with("enrtree://"));
        assert_eq!(LinkEntry::from_url(&url).unwrap(), link);

        assert!(LinkEntry::from_url("enrtree://nodomainseparator").is_err());
        assert!(LinkEntry::from_url("https://example.org").is_err());
        // a key that does not decode to 33 bytes
        assert!(LinkEntry::from_url("enrtree://MZXW6YTB@example.org").is_err());
    }

    #[test]
    fn test_labels_and_verify_label() {
        let entry = Entry::Record(RecordEntry::new(signed_record()));
        let text = entry.text().unwrap();
        let label = entry.label().unwrap();

        assert_eq!(label.len(), LABEL_LEN);
        verify_label(&text, &label).unwrap();

        // any flipped byte of the fetched text must be detected
        let mut tampered = text.clone().into_bytes();
        tampered[0] = b'x';
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(matches!(
            verify_label(&tampered, &label),
            Err(Error::Verify(_))
        ));

        // labels fold case the way DNS does
        verify_label(&text, &label.to_ascii_lowercase()).unwrap();
    }
}
