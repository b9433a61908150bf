//! Signed node records.
//!
//! A record is a small key/value descriptor for one network node, signed
//! by the node's identity key and canonically encoded so that any two
//! parties produce byte-identical encodings for the same content. Records
//! are mutated freely while unsigned; `sign` freezes the current content
//! into a cached wire encoding, and any later mutation invalidates both
//! the signature and the cached bytes together.

use secp256k1::{PublicKey, SecretKey};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::crypto;
use crate::error::{Error, Result};
use crate::{b64, rlp};

/// Maximum encoded record size in bytes.
pub const MAX_RECORD_SIZE: usize = 300;

/// Identity-scheme key.
const ID_KEY: &[u8] = b"id";

/// The only supported identity scheme: secp256k1 keys, keccak256 digests.
const ID_SCHEME_V4: &[u8] = b"v4";

/// Public-key entry for the v4 identity scheme (33-byte compressed SEC1).
const PUBKEY_KEY: &[u8] = b"secp256k1";

/// Prefix of the standalone text form.
pub const RECORD_TEXT_PREFIX: &str = "enr:";

/// A signed key/value node record.
///
/// Keys and values are byte strings; keys are kept in canonical ascending
/// byte order. `seq` strictly increases with every signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enr {
    seq: u64,
    kv: BTreeMap<Vec<u8>, Vec<u8>>,
    signature: Option<[u8; crypto::SIG_LEN]>,
    raw: Option<Vec<u8>>,
}

impl Default for Enr {
    fn default() -> Self {
        Self::new()
    }
}

impl Enr {
    /// Create an empty, unsigned record with `seq = 0`.
    pub fn new() -> Self {
        Self {
            seq: 0,
            kv: BTreeMap::new(),
            signature: None,
            raw: None,
        }
    }

    /// Current sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Look up a raw value.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&[u8]> {
        self.kv.get(key.as_ref()).map(Vec::as_slice)
    }

    /// Set a key/value pair. Invalidates any cached signature and encoding.
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.invalidate();
        self.kv.insert(key.as_ref().to_vec(), value.into());
        self
    }

    /// Remove a key. Removing an absent key is a logic error.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.invalidate();
        self.kv
            .remove(key.as_ref())
            .map(|_| ())
            .ok_or(Error::State("delete of a key that is not present"))
    }

    fn invalidate(&mut self) {
        self.signature = None;
        self.raw = None;
    }

    // === Well-known keys ===

    /// Set the IPv4 address (`ip`, 4 bytes).
    pub fn set_ip(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.set("ip", ip.octets().to_vec())
    }

    /// IPv4 address, if present and well-formed.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.get("ip")?.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    /// Set the IPv6 address (`ip6`, 16 bytes).
    pub fn set_ip6(&mut self, ip: Ipv6Addr) -> &mut Self {
        self.set("ip6", ip.octets().to_vec())
    }

    /// IPv6 address, if present and well-formed.
    pub fn ip6(&self) -> Option<Ipv6Addr> {
        let octets: [u8; 16] = self.get("ip6")?.try_into().ok()?;
        Some(Ipv6Addr::from(octets))
    }

    /// Set the UDP port (`udp`, minimal big-endian integer).
    pub fn set_udp(&mut self, port: u16) -> &mut Self {
        self.set("udp", rlp::encode_uint(u64::from(port)))
    }

    /// UDP port, if present and well-formed.
    pub fn udp(&self) -> Option<u16> {
        port_value(self.get("udp")?)
    }

    /// Set the TCP port (`tcp`, minimal big-endian integer).
    pub fn set_tcp(&mut self, port: u16) -> &mut Self {
        self.set("tcp", rlp::encode_uint(u64::from(port)))
    }

    /// TCP port, if present and well-formed.
    pub fn tcp(&self) -> Option<u16> {
        port_value(self.get("tcp")?)
    }

    /// The declared compressed public key, parsed.
    pub fn public_key(&self) -> Result<PublicKey> {
        let bytes = self
            .get(PUBKEY_KEY)
            .ok_or(Error::State("record has no public key"))?;
        crypto::parse_pubkey(bytes)
    }

    // === Signing and encoding ===

    /// Sign the record, bumping `seq` and installing the identity scheme
    /// and public key.
    ///
    /// Either the sequence number, key/value entries, signature, and
    /// cached encoding all update together, or (when the result would
    /// exceed [`MAX_RECORD_SIZE`]) nothing changes and `Size` is returned.
    pub fn sign(&mut self, secret: &SecretKey) -> Result<&mut Self> {
        let seq = self.seq + 1;
        let mut kv = self.kv.clone();
        kv.insert(ID_KEY.to_vec(), ID_SCHEME_V4.to_vec());
        kv.insert(
            PUBKEY_KEY.to_vec(),
            crypto::public_key(secret).serialize().to_vec(),
        );

        let content = content_items(seq, &kv);
        let digest = crypto::keccak256(&rlp::encode_list(&content));
        let sig65 = crypto::sign_recoverable(secret, &digest);
        let mut signature = [0u8; crypto::SIG_LEN];
        signature.copy_from_slice(&sig65[..crypto::SIG_LEN]);

        let mut items = Vec::with_capacity(content.len() + 1);
        items.push(signature.to_vec());
        items.extend(content);
        let raw = rlp::encode_list(&items);
        if raw.len() > MAX_RECORD_SIZE {
            return Err(Error::Size {
                kind: "record",
                size: raw.len(),
                limit: MAX_RECORD_SIZE,
            });
        }

        self.seq = seq;
        self.kv = kv;
        self.signature = Some(signature);
        self.raw = Some(raw);
        Ok(self)
    }

    /// The cached wire encoding. Fails if the record was never signed, or
    /// was mutated after signing.
    pub fn encode(&self) -> Result<&[u8]> {
        self.raw
            .as_deref()
            .ok_or(Error::State("record is not signed"))
    }

    /// Decode and verify a wire encoding.
    pub fn from_rlp(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_RECORD_SIZE {
            return Err(Error::Size {
                kind: "record",
                size: data.len(),
                limit: MAX_RECORD_SIZE,
            });
        }
        let items = rlp::decode_list(data)?;
        if items.len() < 2 || items.len() % 2 != 0 {
            return Err(Error::Parse(format!(
                "invalid record element count {}",
                items.len()
            )));
        }

        let signature: [u8; crypto::SIG_LEN] = items[0]
            .as_slice()
            .try_into()
            .map_err(|_| Error::Signature(format!("invalid signature length {}", items[0].len())))?;
        let seq = rlp::decode_uint(&items[1])?;

        let mut kv = BTreeMap::new();
        let mut prev: Option<&[u8]> = None;
        for pair in items[2..].chunks(2) {
            let key = pair[0].as_slice();
            if prev.is_some_and(|p| p >= key) {
                return Err(Error::Parse("record keys are not strictly sorted".into()));
            }
            prev = Some(key);
            kv.insert(key.to_vec(), pair[1].clone());
        }

        let record = Self {
            seq,
            kv,
            signature: Some(signature),
            raw: Some(data.to_vec()),
        };
        record.verify_signature()?;
        Ok(record)
    }

    /// Verify the cached signature against the declared identity scheme
    /// and public key.
    fn verify_signature(&self) -> Result<()> {
        match self.get(ID_KEY) {
            Some(scheme) if scheme == ID_SCHEME_V4 => {}
            scheme => {
                return Err(Error::Signature(format!(
                    "unsupported identity scheme {:?}",
                    scheme.map(String::from_utf8_lossy)
                )))
            }
        }
        let pubkey = match self.get(PUBKEY_KEY) {
            Some(bytes) => crypto::parse_pubkey(bytes)?,
            None => return Err(Error::Signature("record has no public key".into())),
        };
        let signature = self
            .signature
            .ok_or(Error::State("record is not signed"))?;

        let content = content_items(self.seq, &self.kv);
        let digest = crypto::keccak256(&rlp::encode_list(&content));
        if !crypto::verify(&pubkey, &digest, &signature) {
            return Err(Error::Signature("invalid record signature".into()));
        }
        Ok(())
    }

    /// Node address: keccak256 of the uncompressed public key without its
    /// SEC1 tag byte. Used as a stable identifier by higher layers.
    pub fn node_addr(&self) -> Result<[u8; 32]> {
        let uncompressed = self.public_key()?.serialize_uncompressed();
        Ok(crypto::keccak256(&uncompressed[1..]))
    }

    /// Standalone text form: `enr:<base64url(encoding)>`.
    pub fn text(&self) -> Result<String> {
        Ok(format!("{}{}", RECORD_TEXT_PREFIX, b64::encode(self.encode()?)))
    }

    /// Parse the standalone text form. The `enr:` prefix is optional.
    pub fn from_text(text: &str) -> Result<Self> {
        let body = text.strip_prefix(RECORD_TEXT_PREFIX).unwrap_or(text);
        Self::from_rlp(&b64::decode(body)?)
    }
}

fn port_value(bytes: &[u8]) -> Option<u16> {
    let value = rlp::decode_uint(bytes).ok()?;
    u16::try_from(value).ok()
}

/// Canonical signed content: `[seq, k1, v1, k2, v2, …]` over sorted keys.
fn content_items(seq: u64, kv: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<Vec<u8>> {
    let mut items = Vec::with_capacity(1 + kv.len() * 2);
    items.push(rlp::encode_uint(seq));
    for (key, value) in kv {
        items.push(key.clone());
        items.push(value.clone());
    }
    items
}

impl fmt::Display for Enr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ENR seq={}", self.seq)?;
        for (key, value) in &self.kv {
            write!(
                f,
                " {}={}",
                String::from_utf8_lossy(key),
                hex::encode(value)
            )?;
        }
        write!(f, ">")
    }
}
