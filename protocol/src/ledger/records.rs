//! On-ledger record layouts.
//!
//! These are hand-encoded, little-endian, fixed-order byte layouts. Any
//! other client reading the ledger has to agree with them byte for byte,
//! so serde is not involved. Field order is the wire order.
//!
//! ```text
//! PostRecord          0x01 | author[32] | platform u8 | handle_len u8 | handle
//!                          | content_len u16 | content | bid u64 | timestamp i64
//! RegistrationRecord  0x02 | owner[32] | messaging_key[32] | registered_at i64
//! MessageRecord       0x03 | nonce[12] | ct_len u32 | ciphertext
//!                          | blob_len u16 | identity_blob | timestamp i64
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{AES_NONCE_LENGTH, MAX_CONTENT_LENGTH, MAX_HANDLE_LENGTH};
use crate::crypto::hash::sha256_multi;
use crate::crypto::{MessagingPublicKey, ShadowPublicKey};
use crate::error::ShadowError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record truncated")]
    Truncated,

    #[error("unexpected record kind tag {0:#04x}")]
    WrongKind(u8),

    #[error("unknown platform tag {0}")]
    UnknownPlatform(u8),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("field is not valid UTF-8")]
    InvalidUtf8,

    #[error("field too long: {field} is {len} bytes")]
    TooLong { field: &'static str, len: usize },

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

impl From<RecordError> for ShadowError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::InvalidHandle(_) | RecordError::UnknownPlatform(_) => {
                ShadowError::InvalidInput(e.to_string())
            }
            _ => ShadowError::Serialization(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Keys & Kinds
// ---------------------------------------------------------------------------

/// First byte of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordKind {
    Post = 0x01,
    Registration = 0x02,
    Message = 0x03,
}

impl RecordKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Post),
            0x02 => Some(Self::Registration),
            0x03 => Some(Self::Message),
            _ => None,
        }
    }
}

/// 32-byte ledger address of a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(pub [u8; 32]);

impl RecordKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", self.to_base58())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// `SHA-256("post" || author || target_bytes)`. One post per author and
/// target; a new identity is how a user posts again about the same target.
pub fn post_key(author: &ShadowPublicKey, target: &TargetDescriptor) -> RecordKey {
    RecordKey(sha256_multi(&[b"post", author.as_bytes(), &target.to_bytes()]))
}

/// Registrations live at the owner's own address.
pub fn registration_key(owner: &ShadowPublicKey) -> RecordKey {
    RecordKey(*owner.as_bytes())
}

/// `SHA-256("message" || nonce || ciphertext)`.
pub fn message_key(nonce: &[u8; AES_NONCE_LENGTH], ciphertext: &[u8]) -> RecordKey {
    RecordKey(sha256_multi(&[b"message", nonce, ciphertext]))
}

/// Escrow account holding all bids placed against one target.
///
/// `SHA-256("bid-vault" || target_bytes)`. Off-curve with overwhelming
/// probability, so nobody holds a key for it.
pub fn bid_vault_address(target: &TargetDescriptor) -> ShadowPublicKey {
    ShadowPublicKey::from_bytes(sha256_multi(&[b"bid-vault", &target.to_bytes()]))
}

// ---------------------------------------------------------------------------
// TargetDescriptor
// ---------------------------------------------------------------------------

/// Where the target account lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Platform {
    Native = 0,
    Twitter = 1,
    Instagram = 2,
    TikTok = 3,
}

impl Platform {
    pub fn from_tag(tag: u8) -> Result<Self, RecordError> {
        match tag {
            0 => Ok(Self::Native),
            1 => Ok(Self::Twitter),
            2 => Ok(Self::Instagram),
            3 => Ok(Self::TikTok),
            other => Err(RecordError::UnknownPlatform(other)),
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Twitter => write!(f, "twitter"),
            Self::Instagram => write!(f, "instagram"),
            Self::TikTok => write!(f, "tiktok"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "twitter" | "x" => Ok(Self::Twitter),
            "instagram" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::TikTok),
            other => Err(RecordError::InvalidHandle(format!("unknown platform '{}'", other))),
        }
    }
}

/// The account a post is about. Always normalized; construct through
/// [`TargetDescriptor::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetDescriptor {
    platform: Platform,
    handle: String,
}

impl TargetDescriptor {
    /// Trim, strip one leading `@`, lowercase, then require 1-64 chars of
    /// `[a-z0-9_.]`. `"@Alice "` and `"alice"` are the same target.
    pub fn new(platform: Platform, handle: &str) -> Result<Self, RecordError> {
        let trimmed = handle.trim();
        let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed);
        let normalized = stripped.to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(RecordError::InvalidHandle("empty handle".into()));
        }
        if normalized.len() > MAX_HANDLE_LENGTH {
            return Err(RecordError::InvalidHandle(format!(
                "handle exceeds {} characters",
                MAX_HANDLE_LENGTH
            )));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '.'))
        {
            return Err(RecordError::InvalidHandle(format!(
                "character '{}' not allowed",
                bad
            )));
        }

        Ok(Self {
            platform,
            handle: normalized,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// `platform u8 | handle_len u8 | handle`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.handle.len());
        self.write_to(&mut buf);
        buf
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.platform.tag());
        // Bounded by MAX_HANDLE_LENGTH at construction.
        buf.push(self.handle.len() as u8);
        buf.extend_from_slice(self.handle.as_bytes());
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, RecordError> {
        let platform = Platform::from_tag(reader.u8()?)?;
        let len = reader.u8()? as usize;
        let handle = reader.utf8(len)?;
        Self::new(platform, &handle)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:@{}", self.platform, self.handle)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A bid-ranked anonymous post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub author: ShadowPublicKey,
    pub target: TargetDescriptor,
    pub content: String,
    pub bid_lamports: u64,
    /// Unix seconds, stamped by the ledger at execution.
    pub timestamp: i64,
}

impl PostRecord {
    pub fn key(&self) -> RecordKey {
        post_key(&self.author, &self.target)
    }

    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let content = self.content.as_bytes();
        if content.len() > MAX_CONTENT_LENGTH {
            return Err(RecordError::TooLong {
                field: "content",
                len: content.len(),
            });
        }
        let mut buf = Vec::with_capacity(1 + 32 + 2 + 64 + 2 + content.len() + 16);
        buf.push(RecordKind::Post.tag());
        buf.extend_from_slice(self.author.as_bytes());
        self.target.write_to(&mut buf);
        buf.extend_from_slice(&(content.len() as u16).to_le_bytes());
        buf.extend_from_slice(content);
        buf.extend_from_slice(&self.bid_lamports.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut r = Reader::new(bytes);
        r.expect_kind(RecordKind::Post)?;
        let author = ShadowPublicKey::from_bytes(r.array::<32>()?);
        let target = TargetDescriptor::read_from(&mut r)?;
        let content_len = r.u16()? as usize;
        let content = r.utf8(content_len)?;
        let bid_lamports = r.u64()?;
        let timestamp = r.i64()?;
        r.finish()?;
        Ok(Self {
            author,
            target,
            content,
            bid_lamports,
            timestamp,
        })
    }
}

/// Binds a shadow identity to its X25519 messaging key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub owner: ShadowPublicKey,
    pub messaging_key: MessagingPublicKey,
    pub registered_at: i64,
}

impl RegistrationRecord {
    pub fn key(&self) -> RecordKey {
        registration_key(&self.owner)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 32 + 32 + 8);
        buf.push(RecordKind::Registration.tag());
        buf.extend_from_slice(self.owner.as_bytes());
        buf.extend_from_slice(self.messaging_key.as_bytes());
        buf.extend_from_slice(&self.registered_at.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut r = Reader::new(bytes);
        r.expect_kind(RecordKind::Registration)?;
        let owner = ShadowPublicKey::from_bytes(r.array::<32>()?);
        let messaging_key = MessagingPublicKey::from_bytes(r.array::<32>()?);
        let registered_at = r.i64()?;
        r.finish()?;
        Ok(Self {
            owner,
            messaging_key,
            registered_at,
        })
    }
}

/// An encrypted direct message. Carries no plaintext participant keys;
/// those are sealed inside `identity_blob`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub nonce: [u8; AES_NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
    pub identity_blob: Vec<u8>,
    pub timestamp: i64,
}

impl MessageRecord {
    pub fn key(&self) -> RecordKey {
        message_key(&self.nonce, &self.ciphertext)
    }

    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let ct_len = u32::try_from(self.ciphertext.len()).map_err(|_| RecordError::TooLong {
            field: "ciphertext",
            len: self.ciphertext.len(),
        })?;
        let blob_len =
            u16::try_from(self.identity_blob.len()).map_err(|_| RecordError::TooLong {
                field: "identity_blob",
                len: self.identity_blob.len(),
            })?;
        let mut buf = Vec::with_capacity(
            1 + AES_NONCE_LENGTH + 4 + self.ciphertext.len() + 2 + self.identity_blob.len() + 8,
        );
        buf.push(RecordKind::Message.tag());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&ct_len.to_le_bytes());
        buf.extend_from_slice(&self.ciphertext);
        buf.extend_from_slice(&blob_len.to_le_bytes());
        buf.extend_from_slice(&self.identity_blob);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut r = Reader::new(bytes);
        r.expect_kind(RecordKind::Message)?;
        let nonce = r.array::<AES_NONCE_LENGTH>()?;
        let ct_len = r.u32()? as usize;
        let ciphertext = r.take(ct_len)?.to_vec();
        let blob_len = r.u16()? as usize;
        let identity_blob = r.take(blob_len)?.to_vec();
        let timestamp = r.i64()?;
        r.finish()?;
        Ok(Self {
            nonce,
            ciphertext,
            identity_blob,
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos.checked_add(n).ok_or(RecordError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(RecordError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], RecordError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, RecordError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, RecordError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, RecordError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, RecordError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, RecordError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn utf8(&mut self, n: usize) -> Result<String, RecordError> {
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| RecordError::InvalidUtf8)
    }

    fn expect_kind(&mut self, kind: RecordKind) -> Result<(), RecordError> {
        let tag = self.u8()?;
        if tag != kind.tag() {
            return Err(RecordError::WrongKind(tag));
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), RecordError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            n => Err(RecordError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> ShadowPublicKey {
        ShadowPublicKey::from_bytes([0xAA; 32])
    }

    #[test]
    fn handle_normalization() {
        let a = TargetDescriptor::new(Platform::Twitter, "  @Alice_01 ").unwrap();
        let b = TargetDescriptor::new(Platform::Twitter, "alice_01").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.handle(), "alice_01");
        assert_eq!(a.to_string(), "twitter:@alice_01");
    }

    #[test]
    fn handle_rejects_bad_input() {
        assert!(TargetDescriptor::new(Platform::Twitter, "@").is_err());
        assert!(TargetDescriptor::new(Platform::Twitter, "   ").is_err());
        assert!(TargetDescriptor::new(Platform::Twitter, "bob smith").is_err());
        assert!(TargetDescriptor::new(Platform::Twitter, "@@bob").is_err());
        assert!(TargetDescriptor::new(Platform::Twitter, &"a".repeat(65)).is_err());
        assert!(TargetDescriptor::new(Platform::Twitter, &"a".repeat(64)).is_ok());
    }

    #[test]
    fn target_bytes_layout() {
        let t = TargetDescriptor::new(Platform::Instagram, "ab").unwrap();
        assert_eq!(t.to_bytes(), vec![2, 2, b'a', b'b']);
    }

    #[test]
    fn post_layout_is_exact() {
        let post = PostRecord {
            author: author(),
            target: TargetDescriptor::new(Platform::Twitter, "x").unwrap(),
            content: "hi".into(),
            bid_lamports: 1_000_000,
            timestamp: -1,
        };
        let bytes = post.encode().unwrap();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..33], &[0xAA; 32]);
        assert_eq!(&bytes[33..36], &[1, 1, b'x']);
        assert_eq!(&bytes[36..38], &2u16.to_le_bytes());
        assert_eq!(&bytes[38..40], b"hi");
        assert_eq!(&bytes[40..48], &1_000_000u64.to_le_bytes());
        assert_eq!(&bytes[48..56], &(-1i64).to_le_bytes());
        assert_eq!(bytes.len(), 56);
        assert_eq!(PostRecord::decode(&bytes).unwrap(), post);
    }

    #[test]
    fn post_key_depends_on_author_and_target() {
        let t1 = TargetDescriptor::new(Platform::Twitter, "alice").unwrap();
        let t2 = TargetDescriptor::new(Platform::Instagram, "alice").unwrap();
        let other = ShadowPublicKey::from_bytes([0xBB; 32]);
        assert_ne!(post_key(&author(), &t1), post_key(&author(), &t2));
        assert_ne!(post_key(&author(), &t1), post_key(&other, &t1));
        assert_ne!(bid_vault_address(&t1), bid_vault_address(&t2));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(PostRecord::decode(&[]), Err(RecordError::Truncated));
        assert_eq!(PostRecord::decode(&[0x02]), Err(RecordError::WrongKind(0x02)));
        let reg = RegistrationRecord {
            owner: author(),
            messaging_key: MessagingPublicKey::from_bytes([1; 32]),
            registered_at: 7,
        };
        let mut bytes = reg.encode();
        assert_eq!(bytes.len(), 73);
        bytes.push(0);
        assert_eq!(
            RegistrationRecord::decode(&bytes),
            Err(RecordError::TrailingBytes(1))
        );
    }

    #[test]
    fn message_layout() {
        let msg = MessageRecord {
            nonce: [5; 12],
            ciphertext: vec![9; 20],
            identity_blob: vec![3; 10],
            timestamp: 1_700_000_000,
        };
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[13..17], &20u32.to_le_bytes());
        assert_eq!(&bytes[37..39], &10u16.to_le_bytes());
        assert_eq!(bytes.len(), 1 + 12 + 4 + 20 + 2 + 10 + 8);
        assert_eq!(MessageRecord::decode(&bytes).unwrap(), msg);
        assert_eq!(msg.key(), message_key(&[5; 12], &[9; 20]));
    }

    #[test]
    fn oversized_content_rejected() {
        let post = PostRecord {
            author: author(),
            target: TargetDescriptor::new(Platform::Native, "x").unwrap(),
            content: "a".repeat(MAX_CONTENT_LENGTH + 1),
            bid_lamports: 1,
            timestamp: 0,
        };
        assert!(matches!(post.encode(), Err(RecordError::TooLong { .. })));
    }
}
