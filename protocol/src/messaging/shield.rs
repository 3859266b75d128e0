//! Layer 2: who is talking to whom.
//!
//! A message record on the ledger must not say which two identities it
//! connects. The participants are sealed into an identity blob that only
//! they can open; everyone else sees fixed-size random bytes.
//!
//! [`MetadataShield`] is the seam. A threshold/MPC service that holds the
//! mapping on behalf of the network plugs in here. The shipped
//! [`SealedPairShield`] needs no third party: it writes two envelopes, one
//! readable by the recipient's messaging key and one by the sender's.
//!
//! The shield covers the record bytes only. The transaction that stores a
//! message is paid for and signed by the sending identity, so an observer
//! of transactions (not just records) still learns who sent it. Only the
//! recipient stays hidden. Hiding the sender as well needs a relayer to pay
//! for the store, and [`MessagingService`](super::MessagingService) does not
//! have one.
//!
//! The `sender_messaging_key` in the payload is a claim, not a proof: the
//! inbox only accepts it when it matches the sender's registration.
//!
//! ```text
//! blob     = envelope(recipient) || envelope(sender)
//! envelope = eph_pub[32] || nonce[12] || AES-256-GCM(payload[96]) with 16-byte tag
//! payload  = sender[32] || recipient[32] || sender_messaging_key[32]
//! key      = BLAKE3-derive_key(IDENTITY_ENVELOPE_CONTEXT, dh || eph_pub || viewer_messaging_key)
//! ```

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{AES_NONCE_LENGTH, AES_TAG_LENGTH, IDENTITY_ENVELOPE_CONTEXT, KEY_LENGTH};
use crate::crypto::exchange::ephemeral_agreement;
use crate::crypto::{
    decrypt_with_aad, derive_key, encrypt_with_aad, MessagingKeypair, MessagingPublicKey,
    ShadowPublicKey,
};
use crate::error::{Result, ShadowError};

const PAYLOAD_LEN: usize = 3 * KEY_LENGTH;

/// Size of one sealed envelope.
pub const ENVELOPE_LEN: usize = KEY_LENGTH + AES_NONCE_LENGTH + PAYLOAD_LEN + AES_TAG_LENGTH;

/// Size of a [`SealedPairShield`] blob.
pub const IDENTITY_BLOB_LEN: usize = 2 * ENVELOPE_LEN;

/// The metadata a shield hides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participants {
    pub sender: ShadowPublicKey,
    pub recipient: ShadowPublicKey,
    pub sender_messaging_key: MessagingPublicKey,
}

impl Participants {
    fn to_payload(self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[..32].copy_from_slice(self.sender.as_bytes());
        out[32..64].copy_from_slice(self.recipient.as_bytes());
        out[64..].copy_from_slice(self.sender_messaging_key.as_bytes());
        out
    }

    fn from_payload(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PAYLOAD_LEN {
            return Err(ShadowError::Serialization(format!(
                "identity payload is {} bytes",
                bytes.len()
            )));
        }
        let key = |range: std::ops::Range<usize>| {
            let mut out = [0u8; KEY_LENGTH];
            out.copy_from_slice(&bytes[range]);
            out
        };
        // Authenticated by the envelope AEAD; no point validation needed.
        Ok(Self {
            sender: ShadowPublicKey::from_bytes(key(0..32)),
            recipient: ShadowPublicKey::from_bytes(key(32..64)),
            sender_messaging_key: MessagingPublicKey::from_bytes(key(64..96)),
        })
    }
}

#[async_trait]
pub trait MetadataShield: Send + Sync {
    /// Hide `participants` so that only they can recover them.
    async fn conceal(
        &self,
        participants: &Participants,
        recipient_messaging_key: &MessagingPublicKey,
    ) -> Result<Vec<u8>>;

    /// Recover the participants if `viewer` is one of them. `Ok(None)`
    /// means "not addressed to you", which is the common case when
    /// scanning.
    async fn reveal(&self, blob: &[u8], viewer: &MessagingKeypair) -> Result<Option<Participants>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SealedPairShield;

impl SealedPairShield {
    fn envelope_key(dh: &[u8; 32], eph: &MessagingPublicKey, viewer: &MessagingPublicKey) -> [u8; 32] {
        derive_key(
            IDENTITY_ENVELOPE_CONTEXT,
            &[dh.as_slice(), eph.as_bytes(), viewer.as_bytes()],
        )
    }

    fn seal(payload: &[u8; PAYLOAD_LEN], viewer: &MessagingPublicKey) -> Result<Vec<u8>> {
        let (eph, dh) = ephemeral_agreement(viewer)?;
        let key = Zeroizing::new(Self::envelope_key(&dh, &eph, viewer));
        let (nonce, ct) = encrypt_with_aad(&key, payload, eph.as_bytes())?;
        let mut out = Vec::with_capacity(ENVELOPE_LEN);
        out.extend_from_slice(eph.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        debug_assert_eq!(out.len(), ENVELOPE_LEN);
        Ok(out)
    }

    fn open(envelope: &[u8], viewer: &MessagingKeypair) -> Option<Participants> {
        let mut eph = [0u8; KEY_LENGTH];
        eph.copy_from_slice(&envelope[..KEY_LENGTH]);
        let eph = MessagingPublicKey::from_bytes(eph);
        let mut nonce = [0u8; AES_NONCE_LENGTH];
        nonce.copy_from_slice(&envelope[KEY_LENGTH..KEY_LENGTH + AES_NONCE_LENGTH]);
        let ct = &envelope[KEY_LENGTH + AES_NONCE_LENGTH..];

        let dh = viewer.diffie_hellman(&eph).ok()?;
        let key = Zeroizing::new(Self::envelope_key(&dh, &eph, &viewer.public_key()));
        let payload = decrypt_with_aad(&key, &nonce, ct, eph.as_bytes()).ok()?;
        Participants::from_payload(&payload).ok()
    }
}

#[async_trait]
impl MetadataShield for SealedPairShield {
    async fn conceal(
        &self,
        participants: &Participants,
        recipient_messaging_key: &MessagingPublicKey,
    ) -> Result<Vec<u8>> {
        let payload = Zeroizing::new(participants.to_payload());
        let mut blob = Self::seal(&payload, recipient_messaging_key)?;
        blob.extend(Self::seal(&payload, &participants.sender_messaging_key)?);
        Ok(blob)
    }

    async fn reveal(&self, blob: &[u8], viewer: &MessagingKeypair) -> Result<Option<Participants>> {
        if blob.len() != IDENTITY_BLOB_LEN {
            return Err(ShadowError::Serialization(format!(
                "identity blob must be {} bytes, got {}",
                IDENTITY_BLOB_LEN,
                blob.len()
            )));
        }
        let found = blob
            .chunks_exact(ENVELOPE_LEN)
            .find_map(|envelope| Self::open(envelope, viewer));
        if found.is_none() {
            debug!("identity blob not addressed to viewer");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(sender_msg: &MessagingKeypair) -> Participants {
        Participants {
            sender: ShadowPublicKey::from_bytes([1; 32]),
            recipient: ShadowPublicKey::from_bytes([2; 32]),
            sender_messaging_key: sender_msg.public_key(),
        }
    }

    #[test]
    fn envelope_size() {
        assert_eq!(ENVELOPE_LEN, 156);
        assert_eq!(IDENTITY_BLOB_LEN, 312);
    }

    #[tokio::test]
    async fn both_participants_can_reveal() {
        let sender = MessagingKeypair::generate();
        let recipient = MessagingKeypair::generate();
        let p = participants(&sender);
        let blob = SealedPairShield
            .conceal(&p, &recipient.public_key())
            .await
            .unwrap();
        assert_eq!(blob.len(), IDENTITY_BLOB_LEN);

        assert_eq!(SealedPairShield.reveal(&blob, &recipient).await.unwrap(), Some(p));
        assert_eq!(SealedPairShield.reveal(&blob, &sender).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn outsiders_see_nothing() {
        let sender = MessagingKeypair::generate();
        let recipient = MessagingKeypair::generate();
        let p = participants(&sender);
        let blob = SealedPairShield
            .conceal(&p, &recipient.public_key())
            .await
            .unwrap();

        let eve = MessagingKeypair::generate();
        assert_eq!(SealedPairShield.reveal(&blob, &eve).await.unwrap(), None);

        // No participant key appears in the clear.
        for key in [p.sender.as_bytes(), p.recipient.as_bytes(), p.sender_messaging_key.as_bytes()] {
            assert!(!blob.windows(32).any(|w| w == key.as_slice()));
        }
    }

    #[tokio::test]
    async fn same_pair_gives_unlinkable_blobs() {
        let sender = MessagingKeypair::generate();
        let recipient = MessagingKeypair::generate();
        let p = participants(&sender);
        let a = SealedPairShield.conceal(&p, &recipient.public_key()).await.unwrap();
        let b = SealedPairShield.conceal(&p, &recipient.public_key()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn wrong_length_is_an_error() {
        let viewer = MessagingKeypair::generate();
        assert!(SealedPairShield.reveal(&[0u8; 10], &viewer).await.is_err());
    }
}
