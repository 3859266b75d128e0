//! Layer 1: message content.
//!
//! ```text
//! shared = X25519(own_msg_secret, peer_msg_public)
//! key    = BLAKE3-derive_key(CONTENT_KEY_CONTEXT, shared || min(pkA, pkB) || max(pkA, pkB))
//! ct     = AES-256-GCM(key, random nonce, plaintext, aad = CONTENT_AAD)
//! ```
//!
//! `pkA`/`pkB` are the two parties' shadow signing keys, sorted, so both
//! sides compute the same key without agreeing on who is "first".

use zeroize::Zeroizing;

use crate::config::{AES_NONCE_LENGTH, CONTENT_AAD, CONTENT_KEY_CONTEXT, MAX_MESSAGE_LENGTH};
use crate::crypto::{
    decrypt_with_aad, derive_key, encrypt_with_aad, MessagingKeypair, MessagingPublicKey,
    ShadowPublicKey,
};
use crate::error::{Result, ShadowError};

/// One side of a conversation: a shadow identity and its messaging key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Party {
    pub identity: ShadowPublicKey,
    pub messaging_key: MessagingPublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedContent {
    pub nonce: [u8; AES_NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

fn content_key(
    own: &MessagingKeypair,
    own_identity: &ShadowPublicKey,
    peer: &Party,
) -> Result<Zeroizing<[u8; 32]>> {
    let shared = own.diffie_hellman(&peer.messaging_key)?;
    let (lo, hi) = if own_identity <= &peer.identity {
        (own_identity, &peer.identity)
    } else {
        (&peer.identity, own_identity)
    };
    Ok(Zeroizing::new(derive_key(
        CONTENT_KEY_CONTEXT,
        &[shared.as_slice(), lo.as_bytes(), hi.as_bytes()],
    )))
}

/// Encrypt `plaintext` from `sender` to `recipient`.
pub fn seal_content(
    sender_key: &MessagingKeypair,
    sender: &ShadowPublicKey,
    recipient: &Party,
    plaintext: &[u8],
) -> Result<SealedContent> {
    if plaintext.is_empty() || plaintext.len() > MAX_MESSAGE_LENGTH {
        return Err(ShadowError::InvalidInput(format!(
            "message must be 1-{} bytes, got {}",
            MAX_MESSAGE_LENGTH,
            plaintext.len()
        )));
    }
    let key = content_key(sender_key, sender, recipient)?;
    let (nonce, ciphertext) = encrypt_with_aad(&key, plaintext, CONTENT_AAD)?;
    Ok(SealedContent { nonce, ciphertext })
}

/// Decrypt content exchanged between `own` and `peer`. Works for both
/// directions: the recipient opening an incoming message, and the sender
/// re-reading one it sent.
pub fn open_content(
    own_key: &MessagingKeypair,
    own: &ShadowPublicKey,
    peer: &Party,
    sealed: &SealedContent,
) -> Result<Vec<u8>> {
    let key = content_key(own_key, own, peer)?;
    Ok(decrypt_with_aad(&key, &sealed.nonce, &sealed.ciphertext, CONTENT_AAD)?)
}
