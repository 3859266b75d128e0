//! Registration, sending and reading of private messages.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::envelope::{open_content, seal_content, Party, SealedContent};
use super::shield::{MetadataShield, Participants};
use crate::composer::confirm::{await_confirmation, Confirmation};
use crate::composer::{CancelToken, RetryPolicy};
use crate::config::ClientConfig;
use crate::crypto::{MessagingKeypair, MessagingPublicKey, ShadowKeypair, ShadowPublicKey};
use crate::error::{Result, ShadowError};
use crate::identity::{derive_messaging_keypair, display_name};
use crate::ledger::{
    registration_for, LedgerClient, LedgerTransaction, MessageRecord, RecordKey, RecordKind,
    TransactionBuilder, TxSignature,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationOutcome {
    Registered(TxSignature),
    /// The same key was already on file. Nothing was submitted.
    AlreadyRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub signature: TxSignature,
    pub record_key: RecordKey,
    pub recipient: ShadowPublicKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// A decrypted message as seen by one of its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub record_key: RecordKey,
    pub sender: ShadowPublicKey,
    pub recipient: ShadowPublicKey,
    pub direction: Direction,
    pub body: String,
    /// Ledger time, unix seconds.
    pub timestamp: i64,
}

impl PrivateMessage {
    /// The other side of the conversation.
    pub fn peer(&self) -> ShadowPublicKey {
        match self.direction {
            Direction::Sent => self.recipient,
            Direction::Received => self.sender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub identity: ShadowPublicKey,
    pub display_name: String,
    pub message_count: usize,
    pub last_message_at: i64,
}

pub struct MessagingService {
    ledger: Arc<dyn LedgerClient>,
    shield: Arc<dyn MetadataShield>,
    config: ClientConfig,
    retry: RetryPolicy,
}

impl MessagingService {
    pub fn new(ledger: Arc<dyn LedgerClient>, shield: Arc<dyn MetadataShield>, config: ClientConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            ledger,
            shield,
            config,
            retry,
        }
    }

    /// Messaging key on file for `owner`, if any.
    pub async fn lookup(&self, owner: &ShadowPublicKey) -> Result<Option<MessagingPublicKey>> {
        let record = self
            .retry
            .run("lookup_registration", || registration_for(self.ledger.as_ref(), owner))
            .await?;
        Ok(record.map(|r| r.messaging_key))
    }

    /// Publish `messaging_key` for `identity`. Never overwrites a different
    /// key; that takes [`resync`](Self::resync).
    pub async fn register(
        &self,
        identity: &ShadowKeypair,
        messaging_key: MessagingPublicKey,
    ) -> Result<RegistrationOutcome> {
        let owner = identity.public_key();
        match self.lookup(&owner).await? {
            Some(existing) if existing == messaging_key => {
                debug!(identity = %owner, "messaging key already registered");
                Ok(RegistrationOutcome::AlreadyRegistered)
            }
            Some(_) => Err(ShadowError::KeysMismatch {
                identity: owner.to_string(),
            }),
            None => {
                let signature = self
                    .submit(identity, |b| b.register_messaging_key(owner, messaging_key, false))
                    .await?;
                info!(identity = %owner, "messaging key registered");
                Ok(RegistrationOutcome::Registered(signature))
            }
        }
    }

    /// Replace whatever key is on file with `messaging_key`. Messages sealed
    /// to the old key stay readable only with the old key.
    pub async fn resync(
        &self,
        identity: &ShadowKeypair,
        messaging_key: MessagingPublicKey,
    ) -> Result<RegistrationOutcome> {
        let owner = identity.public_key();
        if self.lookup(&owner).await? == Some(messaging_key) {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }
        let signature = self
            .submit(identity, |b| b.register_messaging_key(owner, messaging_key, true))
            .await?;
        warn!(identity = %owner, "messaging key overwritten by resync");
        Ok(RegistrationOutcome::Registered(signature))
    }

    /// Encrypt `plaintext` to `recipient` and store it on the ledger. The
    /// sender pays the fee and signs the transaction, so its identity is
    /// visible next to the record even though the record itself hides it.
    ///
    /// Registers the sender's own messaging key first if it is not on file;
    /// a different key on file is `KeysMismatch`.
    pub async fn send(
        &self,
        sender: &ShadowKeypair,
        recipient: &ShadowPublicKey,
        plaintext: &str,
    ) -> Result<SentMessage> {
        let recipient_key = self
            .lookup(recipient)
            .await?
            .ok_or_else(|| ShadowError::RecipientNotRegistered(recipient.to_string()))?;

        let sender_pub = sender.public_key();
        let sender_messaging = derive_messaging_keypair(sender);
        // Recipients only trust sender keys that are on file.
        self.register(sender, sender_messaging.public_key()).await?;

        let peer = Party {
            identity: *recipient,
            messaging_key: recipient_key,
        };
        let sealed = seal_content(&sender_messaging, &sender_pub, &peer, plaintext.as_bytes())?;
        let identity_blob = self
            .shield
            .conceal(
                &Participants {
                    sender: sender_pub,
                    recipient: *recipient,
                    sender_messaging_key: sender_messaging.public_key(),
                },
                &recipient_key,
            )
            .await?;

        let record = MessageRecord {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            identity_blob,
            timestamp: Utc::now().timestamp(),
        };
        let record_key = record.key();
        let signature = self
            .submit(sender, move |b| b.store_message(record.clone()))
            .await?;
        info!(record = %record_key.to_base58(), "message stored");
        Ok(SentMessage {
            signature,
            record_key,
            recipient: *recipient,
        })
    }

    /// Every message `identity` sent or received, oldest first.
    ///
    /// Both sides are reopened through the peer's current registration, so
    /// messages from before a `resync` of either party drop out.
    pub async fn inbox(&self, identity: &ShadowKeypair) -> Result<Vec<PrivateMessage>> {
        let me = identity.public_key();
        let own_messaging = derive_messaging_keypair(identity);
        let records = self
            .retry
            .run("scan_messages", || self.ledger.records_of_kind(RecordKind::Message))
            .await?;

        let mut peer_keys: HashMap<ShadowPublicKey, Option<MessagingPublicKey>> = HashMap::new();
        let mut messages = Vec::new();
        for (key, bytes) in records {
            let record = match MessageRecord::decode(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    debug!(record = %key.to_base58(), error = %e, "skipping undecodable message");
                    continue;
                }
            };
            let participants = match self.shield.reveal(&record.identity_blob, &own_messaging).await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!(record = %key.to_base58(), error = %e, "skipping malformed identity blob");
                    continue;
                }
            };

            let (direction, peer) = if participants.recipient == me {
                // Anyone can write the blob. The sender only counts if the
                // key it names is the one that sender registered.
                let registered = self.cached_lookup(&mut peer_keys, &participants.sender).await?;
                if registered != Some(participants.sender_messaging_key) {
                    warn!(record = %key.to_base58(), "sender key does not match registration, dropping");
                    continue;
                }
                (
                    Direction::Received,
                    Party {
                        identity: participants.sender,
                        messaging_key: participants.sender_messaging_key,
                    },
                )
            } else if participants.sender == me {
                let peer_key = self.cached_lookup(&mut peer_keys, &participants.recipient).await?;
                let Some(messaging_key) = peer_key else {
                    warn!(record = %key.to_base58(), "recipient key gone, cannot reopen sent message");
                    continue;
                };
                (
                    Direction::Sent,
                    Party {
                        identity: participants.recipient,
                        messaging_key,
                    },
                )
            } else {
                // Sealed to our messaging key but naming someone else.
                warn!(record = %key.to_base58(), "identity blob does not name viewer");
                continue;
            };

            match self.open(&own_messaging, &me, &peer, &record) {
                Ok(body) => messages.push(PrivateMessage {
                    record_key: key,
                    sender: participants.sender,
                    recipient: participants.recipient,
                    direction,
                    body,
                    timestamp: record.timestamp,
                }),
                Err(e) => warn!(record = %key.to_base58(), error = %e, "message content did not open"),
            }
        }

        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.record_key.cmp(&b.record_key))
        });
        Ok(messages)
    }

    /// Everyone `identity` has exchanged messages with, most recent first.
    pub async fn contacts(&self, identity: &ShadowKeypair) -> Result<Vec<Contact>> {
        let mut by_peer: BTreeMap<ShadowPublicKey, Contact> = BTreeMap::new();
        for message in self.inbox(identity).await? {
            let peer = message.peer();
            let entry = by_peer.entry(peer).or_insert_with(|| Contact {
                identity: peer,
                display_name: display_name(&peer),
                message_count: 0,
                last_message_at: message.timestamp,
            });
            entry.message_count += 1;
            entry.last_message_at = entry.last_message_at.max(message.timestamp);
        }
        let mut contacts: Vec<Contact> = by_peer.into_values().collect();
        contacts.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(contacts)
    }

    async fn cached_lookup(
        &self,
        cache: &mut HashMap<ShadowPublicKey, Option<MessagingPublicKey>>,
        owner: &ShadowPublicKey,
    ) -> Result<Option<MessagingPublicKey>> {
        if let Some(cached) = cache.get(owner) {
            return Ok(*cached);
        }
        let fetched = self.lookup(owner).await?;
        cache.insert(*owner, fetched);
        Ok(fetched)
    }

    fn open(
        &self,
        own_messaging: &MessagingKeypair,
        me: &ShadowPublicKey,
        peer: &Party,
        record: &MessageRecord,
    ) -> Result<String> {
        let sealed = SealedContent {
            nonce: record.nonce,
            ciphertext: record.ciphertext.clone(),
        };
        let bytes = open_content(own_messaging, me, peer, &sealed)?;
        String::from_utf8(bytes)
            .map_err(|e| ShadowError::Serialization(format!("message body is not utf-8: {}", e)))
    }

    /// Build, sign with `signer`, submit and wait for one transaction.
    async fn submit<F>(&self, signer: &ShadowKeypair, instructions: F) -> Result<TxSignature>
    where
        F: Fn(TransactionBuilder) -> TransactionBuilder + Send + Sync,
    {
        let payer = signer.public_key();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let blockhash = self
                .retry
                .run("latest_blockhash", || self.ledger.latest_blockhash())
                .await?;
            let message = instructions(TransactionBuilder::new(payer).recent_blockhash(blockhash)).build()?;
            let mut tx = LedgerTransaction::new(message);
            tx.sign(signer)?;
            let signature = tx
                .signature()
                .ok_or_else(|| ShadowError::Crypto("transaction is unsigned".into()))?;

            match self
                .retry
                .run("submit_transaction", || self.ledger.submit_transaction(&tx))
                .await
            {
                Ok(_) | Err(ShadowError::AlreadyProcessed(_)) => {}
                Err(ShadowError::BlockhashExpired) if attempt < self.retry.max_attempts => continue,
                Err(e) => return Err(e),
            }

            let started = tokio::time::Instant::now();
            match await_confirmation(
                self.ledger.as_ref(),
                &signature,
                self.config.confirm_timeout(),
                self.config.poll_interval(),
                &CancelToken::never(),
            )
            .await?
            {
                Confirmation::Landed { .. } => return Ok(signature),
                Confirmation::TimedOut => {
                    return Err(ShadowError::TransactionTimeout {
                        signature: signature.0,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::messaging::SealedPairShield;

    const SOL: u64 = 1_000_000_000;

    fn setup() -> (Arc<InMemoryLedger>, MessagingService) {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = MessagingService::new(ledger.clone(), Arc::new(SealedPairShield), ClientConfig::default());
        (ledger, service)
    }

    fn funded(ledger: &InMemoryLedger) -> ShadowKeypair {
        let kp = ShadowKeypair::generate();
        ledger.airdrop(&kp.public_key(), SOL);
        kp
    }

    async fn registered(ledger: &InMemoryLedger, service: &MessagingService) -> ShadowKeypair {
        let kp = funded(ledger);
        let key = derive_messaging_keypair(&kp).public_key();
        service.register(&kp, key).await.unwrap();
        kp
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (ledger, service) = setup();
        let kp = funded(&ledger);
        let key = derive_messaging_keypair(&kp).public_key();

        assert!(matches!(
            service.register(&kp, key).await.unwrap(),
            RegistrationOutcome::Registered(_)
        ));
        let submitted = ledger.submission_count();
        assert_eq!(
            service.register(&kp, key).await.unwrap(),
            RegistrationOutcome::AlreadyRegistered
        );
        assert_eq!(ledger.submission_count(), submitted);
        assert_eq!(service.lookup(&kp.public_key()).await.unwrap(), Some(key));
    }

    #[tokio::test]
    async fn different_key_needs_resync() {
        let (ledger, service) = setup();
        let kp = registered(&ledger, &service).await;
        let other = MessagingKeypair::generate().public_key();

        assert!(matches!(
            service.register(&kp, other).await,
            Err(ShadowError::KeysMismatch { .. })
        ));
        assert!(matches!(
            service.resync(&kp, other).await.unwrap(),
            RegistrationOutcome::Registered(_)
        ));
        assert_eq!(service.lookup(&kp.public_key()).await.unwrap(), Some(other));
    }

    #[tokio::test]
    async fn unregistered_recipient_fails_before_any_write() {
        let (ledger, service) = setup();
        let alice = funded(&ledger);
        let nobody = ShadowKeypair::generate().public_key();

        let err = service.send(&alice, &nobody, "hello").await.unwrap_err();
        assert!(matches!(err, ShadowError::RecipientNotRegistered(_)));
        assert_eq!(ledger.submission_count(), 0);
        assert_eq!(ledger.record_count(RecordKind::Message), 0);
    }

    #[tokio::test]
    async fn conversation_shows_up_for_both_sides() {
        let (ledger, service) = setup();
        let alice = registered(&ledger, &service).await;
        let bob = registered(&ledger, &service).await;
        let carol = registered(&ledger, &service).await;

        ledger.set_unix_timestamp(1_000);
        service.send(&alice, &bob.public_key(), "hi bob").await.unwrap();
        ledger.set_unix_timestamp(2_000);
        service.send(&bob, &alice.public_key(), "hi alice").await.unwrap();

        let bob_inbox = service.inbox(&bob).await.unwrap();
        assert_eq!(bob_inbox.len(), 2);
        assert_eq!(bob_inbox[0].body, "hi bob");
        assert_eq!(bob_inbox[0].direction, Direction::Received);
        assert_eq!(bob_inbox[1].body, "hi alice");
        assert_eq!(bob_inbox[1].direction, Direction::Sent);

        let alice_inbox = service.inbox(&alice).await.unwrap();
        assert_eq!(alice_inbox.len(), 2);
        assert_eq!(alice_inbox[0].sender, alice.public_key());

        assert!(service.inbox(&carol).await.unwrap().is_empty());

        let contacts = service.contacts(&alice).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].identity, bob.public_key());
        assert_eq!(contacts[0].message_count, 2);
        assert_eq!(contacts[0].last_message_at, 2_000);
    }

    #[tokio::test]
    async fn first_send_registers_the_sender() {
        let (ledger, service) = setup();
        let alice = funded(&ledger);
        let bob = registered(&ledger, &service).await;
        assert_eq!(service.lookup(&alice.public_key()).await.unwrap(), None);

        service.send(&alice, &bob.public_key(), "hello").await.unwrap();
        assert_eq!(
            service.lookup(&alice.public_key()).await.unwrap(),
            Some(derive_messaging_keypair(&alice).public_key())
        );
        assert_eq!(service.inbox(&bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inbox_drops_messages_with_a_spoofed_sender() {
        let (ledger, service) = setup();
        let alice = registered(&ledger, &service).await;
        let bob = registered(&ledger, &service).await;
        let mallory = funded(&ledger);

        // Mallory names Alice as the sender but encrypts with her own key.
        let throwaway = MessagingKeypair::generate();
        let bob_party = Party {
            identity: bob.public_key(),
            messaging_key: derive_messaging_keypair(&bob).public_key(),
        };
        let sealed = seal_content(&throwaway, &alice.public_key(), &bob_party, b"send me 10 SOL").unwrap();
        let identity_blob = SealedPairShield
            .conceal(
                &Participants {
                    sender: alice.public_key(),
                    recipient: bob.public_key(),
                    sender_messaging_key: throwaway.public_key(),
                },
                &bob_party.messaging_key,
            )
            .await
            .unwrap();
        let record = MessageRecord {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            identity_blob,
            timestamp: 0,
        };
        service
            .submit(&mallory, move |b| b.store_message(record.clone()))
            .await
            .unwrap();
        assert_eq!(ledger.record_count(RecordKind::Message), 1);

        assert!(service.inbox(&bob).await.unwrap().is_empty());

        service.send(&alice, &bob.public_key(), "really me").await.unwrap();
        let inbox = service.inbox(&bob).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].body, "really me");
        assert_eq!(inbox[0].sender, alice.public_key());
    }

    #[tokio::test]
    async fn records_hide_participants() {
        let (ledger, service) = setup();
        let alice = registered(&ledger, &service).await;
        let bob = registered(&ledger, &service).await;
        service.send(&alice, &bob.public_key(), "quiet").await.unwrap();

        let records = ledger.records_of_kind(RecordKind::Message).await.unwrap();
        assert_eq!(records.len(), 1);
        let bytes = &records[0].1;
        for key in [alice.public_key(), bob.public_key()] {
            assert!(!bytes.windows(32).any(|w| w == key.as_bytes().as_slice()));
        }
    }
}
