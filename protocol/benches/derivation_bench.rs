// Key derivation and messaging crypto benchmarks.
//
// Shadow keys are never cached, so every post and every inbox scan pays
// for derivation. The inbox also trial-opens one identity envelope per
// stored message.

use criterion::{criterion_group, criterion_main, Criterion};

use shadowpost_protocol::crypto::{MessagingKeypair, ShadowKeypair};
use shadowpost_protocol::identity::{derive_messaging_keypair, derive_signing_keypair};
use shadowpost_protocol::messaging::{seal_content, MetadataShield, Participants, Party, SealedPairShield};

fn bench_derive_signing(c: &mut Criterion) {
    let signature = [7u8; 64];
    let user = [9u8; 32];
    c.bench_function("derive/signing_keypair", |b| {
        b.iter(|| derive_signing_keypair(&signature, &user, 3));
    });
}

fn bench_derive_messaging(c: &mut Criterion) {
    let signing = ShadowKeypair::generate();
    c.bench_function("derive/messaging_keypair", |b| {
        b.iter(|| derive_messaging_keypair(&signing));
    });
}

fn bench_seal_content(c: &mut Criterion) {
    let sender = ShadowKeypair::generate();
    let sender_msg = derive_messaging_keypair(&sender);
    let recipient = ShadowKeypair::generate();
    let peer = Party {
        identity: recipient.public_key(),
        messaging_key: derive_messaging_keypair(&recipient).public_key(),
    };
    let body = [b'a'; 280];
    c.bench_function("messaging/seal_content_280b", |b| {
        b.iter(|| seal_content(&sender_msg, &sender.public_key(), &peer, &body));
    });
}

fn bench_reveal_miss(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let sender = MessagingKeypair::generate();
    let recipient = MessagingKeypair::generate();
    let participants = Participants {
        sender: ShadowKeypair::generate().public_key(),
        recipient: ShadowKeypair::generate().public_key(),
        sender_messaging_key: sender.public_key(),
    };
    let blob = rt
        .block_on(SealedPairShield.conceal(&participants, &recipient.public_key()))
        .unwrap();
    let outsider = MessagingKeypair::generate();

    // The common inbox case: a message addressed to somebody else.
    c.bench_function("messaging/reveal_not_addressed", |b| {
        b.iter(|| rt.block_on(SealedPairShield.reveal(&blob, &outsider)));
    });
}

criterion_group!(
    benches,
    bench_derive_signing,
    bench_derive_messaging,
    bench_seal_content,
    bench_reveal_miss,
);
criterion_main!(benches);
