//! Human-friendly names for shadow identities.
//!
//! `"Quiet Heron"` is easier to tell apart in a list than two base58
//! strings. The name is a pure function of the public key:
//!
//! ```text
//! h    = SHA-256("shadow-name" || pubkey)
//! adj  = ADJECTIVES[u32_le(h[0..4]) % 64]
//! noun = NOUNS[u32_le(h[4..8]) % 64]
//! ```
//!
//! The word lists are part of that contract. Append-only is not enough:
//! any edit renames every existing identity.

use crate::crypto::hash::sha256_multi;
use crate::crypto::ShadowPublicKey;

pub const ADJECTIVES: [&str; 64] = [
    "Amber", "Ashen", "Azure", "Bold", "Brave", "Bright", "Calm", "Clever",
    "Cobalt", "Crimson", "Curious", "Dapper", "Dusky", "Eager", "Electric", "Emerald",
    "Fabled", "Fierce", "Frosty", "Gentle", "Gilded", "Golden", "Hidden", "Hollow",
    "Idle", "Indigo", "Ivory", "Jade", "Jolly", "Keen", "Lively", "Lucky",
    "Lunar", "Misty", "Mellow", "Nimble", "Noble", "Obsidian", "Pale", "Patient",
    "Quiet", "Quick", "Rapid", "Restless", "Rustic", "Scarlet", "Silent", "Silver",
    "Sly", "Solar", "Stormy", "Swift", "Tawny", "Tidal", "Umber", "Velvet",
    "Vivid", "Wandering", "Wary", "Wild", "Wise", "Woven", "Young", "Zesty",
];

pub const NOUNS: [&str; 64] = [
    "Badger", "Bear", "Beetle", "Bison", "Crane", "Crow", "Deer", "Dolphin",
    "Eagle", "Egret", "Falcon", "Ferret", "Finch", "Fox", "Gecko", "Gull",
    "Hare", "Hawk", "Heron", "Ibis", "Jackal", "Jaguar", "Kestrel", "Koala",
    "Lark", "Lemur", "Lion", "Lynx", "Magpie", "Marten", "Mole", "Moose",
    "Moth", "Newt", "Ocelot", "Orca", "Osprey", "Otter", "Owl", "Panther",
    "Parrot", "Pelican", "Puma", "Quail", "Raven", "Robin", "Salmon", "Seal",
    "Shrike", "Sparrow", "Stoat", "Swan", "Tapir", "Tiger", "Toad", "Trout",
    "Viper", "Vole", "Walrus", "Weasel", "Wolf", "Wren", "Yak", "Zebra",
];

const NAME_DOMAIN: &[u8] = b"shadow-name";

/// Deterministic `"Adjective Noun"` for a public key.
pub fn display_name(public_key: &ShadowPublicKey) -> String {
    let h = sha256_multi(&[NAME_DOMAIN, public_key.as_bytes()]);
    let adj = u32::from_le_bytes([h[0], h[1], h[2], h[3]]) as usize % ADJECTIVES.len();
    let noun = u32::from_le_bytes([h[4], h[5], h[6], h[7]]) as usize % NOUNS.len();
    format!("{} {}", ADJECTIVES[adj], NOUNS[noun])
}
