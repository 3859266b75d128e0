//! # CLI Interface
//!
//! Argument structure for the `shadowpost` developer tool. Everything runs
//! against the in-memory ledger; nothing here talks to a real network.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use shadowpost_protocol::ledger::Platform;

use crate::logging::LogFormat;

/// shadowpost developer tool.
///
/// Derives shadow identities, previews bid ranking and revenue splits, and
/// runs whole post/message flows against an in-memory ledger.
#[derive(Parser, Debug)]
#[command(name = "shadowpost", version, propagate_version = true)]
pub struct ShadowpostCli {
    /// Log output format (logs go to stderr).
    #[arg(long, global = true, env = "SHADOWPOST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Derive shadow identities from a wallet seed and user id.
    Derive(DeriveArgs),
    /// Rank a candidate bid against existing bids.
    Rank(RankArgs),
    /// Show the platform fee and three-way split for a bid.
    Split(SplitArgs),
    /// Run a full post + message flow against an in-memory ledger.
    Simulate(SimulateArgs),
}

/// Where the master signature comes from.
#[derive(Args, Debug, Clone)]
pub struct MasterArgs {
    /// Hex-encoded 32-byte seed of the primary wallet keypair.
    ///
    /// Development only. A real wallet never exposes its seed.
    #[arg(long, env = "SHADOWPOST_WALLET_SEED")]
    pub wallet_seed: String,

    /// Application user id the identities are bound to.
    #[arg(long, env = "SHADOWPOST_USER_ID")]
    pub user_id: String,
}

#[derive(Args, Debug)]
pub struct DeriveArgs {
    #[command(flatten)]
    pub master: MasterArgs,

    /// First identity index to derive.
    #[arg(long, default_value_t = 0)]
    pub from: u32,

    /// Number of identities to derive.
    #[arg(long, default_value_t = 1)]
    pub count: u32,
}

#[derive(Args, Debug)]
pub struct RankArgs {
    /// Candidate bid in lamports.
    #[arg(long)]
    pub candidate: u64,

    /// Existing bids on the target, in lamports, in any order.
    #[arg(long, value_delimiter = ',')]
    pub bids: Vec<u64>,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Bid in lamports.
    #[arg(long)]
    pub bid: u64,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub master: MasterArgs,

    /// Client config file (JSON). Defaults apply for missing fields.
    #[arg(long, short = 'c', env = "SHADOWPOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Platform of the target account.
    #[arg(long, value_parser = parse_platform, default_value = "twitter")]
    pub platform: Platform,

    /// Target handle, with or without `@`.
    #[arg(long, default_value = "shadowpost")]
    pub target: String,

    /// Bids to post, one fresh identity per bid.
    #[arg(long, value_delimiter = ',', default_value = "5000000,20000000,1000000")]
    pub bids: Vec<u64>,

    /// Lamports airdropped to the primary wallet before starting.
    #[arg(long, default_value_t = 10_000_000_000)]
    pub airdrop: u64,

    /// Skip the private message exchange at the end.
    #[arg(long)]
    pub no_messages: bool,
}

pub fn parse_platform(s: &str) -> Result<Platform, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "native" => Ok(Platform::Native),
        "twitter" | "x" => Ok(Platform::Twitter),
        "instagram" => Ok(Platform::Instagram),
        "tiktok" => Ok(Platform::TikTok),
        other => Err(format!("unknown platform '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ShadowpostCli::command().debug_assert();
    }

    #[test]
    fn rank_accepts_comma_separated_bids() {
        let cli = ShadowpostCli::parse_from([
            "shadowpost",
            "rank",
            "--candidate",
            "5",
            "--bids",
            "1,9,3",
        ]);
        match cli.command {
            Commands::Rank(args) => assert_eq!(args.bids, vec![1, 9, 3]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn platform_parsing() {
        assert_eq!(parse_platform("X").unwrap(), Platform::Twitter);
        assert_eq!(parse_platform("tiktok").unwrap(), Platform::TikTok);
        assert!(parse_platform("myspace").is_err());
    }
}
