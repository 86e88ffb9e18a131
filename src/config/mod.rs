use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::rpt::{RptAlgorithm, RptSigner, RptSignerConfig, SignerError};
use crate::storage::ChainScope;

/// How ledger appends are partitioned into RPT chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ScopeMode {
    /// Every organisation shares one chain
    #[default]
    Global,
    /// One chain per organisation
    Organisation,
}

impl ScopeMode {
    /// Chain an allocation for `org_id` is appended to.
    pub fn scope_for(&self, org_id: &str) -> ChainScope {
        match self {
            ScopeMode::Global => ChainScope::Global,
            ScopeMode::Organisation => ChainScope::Organisation(org_id.to_string()),
        }
    }
}

/// Allocation engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "allocr")]
#[command(about = "Deterministic fund allocation with signed allocation receipts")]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// PKCS#8 PEM file holding the RPT signing key
    #[arg(long, global = true, env = "ALLOCR_SIGNING_KEY_PATH")]
    pub signing_key_path: Option<PathBuf>,

    /// SPKI PEM file expected to match the signing key
    #[arg(long, global = true, env = "ALLOCR_PUBLIC_KEY_PATH")]
    pub public_key_path: Option<PathBuf>,

    /// Hex-encoded 32 byte Ed25519 seed, used when no key file is set
    #[arg(long, global = true, env = "ALLOCR_SIGNING_SEED", hide_env_values = true)]
    pub signing_seed: Option<String>,

    /// RPT signature algorithm
    #[arg(long, global = true, default_value = "ed25519", env = "ALLOCR_RPT_ALGORITHM")]
    pub rpt_algorithm: String,

    /// Chain partitioning for ledger appends
    #[arg(long, global = true, value_enum, default_value_t = ScopeMode::Global, env = "ALLOCR_CHAIN_SCOPE")]
    pub chain_scope: ScopeMode,

    /// PostgreSQL URL; the in-memory store is used when unset
    #[arg(long, global = true, env = "ALLOCR_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Minimum pooled database connections
    #[arg(long, global = true, default_value = "1", env = "ALLOCR_DB_MIN_CONNECTIONS")]
    pub db_min_connections: u32,

    /// Maximum pooled database connections
    #[arg(long, global = true, default_value = "8", env = "ALLOCR_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Write a Prometheus metrics snapshot to stderr after the command
    #[arg(long = "metrics", global = true, env = "ALLOCR_EMIT_METRICS")]
    pub emit_metrics: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI operations. Each prints JSON to stdout.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Evaluate a rule set against a transaction
    Evaluate {
        /// Transaction record (JSON)
        #[arg(long)]
        transaction: PathBuf,

        /// Rule set file; the organisation's default rules when omitted
        #[arg(long)]
        rule_set: Option<PathBuf>,

        /// Drop proposals below this confidence
        #[arg(long, default_value = "0")]
        min_confidence: f64,
    },

    /// Run the waterfall over a set of contributions
    Distribute {
        /// Policy definitions (YAML or JSON)
        #[arg(long)]
        policies: PathBuf,

        /// Contribution inputs (JSON array)
        #[arg(long)]
        contributions: PathBuf,
    },

    /// Verify a submitted allocation, chain it and record it
    Apply {
        /// Transaction record (JSON)
        #[arg(long)]
        transaction: PathBuf,

        /// Rule set file; the organisation's default rules when omitted
        #[arg(long)]
        rule_set: Option<PathBuf>,

        /// Policy hash of the chosen proposal; the best proposal when omitted
        #[arg(long)]
        policy_hash: Option<String>,

        /// Submitted allocation (JSON array); the proposal's own when omitted
        #[arg(long)]
        allocation: Option<PathBuf>,

        /// RPT timestamp (RFC 3339); now when omitted
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Verify an RPT chain (JSON array of tokens)
    Verify {
        /// Token chain file
        #[arg(long)]
        chain: PathBuf,
    },
}

impl Config {
    /// Build the RPT signer from the configured key material.
    ///
    /// Without a key file or seed an ephemeral key is generated.
    pub fn signer(&self) -> anyhow::Result<RptSigner> {
        if let Some(path) = &self.signing_key_path {
            let private_key = fs::read_to_string(path)
                .with_context(|| format!("reading signing key {}", path.display()))?;
            let public_key = self
                .public_key_path
                .as_ref()
                .map(|p| {
                    fs::read_to_string(p)
                        .with_context(|| format!("reading public key {}", p.display()))
                })
                .transpose()?;

            return Ok(RptSigner::new(&RptSignerConfig {
                private_key,
                public_key,
                algorithm: Some(self.rpt_algorithm.clone()),
            })?);
        }

        if RptAlgorithm::parse(&self.rpt_algorithm).is_none() {
            return Err(SignerError::UnsupportedAlgorithm(self.rpt_algorithm.clone()).into());
        }

        match &self.signing_seed {
            Some(seed) => Ok(RptSigner::from_hex_seed(seed)?),
            None => {
                warn!("No signing key configured; tokens will not verify against a stable key");
                Ok(RptSigner::generate()?)
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            signing_key_path: None,
            public_key_path: None,
            signing_seed: None,
            rpt_algorithm: "ed25519".to_string(),
            chain_scope: ScopeMode::Global,
            database_url: None,
            db_min_connections: 1,
            db_max_connections: 8,
            emit_metrics: false,
            command: None,
        }
    }
}
