use crate::feed::DEFAULT_FEED_RETENTION;
use persistence::{FlushPolicy, FsyncPolicy, JournalConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_DEPTH: usize = 10;

/// What to do when an incoming order would trade against its owner's own
/// resting order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelfTradePolicy {
    /// Match normally
    #[default]
    Allow,
    /// Cancel the resting order and keep matching past it
    CancelResting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSettings {
    pub dir: PathBuf,
    pub fsync: FsyncPolicy,
    pub max_file_bytes: u64,
}

impl JournalSettings {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fsync: FsyncPolicy::EveryWrite,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn to_journal_config(&self) -> JournalConfig {
        JournalConfig {
            dir: self.dir.clone(),
            max_file_size: self.max_file_bytes,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: self.fsync,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub self_trade_policy: SelfTradePolicy,
    /// `None` keeps the ledger in memory only
    pub journal: Option<JournalSettings>,
    /// Price levels per side in depth snapshots
    pub depth_limit: usize,
    /// Feed events kept for `subscribe_from`
    pub feed_retention: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_trade_policy: SelfTradePolicy::Allow,
            journal: None,
            depth_limit: DEFAULT_DEPTH,
            feed_retention: DEFAULT_FEED_RETENTION,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let self_trade_policy = match env_map
            .get("SELF_TRADE_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("allow")
        {
            "allow" => SelfTradePolicy::Allow,
            "cancel-resting" => SelfTradePolicy::CancelResting,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SELF_TRADE_POLICY".to_string(),
                    format!("must be allow or cancel-resting, got {}", other),
                ))
            }
        };

        let depth_limit = env_map
            .get("BOOK_DEPTH")
            .map(|s| s.as_str())
            .unwrap_or("10")
            .parse::<usize>()
            .ok()
            .filter(|depth| *depth > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "BOOK_DEPTH".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let feed_retention = match env_map.get("FEED_RETENTION") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "FEED_RETENTION".to_string(),
                        "must be a positive integer".to_string(),
                    )
                })?,
            None => DEFAULT_FEED_RETENTION,
        };

        let journal = match env_map.get("LEDGER_JOURNAL_DIR") {
            Some(dir) if !dir.trim().is_empty() => Some(parse_journal_settings(dir, &env_map)?),
            _ => None,
        };

        Ok(EngineConfig {
            self_trade_policy,
            journal,
            depth_limit,
            feed_retention,
        })
    }

    pub fn with_journal(mut self, settings: JournalSettings) -> Self {
        self.journal = Some(settings);
        self
    }

    pub fn with_feed_retention(mut self, retention: usize) -> Self {
        self.feed_retention = retention;
        self
    }

    pub fn with_self_trade_policy(mut self, policy: SelfTradePolicy) -> Self {
        self.self_trade_policy = policy;
        self
    }
}

fn parse_journal_settings(
    dir: &str,
    env_map: &HashMap<String, String>,
) -> Result<JournalSettings, ConfigError> {
    let fsync = parse_fsync(
        env_map
            .get("LEDGER_FSYNC")
            .map(|s| s.as_str())
            .unwrap_or("every-write"),
    )?;

    let max_file_bytes = match env_map.get("LEDGER_MAX_FILE_BYTES") {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "LEDGER_MAX_FILE_BYTES".to_string(),
                "must be a valid u64".to_string(),
            )
        })?,
        None => DEFAULT_MAX_FILE_BYTES,
    };

    Ok(JournalSettings {
        dir: PathBuf::from(dir),
        fsync,
        max_file_bytes,
    })
}

fn parse_fsync(raw: &str) -> Result<FsyncPolicy, ConfigError> {
    let invalid = || {
        ConfigError::InvalidValue(
            "LEDGER_FSYNC".to_string(),
            format!("must be every-write, every-n:<N> or on-rotation, got {}", raw),
        )
    };

    match raw {
        "every-write" => Ok(FsyncPolicy::EveryWrite),
        "on-rotation" => Ok(FsyncPolicy::OnRotation),
        other => {
            let n = other
                .strip_prefix("every-n:")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .ok_or_else(invalid)?;
            Ok(FsyncPolicy::EveryN(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_env_map(HashMap::new()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.journal.is_none());
    }

    #[test]
    fn test_journal_settings() {
        let config = EngineConfig::from_env_map(env(&[
            ("LEDGER_JOURNAL_DIR", "/var/lib/ledger"),
            ("LEDGER_FSYNC", "every-n:16"),
            ("LEDGER_MAX_FILE_BYTES", "4096"),
            ("SELF_TRADE_POLICY", "cancel-resting"),
            ("BOOK_DEPTH", "3"),
            ("FEED_RETENTION", "500"),
        ]))
        .unwrap();

        let journal = config.journal.unwrap();
        assert_eq!(journal.dir, PathBuf::from("/var/lib/ledger"));
        assert_eq!(journal.fsync, FsyncPolicy::EveryN(16));
        assert_eq!(journal.max_file_bytes, 4096);
        assert_eq!(config.self_trade_policy, SelfTradePolicy::CancelResting);
        assert_eq!(config.depth_limit, 3);
        assert_eq!(config.feed_retention, 500);
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            ("SELF_TRADE_POLICY", "reject"),
            ("BOOK_DEPTH", "0"),
            ("BOOK_DEPTH", "many"),
            ("FEED_RETENTION", "0"),
        ];
        for (key, value) in cases {
            let err = EngineConfig::from_env_map(env(&[(key, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(ref k, _) if k == key));
        }

        let err = EngineConfig::from_env_map(env(&[
            ("LEDGER_JOURNAL_DIR", "/tmp/j"),
            ("LEDGER_FSYNC", "every-n:0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref k, _) if k == "LEDGER_FSYNC"));
    }

    #[test]
    fn test_fsync_parsing() {
        assert_eq!(parse_fsync("on-rotation").unwrap(), FsyncPolicy::OnRotation);
        assert_eq!(parse_fsync("every-write").unwrap(), FsyncPolicy::EveryWrite);
        assert!(parse_fsync("sometimes").is_err());
    }
}
