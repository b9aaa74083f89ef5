//! Subsystem configuration, core-list parsing, and configuration errors.
//!
//! [`EngineConfig`] is validated once, when the subsystem is built, and is
//! immutable afterwards. [`CoreSpec`] parses the lcore-style worker list
//! (`"0-3"`, `"0,2,4-6"`) handed to `init`.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

use mss_core::geometry::MIN_PAGE_SIZE;
use mss_core::MssError;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while parsing or validating configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The core list was empty or all whitespace.
    EmptyCoreSpec,
    /// A token in the core list was not a number or `a-b` range.
    InvalidCoreSpec {
        /// The offending token.
        token: String,
    },
    /// A core id is at or above [`CoreSpec::MAX_CORES`].
    CoreOutOfRange {
        /// The offending core id.
        core: usize,
    },
    /// A core appears more than once.
    DuplicateCore {
        /// The repeated core id.
        core: usize,
    },
    /// Page size is not a power of two or is below the minimum.
    InvalidPageSize {
        /// The configured value.
        value: usize,
    },
    /// Delta queue depth is zero.
    DeltaQueueZero,
    /// The housekeeping thread could not be spawned.
    ThreadSpawnFailed {
        /// OS error text.
        reason: String,
    },
    /// Pinning a worker thread to its core failed.
    AffinityFailed {
        /// Core the thread was to be bound to.
        core: usize,
        /// OS error text.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCoreSpec => write!(f, "worker core list is empty"),
            Self::InvalidCoreSpec { token } => {
                write!(f, "invalid token {token:?} in worker core list")
            }
            Self::CoreOutOfRange { core } => write!(
                f,
                "core {core} out of range, ids must be below {}",
                CoreSpec::MAX_CORES
            ),
            Self::DuplicateCore { core } => write!(f, "core {core} listed more than once"),
            Self::InvalidPageSize { value } => write!(
                f,
                "page_size must be a power of two >= {MIN_PAGE_SIZE}, got {value}"
            ),
            Self::DeltaQueueZero => write!(f, "delta_queue_depth must be at least 1"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
            Self::AffinityFailed { core, reason } => {
                write!(f, "could not bind worker to core {core}: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

impl From<ConfigError> for MssError {
    fn from(e: ConfigError) -> Self {
        MssError::InitFailure {
            reason: e.to_string(),
        }
    }
}

// ── CoreSpec ───────────────────────────────────────────────────────

/// Ordered list of logical cores for worker execution contexts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreSpec {
    cores: Vec<usize>,
}

impl CoreSpec {
    /// Exclusive upper bound on core ids, the size of a Linux `cpu_set_t`.
    pub const MAX_CORES: usize = 1024;

    /// Parse a comma-separated list of core ids and inclusive ranges.
    ///
    /// Whitespace around tokens is ignored. Ranges must not be reversed,
    /// ids must be below [`MAX_CORES`](Self::MAX_CORES) and no core may
    /// appear twice.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        if spec.trim().is_empty() {
            return Err(ConfigError::EmptyCoreSpec);
        }
        let mut cores = Vec::new();
        let mut seen = [0u64; Self::MAX_CORES / 64];
        for raw in spec.split(',') {
            let token = raw.trim();
            let invalid = || ConfigError::InvalidCoreSpec {
                token: token.to_string(),
            };
            let (lo, hi) = match token.split_once('-') {
                Some((a, b)) => {
                    let lo: usize = a.trim().parse().map_err(|_| invalid())?;
                    let hi: usize = b.trim().parse().map_err(|_| invalid())?;
                    if lo > hi {
                        return Err(invalid());
                    }
                    (lo, hi)
                }
                None => {
                    let core: usize = token.parse().map_err(|_| invalid())?;
                    (core, core)
                }
            };
            if hi >= Self::MAX_CORES {
                return Err(ConfigError::CoreOutOfRange { core: hi });
            }
            for core in lo..=hi {
                let (word, bit) = (core / 64, 1u64 << (core % 64));
                if seen[word] & bit != 0 {
                    return Err(ConfigError::DuplicateCore { core });
                }
                seen[word] |= bit;
                cores.push(core);
            }
        }
        Ok(Self { cores })
    }

    /// Cores in the order listed.
    pub fn cores(&self) -> &[usize] {
        &self.cores
    }

    /// First listed core; housekeeping runs here.
    pub fn primary(&self) -> usize {
        self.cores[0]
    }
}

impl FromStr for CoreSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CoreSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut i = 0;
        while i < self.cores.len() {
            let start = self.cores[i];
            let mut end = start;
            while i + 1 < self.cores.len() && self.cores[i + 1] == end + 1 {
                end += 1;
                i += 1;
            }
            if !first {
                write!(f, ",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
            i += 1;
        }
        Ok(())
    }
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Configuration for a snapshot subsystem instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Worker execution contexts.
    pub worker_cores: CoreSpec,
    /// Page size used to interpret segments, in bytes. Default: 1024.
    pub page_size: usize,
    /// Bind the housekeeping worker to `worker_cores.primary()`. Default: false.
    pub pin_threads: bool,
    /// Emit XOR deltas for every commit. Default: false.
    pub capture_deltas: bool,
    /// Capacity of the housekeeping queue. Default: 64.
    pub delta_queue_depth: usize,
}

impl EngineConfig {
    /// Default page size in bytes.
    pub const DEFAULT_PAGE_SIZE: usize = 1024;

    /// Default housekeeping queue depth.
    pub const DEFAULT_DELTA_QUEUE_DEPTH: usize = 64;

    /// Config for the given worker core list with defaults elsewhere.
    pub fn new(worker_cores: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            worker_cores: CoreSpec::parse(worker_cores)?,
            page_size: Self::DEFAULT_PAGE_SIZE,
            pin_threads: false,
            capture_deltas: false,
            delta_queue_depth: Self::DEFAULT_DELTA_QUEUE_DEPTH,
        })
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.page_size.is_power_of_two() || self.page_size < MIN_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize {
                value: self.page_size,
            });
        }
        if self.delta_queue_depth == 0 {
            return Err(ConfigError::DeltaQueueZero);
        }
        if self.worker_cores.cores().is_empty() {
            return Err(ConfigError::EmptyCoreSpec);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_lists() {
        assert_eq!(CoreSpec::parse("0-3").unwrap().cores(), &[0, 1, 2, 3]);
        assert_eq!(
            CoreSpec::parse("0, 2,4-6").unwrap().cores(),
            &[0, 2, 4, 5, 6]
        );
        assert_eq!(CoreSpec::parse("7").unwrap().primary(), 7);
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["a", "1-", "-1", "3-1", "1,,2", "1-2-3", "0x1"] {
            assert!(
                matches!(CoreSpec::parse(bad), Err(ConfigError::InvalidCoreSpec { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_and_duplicates() {
        assert_eq!(CoreSpec::parse("  "), Err(ConfigError::EmptyCoreSpec));
        assert_eq!(
            CoreSpec::parse("0-2,2"),
            Err(ConfigError::DuplicateCore { core: 2 })
        );
    }

    #[test]
    fn huge_ranges_are_rejected_before_expansion() {
        assert_eq!(
            CoreSpec::parse("0-4294967295").unwrap_err(),
            ConfigError::CoreOutOfRange { core: 4294967295 }
        );
        assert_eq!(
            CoreSpec::parse("2,1024").unwrap_err(),
            ConfigError::CoreOutOfRange { core: 1024 }
        );
        let full = CoreSpec::parse("0-1023").unwrap();
        assert_eq!(full.cores().len(), CoreSpec::MAX_CORES);
        assert_eq!(
            CoreSpec::parse("0-1023,512").unwrap_err(),
            ConfigError::DuplicateCore { core: 512 }
        );
    }

    #[test]
    fn display_compresses_runs() {
        let spec: CoreSpec = "0,1,2,5,7-8".parse().unwrap();
        assert_eq!(spec.to_string(), "0-2,5,7-8");
    }

    #[test]
    fn defaults_validate() {
        let config = EngineConfig::new("0").unwrap();
        assert_eq!(config.page_size, 1024);
        assert!(!config.capture_deltas);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_page_size_rejected() {
        let config = EngineConfig {
            page_size: 1000,
            ..EngineConfig::new("0").unwrap()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPageSize { value: 1000 })
        );
    }

    #[test]
    fn zero_queue_rejected() {
        let config = EngineConfig {
            delta_queue_depth: 0,
            ..EngineConfig::new("0").unwrap()
        };
        assert_eq!(config.validate(), Err(ConfigError::DeltaQueueZero));
    }

    #[test]
    fn config_error_becomes_init_failure() {
        let e: MssError = ConfigError::EmptyCoreSpec.into();
        assert!(matches!(e, MssError::InitFailure { .. }));
    }
}
