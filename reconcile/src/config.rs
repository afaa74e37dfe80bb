//! Engine tunables, with defaults and env overrides.
//!
//! # Environment variables
//! - `REVIEW_SYNC_LINE_WINDOW`     = auto-fix search window, ± lines (default 3)
//! - `REVIEW_SYNC_PROXIMITY`       = proximity dedup threshold, inclusive (default 20)
//! - `REVIEW_SYNC_FINGERPRINT_LEN` = hex chars kept from the digest (8..=64, default 16)

use crate::errors::{ConfigError, ReconcileResult};

/// Default ± window searched for the nearest valid diff line.
pub const DEFAULT_LINE_WINDOW: u32 = 3;
/// Default line distance under which a same-fingerprint finding is a duplicate.
pub const LINE_PROXIMITY_THRESHOLD: u32 = 20;
/// Default length of a generated fingerprint (hex chars).
pub const DEFAULT_FINGERPRINT_LEN: usize = 16;

/// Runtime configuration for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Symmetric window (±lines) the line resolver searches before clamping.
    pub line_window: u32,
    /// Inclusive distance for `SkipProximity`.
    pub proximity_threshold: u32,
    /// Length of generated fingerprints.
    pub fingerprint_len: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            line_window: DEFAULT_LINE_WINDOW,
            proximity_threshold: LINE_PROXIMITY_THRESHOLD,
            fingerprint_len: DEFAULT_FINGERPRINT_LEN,
        }
    }
}

impl ReconcileConfig {
    /// Defaults overridden by any `REVIEW_SYNC_*` variables that are set.
    ///
    /// # Errors
    /// [`ConfigError::InvalidNumber`] when a variable is set but unparsable or
    /// out of range.
    pub fn from_env() -> ReconcileResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = env_opt_u32("REVIEW_SYNC_LINE_WINDOW")? {
            cfg.line_window = v;
        }
        if let Some(v) = env_opt_u32("REVIEW_SYNC_PROXIMITY")? {
            cfg.proximity_threshold = v;
        }
        if let Some(v) = env_opt_u32("REVIEW_SYNC_FINGERPRINT_LEN")? {
            if !(8..=64).contains(&v) {
                return Err(ConfigError::InvalidNumber {
                    var: "REVIEW_SYNC_FINGERPRINT_LEN",
                    reason: "expected 8..=64",
                }
                .into());
            }
            cfg.fingerprint_len = v as usize;
        }
        Ok(cfg)
    }
}

/// Fetches a required, non-empty environment variable.
pub fn must_env(name: &'static str) -> ReconcileResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name).into()),
    }
}

/// Parses an optional `u32` from env (`Ok(None)` if unset/empty).
pub fn env_opt_u32(name: &'static str) -> ReconcileResult<Option<u32>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().parse::<u32>().map(Some).map_err(|_| {
            ConfigError::InvalidNumber {
                var: name,
                reason: "expected u32",
            }
            .into()
        }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::ffi::OsString;
    use std::sync::{Mutex, MutexGuard};

    /// Tests in this module mutate process env; they take this lock first.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets (or removes) a variable and restores the previous value on drop.
    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var_os(key);
            match value {
                Some(v) => unsafe { std::env::set_var(key, v) },
                None => unsafe { std::env::remove_var(key) },
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(prev) => unsafe { std::env::set_var(self.key, prev) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    fn tunables(
        window: Option<&str>,
        proximity: Option<&str>,
        fp_len: Option<&str>,
    ) -> [EnvGuard; 3] {
        [
            EnvGuard::set("REVIEW_SYNC_LINE_WINDOW", window),
            EnvGuard::set("REVIEW_SYNC_PROXIMITY", proximity),
            EnvGuard::set("REVIEW_SYNC_FINGERPRINT_LEN", fp_len),
        ]
    }

    #[test]
    fn unset_env_gives_defaults() {
        let _lock = env_lock();
        let _env = tunables(None, None, Some("  "));
        assert_eq!(ReconcileConfig::from_env().unwrap(), ReconcileConfig::default());
    }

    #[test]
    fn env_overrides_every_tunable() {
        let _lock = env_lock();
        let _env = tunables(Some("5"), Some(" 30 "), Some("64"));
        let cfg = ReconcileConfig::from_env().unwrap();
        assert_eq!(cfg.line_window, 5);
        assert_eq!(cfg.proximity_threshold, 30);
        assert_eq!(cfg.fingerprint_len, 64);
    }

    #[test]
    fn fingerprint_len_bounds_are_inclusive() {
        let _lock = env_lock();
        for (raw, ok) in [("7", false), ("8", true), ("64", true), ("65", false)] {
            let _env = tunables(None, None, Some(raw));
            let res = ReconcileConfig::from_env();
            assert_eq!(res.is_ok(), ok, "REVIEW_SYNC_FINGERPRINT_LEN={raw}");
            if let Err(e) = res {
                assert!(matches!(
                    e,
                    Error::Config(ConfigError::InvalidNumber {
                        var: "REVIEW_SYNC_FINGERPRINT_LEN",
                        ..
                    })
                ));
            }
        }
    }

    #[test]
    fn unparsable_number_is_invalid_number() {
        let _lock = env_lock();
        let _env = tunables(Some("three"), None, None);
        let err = ReconcileConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidNumber {
                var: "REVIEW_SYNC_LINE_WINDOW",
                ..
            })
        ));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ReconcileConfig::default();
        assert_eq!(cfg.line_window, 3);
        assert_eq!(cfg.proximity_threshold, 20);
        assert_eq!(cfg.fingerprint_len, 16);
    }

    #[test]
    fn missing_var_is_reported_by_name() {
        let err = must_env("REVIEW_SYNC_SURELY_UNSET_VARIABLE").unwrap_err();
        assert!(err.to_string().contains("REVIEW_SYNC_SURELY_UNSET_VARIABLE"));
    }
}
