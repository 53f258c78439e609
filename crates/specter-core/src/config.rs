//! Run configuration resolution
//!
//! A [`RunConfig`] is derived exactly once per invocation from the parsed
//! command-line flags and the environment overlay, and is immutable from
//! then on. The overlay supplies the default for watch mode; flags can
//! only switch features on.

use crate::env::EnvironmentMap;
use serde_json::Value;

/// Overlay key holding the watch-mode default.
const WATCH_KEY: &str = "WATCH";

/// Normalized per-run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Collect coverage and print a text report after the run.
    pub coverage: bool,
    /// Relay page exceptions and resource errors to the log.
    pub verbose_errors: bool,
    /// Keep the server alive and re-run tests on file changes.
    pub watch: bool,
    /// Ask the in-page framework for full stack traces.
    pub full_trace: bool,
}

impl RunConfig {
    /// Resolve the run configuration from CLI flags and the overlay.
    ///
    /// `quiet` inverts into `verbose_errors`; the `WATCH` overlay entry
    /// (JSON boolean after coercion) is the watch default and a `--watch`
    /// flag overrides it to true.
    pub fn resolve(
        coverage: bool,
        quiet: bool,
        watch: bool,
        full_trace: bool,
        overlay: &EnvironmentMap,
    ) -> Self {
        Self {
            coverage,
            verbose_errors: !quiet,
            watch: watch || overlay_watch(overlay),
            full_trace,
        }
    }
}

/// Read the watch-mode default from the overlay.
fn overlay_watch(overlay: &EnvironmentMap) -> bool {
    matches!(overlay.get(WATCH_KEY), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::parse_overlay;
    use std::collections::HashMap;

    fn empty() -> EnvironmentMap {
        EnvironmentMap::new()
    }

    #[test]
    fn test_defaults_off() {
        let config = RunConfig::resolve(false, false, false, false, &empty());
        assert!(!config.coverage);
        assert!(config.verbose_errors);
        assert!(!config.watch);
        assert!(!config.full_trace);
    }

    #[test]
    fn test_quiet_disables_error_relay() {
        let config = RunConfig::resolve(false, true, false, false, &empty());
        assert!(!config.verbose_errors);
    }

    #[test]
    fn test_overlay_watch_default() {
        let overlay = parse_overlay("WATCH=true", &HashMap::new());
        let config = RunConfig::resolve(false, false, false, false, &overlay);
        assert!(config.watch);
    }

    #[test]
    fn test_flag_overrides_overlay_to_true() {
        let overlay = parse_overlay("WATCH=false", &HashMap::new());
        let config = RunConfig::resolve(false, false, true, false, &overlay);
        assert!(config.watch);
    }

    #[test]
    fn test_non_boolean_watch_value_is_ignored() {
        let overlay = parse_overlay("WATCH=yes", &HashMap::new());
        let config = RunConfig::resolve(false, false, false, false, &overlay);
        assert!(!config.watch);
    }
}
