//! Verbose diagnostics switch.
//!
//! One flag is shared by the compile pipeline, the JIT environment and every
//! module compiled through them. Building a compile request resets it and
//! turns it back on when the options contain `-v`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Option token that enables verbose diagnostics.
pub const VERBOSE_TOKEN: &str = "-v";

/// Shared on/off switch for verbose diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsFlag(Arc<AtomicBool>);

impl DiagnosticsFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    /// Resets the flag, then enables it if `tokens` contains [`VERBOSE_TOKEN`].
    pub fn reset_from_tokens<S: AsRef<str>>(&self, tokens: &[S]) {
        let verbose = tokens.iter().any(|t| t.as_ref() == VERBOSE_TOKEN);
        self.set(verbose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_turns_flag_off_without_token() {
        let flag = DiagnosticsFlag::new();
        flag.set(true);
        flag.reset_from_tokens(&["-O2"]);
        assert!(!flag.enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = DiagnosticsFlag::new();
        let other = flag.clone();
        other.reset_from_tokens(&["-O0", "-v"]);
        assert!(flag.enabled());
    }
}
