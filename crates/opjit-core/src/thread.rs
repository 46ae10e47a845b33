//! Thread modes for invokables.
//!
//! The host has two call sites: an init-rate site (once per note, may block)
//! and a control-rate site (periodic, must stay fast). The thread mode picks
//! which of them an invokable takes part in:
//!
//! | value | mode       | init | poll |
//! |-------|------------|------|------|
//! | 0     | (reserved) |      |      |
//! | 1     | `InitOnly` | yes  |      |
//! | 2     | `PollOnly` |      | yes  |
//! | 3     | `Both`     | yes  | yes  |

use std::fmt;

use crate::error::OpjitError;

/// Which call sites an invokable participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ThreadMode {
    /// Only the init-rate call site.
    InitOnly = 1,
    /// Only the control-rate call site.
    PollOnly = 2,
    /// Both call sites.
    Both = 3,
}

impl ThreadMode {
    /// Returns true if `init` is forwarded to the instance.
    pub fn runs_init(self) -> bool {
        matches!(self, ThreadMode::InitOnly | ThreadMode::Both)
    }

    /// Returns true if `poll` is forwarded to the instance.
    pub fn runs_poll(self) -> bool {
        matches!(self, ThreadMode::PollOnly | ThreadMode::Both)
    }

    /// Converts a numeric host argument, truncating toward zero like a C cast.
    pub fn from_host_value(value: f64) -> Result<Self, OpjitError> {
        if !value.is_finite() {
            return Err(OpjitError::Config(format!("invalid thread mode ({value})")));
        }
        Self::try_from(value.trunc() as i32)
    }
}

impl TryFrom<i32> for ThreadMode {
    type Error = OpjitError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ThreadMode::InitOnly),
            2 => Ok(ThreadMode::PollOnly),
            3 => Ok(ThreadMode::Both),
            other => Err(OpjitError::Config(format!("invalid thread mode ({other})"))),
        }
    }
}

impl fmt::Display for ThreadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadMode::InitOnly => write!(f, "init-only"),
            ThreadMode::PollOnly => write!(f, "poll-only"),
            ThreadMode::Both => write!(f, "both"),
        }
    }
}
