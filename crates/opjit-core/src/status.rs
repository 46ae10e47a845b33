//! Integer status codes exchanged with the host and with compiled code.

/// Status returned by compiled code and by host callbacks.
pub type Status = i32;

/// Success.
pub const OK: Status = 0;

/// Generic failure reported to the host.
pub const NOTOK: Status = -1;

/// Result value of the compile opcode when no entry point could be called.
pub const COMPILE_FAILED: Status = 255;
