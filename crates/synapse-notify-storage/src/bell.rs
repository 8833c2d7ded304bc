//! Audible notification seam.

use std::io::Write as _;

/// Something that can get a human's (or a CLI agent's) attention.
pub trait Bell: Send + Sync {
    fn ring(&self);
}

/// Writes the ASCII BEL character to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl Bell for TerminalBell {
    fn ring(&self) {
        let mut out = std::io::stdout().lock();
        // A terminal that can't beep is not worth failing the report over.
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }
}

/// Never rings. Used by tests and when the bell is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBell;

impl Bell for SilentBell {
    fn ring(&self) {}
}
