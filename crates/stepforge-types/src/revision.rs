/// Per-invoke behaviour version supplied by the host.
///
/// Only the low byte carries the revision number; higher bits are feature flags
/// that this engine ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Revision(pub u64);

impl Revision {
    /// First revision using the current wire codec and strict parameter parsing.
    pub const ICON2: u64 = 14;

    pub fn value(self) -> u64 {
        self.0 & 0xff
    }

    /// Legacy revisions keep float support and the historical conversion quirks.
    pub fn is_legacy(self) -> bool {
        self.value() < Self::ICON2
    }
}
