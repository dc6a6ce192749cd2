//! Domain identifiers.
//!
//! These are **pure data** — no I/O, no framework dependencies.

/// Unique client identifier, issued monotonically by the relay on accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
