//! Source location tracking
//!
//! Kernel nodes carry token positions: byte offsets into the script they were
//! read from. A handful of negative values are reserved for synthetic code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token position (byte offset into the owning script)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPosition(pub i32);

impl TokenPosition {
    /// No source position is associated with the node.
    pub const NO_SOURCE: TokenPosition = TokenPosition(-1);
    /// Synthetic code inserted by the graph builder.
    pub const SYNTHETIC: TokenPosition = TokenPosition(-2);
    /// Code belonging to a method prologue.
    pub const PROLOGUE: TokenPosition = TokenPosition(-3);

    /// Create a position from a script offset
    #[inline]
    pub fn new(offset: i32) -> Self {
        Self(offset)
    }

    #[inline]
    pub fn value(self) -> i32 {
        self.0
    }

    /// Real positions point into the script text.
    #[inline]
    pub fn is_real(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn is_synthetic(self) -> bool {
        self == Self::SYNTHETIC
    }

    /// A debugger may pause at any real position.
    #[inline]
    pub fn is_debug_pause(self) -> bool {
        self.is_real()
    }
}

impl Default for TokenPosition {
    fn default() -> Self {
        Self::NO_SOURCE
    }
}

impl fmt::Display for TokenPosition {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match *self {
            Self::NO_SOURCE => write!(f, "<no-source>"),
            Self::SYNTHETIC => write!(f, "<synthetic>"),
            Self::PROLOGUE => write!(f, "<prologue>"),
            TokenPosition(offset) => write!(f, "@{}", offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_positions_are_not_real() {
        assert!(!TokenPosition::NO_SOURCE.is_real());
        assert!(!TokenPosition::SYNTHETIC.is_real());
        assert!(!TokenPosition::PROLOGUE.is_real());
        assert!(TokenPosition::new(0).is_real());
    }

    #[test]
    fn test_display() {
        assert_eq!(TokenPosition::new(42).to_string(), "@42");
        assert_eq!(TokenPosition::NO_SOURCE.to_string(), "<no-source>");
    }
}
