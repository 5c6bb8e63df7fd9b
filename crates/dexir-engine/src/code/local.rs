//! Local variables

use crate::descriptor::ValueKind;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 64 bits so identities never repeat within a process
static NEXT_LOCAL: AtomicU64 = AtomicU64::new(0);

/// A typed value slot of one method body
///
/// Locals carry no register; the encoder assigns registers per encode. A
/// local belongs to the first body it is attached in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVariable {
    id: u64,
    kind: ValueKind,
}

impl LocalVariable {
    /// Fresh local of the given kind
    pub fn new(kind: ValueKind) -> Self {
        Self {
            id: NEXT_LOCAL.fetch_add(1, Ordering::Relaxed),
            kind,
        }
    }

    /// Fresh reference local
    pub fn reference() -> Self {
        Self::new(ValueKind::Reference)
    }

    /// Fresh `int` local
    pub fn int() -> Self {
        Self::new(ValueKind::Int)
    }

    /// Fresh `long` local
    pub fn long() -> Self {
        Self::new(ValueKind::Long)
    }

    /// Fresh `float` local
    pub fn float() -> Self {
        Self::new(ValueKind::Float)
    }

    /// Fresh `double` local
    pub fn double() -> Self {
        Self::new(ValueKind::Double)
    }

    /// Fresh `boolean` local
    pub fn boolean() -> Self {
        Self::new(ValueKind::Boolean)
    }

    /// Process-unique identity
    pub fn id(self) -> u64 {
        self.id
    }

    /// Value kind
    pub fn kind(self) -> ValueKind {
        self.kind
    }
}

impl fmt::Display for LocalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}:{}", self.id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locals_are_unique() {
        let a = LocalVariable::reference();
        let b = LocalVariable::reference();
        assert_ne!(a, b);
        assert_eq!(a, a);
        assert_eq!(LocalVariable::long().kind(), ValueKind::Long);
    }

    #[test]
    fn test_local_ids_increase() {
        let first: u64 = LocalVariable::int().id();
        let ids: Vec<u64> = (0..1000).map(|_| LocalVariable::int().id()).collect();
        assert!(ids.iter().all(|&id| id > first));
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
