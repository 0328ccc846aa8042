//! Identifiers and allocation outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a coupon definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponId(i64);

impl CouponId {
    /// Wrap a raw coupon identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CouponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CouponId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a requesting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw user identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Result of a single slot allocation attempt.
///
/// Running out of capacity is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A slot was consumed for the caller.
    Granted,
    /// No capacity left for today.
    Denied,
}

impl Decision {
    /// Returns `true` for [`Decision::Granted`].
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Route through which a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPath {
    /// Shared atomic counter.
    FastPath,
    /// Durable store under a row lock.
    Fallback,
    /// Coupon has no daily limit.
    Unlimited,
}

impl AllocationPath {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::Fallback => "fallback",
            Self::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for AllocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller of an issuance request is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Slot granted and handed to issuance.
    Issued {
        /// Path that granted the slot.
        path: AllocationPath,
    },
    /// Capacity exhausted.
    SoldOut {
        /// Path that denied the slot.
        path: AllocationPath,
    },
    /// The user already holds (or is being issued) this coupon.
    Duplicate,
}

impl AllocationOutcome {
    /// Returns `true` when a slot was granted.
    #[must_use]
    pub const fn is_issued(&self) -> bool {
        matches!(self, Self::Issued { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&CouponId::new(42)).unwrap();
        assert_eq!(json, "42");

        let user: UserId = serde_json::from_str("7").unwrap();
        assert_eq!(user, UserId::new(7));
    }

    #[test]
    fn path_labels() {
        assert_eq!(AllocationPath::FastPath.as_str(), "fast_path");
        assert_eq!(AllocationPath::Fallback.to_string(), "fallback");
        assert_eq!(AllocationPath::Unlimited.as_str(), "unlimited");
    }

    #[test]
    fn outcome_helpers() {
        assert!(Decision::Granted.is_granted());
        assert!(!Decision::Denied.is_granted());
        assert!(
            AllocationOutcome::Issued {
                path: AllocationPath::FastPath
            }
            .is_issued()
        );
        assert!(!AllocationOutcome::Duplicate.is_issued());
    }
}
