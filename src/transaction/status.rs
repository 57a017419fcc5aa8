//! Transaction status values as reported by a transaction manager.

/// Status of a transaction, or of the calling context when it has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Associated and usable.
    Active,
    /// Doomed; the only possible outcome is rollback.
    MarkedRollback,
    Prepared,
    Committed,
    /// Rolled back, possibly by a timeout reaper while the business method ran.
    RolledBack,
    Unknown,
    /// No transaction is associated with the calling context.
    NoTransaction,
    Preparing,
    Committing,
    RollingBack,
}

impl Status {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_marked_rollback(&self) -> bool {
        matches!(self, Self::MarkedRollback)
    }

    /// Returns true once the transaction has reached an outcome.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Returns true while the transaction can still be ended by commit or rollback.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::MarkedRollback)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "STATUS_ACTIVE",
            Self::MarkedRollback => "STATUS_MARKED_ROLLBACK",
            Self::Prepared => "STATUS_PREPARED",
            Self::Committed => "STATUS_COMMITTED",
            Self::RolledBack => "STATUS_ROLLEDBACK",
            Self::Unknown => "STATUS_UNKNOWN",
            Self::NoTransaction => "STATUS_NO_TRANSACTION",
            Self::Preparing => "STATUS_PREPARING",
            Self::Committing => "STATUS_COMMITTING",
            Self::RollingBack => "STATUS_ROLLING_BACK",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(Status::Active.is_active());
        assert!(Status::Active.is_open());
        assert!(!Status::Active.is_finished());

        assert!(Status::MarkedRollback.is_marked_rollback());
        assert!(Status::MarkedRollback.is_open());

        assert!(Status::Committed.is_finished());
        assert!(Status::RolledBack.is_finished());
        assert!(!Status::RolledBack.is_open());
        assert!(!Status::Prepared.is_open());
        assert!(!Status::NoTransaction.is_open());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Active.to_string(), "STATUS_ACTIVE");
        assert_eq!(Status::MarkedRollback.to_string(), "STATUS_MARKED_ROLLBACK");
        assert_eq!(Status::RollingBack.to_string(), "STATUS_ROLLING_BACK");
    }
}
