//! Registration statuses and outcome classification.
//!
//! A registration attempt has one primary result (the broker's own
//! directory) and zero or more sub-registry results.  The overall outcome
//! follows from those alone:
//!
//! | Primary | Sub-registries | Outcome |
//! |---|---|---|
//! | failed | any | [`RegistrationStatus::Failed`] |
//! | created / already-exists | all completed (or none) | [`RegistrationStatus::Success`] |
//! | created / already-exists | ≥1 pending | [`RegistrationStatus::Pending`] |
//! | created / already-exists | ≥1 failed, none pending | [`RegistrationStatus::Partial`] |

use serde::{Deserialize, Serialize};

/// Result of the broker's own (primary) registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PrimaryStatus {
    Created,
    #[serde(alias = "duplicate")]
    AlreadyExists,
    Failed,
}

impl PrimaryStatus {
    pub fn succeeded(self) -> bool {
        !matches!(self, PrimaryStatus::Failed)
    }
}

/// Status of one sub-registry publication.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubRegistryStatus {
    Pending,
    Completed,
    Failed,
}

/// Status of a server-held progress record.
///
/// Advances monotonically from `Pending` to one of the three terminal
/// states and never regresses within an attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Completed,
    Failed,
    Partial,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProgressStatus::Pending)
    }
}

/// Overall outcome of a submitted registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Success,
    Pending,
    Partial,
    Failed,
}

/// Classify an attempt from its primary and sub-registry statuses.
pub fn classify<I>(primary: PrimaryStatus, sub_registries: I) -> RegistrationStatus
where
    I: IntoIterator<Item = SubRegistryStatus>,
{
    if !primary.succeeded() {
        return RegistrationStatus::Failed;
    }

    let mut any_failed = false;
    for status in sub_registries {
        match status {
            SubRegistryStatus::Pending => return RegistrationStatus::Pending,
            SubRegistryStatus::Failed => any_failed = true,
            SubRegistryStatus::Completed => {}
        }
    }

    if any_failed {
        RegistrationStatus::Partial
    } else {
        RegistrationStatus::Success
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use SubRegistryStatus::*;

    #[test]
    fn all_completed_is_success() {
        assert_eq!(
            classify(PrimaryStatus::Created, [Completed, Completed]),
            RegistrationStatus::Success
        );
    }

    #[test]
    fn no_sub_registries_is_success() {
        assert_eq!(
            classify(PrimaryStatus::AlreadyExists, Vec::<SubRegistryStatus>::new()),
            RegistrationStatus::Success
        );
    }

    #[test]
    fn one_pending_among_completed_is_pending() {
        assert_eq!(
            classify(PrimaryStatus::Created, [Completed, Pending, Completed]),
            RegistrationStatus::Pending
        );
    }

    #[test]
    fn pending_outranks_failed() {
        assert_eq!(
            classify(PrimaryStatus::Created, [Failed, Pending]),
            RegistrationStatus::Pending
        );
    }

    #[test]
    fn failed_without_pending_is_partial() {
        assert_eq!(
            classify(PrimaryStatus::Created, [Completed, Failed]),
            RegistrationStatus::Partial
        );
    }

    #[test]
    fn failed_primary_is_failed() {
        assert_eq!(
            classify(PrimaryStatus::Failed, [Completed]),
            RegistrationStatus::Failed
        );
    }

    #[test]
    fn statuses_use_wire_names() {
        assert_eq!(
            serde_json::to_string(&PrimaryStatus::AlreadyExists).unwrap(),
            "\"already-exists\""
        );
        let dup: PrimaryStatus = serde_json::from_str("\"duplicate\"").unwrap();
        assert_eq!(dup, PrimaryStatus::AlreadyExists);
        let p: ProgressStatus = serde_json::from_str("\"partial\"").unwrap();
        assert!(p.is_terminal());
        assert!(!ProgressStatus::Pending.is_terminal());
    }
}
