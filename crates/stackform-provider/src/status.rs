//! Remote stack status, translated from the provider's raw string tokens
//! (`CREATE_IN_PROGRESS`, `UPDATE_ROLLBACK_COMPLETE`, ...) into a closed
//! operation/phase pair at the adapter boundary.

use crate::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackOperation {
    Create,
    Update,
    Delete,
    Rollback,
    UpdateRollback,
    Import,
    ImportRollback,
    Review,
}

impl StackOperation {
    pub fn is_rollback(self) -> bool {
        matches!(
            self,
            Self::Rollback | Self::UpdateRollback | Self::ImportRollback
        )
    }

    fn token(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Rollback => "ROLLBACK",
            Self::UpdateRollback => "UPDATE_ROLLBACK",
            Self::Import => "IMPORT",
            Self::ImportRollback => "IMPORT_ROLLBACK",
            Self::Review => "REVIEW",
        }
    }

    fn from_token(s: &str) -> Option<Self> {
        Some(match s {
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "ROLLBACK" => Self::Rollback,
            "UPDATE_ROLLBACK" => Self::UpdateRollback,
            "IMPORT" => Self::Import,
            "IMPORT_ROLLBACK" => Self::ImportRollback,
            "REVIEW" => Self::Review,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    InProgress,
    /// Operation finished; the provider is still removing replaced resources.
    CleanupInProgress,
    Complete,
    Failed,
}

/// A provider stack status such as `UPDATE_COMPLETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackStatus {
    pub operation: StackOperation,
    pub phase: Phase,
}

impl StackStatus {
    pub const CREATE_IN_PROGRESS: Self = Self::new(StackOperation::Create, Phase::InProgress);
    pub const CREATE_COMPLETE: Self = Self::new(StackOperation::Create, Phase::Complete);
    pub const UPDATE_IN_PROGRESS: Self = Self::new(StackOperation::Update, Phase::InProgress);
    pub const UPDATE_COMPLETE: Self = Self::new(StackOperation::Update, Phase::Complete);
    pub const DELETE_IN_PROGRESS: Self = Self::new(StackOperation::Delete, Phase::InProgress);
    pub const DELETE_COMPLETE: Self = Self::new(StackOperation::Delete, Phase::Complete);

    pub const fn new(operation: StackOperation, phase: Phase) -> Self {
        Self { operation, phase }
    }

    /// Complete or failed; polling stops here.
    pub fn is_terminal(self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::Failed)
    }

    pub fn is_in_progress(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.phase {
            Phase::InProgress => "IN_PROGRESS",
            Phase::CleanupInProgress => "COMPLETE_CLEANUP_IN_PROGRESS",
            Phase::Complete => "COMPLETE",
            Phase::Failed => "FAILED",
        };
        write!(f, "{}_{suffix}", self.operation.token())
    }
}

impl FromStr for StackStatus {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Longest suffix first: cleanup tokens also end in IN_PROGRESS.
        const SUFFIXES: [(&str, Phase); 4] = [
            ("_COMPLETE_CLEANUP_IN_PROGRESS", Phase::CleanupInProgress),
            ("_IN_PROGRESS", Phase::InProgress),
            ("_COMPLETE", Phase::Complete),
            ("_FAILED", Phase::Failed),
        ];
        SUFFIXES
            .iter()
            .find_map(|(suffix, phase)| {
                let op = s.strip_suffix(suffix)?;
                StackOperation::from_token(op).map(|op| Self::new(op, *phase))
            })
            .ok_or_else(|| ProviderError::UnknownStatus(s.to_owned()))
    }
}

impl TryFrom<String> for StackStatus {
    type Error = ProviderError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StackStatus> for String {
    fn from(s: StackStatus) -> Self {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_provider_token() {
        let tokens = [
            "CREATE_IN_PROGRESS",
            "CREATE_FAILED",
            "CREATE_COMPLETE",
            "ROLLBACK_IN_PROGRESS",
            "ROLLBACK_FAILED",
            "ROLLBACK_COMPLETE",
            "DELETE_IN_PROGRESS",
            "DELETE_FAILED",
            "DELETE_COMPLETE",
            "UPDATE_IN_PROGRESS",
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_COMPLETE",
            "UPDATE_FAILED",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "UPDATE_ROLLBACK_FAILED",
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_ROLLBACK_COMPLETE",
            "REVIEW_IN_PROGRESS",
            "IMPORT_IN_PROGRESS",
            "IMPORT_COMPLETE",
            "IMPORT_ROLLBACK_IN_PROGRESS",
            "IMPORT_ROLLBACK_FAILED",
            "IMPORT_ROLLBACK_COMPLETE",
        ];
        for token in tokens {
            let status: StackStatus = token.parse().unwrap();
            assert_eq!(status.to_string(), token);
        }
    }

    #[test]
    fn cleanup_is_not_terminal() {
        let s: StackStatus = "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS".parse().unwrap();
        assert_eq!(s.operation, StackOperation::Update);
        assert_eq!(s.phase, Phase::CleanupInProgress);
        assert!(!s.is_terminal());
    }

    #[test]
    fn rollback_complete_is_terminal_but_not_update_complete() {
        let s: StackStatus = "UPDATE_ROLLBACK_COMPLETE".parse().unwrap();
        assert!(s.is_terminal());
        assert_ne!(s, StackStatus::UPDATE_COMPLETE);
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!(matches!(
            "EXPLODED".parse::<StackStatus>(),
            Err(ProviderError::UnknownStatus(_))
        ));
        assert!("CREATE_PAUSED".parse::<StackStatus>().is_err());
    }

    #[test]
    fn serde_uses_raw_token() {
        let json = serde_json::to_string(&StackStatus::DELETE_COMPLETE).unwrap();
        assert_eq!(json, "\"DELETE_COMPLETE\"");
        let back: StackStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StackStatus::DELETE_COMPLETE);
    }
}
