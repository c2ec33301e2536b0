//! Deployment unit lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment unit.
///
/// Units start at [`UnitStatus::Init`] when enqueued. Every other value is
/// reported by the automation engine; statuses the engine invents beyond the
/// known set are kept verbatim in [`UnitStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitStatus {
    /// Enqueued, not yet handed to the engine.
    Init,
    /// Engine accepted the unit.
    Starting,
    /// Engine is executing the unit.
    Running,
    /// Finished without error.
    Successful,
    /// Finished with an error.
    Failed,
    /// Engine gave up after its own deadline.
    Timeout,
    /// Run was canceled inside the engine.
    Canceled,
    /// Any other engine-reported status.
    Other(String),
}

impl UnitStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "init",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        }
    }

    /// Whether the engine will report nothing further for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Successful | Self::Failed | Self::Timeout | Self::Canceled
        )
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Successful)
    }
}

impl From<&str> for UnitStatus {
    fn from(s: &str) -> Self {
        match s {
            "init" => Self::Init,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "successful" => Self::Successful,
            "failed" => Self::Failed,
            "timeout" => Self::Timeout,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for UnitStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<UnitStatus> for String {
    fn from(status: UnitStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("init", UnitStatus::Init, false)]
    #[case("running", UnitStatus::Running, false)]
    #[case("successful", UnitStatus::Successful, true)]
    #[case("failed", UnitStatus::Failed, true)]
    #[case("timeout", UnitStatus::Timeout, true)]
    #[case("canceled", UnitStatus::Canceled, true)]
    fn test_known_statuses(
        #[case] raw: &str,
        #[case] expected: UnitStatus,
        #[case] terminal: bool,
    ) {
        let status = UnitStatus::from(raw);
        assert_eq!(status, expected);
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.as_str(), raw);
    }

    #[test]
    fn test_unknown_status_is_kept_verbatim() {
        let status = UnitStatus::from("paused");
        assert_eq!(status, UnitStatus::Other("paused".to_string()));
        assert!(!status.is_terminal());
        assert!(!status.is_successful());
        assert_eq!(status.to_string(), "paused");
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_string(&UnitStatus::Successful).unwrap(),
            "\"successful\""
        );
        let parsed: UnitStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, UnitStatus::Failed);
    }
}
