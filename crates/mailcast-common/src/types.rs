use serde::{Deserialize, Serialize};

/// Lifecycle status of a mailing, advanced by the dispatch workflow.
///
/// Normal flow is `Created` -> `Running` -> `Finished`. The only backward
/// transition is the reschedule rule: editing a mailing's end time forces
/// it back to `Running`.
///
/// # Examples
///
/// ```
/// use mailcast_common::types::MailingStatus;
///
/// let status: MailingStatus = "running".parse().unwrap();
/// assert_eq!(status, MailingStatus::Running);
/// assert_eq!(status.to_string(), "running");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MailingStatus {
    Created,
    Running,
    Finished,
}

impl MailingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailingStatus::Created => "created",
            MailingStatus::Running => "running",
            MailingStatus::Finished => "finished",
        }
    }
}

impl std::fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MailingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(MailingStatus::Created),
            "running" => Ok(MailingStatus::Running),
            "finished" => Ok(MailingStatus::Finished),
            _ => Err(format!("unknown mailing status: {s}")),
        }
    }
}

/// Outcome of one per-recipient delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(AttemptStatus::Success),
            "failure" => Ok(AttemptStatus::Failure),
            _ => Err(format!("unknown attempt status: {s}")),
        }
    }
}

/// Role of an account. Managers see every owner's rows; members see only
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Manager,
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Manager => "manager",
            UserRole::Member => "member",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manager" => Ok(UserRole::Manager),
            "member" => Ok(UserRole::Member),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// The acting user a query runs on behalf of, reduced to the two facts the
/// storage layer needs: identity for owner stamping and an explicit
/// visibility flag for list scoping.
///
/// # Examples
///
/// ```
/// use mailcast_common::types::OwnerScope;
///
/// let scope = OwnerScope { user_id: "42".into(), is_manager: false };
/// assert!(scope.allows(&Some("42".to_string())));
/// assert!(!scope.allows(&None));
/// ```
#[derive(Debug, Clone)]
pub struct OwnerScope {
    pub user_id: String,
    pub is_manager: bool,
}

impl OwnerScope {
    /// Whether a row with the given owner is visible to this actor.
    pub fn allows(&self, owner_id: &Option<String>) -> bool {
        self.is_manager || owner_id.as_deref() == Some(self.user_id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailing_status_round_trips_through_strings() {
        for status in [
            MailingStatus::Created,
            MailingStatus::Running,
            MailingStatus::Finished,
        ] {
            let parsed: MailingStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<MailingStatus>().is_err());
    }

    #[test]
    fn manager_scope_allows_foreign_rows() {
        let scope = OwnerScope {
            user_id: "1".into(),
            is_manager: true,
        };
        assert!(scope.allows(&Some("2".to_string())));
        assert!(scope.allows(&None));
    }
}
