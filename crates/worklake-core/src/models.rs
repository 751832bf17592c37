//! Canonical, tool-agnostic domain models.
//!
//! Entities ([`Board`], [`Issue`], [`Account`]) are keyed by a generated
//! domain id. Link records ([`BoardIssue`], [`IssueAssignee`]) have no id of
//! their own and are keyed by the pair of ids they connect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ═══════════════════════════════════════════════════════════════════════
// Domain types
// ═══════════════════════════════════════════════════════════════════════

/// A family of canonical entities that a scope config can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainType {
    Ticket,
    Code,
    CodeReview,
    Cicd,
    Cross,
    CodeQuality,
}

impl DomainType {
    pub const ALL: [DomainType; 6] = [
        DomainType::Ticket,
        DomainType::Code,
        DomainType::CodeReview,
        DomainType::Cicd,
        DomainType::Cross,
        DomainType::CodeQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::Ticket => "TICKET",
            DomainType::Code => "CODE",
            DomainType::CodeReview => "CODE_REVIEW",
            DomainType::Cicd => "CICD",
            DomainType::Cross => "CROSS",
            DomainType::CodeQuality => "CODE_QUALITY",
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainType {
    type Err = Error;

    /// Case-insensitive: `"ticket"` and `"TICKET"` are the same kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::bad_input(format!("unknown domain type '{}'", s)))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Canonical enumerations
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Todo,
    InProgress,
    Done,
    Other,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Todo => "TODO",
            IssueStatus::InProgress => "IN_PROGRESS",
            IssueStatus::Done => "DONE",
            IssueStatus::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    Requirement,
    Bug,
    Incident,
    Epic,
    Task,
    Subtask,
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Requirement => "REQUIREMENT",
            IssueType::Bug => "BUG",
            IssueType::Incident => "INCIDENT",
            IssueType::Epic => "EPIC",
            IssueType::Task => "TASK",
            IssueType::Subtask => "SUBTASK",
            IssueType::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssuePriority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
    Unknown,
}

impl IssuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuePriority::Highest => "HIGHEST",
            IssuePriority::High => "HIGH",
            IssuePriority::Medium => "MEDIUM",
            IssuePriority::Low => "LOW",
            IssuePriority::Lowest => "LOWEST",
            IssuePriority::Unknown => "UNKNOWN",
        }
    }

    /// Map a priority label such as `"High"` or `"medium"`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "highest" | "critical" | "blocker" => IssuePriority::Highest,
            "high" | "major" => IssuePriority::High,
            "medium" | "normal" | "middle" => IssuePriority::Medium,
            "low" | "minor" => IssuePriority::Low,
            "lowest" | "trivial" => IssuePriority::Lowest,
            _ => IssuePriority::Unknown,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub board_type: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub issue_key: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub issue_type: IssueType,
    pub original_type: String,
    pub status: IssueStatus,
    pub original_status: String,
    pub priority: IssuePriority,
    pub story_point: Option<f64>,
    pub created_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub resolution_date: Option<DateTime<Utc>>,
    pub lead_time_minutes: Option<i64>,
    pub parent_issue_id: Option<String>,
    pub creator_id: Option<String>,
    pub creator_name: Option<String>,
    pub assignee_id: Option<String>,
    pub assignee_name: Option<String>,
    pub original_project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardIssue {
    pub board_id: String,
    pub issue_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueAssignee {
    pub issue_id: String,
    pub assignee_id: String,
    pub assignee_name: Option<String>,
}

/// Minutes between start and completion, or `None` until the work is done.
///
/// Truncates toward zero, so 90.9 minutes is reported as 90.
pub fn lead_time_minutes(
    started: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
) -> Option<i64> {
    match (started, completed) {
        (Some(start), Some(end)) => Some((end - start).num_minutes()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════

/// Upsert key of a domain record: its table plus its id, or the id pair for
/// link records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub table: &'static str,
    pub id: String,
    pub secondary: Option<String>,
}

/// The subtask run that wrote a domain record.
///
/// A run replaces everything its origin wrote before, so rows derived from
/// raw data that has since changed or disappeared do not linger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordOrigin {
    pub subtask: String,
    /// Scope the run converted, as `{plugin}:{connection}:{scope}`.
    pub scope: String,
}

impl RecordOrigin {
    pub fn new(subtask: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            subtask: subtask.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.subtask, self.scope)
    }
}

/// Any record a transform may emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainRecord {
    Board(Board),
    Issue(Issue),
    Account(Account),
    BoardIssue(BoardIssue),
    IssueAssignee(IssueAssignee),
}

impl DomainRecord {
    /// Name of the domain table the record is written to.
    pub fn table(&self) -> &'static str {
        match self {
            DomainRecord::Board(_) => "boards",
            DomainRecord::Issue(_) => "issues",
            DomainRecord::Account(_) => "accounts",
            DomainRecord::BoardIssue(_) => "board_issues",
            DomainRecord::IssueAssignee(_) => "issue_assignees",
        }
    }

    pub fn key(&self) -> RecordKey {
        let (id, secondary) = match self {
            DomainRecord::Board(b) => (b.id.clone(), None),
            DomainRecord::Issue(i) => (i.id.clone(), None),
            DomainRecord::Account(a) => (a.id.clone(), None),
            DomainRecord::BoardIssue(l) => (l.board_id.clone(), Some(l.issue_id.clone())),
            DomainRecord::IssueAssignee(l) => (l.issue_id.clone(), Some(l.assignee_id.clone())),
        };
        RecordKey {
            table: self.table(),
            id,
            secondary,
        }
    }
}

impl From<Board> for DomainRecord {
    fn from(v: Board) -> Self {
        DomainRecord::Board(v)
    }
}

impl From<Issue> for DomainRecord {
    fn from(v: Issue) -> Self {
        DomainRecord::Issue(v)
    }
}

impl From<Account> for DomainRecord {
    fn from(v: Account) -> Self {
        DomainRecord::Account(v)
    }
}

impl From<BoardIssue> for DomainRecord {
    fn from(v: BoardIssue) -> Self {
        DomainRecord::BoardIssue(v)
    }
}

impl From<IssueAssignee> for DomainRecord {
    fn from(v: IssueAssignee) -> Self {
        DomainRecord::IssueAssignee(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_domain_type_parse_case_insensitive() {
        assert_eq!("ticket".parse::<DomainType>().unwrap(), DomainType::Ticket);
        assert_eq!("CODE_REVIEW".parse::<DomainType>().unwrap(), DomainType::CodeReview);
        assert!("tickets".parse::<DomainType>().is_err());
    }

    #[test]
    fn test_domain_type_serde_names() {
        let json = serde_json::to_string(&DomainType::CodeQuality).unwrap();
        assert_eq!(json, "\"CODE_QUALITY\"");
    }

    #[test]
    fn test_lead_time_requires_completion() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(lead_time_minutes(Some(start), None), None);
        assert_eq!(lead_time_minutes(None, Some(start)), None);
        assert_eq!(
            lead_time_minutes(Some(start), Some(start + Duration::minutes(90))),
            Some(90)
        );
    }

    #[test]
    fn test_lead_time_truncates_partial_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let end = start + Duration::seconds(90 * 60 + 59);
        assert_eq!(lead_time_minutes(Some(start), Some(end)), Some(90));
    }

    #[test]
    fn test_priority_labels() {
        assert_eq!(IssuePriority::from_label("High"), IssuePriority::High);
        assert_eq!(IssuePriority::from_label(" lowest "), IssuePriority::Lowest);
        assert_eq!(IssuePriority::from_label("P0-ish"), IssuePriority::Unknown);
    }

    #[test]
    fn test_link_keys_use_both_ids() {
        let a = DomainRecord::from(BoardIssue {
            board_id: "b1".into(),
            issue_id: "i1".into(),
        });
        let b = DomainRecord::from(BoardIssue {
            board_id: "b1".into(),
            issue_id: "i2".into(),
        });
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key().table, "board_issues");
    }
}
