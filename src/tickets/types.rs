use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::forms::FormSchema;
use super::roles::RoleSet;

/// Ticket status code.
///
/// The status vocabulary is open: administrators can add codes through the
/// `workflow_statuses` table. Codes the engine knows about get their own
/// variant, anything else travels as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    Submitted,
    Assigned,
    InProgress,
    OnHold,
    WaitingForPegawai,
    Approved,
    Completed,
    Rejected,
    Closed,
    Custom(String),
}

impl TicketStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "submitted",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::WaitingForPegawai => "waiting_for_pegawai",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
            Self::Custom(code) => code,
        }
    }

    /// Statuses that count as work in hand when scoring assignee load.
    pub fn active() -> [TicketStatus; 4] {
        [
            Self::Assigned,
            Self::InProgress,
            Self::OnHold,
            Self::WaitingForPegawai,
        ]
    }

    pub fn is_active(&self) -> bool {
        Self::active().contains(self)
    }
}

impl From<&str> for TicketStatus {
    fn from(code: &str) -> Self {
        match code.trim() {
            "submitted" => Self::Submitted,
            "assigned" => Self::Assigned,
            "in_progress" => Self::InProgress,
            "on_hold" => Self::OnHold,
            "waiting_for_pegawai" => Self::WaitingForPegawai,
            "approved" => Self::Approved,
            "completed" => Self::Completed,
            "rejected" => Self::Rejected,
            "closed" => Self::Closed,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for TicketStatus {
    fn from(code: String) -> Self {
        Self::from(code.as_str())
    }
}

impl From<TicketStatus> for String {
    fn from(status: TicketStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    #[default]
    None,
    Direct,
    Auto,
}

impl AssignmentType {
    /// Unknown policy strings behave like `none`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "direct" => Self::Direct,
            "auto" => Self::Auto,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Direct => "direct",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCategory {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub assignment_type: AssignmentType,
    pub default_assignee_id: Option<Uuid>,
    pub target_role: Option<String>,
    pub form_schema: FormSchema,
    pub action_form_schema: FormSchema,
    pub is_active: bool,
}

impl ServiceCategory {
    pub fn new(code: &str, name: &str, assignment_type: AssignmentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            description: None,
            assignment_type,
            default_assignee_id: None,
            target_role: None,
            form_schema: FormSchema::default(),
            action_form_schema: FormSchema::default(),
            is_active: true,
        }
    }
}

/// The part of a user record the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub name: String,
    pub roles: RoleSet,
    pub is_on_leave: bool,
}

impl DirectoryUser {
    pub fn is_available(&self) -> bool {
        !self.is_on_leave
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub category_id: Uuid,
    pub requester_id: Uuid,
    pub title: String,
    pub status: TicketStatus,
    pub assigned_to: Option<Uuid>,
    pub current_assignee_role: Option<String>,
    pub is_escalated: bool,
    pub payload: serde_json::Value,
    pub action_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new ticket before the store has numbered it.
#[derive(Debug, Clone)]
pub struct TicketDraft {
    pub id: Uuid,
    pub category_id: Uuid,
    pub requester_id: Uuid,
    pub title: String,
    pub status: TicketStatus,
    pub assigned_to: Option<Uuid>,
    pub current_assignee_role: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TicketDraft {
    pub fn into_ticket(self, ticket_number: String) -> Ticket {
        Ticket {
            id: self.id,
            ticket_number,
            category_id: self.category_id,
            requester_id: self.requester_id,
            title: self.title,
            status: self.status,
            assigned_to: self.assigned_to,
            current_assignee_role: self.current_assignee_role,
            is_escalated: false,
            payload: self.payload,
            action_data: serde_json::json!({}),
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

pub fn format_ticket_number(prefix: &str, sequence: i64) -> String {
    format!("{prefix}-{sequence:06}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub code: String,
    pub label: String,
    pub is_end_state: bool,
}

impl WorkflowStatus {
    pub fn new(code: &str, label: &str, is_end_state: bool) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            is_end_state,
        }
    }
}

/// A directed edge of the status graph, guarded by `trigger_role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub id: Uuid,
    /// `None` places the edge in the global layer shared by all categories.
    pub category_id: Option<Uuid>,
    pub from_status: TicketStatus,
    pub to_status: TicketStatus,
    pub label: String,
    pub trigger_role: String,
    pub target_assignee_role: Option<String>,
    pub required_form: Option<FormSchema>,
}

impl WorkflowTransition {
    pub fn applies_to(&self, category_id: Uuid) -> bool {
        self.category_id.map_or(true, |id| id == category_id)
    }

    pub fn requires_input(&self) -> bool {
        self.required_form
            .as_ref()
            .map_or(false, |form| !form.is_empty())
    }
}

/// Audit trail row written alongside every status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub old_status: Option<TicketStatus>,
    pub new_status: TicketStatus,
    pub input: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A transition ready to be committed by a store.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub ticket_id: Uuid,
    pub expected_status: TicketStatus,
    pub new_status: TicketStatus,
    pub assignee_role: Option<String>,
    pub input: Option<serde_json::Value>,
    pub entry: TimelineEntry,
}

/// Shallow merge of transition input into the handler output of a ticket.
pub fn merge_action_data(
    existing: &serde_json::Value,
    input: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut merged = match existing {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    match input {
        Some(serde_json::Value::Object(fields)) => {
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
        }
        Some(serde_json::Value::Null) | None => {}
        Some(other) => {
            merged.insert("input".to_string(), other.clone());
        }
    }
    serde_json::Value::Object(merged)
}

/// Load figures for one candidate assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub user_id: Uuid,
    pub active_tickets: i64,
    pub recent_tickets: i64,
    pub last_assigned_at: Option<DateTime<Utc>>,
}

impl Workload {
    pub fn idle(user_id: Uuid) -> Self {
        Self {
            user_id,
            active_tickets: 0,
            recent_tickets: 0,
            last_assigned_at: None,
        }
    }
}

/// Result of resolving the initial handler of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub assigned_to: Option<Uuid>,
    pub assignee_role: String,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
    Danger,
    Primary,
    Success,
    Secondary,
}

/// One action the caller may take on a ticket.
#[derive(Debug, Clone, Serialize)]
pub struct ActionView {
    pub transition_id: Uuid,
    pub label: String,
    pub to_status: TicketStatus,
    pub to_status_label: String,
    pub variant: ActionVariant,
    pub requires_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub statuses: Vec<WorkflowStatus>,
    pub transitions: Vec<WorkflowTransition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub category_id: Uuid,
    pub title: String,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteTransitionRequest {
    pub input: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketEventType {
    Created,
    Transitioned,
}

impl fmt::Display for TicketEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Transitioned => write!(f, "transitioned"),
        }
    }
}

/// Published after a ticket change commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub event_type: TicketEventType,
    pub ticket_id: Uuid,
    pub ticket_number: String,
    pub old_status: Option<TicketStatus>,
    pub new_status: TicketStatus,
    pub actor_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub assignee_role: Option<String>,
    pub timestamp: DateTime<Utc>,
}
