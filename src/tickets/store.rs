use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::constants::TICKET_NUMBER_PREFIX;
use super::error::TicketError;
use super::types::{
    format_ticket_number, merge_action_data, DirectoryUser, ServiceCategory, StatusChange,
    Ticket, TicketDraft, TicketStatus, TimelineEntry, WorkflowDefinition, WorkflowStatus,
    WorkflowTransition, Workload,
};

/// Read-only view of users and their current load.
pub trait UserDirectory: Send + Sync {
    fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>, TicketError>;

    /// Every user holding `role`, whether or not they are on leave.
    fn users_with_role(&self, role: &str) -> Result<Vec<DirectoryUser>, TicketError>;

    /// Load figures for `user_ids`. Users without tickets get an idle entry.
    fn workloads(
        &self,
        user_ids: &[Uuid],
        recent_since: DateTime<Utc>,
    ) -> Result<Vec<Workload>, TicketError>;
}

/// Storage seam for tickets, categories and the workflow tables.
///
/// `create_ticket` and `apply_status_change` must commit the ticket row and
/// its timeline entry together or not at all.
pub trait TicketStore: UserDirectory {
    fn find_category(&self, id: Uuid) -> Result<Option<ServiceCategory>, TicketError>;
    fn list_categories(&self) -> Result<Vec<ServiceCategory>, TicketError>;

    fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError>;
    fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError>;

    fn list_statuses(&self) -> Result<Vec<WorkflowStatus>, TicketError>;
    fn find_transition(&self, id: Uuid) -> Result<Option<WorkflowTransition>, TicketError>;
    fn list_transitions(&self) -> Result<Vec<WorkflowTransition>, TicketError>;

    /// Transitions leaving `from_status`, from every category and the global layer.
    fn transitions_from(
        &self,
        from_status: &TicketStatus,
    ) -> Result<Vec<WorkflowTransition>, TicketError>;

    fn create_ticket(&self, draft: TicketDraft, entry: TimelineEntry)
        -> Result<Ticket, TicketError>;

    /// Applies a transition after re-checking the ticket status under a lock.
    /// Fails with `Conflict` when the status moved since it was read.
    fn apply_status_change(&self, change: StatusChange) -> Result<Ticket, TicketError>;

    /// Upserts statuses by code and transitions by id.
    fn save_workflow(&self, definition: &WorkflowDefinition) -> Result<(), TicketError>;
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, DirectoryUser>,
    categories: HashMap<Uuid, ServiceCategory>,
    tickets: BTreeMap<Uuid, Ticket>,
    statuses: BTreeMap<String, WorkflowStatus>,
    transitions: Vec<WorkflowTransition>,
    timeline: Vec<TimelineEntry>,
    sequence: i64,
    fail_timeline_writes: bool,
}

/// Store kept entirely in process memory. One mutex guards all state, so
/// each write is a single critical section.
#[derive(Default)]
pub struct MemoryTicketStore {
    state: Mutex<MemoryState>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, TicketError> {
        self.state
            .lock()
            .map_err(|_| TicketError::Internal("memory store lock poisoned".to_string()))
    }

    pub fn add_user(&self, user: DirectoryUser) -> Result<(), TicketError> {
        self.state()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn add_category(&self, category: ServiceCategory) -> Result<(), TicketError> {
        self.state()?.categories.insert(category.id, category);
        Ok(())
    }

    /// Inserts a ticket as-is, bypassing numbering and the timeline.
    pub fn insert_ticket(&self, ticket: Ticket) -> Result<(), TicketError> {
        let mut state = self.state()?;
        state.sequence += 1;
        state.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    /// Moves a ticket without a timeline entry, as another writer would.
    pub fn overwrite_status(&self, ticket_id: Uuid, status: TicketStatus) -> Result<(), TicketError> {
        let mut state = self.state()?;
        let ticket = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| TicketError::NotFound(format!("ticket {ticket_id}")))?;
        ticket.status = status;
        Ok(())
    }

    /// Makes every following timeline write fail.
    pub fn fail_timeline_writes(&self, fail: bool) -> Result<(), TicketError> {
        self.state()?.fail_timeline_writes = fail;
        Ok(())
    }
}

impl UserDirectory for MemoryTicketStore {
    fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>, TicketError> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    fn users_with_role(&self, role: &str) -> Result<Vec<DirectoryUser>, TicketError> {
        let state = self.state()?;
        let mut users: Vec<DirectoryUser> = state
            .users
            .values()
            .filter(|u| u.roles.contains(role))
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    fn workloads(
        &self,
        user_ids: &[Uuid],
        recent_since: DateTime<Utc>,
    ) -> Result<Vec<Workload>, TicketError> {
        let state = self.state()?;
        let loads = user_ids
            .iter()
            .map(|&user_id| {
                state
                    .tickets
                    .values()
                    .filter(|t| t.assigned_to == Some(user_id))
                    .fold(Workload::idle(user_id), |mut load, t| {
                        if t.status.is_active() {
                            load.active_tickets += 1;
                        }
                        if t.created_at >= recent_since {
                            load.recent_tickets += 1;
                        }
                        load.last_assigned_at = load.last_assigned_at.max(Some(t.created_at));
                        load
                    })
            })
            .collect();
        Ok(loads)
    }
}

impl TicketStore for MemoryTicketStore {
    fn find_category(&self, id: Uuid) -> Result<Option<ServiceCategory>, TicketError> {
        Ok(self.state()?.categories.get(&id).cloned())
    }

    fn list_categories(&self) -> Result<Vec<ServiceCategory>, TicketError> {
        let mut categories: Vec<ServiceCategory> =
            self.state()?.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(categories)
    }

    fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError> {
        Ok(self.state()?.tickets.get(&id).cloned())
    }

    fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError> {
        Ok(self
            .state()?
            .timeline
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    fn list_statuses(&self) -> Result<Vec<WorkflowStatus>, TicketError> {
        Ok(self.state()?.statuses.values().cloned().collect())
    }

    fn find_transition(&self, id: Uuid) -> Result<Option<WorkflowTransition>, TicketError> {
        Ok(self
            .state()?
            .transitions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    fn list_transitions(&self) -> Result<Vec<WorkflowTransition>, TicketError> {
        Ok(self.state()?.transitions.clone())
    }

    fn transitions_from(
        &self,
        from_status: &TicketStatus,
    ) -> Result<Vec<WorkflowTransition>, TicketError> {
        Ok(self
            .state()?
            .transitions
            .iter()
            .filter(|t| &t.from_status == from_status)
            .cloned()
            .collect())
    }

    fn create_ticket(
        &self,
        draft: TicketDraft,
        entry: TimelineEntry,
    ) -> Result<Ticket, TicketError> {
        let mut state = self.state()?;
        if state.fail_timeline_writes {
            return Err(TicketError::Database("timeline insert failed".to_string()));
        }
        let sequence = state.sequence + 1;
        let ticket = draft.into_ticket(format_ticket_number(TICKET_NUMBER_PREFIX, sequence));
        state.sequence = sequence;
        state.tickets.insert(ticket.id, ticket.clone());
        state.timeline.push(entry);
        debug!("memory store created ticket {}", ticket.ticket_number);
        Ok(ticket)
    }

    fn apply_status_change(&self, change: StatusChange) -> Result<Ticket, TicketError> {
        let mut state = self.state()?;
        let current = state
            .tickets
            .get(&change.ticket_id)
            .ok_or_else(|| TicketError::NotFound(format!("ticket {}", change.ticket_id)))?;

        if current.status != change.expected_status {
            return Err(TicketError::Conflict {
                expected: change.expected_status.to_string(),
                actual: current.status.to_string(),
            });
        }
        if state.fail_timeline_writes {
            return Err(TicketError::Database("timeline insert failed".to_string()));
        }

        let mut updated = current.clone();
        updated.status = change.new_status;
        if let Some(role) = change.assignee_role {
            updated.current_assignee_role = Some(role);
        }
        updated.action_data = merge_action_data(&updated.action_data, change.input.as_ref());
        updated.updated_at = change.entry.created_at;

        state.tickets.insert(updated.id, updated.clone());
        state.timeline.push(change.entry);
        Ok(updated)
    }

    fn save_workflow(&self, definition: &WorkflowDefinition) -> Result<(), TicketError> {
        let mut state = self.state()?;
        for status in &definition.statuses {
            state.statuses.insert(status.code.clone(), status.clone());
        }
        for transition in &definition.transitions {
            match state.transitions.iter_mut().find(|t| t.id == transition.id) {
                Some(existing) => *existing = transition.clone(),
                None => state.transitions.push(transition.clone()),
            }
        }
        Ok(())
    }
}
