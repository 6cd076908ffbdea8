use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::assignment::{AssigneeResolver, AssignmentConfig, WorkloadEntry};
use super::constants::{CREATED_ACTION_LABEL, EVENT_CHANNEL_CAPACITY};
use super::error::TicketError;
use super::report::{validate_configuration, ConfigIssue};
use super::roles::ActorContext;
use super::store::TicketStore;
use super::types::{
    ActionView, CreateTicketRequest, Ticket, TicketDraft, TicketEvent, TicketEventType,
    TimelineEntry, WorkflowDefinition, WorkflowStatus,
};
use super::workflow::{TransitionOutcome, WorkflowEvaluator};

/// Entry point for everything that reads or changes tickets.
///
/// All methods block on the store. Async callers run them through
/// `tokio::task::spawn_blocking`.
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    config: AssignmentConfig,
    event_sender: broadcast::Sender<TicketEvent>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>, config: AssignmentConfig) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            config,
            event_sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.event_sender.subscribe()
    }

    pub fn store(&self) -> &dyn TicketStore {
        self.store.as_ref()
    }

    pub fn assignment_config(&self) -> &AssignmentConfig {
        &self.config
    }

    fn publish(&self, event: TicketEvent) {
        // No receivers is the normal case when nothing listens for events.
        let _ = self.event_sender.send(event);
    }

    pub fn create_ticket(
        &self,
        actor: &ActorContext,
        request: CreateTicketRequest,
    ) -> Result<Ticket, TicketError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(TicketError::Validation("title is required".to_string()));
        }

        let category = self
            .store
            .find_category(request.category_id)?
            .filter(|c| c.is_active)
            .ok_or_else(|| TicketError::NotFound(format!("category {}", request.category_id)))?;

        let payload = request.payload.unwrap_or_else(|| serde_json::json!({}));
        category.form_schema.validate(Some(&payload))?;

        let assignment = AssigneeResolver::new(self.store.as_ref(), &self.config).resolve(&category)?;

        let now = Utc::now();
        let ticket_id = Uuid::new_v4();
        let draft = TicketDraft {
            id: ticket_id,
            category_id: category.id,
            requester_id: actor.user_id,
            title: title.to_string(),
            status: assignment.status.clone(),
            assigned_to: assignment.assigned_to,
            current_assignee_role: Some(assignment.assignee_role.clone()),
            payload,
            created_at: now,
        };
        let entry = TimelineEntry {
            id: Uuid::new_v4(),
            ticket_id,
            actor_id: actor.user_id,
            action: CREATED_ACTION_LABEL.to_string(),
            old_status: None,
            new_status: assignment.status,
            input: None,
            created_at: now,
        };

        let ticket = self.store.create_ticket(draft, entry)?;
        info!(
            "Created ticket {} in category {} (status {}, role {})",
            ticket.ticket_number,
            category.code,
            ticket.status,
            assignment.assignee_role
        );

        self.publish(TicketEvent {
            event_type: TicketEventType::Created,
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            old_status: None,
            new_status: ticket.status.clone(),
            actor_id: actor.user_id,
            assigned_to: ticket.assigned_to,
            assignee_role: ticket.current_assignee_role.clone(),
            timestamp: now,
        });

        Ok(ticket)
    }

    pub fn get_ticket(&self, ticket_id: Uuid) -> Result<Ticket, TicketError> {
        self.store
            .find_ticket(ticket_id)?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {ticket_id}")))
    }

    pub fn available_actions(
        &self,
        ticket_id: Uuid,
        actor: &ActorContext,
    ) -> Result<Vec<ActionView>, TicketError> {
        let ticket = self.get_ticket(ticket_id)?;
        WorkflowEvaluator::new(self.store.as_ref()).available_actions(&ticket, actor)
    }

    pub fn execute_transition(
        &self,
        ticket_id: Uuid,
        transition_id: Uuid,
        actor: &ActorContext,
        input: Option<serde_json::Value>,
    ) -> Result<TransitionOutcome, TicketError> {
        let outcome = WorkflowEvaluator::new(self.store.as_ref()).execute(
            ticket_id,
            transition_id,
            actor,
            input,
        )?;

        self.publish(TicketEvent {
            event_type: TicketEventType::Transitioned,
            ticket_id: outcome.ticket.id,
            ticket_number: outcome.ticket.ticket_number.clone(),
            old_status: Some(outcome.old_status.clone()),
            new_status: outcome.ticket.status.clone(),
            actor_id: actor.user_id,
            assigned_to: outcome.ticket.assigned_to,
            assignee_role: outcome.ticket.current_assignee_role.clone(),
            timestamp: outcome.ticket.updated_at,
        });

        Ok(outcome)
    }

    pub fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError> {
        let ticket = self.get_ticket(ticket_id)?;
        self.store.timeline(ticket.id)
    }

    pub fn statuses(&self) -> Result<Vec<WorkflowStatus>, TicketError> {
        self.store.list_statuses()
    }

    pub fn configuration_report(&self) -> Result<Vec<ConfigIssue>, TicketError> {
        let issues = validate_configuration(
            &self.store.list_categories()?,
            &self.store.list_statuses()?,
            &self.store.list_transitions()?,
        );
        for issue in &issues {
            warn!("Workflow configuration: {issue}");
        }
        Ok(issues)
    }

    /// Available holders of `role` in the order the resolver would pick them.
    pub fn workload_report(&self, role: &str) -> Result<Vec<WorkloadEntry>, TicketError> {
        AssigneeResolver::new(self.store.as_ref(), &self.config).ranked_candidates(role, Utc::now())
    }

    pub fn seed_workflow(&self, definition: &WorkflowDefinition) -> Result<(), TicketError> {
        self.store.save_workflow(definition)?;
        self.configuration_report()?;
        Ok(())
    }
}
