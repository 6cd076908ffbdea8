//! Table driven ticket state machine.
//!
//! Nodes are `workflow_statuses` codes and edges are `workflow_transitions`
//! rows. Every category has its own edge set per status; the global layer
//! (edges without a category) is used for a status only when the category
//! defines no edges leaving it.

use chrono::Utc;
use log::{info, warn};
use std::collections::HashMap;
use uuid::Uuid;

use super::error::TicketError;
use super::roles::ActorContext;
use super::store::TicketStore;
use super::types::{
    ActionVariant, ActionView, StatusChange, Ticket, TicketStatus, TimelineEntry,
    WorkflowTransition,
};

const DANGER_KEYWORDS: &[&str] = &["tolak", "reject", "batal", "cancel"];
const PRIMARY_KEYWORDS: &[&str] = &["setuju", "approve", "terima", "accept"];
const SUCCESS_KEYWORDS: &[&str] = &["selesai", "complete", "done"];

/// UI hint for an action, derived from its label.
pub fn action_variant(label: &str) -> ActionVariant {
    let label = label.to_lowercase();
    let has_any = |terms: &[&str]| terms.iter().any(|t| label.contains(t));
    if has_any(DANGER_KEYWORDS) {
        ActionVariant::Danger
    } else if has_any(PRIMARY_KEYWORDS) {
        ActionVariant::Primary
    } else if has_any(SUCCESS_KEYWORDS) {
        ActionVariant::Success
    } else {
        ActionVariant::Secondary
    }
}

/// Keeps the edges that govern `category_id`: its own when it has any,
/// otherwise the global ones.
pub fn select_layer(edges: Vec<WorkflowTransition>, category_id: Uuid) -> Vec<WorkflowTransition> {
    let has_scoped = edges.iter().any(|t| t.category_id == Some(category_id));
    edges
        .into_iter()
        .filter(|t| {
            if has_scoped {
                t.category_id == Some(category_id)
            } else {
                t.category_id.is_none()
            }
        })
        .collect()
}

/// A committed transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub ticket: Ticket,
    pub transition: WorkflowTransition,
    pub old_status: TicketStatus,
}

pub struct WorkflowEvaluator<'a, S: TicketStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TicketStore + ?Sized> WorkflowEvaluator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Transitions the actor may trigger from the ticket's current status,
    /// ordered by label.
    pub fn available_transitions(
        &self,
        ticket: &Ticket,
        actor: &ActorContext,
    ) -> Result<Vec<WorkflowTransition>, TicketError> {
        let edges = self.store.transitions_from(&ticket.status)?;
        let mut allowed: Vec<WorkflowTransition> = select_layer(edges, ticket.category_id)
            .into_iter()
            .filter(|t| actor.can_act_as(&t.trigger_role))
            .collect();
        allowed.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
        Ok(allowed)
    }

    pub fn available_actions(
        &self,
        ticket: &Ticket,
        actor: &ActorContext,
    ) -> Result<Vec<ActionView>, TicketError> {
        let transitions = self.available_transitions(ticket, actor)?;
        if transitions.is_empty() {
            return Ok(Vec::new());
        }

        let labels: HashMap<String, String> = self
            .store
            .list_statuses()?
            .into_iter()
            .map(|s| (s.code, s.label))
            .collect();

        Ok(transitions
            .into_iter()
            .map(|t| ActionView {
                transition_id: t.id,
                variant: action_variant(&t.label),
                requires_input: t.requires_input(),
                to_status_label: labels
                    .get(t.to_status.as_str())
                    .cloned()
                    .unwrap_or_else(|| t.to_status.to_string()),
                to_status: t.to_status,
                label: t.label,
                form: t.required_form.filter(|f| !f.is_empty()),
            })
            .collect())
    }

    /// Runs every check that does not need the row lock and builds the
    /// change to commit.
    pub fn prepare(
        &self,
        ticket: &Ticket,
        transition_id: Uuid,
        actor: &ActorContext,
        input: Option<serde_json::Value>,
    ) -> Result<(WorkflowTransition, StatusChange), TicketError> {
        let transition = self
            .store
            .find_transition(transition_id)?
            .filter(|t| t.applies_to(ticket.category_id))
            .ok_or_else(|| TicketError::NotFound(format!("transition {transition_id}")))?;

        if !actor.can_act_as(&transition.trigger_role) {
            warn!(
                "User {} tried '{}' on ticket {} without role {}",
                actor.user_id, transition.label, ticket.ticket_number, transition.trigger_role
            );
            return Err(TicketError::Unauthorized(format!(
                "role '{}' is required for '{}'",
                transition.trigger_role, transition.label
            )));
        }

        if transition.from_status != ticket.status {
            return Err(TicketError::Conflict {
                expected: transition.from_status.to_string(),
                actual: ticket.status.to_string(),
            });
        }

        let governing = select_layer(
            self.store.transitions_from(&ticket.status)?,
            ticket.category_id,
        );
        if !governing.iter().any(|t| t.id == transition.id) {
            return Err(TicketError::NotFound(format!(
                "transition {transition_id} is not active for this category"
            )));
        }

        let registered = self
            .store
            .list_statuses()?
            .iter()
            .any(|s| s.code == transition.to_status.as_str());
        if !registered {
            return Err(TicketError::NotFound(format!(
                "status '{}'",
                transition.to_status
            )));
        }

        if let Some(form) = &transition.required_form {
            form.validate(input.as_ref())?;
        }

        let entry = TimelineEntry {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            actor_id: actor.user_id,
            action: transition.label.clone(),
            old_status: Some(ticket.status.clone()),
            new_status: transition.to_status.clone(),
            input: input.clone(),
            created_at: Utc::now(),
        };

        let change = StatusChange {
            ticket_id: ticket.id,
            expected_status: transition.from_status.clone(),
            new_status: transition.to_status.clone(),
            assignee_role: transition.target_assignee_role.clone(),
            input,
            entry,
        };

        Ok((transition, change))
    }

    pub fn execute(
        &self,
        ticket_id: Uuid,
        transition_id: Uuid,
        actor: &ActorContext,
        input: Option<serde_json::Value>,
    ) -> Result<TransitionOutcome, TicketError> {
        let ticket = self
            .store
            .find_ticket(ticket_id)?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {ticket_id}")))?;

        let (transition, change) = self.prepare(&ticket, transition_id, actor, input)?;
        let old_status = ticket.status;
        let updated = self.store.apply_status_change(change)?;

        info!(
            "Ticket {} moved {} -> {} via '{}' by {}",
            updated.ticket_number, old_status, updated.status, transition.label, actor.user_id
        );

        Ok(TransitionOutcome {
            ticket: updated,
            transition,
            old_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(category_id: Option<Uuid>, label: &str) -> WorkflowTransition {
        WorkflowTransition {
            id: Uuid::new_v4(),
            category_id,
            from_status: TicketStatus::Submitted,
            to_status: TicketStatus::Assigned,
            label: label.to_string(),
            trigger_role: "admin_layanan".to_string(),
            target_assignee_role: None,
            required_form: None,
        }
    }

    #[test]
    fn test_action_variant_keywords() {
        assert_eq!(action_variant("Tolak Permintaan"), ActionVariant::Danger);
        assert_eq!(action_variant("Reject"), ActionVariant::Danger);
        assert_eq!(action_variant("Setujui & Tugaskan"), ActionVariant::Primary);
        assert_eq!(action_variant("Approve request"), ActionVariant::Primary);
        assert_eq!(action_variant("Tandai Selesai"), ActionVariant::Success);
        assert_eq!(action_variant("Mark complete"), ActionVariant::Success);
        assert_eq!(action_variant("Tunda"), ActionVariant::Secondary);
    }

    #[test]
    fn test_category_edges_shadow_global_layer() {
        let category = Uuid::new_v4();
        let other = Uuid::new_v4();
        let edges = vec![
            edge(None, "global"),
            edge(Some(category), "scoped"),
            edge(Some(other), "foreign"),
        ];

        let layer = select_layer(edges.clone(), category);
        assert_eq!(layer.len(), 1);
        assert_eq!(layer[0].label, "scoped");

        let fallback = select_layer(edges, Uuid::new_v4());
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].label, "global");
    }
}
