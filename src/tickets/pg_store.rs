use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::{Array, BigInt, Nullable, Text, Timestamptz, Uuid as DieselUuid};
use diesel::upsert::excluded;
use log::{debug, error, info};
use uuid::Uuid;

use crate::core::shared::schema::{
    service_categories, ticket_timelines, tickets, users, workflow_statuses, workflow_transitions,
};
use crate::core::shared::utils::DbPool;

use super::constants::TICKET_NUMBER_PREFIX;
use super::error::TicketError;
use super::forms::FormSchema;
use super::roles::RoleSet;
use super::store::{TicketStore, UserDirectory};
use super::types::{
    format_ticket_number, merge_action_data, AssignmentType, DirectoryUser, ServiceCategory,
    StatusChange, Ticket, TicketDraft, TicketStatus, TimelineEntry, WorkflowDefinition,
    WorkflowStatus, WorkflowTransition, Workload,
};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
struct UserRow {
    id: Uuid,
    name: String,
    roles: String,
    is_on_leave: bool,
}

impl From<UserRow> for DirectoryUser {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            roles: RoleSet::parse(&row.roles),
            is_on_leave: row.is_on_leave,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = service_categories)]
struct CategoryRow {
    id: Uuid,
    code: String,
    name: String,
    description: Option<String>,
    assignment_type: String,
    default_assignee_id: Option<Uuid>,
    target_role: Option<String>,
    form_schema: serde_json::Value,
    action_form_schema: serde_json::Value,
    is_active: bool,
}

impl From<CategoryRow> for ServiceCategory {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            assignment_type: AssignmentType::parse(&row.assignment_type),
            default_assignee_id: row.default_assignee_id,
            target_role: row.target_role.filter(|r| !r.trim().is_empty()),
            form_schema: FormSchema::from_value(&row.form_schema),
            action_form_schema: FormSchema::from_value(&row.action_form_schema),
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = tickets)]
struct TicketRow {
    id: Uuid,
    ticket_number: String,
    category_id: Uuid,
    requester_id: Uuid,
    title: String,
    status: String,
    assigned_to: Option<Uuid>,
    current_assignee_role: Option<String>,
    is_escalated: bool,
    payload: serde_json::Value,
    action_data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id,
            ticket_number: row.ticket_number,
            category_id: row.category_id,
            requester_id: row.requester_id,
            title: row.title,
            status: TicketStatus::from(row.status),
            assigned_to: row.assigned_to,
            current_assignee_role: row.current_assignee_role,
            is_escalated: row.is_escalated,
            payload: row.payload,
            action_data: row.action_data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Ticket> for TicketRow {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            category_id: ticket.category_id,
            requester_id: ticket.requester_id,
            title: ticket.title.clone(),
            status: ticket.status.to_string(),
            assigned_to: ticket.assigned_to,
            current_assignee_role: ticket.current_assignee_role.clone(),
            is_escalated: ticket.is_escalated,
            payload: ticket.payload.clone(),
            action_data: ticket.action_data.clone(),
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = workflow_statuses)]
struct StatusRow {
    code: String,
    label: String,
    is_end_state: bool,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = workflow_transitions)]
struct TransitionRow {
    id: Uuid,
    category_id: Option<Uuid>,
    from_status: String,
    to_status: String,
    label: String,
    trigger_role: String,
    target_assignee_role: Option<String>,
    required_form: Option<serde_json::Value>,
}

impl From<TransitionRow> for WorkflowTransition {
    fn from(row: TransitionRow) -> Self {
        Self {
            id: row.id,
            category_id: row.category_id,
            from_status: TicketStatus::from(row.from_status),
            to_status: TicketStatus::from(row.to_status),
            label: row.label,
            trigger_role: row.trigger_role,
            target_assignee_role: row.target_assignee_role.filter(|r| !r.trim().is_empty()),
            required_form: row.required_form.as_ref().map(FormSchema::from_value),
        }
    }
}

impl From<&WorkflowTransition> for TransitionRow {
    fn from(t: &WorkflowTransition) -> Self {
        Self {
            id: t.id,
            category_id: t.category_id,
            from_status: t.from_status.to_string(),
            to_status: t.to_status.to_string(),
            label: t.label.clone(),
            trigger_role: t.trigger_role.clone(),
            target_assignee_role: t.target_assignee_role.clone(),
            required_form: t.required_form.as_ref().map(FormSchema::to_value),
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = ticket_timelines)]
struct TimelineRow {
    id: Uuid,
    ticket_id: Uuid,
    actor_id: Uuid,
    action: String,
    old_status: Option<String>,
    new_status: String,
    input: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<TimelineRow> for TimelineEntry {
    fn from(row: TimelineRow) -> Self {
        Self {
            id: row.id,
            ticket_id: row.ticket_id,
            actor_id: row.actor_id,
            action: row.action,
            old_status: row.old_status.map(TicketStatus::from),
            new_status: TicketStatus::from(row.new_status),
            input: row.input,
            created_at: row.created_at,
        }
    }
}

impl From<&TimelineEntry> for TimelineRow {
    fn from(entry: &TimelineEntry) -> Self {
        Self {
            id: entry.id,
            ticket_id: entry.ticket_id,
            actor_id: entry.actor_id,
            action: entry.action.clone(),
            old_status: entry.old_status.as_ref().map(TicketStatus::to_string),
            new_status: entry.new_status.to_string(),
            input: entry.input.clone(),
            created_at: entry.created_at,
        }
    }
}

#[derive(QueryableByName)]
struct WorkloadRow {
    #[diesel(sql_type = DieselUuid)]
    user_id: Uuid,
    #[diesel(sql_type = BigInt)]
    active_tickets: i64,
    #[diesel(sql_type = BigInt)]
    recent_tickets: i64,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    last_assigned_at: Option<DateTime<Utc>>,
}

#[derive(QueryableByName)]
struct SequenceRow {
    #[diesel(sql_type = BigInt)]
    value: i64,
}

/// Postgres backed store. Every write runs inside one diesel transaction.
pub struct PgTicketStore {
    pool: DbPool,
}

impl PgTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, TicketError> {
        self.pool.get().map_err(|e| {
            error!("Failed to get database connection: {e}");
            TicketError::from(e)
        })
    }
}

impl UserDirectory for PgTicketStore {
    fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>, TicketError> {
        let mut conn = self.conn()?;
        let row = users::table
            .find(id)
            .select(UserRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(DirectoryUser::from))
    }

    fn users_with_role(&self, role: &str) -> Result<Vec<DirectoryUser>, TicketError> {
        let mut conn = self.conn()?;
        // The roles column is free-form text, so the LIKE only narrows the
        // scan. Membership is decided on the decoded set.
        let rows: Vec<UserRow> = users::table
            .filter(users::roles.ilike(format!("%{}%", role.trim())))
            .order(users::id.asc())
            .select(UserRow::as_select())
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(DirectoryUser::from)
            .filter(|u| u.roles.contains(role))
            .collect())
    }

    fn workloads(
        &self,
        user_ids: &[Uuid],
        recent_since: DateTime<Utc>,
    ) -> Result<Vec<Workload>, TicketError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let active: Vec<String> = TicketStatus::active()
            .iter()
            .map(TicketStatus::to_string)
            .collect();

        let sql = r#"
            SELECT assigned_to AS user_id,
                   COUNT(*) FILTER (WHERE status = ANY($2)) AS active_tickets,
                   COUNT(*) FILTER (WHERE created_at >= $3) AS recent_tickets,
                   MAX(created_at) AS last_assigned_at
            FROM tickets
            WHERE assigned_to = ANY($1)
            GROUP BY assigned_to
        "#;

        let rows: Vec<WorkloadRow> = diesel::sql_query(sql)
            .bind::<Array<DieselUuid>, _>(user_ids.to_vec())
            .bind::<Array<Text>, _>(active)
            .bind::<Timestamptz, _>(recent_since)
            .load(&mut conn)
            .map_err(|e| {
                error!("Failed to load assignee workloads: {e}");
                TicketError::from(e)
            })?;

        Ok(user_ids
            .iter()
            .map(|&id| {
                rows.iter()
                    .find(|r| r.user_id == id)
                    .map_or_else(
                        || Workload::idle(id),
                        |r| Workload {
                            user_id: id,
                            active_tickets: r.active_tickets,
                            recent_tickets: r.recent_tickets,
                            last_assigned_at: r.last_assigned_at,
                        },
                    )
            })
            .collect())
    }
}

impl TicketStore for PgTicketStore {
    fn find_category(&self, id: Uuid) -> Result<Option<ServiceCategory>, TicketError> {
        let mut conn = self.conn()?;
        let row = service_categories::table
            .find(id)
            .select(CategoryRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(ServiceCategory::from))
    }

    fn list_categories(&self) -> Result<Vec<ServiceCategory>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<CategoryRow> = service_categories::table
            .order(service_categories::code.asc())
            .select(CategoryRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(ServiceCategory::from).collect())
    }

    fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, TicketError> {
        let mut conn = self.conn()?;
        let row = tickets::table
            .find(id)
            .select(TicketRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(Ticket::from))
    }

    fn timeline(&self, ticket_id: Uuid) -> Result<Vec<TimelineEntry>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<TimelineRow> = ticket_timelines::table
            .filter(ticket_timelines::ticket_id.eq(ticket_id))
            .order(ticket_timelines::created_at.asc())
            .select(TimelineRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(TimelineEntry::from).collect())
    }

    fn list_statuses(&self) -> Result<Vec<WorkflowStatus>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<StatusRow> = workflow_statuses::table
            .order(workflow_statuses::code.asc())
            .select(StatusRow::as_select())
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|r| WorkflowStatus {
                code: r.code,
                label: r.label,
                is_end_state: r.is_end_state,
            })
            .collect())
    }

    fn find_transition(&self, id: Uuid) -> Result<Option<WorkflowTransition>, TicketError> {
        let mut conn = self.conn()?;
        let row = workflow_transitions::table
            .find(id)
            .select(TransitionRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(WorkflowTransition::from))
    }

    fn list_transitions(&self) -> Result<Vec<WorkflowTransition>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<TransitionRow> = workflow_transitions::table
            .order((
                workflow_transitions::from_status.asc(),
                workflow_transitions::label.asc(),
            ))
            .select(TransitionRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(WorkflowTransition::from).collect())
    }

    fn transitions_from(
        &self,
        from_status: &TicketStatus,
    ) -> Result<Vec<WorkflowTransition>, TicketError> {
        let mut conn = self.conn()?;
        let rows: Vec<TransitionRow> = workflow_transitions::table
            .filter(workflow_transitions::from_status.eq(from_status.as_str()))
            .select(TransitionRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(WorkflowTransition::from).collect())
    }

    fn create_ticket(
        &self,
        draft: TicketDraft,
        entry: TimelineEntry,
    ) -> Result<Ticket, TicketError> {
        let mut conn = self.conn()?;
        let ticket = conn.transaction::<_, TicketError, _>(|conn| {
            let sequence: SequenceRow =
                diesel::sql_query("SELECT nextval('ticket_number_seq') AS value")
                    .get_result(conn)?;
            let ticket =
                draft.into_ticket(format_ticket_number(TICKET_NUMBER_PREFIX, sequence.value));

            diesel::insert_into(tickets::table)
                .values(TicketRow::from(&ticket))
                .execute(conn)?;
            diesel::insert_into(ticket_timelines::table)
                .values(TimelineRow::from(&entry))
                .execute(conn)?;
            Ok(ticket)
        })?;

        debug!("Inserted ticket {} ({})", ticket.ticket_number, ticket.id);
        Ok(ticket)
    }

    fn apply_status_change(&self, change: StatusChange) -> Result<Ticket, TicketError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, TicketError, _>(|conn| {
            let row = tickets::table
                .find(change.ticket_id)
                .select(TicketRow::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .ok_or_else(|| TicketError::NotFound(format!("ticket {}", change.ticket_id)))?;

            let mut ticket = Ticket::from(row);
            if ticket.status != change.expected_status {
                return Err(TicketError::Conflict {
                    expected: change.expected_status.to_string(),
                    actual: ticket.status.to_string(),
                });
            }

            ticket.status = change.new_status;
            if let Some(role) = change.assignee_role {
                ticket.current_assignee_role = Some(role);
            }
            ticket.action_data = merge_action_data(&ticket.action_data, change.input.as_ref());
            ticket.updated_at = change.entry.created_at;

            diesel::update(tickets::table.find(ticket.id))
                .set((
                    tickets::status.eq(ticket.status.to_string()),
                    tickets::current_assignee_role.eq(ticket.current_assignee_role.clone()),
                    tickets::action_data.eq(ticket.action_data.clone()),
                    tickets::updated_at.eq(ticket.updated_at),
                ))
                .execute(conn)?;
            diesel::insert_into(ticket_timelines::table)
                .values(TimelineRow::from(&change.entry))
                .execute(conn)?;

            Ok(ticket)
        })
    }

    fn save_workflow(&self, definition: &WorkflowDefinition) -> Result<(), TicketError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, TicketError, _>(|conn| {
            for status in &definition.statuses {
                diesel::insert_into(workflow_statuses::table)
                    .values(StatusRow {
                        code: status.code.clone(),
                        label: status.label.clone(),
                        is_end_state: status.is_end_state,
                    })
                    .on_conflict(workflow_statuses::code)
                    .do_update()
                    .set((
                        workflow_statuses::label.eq(excluded(workflow_statuses::label)),
                        workflow_statuses::is_end_state
                            .eq(excluded(workflow_statuses::is_end_state)),
                    ))
                    .execute(conn)?;
            }

            for transition in &definition.transitions {
                diesel::insert_into(workflow_transitions::table)
                    .values(TransitionRow::from(transition))
                    .on_conflict(workflow_transitions::id)
                    .do_update()
                    .set((
                        workflow_transitions::category_id
                            .eq(excluded(workflow_transitions::category_id)),
                        workflow_transitions::from_status
                            .eq(excluded(workflow_transitions::from_status)),
                        workflow_transitions::to_status
                            .eq(excluded(workflow_transitions::to_status)),
                        workflow_transitions::label.eq(excluded(workflow_transitions::label)),
                        workflow_transitions::trigger_role
                            .eq(excluded(workflow_transitions::trigger_role)),
                        workflow_transitions::target_assignee_role
                            .eq(excluded(workflow_transitions::target_assignee_role)),
                        workflow_transitions::required_form
                            .eq(excluded(workflow_transitions::required_form)),
                    ))
                    .execute(conn)?;
            }
            Ok(())
        })?;

        info!(
            "Saved workflow: {} statuses, {} transitions",
            definition.statuses.len(),
            definition.transitions.len()
        );
        Ok(())
    }
}
