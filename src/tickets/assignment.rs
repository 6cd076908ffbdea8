//! Initial handler selection for new tickets.
//!
//! Scoring reads aggregate counts without any lock. Two tickets created at
//! the same moment can both land on the same least loaded user before either
//! shows up in the other's counts, so the spread is eventually fair rather
//! than strictly fair.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::constants::{
    ACTIVE_TICKET_WEIGHT, FALLBACK_ASSIGNEE_ROLE, RECENT_TICKET_WEIGHT, RECENT_WINDOW_DAYS,
};
use super::error::TicketError;
use super::store::UserDirectory;
use super::types::{
    Assignment, AssignmentType, DirectoryUser, ServiceCategory, TicketStatus, Workload,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub active_weight: i64,
    pub recent_weight: i64,
    pub recent_window_days: i64,
    pub fallback_role: String,
    pub submission_status: String,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            active_weight: ACTIVE_TICKET_WEIGHT,
            recent_weight: RECENT_TICKET_WEIGHT,
            recent_window_days: RECENT_WINDOW_DAYS,
            fallback_role: FALLBACK_ASSIGNEE_ROLE.to_string(),
            submission_status: TicketStatus::Submitted.to_string(),
        }
    }
}

impl AssignmentConfig {
    pub fn score(&self, load: &Workload) -> i64 {
        self.active_weight * load.active_tickets + self.recent_weight * load.recent_tickets
    }
}

/// A candidate with its computed score.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadEntry {
    pub user_id: Uuid,
    pub name: String,
    pub active_tickets: i64,
    pub recent_tickets: i64,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub score: i64,
}

/// Lower score first, then whoever was handed a ticket longest ago (never
/// counts as longest ago), then the lower user id.
fn rank(a: &WorkloadEntry, b: &WorkloadEntry) -> Ordering {
    a.score
        .cmp(&b.score)
        .then_with(|| a.last_assigned_at.cmp(&b.last_assigned_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

pub struct AssigneeResolver<'a, D: UserDirectory + ?Sized> {
    directory: &'a D,
    config: &'a AssignmentConfig,
}

impl<'a, D: UserDirectory + ?Sized> AssigneeResolver<'a, D> {
    pub fn new(directory: &'a D, config: &'a AssignmentConfig) -> Self {
        Self { directory, config }
    }

    pub fn resolve(&self, category: &ServiceCategory) -> Result<Assignment, TicketError> {
        self.resolve_at(category, Utc::now())
    }

    pub fn resolve_at(
        &self,
        category: &ServiceCategory,
        now: DateTime<Utc>,
    ) -> Result<Assignment, TicketError> {
        let role = self.routing_role(category);

        let assigned_to = match category.assignment_type {
            AssignmentType::Direct => self.direct_assignee(category)?,
            AssignmentType::Auto => match category.target_role.as_deref() {
                Some(target) => self
                    .ranked_candidates(target, now)?
                    .into_iter()
                    .next()
                    .map(|best| best.user_id),
                None => {
                    warn!(
                        "Category {} uses auto assignment without a target role",
                        category.code
                    );
                    None
                }
            },
            AssignmentType::None => None,
        };

        let status = match assigned_to {
            Some(user_id) => {
                info!(
                    "Category {} ({}) assigned to user {}",
                    category.code, category.assignment_type, user_id
                );
                TicketStatus::Assigned
            }
            None => {
                if category.assignment_type != AssignmentType::None {
                    warn!(
                        "Category {} ({}): no assignee available, leaving ticket for role {}",
                        category.code, category.assignment_type, role
                    );
                }
                TicketStatus::from(self.config.submission_status.as_str())
            }
        };

        Ok(Assignment {
            assigned_to,
            assignee_role: role,
            status,
        })
    }

    /// Available holders of `role`, best candidate first.
    pub fn ranked_candidates(
        &self,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkloadEntry>, TicketError> {
        let candidates: Vec<DirectoryUser> = self
            .directory
            .users_with_role(role)?
            .into_iter()
            .filter(DirectoryUser::is_available)
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let since = now - Duration::days(self.config.recent_window_days);
        let ids: Vec<Uuid> = candidates.iter().map(|u| u.id).collect();
        let loads = self.directory.workloads(&ids, since)?;

        let mut entries: Vec<WorkloadEntry> = candidates
            .into_iter()
            .map(|user| {
                let load = loads
                    .iter()
                    .find(|l| l.user_id == user.id)
                    .copied()
                    .unwrap_or_else(|| Workload::idle(user.id));
                WorkloadEntry {
                    user_id: user.id,
                    name: user.name,
                    active_tickets: load.active_tickets,
                    recent_tickets: load.recent_tickets,
                    last_assigned_at: load.last_assigned_at,
                    score: self.config.score(&load),
                }
            })
            .collect();
        entries.sort_by(rank);

        debug!(
            "Ranked {} candidates for role {}: {:?}",
            entries.len(),
            role,
            entries.iter().map(|e| (e.user_id, e.score)).collect::<Vec<_>>()
        );
        Ok(entries)
    }

    fn direct_assignee(&self, category: &ServiceCategory) -> Result<Option<Uuid>, TicketError> {
        let Some(assignee_id) = category.default_assignee_id else {
            warn!(
                "Category {} uses direct assignment without a default assignee",
                category.code
            );
            return Ok(None);
        };

        match self.directory.find_user(assignee_id)? {
            Some(user) if user.is_available() => Ok(Some(user.id)),
            Some(_) => {
                warn!(
                    "Default assignee {} of category {} is on leave",
                    assignee_id, category.code
                );
                Ok(None)
            }
            None => {
                warn!(
                    "Default assignee {} of category {} does not exist",
                    assignee_id, category.code
                );
                Ok(None)
            }
        }
    }

    fn routing_role(&self, category: &ServiceCategory) -> String {
        category
            .target_role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(self.config.fallback_role.as_str())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::roles::RoleSet;
    use crate::tickets::store::MemoryTicketStore;
    use crate::tickets::types::Ticket;

    fn user(store: &MemoryTicketStore, name: &str, roles: &[&str], on_leave: bool) -> Uuid {
        let id = Uuid::new_v4();
        store
            .add_user(DirectoryUser {
                id,
                name: name.to_string(),
                roles: roles.iter().collect::<RoleSet>(),
                is_on_leave: on_leave,
            })
            .unwrap();
        id
    }

    fn ticket(store: &MemoryTicketStore, assignee: Uuid, status: TicketStatus, created_at: DateTime<Utc>) {
        store
            .insert_ticket(Ticket {
                id: Uuid::new_v4(),
                ticket_number: String::new(),
                category_id: Uuid::nil(),
                requester_id: Uuid::nil(),
                title: "load".to_string(),
                status,
                assigned_to: Some(assignee),
                current_assignee_role: None,
                is_escalated: false,
                payload: serde_json::json!({}),
                action_data: serde_json::json!({}),
                created_at,
                updated_at: created_at,
            })
            .unwrap();
    }

    fn auto_category(role: &str) -> ServiceCategory {
        let mut category = ServiceCategory::new("perbaikan", "Perbaikan", AssignmentType::Auto);
        category.target_role = Some(role.to_string());
        category
    }

    #[test]
    fn test_auto_picks_lowest_weighted_score() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        let now = Utc::now();
        let t1 = user(&store, "T1", &["teknisi"], false);
        let t2 = user(&store, "T2", &["teknisi"], false);

        // T1: nothing active, two closed tickets this month -> 2
        ticket(&store, t1, TicketStatus::Closed, now - Duration::days(3));
        ticket(&store, t1, TicketStatus::Completed, now - Duration::days(10));
        // T2: one active ticket from last year -> 3
        ticket(&store, t2, TicketStatus::InProgress, now - Duration::days(400));

        let resolver = AssigneeResolver::new(&store, &config);
        let ranked = resolver.ranked_candidates("teknisi", now).unwrap();
        assert_eq!(ranked[0].user_id, t1);
        assert_eq!(ranked[0].score, 2);
        assert_eq!(ranked[1].score, 3);

        let assignment = resolver.resolve_at(&auto_category("teknisi"), now).unwrap();
        assert_eq!(assignment.assigned_to, Some(t1));
        assert_eq!(assignment.status, TicketStatus::Assigned);
        assert_eq!(assignment.assignee_role, "teknisi");
    }

    #[test]
    fn test_auto_skips_users_on_leave_and_other_roles() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        user(&store, "Cuti", &["teknisi"], true);
        user(&store, "Admin", &["admin_layanan"], false);
        let busy = user(&store, "Sibuk", &["teknisi", "pegawai"], false);
        for _ in 0..5 {
            ticket(&store, busy, TicketStatus::Assigned, Utc::now());
        }

        let resolver = AssigneeResolver::new(&store, &config);
        let assignment = resolver.resolve(&auto_category("teknisi")).unwrap();
        assert_eq!(assignment.assigned_to, Some(busy));
    }

    #[test]
    fn test_auto_without_candidates_stays_submitted() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        user(&store, "Cuti", &["teknisi"], true);

        let resolver = AssigneeResolver::new(&store, &config);
        let assignment = resolver.resolve(&auto_category("teknisi")).unwrap();
        assert_eq!(assignment.assigned_to, None);
        assert_eq!(assignment.status, TicketStatus::Submitted);
        assert_eq!(assignment.assignee_role, "teknisi");
    }

    #[test]
    fn test_ties_break_on_least_recent_assignment_then_id() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        let now = Utc::now();
        let old = user(&store, "Lama", &["teknisi"], false);
        let fresh = user(&store, "Baru", &["teknisi"], false);
        ticket(&store, old, TicketStatus::Closed, now - Duration::days(20));
        ticket(&store, fresh, TicketStatus::Closed, now - Duration::days(1));

        let resolver = AssigneeResolver::new(&store, &config);
        for _ in 0..10 {
            let assignment = resolver.resolve_at(&auto_category("teknisi"), now).unwrap();
            assert_eq!(assignment.assigned_to, Some(old));
        }

        let store = MemoryTicketStore::new();
        let a = user(&store, "A", &["teknisi"], false);
        let b = user(&store, "B", &["teknisi"], false);
        let resolver = AssigneeResolver::new(&store, &config);
        let assignment = resolver.resolve_at(&auto_category("teknisi"), now).unwrap();
        assert_eq!(assignment.assigned_to, Some(a.min(b)));
    }

    #[test]
    fn test_score_is_monotonic_in_active_tickets() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        let now = Utc::now();
        let t = user(&store, "T", &["teknisi"], false);
        let resolver = AssigneeResolver::new(&store, &config);

        let mut previous = resolver.ranked_candidates("teknisi", now).unwrap()[0].score;
        for status in TicketStatus::active() {
            ticket(&store, t, status, now - Duration::days(90));
            let score = resolver.ranked_candidates("teknisi", now).unwrap()[0].score;
            assert!(score > previous);
            previous = score;
        }
    }

    #[test]
    fn test_direct_assignee_on_leave_falls_back_to_role() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        let kepala = user(&store, "Kepala", &["kasubbag"], true);
        let mut category = ServiceCategory::new("zoom", "Zoom", AssignmentType::Direct);
        category.default_assignee_id = Some(kepala);
        category.target_role = Some("kasubbag".to_string());

        let resolver = AssigneeResolver::new(&store, &config);
        let assignment = resolver.resolve(&category).unwrap();
        assert_eq!(assignment.assigned_to, None);
        assert_eq!(assignment.status, TicketStatus::Submitted);
        assert_eq!(assignment.assignee_role, "kasubbag");

        store
            .add_user(DirectoryUser {
                id: kepala,
                name: "Kepala".to_string(),
                roles: RoleSet::parse("kasubbag"),
                is_on_leave: false,
            })
            .unwrap();
        let assignment = resolver.resolve(&category).unwrap();
        assert_eq!(assignment.assigned_to, Some(kepala));
        assert_eq!(assignment.status, TicketStatus::Assigned);
    }

    #[test]
    fn test_none_policy_records_fallback_role() {
        let store = MemoryTicketStore::new();
        let config = AssignmentConfig::default();
        let category = ServiceCategory::new("lainnya", "Lainnya", AssignmentType::parse("manual"));

        let assignment = AssigneeResolver::new(&store, &config)
            .resolve(&category)
            .unwrap();
        assert_eq!(assignment.assigned_to, None);
        assert_eq!(assignment.assignee_role, FALLBACK_ASSIGNEE_ROLE);
        assert_eq!(assignment.status, TicketStatus::Submitted);
    }
}
