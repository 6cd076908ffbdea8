use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use super::types::{AssignmentType, ServiceCategory, WorkflowStatus, WorkflowTransition};

/// A gap in the category or workflow tables. Informational only: the engine
/// keeps running and falls back the way the resolver and evaluator describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigIssue {
    DirectWithoutAssignee {
        category: String,
    },
    AutoWithoutTargetRole {
        category: String,
    },
    UnknownStatus {
        transition_id: Uuid,
        status: String,
    },
    DuplicateEdge {
        category_id: Option<Uuid>,
        from_status: String,
        to_status: String,
        trigger_role: String,
        count: usize,
    },
    EndStateHasExits {
        status: String,
        transitions: usize,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectWithoutAssignee { category } => {
                write!(f, "category {category} uses direct assignment without a default assignee")
            }
            Self::AutoWithoutTargetRole { category } => {
                write!(f, "category {category} uses auto assignment without a target role")
            }
            Self::UnknownStatus {
                transition_id,
                status,
            } => write!(f, "transition {transition_id} references unknown status '{status}'"),
            Self::DuplicateEdge {
                category_id,
                from_status,
                to_status,
                trigger_role,
                count,
            } => {
                let scope = category_id.map_or_else(|| "global".to_string(), |id| id.to_string());
                write!(
                    f,
                    "{count} {scope} edges '{from_status}' -> '{to_status}' for role {trigger_role}"
                )
            }
            Self::EndStateHasExits {
                status,
                transitions,
            } => write!(f, "end state '{status}' has {transitions} outgoing transitions"),
        }
    }
}

pub fn validate_configuration(
    categories: &[ServiceCategory],
    statuses: &[WorkflowStatus],
    transitions: &[WorkflowTransition],
) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    for category in categories.iter().filter(|c| c.is_active) {
        match category.assignment_type {
            AssignmentType::Direct if category.default_assignee_id.is_none() => {
                issues.push(ConfigIssue::DirectWithoutAssignee {
                    category: category.code.clone(),
                });
            }
            AssignmentType::Auto
                if category
                    .target_role
                    .as_deref()
                    .map_or(true, |r| r.trim().is_empty()) =>
            {
                issues.push(ConfigIssue::AutoWithoutTargetRole {
                    category: category.code.clone(),
                });
            }
            _ => {}
        }
    }

    let known: HashSet<&str> = statuses.iter().map(|s| s.code.as_str()).collect();
    for t in transitions {
        for status in [&t.from_status, &t.to_status] {
            if !known.contains(status.as_str()) {
                issues.push(ConfigIssue::UnknownStatus {
                    transition_id: t.id,
                    status: status.to_string(),
                });
            }
        }
    }

    let mut edges: HashMap<(Option<Uuid>, &str, &str, &str), usize> = HashMap::new();
    for t in transitions {
        let key = (
            t.category_id,
            t.from_status.as_str(),
            t.to_status.as_str(),
            t.trigger_role.as_str(),
        );
        *edges.entry(key).or_default() += 1;
    }
    let mut duplicates: Vec<ConfigIssue> = edges
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((category_id, from, to, role), count)| ConfigIssue::DuplicateEdge {
            category_id,
            from_status: from.to_string(),
            to_status: to.to_string(),
            trigger_role: role.to_string(),
            count,
        })
        .collect();
    duplicates.sort_by_key(|issue| issue.to_string());
    issues.extend(duplicates);

    for status in statuses.iter().filter(|s| s.is_end_state) {
        let exits = transitions
            .iter()
            .filter(|t| t.from_status.as_str() == status.code)
            .count();
        if exits > 0 {
            issues.push(ConfigIssue::EndStateHasExits {
                status: status.code.clone(),
                transitions: exits,
            });
        }
    }

    issues
}
