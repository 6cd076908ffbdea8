//! Workflow rows for the repair (`perbaikan`) and zoom booking ticket types.
//!
//! These two types used to be driven by a status table compiled into the
//! ticket model. Seeding them as ordinary workflow rows lets the table driven
//! evaluator handle every ticket type.

use uuid::Uuid;

use super::forms::{FieldType, FormField, FormSchema};
use super::types::{TicketStatus, WorkflowDefinition, WorkflowStatus, WorkflowTransition};

const ADMIN: &str = "admin_layanan";
const TEKNISI: &str = "teknisi";
const PEGAWAI: &str = "pegawai";

pub fn default_statuses() -> Vec<WorkflowStatus> {
    vec![
        WorkflowStatus::new("submitted", "Diajukan", false),
        WorkflowStatus::new("assigned", "Ditugaskan", false),
        WorkflowStatus::new("in_progress", "Dikerjakan", false),
        WorkflowStatus::new("on_hold", "Ditunda", false),
        WorkflowStatus::new("waiting_for_pegawai", "Menunggu Pegawai", false),
        WorkflowStatus::new("approved", "Disetujui", false),
        WorkflowStatus::new("completed", "Selesai", false),
        WorkflowStatus::new("rejected", "Ditolak", true),
        WorkflowStatus::new("closed", "Ditutup", true),
    ]
}

/// Transition ids are derived from the category and edge so that seeding
/// twice updates rows instead of duplicating them.
fn seeded_id(category_id: Uuid, from: &TicketStatus, to: &TicketStatus, role: &str) -> Uuid {
    let name = format!("{category_id}:{from}:{to}:{role}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

struct SeedEdge {
    from: TicketStatus,
    to: TicketStatus,
    label: &'static str,
    role: &'static str,
    hand_off: Option<&'static str>,
    form: Option<FormSchema>,
}

fn edge(from: TicketStatus, to: TicketStatus, label: &'static str, role: &'static str) -> SeedEdge {
    SeedEdge {
        from,
        to,
        label,
        role,
        hand_off: None,
        form: None,
    }
}

impl SeedEdge {
    fn hand_off(mut self, role: &'static str) -> Self {
        self.hand_off = Some(role);
        self
    }

    fn form(mut self, form: FormSchema) -> Self {
        self.form = Some(form);
        self
    }
}

fn build(category_id: Uuid, edges: Vec<SeedEdge>) -> Vec<WorkflowTransition> {
    edges
        .into_iter()
        .map(|edge| WorkflowTransition {
            id: seeded_id(category_id, &edge.from, &edge.to, edge.role),
            category_id: Some(category_id),
            from_status: edge.from,
            to_status: edge.to,
            label: edge.label.to_string(),
            trigger_role: edge.role.to_string(),
            target_assignee_role: edge.hand_off.map(str::to_string),
            required_form: edge.form,
        })
        .collect()
}

fn repair_edges(category_id: Uuid) -> Vec<WorkflowTransition> {
    use TicketStatus::*;

    let diagnosis = FormSchema::new(vec![
        FormField::required("diagnosis", FieldType::Textarea).with_label("Hasil Diagnosa"),
        FormField::required("result", FieldType::Select)
            .with_label("Hasil Perbaikan")
            .with_options(&["diperbaiki", "diganti", "tidak_dapat_diperbaiki"]),
        FormField::optional("notes", FieldType::Textarea).with_label("Catatan"),
    ]);
    let question = FormSchema::new(vec![
        FormField::required("note", FieldType::Textarea).with_label("Pertanyaan untuk Pegawai"),
    ]);

    build(
        category_id,
        vec![
            edge(Submitted, Assigned, "Setujui & Tugaskan Teknisi", ADMIN).hand_off(TEKNISI),
            edge(Submitted, Rejected, "Tolak Permintaan", ADMIN),
            edge(Assigned, InProgress, "Mulai Diagnosa", TEKNISI),
            edge(InProgress, OnHold, "Tunda Pekerjaan", TEKNISI),
            edge(OnHold, InProgress, "Lanjutkan Pekerjaan", TEKNISI),
            edge(InProgress, WaitingForPegawai, "Minta Konfirmasi Pegawai", TEKNISI).hand_off(PEGAWAI).form(question),
            edge(WaitingForPegawai, InProgress, "Kirim Tanggapan", PEGAWAI).hand_off(TEKNISI),
            edge(InProgress, Completed, "Selesai Diperbaiki", TEKNISI).hand_off(PEGAWAI).form(diagnosis),
            edge(Completed, Closed, "Konfirmasi Selesai", PEGAWAI),
        ],
    )
}

fn zoom_edges(category_id: Uuid) -> Vec<WorkflowTransition> {
    use TicketStatus::*;

    let meeting = FormSchema::new(vec![
        FormField::required("meeting_link", FieldType::Text).with_label("Link Zoom"),
        FormField::optional("meeting_id", FieldType::Text).with_label("Meeting ID"),
        FormField::optional("passcode", FieldType::Text).with_label("Passcode"),
    ]);
    let reason = FormSchema::new(vec![
        FormField::required("reason", FieldType::Textarea).with_label("Alasan Penolakan"),
    ]);

    build(
        category_id,
        vec![
            edge(Submitted, Approved, "Setujui Jadwal", ADMIN).form(meeting),
            edge(Submitted, Rejected, "Tolak Jadwal", ADMIN).form(reason),
            edge(Approved, Completed, "Tandai Selesai", ADMIN),
        ],
    )
}

/// Statuses plus the repair and zoom edges, scoped to the given categories.
pub fn legacy_workflow(repair_category: Uuid, zoom_category: Uuid) -> WorkflowDefinition {
    let mut transitions = repair_edges(repair_category);
    transitions.extend(zoom_edges(zoom_category));
    WorkflowDefinition {
        statuses: default_statuses(),
        transitions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_ids_are_stable() {
        let repair = Uuid::new_v4();
        let zoom = Uuid::new_v4();
        let first = legacy_workflow(repair, zoom);
        let second = legacy_workflow(repair, zoom);
        let ids: Vec<Uuid> = first.transitions.iter().map(|t| t.id).collect();
        let again: Vec<Uuid> = second.transitions.iter().map(|t| t.id).collect();
        assert_eq!(ids, again);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn test_every_edge_uses_a_seeded_status() {
        let definition = legacy_workflow(Uuid::new_v4(), Uuid::new_v4());
        let codes: HashSet<&str> = definition.statuses.iter().map(|s| s.code.as_str()).collect();
        for t in &definition.transitions {
            assert!(codes.contains(t.from_status.as_str()), "{}", t.label);
            assert!(codes.contains(t.to_status.as_str()), "{}", t.label);
        }
    }

    #[test]
    fn test_end_states_have_no_outgoing_edges() {
        let definition = legacy_workflow(Uuid::new_v4(), Uuid::new_v4());
        for status in definition.statuses.iter().filter(|s| s.is_end_state) {
            assert!(definition
                .transitions
                .iter()
                .all(|t| t.from_status.as_str() != status.code));
        }
    }
}
