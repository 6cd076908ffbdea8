pub mod core;
pub use self::core::*;

pub mod helpdesk;
pub use self::helpdesk::*;

diesel::allow_tables_to_appear_in_same_query!(
    users,
    service_categories,
    tickets,
    workflow_statuses,
    workflow_transitions,
    ticket_timelines,
);
