//! Helpdesk tickets: initial assignment and the table driven workflow.

pub mod assignment;
pub mod constants;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod pg_store;
pub mod report;
pub mod roles;
pub mod seed;
pub mod service;
pub mod store;
pub mod types;
pub mod workflow;


pub use assignment::{AssigneeResolver, AssignmentConfig, WorkloadEntry};
pub use error::TicketError;
pub use forms::{FieldType, FormField, FormSchema};
pub use pg_store::PgTicketStore;
pub use report::{validate_configuration, ConfigIssue};
pub use roles::{ActorContext, RoleSet};
pub use service::TicketService;
pub use store::{MemoryTicketStore, TicketStore, UserDirectory};
pub use types::{
    ActionVariant, ActionView, Assignment, AssignmentType, CreateTicketRequest, DirectoryUser,
    ExecuteTransitionRequest, ServiceCategory, Ticket, TicketEvent, TicketEventType, TicketStatus,
    TimelineEntry, WorkflowDefinition, WorkflowStatus, WorkflowTransition,
};
pub use workflow::{TransitionOutcome, WorkflowEvaluator};
