/// Weight applied to each ticket a candidate is actively handling.
pub const ACTIVE_TICKET_WEIGHT: i64 = 3;

/// Weight applied to each ticket assigned to a candidate inside the recent window.
pub const RECENT_TICKET_WEIGHT: i64 = 1;

pub const RECENT_WINDOW_DAYS: i64 = 30;

/// Role recorded on tickets whose category names no target role.
pub const FALLBACK_ASSIGNEE_ROLE: &str = "admin_layanan";

pub const TICKET_NUMBER_PREFIX: &str = "TKT";

pub const CREATED_ACTION_LABEL: &str = "Tiket dibuat";

pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const ACTIVE_ROLE_HEADER: &str = "x-active-role";
