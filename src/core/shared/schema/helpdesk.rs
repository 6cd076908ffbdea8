diesel::table! {
    service_categories (id) {
        id -> Uuid,
        code -> Varchar,
        name -> Varchar,
        description -> Nullable<Text>,
        assignment_type -> Varchar,
        default_assignee_id -> Nullable<Uuid>,
        target_role -> Nullable<Varchar>,
        form_schema -> Jsonb,
        action_form_schema -> Jsonb,
        is_active -> Bool,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Varchar,
        category_id -> Uuid,
        requester_id -> Uuid,
        title -> Varchar,
        status -> Varchar,
        assigned_to -> Nullable<Uuid>,
        current_assignee_role -> Nullable<Varchar>,
        is_escalated -> Bool,
        payload -> Jsonb,
        action_data -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    workflow_statuses (code) {
        code -> Varchar,
        label -> Varchar,
        is_end_state -> Bool,
    }
}

diesel::table! {
    workflow_transitions (id) {
        id -> Uuid,
        category_id -> Nullable<Uuid>,
        from_status -> Varchar,
        to_status -> Varchar,
        label -> Varchar,
        trigger_role -> Varchar,
        target_assignee_role -> Nullable<Varchar>,
        required_form -> Nullable<Jsonb>,
    }
}

diesel::table! {
    ticket_timelines (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        actor_id -> Uuid,
        action -> Varchar,
        old_status -> Nullable<Varchar>,
        new_status -> Varchar,
        input -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(tickets -> service_categories (category_id));
diesel::joinable!(ticket_timelines -> tickets (ticket_id));
diesel::joinable!(workflow_transitions -> service_categories (category_id));
