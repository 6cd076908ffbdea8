diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Nullable<Varchar>,
        roles -> Text,
        active_role -> Nullable<Varchar>,
        is_on_leave -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
