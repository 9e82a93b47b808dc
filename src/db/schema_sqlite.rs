// SQLite schema definitions. Timestamps are RFC 3339 text, list and map
// columns are JSON text.

diesel::table! {
    role_requests (id) {
        id -> Integer,
        request_id -> Text,
        flavor -> Text,
        guild_id -> Text,
        user_id -> Text,
        target_role_id -> Text,
        display_name -> Nullable<Text>,
        game_id -> Nullable<Text>,
        rank -> Nullable<Text>,
        status -> Text,
        created_at -> Text,
        decided_by -> Nullable<Text>,
        decided_at -> Nullable<Text>,
        review_channel_id -> Nullable<Text>,
        review_message_id -> Nullable<Text>,
    }
}

diesel::table! {
    guild_configs (id) {
        id -> Integer,
        guild_id -> Text,
        panel_channel_id -> Nullable<Text>,
        review_channel_id -> Nullable<Text>,
        log_channel_id -> Nullable<Text>,
        verified_role_id -> Nullable<Text>,
        eligible_role_ids -> Text,
        default_branch_role_ids -> Text,
        legacy_branch_role_id -> Nullable<Text>,
        branch_roles_by_target -> Text,
        staff_role_ids -> Text,
        lite_review_channel_id -> Nullable<Text>,
        lite_log_channel_id -> Nullable<Text>,
        lite_staff_role_ids -> Text,
        lite_eligible_role_ids -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(role_requests, guild_configs);
