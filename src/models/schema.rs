diesel::table! {
    chats (id) {
        id -> Uuid,
        user_id -> Uuid,
        title -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Uuid,
        chat_id -> Uuid,
        role -> Text,
        content -> Text,
        meta_json -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    streams (id) {
        id -> Uuid,
        chat_id -> Uuid,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    organizations (id) {
        id -> Uuid,
        user_id -> Uuid,
        name -> Text,
        data_json -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    apis (id) {
        id -> Uuid,
        organization_id -> Uuid,
        api_name -> Text,
        api_link -> Text,
        api_key -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    visitor (id) {
        id -> Int8,
        user_id -> Uuid,
        page_visited -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    revenue (id) {
        id -> Int8,
        user_id -> Uuid,
        amount -> Float8,
        source -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    rating (id) {
        id -> Int8,
        user_id -> Uuid,
        #[sql_name = "rating"]
        rating_value -> Int4,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(messages -> chats (chat_id));
diesel::joinable!(streams -> chats (chat_id));
diesel::joinable!(apis -> organizations (organization_id));

diesel::allow_tables_to_appear_in_same_query!(
    chats,
    messages,
    streams,
    organizations,
    apis,
    visitor,
    revenue,
    rating,
);
