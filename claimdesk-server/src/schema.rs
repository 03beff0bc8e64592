//! Diesel schema definitions for ClaimDesk server.

diesel::table! {
    api_keys (id) {
        id -> Text,
        label -> Text,
        key_hash -> Text,
        created_at -> Timestamp,
        last_used_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    audit_batches (id) {
        id -> Text,
        api_key_id -> Text,
        shipment_count -> Int4,
        created_at -> Timestamp,
    }
}

diesel::table! {
    cases (id) {
        id -> Int8,
        carrier -> Text,
        tracking_number -> Text,
        claim_type -> Text,
        status -> Text,
        priority -> Text,
        amount_claimed -> Float8,
        description -> Text,
        ship_date -> Nullable<Date>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    shipment_audits (id) {
        id -> Text,
        batch_id -> Text,
        position -> Int4,
        tracking_number -> Text,
        carrier -> Text,
        quoted_rate -> Float8,
        actual_rate -> Float8,
        ship_date -> Date,
        discrepancy_type -> Text,
        difference -> Float8,
        difference_percent -> Float8,
        reason -> Text,
        severity -> Text,
        auto_create_case -> Bool,
        case_id -> Nullable<Int8>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    notifications (id) {
        id -> Text,
        channel -> Text,
        subject -> Text,
        message -> Text,
        case_id -> Nullable<Int8>,
        tracking_number -> Nullable<Text>,
        delivered -> Bool,
        created_at -> Timestamp,
    }
}

diesel::joinable!(audit_batches -> api_keys (api_key_id));
diesel::joinable!(shipment_audits -> audit_batches (batch_id));
diesel::joinable!(shipment_audits -> cases (case_id));
diesel::joinable!(notifications -> cases (case_id));

diesel::allow_tables_to_appear_in_same_query!(
    api_keys,
    audit_batches,
    cases,
    shipment_audits,
    notifications,
);
