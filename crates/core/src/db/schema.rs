diesel::table! {
    accounts (id) {
        id -> Int4,
        external_id -> Text,
        email -> Nullable<Text>,
        name -> Nullable<Text>,
        role -> Text,
        token_balance -> Int8,
        created_at -> Int8,
        updated_at -> Int8,
        last_signed_in -> Int8,
    }
}

diesel::table! {
    ledger_transactions (id) {
        id -> Int4,
        account_id -> Int4,
        kind -> Text,
        amount -> Int8,
        balance_before -> Int8,
        balance_after -> Int8,
        package_id -> Nullable<Int4>,
        render_job_id -> Nullable<Int4>,
        price_in_cents -> Nullable<Int8>,
        payment_status -> Nullable<Text>,
        payment_method -> Nullable<Text>,
        description -> Nullable<Text>,
        created_at -> Int8,
    }
}

diesel::table! {
    render_jobs (id) {
        id -> Int4,
        account_id -> Int4,
        original_image_url -> Text,
        rendered_image_url -> Nullable<Text>,
        scene_type -> Text,
        output_format -> Text,
        prompt -> Nullable<Text>,
        parent_job_id -> Nullable<Int4>,
        adjustment_saturation -> Nullable<Int4>,
        adjustment_brightness -> Nullable<Int4>,
        adjustment_contrast -> Nullable<Int4>,
        adjustment_lighting -> Nullable<Int4>,
        status -> Text,
        error_message -> Nullable<Text>,
        created_at -> Int8,
        completed_at -> Nullable<Int8>,
    }
}

diesel::table! {
    token_packages (id) {
        id -> Int4,
        name -> Text,
        token_amount -> Int8,
        price_in_cents -> Int8,
        price_per_token -> Int8,
        is_active -> Bool,
        display_order -> Int4,
        created_at -> Int8,
    }
}

diesel::table! {
    payment_transactions (id) {
        id -> Int4,
        account_id -> Int4,
        session_id -> Text,
        payment_intent_id -> Nullable<Text>,
        amount -> Int8,
        currency -> Text,
        package_id -> Nullable<Int4>,
        token_amount -> Int8,
        status -> Text,
        payment_method -> Nullable<Text>,
        coupon_code -> Nullable<Text>,
        discount_amount -> Int8,
        created_at -> Int8,
        completed_at -> Nullable<Int8>,
    }
}

diesel::table! {
    coupons (id) {
        id -> Int4,
        code -> Text,
        discount_type -> Text,
        discount_value -> Int8,
        max_uses -> Nullable<Int8>,
        used_count -> Int8,
        expires_at -> Nullable<Int8>,
        is_active -> Bool,
        created_at -> Int8,
    }
}

diesel::joinable!(ledger_transactions -> accounts (account_id));
diesel::joinable!(render_jobs -> accounts (account_id));
diesel::joinable!(payment_transactions -> accounts (account_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    ledger_transactions,
    render_jobs,
    token_packages,
    payment_transactions,
    coupons,
);
