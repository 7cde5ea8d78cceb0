// Diesel table definitions for the review pipeline schema.
// Kept in sync with DbContext::init_schema.

diesel::table! {
    reviews (id) {
        id -> Text,
        restaurant_id -> Text,
        platform -> Text,
        external_id -> Text,
        rating -> Integer,
        body -> Text,
        author -> Nullable<Text>,
        posted_at -> Text,
        ingested_at -> Text,
        updated_at -> Text,
        analysis_status -> Text,
        claim_token -> Nullable<Text>,
        claimed_at -> Nullable<Text>,
        failure_reason -> Nullable<Text>,
    }
}

diesel::table! {
    review_analyses (review_id) {
        review_id -> Text,
        overall_sentiment -> Text,
        emotion -> Nullable<Text>,
        food_sentiment -> Nullable<Float>,
        service_sentiment -> Nullable<Float>,
        ambience_sentiment -> Nullable<Float>,
        value_sentiment -> Nullable<Float>,
        strengths -> Text,
        opportunities -> Text,
        staff_mentions -> Text,
        item_mentions -> Text,
        severity_flags -> Text,
        return_intent -> Text,
        model -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    scrape_runs (id) {
        id -> Text,
        restaurant_id -> Text,
        platform -> Text,
        provider_run_id -> Text,
        dataset_handle -> Text,
        status -> Text,
        reviews_found -> Integer,
        reviews_new -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    ai_usage (month) {
        month -> Text,
        calls -> Integer,
        updated_at -> Text,
    }
}

diesel::joinable!(review_analyses -> reviews (review_id));
diesel::allow_tables_to_appear_in_same_query!(reviews, review_analyses);
