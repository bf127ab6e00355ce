table! {
    users (id) {
        id -> Varchar,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        role -> Varchar,
        avatar -> Varchar,
        created_at -> Timestamp,
    }
}

table! {
    foods (id) {
        id -> Varchar,
        name -> Varchar,
        category -> Varchar,
        location -> Varchar,
        description -> Text,
        emoji -> Varchar,
        average_rating -> Double,
        reviews_count -> Integer,
        rating_1 -> Integer,
        rating_2 -> Integer,
        rating_3 -> Integer,
        rating_4 -> Integer,
        rating_5 -> Integer,
        created_by -> Varchar,
        created_by_name -> Varchar,
        created_at -> Timestamp,
    }
}

table! {
    reviews (id) {
        id -> Varchar,
        food_id -> Varchar,
        user_id -> Varchar,
        content -> Text,
        rating -> Integer,
        likes_count -> Integer,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    review_likes (review_id, user_id) {
        review_id -> Varchar,
        user_id -> Varchar,
        created_at -> Timestamp,
    }
}

table! {
    school_menus (id) {
        id -> Varchar,
        menu_date -> Date,
        meal_type -> Varchar,
        school_name -> Varchar,
        school_location -> Varchar,
        source -> Varchar,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    menu_dishes (menu_id, position) {
        menu_id -> Varchar,
        position -> Integer,
        food_id -> Varchar,
        price -> Double,
        availability -> Bool,
    }
}

table! {
    daily_recommendations (id) {
        id -> Varchar,
        user_id -> Varchar,
        food_id -> Varchar,
        rec_date -> Date,
        date_string -> Varchar,
        created_at -> Timestamp,
    }
}

table! {
    announcements (id) {
        id -> Varchar,
        title -> Varchar,
        content -> Text,
        pinned -> Bool,
        published -> Bool,
        created_by -> Nullable<Varchar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}
