table! {
    barbers (id) {
        id -> Uuid,
        name -> Varchar,
        active -> Bool,
    }
}

table! {
    services (id) {
        id -> Uuid,
        name -> Varchar,
        duration_minutes -> Int4,
    }
}

table! {
    working_hours (barber_id, weekday) {
        barber_id -> Uuid,
        weekday -> Int2,
        open_minute -> Int4,
        close_minute -> Int4,
    }
}

table! {
    bookings (id) {
        id -> Uuid,
        barber_id -> Uuid,
        client_id -> Uuid,
        service_id -> Uuid,
        start_at -> Timestamptz,
        duration_minutes -> Int4,
        status -> Varchar,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

joinable!(working_hours -> barbers (barber_id));
joinable!(bookings -> barbers (barber_id));
joinable!(bookings -> services (service_id));

allow_tables_to_appear_in_same_query!(barbers, services, working_hours, bookings);
