//! HTTP surface of the booking service.
//!
//! Admin routes are guarded by `x-admin-password`. Client and barber identity
//! is taken from `x-actor-role` and `x-actor-id` as asserted by the caller and
//! is not authenticated here. Deployments must put the service behind a
//! gateway that sets those headers from a verified session. Without one, any
//! caller that knows a barber id can confirm or complete that barber's
//! bookings.

use crate::backend::BookingBackend;
use crate::error::BookingError;
use crate::types::{
    Actor, Barber, Booking, BookingStatus, Service, Slot, WorkingHoursTemplate, WorkingWindow,
};
use crate::AppState;
use axum::extract::{Path, Query, Request};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{get, post, put},
    Router,
};
use axum_valid::Valid;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref TIME_OF_DAY: Regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap();
}

const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";
const ACTOR_ID_HEADER: &str = "x-actor-id";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct AvailabilityQuery {
    date: NaiveDate,
    #[validate(range(min = 1, max = 1440))]
    slot_size: Option<i64>,
    service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct CreateBookingRequest {
    barber_id: Uuid,
    client_id: Uuid,
    service_id: Uuid,
    start: DateTime<Utc>,
    #[validate(length(max = 500))]
    notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct ModifyBookingRequest {
    start: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRequest {
    status: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct AddBarberRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BarberActiveRequest {
    active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct AddServiceRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(range(min = 1, max = 1440))]
    duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct DayHours {
    weekday: Weekday,
    #[validate(regex(path = *TIME_OF_DAY))]
    open: String,
    #[validate(regex(path = *TIME_OF_DAY))]
    close: String,
}

/// Days not listed are closed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
struct WorkingHoursRequest {
    #[validate(nested)]
    days: Vec<DayHours>,
}

impl WorkingHoursRequest {
    fn into_template(self) -> WorkingHoursTemplate {
        let mut template = WorkingHoursTemplate::default();
        for day in self.days {
            let open = NaiveTime::parse_from_str(&day.open, "%H:%M").ok();
            let close = NaiveTime::parse_from_str(&day.close, "%H:%M").ok();
            if let (Some(open), Some(close)) = (open, close) {
                // open < close is enforced by the manager
                template
                    .0
                    .insert(day.weekday, Some(WorkingWindow { open, close }));
            }
        }
        template
    }
}

enum ApiError {
    Unauthorized(&'static str),
    Booking(BookingError),
    Internal,
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, message.to_string()).into_response()
            }
            ApiError::Booking(err) => err.into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": {
                        "kind": "Internal",
                        "message": "An internal server error occurred",
                    }
                })),
            )
                .into_response(),
        }
    }
}

/// Runs a manager call off the async workers; the database backend blocks.
async fn blocking<T, F>(operation: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, BookingError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(operation).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            error!(?err, "Blocking booking task failed");
            Err(ApiError::Internal)
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Client and barber roles are trusted as sent. Only the admin role is checked.
fn actor_from_headers(headers: &HeaderMap, password: &str) -> Result<Actor, ApiError> {
    let actor_id = || {
        header(headers, ACTOR_ID_HEADER)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or(ApiError::Unauthorized("Missing or invalid actor id"))
    };

    match header(headers, ACTOR_ROLE_HEADER) {
        Some("client") => Ok(Actor::Client(actor_id()?)),
        Some("barber") => Ok(Actor::Barber(actor_id()?)),
        Some("admin") if header(headers, ADMIN_PASSWORD_HEADER) == Some(password) => {
            Ok(Actor::Admin)
        }
        Some("admin") => Err(ApiError::Unauthorized("Unauthorized")),
        Some(_) => Err(ApiError::Unauthorized("Unknown actor role")),
        None => Err(ApiError::Unauthorized("Missing credentials")),
    }
}

pub fn create_app<T: BookingBackend>(state: AppState<T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/barbers/{id}/availability", get(get_availability::<T>))
        .route("/barbers/{id}/working_hours", get(get_working_hours::<T>))
        .route("/bookings", post(create_booking::<T>))
        .route(
            "/bookings/{id}",
            get(get_booking::<T>).put(modify_booking::<T>),
        )
        .route("/bookings/{id}/cancel", post(cancel_booking::<T>))
        .route("/bookings/{id}/status", post(update_booking_status::<T>));

    let admin = Router::new()
        .route("/admin/barbers", post(add_barber::<T>))
        .route("/admin/barbers/{id}/active", post(set_barber_active::<T>))
        .route("/admin/barbers/{id}/working_hours", put(set_working_hours::<T>))
        .route("/admin/services", post(add_service::<T>))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth::<T>));

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn admin_auth<T: BookingBackend>(
    State(state): State<AppState<T>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    match header(request.headers(), ADMIN_PASSWORD_HEADER) {
        Some(password) if password == state.password => Ok(next.run(request).await),
        Some(_) => Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string())),
        None => Err((StatusCode::UNAUTHORIZED, "Missing credentials".to_string())),
    }
}

async fn get_availability<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(barber_id): Path<Uuid>,
    Valid(Query(query)): Valid<Query<AvailabilityQuery>>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let manager = state.booking_manager;
    let slots = blocking(move || {
        manager.availability(barber_id, query.date, query.slot_size, query.service_id)
    })
    .await?;
    Ok(Json(slots))
}

async fn get_working_hours<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(barber_id): Path<Uuid>,
) -> Result<Json<WorkingHoursTemplate>, ApiError> {
    let manager = state.booking_manager;
    Ok(Json(blocking(move || manager.working_hours(barber_id)).await?))
}

async fn create_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Valid(Json(request)): Valid<Json<CreateBookingRequest>>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let manager = state.booking_manager;
    let booking = blocking(move || {
        manager.create_booking(
            request.barber_id,
            request.client_id,
            request.service_id,
            request.start,
            request.notes,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    let manager = state.booking_manager;
    Ok(Json(blocking(move || manager.booking(booking_id)).await?))
}

async fn modify_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(booking_id): Path<Uuid>,
    headers: HeaderMap,
    Valid(Json(request)): Valid<Json<ModifyBookingRequest>>,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers, &state.password)?;
    let manager = state.booking_manager;
    let booking = blocking(move || {
        manager.modify_booking(booking_id, request.start, request.notes, actor)
    })
    .await?;
    Ok(Json(booking))
}

async fn cancel_booking<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(booking_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers, &state.password)?;
    let manager = state.booking_manager;
    Ok(Json(
        blocking(move || manager.cancel_booking(booking_id, actor)).await?,
    ))
}

async fn update_booking_status<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(booking_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Booking>, ApiError> {
    let actor = actor_from_headers(&headers, &state.password)?;
    let manager = state.booking_manager;
    let booking = blocking(move || {
        manager.update_booking_status(booking_id, request.status, actor)
    })
    .await?;
    Ok(Json(booking))
}

async fn add_barber<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Valid(Json(request)): Valid<Json<AddBarberRequest>>,
) -> Result<(StatusCode, Json<Barber>), ApiError> {
    let manager = state.booking_manager;
    let barber = blocking(move || manager.add_barber(request.name)).await?;
    Ok((StatusCode::CREATED, Json(barber)))
}

async fn set_barber_active<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(barber_id): Path<Uuid>,
    Json(request): Json<BarberActiveRequest>,
) -> Result<Json<Barber>, ApiError> {
    let manager = state.booking_manager;
    Ok(Json(
        blocking(move || manager.set_barber_active(barber_id, request.active)).await?,
    ))
}

async fn set_working_hours<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Path(barber_id): Path<Uuid>,
    Valid(Json(request)): Valid<Json<WorkingHoursRequest>>,
) -> Result<StatusCode, ApiError> {
    let manager = state.booking_manager;
    let template = request.into_template();
    blocking(move || manager.set_working_hours(barber_id, template)).await?;
    Ok(StatusCode::OK)
}

async fn add_service<T: BookingBackend>(
    State(state): State<AppState<T>>,
    Valid(Json(request)): Valid<Json<AddServiceRequest>>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    let manager = state.booking_manager;
    let service =
        blocking(move || manager.add_service(request.name, request.duration_minutes)).await?;
    Ok((StatusCode::CREATED, Json(service)))
}
