#[macro_use]
extern crate diesel;
use std::{sync::Arc, time::Duration};

use crate::{
    backend::BookingBackend,
    booking_manager::{BookingManager, BookingPolicy},
    clock::{Clock, SystemClock},
    configuration::Configuration,
    configuration_handler::ConfigurationHandler,
    database_interface::DatabaseInterface,
    http::create_app,
    local_bookings::LocalBookings,
};
use tokio::{net::TcpListener, time::sleep};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod availability;
mod backend;
mod booking_manager;
mod clock;
mod configuration;
mod configuration_handler;
mod database_interface;
mod error;
mod http;
mod lifecycle;
mod local_bookings;
mod reminders;
mod schema;
#[cfg(test)]
mod testutils;
mod types;

#[derive(Clone)]
struct AppState<T: BookingBackend> {
    booking_manager: BookingManager<T>,
    password: String,
}

async fn serve<T: BookingBackend>(
    backend: T,
    policy: BookingPolicy,
    configuration: &ConfigurationHandler,
    listener: TcpListener,
) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let booking_manager = BookingManager::new(backend, clock.clone(), policy);

    let dispatcher = reminders::spawn_dispatcher(
        booking_manager.reminders().clone(),
        clock,
        Duration::from_secs(configuration.reminder_poll_seconds().max(1)),
    );

    let state = AppState {
        booking_manager,
        password: configuration.password(),
    };
    if let Err(err) = axum::serve(listener, create_app(state)).await {
        error!(?err, "Server stopped");
    }
    dispatcher.abort();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("######################");
    println!("# Barbershop Booking #");
    println!("######################");

    let configuration = ConfigurationHandler::parse_arguments();
    let policy = match configuration.booking_policy() {
        Ok(policy) => policy,
        Err(err) => {
            error!(%err, "Invalid configuration");
            return;
        }
    };

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessable at:\n{}", address.clone());
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(?err, %address, "Failed to bind");
            return;
        }
    };

    if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(
                        ?err,
                        "Failed to establish database connection: {database_url}. Retry in 1 sec. \
                         You may want to restart it with database disabled (impersistent bookings)."
                    );
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        serve(backend, policy, &configuration, listener).await;
    } else {
        warn!("No database configured, bookings are kept in memory");
        serve(LocalBookings::default(), policy, &configuration, listener).await;
    }
}
