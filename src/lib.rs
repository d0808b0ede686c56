pub mod bookings;
pub mod config;
pub mod db_client;
pub mod error;
pub mod routes;
pub mod vehicles;
pub mod verification;

pub use routes::router;
