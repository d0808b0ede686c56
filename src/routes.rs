use axum::{
	middleware,
	routing::{get, post, put, MethodRouter},
	Router,
};
use tower_http::cors::CorsLayer;

use crate::{
	bookings::{create_booking, my_bookings},
	config::AuthPolicy,
	db_client::DbClient,
	vehicles::{create_vehicle, delete_vehicle, get_vehicle, get_vehicles, latest_vehicles, my_vehicles, update_vehicle},
	verification::{require_token, SharedVerifier},
};

pub const ROOT_MESSAGE: &str = "travelEase server is running now!";

async fn root() -> &'static str {
	ROOT_MESSAGE
}

pub fn router(db: DbClient, verifier: SharedVerifier, policy: AuthPolicy) -> Router {
	let guard = |route: MethodRouter<DbClient>| {
		route.route_layer(middleware::from_fn_with_state(verifier.clone(), require_token))
	};

	let vehicle_details = if policy.guard_vehicle_details {
		guard(get(get_vehicle))
	} else {
		get(get_vehicle)
	};

	Router::new()
		.route("/", get(root))
		.route("/vehicles", get(get_vehicles).merge(guard(post(create_vehicle))))
		.route("/vehicles/:id", vehicle_details.merge(guard(put(update_vehicle).delete(delete_vehicle))))
		.route("/my-vehicles", get(my_vehicles))
		.route("/latest-vehicles", get(latest_vehicles))
		.route("/my-bookings", guard(post(create_booking).get(my_bookings)))
		.layer(CorsLayer::permissive())
		.with_state(db)
}
