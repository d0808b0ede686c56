use axum::{
	extract::{Query, State},
	Extension, Json,
};
use chrono::{DateTime, Utc};
use log::info;
use mongodb::bson::{oid::ObjectId, serde_helpers::serialize_object_id_as_hex_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
	db_client::{DbClient, InsertOutcome},
	error::ApiError,
	vehicles::{check_details, EmailQuery},
	verification::Principal,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
	#[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
	pub id: ObjectId,
	pub booked_by: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	#[serde(flatten)]
	pub details: Map<String, Value>,
}

/// Body of `POST /my-bookings`; `bookedBy` falls back to the caller's verified email.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
	pub booked_by: Option<String>,
	#[serde(flatten)]
	pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
	pub booked_by: String,
	pub details: Map<String, Value>,
}

impl BookingRequest {
	pub fn resolve(mut self, principal: &Principal) -> Result<NewBooking, ApiError> {
		let booked_by = self
			.booked_by
			.filter(|email| !email.trim().is_empty())
			.or_else(|| principal.email.clone())
			.ok_or_else(|| ApiError::Validation("bookedBy is required".to_string()))?;
		check_details(&mut self.details)?;
		Ok(NewBooking { booked_by, details: self.details })
	}
}

pub async fn create_booking(
	db: State<DbClient>,
	Extension(principal): Extension<Principal>,
	Json(request): Json<BookingRequest>,
) -> Result<Json<InsertOutcome>, ApiError> {
	let booking = request.resolve(&principal)?;
	let outcome = db.bookings.insert(booking).await?;
	info!("booking {} created by {}", outcome.inserted_id, principal.uid);
	Ok(Json(outcome))
}

pub async fn my_bookings(db: State<DbClient>, Query(query): Query<EmailQuery>) -> Result<Json<Vec<Booking>>, ApiError> {
	let Some(email) = query.email else {
		return Ok(Json(Vec::new()));
	};
	let bookings = db.bookings.by_booker(&email).await?;
	Ok(Json(bookings))
}
