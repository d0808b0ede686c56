use axum::{
	extract::{Path, Query, State},
	Json,
};
use chrono::{DateTime, Utc};
use log::info;
use mongodb::bson::{oid::ObjectId, serde_helpers::serialize_object_id_as_hex_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
	db_client::{parse_id, DbClient, DeleteOutcome, InsertOutcome, UpdateOutcome, LATEST_LIMIT},
	error::ApiError,
};

/// Fields owned by the server; stripped from every incoming body.
pub const RESERVED_FIELDS: [&str; 2] = ["_id", "createdAt"];

/// Strips reserved fields and rejects keys MongoDB would read as operators or paths.
pub(crate) fn check_details(details: &mut Map<String, Value>) -> Result<(), ApiError> {
	for field in RESERVED_FIELDS {
		details.remove(field);
	}
	match details.keys().find(|key| key.is_empty() || key.starts_with('$') || key.contains('.')) {
		Some(key) => Err(ApiError::Validation(format!("field name {:?} is not allowed", key))),
		None => Ok(()),
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
	#[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
	pub id: ObjectId,
	pub price_per_day: f64,
	pub user_email: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_at: Option<DateTime<Utc>>,
	/// Caller-supplied fields beyond the typed ones (model, location, images, ...).
	#[serde(flatten)]
	pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVehicle {
	pub price_per_day: f64,
	pub user_email: String,
	#[serde(flatten)]
	pub details: Map<String, Value>,
}

impl NewVehicle {
	pub fn validate(mut self) -> Result<Self, ApiError> {
		check_price(self.price_per_day)?;
		check_email(&self.user_email)?;
		check_details(&mut self.details)?;
		Ok(self)
	}
}

/// Partial listing applied as a field-level merge.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePatch {
	pub price_per_day: Option<f64>,
	pub user_email: Option<String>,
	#[serde(flatten)]
	pub details: Map<String, Value>,
}

impl VehiclePatch {
	pub fn is_empty(&self) -> bool {
		self.price_per_day.is_none() && self.user_email.is_none() && self.details.is_empty()
	}

	pub fn validate(mut self) -> Result<Self, ApiError> {
		if let Some(price) = self.price_per_day {
			check_price(price)?;
		}
		if let Some(email) = &self.user_email {
			check_email(email)?;
		}
		check_details(&mut self.details)?;
		if self.is_empty() {
			return Err(ApiError::Validation("update body has no fields to set".to_string()));
		}
		Ok(self)
	}

	/// Applies the patch in place and reports whether anything changed.
	pub fn apply(&self, vehicle: &mut Vehicle) -> bool {
		let before = vehicle.clone();
		if let Some(price) = self.price_per_day {
			vehicle.price_per_day = price;
		}
		if let Some(email) = &self.user_email {
			vehicle.user_email = email.clone();
		}
		for (key, value) in &self.details {
			vehicle.details.insert(key.clone(), value.clone());
		}
		*vehicle != before
	}
}

fn check_price(price: f64) -> Result<(), ApiError> {
	if !price.is_finite() || price < 0.0 {
		return Err(ApiError::Validation(format!("pricePerDay must be a non-negative number, got {}", price)));
	}
	Ok(())
}

fn check_email(email: &str) -> Result<(), ApiError> {
	if email.trim().is_empty() {
		return Err(ApiError::Validation("userEmail must not be empty".to_string()));
	}
	Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailQuery {
	pub email: Option<String>,
}

pub async fn get_vehicles(db: State<DbClient>) -> Result<Json<Vec<Vehicle>>, ApiError> {
	let vehicles = db.vehicles.all_by_price().await?;
	Ok(Json(vehicles))
}

pub async fn latest_vehicles(db: State<DbClient>) -> Result<Json<Vec<Vehicle>>, ApiError> {
	let vehicles = db.vehicles.latest(LATEST_LIMIT).await?;
	Ok(Json(vehicles))
}

pub async fn my_vehicles(db: State<DbClient>, Query(query): Query<EmailQuery>) -> Result<Json<Vec<Vehicle>>, ApiError> {
	let Some(email) = query.email else {
		return Ok(Json(Vec::new()));
	};
	let vehicles = db.vehicles.by_owner(&email).await?;
	Ok(Json(vehicles))
}

pub async fn get_vehicle(db: State<DbClient>, Path(id): Path<String>) -> Result<Json<Vehicle>, ApiError> {
	let object_id = parse_id(&id)?;
	match db.vehicles.find(object_id).await? {
		Some(vehicle) => Ok(Json(vehicle)),
		None => Err(ApiError::NotFound(format!("vehicle {}", id))),
	}
}

pub async fn create_vehicle(
	db: State<DbClient>,
	Json(vehicle): Json<NewVehicle>,
) -> Result<Json<InsertOutcome>, ApiError> {
	let vehicle = vehicle.validate()?;
	let outcome = db.vehicles.insert(vehicle).await?;
	info!("vehicle {} listed", outcome.inserted_id);
	Ok(Json(outcome))
}

pub async fn update_vehicle(
	db: State<DbClient>,
	Path(id): Path<String>,
	Json(patch): Json<VehiclePatch>,
) -> Result<Json<UpdateOutcome>, ApiError> {
	let object_id = parse_id(&id)?;
	let patch = patch.validate()?;
	let outcome = db.vehicles.update(object_id, patch).await?;
	if outcome.matched_count == 0 {
		info!("update matched no vehicle for {}", id);
	}
	Ok(Json(outcome))
}

pub async fn delete_vehicle(db: State<DbClient>, Path(id): Path<String>) -> Result<Json<DeleteOutcome>, ApiError> {
	let object_id = parse_id(&id)?;
	let outcome = db.vehicles.delete(object_id).await?;
	if outcome.deleted_count == 0 {
		info!("delete matched no vehicle for {}", id);
	}
	Ok(Json(outcome))
}
