//! Data store gateway.
//!
//! Handlers only see [`DbClient`], a cheap-to-clone handle over the two logical
//! collections. Production wires it to MongoDB ([`mongo::MongoStore`]); tests
//! wire it to [`memory::InMemoryStore`].

pub mod memory;
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::{
	bson::{oid::ObjectId, serde_helpers::serialize_object_id_as_hex_string},
	error::ErrorKind,
};
use serde::Serialize;
use thiserror::Error;

use crate::{
	bookings::{Booking, NewBooking},
	error::ApiError,
	vehicles::{NewVehicle, Vehicle, VehiclePatch},
};

/// Upper bound for the latest-listings query.
pub const LATEST_LIMIT: usize = 6;

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("database unavailable: {0}")]
	Unavailable(String),

	#[error("database error: {0}")]
	Database(String),

	#[error("could not encode document: {0}")]
	Encode(String),

	#[error("could not decode document: {0}")]
	Decode(String),
}

impl From<mongodb::error::Error> for StoreError {
	fn from(err: mongodb::error::Error) -> Self {
		match *err.kind {
			ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => StoreError::Unavailable(err.to_string()),
			_ => StoreError::Database(err.to_string()),
		}
	}
}

impl From<mongodb::bson::ser::Error> for StoreError {
	fn from(err: mongodb::bson::ser::Error) -> Self {
		StoreError::Encode(err.to_string())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
	pub acknowledged: bool,
	#[serde(serialize_with = "serialize_object_id_as_hex_string")]
	pub inserted_id: ObjectId,
}

impl InsertOutcome {
	pub fn new(inserted_id: ObjectId) -> Self {
		InsertOutcome { acknowledged: true, inserted_id }
	}
}

/// A zero `matched_count` is a successful no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
	pub acknowledged: bool,
	pub matched_count: u64,
	pub modified_count: u64,
}

impl UpdateOutcome {
	pub fn new(matched_count: u64, modified_count: u64) -> Self {
		UpdateOutcome { acknowledged: true, matched_count, modified_count }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
	pub acknowledged: bool,
	pub deleted_count: u64,
}

impl DeleteOutcome {
	pub fn new(deleted_count: u64) -> Self {
		DeleteOutcome { acknowledged: true, deleted_count }
	}
}

#[async_trait]
pub trait VehicleStore: Send + Sync {
	/// Every listing, `pricePerDay` descending; equal prices keep insertion order.
	async fn all_by_price(&self) -> Result<Vec<Vehicle>, StoreError>;

	async fn by_owner(&self, email: &str) -> Result<Vec<Vehicle>, StoreError>;

	/// At most `limit` listings, newest `createdAt` first.
	async fn latest(&self, limit: usize) -> Result<Vec<Vehicle>, StoreError>;

	async fn find(&self, id: ObjectId) -> Result<Option<Vehicle>, StoreError>;

	async fn insert(&self, vehicle: NewVehicle) -> Result<InsertOutcome, StoreError>;

	async fn update(&self, id: ObjectId, patch: VehiclePatch) -> Result<UpdateOutcome, StoreError>;

	async fn delete(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
	async fn insert(&self, booking: NewBooking) -> Result<InsertOutcome, StoreError>;

	async fn by_booker(&self, email: &str) -> Result<Vec<Booking>, StoreError>;
}

#[derive(Clone)]
pub struct DbClient {
	pub vehicles: Arc<dyn VehicleStore>,
	pub bookings: Arc<dyn BookingStore>,
}

impl DbClient {
	/// Backs both collections with one store.
	pub fn from_store<T>(store: T) -> Self
	where
		T: VehicleStore + BookingStore + 'static,
	{
		let store = Arc::new(store);
		let vehicles: Arc<dyn VehicleStore> = store.clone();
		let bookings: Arc<dyn BookingStore> = store;
		DbClient { vehicles, bookings }
	}
}

/// Path ids must be 24 hex characters; anything else is a malformed id, never a miss.
pub fn parse_id(raw: &str) -> Result<ObjectId, ApiError> {
	ObjectId::parse_str(raw).map_err(|_| ApiError::MalformedId(raw.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_id_accepts_hex_object_ids() {
		let id = ObjectId::new();
		assert_eq!(parse_id(&id.to_hex()).unwrap(), id);
	}

	#[test]
	fn parse_id_rejects_garbage() {
		for raw in ["", "123", "not-an-object-id", "zzzzzzzzzzzzzzzzzzzzzzzz"] {
			match parse_id(raw) {
				Err(ApiError::MalformedId(got)) => assert_eq!(got, raw),
				other => panic!("expected malformed id for {raw:?}, got {other:?}"),
			}
		}
	}

	#[test]
	fn outcomes_serialize_like_driver_results() {
		let id = ObjectId::new();
		let inserted = serde_json::to_value(InsertOutcome::new(id)).unwrap();
		assert_eq!(inserted["acknowledged"], true);
		assert_eq!(inserted["insertedId"], id.to_hex());

		let updated = serde_json::to_value(UpdateOutcome::new(0, 0)).unwrap();
		assert_eq!(updated["matchedCount"], 0);
		assert_eq!(updated["modifiedCount"], 0);

		let deleted = serde_json::to_value(DeleteOutcome::new(1)).unwrap();
		assert_eq!(deleted["deletedCount"], 1);
	}
}
