use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use log::{info, warn};
use mongodb::{
	bson::{doc, oid::ObjectId, to_document, Bson, DateTime as BsonDateTime, Document},
	options::{ClientOptions, FindOptions, ServerApi, ServerApiVersion},
	Client, Collection,
};
use serde_json::{Map, Value};

use super::{BookingStore, DeleteOutcome, InsertOutcome, StoreError, UpdateOutcome, VehicleStore};
use crate::{
	bookings::{Booking, NewBooking},
	config::DatabaseConfig,
	vehicles::{NewVehicle, Vehicle, VehiclePatch},
};

#[derive(Clone)]
pub struct MongoStore {
	client: Client,
	vehicles: Collection<Document>,
	bookings: Collection<Document>,
}

impl MongoStore {
	/// Builds the client with Stable API v1 and pings the deployment once.
	pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
		let mut options = ClientOptions::parse(&config.uri).await?;
		options.server_api =
			Some(ServerApi::builder().version(ServerApiVersion::V1).strict(true).deprecation_errors(true).build());
		let client = Client::with_options(options)?;

		client.database("admin").run_command(doc! { "ping": 1 }, None).await?;
		info!("Pinged your deployment. Connected to MongoDB database {}", config.name);

		let database = client.database(&config.name);
		Ok(MongoStore {
			vehicles: database.collection(&config.vehicles_collection),
			bookings: database.collection(&config.bookings_collection),
			client,
		})
	}

	pub async fn shutdown(self) {
		self.client.shutdown().await;
		info!("MongoDB client closed");
	}

	async fn find_vehicles(
		&self,
		filter: Option<Document>,
		options: Option<FindOptions>,
	) -> Result<Vec<Vehicle>, StoreError> {
		let cursor = self.vehicles.find(filter, options).await?;
		let documents: Vec<Document> = cursor.try_collect().await?;
		Ok(decode_each(documents, vehicle_from_document))
	}
}

#[async_trait]
impl VehicleStore for MongoStore {
	async fn all_by_price(&self) -> Result<Vec<Vehicle>, StoreError> {
		let options = FindOptions::builder().sort(doc! { "pricePerDay": -1, "_id": 1 }).build();
		self.find_vehicles(None, Some(options)).await
	}

	async fn by_owner(&self, email: &str) -> Result<Vec<Vehicle>, StoreError> {
		self.find_vehicles(Some(doc! { "userEmail": email }), None).await
	}

	async fn latest(&self, limit: usize) -> Result<Vec<Vehicle>, StoreError> {
		let options = FindOptions::builder()
			.sort(doc! { "createdAt": -1, "_id": -1 })
			.limit(limit as i64)
			.build();
		self.find_vehicles(None, Some(options)).await
	}

	async fn find(&self, id: ObjectId) -> Result<Option<Vehicle>, StoreError> {
		match self.vehicles.find_one(doc! { "_id": id }, None).await? {
			Some(document) => vehicle_from_document(document).map(Some),
			None => Ok(None),
		}
	}

	async fn insert(&self, vehicle: NewVehicle) -> Result<InsertOutcome, StoreError> {
		let document = vehicle_document(vehicle, Utc::now())?;
		let result = self.vehicles.insert_one(document, None).await?;
		inserted_object_id(result.inserted_id).map(InsertOutcome::new)
	}

	async fn update(&self, id: ObjectId, patch: VehiclePatch) -> Result<UpdateOutcome, StoreError> {
		let result = self.vehicles.update_one(doc! { "_id": id }, set_document(patch)?, None).await?;
		Ok(UpdateOutcome::new(result.matched_count, result.modified_count))
	}

	async fn delete(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError> {
		let result = self.vehicles.delete_one(doc! { "_id": id }, None).await?;
		Ok(DeleteOutcome::new(result.deleted_count))
	}
}

#[async_trait]
impl BookingStore for MongoStore {
	async fn insert(&self, booking: NewBooking) -> Result<InsertOutcome, StoreError> {
		let document = booking_document(booking, Utc::now())?;
		let result = self.bookings.insert_one(document, None).await?;
		inserted_object_id(result.inserted_id).map(InsertOutcome::new)
	}

	async fn by_booker(&self, email: &str) -> Result<Vec<Booking>, StoreError> {
		let cursor = self.bookings.find(doc! { "bookedBy": email }, None).await?;
		let documents: Vec<Document> = cursor.try_collect().await?;
		Ok(decode_each(documents, booking_from_document))
	}
}

fn inserted_object_id(inserted: Bson) -> Result<ObjectId, StoreError> {
	inserted
		.as_object_id()
		.ok_or_else(|| StoreError::Decode(format!("inserted id is not an ObjectId: {}", inserted)))
}

fn bson_date(at: DateTime<Utc>) -> BsonDateTime {
	BsonDateTime::from_millis(at.timestamp_millis())
}

fn vehicle_document(vehicle: NewVehicle, created_at: DateTime<Utc>) -> Result<Document, StoreError> {
	let mut document = to_document(&vehicle.details)?;
	document.insert("pricePerDay", vehicle.price_per_day);
	document.insert("userEmail", vehicle.user_email);
	document.insert("createdAt", bson_date(created_at));
	Ok(document)
}

fn set_document(patch: VehiclePatch) -> Result<Document, StoreError> {
	let mut set = to_document(&patch.details)?;
	if let Some(price) = patch.price_per_day {
		set.insert("pricePerDay", price);
	}
	if let Some(email) = patch.user_email {
		set.insert("userEmail", email);
	}
	Ok(doc! { "$set": set })
}

fn booking_document(booking: NewBooking, created_at: DateTime<Utc>) -> Result<Document, StoreError> {
	let mut document = to_document(&booking.details)?;
	document.insert("bookedBy", booking.booked_by);
	document.insert("createdAt", bson_date(created_at));
	Ok(document)
}

fn take_id(document: &mut Document) -> Result<ObjectId, StoreError> {
	match document.remove("_id") {
		Some(Bson::ObjectId(id)) => Ok(id),
		other => Err(StoreError::Decode(format!("document _id is not an ObjectId: {:?}", other))),
	}
}

fn take_string(document: &mut Document, field: &str, id: ObjectId) -> Result<String, StoreError> {
	match document.remove(field) {
		Some(Bson::String(value)) => Ok(value),
		other => Err(StoreError::Decode(format!("{} in {} is not a string: {:?}", field, id, other))),
	}
}

fn take_price(document: &mut Document, id: ObjectId) -> Result<f64, StoreError> {
	match document.remove("pricePerDay") {
		Some(Bson::Double(value)) => Ok(value),
		Some(Bson::Int32(value)) => Ok(value as f64),
		Some(Bson::Int64(value)) => Ok(value as f64),
		other => Err(StoreError::Decode(format!("pricePerDay in {} is not a number: {:?}", id, other))),
	}
}

fn take_created_at(document: &mut Document) -> Option<DateTime<Utc>> {
	match document.remove("createdAt")? {
		Bson::DateTime(at) => Utc.timestamp_millis_opt(at.timestamp_millis()).single(),
		_ => None,
	}
}

/// Documents that do not fit the typed shape are logged and left out of list results.
fn decode_each<T>(documents: Vec<Document>, decode: fn(Document) -> Result<T, StoreError>) -> Vec<T> {
	documents
		.into_iter()
		.filter_map(|document| match decode(document) {
			Ok(decoded) => Some(decoded),
			Err(e) => {
				warn!("skipping stored document: {}", e);
				None
			}
		})
		.collect()
}

fn into_json_map(document: Document) -> Map<String, Value> {
	document
		.into_iter()
		.map(|(key, value)| (key, value.into_relaxed_extjson()))
		.collect()
}

fn vehicle_from_document(mut document: Document) -> Result<Vehicle, StoreError> {
	let id = take_id(&mut document)?;
	let price_per_day = take_price(&mut document, id)?;
	let user_email = take_string(&mut document, "userEmail", id)?;
	let created_at = take_created_at(&mut document);
	Ok(Vehicle { id, price_per_day, user_email, created_at, details: into_json_map(document) })
}

fn booking_from_document(mut document: Document) -> Result<Booking, StoreError> {
	let id = take_id(&mut document)?;
	let booked_by = take_string(&mut document, "bookedBy", id)?;
	let created_at = take_created_at(&mut document);
	Ok(Booking { id, booked_by, created_at, details: into_json_map(document) })
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn vehicle_document_round_trips_typed_and_extra_fields() {
		let created_at = Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap();
		let vehicle = NewVehicle {
			price_per_day: 50.0,
			user_email: "a@x.com".to_string(),
			details: json!({ "model": "Hilux", "seats": 5 }).as_object().cloned().unwrap(),
		};

		let mut document = vehicle_document(vehicle, created_at).unwrap();
		assert_eq!(document.get_f64("pricePerDay").unwrap(), 50.0);
		assert!(matches!(document.get("createdAt"), Some(Bson::DateTime(_))));

		let id = ObjectId::new();
		document.insert("_id", id);
		let decoded = vehicle_from_document(document).unwrap();
		assert_eq!(decoded.id, id);
		assert_eq!(decoded.user_email, "a@x.com");
		assert_eq!(decoded.created_at, Some(created_at));
		assert_eq!(decoded.details.get("model"), Some(&json!("Hilux")));
		assert_eq!(decoded.details.get("seats"), Some(&json!(5)));
		assert!(!decoded.details.contains_key("pricePerDay"));
	}

	#[test]
	fn string_prices_do_not_decode() {
		let document = doc! { "_id": ObjectId::new(), "pricePerDay": "42.5", "userEmail": "old@x.com" };
		assert!(matches!(vehicle_from_document(document), Err(StoreError::Decode(_))));
	}

	#[test]
	fn malformed_listings_are_skipped_not_fatal() {
		let good = ObjectId::new();
		let documents = vec![
			doc! { "_id": good, "pricePerDay": 50, "userEmail": "a@x.com" },
			doc! { "_id": ObjectId::new(), "pricePerDay": 40 },
			doc! { "_id": ObjectId::new(), "pricePerDay": "cheap", "userEmail": "b@x.com" },
		];
		let vehicles = decode_each(documents, vehicle_from_document);
		assert_eq!(vehicles.len(), 1);
		assert_eq!(vehicles[0].id, good);
		assert_eq!(vehicles[0].price_per_day, 50.0);
	}

	#[test]
	fn malformed_bookings_are_skipped_not_fatal() {
		let documents = vec![
			doc! { "_id": ObjectId::new(), "vehicleId": "abc" },
			doc! { "_id": ObjectId::new(), "bookedBy": "r@x.com" },
		];
		let bookings = decode_each(documents, booking_from_document);
		assert_eq!(bookings.len(), 1);
		assert_eq!(bookings[0].booked_by, "r@x.com");
	}

	#[test]
	fn missing_owner_is_a_decode_error() {
		let document = doc! { "_id": ObjectId::new(), "pricePerDay": 10 };
		assert!(matches!(vehicle_from_document(document), Err(StoreError::Decode(_))));
	}

	#[test]
	fn patch_becomes_a_set_of_present_fields_only() {
		let patch = VehiclePatch { price_per_day: Some(75.0), ..Default::default() };
		let update = set_document(patch).unwrap();
		let set = update.get_document("$set").unwrap();
		assert_eq!(set.len(), 1);
		assert_eq!(set.get_f64("pricePerDay").unwrap(), 75.0);
	}

	#[test]
	fn booking_document_carries_booker() {
		let booking = NewBooking {
			booked_by: "r@x.com".to_string(),
			details: json!({ "vehicleId": "abc" }).as_object().cloned().unwrap(),
		};
		let document = booking_document(booking, Utc::now()).unwrap();
		assert_eq!(document.get_str("bookedBy").unwrap(), "r@x.com");
		assert_eq!(document.get_str("vehicleId").unwrap(), "abc");
	}
}
