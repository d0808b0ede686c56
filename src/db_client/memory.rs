use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;

use super::{BookingStore, DeleteOutcome, InsertOutcome, StoreError, UpdateOutcome, VehicleStore};
use crate::{
	bookings::{Booking, NewBooking},
	vehicles::{NewVehicle, Vehicle, VehiclePatch},
};

/// Process-local store kept in insertion order.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStore {
	vehicles: RwLock<Vec<Vehicle>>,
	bookings: RwLock<Vec<Booking>>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

fn poisoned<T>(_: T) -> StoreError {
	StoreError::Database("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VehicleStore for InMemoryStore {
	async fn all_by_price(&self) -> Result<Vec<Vehicle>, StoreError> {
		let mut vehicles = self.vehicles.read().map_err(poisoned)?.clone();
		// stable sort keeps insertion order between equal prices
		vehicles.sort_by(|a, b| b.price_per_day.total_cmp(&a.price_per_day));
		Ok(vehicles)
	}

	async fn by_owner(&self, email: &str) -> Result<Vec<Vehicle>, StoreError> {
		let vehicles = self.vehicles.read().map_err(poisoned)?;
		Ok(vehicles.iter().filter(|v| v.user_email == email).cloned().collect())
	}

	async fn latest(&self, limit: usize) -> Result<Vec<Vehicle>, StoreError> {
		let mut vehicles: Vec<Vehicle> = self.vehicles.read().map_err(poisoned)?.iter().rev().cloned().collect();
		vehicles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		vehicles.truncate(limit);
		Ok(vehicles)
	}

	async fn find(&self, id: ObjectId) -> Result<Option<Vehicle>, StoreError> {
		let vehicles = self.vehicles.read().map_err(poisoned)?;
		Ok(vehicles.iter().find(|v| v.id == id).cloned())
	}

	async fn insert(&self, vehicle: NewVehicle) -> Result<InsertOutcome, StoreError> {
		let id = ObjectId::new();
		let mut vehicles = self.vehicles.write().map_err(poisoned)?;
		vehicles.push(Vehicle {
			id,
			price_per_day: vehicle.price_per_day,
			user_email: vehicle.user_email,
			created_at: Some(Utc::now()),
			details: vehicle.details,
		});
		Ok(InsertOutcome::new(id))
	}

	async fn update(&self, id: ObjectId, patch: VehiclePatch) -> Result<UpdateOutcome, StoreError> {
		let mut vehicles = self.vehicles.write().map_err(poisoned)?;
		match vehicles.iter_mut().find(|v| v.id == id) {
			Some(vehicle) => {
				let modified = patch.apply(vehicle);
				Ok(UpdateOutcome::new(1, modified as u64))
			}
			None => Ok(UpdateOutcome::new(0, 0)),
		}
	}

	async fn delete(&self, id: ObjectId) -> Result<DeleteOutcome, StoreError> {
		let mut vehicles = self.vehicles.write().map_err(poisoned)?;
		let before = vehicles.len();
		vehicles.retain(|v| v.id != id);
		Ok(DeleteOutcome::new((before - vehicles.len()) as u64))
	}
}

#[async_trait]
impl BookingStore for InMemoryStore {
	async fn insert(&self, booking: NewBooking) -> Result<InsertOutcome, StoreError> {
		let id = ObjectId::new();
		let mut bookings = self.bookings.write().map_err(poisoned)?;
		bookings.push(Booking {
			id,
			booked_by: booking.booked_by,
			created_at: Some(Utc::now()),
			details: booking.details,
		});
		Ok(InsertOutcome::new(id))
	}

	async fn by_booker(&self, email: &str) -> Result<Vec<Booking>, StoreError> {
		let bookings = self.bookings.read().map_err(poisoned)?;
		Ok(bookings.iter().filter(|b| b.booked_by == email).cloned().collect())
	}
}
