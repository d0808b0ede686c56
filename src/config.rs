use std::{env, path::PathBuf};

use anyhow::{bail, Context};

pub const DEFAULT_PORT: u16 = 3000;
pub const CLUSTER_HOST: &str = "cluster0.u1z8wkz.mongodb.net/?appName=Cluster0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
	pub uri: String,
	pub name: String,
	pub vehicles_collection: String,
	pub bookings_collection: String,
}

/// Which routes sit behind the token guard beyond the always-protected writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
	pub guard_vehicle_details: bool,
}

impl Default for AuthPolicy {
	fn default() -> Self {
		AuthPolicy { guard_vehicle_details: true }
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	pub database: DatabaseConfig,
	pub service_account_path: PathBuf,
	pub port: u16,
	pub auth: AuthPolicy,
}

impl Config {
	pub fn from_env() -> anyhow::Result<Self> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
		let uri = match lookup("MONGODB_URI") {
			Some(uri) => uri,
			None => {
				let user = lookup("DB_USER").context("DB_USER is not set")?;
				let pass = lookup("DB_PASS").context("DB_PASS is not set")?;
				atlas_uri(&user, &pass)
			}
		};

		let port = match lookup("PORT") {
			Some(port) => port.parse().with_context(|| format!("PORT is not a valid port: {}", port))?,
			None => DEFAULT_PORT,
		};

		let guard_vehicle_details = match lookup("GUARD_VEHICLE_DETAILS") {
			Some(flag) => parse_flag(&flag)
				.with_context(|| format!("GUARD_VEHICLE_DETAILS is not a boolean: {}", flag))?,
			None => AuthPolicy::default().guard_vehicle_details,
		};

		Ok(Config {
			database: DatabaseConfig {
				uri,
				name: lookup("DB_NAME").unwrap_or_else(|| "travelEase_db".to_string()),
				vehicles_collection: lookup("VEHICLES_COLLECTION").unwrap_or_else(|| "travel-collection".to_string()),
				bookings_collection: lookup("BOOKINGS_COLLECTION").unwrap_or_else(|| "bookings".to_string()),
			},
			service_account_path: lookup("FIREBASE_SERVICE_ACCOUNT")
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from("serviceKey.json")),
			port,
			auth: AuthPolicy { guard_vehicle_details },
		})
	}
}

pub fn atlas_uri(user: &str, pass: &str) -> String {
	format!(
		"mongodb+srv://{}:{}@{}",
		urlencoding::encode(user),
		urlencoding::encode(pass),
		CLUSTER_HOST
	)
}

fn parse_flag(flag: &str) -> anyhow::Result<bool> {
	match flag.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => bail!("expected true or false"),
	}
}
