use std::{
	collections::HashMap,
	fs,
	path::Path,
	time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::debug;
use reqwest::header::CACHE_CONTROL;
use tokio::sync::RwLock;

use super::{AuthError, Principal, TokenVerifier};

/// Public keys Firebase uses to sign ID tokens.
pub const FIREBASE_JWKS_URL: &str =
	"https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const DEFAULT_KEY_TTL: Duration = Duration::from_secs(60 * 60);

/// Floor between refetches triggered by an unknown `kid` while the key set is still fresh.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Allowed clock skew for `iat` and `auth_time`, same as the `exp` leeway.
const CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceAccount {
	pub project_id: String,
}

impl ServiceAccount {
	pub fn from_file(path: &Path) -> anyhow::Result<Self> {
		let raw = fs::read_to_string(path)
			.with_context(|| format!("failed to read service account {}", path.display()))?;
		let account: ServiceAccount =
			serde_json::from_str(&raw).with_context(|| format!("invalid service account {}", path.display()))?;
		Ok(account)
	}
}

#[derive(Debug, Clone, serde::Deserialize)]
struct Jwk {
	kid: String,
	n: String,
	e: String,
}

#[derive(Debug, serde::Deserialize)]
struct JwkSet {
	keys: Vec<Jwk>,
}

struct CachedKeys {
	keys: HashMap<String, Jwk>,
	fetched_at: Instant,
	expires_at: Instant,
}

#[derive(Debug, serde::Deserialize)]
struct FirebaseClaims {
	sub: String,
	iat: i64,
	auth_time: i64,
	#[serde(default)]
	email: Option<String>,
}

/// Verifies Firebase ID tokens against Google's published signing keys.
pub struct FirebaseVerifier {
	project_id: String,
	jwks_url: String,
	min_refresh_interval: Duration,
	http: reqwest::Client,
	keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
	pub fn new(account: ServiceAccount) -> Self {
		Self::with_jwks_url(account, FIREBASE_JWKS_URL)
	}

	pub(crate) fn with_jwks_url(account: ServiceAccount, jwks_url: &str) -> Self {
		FirebaseVerifier {
			project_id: account.project_id,
			jwks_url: jwks_url.to_string(),
			min_refresh_interval: MIN_REFRESH_INTERVAL,
			http: reqwest::Client::new(),
			keys: RwLock::new(None),
		}
	}

	pub fn from_service_account_file(path: &Path) -> anyhow::Result<Self> {
		Ok(Self::new(ServiceAccount::from_file(path)?))
	}

	pub fn issuer(&self) -> String {
		format!("https://securetoken.google.com/{}", self.project_id)
	}

	async fn signing_key(&self, kid: &str) -> Result<Jwk, AuthError> {
		{
			let cached = self.keys.read().await;
			if let Some(key) = self.lookup_cached(cached.as_ref(), kid)? {
				return Ok(key);
			}
		}

		// one fetch at a time; a waiter re-checks what the previous holder stored
		let mut cached = self.keys.write().await;
		if let Some(key) = self.lookup_cached(cached.as_ref(), kid)? {
			return Ok(key);
		}

		let fresh = self.fetch_keys().await?;
		let key = fresh.keys.get(kid).cloned();
		*cached = Some(fresh);
		key.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
	}

	/// `Ok(None)` means a fetch is due: nothing cached, keys expired, or an unknown
	/// `kid` after the refresh floor has passed.
	fn lookup_cached(&self, cached: Option<&CachedKeys>, kid: &str) -> Result<Option<Jwk>, AuthError> {
		let Some(cached) = cached else {
			return Ok(None);
		};
		let now = Instant::now();
		if cached.expires_at <= now {
			return Ok(None);
		}
		match cached.keys.get(kid) {
			Some(key) => Ok(Some(key.clone())),
			None if now.duration_since(cached.fetched_at) < self.min_refresh_interval => {
				Err(AuthError::UnknownKey(kid.to_string()))
			}
			None => Ok(None),
		}
	}

	async fn fetch_keys(&self) -> Result<CachedKeys, AuthError> {
		let response = self.http.get(&self.jwks_url).send().await?.error_for_status()?;
		let ttl = response
			.headers()
			.get(CACHE_CONTROL)
			.and_then(|value| value.to_str().ok())
			.and_then(max_age)
			.unwrap_or(DEFAULT_KEY_TTL);
		let set: JwkSet = response.json().await?;
		debug!("fetched {} Firebase signing keys, valid for {:?}", set.keys.len(), ttl);

		let fetched_at = Instant::now();
		Ok(CachedKeys {
			keys: set.keys.into_iter().map(|key| (key.kid.clone(), key)).collect(),
			fetched_at,
			expires_at: fetched_at + ttl,
		})
	}
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
	async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
		let header = decode_header(token)?;
		if header.alg != Algorithm::RS256 {
			return Err(AuthError::Rejected(format!("unexpected algorithm {:?}", header.alg)));
		}
		let kid = header.kid.ok_or_else(|| AuthError::Rejected("token has no kid".to_string()))?;

		let jwk = self.signing_key(&kid).await?;
		let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;

		let mut validation = Validation::new(Algorithm::RS256);
		validation.set_audience(&[&self.project_id]);
		validation.set_issuer(&[self.issuer()]);
		validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

		let claims = decode::<FirebaseClaims>(token, &key, &validation)?.claims;
		if claims.sub.is_empty() {
			return Err(AuthError::Rejected("token has an empty subject".to_string()));
		}
		let now = Utc::now().timestamp();
		if claims.iat > now + CLOCK_SKEW_SECS {
			return Err(AuthError::Rejected("token issued in the future".to_string()));
		}
		if claims.auth_time > now + CLOCK_SKEW_SECS {
			return Err(AuthError::Rejected("token authenticated in the future".to_string()));
		}
		Ok(Principal { uid: claims.sub, email: claims.email })
	}
}

/// `max-age` directive of a Cache-Control header value.
fn max_age(cache_control: &str) -> Option<Duration> {
	cache_control
		.split(',')
		.filter_map(|directive| directive.trim().strip_prefix("max-age="))
		.find_map(|seconds| seconds.trim().parse().ok())
		.map(Duration::from_secs)
}
