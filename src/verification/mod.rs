//! Bearer-token guard for protected routes.

pub mod firebase;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
	extract::{Request, State},
	http::header::AUTHORIZATION,
	middleware::Next,
	response::{IntoResponse, Response},
};
use log::{info, warn};
use thiserror::Error;

use crate::error::ApiError;

/// Identity attached to a request once its token has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
	pub uid: String,
	pub email: Option<String>,
}

#[derive(Error, Debug)]
pub enum AuthError {
	#[error("malformed authorization header")]
	MalformedHeader,

	#[error("invalid token: {0}")]
	InvalidToken(#[from] jsonwebtoken::errors::Error),

	#[error("token rejected: {0}")]
	Rejected(String),

	#[error("no signing key with id {0}")]
	UnknownKey(String),

	#[error("could not fetch signing keys: {0}")]
	KeyFetch(#[from] reqwest::Error),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
	async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

pub type SharedVerifier = Arc<dyn TokenVerifier>;

/// Second whitespace-separated word of the header value (`Bearer <token>`).
pub fn bearer_token(header: &str) -> Option<&str> {
	header.split_whitespace().nth(1)
}

/// Answers 401 and stops the request unless the bearer token verifies.
pub async fn require_token(State(verifier): State<SharedVerifier>, mut request: Request, next: Next) -> Response {
	let Some(header) = request.headers().get(AUTHORIZATION) else {
		return ApiError::MissingToken.into_response();
	};

	let token = match header.to_str().ok().and_then(bearer_token) {
		Some(token) => token.to_string(),
		None => {
			warn!("Token verification failed: {}", AuthError::MalformedHeader);
			return ApiError::Unauthorized.into_response();
		}
	};

	match verifier.verify(&token).await {
		Ok(principal) => {
			info!("Token verified: {}", principal.email.as_deref().unwrap_or(&principal.uid));
			request.extensions_mut().insert(principal);
			next.run(request).await
		}
		Err(e) => {
			warn!("Token verification failed: {}", e);
			ApiError::Unauthorized.into_response()
		}
	}
}
