use axum::{
	response::{IntoResponse, Response},
	Json,
};
use hyper::StatusCode;
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

use crate::db_client::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
	#[error("unauthorized access: token not found")]
	MissingToken,

	#[error("unauthorized access")]
	Unauthorized,

	#[error("malformed identifier: {0}")]
	MalformedId(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("{0}")]
	Validation(String),

	#[error(transparent)]
	Store(#[from] StoreError),
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		match self {
			ApiError::MissingToken | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
			ApiError::MalformedId(_) => StatusCode::BAD_REQUEST,
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
			ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
			ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!("{}", self);
		} else {
			warn!("{}", self);
		}

		// database internals stay in the log
		let message = match &self {
			ApiError::Store(StoreError::Unavailable(_)) => "database unavailable".to_string(),
			ApiError::Store(_) => "internal server error".to_string(),
			other => other.to_string(),
		};

		(status, Json(json!({ "message": message }))).into_response()
	}
}
