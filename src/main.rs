use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use env_logger::Env;
use log::info;
use tokio::{net::TcpListener, signal};
use travel_ease_server::{
	config::Config,
	db_client::{mongo::MongoStore, DbClient},
	router,
	verification::firebase::FirebaseVerifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenvy::dotenv().ok();
	env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

	let config = Config::from_env()?;

	let verifier = FirebaseVerifier::from_service_account_file(&config.service_account_path)
		.context("failed to load Firebase service account")?;
	let store = MongoStore::connect(&config.database)
		.await
		.context("failed to connect to MongoDB")?;

	if !config.auth.guard_vehicle_details {
		info!("GET /vehicles/:id is public");
	}
	let app = router(DbClient::from_store(store.clone()), Arc::new(verifier), config.auth);

	let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
	let listener = TcpListener::bind(addr).await?;
	info!("travelEase server is listening on port {}", config.port);

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	store.shutdown().await;
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			log::error!("failed to listen for Ctrl-C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				log::error!("failed to listen for SIGTERM: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	info!("shutting down");
}
