use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use readlist::api::{self, AppState};
use readlist::config::AppConfig;
use readlist::demo::Demo;
use readlist::{AppError, CredentialStore, Database};

#[derive(Debug, Parser)]
#[command(name = "readlist", about = "Personal reading list over HTTP")]
struct Cli {
	/// Port to listen on.
	#[arg(env = "PORT", default_value_t = 8080)]
	port: u16,

	#[arg(long, default_value = "0.0.0.0")]
	host: String,

	/// Directory served under /static.
	#[arg(long, default_value = "./static")]
	static_dir: PathBuf,

	/// Wipe the database and load the demo users and books before serving.
	#[arg(long)]
	seed: bool,
}

#[tokio::main]
async fn main() {
	// a missing .env is fine, the variables may come from the environment
	let _ = dotenvy::dotenv();

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("readlist=info,tower_http=info")),
		)
		.init();

	let cli = Cli::parse();

	if let Err(e) = run(cli).await {
		tracing::error!("{e}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<(), AppError> {
	let config = AppConfig::from_env()?;
	tracing::debug!(?config, "configuration loaded");

	let db = Database::connect(&config.database).await.map_err(AppError::Connect)?;
	db.ensure_schema().await?;

	let state = AppState::new(db.clone(), CredentialStore::new(db.clone()));
	if cli.seed {
		Demo::new(&state.db, &state.credentials, &state.library).start_fresh().await?;
	}

	let app = api::router(state, &cli.static_dir);

	let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
		.parse()
		.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad listen address: {e}")))?;
	let listener = tokio::net::TcpListener::bind(addr).await?;
	tracing::info!(%addr, "listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	db.close().await;
	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::warn!(error = %e, "can't listen for ctrl-c");
		std::future::pending::<()>().await;
	}
	tracing::info!("shutting down");
}
