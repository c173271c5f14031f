//! `chronocat serve` — hosts a WebSocket sync endpoint over a set of
//! catalogue-and-event rooms, each backed by an append-only log on disk when
//! `--directory` is given.

mod cli;
mod registry;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::registry::Rooms;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	let cli = Cli::parse();
	match cli.command {
		Command::Serve { host, port, directory } => {
			if let Some(dir) = &directory {
				if let Err(err) = std::fs::create_dir_all(dir) {
					tracing::error!("could not create --directory {}: {err}", dir.display());
					std::process::exit(1);
				}
			}

			let rooms = Arc::new(Rooms::new(directory));
			let app = Router::new().route("/ws/{room}", get(ws::upgrade)).with_state(rooms);

			let addr = std::net::SocketAddr::new(host, port);
			tracing::info!("chronocat listening on ws://{addr}/ws/<room>");
			let listener = match tokio::net::TcpListener::bind(addr).await {
				Ok(listener) => listener,
				Err(err) => {
					tracing::error!("could not bind {addr}: {err}");
					std::process::exit(1);
				}
			};
			if let Err(err) = axum::serve(listener, app).await {
				tracing::error!("server exited: {err}");
				std::process::exit(1);
			}
		}
	}
}

// vim: ts=4
