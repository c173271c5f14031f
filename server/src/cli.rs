//! `chronocat serve` command-line surface.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chronocat", version, about = "A CRDT-backed catalogue-and-event database server")]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	/// Bind a WebSocket sync endpoint and serve rooms.
	Serve {
		/// Address to bind the WebSocket listener to.
		#[arg(long, default_value = "127.0.0.1")]
		host: IpAddr,

		/// Port to bind the WebSocket listener to.
		#[arg(long, default_value_t = 8000)]
		port: u16,

		/// Directory to persist room logs under. Rooms are in-memory only
		/// when this is omitted.
		#[arg(long)]
		directory: Option<PathBuf>,
	},
}

// vim: ts=4
