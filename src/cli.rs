use std::{net::SocketAddr, path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Stream, query and download container logs over HTTP.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "logcast.toml")]
    pub config: PathBuf,
    /// Address to listen on. Takes precedence over the config file.
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
