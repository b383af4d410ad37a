//! Command line interface for the `socketframe` inspection binary.
//!
//! Also compiled by `build.rs` to generate the man page, so it may only
//! depend on `clap` and the standard library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line arguments for the `socketframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "socketframe",
    version,
    about = "Inspect socket.io 0.9 frames and handshakes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a frame or batch and print its messages.
    Decode {
        /// Wire payload, for example `5:1+::{"name":"ping","args":[]}`.
        frame: String,
    },
    /// Answer a hixie-76 key challenge.
    Challenge {
        #[arg(long)]
        key1: String,
        #[arg(long)]
        key2: String,
        /// The eight bytes sent after the request headers.
        #[arg(long)]
        body: String,
    },
    /// Print the capability line a handshake would return.
    Handshake {
        /// JSON settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Principal the sample session is created for.
        #[arg(long, default_value = "anonymous")]
        principal: String,
    },
}
