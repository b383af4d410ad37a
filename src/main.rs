//! `socketframe` inspection binary.
//!
//! Decodes frames, answers legacy WebSocket challenges and prints sample
//! handshake replies for a settings file.

mod cli;

use std::{error::Error, fs};

use clap::Parser;
use cli::{Cli, Command};
use socketframe::{
    codec,
    config::{ServerConfig, ServerSettings},
    handshake::legacy_challenge,
    request::HandshakeRequest,
    router::EventRouter,
    server::SocketServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Decode { frame } => {
            for message in codec::decode_batch(frame.as_bytes())? {
                println!("{message:?}");
            }
        }
        Command::Challenge { key1, key2, body } => {
            let body: &[u8; 8] = body
                .as_bytes()
                .try_into()
                .map_err(|_| "challenge body must be exactly 8 bytes")?;
            let digest = legacy_challenge(&key1, &key2, body)?;
            let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
            println!("{hex}");
        }
        Command::Handshake { config, principal } => {
            let config = match config {
                Some(path) => {
                    ServerConfig::try_from(ServerSettings::from_json(&fs::read_to_string(path)?)?)?
                }
                None => ServerConfig::default(),
            };
            let request = HandshakeRequest::new(config.namespace(), principal);
            let server = SocketServer::new(config, EventRouter::new().into_factory())?;
            let reply = server.handshake(&request);
            println!("{} {}", reply.status.as_u16(), String::from_utf8_lossy(&reply.body));
            server.shutdown().await;
        }
    }
    Ok(())
}
