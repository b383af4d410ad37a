//! Build script rendering the `socketframe` manual pages.
//!
//! `socketframe.1` documents the inspection tool as a whole; each subcommand
//! (`decode`, `challenge`, `handshake`) gets its own `socketframe-<name>.1`.

use std::{fs, path::Path};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

const MANUAL: &str = "socket.io 0.9 transport tools";

fn render(cmd: Command, out_dir: &Path, file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let man = Man::new(cmd)
        .section("1")
        .manual(MANUAL)
        .source(concat!("socketframe ", env!("CARGO_PKG_VERSION")));
    let mut page = Vec::new();
    man.render(&mut page)?;
    fs::write(out_dir.join(file), page)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = Path::new("target/generated-man");
    fs::create_dir_all(out_dir)?;

    let cmd = cli::Cli::command();
    for sub in cmd.get_subcommands() {
        render(sub.clone(), out_dir, &format!("socketframe-{}.1", sub.get_name()))?;
    }
    render(cmd, out_dir, "socketframe.1")
}
