//! # clapcharm demo application
//!
//! A tiny CLI that resolves [`DemoConfig`](config::DemoConfig) from defaults,
//! a config file, env vars and flags, then prints the result together with
//! the layer each key came from.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example charm_demo -- --help
//! cargo run --example charm_demo -- --workers=16 --server.tls
//! DEMO_SERVER_PORT=9999 cargo run --example charm_demo
//! cargo run --example charm_demo -- --config ./demo.toml
//! RUST_LOG=clapcharm=trace cargo run --example charm_demo
//! ```
//!
//! `--config` may name a file or a directory holding `config.{json,toml,yaml,yml}`.

mod config;

use std::process;

use clap::{Arg, Command};
use clapcharm::Charmer;
use tracing_subscriber::EnvFilter;

use config::DemoConfig;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let command = Command::new("charm-demo")
        .about("clapcharm demo: flags, env vars and a config file from one struct")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .help("Config file or directory"),
        );

    let mut charmer = Charmer::builder()
        .defaults(DemoConfig::default())
        .command(command)
        .build()
        .unwrap_or_else(|e| fail("failed to set up config", e));
    charmer
        .add_flags()
        .unwrap_or_else(|e| fail("invalid config schema", e));

    let matches = charmer.command_mut().get_matches_mut();
    if let Some(path) = matches.get_one::<String>("config") {
        charmer.set_config_file_path(path.as_str());
    }

    let config = charmer
        .resolve(&matches)
        .unwrap_or_else(|e| fail("failed to load config", e));

    println!("{config:#?}");
    println!();
    if let Some(path) = charmer.config_file_used() {
        println!("config file: {}", path.display());
    }

    let sources = charmer
        .sources(&matches)
        .unwrap_or_else(|e| fail("failed to resolve sources", e));

    let width = sources.keys().map(String::len).max().unwrap_or(0);
    for (key, layer) in &sources {
        println!("{key:<width$}  {layer}");
    }
}

fn fail(context: &str, err: clapcharm::CharmError) -> ! {
    eprintln!("{context}:\n{err}");
    process::exit(1);
}
