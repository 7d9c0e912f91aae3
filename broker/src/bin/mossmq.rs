// Broker entry point. The teacher's `hebo.rs`/`server.rs` wire up an
// async tokio runtime behind an old clap 2.x `App` parser; this binary
// instead loads a `Config`, validates it, and hands the synchronous,
// mio-driven `Selector` its own thread-of-control.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mossmq_broker::auth::{AllowAllBackend, AuthBackend, DenyAllBackend, FileAuthBackend};
use mossmq_broker::config::Config;
use mossmq_broker::Selector;

#[derive(Parser, Debug)]
#[command(name = "mossmq", version, about = "MQTT 5 broker")]
struct Cli {
    /// Path to the broker's TOML config file.
    #[arg(short, long, default_value = "mossmq.toml")]
    config: PathBuf,

    /// Overrides every listener's bind address from the config file.
    #[arg(long)]
    bind_address: Option<String>,

    /// Validates the config and exits without binding any sockets.
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if let Some(bind_address) = &cli.bind_address {
        for listener in config.listeners_mut() {
            listener.set_address(bind_address.clone());
        }
    }

    if let Err(err) = config.validate(!cli.check) {
        eprintln!("invalid config: {err}");
        return ExitCode::FAILURE;
    }

    if cli.check {
        println!("{} is valid", cli.config.display());
        return ExitCode::SUCCESS;
    }

    std::env::set_var("RUST_LOG", config.log().log_level().as_filter_str());
    if config.log().console_log() {
        env_logger::init();
    }

    let auth_backend = match build_auth_backend(&config) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let node_id = rand::random::<u32>();
    let mut selector = match Selector::new(&config, node_id, auth_backend) {
        Ok(selector) => selector,
        Err(err) => {
            eprintln!("failed to start broker: {err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("mossmq listening, node id {node_id}");
    if let Err(err) = selector.run() {
        eprintln!("broker loop exited: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn build_auth_backend(config: &Config) -> Result<Box<dyn AuthBackend>, String> {
    let security = config.security();
    if let Some(path) = security.password_file() {
        return FileAuthBackend::load(path, security.allow_anonymous())
            .map(|backend| Box::new(backend) as Box<dyn AuthBackend>)
            .map_err(|err| format!("failed to load password file {}: {err}", path.display()));
    }
    if security.allow_anonymous() {
        Ok(Box::new(AllowAllBackend))
    } else {
        Ok(Box::new(DenyAllBackend))
    }
}
