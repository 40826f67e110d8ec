use clap::Parser;
use log::{error, info};
use sketchforge::configuration::config::Config;
use sketchforge::controller::controller_handler::Controller;
use std::path::Path;

#[derive(Parser)]
#[command(name = "sketchforge")]
#[command(version = "0.1.0")]
#[command(about = "Sketch colorization and image editing over a generative image API")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    config_file: Option<String>,

    /// Overrides `server.port` from the configuration file.
    #[arg(long, env = "SKETCHFORGE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    info!("Importing configuration");

    let args = Args::parse();

    let loaded = match args.config_file.as_deref().filter(|path| !path.trim().is_empty()) {
        Some(path) => Config::from_file(Path::new(path)),
        None => {
            info!("No configuration file given, using defaults");
            Config::from_toml_str("")
        }
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
