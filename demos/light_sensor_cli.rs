//! CLI for trying a light sensor configuration outside of a bridge.
//!
//! Accepts either a single accessory block or a whole Homebridge
//! `config.json`.
//!
//! Run with: cargo run --example light_sensor_cli -- --config config.json read

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use http_ambient_light_sensor::{
    Accessory, Characteristic, NotificationHub, NotificationRegistry, ReqwestExecutor,
    accessories_from_homebridge_config, configured_name,
};

#[derive(Parser)]
#[command(name = "light-sensor-cli")]
#[command(about = "Exercise an HTTP ambient light sensor configuration", long_about = None)]
struct Cli {
    /// Accessory block or Homebridge config.json
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Accessory to use when the config holds several
    #[arg(short, long, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the sensor once
    Read,

    /// Keep the accessory running and print every level change
    Watch,

    /// Send the identify request
    Identify,

    /// Deliver a notification body to the accessory, as a push source would
    Notify {
        /// Notification body, e.g. '{"characteristic":"CurrentAmbientLightLevel","value":42}'
        body: String,

        /// Notification password
        #[arg(short, long)]
        password: Option<String>,
    },
}

fn select_block(config: &Value, name: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    if config.get("accessories").is_none() {
        return Ok(config.clone());
    }

    accessories_from_homebridge_config(config)
        .into_iter()
        .find(|block| name.is_none_or(|n| configured_name(block) == n))
        .cloned()
        .ok_or_else(|| "no matching HttpAmbientLightSensor accessory in config".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&cli.config)?)?;
    let block = select_block(&raw, cli.name.as_deref())?;

    let hub = Arc::new(NotificationHub::new());
    let executor = Arc::new(ReqwestExecutor::new()?);
    let accessory = Accessory::register(
        &block,
        executor,
        Some(Arc::clone(&hub) as Arc<dyn NotificationRegistry>),
    );
    accessory.did_finish_launching();

    let Accessory::Ready(sensor) = &accessory else {
        if let Accessory::Disabled(stub) = &accessory {
            eprintln!("Accessory '{}' is disabled: {}", stub.name(), stub.reason());
        }
        std::process::exit(1);
    };

    match cli.command {
        Commands::Read => {
            match accessory.read(Characteristic::CurrentAmbientLightLevel).await {
                Ok(lux) => println!("{}: {} lx", sensor.name(), lux),
                Err(e) => eprintln!("Error reading sensor: {}", e),
            }
        }

        Commands::Watch => {
            if !sensor.is_pulling() {
                return Err("set 'pullInterval' to watch the sensor".into());
            }

            let name = sensor.name().to_string();
            sensor
                .light_sensor()
                .level()
                .subscribe(move |lux| println!("{}: {} lx", name, lux));
            println!("Watching {}... (Press Ctrl+C to stop)\n", sensor.name());

            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        Commands::Identify => match accessory.identify().await {
            Ok(()) => println!("Identify sent"),
            Err(e) => eprintln!("Error: {}", e),
        },

        Commands::Notify { body, password } => {
            let Some(id) = sensor.config().notification_id.as_deref() else {
                return Err("set 'notificationID' to receive notifications".into());
            };
            hub.dispatch_str(id, password.as_deref(), &body)?;
            println!(
                "{}: {} lx",
                sensor.name(),
                sensor.light_sensor().level().value()
            );
        }
    }

    Ok(())
}
