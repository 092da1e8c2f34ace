//! Query a sensor behind a serial-over-TCP bridge
//!
//! Reads `touchpass.toml` from the working directory if present, otherwise
//! uses `SENSOR_HOST`/`SENSOR_PORT`.

use std::path::Path;

use tracing_subscriber::EnvFilter;

use touchpass::Config;
use touchpass_transport::TcpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = Path::new("touchpass.toml");
    let config = if path.exists() {
        Config::load(path)?
    } else {
        Config::default()
    };

    let transport = match &config.link {
        Some(link) => link.transport(),
        None => {
            let host = std::env::var("SENSOR_HOST").unwrap_or_else(|_| "192.168.1.50".to_string());
            let port = std::env::var("SENSOR_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(2000);
            TcpTransport::new(host, port)
        }
    };

    let mut sensor = config.sensor(transport);
    sensor.connect().await?;

    if !sensor.is_connected().await {
        anyhow::bail!("sensor does not answer");
    }

    let params = sensor.read_system_parameters().await?;
    println!("{}", params);
    println!("Templates: {}/{}", sensor.template_count().await?, sensor.library_size());

    match sensor.find_empty_slot().await {
        Some(slot) => println!("First free slot: {}", slot),
        None => println!("Library full"),
    }

    sensor.disconnect().await?;
    Ok(())
}
