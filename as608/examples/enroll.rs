//! Enroll a finger into the first free library slot, then export it

use anyhow::{bail, Context};
use as608::{Sensor, SensorConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("SENSOR_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let password = match std::env::var("SENSOR_PASSWORD") {
        Ok(hex) => u32::from_str_radix(hex.trim_start_matches("0x"), 16).context("SENSOR_PASSWORD")?,
        Err(_) => 0,
    };

    let sensor = Sensor::serial(port, 57_600, SensorConfig::default().with_password(password));
    sensor.connect().await?;

    let params = sensor.read_parameters().await?;
    println!("{}", params);

    let index = sensor.read_index().await?;
    let Some(page) = index.first_free(params.capacity) else {
        bail!("library is full ({})", index);
    };

    let mut events = sensor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  {}", event);
        }
    });

    println!("Enrolling into page {}...", page);
    sensor.enroll_to_page(page).await?;

    let template = sensor.download_template(1).await?;
    println!("{}: {}", template, template.to_base64());

    sensor.disconnect().await?;
    Ok(())
}
