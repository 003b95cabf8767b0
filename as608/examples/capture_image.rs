//! Capture a fingerprint image and save it as a PGM file

use anyhow::Context;
use as608::Sensor;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Change to your adapter
    let port = std::env::var("SENSOR_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let output = std::env::args().nth(1).unwrap_or_else(|| "finger.pgm".to_string());

    let sensor = Sensor::new(port);
    sensor.connect().await.context("connecting to sensor")?;

    let mut events = sensor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  {}", event);
        }
    });

    let image = sensor.capture_image().await.context("capturing image")?;
    std::fs::write(&output, image.to_pgm()).with_context(|| format!("writing {}", output))?;
    println!("Saved {} to {}", image, output);

    sensor.disconnect().await?;
    Ok(())
}
