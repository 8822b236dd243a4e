//! Discover bulbs (or use the address given on the command line), connect to
//! the first one and run through a few commands while printing state events.
//!
//! ```text
//! cargo run --example control -- 192.168.1.50
//! ```

use std::time::Duration;
use yeelight_lan::{discover, Bulb, ColorRequest, Endpoint, DISCOVERY_WINDOW};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let endpoint = match std::env::args().nth(1) {
        Some(address) => Endpoint::new(address),
        None => {
            println!("Searching for bulbs for {:?}...", DISCOVERY_WINDOW);
            let found = discover(DISCOVERY_WINDOW).await?;
            for (address, bulb) in &found {
                println!(
                    "  {} model={:?} name={:?} power={:?}",
                    address, bulb.model, bulb.name, bulb.power
                );
            }
            match found.values().next() {
                Some(bulb) => bulb.endpoint(),
                None => {
                    println!("No bulbs found");
                    return Ok(());
                }
            }
        }
    };

    let bulb = Bulb::new(endpoint);
    bulb.initialize().await?;

    let mut events = bulb.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("{:?} {:?}", event.source, event.change);
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("State: {:?}", bulb.state());

    bulb.on();
    tokio::time::sleep(Duration::from_secs(1)).await;

    bulb.set_color_temperature(2700, Some(60), Some(1.0));
    tokio::time::sleep(Duration::from_secs(2)).await;

    bulb.set_color(ColorRequest {
        hue: 66,
        saturation: 80,
        level: None,
    });
    tokio::time::sleep(Duration::from_secs(2)).await;

    bulb.refresh();
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("State: {:?}", bulb.state());

    bulb.shutdown().await;
    Ok(())
}
