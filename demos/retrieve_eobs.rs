//! E-OBS v28.0e retrieval: ensemble-mean relative humidity and wind speed for
//! Europe at 0.1 degrees, 2011-2023, packaged as a tar.gz.
//!
//! Needs CDS credentials (CDSAPI_KEY / ~/.cdsapirc). Run with:
//!   RUST_LOG=info cargo run --example retrieve_eobs

use cds_api::{Client, ClientOptions, Request};

fn main() {
    env_logger::init();

    let opts = ClientOptions {
        retry_max: 5,
        progress: true,
        ..ClientOptions::default()
    };
    let client = match Client::new(opts) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cannot create client: {e}");
            std::process::exit(1);
        }
    };

    let request = Request::new()
        .product_type("ensemble_mean")
        .variable(["relative_humidity", "wind_speed"])
        .grid_resolution("0.1deg")
        .period("2011_2023")
        .version("28.0e")
        .format("tgz");

    match client.retrieve("insitu-gridded-observations-europe", &request, "download.tar.gz") {
        Ok(result) => {
            println!(
                "Downloaded {bytes} bytes to {target}",
                bytes = result.size_bytes,
                target = result.target
            );
        }
        Err(e) => {
            eprintln!("retrieve failed: {e}");
            std::process::exit(1);
        }
    }
}
