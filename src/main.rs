//! Tile Dispatch CLI - Process a bitmap tile by tile on CPU, GPU or both.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use tile_dispatch::{compute::Dispatcher, imageio, schema::DispatchConfig};

fn print_usage(program: &str) {
    eprintln!("Usage: {} <input> <output> [config.json]", program);
    eprintln!();
    eprintln!("Run the mask kernel over an image on the configured devices.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  input        Source image (.bmp or .png)");
    eprintln!("  output       Destination image, format from the extension");
    eprintln!("  config.json  Dispatch configuration (default: combo, ratio 0.5)");
    eprintln!();
    eprintln!("Example configuration is generated with --example flag.");
}

fn print_example_config() {
    match serde_json::to_string_pretty(&DispatchConfig::default()) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_config();
        return;
    }

    if args.len() < 3 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let output_path = PathBuf::from(&args[2]);

    // Load configuration
    let config: DispatchConfig = match args.get(3) {
        Some(path) => {
            let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config file: {}", e);
                std::process::exit(1);
            });
            serde_json::from_str(&config_str).unwrap_or_else(|e| {
                eprintln!("Error parsing config: {}", e);
                std::process::exit(1);
            })
        }
        None => DispatchConfig::default(),
    };

    let total = Instant::now();

    let dispatcher = Dispatcher::from_config(config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(e.code());
    });

    println!("Tile Dispatch");
    println!("=============");
    println!("Mode: {:?}", dispatcher.config().device);
    print!("Devices:\n{}", dispatcher.device_names());
    println!();

    let start = Instant::now();
    let input = imageio::load_rgba8(&input_path).unwrap_or_else(|e| {
        eprintln!("Error reading image: {}", e);
        std::process::exit(e.code());
    });
    println!(
        "Time of reading image from file: {} ms.",
        start.elapsed().as_secs_f64() * 1e3
    );
    println!("Image: {}x{}", input.width(), input.height());

    let output = dispatcher.run(&input).unwrap_or_else(|e| {
        eprintln!("Error processing image: {}", e);
        std::process::exit(e.code());
    });
    println!("Tiles: {}", output.tiles);
    println!("{}", output.timings);

    let start = Instant::now();
    imageio::save_rgba8(&output_path, &output.image).unwrap_or_else(|e| {
        eprintln!("Error writing image: {}", e);
        std::process::exit(e.code());
    });
    println!(
        "Time of writing image to file: {} ms.",
        start.elapsed().as_secs_f64() * 1e3
    );

    println!(
        "Total time: {} ms.",
        total.elapsed().as_secs_f64() * 1e3
    );
}
