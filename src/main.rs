use log::*;

use filigree_shaders::manifest::SHADERS;
use filigree_shaders::pipeline::{self, Config};
use filigree_shaders::{tools, watch};

const USAGE: &str = "usage: filigree-shaders [build | clean | sources [--json] | watch]";

fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "build".to_string());
    let config = Config::from_env();

    match command.as_str() {
        "build" => {
            probe_tools(&config);
            pipeline::build_all(&config)
        }
        "clean" => pipeline::clean(&config),
        "sources" => {
            match args.next().as_deref() {
                Some("--json") => {
                    let vars = pipeline::variables(&config);
                    println!("{}", serde_json::to_string_pretty(&vars)?);
                }
                _ => {
                    for shader in SHADERS {
                        println!("{}", shader.file_name());
                    }
                }
            }
            Ok(())
        }
        "watch" => {
            probe_tools(&config);
            watch_loop(&config)
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn probe_tools(config: &Config) {
    if !tools::probe(&config.glslang) {
        warn!("{} not answering --version", config.glslang.display());
    }
    if !tools::probe(&config.spirv_cross) {
        warn!("{} not answering --version", config.spirv_cross.display());
    }
}

fn watch_loop(config: &Config) -> anyhow::Result<()> {
    pipeline::build_all(config)?;

    let mut changes = watch::watch(&config.shaders_dir)?;
    info!("watching {}", config.shaders_dir.display());

    loop {
        let events = changes.wait()?;
        debug!("{} shader source events", events.len());

        // keep watching through broken edits; the next save retries
        if let Err(err) = pipeline::build_all(config) {
            error!("rebuild failed: {err:#}");
        }
    }
}
