//! Config command implementation.

use anyhow::{Context, Result};

use fling_core::config::Config;

use super::ConfigArgs;

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    if args.path {
        match Config::default_path() {
            Some(path) => println!("{}", path.display()),
            None => println!("No config directory available on this platform."),
        }
        return Ok(());
    }

    if args.reset {
        let config = Config::default();
        config.save().context("failed to write default config")?;
        println!("Configuration reset to defaults.");
        return Ok(());
    }

    let config = super::load_config();
    let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
    print!("{rendered}");
    Ok(())
}
