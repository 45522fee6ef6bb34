use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};

use aero_acl::AclConfig;

pub fn read_config(config_file: PathBuf) -> Result<AclConfig> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())
        .with_context(|| format!("unable to open {}", config_file.display()))?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}
