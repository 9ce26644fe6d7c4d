use anyhow::{Context, Result};
use celex_harvest::config::{Config, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;

pub async fn init_config(path: PathBuf, force: bool) -> Result<()> {
    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory {}", path.display()))?;

    let body = Config::default().to_toml()?;
    let content = format!(
        "# celex-harvest configuration\n\
         #\n\
         # The access token is read from the environment variables listed in\n\
         # [dataset] token_env, never from this file.\n\n{}",
        body
    );

    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created configuration file: {}", config_path.display());

    Ok(())
}
