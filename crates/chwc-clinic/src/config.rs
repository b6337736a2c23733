use anyhow::Context;
use std::{io::Read, path::PathBuf, time::Duration};

const CONFIG_FILE: &str = "./app-config.toml";

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bind_address: String,
    pub bind_port: u16,
    pub master_secret: String,
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,
    #[serde(default = "secure_cookies_default")]
    pub secure_cookies: bool,
    pub database: chwc_db::Config,
    pub tracing: TracingConfig,
}

fn secure_cookies_default() -> bool {
    true
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TracingConfig {
    pub console: bool,
    #[serde(default)]
    pub filter: Option<String>,
}

pub fn load() -> anyhow::Result<Config> {
    let mut configuration = String::with_capacity(4096);
    std::fs::File::open(CONFIG_FILE)
        .with_context(|| format!("unable to open configuration file {CONFIG_FILE}"))?
        .read_to_string(&mut configuration)
        .with_context(|| format!("unable to read configuration file {CONFIG_FILE}"))?;
    let mut config = parse(&configuration)
        .with_context(|| format!("unable to parse configuration file {CONFIG_FILE}"))?;
    if let Ok(db_url) = std::env::var("CHWC_DATABASE_URL") {
        config.database.set_db_url(db_url);
    }
    if let Ok(master_secret) = std::env::var("CHWC_MASTER_SECRET") {
        config.master_secret = master_secret;
    }
    Ok(config)
}

fn parse(configuration: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(configuration)
}
