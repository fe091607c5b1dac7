use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::session::Pacing;
use crate::store::HeaderPolicy;

const DEFAULT_CONFIG_FILE: &str = "cian_scraper";
const ENV_PREFIX: &str = "CIAN";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("invalid page range {start}..={end}")]
    PageRange { start: u32, end: u32 },
    #[error("max_attempts must be at least 1")]
    NoAttempts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub start_page: u32,
    pub end_page: u32,
    pub fetch_detail_pages: bool,
    pub persist_incrementally: bool,
    pub list_pause_ms: u64,
    pub detail_pause_ms: u64,
    pub max_attempts: u32,
    pub search_url: String,
    pub user_agent: String,
    pub header_policy: HeaderPolicy,
}

/// Values given on the command line; they override every other source.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    pub fetch_detail_pages: Option<bool>,
    pub persist_incrementally: Option<bool>,
    pub header_policy: Option<HeaderPolicy>,
}

impl Settings {
    /// Defaults, then `cian_scraper.toml` (or `file`), then `CIAN_*` env vars, then CLI.
    pub fn load(file: Option<&Path>, cli: &Overrides) -> Result<Self, SettingsError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("start_page", 1_i64)?
            .set_default("end_page", 100_i64)?
            .set_default("fetch_detail_pages", false)?
            .set_default("persist_incrementally", false)?
            .set_default("list_pause_ms", 2000_i64)?
            .set_default("detail_pause_ms", 4000_i64)?
            .set_default("max_attempts", 3_i64)?
            .set_default("search_url", "https://cian.ru/cat.php")?
            .set_default(
                "user_agent",
                "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
            )?
            .set_default("header_policy", "drop-extra")?
            .add_source(file_source)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("start_page", cli.start_page.map(i64::from))?
            .set_override_option("end_page", cli.end_page.map(i64::from))?
            .set_override_option("fetch_detail_pages", cli.fetch_detail_pages)?
            .set_override_option("persist_incrementally", cli.persist_incrementally)?
            .set_override_option(
                "header_policy",
                cli.header_policy.map(|p| match p {
                    HeaderPolicy::DropExtra => "drop-extra",
                    HeaderPolicy::Strict => "strict",
                }),
            )?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.start_page == 0 || self.start_page > self.end_page {
            return Err(SettingsError::PageRange {
                start: self.start_page,
                end: self.end_page,
            });
        }
        if self.max_attempts == 0 {
            return Err(SettingsError::NoAttempts);
        }
        Ok(())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            list_pause: Duration::from_millis(self.list_pause_ms),
            detail_pause: Duration::from_millis(self.detail_pause_ms),
            max_attempts: self.max_attempts,
        }
    }
}
