use anyhow::{ensure, Context, Result};
use pager_core::{FieldKind, LimitCfg, ParserLimits, SortDir};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Environment prefix; `PAGER__PAGING__MAX_PAGE_SIZE=50` maps to `paging.max_page_size`.
pub const ENV_PREFIX: &str = "PAGER__";

/// Application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Allow-list: field name → kind (`string`, `i64`, `datetime`, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagingConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
    /// Unique field appended to every ordering.
    pub tiebreaker: String,
    pub tiebreaker_dir: SortDir,
    pub include_prev_cursor_on_first_page: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        let limits = LimitCfg::default();
        Self {
            default_page_size: limits.default,
            max_page_size: limits.max,
            tiebreaker: "id".to_string(),
            tiebreaker_dir: SortDir::Asc,
            include_prev_cursor_on_first_page: false,
        }
    }
}

impl PagingConfig {
    pub fn limit_cfg(&self) -> LimitCfg {
        LimitCfg {
            default: self.default_page_size,
            max: self.max_page_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Longest accepted filter text, in bytes.
    pub max_len: usize,
    /// Largest accepted syntax tree.
    pub max_nodes: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let limits = ParserLimits::default();
        Self {
            max_len: limits.max_len,
            max_nodes: limits.max_nodes,
        }
    }
}

impl FilterConfig {
    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_len: self.max_len,
            max_nodes: self.max_nodes,
            ..ParserLimits::default()
        }
    }
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/pager.log"; empty disables the file
    #[serde(default)]
    pub file_level: String,
    /// Rotated files older than this are removed when `max_backups` is unset.
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

/// Create a default logging configuration: warnings to stderr, no file.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "warn".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paging: PagingConfig::default(),
            filter: FilterConfig::default(),
            logging: Some(default_logging_config()),
            fields: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        Self::extract(Some(config_path.as_ref()))
    }

    /// Load configuration from file, or defaults plus environment when no file is given.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Self::extract(None),
        }
    }

    fn extract(config_path: Option<&Path>) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Start from a base where logging is None, so it stays None unless
        // explicitly provided by YAML/ENV.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let mut figment = Figment::new().merge(Serialized::defaults(base));
        if let Some(path) = config_path {
            ensure!(path.exists(), "config file not found: {}", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no request could satisfy.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.paging.max_page_size >= 1, "paging.max_page_size must be at least 1");
        ensure!(
            self.paging.default_page_size >= 1
                && self.paging.default_page_size <= self.paging.max_page_size,
            "paging.default_page_size must be between 1 and paging.max_page_size ({})",
            self.paging.max_page_size
        );
        ensure!(!self.paging.tiebreaker.trim().is_empty(), "paging.tiebreaker cannot be empty");
        ensure!(self.filter.max_len > 0, "filter.max_len must be positive");
        ensure!(self.filter.max_nodes > 0, "filter.max_nodes must be positive");
        self.field_kinds()?;
        Ok(())
    }

    /// The `fields` section with every kind parsed.
    pub fn field_kinds(&self) -> Result<BTreeMap<String, FieldKind>> {
        self.fields
            .iter()
            .map(|(name, kind)| {
                let kind = kind
                    .parse::<FieldKind>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("invalid kind for field '{name}'"))?;
                Ok((name.clone(), kind))
            })
            .collect()
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.max_page_size {
            self.paging.max_page_size = size;
            self.paging.default_page_size = self.paging.default_page_size.min(size.max(1));
        }

        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
    pub max_page_size: Option<u64>,
}
