//! File configuration and its merge with `run` flags.
//!
//! The file uses a small `key = value` subset of TOML: one key per line, `#` comments,
//! double-quoted strings, bare integers and `true`/`false`. Every parsed value is range
//! checked; unknown keys are rejected so typos do not silently fall back to defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use thesis_downloader_core::download::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use thesis_downloader_core::normalizer::{NormalizerRules, RewriteRule};
use thesis_downloader_core::pipeline::DEFAULT_CONCURRENCY;
use thesis_downloader_core::resolver::{HttpClientConfig, RenderSettings};
use thesis_downloader_core::{DEFAULT_BUSY_TIMEOUT_MS, default_cache_path};

use crate::cli::RunArgs;

const CONFIG_DIR_NAME: &str = "thesis-downloader";
const CONFIG_FILE_NAME: &str = "config.toml";

const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 5_000;
const DEFAULT_RETRY_MAX_JITTER_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Values read from the config file. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<u64>,
    pub max_attempts: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_jitter_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub proxy: Option<String>,
    pub render_settle_ms: Option<u64>,
    pub max_render_sessions: Option<u64>,
    pub accept_invalid_certs: Option<bool>,
    /// Extra rewrite rules, one `from => to` per line.
    pub rewrites_file: Option<PathBuf>,
    /// Extra denied authorities, one per line.
    pub deny_hosts_file: Option<PathBuf>,
    pub db_busy_timeout_ms: Option<u64>,
}

impl FileConfig {
    fn validate(&self) -> Result<()> {
        check_range("concurrency", self.concurrency, 1, 100)?;
        check_range("max_attempts", self.max_attempts, 1, 20)?;
        check_range("retry_base_delay_ms", self.retry_base_delay_ms, 0, 600_000)?;
        check_range("retry_max_jitter_ms", self.retry_max_jitter_ms, 0, 600_000)?;
        check_range("request_timeout_secs", self.request_timeout_secs, 1, 3600)?;
        check_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        check_range("render_settle_ms", self.render_settle_ms, 0, 120_000)?;
        check_range("max_render_sessions", self.max_render_sessions, 1, 16)?;
        check_range("db_busy_timeout_ms", self.db_busy_timeout_ms, 0, 120_000)?;
        if let Some(proxy) = &self.proxy
            && url::Url::parse(proxy).is_err()
        {
            bail!("Invalid config value for `proxy`: '{proxy}' is not a URL");
        }
        Ok(())
    }
}

fn check_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    match value {
        Some(value) if !(min..=max).contains(&value) => {
            bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}")
        }
        _ => Ok(()),
    }
}

/// Default config location.
///
/// 1. `$XDG_CONFIG_HOME/thesis-downloader/config.toml`
/// 2. `$HOME/.config/thesis-downloader/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    let base = non_empty_env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty_env("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn non_empty_env(name: &str) -> Option<std::ffi::OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional.
///
/// # Errors
///
/// Fails when the file cannot be read or does not parse and validate.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = key.trim();
        let value = value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => cfg.output_dir = Some(parse_string(value).with_context(context)?.into()),
            "concurrency" => cfg.concurrency = Some(parse_u64(value).with_context(context)?),
            "max_attempts" => cfg.max_attempts = Some(parse_u64(value).with_context(context)?),
            "retry_base_delay_ms" => {
                cfg.retry_base_delay_ms = Some(parse_u64(value).with_context(context)?);
            }
            "retry_max_jitter_ms" => {
                cfg.retry_max_jitter_ms = Some(parse_u64(value).with_context(context)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_u64(value).with_context(context)?);
            }
            "proxy" => cfg.proxy = Some(parse_string(value).with_context(context)?),
            "render_settle_ms" => {
                cfg.render_settle_ms = Some(parse_u64(value).with_context(context)?);
            }
            "max_render_sessions" => {
                cfg.max_render_sessions = Some(parse_u64(value).with_context(context)?);
            }
            "accept_invalid_certs" => {
                cfg.accept_invalid_certs = Some(parse_bool(value).with_context(context)?);
            }
            "rewrites_file" => {
                cfg.rewrites_file = Some(parse_string(value).with_context(context)?.into());
            }
            "deny_hosts_file" => {
                cfg.deny_hosts_file = Some(parse_string(value).with_context(context)?.into());
            }
            "db_busy_timeout_ms" => {
                cfg.db_busy_timeout_ms = Some(parse_u64(value).with_context(context)?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string(value: &str) -> Result<String> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Expected double-quoted string"))
}

fn parse_u64(value: &str) -> Result<u64> {
    if value.is_empty() {
        bail!("Expected integer value");
    }
    value
        .parse::<u64>()
        .map_err(|e| anyhow!("Expected non-negative integer: {e}"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

/// Everything a `run` needs, after merging flags over file values over defaults.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub cache_path: PathBuf,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub http: HttpClientConfig,
    pub render: RenderSettings,
    pub rewrites_file: Option<PathBuf>,
    pub deny_hosts_file: Option<PathBuf>,
    pub db_busy_timeout: Duration,
}

impl RunSettings {
    /// Merges `args` over `file`.
    ///
    /// # Errors
    ///
    /// Fails when no output directory is given by either source.
    pub fn resolve(args: &RunArgs, file: &FileConfig) -> Result<Self> {
        let output_dir = args
            .output_dir
            .clone()
            .or_else(|| file.output_dir.clone())
            .ok_or_else(|| anyhow!("No output directory: pass OUTPUT_DIR or set `output_dir` in the config file"))?;
        let cache_path = args
            .cache
            .clone()
            .unwrap_or_else(|| default_cache_path(&output_dir));

        let concurrency = args
            .concurrency
            .map(u64::from)
            .or(file.concurrency)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(DEFAULT_CONCURRENCY);
        let max_attempts = args
            .max_attempts
            .or_else(|| file.max_attempts.and_then(|value| u32::try_from(value).ok()))
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let base_delay = args
            .retry_delay_ms
            .or(file.retry_base_delay_ms)
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS);
        let max_jitter = args
            .retry_jitter_ms
            .or(file.retry_max_jitter_ms)
            .unwrap_or(DEFAULT_RETRY_MAX_JITTER_MS);
        let retry = RetryPolicy::new(
            max_attempts,
            Duration::from_millis(base_delay),
            Duration::from_millis(max_jitter),
        );

        let http = HttpClientConfig {
            connect_timeout: Duration::from_secs(
                file.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            request_timeout: Duration::from_secs(
                args.timeout_secs
                    .or(file.request_timeout_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            proxy: args.proxy.clone().or_else(|| file.proxy.clone()),
            accept_invalid_certs: args.insecure || file.accept_invalid_certs.unwrap_or(false),
        };

        let defaults = RenderSettings::default();
        let render = RenderSettings {
            max_sessions: args
                .render_sessions
                .map(u64::from)
                .or(file.max_render_sessions)
                .and_then(|value| usize::try_from(value).ok())
                .unwrap_or(defaults.max_sessions),
            settle: args
                .settle_ms
                .or(file.render_settle_ms)
                .map_or(defaults.settle, Duration::from_millis),
        };

        Ok(Self {
            input: args.input.clone(),
            output_dir,
            cache_path,
            concurrency,
            retry,
            http,
            render,
            rewrites_file: file.rewrites_file.clone(),
            deny_hosts_file: file.deny_hosts_file.clone(),
            db_busy_timeout: Duration::from_millis(
                file.db_busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            ),
        })
    }

    /// Built-in normalizer rules extended with the configured rule files.
    ///
    /// # Errors
    ///
    /// Fails when a rule file cannot be read or a rewrite line is malformed.
    pub fn normalizer_rules(&self) -> Result<NormalizerRules> {
        let mut rules = NormalizerRules::builtin();
        if let Some(path) = &self.rewrites_file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read rewrites file '{}'", path.display()))?;
            let extra: Vec<RewriteRule> = NormalizerRules::parse_rewrites(&text)
                .with_context(|| format!("Invalid rewrites file '{}'", path.display()))?;
            rules = rules.with_rewrites(extra);
        }
        if let Some(path) = &self.deny_hosts_file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read deny hosts file '{}'", path.display()))?;
            rules = rules.with_denied_hosts(NormalizerRules::parse_denied_hosts(&text));
        }
        Ok(rules)
    }
}
