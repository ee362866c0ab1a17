//! Configuration loading from dotenv-style or TOML files.
//!
//! Trading options (`main.env`) and prediction options
//! (`probability_llm.env`) are read into a flat key/value `Settings` map,
//! overlaid with process environment variables, then validated into
//! strongly-typed structs. Credentials are wrapped in `SecretString` and
//! never appear in `Debug` output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::exchange::SUPPORTED_EXCHANGES;
use crate::types::{ConfigError, TradingPair};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_CANCEL_ORDER_LIMIT: u32 = 3;
pub const DEFAULT_RETRIES_BEFORE_SLEEP_LIMIT: u32 = 4;
/// Better kept above 100.
pub const DEFAULT_MAX_RAM_MB: u64 = 256;
pub const DEFAULT_DASHBOARD_PORT: u16 = 8050;
pub const DEFAULT_TREND_THRESHOLD: f64 = 0.001;

/// Keys recognised in the trading options file.
pub const TRADING_KEYS: &[&str] = &[
    "DEFAULT_EXCHANGE_NAME",
    "EXCHANGE_API_KEY",
    "EXCHANGE_SECRET",
    "EXCHANGE_PASSPHRASE",
    "TRADING_PAIR",
    "TRADING_BASE",
    "TRADING_QUOTE",
    "DEFAULT_EXCHANGE_FEE",
    "PREMIUM_OVER_EXCHANGE_FEES",
    "ALGORITHM_TRUST_PERCENTAGE",
    "MIN_TRANSACTION_VALUE_IN_BASE",
    "TIMEFRAME",
    "DATA_VECTOR_LENGTH",
    "CANCEL_ORDER_LIMIT",
    "RETRIES_BEFORE_SLEEP_LIMIT",
    "BASE_SLEEP_TIME",
    "MAX_RAM_MB",
    "DRY_RUN",
    "DASHBOARD_PORT",
];

/// Keys recognised in the prediction options file.
pub const PREDICTION_KEYS: &[&str] = &[
    "PREDICTION_PROVIDER",
    "LLM_API_KEY",
    "LLM_MODEL",
    "LLM_FALLBACK_MODEL",
    "LLM_MAX_TOKENS",
    "TREND_THRESHOLD",
];

// ---------------------------------------------------------------------------
// Raw settings
// ---------------------------------------------------------------------------

/// Flat, untyped key/value view over one options file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read `path` and overlay any of `keys` present in the process
    /// environment. A missing file is not an error: the environment alone
    /// may carry every option. A `.toml` path is parsed as a flat table.
    pub fn load(path: &Path, keys: &[&str]) -> Result<Self, ConfigError> {
        let mut settings = if path.exists() {
            Self::read_file(path)?
        } else {
            warn!(path = %path.display(), "Options file not found, using process environment only");
            Self::default()
        };

        for key in keys {
            if let Ok(value) = std::env::var(key) {
                settings.values.insert((*key).to_string(), value);
            }
        }

        debug!(path = %path.display(), keys = settings.values.len(), "Options loaded");
        Ok(settings)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |message: String| ConfigError::File {
            path: path.display().to_string(),
            message,
        };

        if path.extension().is_some_and(|ext| ext == "toml") {
            let contents = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
            let table: toml::Table =
                toml::from_str(&contents).map_err(|e| file_error(e.to_string()))?;
            let values = table
                .into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        toml::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect();
            return Ok(Self { values });
        }

        let iter = dotenv::from_path_iter(path).map_err(|e| file_error(e.to_string()))?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| file_error(e.to_string()))?;
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    /// Trimmed value of `key`; blank counts as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                    key,
                    message: format!("`{raw}`: {e}"),
                })
            })
            .transpose()
    }

    fn required_parse<T>(&self, key: &'static str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse(key)?.ok_or(ConfigError::Missing(key))
    }

    fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }

    fn secret(&self, key: &str) -> SecretString {
        SecretString::new(self.get(key).unwrap_or_default().to_string())
    }
}

// ---------------------------------------------------------------------------
// Trading configuration
// ---------------------------------------------------------------------------

/// Exchange API credentials.
#[derive(Debug)]
pub struct Credentials {
    pub api_key: SecretString,
    pub secret: SecretString,
    /// Called `passphrase` on KuCoin.
    pub passphrase: SecretString,
}

/// Immutable snapshot of trading parameters, built once at startup.
#[derive(Debug)]
pub struct TradingConfig {
    pub exchange: String,
    pub credentials: Credentials,
    pub pair: TradingPair,
    /// Exchange fee per transaction (0.1% = 0.001).
    pub fee: f64,
    /// Effective premium: fee + premium over fee.
    pub premium: f64,
    /// Fraction of the free balance committed per order, in [0, 1].
    pub trust_fraction: f64,
    pub min_transaction_value_in_base: f64,
    pub timeframe: String,
    /// Number of candles handed to the oracle.
    pub window: usize,
    pub cancel_order_limit: u32,
    pub retries_before_sleep_limit: u32,
    pub base_sleep_secs: u64,
    pub max_ram_mb: u64,
    pub dry_run: bool,
    pub dashboard_port: u16,
}

impl TradingConfig {
    /// Load and validate the trading options file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Settings::load(path, TRADING_KEYS)?;
        Self::from_settings(&settings)
    }

    pub fn from_settings(s: &Settings) -> Result<Self, ConfigError> {
        let exchange = s
            .get("DEFAULT_EXCHANGE_NAME")
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !SUPPORTED_EXCHANGES.contains(&exchange.as_str()) {
            return Err(ConfigError::UnsupportedExchange {
                given: exchange,
                supported: SUPPORTED_EXCHANGES.join(", "),
            });
        }

        let pair = match s.get("TRADING_PAIR").filter(|p| p.contains('/')) {
            Some(symbol) => TradingPair::parse(symbol).ok_or(ConfigError::Invalid {
                key: "TRADING_PAIR",
                message: format!("`{symbol}` is not a BASE/QUOTE pair"),
            })?,
            None => TradingPair::new(s.required("TRADING_BASE")?, s.required("TRADING_QUOTE")?),
        };

        let fee: f64 = s.required_parse("DEFAULT_EXCHANGE_FEE")?;
        ensure_non_negative("DEFAULT_EXCHANGE_FEE", fee)?;
        let premium_over_fee: f64 = s.required_parse("PREMIUM_OVER_EXCHANGE_FEES")?;
        ensure_non_negative("PREMIUM_OVER_EXCHANGE_FEES", premium_over_fee)?;

        let trust_fraction: f64 = s.required_parse("ALGORITHM_TRUST_PERCENTAGE")?;
        if !(0.0..=1.0).contains(&trust_fraction) {
            return Err(ConfigError::Invalid {
                key: "ALGORITHM_TRUST_PERCENTAGE",
                message: format!("{trust_fraction} is outside [0, 1]"),
            });
        }

        let min_transaction_value_in_base: f64 =
            s.required_parse("MIN_TRANSACTION_VALUE_IN_BASE")?;
        ensure_non_negative("MIN_TRANSACTION_VALUE_IN_BASE", min_transaction_value_in_base)?;

        let window: usize = s.required_parse("DATA_VECTOR_LENGTH")?;
        if window == 0 {
            return Err(ConfigError::Invalid {
                key: "DATA_VECTOR_LENGTH",
                message: "window must hold at least one candle".into(),
            });
        }

        let cancel_order_limit = non_zero_or(
            s.parse("CANCEL_ORDER_LIMIT")?,
            DEFAULT_CANCEL_ORDER_LIMIT,
        );
        let retries_before_sleep_limit = non_zero_or(
            s.parse("RETRIES_BEFORE_SLEEP_LIMIT")?,
            DEFAULT_RETRIES_BEFORE_SLEEP_LIMIT,
        );
        let base_sleep_secs = non_zero_or(
            s.parse("BASE_SLEEP_TIME")?,
            default_sleep_secs(window, cancel_order_limit),
        );

        Ok(Self {
            exchange,
            credentials: Credentials {
                api_key: s.secret("EXCHANGE_API_KEY"),
                secret: s.secret("EXCHANGE_SECRET"),
                passphrase: s.secret("EXCHANGE_PASSPHRASE"),
            },
            pair,
            fee,
            premium: fee + premium_over_fee,
            trust_fraction,
            min_transaction_value_in_base,
            timeframe: s.required("TIMEFRAME")?.to_string(),
            window,
            cancel_order_limit,
            retries_before_sleep_limit,
            base_sleep_secs,
            max_ram_mb: non_zero_or(s.parse("MAX_RAM_MB")?, DEFAULT_MAX_RAM_MB),
            dry_run: s.flag("DRY_RUN"),
            dashboard_port: s.parse("DASHBOARD_PORT")?.unwrap_or(DEFAULT_DASHBOARD_PORT),
        })
    }
}

/// `min(max(window / 2, cancel_limit), 5)` minutes.
pub fn default_sleep_secs(window: usize, cancel_order_limit: u32) -> u64 {
    let half_window = (window / 2) as u64;
    half_window.max(cancel_order_limit as u64).min(5) * 60
}

fn non_zero_or<T: Default + PartialEq>(value: Option<T>, default: T) -> T {
    match value {
        Some(v) if v != T::default() => v,
        _ => default,
    }
}

fn ensure_non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            message: format!("{value} must be a non-negative number"),
        })
    }
}

// ---------------------------------------------------------------------------
// Prediction configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionProvider {
    OpenRouter,
    Trend,
}

#[derive(Debug)]
pub struct PredictionConfig {
    pub provider: PredictionProvider,
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub trend_threshold: f64,
}

impl PredictionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = Settings::load(path, PREDICTION_KEYS)?;
        Self::from_settings(&settings)
    }

    /// Without an API key the trend oracle is selected regardless of
    /// `PREDICTION_PROVIDER`.
    pub fn from_settings(s: &Settings) -> Result<Self, ConfigError> {
        let api_key = s.get("LLM_API_KEY").map(|k| SecretString::new(k.to_string()));

        let requested = match s.get("PREDICTION_PROVIDER").map(str::to_ascii_lowercase) {
            None => None,
            Some(p) if p == "openrouter" => Some(PredictionProvider::OpenRouter),
            Some(p) if p == "trend" => Some(PredictionProvider::Trend),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "PREDICTION_PROVIDER",
                    message: format!("`{other}` (expected `openrouter` or `trend`)"),
                })
            }
        };

        let provider = match (requested, api_key.is_some()) {
            (Some(PredictionProvider::Trend), _) | (_, false) => PredictionProvider::Trend,
            _ => PredictionProvider::OpenRouter,
        };

        let trend_threshold = s
            .parse("TREND_THRESHOLD")?
            .unwrap_or(DEFAULT_TREND_THRESHOLD);
        ensure_non_negative("TREND_THRESHOLD", trend_threshold)?;

        Ok(Self {
            provider,
            api_key,
            model: s.get("LLM_MODEL").map(str::to_string),
            fallback_model: s.get("LLM_FALLBACK_MODEL").map(str::to_string),
            max_tokens: s.parse("LLM_MAX_TOKENS")?,
            trend_threshold,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
