use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

/// Process-wide configuration sourced from the environment (§6 Configuration).
///
/// Follows the teacher ecosystem's convention of plain constructor/builder structs rather than a
/// config-framework dependency: [`CoreConfig::from_env`] reads `std::env` directly and falls back
/// to sane paper-trading defaults when a variable is unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub paper_trading_mode: bool,
    pub default_wallet_balance: Decimal,
    pub reset_balance: Decimal,
    pub max_notional_per_order: Option<Decimal>,
    pub max_account_leverage: Decimal,
    pub max_position_notional_per_symbol: Decimal,
    pub max_derivative_notional: Decimal,
    pub max_single_instrument_concentration: Decimal,
    pub min_margin_buffer_ratio: Decimal,
    pub feed_max_tick_age_ms: u64,
    pub feed_min_tick_rate: f64,
    pub feed_min_active_tokens: usize,
    pub fill_tick_max_age_seconds: u64,
    pub fill_slippage_bps_equity: u32,
    pub fill_slippage_bps_futures: u32,
    pub fill_slippage_bps_options: u32,
    pub prewarm_instrument_keys: Vec<String>,
    pub broker_ws_url: Option<String>,
    pub broker_access_token: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            paper_trading_mode: true,
            default_wallet_balance: Decimal::new(1_000_000, 0),
            reset_balance: Decimal::new(1_000_000, 0),
            max_notional_per_order: Some(Decimal::new(2_000_000, 0)),
            max_account_leverage: Decimal::new(5, 0),
            max_position_notional_per_symbol: Decimal::new(5_000_000, 0),
            max_derivative_notional: Decimal::new(10_000_000, 0),
            max_single_instrument_concentration: Decimal::new(40, 2),
            min_margin_buffer_ratio: Decimal::new(12, 1),
            feed_max_tick_age_ms: 5_000,
            feed_min_tick_rate: 0.5,
            feed_min_active_tokens: 3,
            fill_tick_max_age_seconds: 8,
            fill_slippage_bps_equity: 5,
            fill_slippage_bps_futures: 10,
            fill_slippage_bps_options: 15,
            prewarm_instrument_keys: Vec::new(),
            broker_ws_url: None,
            broker_access_token: None,
        }
    }
}

impl CoreConfig {
    /// Build a [`CoreConfig`] from environment variables, defaulting any that are unset or
    /// unparsable to the value a new paper-trading account should start with.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            paper_trading_mode: env_parse("PAPER_TRADING_MODE", defaults.paper_trading_mode),
            default_wallet_balance: env_parse(
                "DEFAULT_WALLET_BALANCE",
                defaults.default_wallet_balance,
            ),
            reset_balance: env_parse("RESET_BALANCE", defaults.reset_balance),
            max_notional_per_order: env::var("MAX_NOTIONAL_PER_ORDER")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .map(Some)
                .unwrap_or(defaults.max_notional_per_order),
            max_account_leverage: env_parse(
                "MAX_ACCOUNT_LEVERAGE",
                defaults.max_account_leverage,
            ),
            max_position_notional_per_symbol: env_parse(
                "MAX_POSITION_NOTIONAL_PER_SYMBOL",
                defaults.max_position_notional_per_symbol,
            ),
            max_derivative_notional: env_parse(
                "MAX_DERIVATIVE_NOTIONAL",
                defaults.max_derivative_notional,
            ),
            max_single_instrument_concentration: env_parse(
                "MAX_SINGLE_INSTRUMENT_CONCENTRATION",
                defaults.max_single_instrument_concentration,
            ),
            min_margin_buffer_ratio: env_parse(
                "MIN_MARGIN_BUFFER_RATIO",
                defaults.min_margin_buffer_ratio,
            ),
            feed_max_tick_age_ms: env_parse("FEED_MAX_TICK_AGE_MS", defaults.feed_max_tick_age_ms),
            feed_min_tick_rate: env_parse("FEED_MIN_TICK_RATE", defaults.feed_min_tick_rate),
            feed_min_active_tokens: env_parse(
                "FEED_MIN_ACTIVE_TOKENS",
                defaults.feed_min_active_tokens,
            ),
            fill_tick_max_age_seconds: env_parse(
                "FILL_TICK_MAX_AGE_SECONDS",
                defaults.fill_tick_max_age_seconds,
            ),
            fill_slippage_bps_equity: env_parse(
                "FILL_SLIPPAGE_BPS_EQUITY",
                defaults.fill_slippage_bps_equity,
            ),
            fill_slippage_bps_futures: env_parse(
                "FILL_SLIPPAGE_BPS_FUTURES",
                defaults.fill_slippage_bps_futures,
            ),
            fill_slippage_bps_options: env_parse(
                "FILL_SLIPPAGE_BPS_OPTIONS",
                defaults.fill_slippage_bps_options,
            ),
            prewarm_instrument_keys: env::var("PREWARM_INSTRUMENT_KEYS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.prewarm_instrument_keys),
            broker_ws_url: env::var("BROKER_WS_URL").ok().or(defaults.broker_ws_url),
            broker_access_token: env::var("BROKER_ACCESS_TOKEN")
                .ok()
                .or(defaults.broker_access_token),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
