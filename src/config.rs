use crate::domain::Amount;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub min_bet: Amount,
    pub max_bet: Amount,
    pub majority_share: Amount,
    pub paid_ranks: u32,
    pub withdrawal_fee: Amount,
    pub min_withdrawal: Amount,
    pub max_withdrawal: Amount,
    pub max_daily_withdrawal: Amount,
    pub default_commission_rate: Amount,
    /// Base URL of the signer collaborator; absent means withdrawal state
    /// is driven purely by the callback endpoints.
    pub signer_url: Option<String>,
    pub allowed_game_types: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let min_bet = parse_amount_var(&env_map, "MIN_BET", "0.001")?;
        let max_bet = parse_amount_var(&env_map, "MAX_BET", "10.0")?;
        let majority_share = parse_amount_var(&env_map, "MAJORITY_SHARE", "0.70")?;
        let one = Amount::new(rust_decimal::Decimal::ONE);
        if !majority_share.is_positive() || majority_share >= one {
            return Err(ConfigError::InvalidValue(
                "MAJORITY_SHARE".to_string(),
                "must be between 0 and 1 exclusive".to_string(),
            ));
        }

        let paid_ranks = env_map
            .get("PAID_RANKS")
            .map(|s| s.as_str())
            .unwrap_or("3")
            .parse::<u32>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PAID_RANKS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let withdrawal_fee = parse_amount_var(&env_map, "WITHDRAWAL_FEE", "0.0005")?;
        let min_withdrawal = parse_amount_var(&env_map, "MIN_WITHDRAWAL", "0.01")?;
        let max_withdrawal = parse_amount_var(&env_map, "MAX_WITHDRAWAL", "100.0")?;
        let max_daily_withdrawal = parse_amount_var(&env_map, "MAX_DAILY_WITHDRAWAL", "100.0")?;
        let default_commission_rate =
            parse_amount_var(&env_map, "DEFAULT_COMMISSION_RATE", "0.05")?;

        let signer_url = env_map.get("SIGNER_URL").cloned().filter(|s| !s.is_empty());

        let allowed_game_types = env_map
            .get("ALLOWED_GAME_TYPES")
            .map(|s| s.as_str())
            .unwrap_or("skill_match,tournament,practice")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            port,
            database_path,
            min_bet,
            max_bet,
            majority_share,
            paid_ranks,
            withdrawal_fee,
            min_withdrawal,
            max_withdrawal,
            max_daily_withdrawal,
            default_commission_rate,
            signer_url,
            allowed_game_types,
        })
    }
}

fn parse_amount_var(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Amount, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    Amount::from_str_canonical(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a valid decimal".to_string())
    })
}
