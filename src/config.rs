use anyhow::{Context, Result};
use std::env;

const DEFAULT_DATABASE_URL: &str = "sqlite:data/parlaydesk.db";
const DEFAULT_REFERENCE_SPORTSBOOK: &str = "DraftKings";
const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2/everything";
const DEFAULT_LLM_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4-20250514";

/// Runtime settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub api_host: String,
    pub api_port: u16,
    /// Sportsbook whose lines settle spread, total and prop legs.
    pub reference_sportsbook: String,
    pub sweep_interval_secs: Option<u64>,
    pub odds_api_key: Option<String>,
    pub odds_api_sport: String,
    pub odds_api_regions: String,
    pub odds_refresh_hours: i64,
    /// NewsAPI-compatible `everything` endpoint; ingestion is off without a key.
    pub news_api_url: String,
    pub news_api_key: Option<String>,
    pub news_query: String,
    /// Anthropic Messages-compatible endpoint; analysis is off without a key.
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub analysis_cache_hours: i64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            reference_sportsbook: DEFAULT_REFERENCE_SPORTSBOOK.to_string(),
            sweep_interval_secs: None,
            odds_api_key: None,
            odds_api_sport: "icehockey_nhl".to_string(),
            odds_api_regions: "us".to_string(),
            odds_refresh_hours: 6,
            news_api_url: DEFAULT_NEWS_API_URL.to_string(),
            news_api_key: None,
            news_query: "NHL".to_string(),
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            llm_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            analysis_cache_hours: 24,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup so parsing can be tested
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_port = match get("API_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("API_PORT must be a port number, got '{raw}'"))?,
            None => defaults.api_port,
        };

        let sweep_interval_secs = match get("SWEEP_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("SWEEP_INTERVAL_SECS must be an integer, got '{raw}'"))?;
                (secs > 0).then_some(secs)
            }
            None => None,
        };

        let odds_refresh_hours = match get("ODDS_REFRESH_HOURS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("ODDS_REFRESH_HOURS must be an integer, got '{raw}'"))?,
            None => defaults.odds_refresh_hours,
        };

        let analysis_cache_hours = match get("ANALYSIS_CACHE_HOURS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("ANALYSIS_CACHE_HOURS must be an integer, got '{raw}'"))?,
            None => defaults.analysis_cache_hours,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            api_host: get("API_HOST").unwrap_or(defaults.api_host),
            api_port,
            reference_sportsbook: get("REFERENCE_SPORTSBOOK").unwrap_or(defaults.reference_sportsbook),
            sweep_interval_secs,
            odds_api_key: get("ODDS_API_KEY"),
            odds_api_sport: get("ODDS_API_SPORT").unwrap_or(defaults.odds_api_sport),
            odds_api_regions: get("ODDS_API_REGIONS").unwrap_or(defaults.odds_api_regions),
            odds_refresh_hours,
            news_api_url: get("NEWS_API_URL").unwrap_or(defaults.news_api_url),
            news_api_key: get("NEWS_API_KEY"),
            news_query: get("NEWS_QUERY").unwrap_or(defaults.news_query),
            llm_api_url: get("LLM_API_URL").unwrap_or(defaults.llm_api_url),
            llm_api_key: get("LLM_API_KEY").or_else(|| get("ANTHROPIC_API_KEY")),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            analysis_cache_hours,
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.reference_sportsbook, "DraftKings");
        assert_eq!(settings.api_port, 8000);
        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
        assert!(settings.sweep_interval_secs.is_none());
        assert!(settings.odds_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("REFERENCE_SPORTSBOOK", "FanDuel"),
            ("API_PORT", "9100"),
            ("SWEEP_INTERVAL_SECS", "300"),
            ("ODDS_API_KEY", "abc"),
        ]))
        .unwrap();
        assert_eq!(settings.reference_sportsbook, "FanDuel");
        assert_eq!(settings.api_port, 9100);
        assert_eq!(settings.sweep_interval_secs, Some(300));
        assert_eq!(settings.odds_api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_zero_interval_disables_sweeping() {
        let settings = Settings::from_lookup(lookup(&[("SWEEP_INTERVAL_SECS", "0")])).unwrap();
        assert!(settings.sweep_interval_secs.is_none());
    }

    #[test]
    fn test_llm_key_falls_back_to_anthropic_key() {
        let settings = Settings::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "sk-a")])).unwrap();
        assert_eq!(settings.llm_api_key.as_deref(), Some("sk-a"));
        assert_eq!(settings.llm_api_url, DEFAULT_LLM_API_URL);
        assert!(settings.news_api_key.is_none());

        let settings = Settings::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-a"),
            ("LLM_API_KEY", "sk-b"),
            ("ANALYSIS_CACHE_HOURS", "6"),
        ]))
        .unwrap();
        assert_eq!(settings.llm_api_key.as_deref(), Some("sk-b"));
        assert_eq!(settings.analysis_cache_hours, 6);
    }

    #[test]
    fn test_bad_port_is_an_error() {
        assert!(Settings::from_lookup(lookup(&[("API_PORT", "eighty")])).is_err());
    }
}
