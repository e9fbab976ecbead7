use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_MAX_RANGE_DAYS: i64 = 90;
pub const DEFAULT_SLOT_DURATION_MINUTES: i64 = 30;
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Longest inclusive date range a slot query may span.
    pub max_range_days: i64,
    pub default_slot_duration_minutes: i64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
            default_slot_duration_minutes: DEFAULT_SLOT_DURATION_MINUTES,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            max_range_days: parse_or_default("AVAILABILITY_MAX_RANGE_DAYS", DEFAULT_MAX_RANGE_DAYS),
            default_slot_duration_minutes: parse_or_default(
                "DEFAULT_SLOT_DURATION_MINUTES",
                DEFAULT_SLOT_DURATION_MINUTES,
            ),
            port: parse_or_default("PORT", DEFAULT_PORT),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.max_range_days, 90);
        assert_eq!(config.default_slot_duration_minutes, 30);
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_is_configured_requires_supabase_fields() {
        let config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            ..AppConfig::default()
        };
        assert!(config.is_configured());
    }

    #[test]
    fn test_parse_or_default_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "ninety");
        assert_eq!(parse_or_default("SHARED_CONFIG_TEST_GARBAGE", 90i64), 90);
        env::set_var("SHARED_CONFIG_TEST_VALID", " 14 ");
        assert_eq!(parse_or_default("SHARED_CONFIG_TEST_VALID", 90i64), 14);
        assert_eq!(parse_or_default("SHARED_CONFIG_TEST_MISSING", 7u16), 7);
    }
}
