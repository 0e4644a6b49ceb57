use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub bind_address: String,
    pub scheduling: SchedulingConfig,
}

/// Tunables for availability computation and booking.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Days covered by an availability query that names no end date.
    pub availability_window_days: u32,
    /// Longest range a single availability query may span.
    pub availability_max_range_days: u32,
    /// Zero disables the availability cache.
    pub availability_cache_ttl_secs: u64,
    pub storage_timeout_secs: u64,
    pub max_appointment_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            availability_window_days: 7,
            availability_max_range_days: 62,
            availability_cache_ttl_secs: 30,
            storage_timeout_secs: 10,
            max_appointment_minutes: 480,
        }
    }
}

impl SchedulingConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.availability_cache_ttl_secs)
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            availability_window_days: parse_or("AVAILABILITY_WINDOW_DAYS", defaults.availability_window_days),
            availability_max_range_days: parse_or("AVAILABILITY_MAX_RANGE_DAYS", defaults.availability_max_range_days),
            availability_cache_ttl_secs: parse_or("AVAILABILITY_CACHE_TTL_SECS", defaults.availability_cache_ttl_secs),
            storage_timeout_secs: parse_or("STORAGE_TIMEOUT_SECS", defaults.storage_timeout_secs),
            max_appointment_minutes: parse_or("MAX_APPOINTMENT_MINUTES", defaults.max_appointment_minutes),
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
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            scheduling: SchedulingConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty() && self.is_storage_configured()
    }

    pub fn is_storage_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
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
    fn scheduling_defaults() {
        let config = SchedulingConfig::default();
        assert_eq!(config.availability_window_days, 7);
        assert_eq!(config.storage_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn storage_requires_all_supabase_settings() {
        let config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: "secret".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            scheduling: SchedulingConfig::default(),
        };
        assert!(!config.is_storage_configured());
        assert!(!config.is_configured());
    }
}
