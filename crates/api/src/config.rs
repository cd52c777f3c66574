use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

/// Startup configuration problems. The binary refuses to start on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Tunables for the relay core.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Silence after the last heartbeat before a device is declared offline.
    pub presence_timeout: Duration,
    /// Upper bound on a single device registry call.
    pub registry_timeout: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Interval between WebSocket liveness sweeps.
    pub ping_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::from_secs(30),
            registry_timeout: Duration::from_secs(5),
            outbound_buffer: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Tunables for the schedule dispatcher.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub tick: Duration,
    /// Zone in which schedule `HH:MM` values and weekdays are read.
    pub timezone: Tz,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            timezone: Tz::UTC,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on each post-shutdown cleanup step, in seconds (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// Postgres connection string. Unset means the in-memory registry.
    pub database_url: Option<String>,
    pub relay: RelayConfig,
    pub schedule: ScheduleConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `8000`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:8081` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `10`                    |
    /// | `PRESENCE_TIMEOUT_SECS`  | `30`                    |
    /// | `WS_PING_INTERVAL_SECS`  | `30`                    |
    /// | `OUTBOUND_BUFFER`        | `64`                    |
    /// | `REGISTRY_TIMEOUT_SECS`  | `5`                     |
    /// | `SCHEDULE_TICK_SECS`     | `60` (at most `60`)     |
    /// | `SCHEDULE_TIMEZONE`      | `UTC`                   |
    /// | `DATABASE_URL`           | unset                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let host = env.string("HOST", "0.0.0.0");
        let port: u16 = env.parse("PORT", 8000)?;

        let cors_origins: Vec<String> = env
            .string("CORS_ORIGINS", "http://localhost:8081")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env.positive("REQUEST_TIMEOUT_SECS", 30)?;
        let shutdown_timeout_secs = env.positive("SHUTDOWN_TIMEOUT_SECS", 10)?;

        let relay = RelayConfig {
            presence_timeout: Duration::from_secs(env.positive("PRESENCE_TIMEOUT_SECS", 30)?),
            registry_timeout: Duration::from_secs(env.positive("REGISTRY_TIMEOUT_SECS", 5)?),
            outbound_buffer: env.positive("OUTBOUND_BUFFER", 64)?,
            ping_interval: Duration::from_secs(env.positive("WS_PING_INTERVAL_SECS", 30)?),
        };

        // Schedules match whole minutes, so a longer tick would step over slots.
        let tick_secs: u64 = env.positive("SCHEDULE_TICK_SECS", 60)?;
        if tick_secs > 60 {
            return Err(ConfigError::Invalid {
                var: "SCHEDULE_TICK_SECS",
                value: tick_secs.to_string(),
            });
        }

        let schedule = ScheduleConfig {
            tick: Duration::from_secs(tick_secs),
            timezone: env.parse("SCHEDULE_TIMEZONE", Tz::UTC)?,
        };

        let database_url = env.get("DATABASE_URL").filter(|url| !url.is_empty());

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            relay,
            schedule,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, var: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(var) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value }),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialEq + Default,
    {
        let value = self.parse(var, default)?;
        if value == T::default() {
            return Err(ConfigError::Zero { var });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.cors_origins, vec!["http://localhost:8081"]);
        assert_eq!(config.relay.presence_timeout, Duration::from_secs(30));
        assert_eq!(config.relay.outbound_buffer, 64);
        assert_eq!(config.schedule.timezone, Tz::UTC);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("PORT", "9100"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("PRESENCE_TIMEOUT_SECS", "12"),
            ("SCHEDULE_TIMEZONE", "Asia/Seoul"),
            ("DATABASE_URL", "postgres://localhost/latchkey"),
        ])
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.relay.presence_timeout, Duration::from_secs(12));
        assert_eq!(config.schedule.timezone, chrono_tz::Asia::Seoul);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/latchkey")
        );
    }

    #[test]
    fn zero_durations_are_rejected() {
        assert_matches!(
            load(&[("PRESENCE_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Zero { var: "PRESENCE_TIMEOUT_SECS" })
        );
        assert_matches!(
            load(&[("OUTBOUND_BUFFER", "0")]),
            Err(ConfigError::Zero { var: "OUTBOUND_BUFFER" })
        );
    }

    #[test]
    fn garbage_is_reported_with_variable_name() {
        assert_matches!(
            load(&[("SCHEDULE_TIMEZONE", "Mars/Olympus")]),
            Err(ConfigError::Invalid { var: "SCHEDULE_TIMEZONE", .. })
        );
        assert_matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        );
    }

    #[test]
    fn schedule_tick_longer_than_a_minute_is_rejected() {
        assert_matches!(
            load(&[("SCHEDULE_TICK_SECS", "120")]),
            Err(ConfigError::Invalid { var: "SCHEDULE_TICK_SECS", value }) if value == "120"
        );
        let config = load(&[("SCHEDULE_TICK_SECS", "60")]).unwrap();
        assert_eq!(config.schedule.tick, Duration::from_secs(60));
        let config = load(&[("SCHEDULE_TICK_SECS", "15")]).unwrap();
        assert_eq!(config.schedule.tick, Duration::from_secs(15));
    }

    #[test]
    fn empty_database_url_means_in_memory() {
        assert!(load(&[("DATABASE_URL", "")]).unwrap().database_url.is_none());
    }
}
