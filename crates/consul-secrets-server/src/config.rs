// SPDX-License-Identifier: AGPL-3.0-only
use clap::{Parser, ValueEnum};
use consul_secrets::{ClientOptions, MountConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// JSON structured logging for log aggregation (ELK, Loki).
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "consul-secrets",
    version,
    about = "Dynamic Consul ACL token secrets engine"
)]
pub struct Args {
    /// Listen address for the secrets API.
    #[arg(long, env = "CONSUL_SECRETS_LISTEN_API", default_value = "127.0.0.1:8200")]
    pub listen_api: SocketAddr,

    /// Listen address for HTTP health checks and Prometheus metrics (e.g., 127.0.0.1:8080).
    #[arg(long, env = "CONSUL_SECRETS_LISTEN_HTTP")]
    pub listen_http: Option<SocketAddr>,

    /// Log output format: text or json.
    #[arg(long, env = "CONSUL_SECRETS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log filter directive; RUST_LOG takes precedence when set.
    #[arg(long, env = "CONSUL_SECRETS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Lease TTL for roles that leave `ttl` unset (e.g., 1h, 30m).
    #[arg(long, env = "CONSUL_SECRETS_DEFAULT_LEASE_TTL", value_parser = humantime::parse_duration, default_value = "1h")]
    pub default_lease_ttl: Duration,

    /// Upper bound for every lease issued by this mount.
    #[arg(long, env = "CONSUL_SECRETS_MAX_LEASE_TTL", value_parser = humantime::parse_duration, default_value = "24h")]
    pub max_lease_ttl: Duration,

    /// Timeout for each request to Consul, in milliseconds.
    #[arg(long, env = "CONSUL_SECRETS_CONSUL_TIMEOUT_MS", default_value_t = 5000)]
    pub consul_timeout_ms: u64,

    /// First word of the description of every created token.
    #[arg(long, env = "CONSUL_SECRETS_DESCRIPTION_PREFIX", default_value = "consul-secrets")]
    pub description_prefix: String,
}

impl Args {
    pub fn mount_config(&self) -> MountConfig {
        MountConfig {
            default_lease_ttl: self.default_lease_ttl,
            max_lease_ttl: self.max_lease_ttl,
            description_prefix: self.description_prefix.clone(),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout_ms: self.consul_timeout_ms,
            ..ClientOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["consul-secrets"]).unwrap();
        assert_eq!(args.listen_api, "127.0.0.1:8200".parse().unwrap());
        assert!(args.listen_http.is_none());
        assert_eq!(args.log_format, LogFormat::Text);

        let mount = args.mount_config();
        assert_eq!(mount.default_lease_ttl, Duration::from_secs(3600));
        assert_eq!(mount.max_lease_ttl, Duration::from_secs(86400));
        assert_eq!(mount.description_prefix, "consul-secrets");
        assert_eq!(args.client_options().timeout_ms, 5000);
    }

    #[test]
    fn human_durations() {
        let args = Args::try_parse_from([
            "consul-secrets",
            "--default-lease-ttl",
            "15m",
            "--max-lease-ttl",
            "2h 30m",
        ])
        .unwrap();
        assert_eq!(args.default_lease_ttl, Duration::from_secs(900));
        assert_eq!(args.max_lease_ttl, Duration::from_secs(9000));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let result = Args::try_parse_from(["consul-secrets", "--max-lease-ttl", "forever"]);
        assert!(result.is_err());
    }

    #[test]
    fn json_log_format() {
        let args = Args::try_parse_from(["consul-secrets", "--log-format", "json"]).unwrap();
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
