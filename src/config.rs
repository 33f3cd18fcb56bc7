use std::env;
use std::path::PathBuf;
use std::time::Duration;
use log::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub socket:         PathBuf,
    pub version:        String,
    pub store:          String,
    pub store_options:  String,
    pub retry_delay:    Duration,
    pub drain_interval: Duration,
    pub buffer_limit:   Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket:         PathBuf::from("/var/run/docker.sock"),
            version:        "v1.32".to_owned(),
            store:          "influx".to_owned(),
            store_options:  String::new(),
            retry_delay:    Duration::from_secs(5),
            drain_interval: Duration::from_secs(60),
            buffer_limit:   None,
        }
    }
}

impl Config {
    /// Defaults overridden by `DOCKER_SOCKET`, `DOCKER_VERSION`,
    /// `DATA_STORE` and `STORE_OPTIONS`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    pub fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Self {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(socket) = var("DOCKER_SOCKET") {
            config.socket = PathBuf::from(socket);
        }

        if let Some(version) = var("DOCKER_VERSION") {
            config.version = version;
        }

        if let Some(store) = var("DATA_STORE") {
            config.store = store.trim().to_ascii_lowercase();
        }

        if let Some(options) = var("STORE_OPTIONS") {
            config.store_options = options;
        }

        if let Some(limit) = var("BUFFER_LIMIT") {
            match limit.parse() {
                Ok(limit) => config.buffer_limit = Some(limit),
                Err(_)    => warn!("ignoring invalid BUFFER_LIMIT {}", limit),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.store, "influx");
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.buffer_limit, None);
    }

    #[test]
    fn environment_overrides() {
        let config = config(&[
            ("DOCKER_SOCKET",  "/run/docker.sock"),
            ("DOCKER_VERSION", "v1.41"),
            ("DATA_STORE",     " Prometheus "),
            ("STORE_OPTIONS",  "endpoint=http://prom/api/v1/write"),
            ("BUFFER_LIMIT",   "1000"),
        ]);

        assert_eq!(config.socket, PathBuf::from("/run/docker.sock"));
        assert_eq!(config.version, "v1.41");
        assert_eq!(config.store, "prometheus");
        assert_eq!(config.store_options, "endpoint=http://prom/api/v1/write");
        assert_eq!(config.buffer_limit, Some(1000));
    }

    #[test]
    fn blank_and_invalid_values_ignored() {
        let config = config(&[("DATA_STORE", "  "), ("BUFFER_LIMIT", "lots")]);
        assert_eq!(config.store, "influx");
        assert_eq!(config.buffer_limit, None);
    }
}
