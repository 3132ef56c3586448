use std::env;

/// Process configuration, loaded once at startup from the environment.
///
/// A `.env` file is loaded first if present (missing is not an error); real
/// environment variables always take precedence over values in `.env`
/// because `dotenvy::dotenv()` never overwrites variables already set.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub tcp_port: u16,
    pub redis_url: String,
    pub log_level: String,
    /// Reserved for the archive collaborator (not implemented; see
    /// `crate::archive`). Carried so the env surface matches the boundary
    /// interface named by the original source.
    pub object_store_endpoint: Option<String>,
    pub object_store_access_key: Option<String>,
    pub object_store_secret_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(_) | Err(dotenvy::Error::Io(_)) => {}
            Err(err) => tracing::warn!(%err, "failed to parse .env file"),
        }

        Self {
            http_port: get_env_int("HTTP_PORT", 4050),
            tcp_port: get_env_int("TCP_PORT", 4040),
            redis_url: get_env("REDIS_URL", "redis://redis:6379"),
            log_level: get_env("LOG_LEVEL", "info"),
            object_store_endpoint: env::var("MINIO_ENDPOINT").ok(),
            object_store_access_key: env::var("MINIO_ACCESS_KEY").ok(),
            object_store_secret_key: env::var("MINIO_SECRET_KEY").ok(),
        }
    }

    pub fn http_addr(&self) -> String {
        format!("0.0.0.0:{}", self.http_port)
    }

    pub fn tcp_addr(&self) -> String {
        format!("0.0.0.0:{}", self.tcp_port)
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn get_env_int(key: &str, default: u16) -> u16 {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value, "invalid integer env var, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn get_env_falls_back_to_default_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("HEARTH_TEST_STRING");
        assert_eq!(get_env("HEARTH_TEST_STRING", "fallback"), "fallback");
    }

    #[test]
    fn get_env_int_falls_back_on_garbage_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("HEARTH_TEST_INT", "not-a-number");
        assert_eq!(get_env_int("HEARTH_TEST_INT", 42), 42);
        env::remove_var("HEARTH_TEST_INT");
    }

    #[test]
    fn get_env_int_parses_set_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("HEARTH_TEST_INT2", "9000");
        assert_eq!(get_env_int("HEARTH_TEST_INT2", 42), 9000);
        env::remove_var("HEARTH_TEST_INT2");
    }
}
