use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub user_service_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub services: ServicesConfig,
}

/// Loads configuration from the process environment.
pub fn load() -> Result<AppConfig> {
    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup<F>(lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

    let port = or_default("SERVER_PORT", "3000");
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid SERVER_PORT '{port}'"))?;

    let max_connections = or_default("DATABASE_MAX_CONNECTIONS", "10");
    let max_connections = max_connections
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| anyhow!("Invalid DATABASE_MAX_CONNECTIONS '{max_connections}'"))?;

    let url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

    Ok(AppConfig {
        server: ServerConfig {
            host: or_default("SERVER_HOST", "0.0.0.0"),
            port,
        },
        database: DatabaseConfig {
            url,
            max_connections,
        },
        services: ServicesConfig {
            user_service_url: or_default(
                "USER_SERVICE_URL",
                "http://localhost:3000/user-service",
            )
            .trim_end_matches('/')
            .to_string(),
        },
    })
}
