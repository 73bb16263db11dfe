//! Server configuration: programmatic defaults, then an optional TOML
//! file, then environment variables, with CLI flags applied last by the
//! caller.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    SingleUser,
    MultiUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    pub issuer_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub mode: AuthMode,
    pub port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub data_path: String,
    #[serde(default)]
    pub session_secret: Option<String>,
    #[serde(default)]
    pub oidc: Option<OidcConfig>,
}

fn default_prefix() -> String {
    "/v1".to_string()
}

impl ServerConfig {
    /// Loads defaults + an optional file at `API_STORE_CONFIG` (or
    /// `config/api-store.toml` if present) + `API_STORE__`-prefixed env
    /// vars, using `__` as the nesting separator for env-var overrides.
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("API_STORE_CONFIG").unwrap_or_else(|_| "config/api-store.toml".to_string());

        let builder = config::Config::builder()
            .set_default("mode", "single-user")?
            .set_default("port", 8080_i64)?
            .set_default("prefix", "/v1")?
            .set_default("data_path", "./data")?;

        let path = std::path::Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("API_STORE").separator("__"))
            .build()?;

        let mut parsed: Self = built.try_deserialize()?;

        // SESSION_SECRET / OIDC_CLIENT_SECRET are read unprefixed, not nested
        // under API_STORE__, since they're also how an operator overrides a
        // secret without touching the rest of the config.
        if let Ok(secret) = std::env::var("SESSION_SECRET") {
            parsed.session_secret = Some(secret);
        }
        if let (Some(oidc), Ok(secret)) = (parsed.oidc.as_mut(), std::env::var("OIDC_CLIENT_SECRET")) {
            oidc.client_secret = secret;
        }
        Ok(parsed)
    }
}
