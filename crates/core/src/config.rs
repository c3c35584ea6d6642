use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub wa: WaConfig,
    pub server: ServerConfig,
    pub transcripts: TranscriptsConfig,
    pub business: BusinessConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    /// Model used for the primary inference attempt.
    pub model: String,
    /// Cheaper model used for the single degraded retry.
    pub fallback_model: String,
    pub timeout_secs: u64,
    /// Deadline for the retry attempt; must be strictly shorter than
    /// `timeout_secs`.
    pub retry_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    /// How many recent messages are sent to the provider per turn.
    pub history_window: usize,
}

#[derive(Clone, Debug)]
pub struct WaConfig {
    pub api_base_url: String,
    pub access_token: SecretString,
    pub phone_number_id: String,
    /// Shared token echoed back during the webhook verification handshake.
    pub verify_token: Option<String>,
    /// Destination that receives handoff notifications and post-handoff
    /// forwards.
    pub operator_number: Option<String>,
    /// Sandbox mode suppresses all outbound sends without touching state or
    /// transcript logic.
    pub sandbox: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    /// Shared secret for the debug surface; absent means the surface is open.
    pub debug_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TranscriptsConfig {
    pub dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct BusinessConfig {
    pub name: String,
    /// Static facts injected verbatim into the inference instructions.
    pub facts: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o".to_string(),
                fallback_model: "gpt-4o-mini".to_string(),
                timeout_secs: 12,
                retry_timeout_secs: 6,
                retry_backoff_ms: 500,
                history_window: 6,
            },
            wa: WaConfig {
                api_base_url: "https://graph.facebook.com/v19.0".to_string(),
                access_token: String::new().into(),
                phone_number_id: String::new(),
                verify_token: None,
                operator_number: None,
                sandbox: true,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                health_check_port: 8081,
                debug_token: None,
            },
            transcripts: TranscriptsConfig { dir: PathBuf::from("transcripts") },
            business: BusinessConfig {
                name: "Cortinas del Litoral".to_string(),
                facts: "Vendemos cortinas roller, bandas verticales y toldos a medida. \
                        Trabajamos en Rosario y alrededores. Los presupuestos requieren \
                        una visita de medición sin cargo."
                    .to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("telar.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(fallback_model) = llm.fallback_model {
                self.llm.fallback_model = fallback_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(retry_timeout_secs) = llm.retry_timeout_secs {
                self.llm.retry_timeout_secs = retry_timeout_secs;
            }
            if let Some(retry_backoff_ms) = llm.retry_backoff_ms {
                self.llm.retry_backoff_ms = retry_backoff_ms;
            }
            if let Some(history_window) = llm.history_window {
                self.llm.history_window = history_window;
            }
        }

        if let Some(wa) = patch.wa {
            if let Some(api_base_url) = wa.api_base_url {
                self.wa.api_base_url = api_base_url;
            }
            if let Some(wa_access_token_value) = wa.access_token {
                self.wa.access_token = secret_value(wa_access_token_value);
            }
            if let Some(phone_number_id) = wa.phone_number_id {
                self.wa.phone_number_id = phone_number_id;
            }
            if let Some(verify_token) = wa.verify_token {
                self.wa.verify_token = Some(verify_token);
            }
            if let Some(operator_number) = wa.operator_number {
                self.wa.operator_number = Some(operator_number);
            }
            if let Some(sandbox) = wa.sandbox {
                self.wa.sandbox = sandbox;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(debug_token) = server.debug_token {
                self.server.debug_token = Some(debug_token);
            }
        }

        if let Some(transcripts) = patch.transcripts {
            if let Some(dir) = transcripts.dir {
                self.transcripts.dir = dir;
            }
        }

        if let Some(business) = patch.business {
            if let Some(name) = business.name {
                self.business.name = name;
            }
            if let Some(facts) = business.facts {
                self.business.facts = facts;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TELAR_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("TELAR_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TELAR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TELAR_LLM_FALLBACK_MODEL") {
            self.llm.fallback_model = value;
        }
        if let Some(value) = read_env("TELAR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TELAR_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELAR_LLM_RETRY_TIMEOUT_SECS") {
            self.llm.retry_timeout_secs = parse_u64("TELAR_LLM_RETRY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TELAR_LLM_RETRY_BACKOFF_MS") {
            self.llm.retry_backoff_ms = parse_u64("TELAR_LLM_RETRY_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_env("TELAR_LLM_HISTORY_WINDOW") {
            self.llm.history_window = parse_usize("TELAR_LLM_HISTORY_WINDOW", &value)?;
        }

        if let Some(value) = read_env("TELAR_WA_API_BASE_URL") {
            self.wa.api_base_url = value;
        }
        if let Some(value) = read_env("TELAR_WA_ACCESS_TOKEN") {
            self.wa.access_token = secret_value(value);
        }
        if let Some(value) = read_env("TELAR_WA_PHONE_NUMBER_ID") {
            self.wa.phone_number_id = value;
        }
        if let Some(value) = read_env("TELAR_WA_VERIFY_TOKEN") {
            self.wa.verify_token = Some(value);
        }
        if let Some(value) = read_env("TELAR_WA_OPERATOR_NUMBER") {
            self.wa.operator_number = Some(value);
        }
        if let Some(value) = read_env("TELAR_WA_SANDBOX") {
            self.wa.sandbox = parse_bool("TELAR_WA_SANDBOX", &value)?;
        }

        if let Some(value) = read_env("TELAR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TELAR_SERVER_PORT") {
            self.server.port = parse_u16("TELAR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TELAR_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TELAR_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TELAR_SERVER_DEBUG_TOKEN") {
            self.server.debug_token = Some(value);
        }

        if let Some(value) = read_env("TELAR_TRANSCRIPTS_DIR") {
            self.transcripts.dir = PathBuf::from(value);
        }

        let log_level = read_env("TELAR_LOGGING_LEVEL").or_else(|| read_env("TELAR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TELAR_LOGGING_FORMAT").or_else(|| read_env("TELAR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_wa(&self.wa)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("telar.toml"), PathBuf::from("config/telar.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.retry_timeout_secs == 0 || llm.retry_timeout_secs >= llm.timeout_secs {
        return Err(ConfigError::Validation(
            "llm.retry_timeout_secs must be non-zero and strictly shorter than llm.timeout_secs"
                .to_string(),
        ));
    }
    if llm.history_window == 0 {
        return Err(ConfigError::Validation(
            "llm.history_window must be greater than zero".to_string(),
        ));
    }
    if llm.model.trim().is_empty() || llm.fallback_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.fallback_model must be non-empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_wa(wa: &WaConfig) -> Result<(), ConfigError> {
    if wa.sandbox {
        return Ok(());
    }

    if wa.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "wa.access_token is required when sandbox mode is off".to_string(),
        ));
    }
    if wa.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "wa.phone_number_id is required when sandbox mode is off".to_string(),
        ));
    }
    let operator_missing =
        wa.operator_number.as_deref().map(|value| value.trim().is_empty()).unwrap_or(true);
    if operator_missing {
        return Err(ConfigError::Validation(
            "wa.operator_number is required when sandbox mode is off".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.health_check_port == 0 || server.health_check_port == server.port {
        return Err(ConfigError::Validation(
            "server.health_check_port must be non-zero and distinct from server.port".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    wa: Option<WaPatch>,
    server: Option<ServerPatch>,
    transcripts: Option<TranscriptsPatch>,
    business: Option<BusinessPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    fallback_model: Option<String>,
    timeout_secs: Option<u64>,
    retry_timeout_secs: Option<u64>,
    retry_backoff_ms: Option<u64>,
    history_window: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct WaPatch {
    api_base_url: Option<String>,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    operator_number: Option<String>,
    sandbox: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    debug_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptsPatch {
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessPatch {
    name: Option<String>,
    facts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_in_sandbox_mode() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.wa.sandbox, "sandbox mode should be the default")?;
        ensure(config.llm.retry_timeout_secs < config.llm.timeout_secs, "retry deadline shorter")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WA_ACCESS_TOKEN", "EAAG-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("telar.toml");
            fs::write(
                &path,
                r#"
[wa]
access_token = "${TEST_WA_ACCESS_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.wa.access_token.expose_secret() == "EAAG-from-env",
                "access token should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_WA_ACCESS_TOKEN"]);
        result
    }

    #[test]
    fn env_overrides_win_over_file_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELAR_LLM_MODEL", "model-from-env");
        env::set_var("TELAR_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("telar.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"

[logging]
level = "debug"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(config.logging.level == "warn", "env log level should win over file")?;
            Ok(())
        })();

        clear_vars(&["TELAR_LLM_MODEL", "TELAR_LOG_LEVEL"]);
        result
    }

    #[test]
    fn retry_deadline_must_be_shorter_than_primary() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELAR_LLM_TIMEOUT_SECS", "6");
        env::set_var("TELAR_LLM_RETRY_TIMEOUT_SECS", "6");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("retry_timeout_secs")
            );
            ensure(has_message, "validation failure should mention retry_timeout_secs")
        })();

        clear_vars(&["TELAR_LLM_TIMEOUT_SECS", "TELAR_LLM_RETRY_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn live_mode_requires_carrier_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELAR_WA_SANDBOX", "false");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure in live mode".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("wa.access_token")
            );
            ensure(has_message, "validation failure should mention wa.access_token")
        })();

        clear_vars(&["TELAR_WA_SANDBOX"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TELAR_LLM_API_KEY", "sk-secret-value");
        env::set_var("TELAR_WA_ACCESS_TOKEN", "EAAG-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("EAAG-secret-value"),
                "debug output should not contain access token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["TELAR_LLM_API_KEY", "TELAR_WA_ACCESS_TOKEN"]);
        result
    }
}
