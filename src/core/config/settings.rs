use std::path::PathBuf;

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, EmbeddingSettings, RuntimeSettings,
    ScoringSettings, ServerHost, ServerPort, ServerSettings, Settings, StorageSettings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADESIM_HOST", "0.0.0.0");
        let port = env_or_default("GRADESIM_PORT", "8000");

        let environment =
            parse_environment(env_optional("GRADESIM_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("GRADESIM_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gradesim API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradesim");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradesim_db");
        let database_url = env_optional("DATABASE_URL");

        let upload_dir = PathBuf::from(env_or_default("UPLOAD_DIR", "uploads"));
        let reference_image_dir =
            PathBuf::from(env_or_default("REFERENCE_IMAGE_DIR", "references"));
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;

        let model_path = env_optional("EMBEDDING_MODEL_PATH").map(PathBuf::from);
        let testing_stub =
            env_optional("EMBEDDING_STUB").map(|value| parse_bool(&value)).unwrap_or(false);

        let worker_concurrency = parse_u64(
            "SCORING_WORKER_CONCURRENCY",
            env_or_default("SCORING_WORKER_CONCURRENCY", "3"),
        )?;
        let poll_interval_seconds = parse_u64(
            "SCORING_POLL_INTERVAL_SECONDS",
            env_or_default("SCORING_POLL_INTERVAL_SECONDS", "2"),
        )?;
        let max_retries =
            parse_u32("SCORING_MAX_RETRIES", env_or_default("SCORING_MAX_RETRIES", "3"))?;
        let stale_after_seconds = parse_u64(
            "SCORING_STALE_AFTER_SECONDS",
            env_or_default("SCORING_STALE_AFTER_SECONDS", "600"),
        )?;
        let max_render_pixels =
            parse_u32("MAX_RENDER_PIXELS", env_or_default("MAX_RENDER_PIXELS", "1024"))?;

        let log_level = env_or_default("GRADESIM_LOG_LEVEL", "info");
        let json = env_optional("GRADESIM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            storage: StorageSettings { upload_dir, reference_image_dir, max_upload_size_mb },
            embedding: EmbeddingSettings { model_path, testing_stub },
            scoring: ScoringSettings {
                worker_concurrency,
                poll_interval_seconds,
                max_retries,
                stale_after_seconds,
                max_render_pixels,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn embedding(&self) -> &EmbeddingSettings {
        &self.embedding
    }

    pub(crate) fn scoring(&self) -> &ScoringSettings {
        &self.scoring
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCORING_WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.scoring.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCORING_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.scoring.max_render_pixels == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_RENDER_PIXELS",
                value: "0".to_string(),
            });
        }

        if self.storage.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        let reference_dir = &self.storage.reference_image_dir;
        if !reference_dir.exists() || !reference_dir.is_dir() {
            return Err(ConfigError::InvalidValue {
                field: "REFERENCE_IMAGE_DIR",
                value: reference_dir.display().to_string(),
            });
        }

        if !self.embedding.testing_stub {
            match &self.embedding.model_path {
                Some(path) if path.exists() => {}
                Some(path) => {
                    return Err(ConfigError::InvalidValue {
                        field: "EMBEDDING_MODEL_PATH",
                        value: path.display().to_string(),
                    });
                }
                None => return Err(ConfigError::MissingSecret("EMBEDDING_MODEL_PATH")),
            }
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[tokio::test]
    async fn defaults_load_without_env() {
        let _guard = crate::test_support::env_lock().await;
        crate::test_support::clear_config_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.server_port(), 8000);
        assert_eq!(settings.scoring().worker_concurrency, 3);
        assert_eq!(settings.storage().upload_dir, std::path::Path::new("uploads"));
        assert!(!settings.telemetry().prometheus_enabled);
    }

    #[tokio::test]
    async fn worker_concurrency_zero_is_rejected() {
        let _guard = crate::test_support::env_lock().await;
        crate::test_support::clear_config_env();
        std::env::set_var("SCORING_WORKER_CONCURRENCY", "0");

        let result = Settings::load();
        assert!(result.is_err());

        std::env::remove_var("SCORING_WORKER_CONCURRENCY");
    }
}
