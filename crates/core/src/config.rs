use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub registry: RegistryConfig,
    pub endpoint: EndpointConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub base_url: String,
    pub api_token: Option<SecretString>,
    pub region: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DataConfig {
    pub transactions_path: PathBuf,
    pub work_dir: PathBuf,
    pub train_uri: String,
    pub test_uri: String,
    pub test_fraction: f64,
    pub seed: u64,
    pub n_prototypes: usize,
}

#[derive(Clone, Debug)]
pub struct TrainingConfig {
    pub job_prefix: String,
    pub image: String,
    pub role: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub output_uri: String,
    pub num_factors: u32,
    pub epochs: u32,
    pub mini_batch_size: u32,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
}

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub model_package_group: String,
    pub group_description: String,
    pub approval_description: String,
    pub auto_approve: bool,
}

#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub name: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub batch_size: usize,
    pub poll_interval_secs: u64,
    pub max_polls: u32,
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
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub transactions_path: Option<PathBuf>,
    pub endpoint_name: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
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
            platform: PlatformConfig {
                base_url: "http://localhost:8085".to_string(),
                api_token: None,
                region: "eu-west-1".to_string(),
                timeout_secs: 60,
            },
            data: DataConfig {
                transactions_path: PathBuf::from("data/transactions.csv"),
                work_dir: PathBuf::from("work"),
                train_uri: "s3://recfm-artifacts/data/train".to_string(),
                test_uri: "s3://recfm-artifacts/data/test".to_string(),
                test_fraction: 0.2,
                seed: 42,
                n_prototypes: 100,
            },
            training: TrainingConfig {
                job_prefix: "recfm-fm".to_string(),
                image: "factorization-machines:1".to_string(),
                role: String::new(),
                instance_type: "ml.c5.xlarge".to_string(),
                instance_count: 1,
                output_uri: "s3://recfm-artifacts/output".to_string(),
                num_factors: 64,
                epochs: 20,
                mini_batch_size: 1000,
                poll_interval_secs: 30,
                max_polls: 240,
            },
            registry: RegistryConfig {
                model_package_group: "recfm-retail-recommender".to_string(),
                group_description: "Factorization machine models for retail recommendations"
                    .to_string(),
                approval_description: "approved after offline evaluation".to_string(),
                auto_approve: true,
            },
            endpoint: EndpointConfig {
                name: "recfm-retail-recommender".to_string(),
                instance_type: "ml.m5.large".to_string(),
                instance_count: 1,
                batch_size: 500,
                poll_interval_secs: 30,
                max_polls: 120,
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("recfm.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Location of the workflow state file inside the work directory.
    pub fn state_path(&self) -> PathBuf {
        self.data.work_dir.join("recfm-state.json")
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(platform) = patch.platform {
            if let Some(base_url) = platform.base_url {
                self.platform.base_url = base_url;
            }
            if let Some(api_token_value) = platform.api_token {
                self.platform.api_token = Some(secret_value(api_token_value));
            }
            if let Some(region) = platform.region {
                self.platform.region = region;
            }
            if let Some(timeout_secs) = platform.timeout_secs {
                self.platform.timeout_secs = timeout_secs;
            }
        }

        if let Some(data) = patch.data {
            if let Some(transactions_path) = data.transactions_path {
                self.data.transactions_path = transactions_path;
            }
            if let Some(work_dir) = data.work_dir {
                self.data.work_dir = work_dir;
            }
            if let Some(train_uri) = data.train_uri {
                self.data.train_uri = train_uri;
            }
            if let Some(test_uri) = data.test_uri {
                self.data.test_uri = test_uri;
            }
            if let Some(test_fraction) = data.test_fraction {
                self.data.test_fraction = test_fraction;
            }
            if let Some(seed) = data.seed {
                self.data.seed = seed;
            }
            if let Some(n_prototypes) = data.n_prototypes {
                self.data.n_prototypes = n_prototypes;
            }
        }

        if let Some(training) = patch.training {
            if let Some(job_prefix) = training.job_prefix {
                self.training.job_prefix = job_prefix;
            }
            if let Some(image) = training.image {
                self.training.image = image;
            }
            if let Some(role) = training.role {
                self.training.role = role;
            }
            if let Some(instance_type) = training.instance_type {
                self.training.instance_type = instance_type;
            }
            if let Some(instance_count) = training.instance_count {
                self.training.instance_count = instance_count;
            }
            if let Some(output_uri) = training.output_uri {
                self.training.output_uri = output_uri;
            }
            if let Some(num_factors) = training.num_factors {
                self.training.num_factors = num_factors;
            }
            if let Some(epochs) = training.epochs {
                self.training.epochs = epochs;
            }
            if let Some(mini_batch_size) = training.mini_batch_size {
                self.training.mini_batch_size = mini_batch_size;
            }
            if let Some(poll_interval_secs) = training.poll_interval_secs {
                self.training.poll_interval_secs = poll_interval_secs;
            }
            if let Some(max_polls) = training.max_polls {
                self.training.max_polls = max_polls;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(model_package_group) = registry.model_package_group {
                self.registry.model_package_group = model_package_group;
            }
            if let Some(group_description) = registry.group_description {
                self.registry.group_description = group_description;
            }
            if let Some(approval_description) = registry.approval_description {
                self.registry.approval_description = approval_description;
            }
            if let Some(auto_approve) = registry.auto_approve {
                self.registry.auto_approve = auto_approve;
            }
        }

        if let Some(endpoint) = patch.endpoint {
            if let Some(name) = endpoint.name {
                self.endpoint.name = name;
            }
            if let Some(instance_type) = endpoint.instance_type {
                self.endpoint.instance_type = instance_type;
            }
            if let Some(instance_count) = endpoint.instance_count {
                self.endpoint.instance_count = instance_count;
            }
            if let Some(batch_size) = endpoint.batch_size {
                self.endpoint.batch_size = batch_size;
            }
            if let Some(poll_interval_secs) = endpoint.poll_interval_secs {
                self.endpoint.poll_interval_secs = poll_interval_secs;
            }
            if let Some(max_polls) = endpoint.max_polls {
                self.endpoint.max_polls = max_polls;
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
        if let Some(value) = read_env("RECFM_PLATFORM_BASE_URL") {
            self.platform.base_url = value;
        }
        if let Some(value) = read_env("RECFM_PLATFORM_API_TOKEN") {
            self.platform.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("RECFM_PLATFORM_REGION") {
            self.platform.region = value;
        }
        if let Some(value) = read_env("RECFM_PLATFORM_TIMEOUT_SECS") {
            self.platform.timeout_secs = parse_u64("RECFM_PLATFORM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RECFM_DATA_TRANSACTIONS_PATH") {
            self.data.transactions_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("RECFM_DATA_WORK_DIR") {
            self.data.work_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("RECFM_DATA_TRAIN_URI") {
            self.data.train_uri = value;
        }
        if let Some(value) = read_env("RECFM_DATA_TEST_URI") {
            self.data.test_uri = value;
        }
        if let Some(value) = read_env("RECFM_DATA_TEST_FRACTION") {
            self.data.test_fraction = parse_f64("RECFM_DATA_TEST_FRACTION", &value)?;
        }
        if let Some(value) = read_env("RECFM_DATA_SEED") {
            self.data.seed = parse_u64("RECFM_DATA_SEED", &value)?;
        }
        if let Some(value) = read_env("RECFM_DATA_N_PROTOTYPES") {
            self.data.n_prototypes = parse_usize("RECFM_DATA_N_PROTOTYPES", &value)?;
        }

        if let Some(value) = read_env("RECFM_TRAINING_IMAGE") {
            self.training.image = value;
        }
        if let Some(value) = read_env("RECFM_TRAINING_ROLE") {
            self.training.role = value;
        }
        if let Some(value) = read_env("RECFM_TRAINING_INSTANCE_TYPE") {
            self.training.instance_type = value;
        }
        if let Some(value) = read_env("RECFM_TRAINING_OUTPUT_URI") {
            self.training.output_uri = value;
        }
        if let Some(value) = read_env("RECFM_TRAINING_POLL_INTERVAL_SECS") {
            self.training.poll_interval_secs =
                parse_u64("RECFM_TRAINING_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("RECFM_TRAINING_MAX_POLLS") {
            self.training.max_polls = parse_u32("RECFM_TRAINING_MAX_POLLS", &value)?;
        }

        if let Some(value) = read_env("RECFM_REGISTRY_MODEL_PACKAGE_GROUP") {
            self.registry.model_package_group = value;
        }
        if let Some(value) = read_env("RECFM_REGISTRY_AUTO_APPROVE") {
            self.registry.auto_approve = parse_bool("RECFM_REGISTRY_AUTO_APPROVE", &value)?;
        }

        if let Some(value) = read_env("RECFM_ENDPOINT_NAME") {
            self.endpoint.name = value;
        }
        if let Some(value) = read_env("RECFM_ENDPOINT_BATCH_SIZE") {
            self.endpoint.batch_size = parse_usize("RECFM_ENDPOINT_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("RECFM_ENDPOINT_POLL_INTERVAL_SECS") {
            self.endpoint.poll_interval_secs =
                parse_u64("RECFM_ENDPOINT_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("RECFM_ENDPOINT_MAX_POLLS") {
            self.endpoint.max_polls = parse_u32("RECFM_ENDPOINT_MAX_POLLS", &value)?;
        }

        let log_level = read_env("RECFM_LOGGING_LEVEL").or_else(|| read_env("RECFM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RECFM_LOGGING_FORMAT").or_else(|| read_env("RECFM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.platform.base_url = base_url;
        }
        if let Some(work_dir) = overrides.work_dir {
            self.data.work_dir = work_dir;
        }
        if let Some(transactions_path) = overrides.transactions_path {
            self.data.transactions_path = transactions_path;
        }
        if let Some(endpoint_name) = overrides.endpoint_name {
            self.endpoint.name = endpoint_name;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_platform(&self.platform)?;
        validate_data(&self.data)?;
        validate_training(&self.training)?;
        validate_registry(&self.registry)?;
        validate_endpoint(&self.endpoint)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("recfm.toml"), PathBuf::from("config/recfm.toml")]
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

fn validate_platform(platform: &PlatformConfig) -> Result<(), ConfigError> {
    let base_url = platform.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "platform.base_url must start with http:// or https://".to_string(),
        ));
    }

    if platform.timeout_secs == 0 || platform.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "platform.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let empty_token =
        platform.api_token.as_ref().map(|token| token.expose_secret().trim().is_empty());
    if empty_token == Some(true) {
        return Err(ConfigError::Validation(
            "platform.api_token is set but empty; remove it or provide a token".to_string(),
        ));
    }

    Ok(())
}

fn validate_data(data: &DataConfig) -> Result<(), ConfigError> {
    if !(data.test_fraction > 0.0 && data.test_fraction < 1.0) {
        return Err(ConfigError::Validation(
            "data.test_fraction must be strictly between 0 and 1".to_string(),
        ));
    }

    if data.n_prototypes == 0 {
        return Err(ConfigError::Validation(
            "data.n_prototypes must be greater than zero".to_string(),
        ));
    }

    if data.train_uri.trim().is_empty() || data.test_uri.trim().is_empty() {
        return Err(ConfigError::Validation(
            "data.train_uri and data.test_uri are required".to_string(),
        ));
    }

    Ok(())
}

fn validate_training(training: &TrainingConfig) -> Result<(), ConfigError> {
    if training.role.trim().is_empty() {
        return Err(ConfigError::Validation(
            "training.role is required (the execution role the training service assumes)"
                .to_string(),
        ));
    }

    if training.image.trim().is_empty() || training.output_uri.trim().is_empty() {
        return Err(ConfigError::Validation(
            "training.image and training.output_uri are required".to_string(),
        ));
    }

    if training.instance_count == 0
        || training.num_factors == 0
        || training.epochs == 0
        || training.mini_batch_size == 0
    {
        return Err(ConfigError::Validation(
            "training.instance_count, num_factors, epochs and mini_batch_size must be greater than zero"
                .to_string(),
        ));
    }

    validate_polling("training", training.poll_interval_secs, training.max_polls)
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.model_package_group.trim().is_empty() {
        return Err(ConfigError::Validation(
            "registry.model_package_group is required".to_string(),
        ));
    }

    Ok(())
}

fn validate_endpoint(endpoint: &EndpointConfig) -> Result<(), ConfigError> {
    if endpoint.name.trim().is_empty() {
        return Err(ConfigError::Validation("endpoint.name is required".to_string()));
    }

    if endpoint.instance_count == 0 || endpoint.batch_size == 0 {
        return Err(ConfigError::Validation(
            "endpoint.instance_count and endpoint.batch_size must be greater than zero"
                .to_string(),
        ));
    }

    validate_polling("endpoint", endpoint.poll_interval_secs, endpoint.max_polls)
}

fn validate_polling(section: &str, interval_secs: u64, max_polls: u32) -> Result<(), ConfigError> {
    if interval_secs > 3600 {
        return Err(ConfigError::Validation(format!(
            "{section}.poll_interval_secs must be at most 3600"
        )));
    }

    if max_polls == 0 {
        return Err(ConfigError::Validation(format!(
            "{section}.max_polls must be greater than zero"
        )));
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    platform: Option<PlatformPatch>,
    data: Option<DataPatch>,
    training: Option<TrainingPatch>,
    registry: Option<RegistryPatch>,
    endpoint: Option<EndpointPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PlatformPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    region: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    transactions_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    train_uri: Option<String>,
    test_uri: Option<String>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
    n_prototypes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TrainingPatch {
    job_prefix: Option<String>,
    image: Option<String>,
    role: Option<String>,
    instance_type: Option<String>,
    instance_count: Option<u32>,
    output_uri: Option<String>,
    num_factors: Option<u32>,
    epochs: Option<u32>,
    mini_batch_size: Option<u32>,
    poll_interval_secs: Option<u64>,
    max_polls: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    model_package_group: Option<String>,
    group_description: Option<String>,
    approval_description: Option<String>,
    auto_approve: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointPatch {
    name: Option<String>,
    instance_type: Option<String>,
    instance_count: Option<u32>,
    batch_size: Option<usize>,
    poll_interval_secs: Option<u64>,
    max_polls: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
