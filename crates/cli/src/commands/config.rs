use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use recfm_core::config::AppConfig;
use serde::Serialize;
use toml::Value;

use crate::commands::context::load_config;
use crate::commands::CommandResult;
use crate::GlobalArgs;

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    cli_override: bool,
    value: String,
}

pub fn run(global: &GlobalArgs) -> CommandResult {
    let config = match load_config(global) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path(global.config.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: Vec<ConfigEntry> = fields(&config, global)
        .into_iter()
        .map(|field| ConfigEntry {
            key: field.key,
            source: field_source(
                &field,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
            value: field.value,
        })
        .collect();

    CommandResult::success_with(
        COMMAND,
        "effective config (source precedence: cli > env > file > default)",
        &entries,
    )
}

fn fields(config: &AppConfig, global: &GlobalArgs) -> Vec<Field> {
    let api_token = if config.platform.api_token.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        field(
            "platform.base_url",
            &["RECFM_PLATFORM_BASE_URL"],
            global.base_url.is_some(),
            &config.platform.base_url,
        ),
        field("platform.api_token", &["RECFM_PLATFORM_API_TOKEN"], false, api_token),
        field("platform.region", &["RECFM_PLATFORM_REGION"], false, &config.platform.region),
        field(
            "platform.timeout_secs",
            &["RECFM_PLATFORM_TIMEOUT_SECS"],
            false,
            config.platform.timeout_secs,
        ),
        field(
            "data.transactions_path",
            &["RECFM_DATA_TRANSACTIONS_PATH"],
            global.transactions.is_some(),
            config.data.transactions_path.display(),
        ),
        field(
            "data.work_dir",
            &["RECFM_DATA_WORK_DIR"],
            global.work_dir.is_some(),
            config.data.work_dir.display(),
        ),
        field("data.train_uri", &["RECFM_DATA_TRAIN_URI"], false, &config.data.train_uri),
        field("data.test_uri", &["RECFM_DATA_TEST_URI"], false, &config.data.test_uri),
        field(
            "data.test_fraction",
            &["RECFM_DATA_TEST_FRACTION"],
            false,
            config.data.test_fraction,
        ),
        field("data.seed", &["RECFM_DATA_SEED"], false, config.data.seed),
        field("data.n_prototypes", &["RECFM_DATA_N_PROTOTYPES"], false, config.data.n_prototypes),
        field("training.job_prefix", &[], false, &config.training.job_prefix),
        field("training.image", &["RECFM_TRAINING_IMAGE"], false, &config.training.image),
        field("training.role", &["RECFM_TRAINING_ROLE"], false, &config.training.role),
        field(
            "training.instance_type",
            &["RECFM_TRAINING_INSTANCE_TYPE"],
            false,
            &config.training.instance_type,
        ),
        field("training.instance_count", &[], false, config.training.instance_count),
        field(
            "training.output_uri",
            &["RECFM_TRAINING_OUTPUT_URI"],
            false,
            &config.training.output_uri,
        ),
        field("training.num_factors", &[], false, config.training.num_factors),
        field("training.epochs", &[], false, config.training.epochs),
        field("training.mini_batch_size", &[], false, config.training.mini_batch_size),
        field(
            "training.poll_interval_secs",
            &["RECFM_TRAINING_POLL_INTERVAL_SECS"],
            false,
            config.training.poll_interval_secs,
        ),
        field(
            "training.max_polls",
            &["RECFM_TRAINING_MAX_POLLS"],
            false,
            config.training.max_polls,
        ),
        field(
            "registry.model_package_group",
            &["RECFM_REGISTRY_MODEL_PACKAGE_GROUP"],
            false,
            &config.registry.model_package_group,
        ),
        field(
            "registry.auto_approve",
            &["RECFM_REGISTRY_AUTO_APPROVE"],
            false,
            config.registry.auto_approve,
        ),
        field(
            "endpoint.name",
            &["RECFM_ENDPOINT_NAME"],
            global.endpoint.is_some(),
            &config.endpoint.name,
        ),
        field("endpoint.instance_type", &[], false, &config.endpoint.instance_type),
        field("endpoint.instance_count", &[], false, config.endpoint.instance_count),
        field(
            "endpoint.batch_size",
            &["RECFM_ENDPOINT_BATCH_SIZE"],
            false,
            config.endpoint.batch_size,
        ),
        field(
            "endpoint.poll_interval_secs",
            &["RECFM_ENDPOINT_POLL_INTERVAL_SECS"],
            false,
            config.endpoint.poll_interval_secs,
        ),
        field(
            "endpoint.max_polls",
            &["RECFM_ENDPOINT_MAX_POLLS"],
            false,
            config.endpoint.max_polls,
        ),
        field(
            "logging.level",
            &["RECFM_LOGGING_LEVEL", "RECFM_LOG_LEVEL"],
            global.log_level.is_some(),
            &config.logging.level,
        ),
        field(
            "logging.format",
            &["RECFM_LOGGING_FORMAT", "RECFM_LOG_FORMAT"],
            false,
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ]
}

fn field(
    key: &'static str,
    env_keys: &'static [&'static str],
    cli_override: bool,
    value: impl ToString,
) -> Field {
    Field { key, env_keys, cli_override, value: value.to_string() }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("recfm.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/recfm.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if field.cli_override {
        return "cli".to_string();
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
