use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use recfm_cli::commands::{
    approve, config, deploy, pipeline, prepare, recommend, register, teardown, train,
};
use recfm_cli::{GlobalArgs, ScoringArgs};
use serde_json::Value;
use tempfile::TempDir;

const TRANSACTIONS: &str = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850.0,United Kingdom
536365,71053,WHITE METAL LANTERN,6,2010-12-01 08:26:00,3.39,17850.0,United Kingdom
536365,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:26:00,2.75,17850.0,United Kingdom
536366,22633,HAND WARMER UNION JACK,6,2010-12-01 08:28:00,1.85,17850.0,United Kingdom
536367,85123A,WHITE HANGING HEART T-LIGHT HOLDER,4,2010-12-01 08:34:00,2.55,13047.0,United Kingdom
536367,84879,ASSORTED COLOUR BIRD ORNAMENT,32,2010-12-01 08:34:00,1.69,13047.0,United Kingdom
536367,71053,WHITE METAL LANTERN,2,2010-12-01 08:34:00,3.39,13047.0,United Kingdom
536368,22960,JAM MAKING SET WITH JARS,6,2010-12-01 08:34:00,4.25,13047.0,United Kingdom
536370,85123A,WHITE HANGING HEART T-LIGHT HOLDER,12,2010-12-01 08:45:00,2.55,12583.0,France
536370,22728,ALARM CLOCK BAKELIKE PINK,24,2010-12-01 08:45:00,3.75,12583.0,France
536371,,MISSING CUSTOMER ROW,3,2010-12-01 09:00:00,1.25,,United Kingdom
C536379,D,Discount,-1,2010-12-01 09:41:00,27.5,14527.0,United Kingdom
";

const ROLE: (&str, &str) = ("RECFM_TRAINING_ROLE", "arn:recfm:iam::role/training");

fn dry_run_args(dir: &Path) -> GlobalArgs {
    let transactions = dir.join("transactions.csv");
    fs::write(&transactions, TRANSACTIONS).expect("write transactions");

    GlobalArgs {
        dry_run: true,
        work_dir: Some(dir.join("work")),
        transactions: Some(transactions),
        ..GlobalArgs::default()
    }
}

fn scoring(count: usize, pool: usize) -> ScoringArgs {
    ScoringArgs { count, pool }
}

#[test]
fn prepare_fails_config_validation_without_training_role() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[], || {
        let result = prepare::run(&dry_run_args(dir.path()));
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "prepare");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn prepare_reports_clean_rows_and_writes_state() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE, ("RECFM_DATA_N_PROTOTYPES", "4")], || {
        let result = prepare::run(&dry_run_args(dir.path()));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["clean"]["kept_rows"], 10);
        let train_rows = payload["details"]["train_rows"].as_u64().expect("train rows");
        let test_rows = payload["details"]["test_rows"].as_u64().expect("test rows");
        assert_eq!(train_rows + test_rows, 10);

        let state = fs::read_to_string(dir.path().join("work").join("recfm-state.json"))
            .expect("state file");
        let state: Value = serde_json::from_str(&state).expect("state json");
        assert_eq!(state["dataset"]["signature"]["feature_dim"], payload["details"]["feature_dim"]);
    });
}

#[test]
fn train_before_prepare_reports_missing_state() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE], || {
        let result = train::run(&dry_run_args(dir.path()));
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "train");
        assert_eq!(payload["error_class"], "missing_state");
        assert!(payload["message"].as_str().unwrap_or_default().contains("recfm prepare"));
    });
}

#[test]
fn steps_run_one_at_a_time_in_dry_run() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE, ("RECFM_DATA_N_PROTOTYPES", "4"), ("RECFM_ENDPOINT_BATCH_SIZE", "2")], || {
        let args = dry_run_args(dir.path());

        for (name, result) in [
            ("prepare", prepare::run(&args)),
            ("train", train::run(&args)),
            ("register", register::run(&args)),
            ("deploy", deploy::run(&args)),
        ] {
            assert_eq!(result.exit_code, 0, "{name} failed: {}", result.output);
            assert_eq!(parse_payload(&result.output)["command"], name);
        }

        let result = recommend::run(&args, "17850", &scoring(3, 5));
        assert_eq!(result.exit_code, 0, "recommend failed: {}", result.output);
        let payload = parse_payload(&result.output);
        let ranked = payload["details"]["recommendations"].as_array().expect("recommendations");
        assert_eq!(ranked.len(), 3);
        let scores: Vec<f64> =
            ranked.iter().map(|item| item["score"].as_f64().expect("score")).collect();
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]), "scores: {scores:?}");

        let result = teardown::run(&args);
        assert_eq!(result.exit_code, 0, "teardown failed: {}", result.output);

        let result = recommend::run(&args, "17850", &scoring(3, 5));
        assert_eq!(result.exit_code, 1);
        assert_eq!(parse_payload(&result.output)["error_class"], "missing_state");
    });
}

#[test]
fn recommend_for_unknown_customer_still_ranks_pool() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE, ("RECFM_DATA_N_PROTOTYPES", "4")], || {
        let args = dry_run_args(dir.path());
        let result = pipeline::run(&args, None, &scoring(10, 100), false);
        assert_eq!(result.exit_code, 0, "run failed: {}", result.output);

        let result = recommend::run(&args, "99999", &scoring(20, 3));
        assert_eq!(result.exit_code, 0, "recommend failed: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["recommendations"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn run_executes_every_step_and_tears_down() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE, ("RECFM_DATA_N_PROTOTYPES", "4")], || {
        let args = dry_run_args(dir.path());
        let result = pipeline::run(&args, Some("13047"), &scoring(2, 4), true);
        assert_eq!(result.exit_code, 0, "run failed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "dry run completed");
        for step in ["prepare", "train", "register", "deploy", "recommend", "teardown"] {
            assert!(payload["details"].get(step).is_some(), "missing {step} details");
        }
        assert_eq!(payload["details"]["register"]["registry"]["approval_status"], "Approved");
        assert_eq!(
            payload["details"]["recommend"]["recommendations"].as_array().map(Vec::len),
            Some(2)
        );

        let state = fs::read_to_string(dir.path().join("work").join("recfm-state.json"))
            .expect("state file");
        let state: Value = serde_json::from_str(&state).expect("state json");
        assert!(state.get("endpoint").is_none());
        assert!(state.get("registry").is_some());
    });
}

#[test]
fn manual_approval_is_required_before_deploy() {
    let dir = TempDir::new().expect("temp dir");
    let vars = [ROLE, ("RECFM_DATA_N_PROTOTYPES", "4"), ("RECFM_REGISTRY_AUTO_APPROVE", "false")];
    with_env(&vars, || {
        let args = dry_run_args(dir.path());
        for (name, result) in [
            ("prepare", prepare::run(&args)),
            ("train", train::run(&args)),
            ("register", register::run(&args)),
        ] {
            assert_eq!(result.exit_code, 0, "{name} failed: {}", result.output);
        }

        let result = deploy::run(&args);
        assert_eq!(result.exit_code, 1);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "registry");
        assert!(payload["message"].as_str().unwrap_or_default().contains("recfm approve"));

        let result = approve::run(&args);
        assert_eq!(result.exit_code, 0, "approve failed: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "approve");
        assert_eq!(payload["details"]["registry"]["approval_status"], "Approved");

        let result = deploy::run(&args);
        assert_eq!(result.exit_code, 0, "deploy failed: {}", result.output);
    });
}

#[test]
fn approve_before_register_reports_missing_state() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE], || {
        let result = approve::run(&dry_run_args(dir.path()));
        assert_eq!(result.exit_code, 1);
        assert_eq!(parse_payload(&result.output)["error_class"], "missing_state");
    });
}

#[test]
fn recommend_accepts_float_formatted_customer_ids() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE, ("RECFM_DATA_N_PROTOTYPES", "4")], || {
        let args = dry_run_args(dir.path());
        let result = pipeline::run(&args, None, &scoring(10, 100), false);
        assert_eq!(result.exit_code, 0, "run failed: {}", result.output);

        let plain = parse_payload(&recommend::run(&args, "17850", &scoring(4, 6)).output);
        let float = parse_payload(&recommend::run(&args, " 17850.0 ", &scoring(4, 6)).output);

        assert_eq!(float["details"]["request"]["customer_id"], "17850");
        assert_eq!(float["details"]["recommendations"], plain["details"]["recommendations"]);
    });
}

#[test]
fn explicit_missing_config_file_is_a_config_error() {
    let dir = TempDir::new().expect("temp dir");
    with_env(&[ROLE], || {
        let mut args = dry_run_args(dir.path());
        args.config = Some(dir.path().join("absent.toml"));

        let result = deploy::run(&args);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn config_reports_sources_and_redacts_token() {
    let dir = TempDir::new().expect("temp dir");
    let config_path = dir.path().join("recfm.toml");
    fs::write(&config_path, "[endpoint]\nname = \"from-file\"\nbatch_size = 50\n")
        .expect("write config");

    with_env(&[ROLE, ("RECFM_PLATFORM_API_TOKEN", "super-secret-token")], || {
        let args = GlobalArgs {
            config: Some(config_path.clone()),
            log_level: Some("debug".to_owned()),
            ..GlobalArgs::default()
        };
        let result = config::run(&args);
        assert_eq!(result.exit_code, 0, "config failed: {}", result.output);
        assert!(!result.output.contains("super-secret-token"));

        let payload = parse_payload(&result.output);
        let entries = payload["details"].as_array().expect("entries");
        let entry = |key: &str| {
            entries.iter().find(|entry| entry["key"] == key).cloned().expect("entry present")
        };

        assert_eq!(entry("platform.api_token")["value"], "<redacted>");
        assert_eq!(entry("platform.api_token")["source"], "env (RECFM_PLATFORM_API_TOKEN)");
        assert_eq!(entry("endpoint.name")["value"], "from-file");
        let batch_source = entry("endpoint.batch_size")["source"].clone();
        assert!(batch_source.as_str().unwrap_or_default().starts_with("file"));
        assert_eq!(entry("logging.level")["source"], "cli");
        assert_eq!(entry("training.epochs")["source"], "default");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "RECFM_PLATFORM_BASE_URL",
        "RECFM_PLATFORM_API_TOKEN",
        "RECFM_PLATFORM_REGION",
        "RECFM_PLATFORM_TIMEOUT_SECS",
        "RECFM_DATA_TRANSACTIONS_PATH",
        "RECFM_DATA_WORK_DIR",
        "RECFM_DATA_TRAIN_URI",
        "RECFM_DATA_TEST_URI",
        "RECFM_DATA_TEST_FRACTION",
        "RECFM_DATA_SEED",
        "RECFM_DATA_N_PROTOTYPES",
        "RECFM_TRAINING_IMAGE",
        "RECFM_TRAINING_ROLE",
        "RECFM_TRAINING_INSTANCE_TYPE",
        "RECFM_TRAINING_OUTPUT_URI",
        "RECFM_TRAINING_POLL_INTERVAL_SECS",
        "RECFM_TRAINING_MAX_POLLS",
        "RECFM_REGISTRY_MODEL_PACKAGE_GROUP",
        "RECFM_REGISTRY_AUTO_APPROVE",
        "RECFM_ENDPOINT_NAME",
        "RECFM_ENDPOINT_BATCH_SIZE",
        "RECFM_ENDPOINT_POLL_INTERVAL_SECS",
        "RECFM_ENDPOINT_MAX_POLLS",
        "RECFM_LOGGING_LEVEL",
        "RECFM_LOGGING_FORMAT",
        "RECFM_LOG_LEVEL",
        "RECFM_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
