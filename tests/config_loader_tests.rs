use flight_aggregator::config::{ConfigError, ConfigLoader, SyncRoute};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const CRYPTO_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

const VARS: &[&str] = &[
    "AGGREGATOR_PROFILE",
    "AGGREGATOR_API_BIND_ADDR",
    "AGGREGATOR_LOG_LEVEL",
    "AGGREGATOR_CRYPTO_KEY",
    "AGGREGATOR_OPERATOR_TOKEN",
    "AGGREGATOR_OPERATOR_TOKENS",
    "AGGREGATOR_SEARCH_DEADLINE_MS",
    "AGGREGATOR_SYNC_ROUTES",
    "AGGREGATOR_SYNC_WINDOW_DAYS",
    "AGGREGATOR_DEFAULT_CURRENCY",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader(&temp_dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.search.deadline_ms, 10_000);
    assert_eq!(cfg.search.default_currency, "USD");
    assert_eq!(cfg.provider_health.error_threshold, 3);
    assert!(cfg.crypto_key.is_none());
    assert!(cfg.is_dev_profile());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "AGGREGATOR_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "AGGREGATOR_API_BIND_ADDR=192.168.0.10:5000\nAGGREGATOR_SEARCH_DEADLINE_MS=2500\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "AGGREGATOR_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "AGGREGATOR_PROFILE=test\nAGGREGATOR_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let cfg = loader(&temp_dir)
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.search.deadline_ms, 2500);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "AGGREGATOR_API_BIND_ADDR=127.0.0.1:3000\nAGGREGATOR_DEFAULT_CURRENCY=EUR\n",
    );

    unsafe {
        env::set_var("AGGREGATOR_API_BIND_ADDR", "0.0.0.0:9090");
    }

    let cfg = loader(&temp_dir).load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.search.default_currency, "EUR");

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("AGGREGATOR_API_BIND_ADDR", "not-an-addr");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir)
        .load()
        .expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn sync_routes_are_parsed_and_uppercased() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("AGGREGATOR_SYNC_ROUTES", "jfk-lax, LHR-CDG,");
        env::set_var("AGGREGATOR_SYNC_WINDOW_DAYS", "14");
    }
    let temp_dir = TempDir::new().unwrap();
    let cfg = loader(&temp_dir).load().expect("config loads with routes");

    assert_eq!(
        cfg.scheduler.routes,
        vec![
            "JFK-LAX".parse::<SyncRoute>().unwrap(),
            "LHR-CDG".parse::<SyncRoute>().unwrap(),
        ]
    );
    assert_eq!(cfg.scheduler.routes[0].origin, "JFK");
    assert_eq!(cfg.scheduler.window_days, 14);

    clear_env();
}

#[test]
fn malformed_sync_route_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("AGGREGATOR_SYNC_ROUTES", "JFKLAX");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir).load().expect_err("route without dash");
    assert!(matches!(err, ConfigError::InvalidSyncRoute { .. }));

    clear_env();
}

#[test]
fn non_numeric_deadline_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("AGGREGATOR_SEARCH_DEADLINE_MS", "soon");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir).load().expect_err("deadline must be numeric");
    assert!(format!("{}", err).contains("SEARCH_DEADLINE_MS"));

    clear_env();
}

#[test]
fn production_profile_requires_crypto_key_and_operator_tokens() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("AGGREGATOR_PROFILE", "prod");
        env::set_var("AGGREGATOR_OPERATOR_TOKENS", "ops-a, ops-b");
    }
    let temp_dir = TempDir::new().unwrap();
    let err = loader(&temp_dir).load().expect_err("prod needs a crypto key");
    assert!(matches!(err, ConfigError::MissingCryptoKey));

    unsafe {
        env::set_var("AGGREGATOR_CRYPTO_KEY", CRYPTO_KEY);
    }
    let cfg = loader(&temp_dir).load().expect("prod config is complete");
    assert_eq!(cfg.operator_tokens, vec!["ops-a", "ops-b"]);
    assert_eq!(cfg.log_format, "json");
    assert_eq!(cfg.crypto_key.as_deref().map(<[u8]>::len), Some(32));

    unsafe {
        env::remove_var("AGGREGATOR_OPERATOR_TOKENS");
    }
    let err = loader(&temp_dir).load().expect_err("prod needs operator tokens");
    assert!(matches!(err, ConfigError::MissingOperatorTokens));

    clear_env();
}
