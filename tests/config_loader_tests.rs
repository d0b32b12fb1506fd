use keeper::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const KEYS: &[&str] = &[
    "KEEPER_PROFILE",
    "KEEPER_API_BIND_ADDR",
    "KEEPER_LOG_LEVEL",
    "KEEPER_LOG_FORMAT",
    "KEEPER_SWEEP_ENABLED",
    "KEEPER_SWEEP_INTERVAL_SECONDS",
    "KEEPER_SWEEP_GRACE_MINUTES",
    "KEEPER_DISPATCH_WORKERS",
    "KEEPER_WEBHOOK_TIMEOUT_SECONDS",
    "KEEPER_MAIL_API_URL",
    "KEEPER_MAIL_API_TOKEN",
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
    unsafe {
        for key in KEYS {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert!(cfg.sweep.enabled);
    assert_eq!(cfg.sweep.interval_seconds, 60);
    assert_eq!(cfg.sweep.grace_minutes, 5);
    assert_eq!(cfg.dispatch.workers, 3);
    assert_eq!(cfg.dispatch.webhook_timeout_seconds, 10);
    assert!(cfg.mail.api_url.is_none());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "KEEPER_API_BIND_ADDR=127.0.0.1:3000\nKEEPER_DISPATCH_WORKERS=2\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test",
        "KEEPER_API_BIND_ADDR=192.168.0.10:5000\nKEEPER_SWEEP_GRACE_MINUTES=15\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "KEEPER_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "KEEPER_PROFILE=test\nKEEPER_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.dispatch.workers, 2);
    assert_eq!(cfg.sweep.grace_minutes, 15);
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
        "KEEPER_API_BIND_ADDR=127.0.0.1:3000\nKEEPER_SWEEP_INTERVAL_SECONDS=30\n",
    );

    unsafe {
        env::set_var("KEEPER_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("KEEPER_SWEEP_INTERVAL_SECONDS", "120");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.sweep.interval_seconds, 120);

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("KEEPER_API_BIND_ADDR", "not-an-addr");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn unparsable_number_is_rejected_not_defaulted() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("KEEPER_DISPATCH_WORKERS", "three");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("non-numeric workers should fail");
    assert!(format!("{}", err).contains("DISPATCH_WORKERS"));

    clear_env();
}

#[test]
fn out_of_range_sweep_interval_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("KEEPER_SWEEP_INTERVAL_SECONDS", "5");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("interval below minimum should fail");
    assert!(format!("{}", err).contains("sweep interval"));

    clear_env();
}

#[test]
fn redacted_json_hides_mail_token() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    unsafe {
        env::set_var("KEEPER_MAIL_API_URL", "https://relay.example.com/send");
        env::set_var("KEEPER_MAIL_API_TOKEN", "super-secret-token");
    }
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with mail relay");

    assert_eq!(cfg.mail.api_token.as_deref(), Some("super-secret-token"));
    let json = cfg.redacted_json().unwrap();
    assert!(!json.contains("super-secret-token"));

    clear_env();
}
