//! Configuration precedence: environment variables over built-in defaults.
//!
//! Serialized because the process environment is shared between tests.

use std::env;

use plaudit::config::{self, LoadError, LogFormat};
use serial_test::serial;

fn with_env<T>(vars: &[(&str, &str)], run: impl FnOnce() -> T) -> T {
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }
    let result = run();
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }
    result
}

#[test]
#[serial]
fn defaults_apply_without_any_source() {
    let settings = config::load(None).expect("defaults should load");

    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.cache.search_ttl_secs, 300);
    assert_eq!(settings.cache.ranking_ttl_secs, 600);
    assert_eq!(settings.catalog.min_reviews_for_top_rated, 3);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
#[serial]
fn environment_variables_override_defaults() {
    let settings = with_env(
        &[
            ("PLAUDIT__CACHE__LIST_LIMIT", "7"),
            ("PLAUDIT__LOGGING__JSON", "true"),
            ("PLAUDIT__DATABASE__URL", "postgres://example/plaudit"),
        ],
        || config::load(None),
    )
    .expect("settings should load");

    assert_eq!(settings.cache.list_limit, 7);
    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert_eq!(
        settings.database.url.as_deref(),
        Some("postgres://example/plaudit")
    );
}

#[test]
#[serial]
fn invalid_environment_values_are_rejected() {
    let err = with_env(&[("PLAUDIT__CACHE__SEARCH_TTL_SECS", "0")], || {
        config::load(None)
    })
    .expect_err("a zero ttl should fail validation");

    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.search_ttl_secs",
            ..
        }
    ));
}
