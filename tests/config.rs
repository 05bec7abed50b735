use std::time::Duration;

use assert_matches::assert_matches;

use st_data_miner::config::{Config, ConfigLoader, ConfigOverrides, RetryConfig};
use st_data_miner::domain::SourceKind;
use st_data_miner::error::MinerError;

fn write_config(content: &str) -> (tempfile::TempDir, String) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("st-miner.json");
    std::fs::write(&path, content).unwrap();
    (temp, path.to_string_lossy().into_owned())
}

#[test]
fn file_values_are_read() {
    let (_temp, path) = write_config(
        r#"{
  "sources": ["ncbi", "htan", "ncbi"],
  "query": "visium[All Fields]",
  "max_results": 50,
  "email": "lab@example.org",
  "batch_size": 20,
  "retry": {"max_attempts": 5, "base_delay_ms": 50},
  "fallback": {"empty_result_triggers_fallback": false},
  "curated_dir": "catalogs"
}"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path), ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.sources, vec![SourceKind::NcbiGeo, SourceKind::Htan]);
    assert_eq!(resolved.query, "visium[All Fields]");
    assert_eq!(resolved.max_results, 50);
    assert_eq!(resolved.contact.email.as_deref(), Some("lab@example.org"));
    assert_eq!(resolved.batch_size, 20);
    assert_eq!(resolved.retry.max_attempts, 5);
    assert_eq!(resolved.retry.base_delay, Duration::from_millis(50));
    assert!(!resolved.fallback.empty_result_triggers_fallback);
    assert_eq!(resolved.curated_dir.as_ref().map(|dir| dir.as_str()), Some("catalogs"));
}

#[test]
fn overrides_beat_the_file() {
    let (_temp, path) =
        write_config(r#"{"sources": ["ncbi"], "max_results": 50, "offline": false}"#);
    let overrides = ConfigOverrides {
        sources: Some(vec![SourceKind::TenX]),
        max_results: Some(7),
        offline: true,
        no_empty_fallback: true,
        ..ConfigOverrides::default()
    };

    let resolved = ConfigLoader::resolve(Some(&path), overrides).unwrap();
    assert_eq!(resolved.sources, vec![SourceKind::TenX]);
    assert_eq!(resolved.max_results, 7);
    assert!(resolved.offline);
    assert!(!resolved.live_enabled());
    assert!(!resolved.fallback.empty_result_triggers_fallback);
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str(), ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, MinerError::ConfigRead(_));
}

#[test]
fn invalid_json_is_a_parse_error() {
    let (_temp, path) = write_config(r#"{"sources": ["arrayexpress"]}"#);
    let err = ConfigLoader::resolve(Some(&path), ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, MinerError::ConfigParse(_));
}

#[test]
fn zero_limits_are_rejected() {
    let zero_attempts = Config {
        retry: Some(RetryConfig {
            max_attempts: Some(0),
            base_delay_ms: None,
        }),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_attempts, ConfigOverrides::default()),
        Err(MinerError::Configuration(_))
    );

    let zero_results = ConfigOverrides {
        max_results: Some(0),
        ..ConfigOverrides::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(Config::default(), zero_results),
        Err(MinerError::Configuration(_))
    );

    let zero_rate = Config {
        requests_per_second: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_rate, ConfigOverrides::default()),
        Err(MinerError::Configuration(_))
    );
}

#[test]
fn blank_contact_values_are_dropped() {
    let config = Config {
        email: Some("   ".to_string()),
        api_key: Some(String::new()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config, ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.contact.email, None);
    assert_eq!(resolved.contact.api_key, None);
}

#[test]
fn unknown_keys_in_the_file_are_ignored() {
    let (_temp, path) = write_config(r#"{"schema_version": 1, "sources": ["htan"]}"#);
    let resolved = ConfigLoader::resolve(Some(&path), ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.sources, vec![SourceKind::Htan]);
    assert!(!resolved.live_enabled());
}
