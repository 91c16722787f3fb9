//! Offline unit tests for the public surface.
//!
//! These tests run without a live server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nacos_config_client::{
    model::compute_md5, server_list::ServerListManager, wire, ClientConfig, ConfigChangeEvent,
    ConfigError, ConfigKey, FnConfigChangeListener, NacosConfigService,
};

// ============== Options ==============

#[test]
fn test_client_config_defaults() {
    let config = ClientConfig::default();
    assert_eq!(config.context_path, "nacos");
    assert_eq!(config.default_timeout_ms, 15000);
    assert_eq!(config.long_polling_timeout_ms, 30000);
    assert!(config.enable_snapshot);
    assert!(config.username.is_empty());
}

#[test]
fn test_client_config_rejects_empty_servers() {
    let config = ClientConfig::with_servers(Vec::new());
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Configuration(_))
    ));
}

// ============== Keys and digests ==============

#[test]
fn test_key_stringification() {
    let key = ConfigKey::new("app", "DEFAULT_GROUP", "").unwrap();
    assert_eq!(key.to_string(), "app+DEFAULT_GROUP");

    let key = ConfigKey::new("app", "DEFAULT_GROUP", "dev").unwrap();
    assert_eq!(key.to_string(), "app+DEFAULT_GROUP+dev");
}

#[test]
fn test_md5_stability_over_utf8() {
    assert_eq!(compute_md5(""), "d41d8cd98f00b204e9800998ecf8427e");
    // multibyte content round-trips through framing without affecting its digest
    let content = "名字=值\nflag=true";
    let tracked = vec![(
        ConfigKey::new("app", "g", "").unwrap(),
        compute_md5(content),
    )];
    let encoded = wire::encode_probe(&tracked);
    assert!(encoded.contains(&compute_md5(content)));
}

// ============== Probe framing ==============

#[test]
fn test_probe_framing_round_trip() {
    let keys = vec![
        ConfigKey::new("a", "g1", "").unwrap(),
        ConfigKey::new("b", "g2", "tenant").unwrap(),
    ];
    let response: String = keys
        .iter()
        .map(|k| {
            let mut line = format!("{}{}{}", k.data_id, wire::WORD_SEPARATOR, k.group);
            if !k.tenant.is_empty() {
                line.push_str(wire::WORD_SEPARATOR);
                line.push_str(&k.tenant);
            }
            line.push_str(wire::LINE_SEPARATOR);
            line
        })
        .collect();

    assert_eq!(wire::parse_probe_response(&response), keys);
}

#[test]
fn test_probe_request_payload_shape() {
    let tracked = vec![(ConfigKey::new("app", "g", "dev").unwrap(), "md5".to_string())];
    assert_eq!(wire::encode_probe(&tracked), "app\u{2}g\u{2}md5\u{2}dev\u{1}");
}

// ============== Server pool ==============

#[test]
fn test_three_failures_exclude_server() {
    let manager = ServerListManager::new(&[
        "http://one:8848".to_string(),
        "http://two:8848".to_string(),
    ])
    .unwrap();

    for _ in 0..3 {
        manager.mark_failed("http://one:8848");
    }
    for _ in 0..5 {
        assert_eq!(manager.select(), "http://two:8848");
    }
}

#[test]
fn test_scheme_defaulting() {
    let manager = ServerListManager::new(&["127.0.0.1:8848".to_string()]).unwrap();
    assert_eq!(manager.all_servers(), ["http://127.0.0.1:8848"]);
}

// ============== Facade validation (no network needed) ==============

fn offline_config() -> ClientConfig {
    // retries kept tiny so connection-refused paths fail fast
    ClientConfig::new("http://127.0.0.1:1")
        .with_retry(1, 10)
        .with_timeouts(200, 500)
        .with_snapshot_enabled(false)
}

#[tokio::test]
async fn test_validation_errors_before_any_network() {
    let service = NacosConfigService::new(offline_config()).await.unwrap();

    assert!(matches!(
        service.get_config("", "g").await,
        Err(ConfigError::Validation(_))
    ));
    assert!(matches!(
        service.publish_config("app", "g", "").await,
        Err(ConfigError::Validation(_))
    ));
    assert!(matches!(
        service.remove_config("  ", "g").await,
        Err(ConfigError::Validation(_))
    ));
}

#[tokio::test]
async fn test_get_without_server_or_snapshot_errors() {
    let service = NacosConfigService::new(offline_config()).await.unwrap();
    let result = service.get_config("app", "DEFAULT_GROUP").await;
    assert!(matches!(result, Err(ConfigError::Http(_))));
}

#[tokio::test]
async fn test_get_falls_back_to_snapshot_when_server_unreachable() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = ClientConfig::new("http://127.0.0.1:1")
        .with_retry(1, 10)
        .with_timeouts(200, 500)
        .with_snapshot_path(dir.path());
    let service = NacosConfigService::new(config).await.unwrap();

    // simulate an earlier successful read by placing the snapshot file
    let snapshot = dir
        .path()
        .join("snapshot")
        .join("public")
        .join("DEFAULT_GROUP")
        .join("app");
    std::fs::create_dir_all(snapshot.parent().unwrap()).unwrap();
    std::fs::write(&snapshot, "cached-value").unwrap();

    let value = service.get_config("app", "DEFAULT_GROUP").await.unwrap();
    assert_eq!(value, Some("cached-value".to_string()));
}

#[tokio::test]
async fn test_failover_file_wins_over_server() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = ClientConfig::new("http://127.0.0.1:1")
        .with_retry(1, 10)
        .with_timeouts(200, 500)
        .with_snapshot_path(dir.path());
    let service = NacosConfigService::new(config).await.unwrap();

    let failover = dir
        .path()
        .join("data")
        .join("config-data")
        .join("public")
        .join("DEFAULT_GROUP")
        .join("app");
    std::fs::create_dir_all(failover.parent().unwrap()).unwrap();
    std::fs::write(&failover, "pinned-value").unwrap();

    // no server is reachable, yet the failover value is served
    let value = service.get_config("app", "DEFAULT_GROUP").await.unwrap();
    assert_eq!(value, Some("pinned-value".to_string()));
}

#[tokio::test]
async fn test_empty_snapshot_reads_as_absent() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = ClientConfig::new("http://127.0.0.1:1")
        .with_retry(1, 10)
        .with_timeouts(200, 500)
        .with_snapshot_path(dir.path());
    let service = NacosConfigService::new(config).await.unwrap();

    // a removed config leaves an empty snapshot behind
    let snapshot = dir
        .path()
        .join("snapshot")
        .join("public")
        .join("DEFAULT_GROUP")
        .join("app");
    std::fs::create_dir_all(snapshot.parent().unwrap()).unwrap();
    std::fs::write(&snapshot, "").unwrap();

    let value = service.get_config("app", "DEFAULT_GROUP").await.unwrap();
    assert_eq!(value, None);
}

// ============== Subscription lifecycle (no server) ==============

#[tokio::test]
async fn test_subscribe_and_shutdown_without_server() {
    let service = NacosConfigService::new(offline_config()).await.unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = counter.clone();
    let handle = service
        .subscribe(
            "app",
            "DEFAULT_GROUP",
            Arc::new(FnConfigChangeListener::new(move |_: ConfigChangeEvent| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

    // no server means no events, and teardown must still be orderly
    handle.unsubscribe();
    service.shutdown().await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let service = NacosConfigService::new(offline_config()).await.unwrap();
    let handle = service
        .subscribe(
            "app",
            "DEFAULT_GROUP",
            Arc::new(FnConfigChangeListener::new(|_| {})),
        )
        .await
        .unwrap();

    handle.unsubscribe();
    handle.unsubscribe();
    service.shutdown().await;
}
