//! Integration tests for the Nacos config client.
//!
//! These tests require a running Nacos-compatible server.
//!
//! To run them:
//! 1. Start a server on 127.0.0.1:8848 (e.g. via docker)
//! 2. Run: cargo test --test integration_test -- --ignored

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nacos_config_client::{
    ClientConfig, ConfigChangeEvent, FnConfigChangeListener, NacosConfigService,
};

const TEST_SERVER_ADDR: &str = "http://127.0.0.1:8848";
const TEST_USERNAME: &str = "nacos";
const TEST_PASSWORD: &str = "nacos";
const TEST_GROUP: &str = "DEFAULT_GROUP";

fn test_config() -> ClientConfig {
    ClientConfig::new(TEST_SERVER_ADDR)
        .with_auth(TEST_USERNAME, TEST_PASSWORD)
        .with_timeouts(5000, 10000)
        .with_snapshot_path(std::env::temp_dir().join("nacos-config-client-it"))
}

fn unique_data_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

async fn service() -> NacosConfigService {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    NacosConfigService::new(test_config())
        .await
        .expect("failed to build service")
}

#[tokio::test]
#[ignore = "requires running server"]
async fn test_publish_then_get() {
    let service = service().await;
    let data_id = unique_data_id("publish-get");

    assert!(service
        .publish_config(&data_id, TEST_GROUP, "hello")
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let value = service.get_config(&data_id, TEST_GROUP).await.unwrap();
    assert_eq!(value, Some("hello".to_string()));

    service.remove_config(&data_id, TEST_GROUP).await.unwrap();
    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires running server"]
async fn test_remove_then_get_returns_none() {
    let service = service().await;
    let data_id = unique_data_id("remove-get");

    service
        .publish_config(&data_id, TEST_GROUP, "to-be-removed")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(service.remove_config(&data_id, TEST_GROUP).await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let value = service.get_config(&data_id, TEST_GROUP).await.unwrap();
    assert_eq!(value, None);
    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires running server"]
async fn test_subscriber_sees_updates_in_order() {
    let service = service().await;
    let data_id = unique_data_id("subscribe");

    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let _handle = service
        .subscribe(
            &data_id,
            TEST_GROUP,
            Arc::new(FnConfigChangeListener::new(move |event: ConfigChangeEvent| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((event.old_content.clone(), event.content.clone()));
            })),
        )
        .await
        .unwrap();

    service
        .publish_config(&data_id, TEST_GROUP, "v1")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    service
        .publish_config(&data_id, TEST_GROUP, "v2")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let events = seen.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            ("".to_string(), "v1".to_string()),
            ("v1".to_string(), "v2".to_string()),
        ]
    );

    service.remove_config(&data_id, TEST_GROUP).await.unwrap();
    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires running server"]
async fn test_disposed_subscription_receives_nothing() {
    let service = service().await;
    let data_id = unique_data_id("dispose");

    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = counter.clone();
    let handle = service
        .subscribe(
            &data_id,
            TEST_GROUP,
            Arc::new(FnConfigChangeListener::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

    service
        .publish_config(&data_id, TEST_GROUP, "v1")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    handle.unsubscribe();

    service
        .publish_config(&data_id, TEST_GROUP, "v2")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    service.remove_config(&data_id, TEST_GROUP).await.unwrap();
    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires running server"]
async fn test_failing_listener_does_not_block_siblings() {
    let service = service().await;
    let data_id = unique_data_id("isolation");

    let good_calls = Arc::new(AtomicUsize::new(0));
    let a = good_calls.clone();
    let b = good_calls.clone();

    let _h1 = service
        .subscribe(
            &data_id,
            TEST_GROUP,
            Arc::new(FnConfigChangeListener::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();
    let _h2 = service
        .subscribe(
            &data_id,
            TEST_GROUP,
            Arc::new(FnConfigChangeListener::new(|_| {
                panic!("listener blew up");
            })),
        )
        .await
        .unwrap();
    let _h3 = service
        .subscribe(
            &data_id,
            TEST_GROUP,
            Arc::new(FnConfigChangeListener::new(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

    service
        .publish_config(&data_id, TEST_GROUP, "boom")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    // both healthy listeners ran despite the panicking one
    assert_eq!(good_calls.load(Ordering::SeqCst), 2);

    service.remove_config(&data_id, TEST_GROUP).await.unwrap();
    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires running server"]
async fn test_namespaced_config_round_trip() {
    let config = test_config().with_namespace("");
    let service = NacosConfigService::new(config).await.unwrap();
    let data_id = unique_data_id("tenant");

    service
        .publish_config_with_type(&data_id, TEST_GROUP, "{\"a\":1}", "json")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let value = service.get_config(&data_id, TEST_GROUP).await.unwrap();
    assert_eq!(value, Some("{\"a\":1}".to_string()));

    service.remove_config(&data_id, TEST_GROUP).await.unwrap();
    service.shutdown().await;
}
