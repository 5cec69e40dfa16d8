//! Resource manager tests
//!
//! Lookup misses must return the per-class sentinel, never a generic error.

use std::collections::HashMap;

use tokio::sync::mpsc;

use weir_protocol::Error;

use super::{CacheConfig, ConditionConfig, Manager, ManagerConfig, ProcessorConfig, RateLimitConfig};

fn manager_with(config: ManagerConfig) -> Manager {
    Manager::new(config).expect("config must build")
}

#[tokio::test]
async fn test_manager_cache() {
    let mut caches = HashMap::new();
    caches.insert("foo".to_string(), CacheConfig::Memory);
    let manager = manager_with(ManagerConfig {
        caches,
        ..Default::default()
    });

    let cache = manager.get_cache("foo").unwrap();
    cache.set("k", b"v".to_vec()).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), b"v");
    assert_eq!(
        cache.add("k", b"other".to_vec()).await.unwrap_err(),
        Error::KeyAlreadyExists
    );
    cache.delete("k").await.unwrap();
    assert!(cache.get("k").await.is_err());

    assert_eq!(manager.get_cache("bar").unwrap_err(), Error::CacheNotFound);
}

#[tokio::test]
async fn test_manager_rate_limit() {
    let mut rate_limits = HashMap::new();
    rate_limits.insert(
        "foo".to_string(),
        RateLimitConfig::Local {
            count: 2,
            interval_ms: 60_000,
        },
    );
    let manager = manager_with(ManagerConfig {
        rate_limits,
        ..Default::default()
    });

    let limit = manager.get_rate_limit("foo").unwrap();
    assert!(limit.access().await.unwrap().is_zero());
    assert!(limit.access().await.unwrap().is_zero());
    assert!(!limit.access().await.unwrap().is_zero());

    assert_eq!(
        manager.get_rate_limit("bar").unwrap_err(),
        Error::RateLimitNotFound
    );
}

#[test]
fn test_manager_condition() {
    let mut conditions = HashMap::new();
    conditions.insert("foo".to_string(), ConditionConfig::Static { value: true });
    let manager = manager_with(ManagerConfig {
        conditions,
        ..Default::default()
    });

    let condition = manager.get_condition("foo").unwrap();
    assert!(condition.check(&weir_protocol::Batch::new()));

    assert_eq!(
        manager.get_condition("bar").unwrap_err(),
        Error::ConditionNotFound
    );
}

#[test]
fn test_manager_processor() {
    let mut processors = HashMap::new();
    processors.insert(
        "foo".to_string(),
        ProcessorConfig::Bloblang {
            value: "content()".to_string(),
        },
    );
    let manager = manager_with(ManagerConfig {
        processors,
        ..Default::default()
    });

    assert!(manager.get_processor("foo").is_ok());
    assert_eq!(
        manager.get_processor("bar").unwrap_err(),
        Error::ProcessorNotFound
    );
}

#[test]
fn test_manager_bad_configs_fail_fast() {
    let mut conditions = HashMap::new();
    conditions.insert(
        "broken".to_string(),
        ConditionConfig::Bloblang {
            value: "json(".to_string(),
        },
    );
    assert!(Manager::new(ManagerConfig {
        conditions,
        ..Default::default()
    })
    .is_err());

    let mut processors = HashMap::new();
    processors.insert(
        "broken".to_string(),
        ProcessorConfig::Bloblang {
            value: "not_a_function()".to_string(),
        },
    );
    assert!(Manager::new(ManagerConfig {
        processors,
        ..Default::default()
    })
    .is_err());

    let mut rate_limits = HashMap::new();
    rate_limits.insert(
        "broken".to_string(),
        RateLimitConfig::Local {
            count: 0,
            interval_ms: 0,
        },
    );
    assert!(Manager::new(ManagerConfig {
        rate_limits,
        ..Default::default()
    })
    .is_err());
}

#[test]
fn test_manager_nested_condition() {
    let raw = r#"{
        "conditions": {
            "big_batch": {
                "type": "check_interpolation",
                "value": "${!batch_size()}",
                "condition": {"type": "text", "operator": "equals_cs", "arg": "2"}
            }
        }
    }"#;
    let config: ManagerConfig = serde_json::from_str(raw).unwrap();
    let manager = manager_with(config);

    let condition = manager.get_condition("big_batch").unwrap();
    let two_parts = weir_protocol::Batch::from_parts(vec![
        weir_protocol::Part::from("a"),
        weir_protocol::Part::from("b"),
    ]);
    assert!(condition.check(&two_parts));
    assert!(!condition.check(&weir_protocol::Batch::from_bytes("solo")));
}

#[test]
fn test_unknown_type_fails_at_deserialization() {
    let raw = r#"{"caches":{"foo":{"type":"quantum"}}}"#;
    assert!(serde_json::from_str::<ManagerConfig>(raw).is_err());
}

// ============================================================================
// Pipes
// ============================================================================

#[test]
fn test_pipe_get_set_unset() {
    let manager = Manager::empty();
    assert_eq!(manager.get_pipe("foo").unwrap_err(), Error::PipeNotFound);

    let (tx, _rx) = mpsc::channel(1);
    manager.set_pipe("foo", tx.clone());
    assert!(manager.get_pipe("foo").unwrap().same_channel(&tx));

    manager.unset_pipe("foo", &tx);
    assert_eq!(manager.get_pipe("foo").unwrap_err(), Error::PipeNotFound);
}

#[test]
fn test_stale_unset_is_a_noop() {
    let manager = Manager::empty();

    let (old_tx, _old_rx) = mpsc::channel(1);
    manager.set_pipe("foo", old_tx.clone());

    // The name is re-bound before the old owner unsets.
    let (new_tx, _new_rx) = mpsc::channel(1);
    manager.set_pipe("foo", new_tx.clone());

    manager.unset_pipe("foo", &old_tx);
    assert!(manager.get_pipe("foo").unwrap().same_channel(&new_tx));
}
