//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, builds a `Registry` on the
//! blocking ureq transport with file-backed token storage, and drives every
//! client operation over real HTTP. Validates request building, auth header
//! rotation and the hook pipeline against an actual server.

use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use admin_core::{Config, MemoryStorage, Registry, Storage, UreqTransport};
use serde_json::json;

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn config(addr: SocketAddr, dir: &tempfile::TempDir) -> Config {
    let mut config = Config::for_host(&format!("http://{addr}"));
    config.storage_path = dir.path().join("session.json");
    config.timeout = Some(Duration::from_secs(5));
    config
}

#[test]
fn merged_image_lifecycle() {
    let addr = start_server();
    let dir = tempfile::tempdir().unwrap();
    let config = config(addr, &dir);
    let registry = Registry::from_config(&config).unwrap();

    // Step 1: anonymous list is rejected and recovered into placeholders.
    let page = registry.merged_images.list(None).unwrap();
    assert_eq!(page.count, 3);
    assert!(page.results.iter().all(|image| image.id == -1));

    // Step 2: log in; the token is persisted.
    assert!(!registry.auth.login("alice", "wrong").unwrap());
    assert!(registry.auth.login("alice", "wonderland").unwrap());
    let token = registry.auth.token().unwrap();
    assert_eq!(token.user_id(), 2);
    assert_eq!(token.user_name(), Some("alice"));
    assert_eq!(token.full_name(), Some("Alice Liddell"));
    assert!(config.storage_path.exists());

    // Step 3: create with the first person only.
    let created = registry
        .merged_images
        .create(
            &json!({"background_name": "bg2", "person_1_identification": 1}),
            None,
        )
        .unwrap();
    assert!(created.id > 0);
    assert_eq!(created.user, "alice");
    assert_eq!(
        created.background_image_url,
        format!("http://{addr}/media/background-image/bg2.png")
    );
    assert_eq!(created.person_1_identification_detail.nation1, "Miao");
    assert_eq!(created.person_2_identification, -1);
    assert!(!created.is_merged());
    let id = created.id;

    // Step 4: merging too early is reported, not masked.
    assert!(registry.merge(id).is_err());

    // Step 5: add the second person and merge.
    let patched = registry
        .merged_images
        .partial_update(id, &json!({"person_2_identification": 2}), None)
        .unwrap();
    assert_eq!(patched.person_2_identification_detail.nation1, "Dai");
    assert!(registry.travelled().unwrap().results.is_empty());

    let merged = registry.merge(id).unwrap();
    assert!(merged.is_merged());
    let travelled = registry.travelled().unwrap();
    assert_eq!(travelled.count, 1);
    assert_eq!(travelled.results[0].id, id);

    // Step 6: full replace and fetch.
    let replaced = registry
        .merged_images
        .replace(id, &json!({"background_name": "bg3"}), None)
        .unwrap();
    assert_eq!(replaced.background_name, "bg3");
    let fetched = registry.merged_images.retrieve(id, None).unwrap();
    assert_eq!(fetched, replaced);

    // Step 7: delete; a second delete and a fetch both fail softly.
    assert!(registry.merged_images.delete(id, None));
    assert!(!registry.merged_images.delete(id, None));
    assert_eq!(registry.merged_images.retrieve(id, None).unwrap().id, -1);

    // Step 8: logout drops the header on the next request.
    assert!(registry.auth.logout().unwrap());
    assert!(!registry.auth.is_logged_in());
    let page = registry.merged_images.list(None).unwrap();
    assert!(page.results.iter().all(|image| image.id == -1));
}

#[test]
fn identification_actions() {
    let addr = start_server();
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::from_config(&config(addr, &dir)).unwrap();

    let page = registry.identifications.list(None).unwrap();
    assert_eq!(page.count, 2);
    assert_eq!(page.results[0].nation(), "Miao");

    let corrected = registry.change_nation(1, "Dai").unwrap();
    assert_eq!(corrected.nation(), "Dai");
    assert_eq!(corrected.nation1, "Miao");

    let assessed = registry.user_assess(2, "good").unwrap();
    assert_eq!(assessed.id, 2);
    assert_eq!(assessed.user_assess, "good");

    // Unknown id: the default error hook yields the placeholder.
    assert_eq!(registry.change_nation(99, "Dai").unwrap().id, -1);
}

#[test]
fn session_survives_restart() {
    let addr = start_server();
    let dir = tempfile::tempdir().unwrap();
    let config = config(addr, &dir);

    let first = Registry::from_config(&config).unwrap();
    assert!(first.auth.login("admin", "admin-pass").unwrap());
    let before = first.auth.token().unwrap();
    drop(first);

    let second = Registry::from_config(&config).unwrap();
    assert!(second.auth.is_logged_in());
    assert_eq!(second.auth.token().unwrap().value(), before.value());
    let created = second
        .merged_images
        .create(&json!({"background_name": "bg1"}), None)
        .unwrap();
    assert_eq!(created.user, "admin");
}

#[test]
fn unreachable_server_yields_placeholders() {
    // Bind then drop to get a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let mut config = Config::for_host(&format!("http://{addr}"));
    config.list_placeholder_count = 2;
    let storage = MemoryStorage::new();
    let registry = Registry::new(
        &config,
        Rc::new(storage.clone()),
        Rc::new(UreqTransport::new(Some(Duration::from_secs(2)))),
    )
    .unwrap();

    assert!(!registry.auth.login("alice", "wonderland").unwrap());
    assert!(storage.get(&config.storage_key).unwrap().is_none());

    let page = registry.merged_images.list(None).unwrap();
    assert_eq!(page.count, 2);
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.results[0].user, "Anonymous");
    assert_eq!(page.results[0].background_name, "bg1");

    let image = registry.identifications.retrieve(1, None).unwrap();
    assert_eq!(image.id, -1);
}
