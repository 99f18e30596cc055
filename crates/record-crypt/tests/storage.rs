//! End-to-end tests of the storage facade over an in-memory store.

mod support;

use std::io::Write;
use std::sync::Arc;

use common::protocol::{FilterValue, FindFilter, FindOptions, MigrationProgress, Record, WireRecord};
use record_crypt::secrets::{FileSecretSource, SecretOrKey, SecretsData, StaticSecrets};
use record_crypt::{Storage, StorageBuilder};
use support::{MemoryStore, RotatingSecrets};

fn pw_secrets(current: u32) -> SecretsData {
    SecretsData::new(
        current,
        vec![SecretOrKey::new("pw0", 0), SecretOrKey::new("pw1", 1)],
    )
    .unwrap()
}

async fn client(store: Arc<MemoryStore>, source: RotatingSecrets) -> Storage<Arc<MemoryStore>> {
    StorageBuilder::new()
        .environment_id("env-1")
        .secret_source(source)
        .build(store)
        .await
        .unwrap()
}

#[tokio::test]
async fn write_then_read_under_two_secret_versions() {
    let store = MemoryStore::new();
    let storage = client(Arc::clone(&store), RotatingSecrets::new(pw_secrets(1))).await;

    let record = Record {
        key: "user-1".into(),
        key2: Some("alt".into()),
        key3: None,
        profile_key: Some("profile-1".into()),
        range_key: Some(7),
        body: Some(r#"{"name":"Ada"}"#.into()),
    };
    storage.write("US", record.clone()).await.unwrap();

    let stored = store.all("us");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].version, 1);
    assert_eq!(stored[0].key, storage.codec().hash("user-1"));
    let body = stored[0].body.as_deref().unwrap();
    assert!(body.starts_with("2:"));
    assert!(!body.contains("Ada"));

    assert_eq!(storage.read("us", "user-1").await.unwrap(), Some(record));
}

#[tokio::test]
async fn records_written_under_old_secret_stay_readable() {
    let store = MemoryStore::new();
    let secrets = RotatingSecrets::new(pw_secrets(0));
    let storage = client(Arc::clone(&store), secrets.clone()).await;

    storage
        .write("us", Record::new("old").with_body("written with pw0"))
        .await
        .unwrap();
    secrets.rotate(pw_secrets(1));
    storage
        .write("us", Record::new("new").with_body("written with pw1"))
        .await
        .unwrap();

    let old = storage.read("us", "old").await.unwrap().unwrap();
    let new = storage.read("us", "new").await.unwrap().unwrap();
    assert_eq!(old.body.as_deref(), Some("written with pw0"));
    assert_eq!(new.body.as_deref(), Some("written with pw1"));

    let mut versions: Vec<u32> = store.all("us").iter().map(|r| r.version).collect();
    versions.sort_unstable();
    assert_eq!(versions, [0, 1]);
}

#[tokio::test]
async fn plaintext_mode_without_secrets() {
    let store = MemoryStore::new();
    let storage = StorageBuilder::new()
        .environment_id("env-1")
        .build(Arc::clone(&store))
        .await
        .unwrap();

    storage
        .write("us", Record::new("k").with_body("visible"))
        .await
        .unwrap();
    let stored = store.all("us");
    assert!(stored[0].body.as_deref().unwrap().starts_with("pt:"));
    assert_eq!(stored[0].version, 0);
    assert_eq!(
        storage.read("us", "k").await.unwrap().unwrap().body.as_deref(),
        Some("visible")
    );
}

#[tokio::test]
async fn bare_string_secret_is_version_zero() {
    let store = MemoryStore::new();
    let storage = StorageBuilder::new()
        .environment_id("env-1")
        .secret_source(StaticSecrets::new("just-a-password"))
        .build(Arc::clone(&store))
        .await
        .unwrap();

    storage.write("de", Record::new("k")).await.unwrap();
    assert_eq!(store.all("de")[0].version, 0);
    assert!(storage.read("de", "k").await.unwrap().is_some());
}

#[tokio::test]
async fn find_isolates_undecodable_records() {
    let store = MemoryStore::new();
    let storage = client(Arc::clone(&store), RotatingSecrets::new(pw_secrets(1))).await;
    let records: Vec<Record> = (0..6)
        .map(|i| Record::new(format!("key-{i}")).with_body(format!("body-{i}")))
        .collect();
    storage.batch_write("us", records).await.unwrap();

    for name in ["key-1", "key-4"] {
        let hashed = storage.codec().hash(name);
        let mut raw = store
            .all("us")
            .into_iter()
            .find(|r| r.key == hashed)
            .unwrap();
        raw.body = Some("2:AAAA".into());
        store.insert_raw("us", raw);
    }

    let result = storage
        .find("us", &FindFilter::new(), FindOptions::default())
        .await
        .unwrap();
    assert_eq!(result.records.len(), 4);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.meta.total, 6);

    let mut failed: Vec<_> = result.errors.iter().map(|f| f.raw.key.clone()).collect();
    failed.sort();
    let mut expected = vec![storage.codec().hash("key-1"), storage.codec().hash("key-4")];
    expected.sort();
    assert_eq!(failed, expected);
    assert!(result
        .records
        .iter()
        .all(|r| r.body.as_deref() == Some(&format!("body-{}", &r.key[4..])[..])));
}

#[tokio::test]
async fn find_by_searchable_field_and_delete() {
    let store = MemoryStore::new();
    let storage = StorageBuilder::new()
        .environment_id("env-1")
        .normalize_keys(true)
        .secret_source(StaticSecrets::new(pw_secrets(1)))
        .build(Arc::clone(&store))
        .await
        .unwrap();

    storage
        .batch_write(
            "us",
            vec![
                Record {
                    profile_key: Some("Team-A".into()),
                    ..Record::new("alice")
                },
                Record {
                    profile_key: Some("team-b".into()),
                    ..Record::new("bob")
                },
            ],
        )
        .await
        .unwrap();

    let filter = FindFilter::new().with("profile_key", "TEAM-A");
    let found = storage.find_one("us", &filter).await.unwrap().unwrap();
    assert_eq!(found.key, "alice");
    assert_eq!(found.profile_key.as_deref(), Some("Team-A"));

    let filter = FindFilter::new().with("key", FilterValue::not("ALICE".into()));
    let result = storage
        .find("us", &filter, FindOptions::default())
        .await
        .unwrap();
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].key, "bob");

    storage.delete("us", "Alice").await.unwrap();
    assert!(storage.read("us", "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn migration_finishes_in_ceil_k_over_p_steps() {
    const K: usize = 7;
    const P: u32 = 3;

    let store = MemoryStore::new();
    let secrets = RotatingSecrets::new(pw_secrets(0));
    let storage = client(Arc::clone(&store), secrets.clone()).await;
    let records: Vec<Record> = (0..K)
        .map(|i| Record::new(format!("key-{i}")).with_body(format!("body-{i}")))
        .collect();
    storage.batch_write("us", records).await.unwrap();
    assert!(store.all("us").iter().all(|r| r.version == 0));

    secrets.rotate(pw_secrets(1));

    let mut calls = 0;
    let mut migrated = 0;
    loop {
        let progress = storage.migrate("us", P, None).await.unwrap();
        calls += 1;
        migrated += progress.migrated;
        if progress.total_left == 0 {
            break;
        }
        assert!(calls < 10, "migration did not converge");
    }

    assert_eq!(calls, K.div_ceil(P as usize));
    assert_eq!(migrated, K as u64);
    assert!(store.all("us").iter().all(|r| r.version == 1));

    let after = storage.migrate("us", P, None).await.unwrap();
    assert_eq!(after.migrated, 0);
    assert_eq!(after.total_left, 0);

    for i in 0..K {
        let record = storage.read("us", &format!("key-{i}")).await.unwrap().unwrap();
        assert_eq!(record.body, Some(format!("body-{i}")));
    }
}

#[tokio::test]
async fn migration_reseals_opaque_legacy_body_in_place() {
    let store = MemoryStore::new();
    let secrets = RotatingSecrets::new(pw_secrets(0));
    let storage = client(Arc::clone(&store), secrets.clone()).await;

    // Older writers stored the raw body with no packed key metadata.
    let hashed = storage.codec().hash("legacy");
    let sealed = storage.codec().engine().encrypt("opaque legacy").await.unwrap();
    assert_eq!(sealed.secret_version, 0);
    store.insert_raw(
        "us",
        WireRecord {
            key: hashed.clone(),
            body: Some(sealed.message),
            version: 0,
            ..WireRecord::default()
        },
    );

    secrets.rotate(pw_secrets(1));

    let progress = storage.migrate("us", 10, None).await.unwrap();
    assert_eq!(
        progress,
        MigrationProgress {
            migrated: 1,
            total_left: 0
        }
    );

    let stored = store.all("us");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key, hashed);
    assert_eq!(stored[0].version, 1);

    let again = storage.migrate("us", 10, None).await.unwrap();
    assert_eq!(again, MigrationProgress::default());

    let record = storage.read("us", "legacy").await.unwrap().unwrap();
    assert_eq!(record.body.as_deref(), Some("opaque legacy"));
}

#[tokio::test]
async fn file_secret_source_picks_up_rotation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"currentVersion":0,"secrets":[{{"secret":"pw0","version":0}}]}}"#).unwrap();

    let store = MemoryStore::new();
    let storage = StorageBuilder::new()
        .environment_id("env-1")
        .secret_source(FileSecretSource::new(file.path()))
        .build(Arc::clone(&store))
        .await
        .unwrap();
    storage.write("us", Record::new("a")).await.unwrap();

    std::fs::write(
        file.path(),
        r#"{"currentVersion":1,"secrets":[{"secret":"pw0","version":0},{"secret":"pw1","version":1}]}"#,
    )
    .unwrap();
    storage.write("us", Record::new("b")).await.unwrap();

    let hashed_b = storage.codec().hash("b");
    let b = store.all("us").into_iter().find(|r| r.key == hashed_b).unwrap();
    assert_eq!(b.version, 1);
    assert!(storage.read("us", "a").await.unwrap().is_some());
}
