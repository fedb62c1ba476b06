//! Tests for Store Registry
//!
//! These tests verify:
//! - Open / create / NotFound semantics
//! - Name validation (1..=32 Unicode characters)
//! - Open counting and sharing of one session between handles
//! - Delete while open fails with InUse
//! - Listing per owner, read from store metadata
//! - Long multi-byte names on the file backend
//! - Cross-suite authorization (open_by_owner, open_shared)
//! - Concurrent creation through open_shared

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use atlasrms::{AuthMode, Config, MemoryBlobStore, OwnerId, RmsError, StoreRegistry};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_registry() -> (TempDir, StoreRegistry) {
    let temp_dir = TempDir::new().unwrap();
    let registry = StoreRegistry::open_path(temp_dir.path()).unwrap();
    (temp_dir, registry)
}

fn memory_registry() -> StoreRegistry {
    StoreRegistry::with_backend(Config::default(), Arc::new(MemoryBlobStore::new()))
}

fn owner() -> OwnerId {
    OwnerId::new("acme", "notes")
}

fn other_suite() -> OwnerId {
    OwnerId::new("globex", "reader")
}

// =============================================================================
// Open / Create Tests
// =============================================================================

#[test]
fn test_open_missing_without_create() {
    let (_temp, registry) = setup_temp_registry();

    let result = registry.open_store(&owner(), "inbox", false);

    assert!(matches!(result, Err(RmsError::NotFound { .. })));
}

#[test]
fn test_open_with_create_then_reopen() {
    let (_temp, registry) = setup_temp_registry();

    let created = registry.open_store(&owner(), "inbox", true).unwrap();
    assert_eq!(created.num_records().unwrap(), 0);
    assert_eq!(created.version().unwrap(), 0);
    created.close().unwrap();

    let reopened = registry.open_store(&owner(), "inbox", false).unwrap();
    assert_eq!(reopened.name().unwrap(), "inbox");
    assert_eq!(reopened.owner().unwrap(), owner());
    assert_eq!(reopened.auth_mode().unwrap(), AuthMode::Private);
}

#[test]
fn test_name_length_limits() {
    let registry = memory_registry();

    assert!(matches!(
        registry.open_store(&owner(), "", true),
        Err(RmsError::InvalidName { len: 0 })
    ));

    let too_long = "n".repeat(33);
    assert!(matches!(
        registry.open_store(&owner(), &too_long, true),
        Err(RmsError::InvalidName { len: 33 })
    ));

    let longest = "n".repeat(32);
    registry.open_store(&owner(), &longest, true).unwrap();
}

#[test]
fn test_name_counts_characters_not_bytes() {
    let registry = memory_registry();

    // 32 characters, 64 bytes
    let name = "é".repeat(32);
    let store = registry.open_store(&owner(), &name, true).unwrap();

    assert_eq!(store.name().unwrap(), name);
    assert_eq!(registry.list_stores(&owner()).unwrap(), vec![name]);
}

#[test]
fn test_longest_multibyte_name_on_disk() {
    let (temp, registry) = setup_temp_registry();
    assert_eq!(registry.config().data_dir, temp.path());

    // 32 characters, 128 bytes
    let name = "😀".repeat(32);
    let store = registry.open_store(&owner(), &name, true).unwrap();
    let id = store.add_record(b"smile").unwrap();
    store.close().unwrap();

    assert_eq!(registry.list_stores(&owner()).unwrap(), vec![name.clone()]);

    let reopened = StoreRegistry::open_path(temp.path()).unwrap();
    let store = reopened.open_store(&owner(), &name, false).unwrap();
    assert_eq!(store.name().unwrap(), name);
    assert_eq!(store.get_record(id).unwrap(), b"smile");
    store.close().unwrap();

    reopened.delete_store(&owner(), &name).unwrap();
    assert!(reopened.list_stores(&owner()).unwrap().is_empty());
}

#[test]
fn test_long_owner_and_cjk_name_on_disk() {
    let (temp, registry) = setup_temp_registry();
    let long_owner = OwnerId::new("a-fairly-long-vendor-name", "and-a-suite");

    // 32 characters, 96 bytes
    let name = "記".repeat(32);
    registry.open_store(&long_owner, &name, true).unwrap().close().unwrap();

    let reopened = StoreRegistry::open_path(temp.path()).unwrap();
    assert_eq!(reopened.list_stores(&long_owner).unwrap(), vec![name.clone()]);
    assert!(reopened.list_stores(&owner()).unwrap().is_empty());
    reopened.open_store(&long_owner, &name, false).unwrap();
}

#[test]
fn test_same_name_different_owners_are_distinct() {
    let registry = memory_registry();

    let mine = registry.open_store(&owner(), "shared-name", true).unwrap();
    let theirs = registry.open_store(&other_suite(), "shared-name", true).unwrap();

    mine.add_record(b"mine").unwrap();

    assert_eq!(mine.num_records().unwrap(), 1);
    assert_eq!(theirs.num_records().unwrap(), 0);
}

// =============================================================================
// Open Count Tests
// =============================================================================

#[test]
fn test_handles_share_one_session() {
    let registry = memory_registry();

    let first = registry.open_store(&owner(), "inbox", true).unwrap();
    let second = registry.open_store(&owner(), "inbox", false).unwrap();
    assert_eq!(registry.open_count(&owner(), "inbox"), 2);

    let id = first.add_record(b"hello").unwrap();

    assert_eq!(second.get_record(id).unwrap(), b"hello");
    assert_eq!(second.version().unwrap(), first.version().unwrap());
}

#[test]
fn test_store_stays_open_until_last_close() {
    let registry = memory_registry();

    let first = registry.open_store(&owner(), "inbox", true).unwrap();
    let second = registry.open_store(&owner(), "inbox", false).unwrap();

    first.close().unwrap();
    assert!(registry.is_open(&owner(), "inbox"));
    assert!(second.is_open());
    second.add_record(b"still works").unwrap();

    second.close().unwrap();
    assert!(!registry.is_open(&owner(), "inbox"));
    assert!(matches!(first.num_records(), Err(RmsError::NotOpen)));
    assert!(matches!(second.add_record(b"x"), Err(RmsError::NotOpen)));
}

#[test]
fn test_excess_close_fails() {
    let registry = memory_registry();

    let store = registry.open_store(&owner(), "inbox", true).unwrap();
    store.close().unwrap();

    assert!(matches!(store.close(), Err(RmsError::NotOpen)));
}

#[test]
fn test_drop_releases_handle() {
    let registry = memory_registry();

    {
        let _store = registry.open_store(&owner(), "inbox", true).unwrap();
        assert_eq!(registry.open_count(&owner(), "inbox"), 1);
    }

    assert_eq!(registry.open_count(&owner(), "inbox"), 0);
    registry.delete_store(&owner(), "inbox").unwrap();
}

// =============================================================================
// Delete / List Tests
// =============================================================================

#[test]
fn test_delete_open_store_fails() {
    let registry = memory_registry();

    let store = registry.open_store(&owner(), "inbox", true).unwrap();

    assert!(matches!(
        registry.delete_store(&owner(), "inbox"),
        Err(RmsError::InUse { .. })
    ));

    store.close().unwrap();
    registry.delete_store(&owner(), "inbox").unwrap();

    assert!(matches!(
        registry.open_store(&owner(), "inbox", false),
        Err(RmsError::NotFound { .. })
    ));
}

#[test]
fn test_delete_missing_store() {
    let registry = memory_registry();

    assert!(matches!(
        registry.delete_store(&owner(), "ghost"),
        Err(RmsError::NotFound { .. })
    ));
}

#[test]
fn test_delete_empty_name() {
    let registry = memory_registry();

    assert!(matches!(
        registry.delete_store(&owner(), ""),
        Err(RmsError::InvalidName { .. })
    ));
}

#[test]
fn test_list_stores_per_owner() {
    let registry = memory_registry();

    assert!(registry.list_stores(&owner()).unwrap().is_empty());

    for name in ["zeta", "alpha", "mid"] {
        registry.open_store(&owner(), name, true).unwrap().close().unwrap();
    }
    registry.open_store(&other_suite(), "foreign", true).unwrap().close().unwrap();

    assert_eq!(
        registry.list_stores(&owner()).unwrap(),
        vec!["alpha", "mid", "zeta"]
    );
    assert_eq!(registry.list_stores(&other_suite()).unwrap(), vec!["foreign"]);
}

#[test]
fn test_list_stores_skips_unreadable_blob() {
    let (temp, registry) = setup_temp_registry();
    registry.open_store(&owner(), "inbox", true).unwrap().close().unwrap();

    // Plant garbage that shares the owner's key prefix
    let stores_dir = temp.path().join("stores");
    let blob_name = fs::read_dir(&stores_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .find(|name| name.ends_with(".rms"))
        .unwrap();
    let prefix = &blob_name[..blob_name.find('-').unwrap() + 1];
    fs::write(stores_dir.join(format!("{}garbage.rms", prefix)), b"not a store").unwrap();

    assert_eq!(registry.list_stores(&owner()).unwrap(), vec!["inbox"]);
}

// =============================================================================
// Authorization Tests
// =============================================================================

#[test]
fn test_open_by_owner_private_denied() {
    let registry = memory_registry();
    registry.open_store(&owner(), "secret", true).unwrap().close().unwrap();

    let result = registry.open_by_owner(&other_suite(), &owner(), "secret");

    assert!(matches!(result, Err(RmsError::PermissionDenied(_))));
    assert!(!registry.is_open(&owner(), "secret"));
}

#[test]
fn test_open_by_owner_any_allowed_read_only() {
    let registry = memory_registry();
    let mine = registry
        .open_shared(&owner(), "public", true, AuthMode::Any, false)
        .unwrap();
    let id = mine.add_record(b"news").unwrap();

    let theirs = registry.open_by_owner(&other_suite(), &owner(), "public").unwrap();

    assert_eq!(theirs.get_record(id).unwrap(), b"news");
    assert_eq!(theirs.caller(), &other_suite());
    assert!(matches!(theirs.add_record(b"spam"), Err(RmsError::PermissionDenied(_))));
    assert!(matches!(theirs.delete_record(id), Err(RmsError::PermissionDenied(_))));
    assert_eq!(registry.open_count(&owner(), "public"), 2);
}

#[test]
fn test_open_by_owner_writable_store() {
    let registry = memory_registry();
    registry
        .open_shared(&owner(), "board", true, AuthMode::Any, true)
        .unwrap()
        .close()
        .unwrap();

    let theirs = registry.open_by_owner(&other_suite(), &owner(), "board").unwrap();
    let id = theirs.add_record(b"posted").unwrap();

    // Only the owner may change authorization
    assert!(matches!(
        theirs.set_mode(AuthMode::Private, false),
        Err(RmsError::PermissionDenied(_))
    ));

    let mine = registry.open_store(&owner(), "board", false).unwrap();
    assert_eq!(mine.get_record(id).unwrap(), b"posted");
}

#[test]
fn test_open_by_owner_self_is_open_store() {
    let registry = memory_registry();
    registry.open_store(&owner(), "inbox", true).unwrap().close().unwrap();

    let store = registry.open_by_owner(&owner(), &owner(), "inbox").unwrap();

    assert_eq!(store.caller(), &owner());
}

#[test]
fn test_open_by_owner_missing_store() {
    let registry = memory_registry();

    assert!(matches!(
        registry.open_by_owner(&other_suite(), &owner(), "ghost"),
        Err(RmsError::NotFound { .. })
    ));
}

#[test]
fn test_open_shared_keeps_existing_authorization() {
    let registry = memory_registry();
    registry.open_store(&owner(), "inbox", true).unwrap().close().unwrap();

    let store = registry
        .open_shared(&owner(), "inbox", true, AuthMode::Any, true)
        .unwrap();

    assert_eq!(store.auth_mode().unwrap(), AuthMode::Private);
    assert!(!store.is_writable().unwrap());
}

#[test]
fn test_open_shared_creates_with_authorization_in_one_write() {
    let backend = Arc::new(MemoryBlobStore::new());
    let registry = StoreRegistry::with_backend(Config::default(), backend.clone());

    let store = registry
        .open_shared(&owner(), "board", true, AuthMode::Any, true)
        .unwrap();

    assert_eq!(store.auth_mode().unwrap(), AuthMode::Any);
    assert!(store.is_writable().unwrap());
    assert_eq!(backend.write_count(), 1);
}

#[test]
fn test_open_shared_failed_creation_leaves_nothing() {
    let backend = Arc::new(MemoryBlobStore::new());
    let registry = StoreRegistry::with_backend(Config::default(), backend.clone());

    backend.fail_writes_after(0);
    let result = registry.open_shared(&owner(), "doomed", true, AuthMode::Any, true);

    assert!(matches!(result, Err(RmsError::Io(_))));
    assert!(!registry.is_open(&owner(), "doomed"));
    assert_eq!(backend.blob_count(), 0);

    backend.heal();
    assert!(matches!(
        registry.open_store(&owner(), "doomed", false),
        Err(RmsError::NotFound { .. })
    ));
}

#[test]
fn test_concurrent_open_shared_creates_once() {
    let backend = Arc::new(MemoryBlobStore::new());
    let registry = StoreRegistry::with_backend(Config::default(), backend.clone());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let (auth_mode, writable) = if t % 2 == 0 {
                    (AuthMode::Any, true)
                } else {
                    (AuthMode::Private, false)
                };
                barrier.wait();
                registry
                    .open_shared(&owner(), "race", true, auth_mode, writable)
                    .unwrap()
            })
        })
        .collect();

    let stores: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Exactly one creation, no follow-up authorization write
    assert_eq!(backend.write_count(), 1);
    assert_eq!(registry.open_count(&owner(), "race"), threads);

    let mode = stores[0].auth_mode().unwrap();
    let writable = stores[0].is_writable().unwrap();
    for store in &stores {
        assert_eq!(store.auth_mode().unwrap(), mode);
        assert_eq!(store.is_writable().unwrap(), writable);
    }
}

#[test]
fn test_set_mode_changes_access() {
    let registry = memory_registry();
    let mine = registry.open_store(&owner(), "inbox", true).unwrap();
    let version = mine.version().unwrap();

    mine.set_mode(AuthMode::Any, false).unwrap();

    assert_eq!(mine.auth_mode().unwrap(), AuthMode::Any);
    assert_eq!(mine.version().unwrap(), version);
    registry.open_by_owner(&other_suite(), &owner(), "inbox").unwrap();
}

#[test]
fn test_auth_mode_from_raw() {
    assert_eq!(AuthMode::try_from(0).unwrap(), AuthMode::Private);
    assert_eq!(AuthMode::try_from(1).unwrap(), AuthMode::Any);
    assert!(matches!(AuthMode::try_from(2), Err(RmsError::InvalidArgument(_))));
    assert_eq!(i32::from(AuthMode::Any), 1);
}
