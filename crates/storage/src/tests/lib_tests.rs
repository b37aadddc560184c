use super::*;

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = ClientStorage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn previous_team_is_scoped_per_user() {
    let storage = ClientStorage::new("sqlite::memory:").await.expect("db");
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    storage
        .set_previous_team_id(&alice, &TeamId::new("t1"))
        .await
        .expect("alice team");
    storage
        .set_previous_team_id(&bob, &TeamId::new("t2"))
        .await
        .expect("bob team");

    assert_eq!(
        storage.previous_team_id(&alice).await.expect("read"),
        Some(TeamId::new("t1"))
    );
    assert_eq!(
        storage.previous_team_id(&bob).await.expect("read"),
        Some(TeamId::new("t2"))
    );
    assert_eq!(
        storage
            .previous_team_id(&UserId::new("carol"))
            .await
            .expect("read"),
        None
    );
}

#[tokio::test]
async fn later_write_supersedes_previous_team() {
    let storage = ClientStorage::new("sqlite::memory:").await.expect("db");
    let user = UserId::new("alice");

    storage
        .set_previous_team_id(&user, &TeamId::new("t1"))
        .await
        .expect("first");
    storage
        .set_previous_team_id(&user, &TeamId::new("t9"))
        .await
        .expect("second");

    assert_eq!(
        storage.previous_team_id(&user).await.expect("read"),
        Some(TeamId::new("t9"))
    );
}

#[tokio::test]
async fn team_joined_on_load_is_consumed_once() {
    let storage = ClientStorage::new("sqlite::memory:").await.expect("db");
    storage
        .set_team_id_joined_on_load(&TeamId::new("t3"))
        .await
        .expect("set");

    assert_eq!(
        storage.take_team_id_joined_on_load().await.expect("take"),
        Some(TeamId::new("t3"))
    );
    assert_eq!(
        storage.take_team_id_joined_on_load().await.expect("take"),
        None
    );
}

#[tokio::test]
async fn remove_item_reports_missing_keys() {
    let storage = ClientStorage::new("sqlite::memory:").await.expect("db");
    storage.set_item("k", "v").await.expect("set");
    assert!(storage.remove_item("k").await.expect("remove"));
    assert!(!storage.remove_item("k").await.expect("remove again"));
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("chat_sync_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("client.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = ClientStorage::new(&database_url).await.expect("db");
    storage
        .set_team_id_joined_on_load(&TeamId::new("t1"))
        .await
        .expect("write");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    let reopened = ClientStorage::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened.team_id_joined_on_load().await.expect("read"),
        Some(TeamId::new("t1"))
    );
    drop(reopened);

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn sqlite_path_ignores_memory_urls() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/client.db?mode=rwc"),
        Some(PathBuf::from("./data/client.db"))
    );
}
