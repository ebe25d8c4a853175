use std::sync::Arc;
use std::time::Duration;

use snip_core::{BatchItem, Context, OwnerId, ShortId, Shortener};
use snip_shortener::ShortenerService;
use snip_storage::{PostgresStorage, Storage, StorageError};
use snip_test_infra::postgres::{PostgresConfig, PostgresServer};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Barrier;

struct Fixture {
    _postgres: PostgresServer,
    storage: PostgresStorage,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;

        let storage = PostgresStorage::new(pool);
        storage.migrate().await.expect("create schema");

        Self {
            _postgres: postgres,
            storage,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn ctx() -> Context {
    Context::with_timeout(Duration::from_secs(10))
}

async fn row_count(storage: &PostgresStorage) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM short_urls")
        .fetch_one(storage.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn add_and_get_round_trip() {
    let fixture = Fixture::start().await;

    let id = fixture
        .storage
        .add(&ctx(), "https://example.com", OwnerId(42))
        .await
        .unwrap();

    let record = fixture.storage.get_by_id(&ctx(), &id).await.unwrap();
    assert_eq!(record.original_url, "https://example.com");
    assert_eq!(record.owner_id, OwnerId(42));
    assert!(!record.deleted);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn add_is_idempotent_per_owner() {
    let fixture = Fixture::start().await;

    let first = fixture
        .storage
        .add(&ctx(), "https://a.example", OwnerId(1))
        .await
        .unwrap();
    let second = fixture
        .storage
        .add(&ctx(), "https://a.example", OwnerId(1))
        .await
        .unwrap();
    let other = fixture
        .storage
        .add(&ctx(), "https://a.example", OwnerId(2))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(row_count(&fixture.storage).await, 2);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn direct_duplicate_insert_violates_active_index() {
    let fixture = Fixture::start().await;
    fixture
        .storage
        .add(&ctx(), "https://dup.example", OwnerId(1))
        .await
        .unwrap();

    let err = sqlx::query(
        "INSERT INTO short_urls (id, original_url, owner_id) VALUES ('manual', 'https://dup.example', 1)",
    )
    .execute(fixture.storage.pool())
    .await
    .unwrap_err();

    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());
    assert_eq!(db_err.constraint(), Some("short_urls_active_owner_url"));
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn soft_delete_and_owner_isolation() {
    let fixture = Fixture::start().await;
    let a = fixture
        .storage
        .add(&ctx(), "https://a.example", OwnerId(1))
        .await
        .unwrap();
    let b = fixture
        .storage
        .add(&ctx(), "https://b.example", OwnerId(2))
        .await
        .unwrap();

    // Owner 2 cannot delete owner 1's record.
    fixture
        .storage
        .delete_urls(&ctx(), &[a.clone(), ShortId::new_unchecked("unknown")], OwnerId(2))
        .await
        .unwrap();
    assert!(!fixture.storage.get_by_id(&ctx(), &a).await.unwrap().deleted);

    fixture
        .storage
        .delete_urls(&ctx(), &[a.clone()], OwnerId(1))
        .await
        .unwrap();
    assert!(fixture.storage.get_by_id(&ctx(), &a).await.unwrap().deleted);

    let owner_one = fixture
        .storage
        .get_urls_by_owner(&ctx(), OwnerId(1))
        .await
        .unwrap();
    assert!(owner_one.is_empty());

    let owner_two = fixture
        .storage
        .get_urls_by_owner(&ctx(), OwnerId(2))
        .await
        .unwrap();
    assert_eq!(owner_two.len(), 1);
    assert_eq!(owner_two[0].id, b);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn batch_rolls_back_on_invalid_item() {
    let fixture = Fixture::start().await;

    let err = fixture
        .storage
        .add_batch(
            &ctx(),
            vec![
                BatchItem::new("https://1.example", Some("1".to_string())),
                BatchItem::new("https://2.example", Some("2".to_string())),
                BatchItem::new("https://3.example", Some("3".to_string())),
                BatchItem::new("", Some("4".to_string())),
            ],
            OwnerId(1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::InvalidArgument(_)));
    assert_eq!(row_count(&fixture.storage).await, 0);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn batch_keeps_duplicates_as_separate_records() {
    let fixture = Fixture::start().await;
    let single = fixture
        .storage
        .add(&ctx(), "https://dup.example", OwnerId(1))
        .await
        .unwrap();

    let entries = fixture
        .storage
        .add_batch(
            &ctx(),
            vec![
                BatchItem::new("https://dup.example", Some("a".to_string())),
                BatchItem::new("https://dup.example", Some("b".to_string())),
            ],
            OwnerId(1),
        )
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].id, entries[1].id);
    assert_ne!(entries[0].id, single);
    assert_eq!(entries[1].correlation_id.as_deref(), Some("b"));
    assert_eq!(row_count(&fixture.storage).await, 3);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn lookup_by_original_url_is_global() {
    let fixture = Fixture::start().await;
    let id = fixture
        .storage
        .add(&ctx(), "https://shared.example", OwnerId(7))
        .await
        .unwrap();

    let found = fixture
        .storage
        .get_by_original_url(&ctx(), "https://shared.example")
        .await
        .unwrap();
    assert_eq!(found, id);

    let err = fixture
        .storage
        .get_by_original_url_for_owner(&ctx(), "https://shared.example", OwnerId(8))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn ping_reaches_the_database() {
    let fixture = Fixture::start().await;
    fixture.storage.ping(&ctx()).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn add_after_batch_returns_batch_id() {
    let fixture = Fixture::start().await;
    let entries = fixture
        .storage
        .add_batch(
            &ctx(),
            vec![BatchItem::new("https://b.example", Some("b".to_string()))],
            OwnerId(3),
        )
        .await
        .unwrap();

    let id = fixture
        .storage
        .add(&ctx(), "https://b.example", OwnerId(3))
        .await
        .unwrap();

    assert_eq!(id, entries[0].id);
    assert_eq!(row_count(&fixture.storage).await, 1);
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn add_after_deleted_batch_creates_new_record() {
    let fixture = Fixture::start().await;
    let entries = fixture
        .storage
        .add_batch(
            &ctx(),
            vec![BatchItem::new("https://b.example", None)],
            OwnerId(3),
        )
        .await
        .unwrap();
    fixture
        .storage
        .delete_urls(&ctx(), &[entries[0].id.clone()], OwnerId(3))
        .await
        .unwrap();

    let id = fixture
        .storage
        .add(&ctx(), "https://b.example", OwnerId(3))
        .await
        .unwrap();

    assert_ne!(id, entries[0].id);
    let active = fixture
        .storage
        .get_urls_by_owner(&ctx(), OwnerId(3))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a docker daemon"]
async fn concurrent_adds_race_through_unique_index() {
    const TASKS: usize = 16;
    let fixture = Fixture::start().await;
    let storage = Arc::new(fixture.storage.clone());
    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = vec![];

    for _ in 0..TASKS {
        let storage = Arc::clone(&storage);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            storage.add(&ctx(), "https://race.example", OwnerId(9)).await
        }));
    }

    let mut winners = vec![];
    for handle in handles {
        match handle.await.unwrap() {
            Ok(id) => winners.push(id),
            Err(err) => assert!(err.is_conflict(), "unexpected error: {err}"),
        }
    }

    assert!(!winners.is_empty());
    assert!(winners.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(row_count(&fixture.storage).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a docker daemon"]
async fn concurrent_service_adds_resolve_conflicts() {
    const TASKS: usize = 16;
    let fixture = Fixture::start().await;
    let service = Arc::new(ShortenerService::new(fixture.storage.clone()));
    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = vec![];

    for _ in 0..TASKS {
        let service = Arc::clone(&service);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service
                .add(&ctx(), "https://race.example", OwnerId(9))
                .await
                .unwrap()
        }));
    }

    let mut ids = vec![];
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(row_count(&fixture.storage).await, 1);
}
