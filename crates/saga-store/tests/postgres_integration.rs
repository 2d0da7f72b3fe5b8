//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency and are
//! serialized because they truncate the shared table.
//!
//! ```bash
//! cargo test -p saga-store --test postgres_integration
//! ```

use std::sync::Arc;

use saga_store::{
    PostgresSagaStore, SagaId, SagaInstance, SagaQuery, SagaStatus, SagaStore, SagaStoreExt,
    StepOutcome, StoreError, TriggeringEvent,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresSagaStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresSagaStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_instances")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaStore::new(pool)
}

fn create_instance() -> SagaInstance {
    let event = TriggeringEvent::new("OrderCreated", serde_json::json!({"order_id": 42}))
        .with_aggregate_id("order-42");
    SagaInstance::new(SagaId::new(), event).with_saga_type("OrderFulfillment")
}

#[tokio::test]
#[serial]
async fn save_and_load_roundtrip() {
    let store = get_test_store().await;
    let saga = create_instance();

    store.save(&saga).await.unwrap();
    let loaded = store.load(saga.id()).await.unwrap();

    assert_eq!(loaded.id(), saga.id());
    assert_eq!(loaded.saga_type(), "OrderFulfillment");
    assert_eq!(loaded.status(), SagaStatus::Pending);
    assert_eq!(loaded.triggering_event(), saga.triggering_event());
    assert_eq!(loaded.attempt(), 1);
}

#[tokio::test]
#[serial]
async fn save_duplicate_is_rejected() {
    let store = get_test_store().await;
    let saga = create_instance();

    store.save(&saga).await.unwrap();
    let result = store.save(&saga).await;

    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[tokio::test]
#[serial]
async fn load_missing_returns_not_found() {
    let store = get_test_store().await;
    let id = SagaId::new();

    assert!(matches!(store.load(id).await, Err(StoreError::NotFound(_))));
    assert!(store.try_load(id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn update_persists_step_history() {
    let store = get_test_store().await;
    let mut saga = create_instance();
    store.save(&saga).await.unwrap();

    saga.transition(SagaStatus::Running).unwrap();
    saga.record_step("reserve_inventory", StepOutcome::success());
    saga.record_failure("charge_payment", "card declined");
    saga.transition(SagaStatus::Compensating).unwrap();
    saga.record_compensation("reserve_inventory", StepOutcome::failure("release timed out"));
    saga.transition(SagaStatus::Failed).unwrap();
    store.update(&saga).await.unwrap();

    let loaded = store.load(saga.id()).await.unwrap();
    assert_eq!(loaded.status(), SagaStatus::Failed);
    assert_eq!(loaded.executed_step_names(), vec!["reserve_inventory"]);
    assert_eq!(loaded.failed_compensations(), vec!["reserve_inventory"]);
    assert_eq!(
        loaded.failure().map(|f| f.step_name.as_str()),
        Some("charge_payment")
    );
}

#[tokio::test]
#[serial]
async fn update_rejects_history_rewrite() {
    let store = get_test_store().await;
    let stale = create_instance();
    store.save(&stale).await.unwrap();

    let mut advanced = stale.clone();
    advanced.record_step("reserve_inventory", StepOutcome::success());
    store.update(&advanced).await.unwrap();

    let result = store.update(&stale).await;
    assert!(matches!(result, Err(StoreError::HistoryRewrite { .. })));
}

#[tokio::test]
#[serial]
async fn load_rejects_non_positive_attempt() {
    let store = get_test_store().await;
    let saga = create_instance();
    store.save(&saga).await.unwrap();

    sqlx::query("UPDATE saga_instances SET attempt = -1 WHERE id = $1")
        .bind(saga.id().as_uuid())
        .execute(store.pool())
        .await
        .unwrap();

    let result = store.load(saga.id()).await;
    assert!(matches!(
        result,
        Err(StoreError::CorruptRecord { id, .. }) if id == saga.id()
    ));
}

#[tokio::test]
#[serial]
async fn update_missing_returns_not_found() {
    let store = get_test_store().await;
    let saga = create_instance();

    assert!(matches!(
        store.update(&saga).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn find_filters_and_pages() {
    let store = get_test_store().await;
    for i in 0..6 {
        let mut saga = create_instance();
        if i < 4 {
            saga.transition(SagaStatus::Running).unwrap();
        }
        store.save(&saga).await.unwrap();
    }

    let running = store
        .find(SagaQuery::for_status(SagaStatus::Running))
        .await
        .unwrap();
    assert_eq!(running.len(), 4);

    let page = store
        .find(SagaQuery::new().saga_type("OrderFulfillment").offset(2).limit(3))
        .await
        .unwrap();
    assert_eq!(page.len(), 3);
}

#[tokio::test]
#[serial]
async fn statistics_group_by_status() {
    let store = get_test_store().await;
    let mut completed = create_instance();
    completed.transition(SagaStatus::Running).unwrap();
    completed.transition(SagaStatus::Completed).unwrap();
    store.save(&completed).await.unwrap();
    store.save(&create_instance()).await.unwrap();

    let stats = store.statistics().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 1);
}
