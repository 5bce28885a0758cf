//! # Discovery Watcher Integration Tests
//!
//! Runs the watcher loop end-to-end against the in-memory store and asserts
//! that registry mutations flow into the session's endpoint table as
//! add/modify/delete deltas.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rpc_balancer::{
    BalanceConfig, BalanceSession, MemoryStore, PickOptions, StrategyKind, Watcher,
};

const PREFIX: &str = "osf/default/greeter/s";

fn setup(strategy: StrategyKind) -> (Arc<MemoryStore>, Arc<BalanceSession>, BalanceConfig) {
    let config = BalanceConfig {
        strategy,
        discovery_backoff: Duration::from_millis(20),
        ..BalanceConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let session = Arc::new(BalanceSession::new("greeter", &config));
    (store, session, config)
}

fn spawn_watcher(
    store: &Arc<MemoryStore>,
    session: &Arc<BalanceSession>,
    config: &BalanceConfig,
) -> tokio::task::JoinHandle<()> {
    Watcher::new(
        store.clone() as Arc<dyn rpc_balancer::DiscoveryStore>,
        session.clone(),
        PREFIX,
        config.discovery_backoff,
    )
    .spawn()
}

async fn wait_until<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Duration::from_secs(2);
    let result = tokio::time::timeout(deadline, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    result.unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}

#[tokio::test]
async fn watcher_seeds_table_from_initial_listing() {
    let (store, session, config) = setup(StrategyKind::RoundRobin);
    store.put(format!("{PREFIX}/10.0.0.1%3A8080"), "weight=50");
    store.put(format!("{PREFIX}/10.0.0.2%3A8080"), "weight=100");

    let handle = spawn_watcher(&store, &session, &config);

    wait_until("initial endpoints", || {
        let session = session.clone();
        async move { session.endpoints().len() == 2 }
    })
    .await;

    let endpoints = session.endpoints();
    // registry keys arrive URL-encoded and must come out decoded
    assert_eq!(endpoints[0].address(), "10.0.0.1:8080");
    assert_eq!(endpoints[0].weight, 50);
    assert_eq!(endpoints[1].address(), "10.0.0.2:8080");
    assert_eq!(endpoints[1].weight, 100);

    session.close();
    handle.await.unwrap();
}

#[tokio::test]
async fn watcher_applies_add_modify_delete_deltas() {
    let (store, session, config) = setup(StrategyKind::SmoothWeightedRoundRobin);
    store.put(format!("{PREFIX}/a%3A1"), "weight=50");
    store.put(format!("{PREFIX}/b%3A1"), "weight=100");

    let handle = spawn_watcher(&store, &session, &config);
    wait_until("seeded endpoints", || {
        let session = session.clone();
        async move { session.endpoints().len() == 2 }
    })
    .await;
    session.up("a:1");

    // the delta scenario: {a: w50, b: w100} -> {a: w75, c: w10}
    store.put(format!("{PREFIX}/a%3A1"), "weight=75");
    store.put(format!("{PREFIX}/c%3A1"), "weight=10");
    store.delete(&format!("{PREFIX}/b%3A1"));

    wait_until("delta applied", || {
        let session = session.clone();
        async move {
            let eps = session.endpoints();
            eps.len() == 2
                && eps.iter().any(|ep| ep.address() == "c:1")
                && eps.iter().all(|ep| ep.address() != "b:1")
                && eps.iter().any(|ep| ep.address() == "a:1" && ep.weight == 75)
        }
    })
    .await;

    // the modify updated a:1 in place: connectivity survived
    let endpoints = session.endpoints();
    let a = endpoints.iter().find(|ep| ep.address() == "a:1").unwrap();
    assert!(a.connected);
    assert_eq!(a.effective_weight, 75);

    session.close();
    handle.await.unwrap();
}

#[tokio::test]
async fn watcher_backs_off_until_service_registers() {
    let (store, session, config) = setup(StrategyKind::Random);

    // nothing registered yet: the watcher must retry, not die
    let handle = spawn_watcher(&store, &session, &config);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(session.endpoints().is_empty());
    assert!(!handle.is_finished());

    store.put(format!("{PREFIX}/a%3A1"), "weight=50");
    wait_until("late registration picked up", || {
        let session = session.clone();
        async move { !session.endpoints().is_empty() }
    })
    .await;

    session.close();
    handle.await.unwrap();
}

#[tokio::test]
async fn watcher_converges_after_feed_loss_and_outage_churn() {
    let (store, session, config) = setup(StrategyKind::RoundRobin);
    store.put(format!("{PREFIX}/a%3A1"), "weight=50");
    store.put(format!("{PREFIX}/b%3A1"), "weight=100");

    let handle = spawn_watcher(&store, &session, &config);
    wait_until("seeded endpoints", || {
        let session = session.clone();
        async move { session.endpoints().len() == 2 }
    })
    .await;

    // backend connection drops; registry churns while the feed is down
    store.sever_watches();
    store.delete(&format!("{PREFIX}/b%3A1"));
    store.put(format!("{PREFIX}/c%3A1"), "weight=10");

    // the re-list after backoff must both add c:1 and delete the
    // deregistered b:1 rather than stranding it in the table
    wait_until("table converged after re-list", || {
        let session = session.clone();
        async move {
            let eps = session.endpoints();
            eps.len() == 2
                && eps.iter().any(|ep| ep.address() == "a:1")
                && eps.iter().any(|ep| ep.address() == "c:1")
        }
    })
    .await;

    // the fresh feed opened by the re-list delivers later changes too
    store.put(format!("{PREFIX}/d%3A1"), "weight=1");
    wait_until("post-recovery mutation applied", || {
        let session = session.clone();
        async move { session.endpoints().len() == 3 }
    })
    .await;

    session.close();
    handle.await.unwrap();
}

#[tokio::test]
async fn discovered_endpoint_flows_into_blocking_pick() {
    let (store, session, config) = setup(StrategyKind::RoundRobin);
    let handle = spawn_watcher(&store, &session, &config);

    let waiter = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .pick(PickOptions::blocking_with_timeout(Duration::from_secs(2)))
                .await
        }
    });

    store.put(format!("{PREFIX}/a%3A1"), "weight=50");
    wait_until("endpoint discovered", || {
        let session = session.clone();
        async move { !session.endpoints().is_empty() }
    })
    .await;
    session.up("a:1");

    let picked = waiter.await.unwrap().unwrap();
    assert_eq!(picked.address, "a:1");

    session.close();
    handle.await.unwrap();
}

#[tokio::test]
async fn closing_the_session_stops_the_watcher() {
    let (store, session, config) = setup(StrategyKind::RoundRobin);
    store.put(format!("{PREFIX}/a%3A1"), "weight=50");

    let handle = spawn_watcher(&store, &session, &config);
    wait_until("seeded", || {
        let session = session.clone();
        async move { !session.endpoints().is_empty() }
    })
    .await;

    session.close();
    handle.await.unwrap();

    // a watcher that was stopped makes no further table calls
    store.put(format!("{PREFIX}/b%3A1"), "weight=1");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.endpoints().len(), 1);
}
