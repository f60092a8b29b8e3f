//! Runs against a real server. Start one and run with
//! `MONGO_URI=mongodb://localhost:27017 cargo test -- --ignored`.

use std::time::Duration;

use docrest_data::prelude::*;
use docrest_data_mongo::{Handler, MongoConfig, MongoConnector};
use serde_json::json;

async fn handler() -> Handler<MongoConnector> {
    let _ = tracing_subscriber::fmt().with_env_filter("docrest_data_mongo=debug").try_init();
    let mut config = MongoConfig::default()
        .overlay_env(std::env::vars())
        .unwrap();
    config.collection = format!("live_{}", docrest_data::new_etag());
    Handler::connect(&config).await.unwrap()
}

fn record(id: &str, n: i64) -> Record {
    let payload = match json!({ "n": n }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    Record::with_id(id, "item", payload)
}

#[tokio::test]
#[ignore]
async fn crud_against_server() {
    let handler = handler().await;
    let ctx = Context::with_timeout(Duration::from_secs(5));

    handler.insert(&ctx, &[record("a", 1), record("b", 2)]).await.unwrap();
    assert!(matches!(handler.insert(&ctx, &[record("a", 9)]).await, Err(DataError::Conflict)));

    let lookup = Lookup::new().with_filter(vec![Expression::eq("id", "a")].into());
    let original = handler.find(&ctx, &lookup, Window::all()).await.unwrap().records.remove(0);
    let stored = handler.update(&ctx, &record("a", 10), &original).await.unwrap();
    assert!(matches!(handler.update(&ctx, &original, &original).await, Err(DataError::Conflict)));

    handler.delete(&ctx, &stored).await.unwrap();
    assert!(matches!(handler.delete(&ctx, &stored).await, Err(DataError::NotFound)));
    assert_eq!(handler.clear(&ctx, &Lookup::new()).await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn expired_context_never_reaches_server() {
    let handler = handler().await;
    let ctx = Context::with_timeout(Duration::ZERO);
    assert!(matches!(
        handler.count(&ctx, &Lookup::new()).await,
        Err(DataError::DeadlineExceeded)
    ));
}
