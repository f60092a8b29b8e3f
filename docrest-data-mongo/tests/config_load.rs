use std::io::Write;

use docrest_data_mongo::{ConfigError, MongoConfig};

fn yaml_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_yaml_file() {
    let file = yaml_file(
        "mongo:\n  uri: mongodb://127.0.0.1:27017\n  database: inventory\n  collection: parts\n  app_name: docrest\n",
    );
    let config = MongoConfig::load(file.path()).unwrap();
    if std::env::var("MONGO_DATABASE").is_err() {
        assert_eq!(config.database, "inventory");
    }
    if std::env::var("MONGO_COLLECTION").is_err() {
        assert_eq!(config.collection, "parts");
    }
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = MongoConfig::load(dir.path().join("absent.yaml")).unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_file_is_reported() {
    let file = yaml_file("mongo:\n  pool_size: 0\n");
    assert!(matches!(
        MongoConfig::load(file.path()),
        Err(ConfigError::Invalid { key: "pool_size", .. })
    ));

    let file = yaml_file("mongo: [unterminated\n");
    assert!(matches!(MongoConfig::load(file.path()), Err(ConfigError::Load(_))));
}
