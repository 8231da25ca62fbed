use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use rusqlite::Connection;
use tempfile::tempdir;

use review_etl::app::ObjectStorePort;
use review_etl::config::Config;
use review_etl::error::{JoinError, PipelineError, PublishError};
use review_etl::infra::{FsObjectStore, InMemoryObjectStore};
use review_etl::join::KeyStrictness;
use review_etl::pipeline::Pipeline;
use review_etl::sources::{discover, discover_archive};
use review_etl::table::Value;

const BUSINESSES: &str = r#"{"B1": {"Business - Name": "Cafe", "Category": "Food"}}"#;
const REVIEWS: &str = "ReviewId,BusinessId,UserId,Stars\nR1,B1,U1,5\n";

fn write_snapshot(path: &Path, users_sql: Option<&str>) {
    let conn = Connection::open(path).unwrap();
    if let Some(sql) = users_sql {
        conn.execute_batch(sql).unwrap();
    }
    conn.execute_batch(
        r#"
        CREATE TABLE business_attributes (BusinessId TEXT, Parking TEXT);
        INSERT INTO business_attributes VALUES ('B1', 'true');
        "#,
    )
    .unwrap();
}

const USERS: &str = r#"
    CREATE TABLE Users2 (UserId TEXT, BusinessId TEXT, Name TEXT);
    INSERT INTO Users2 VALUES ('U1', 'B1', 'Ann');
"#;

fn input_dir(users_sql: Option<&str>) -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("business.json"), BUSINESSES).unwrap();
    std::fs::write(dir.path().join("reviews_1.csv"), REVIEWS).unwrap();
    write_snapshot(&dir.path().join("user.sqlite"), users_sql);
    dir
}

fn pipeline(store: Arc<dyn ObjectStorePort>) -> Pipeline {
    Pipeline::new(Config::default(), store)
}

#[test]
fn test_end_to_end_example() {
    let dir = input_dir(Some(USERS));
    let manifest = discover(dir.path()).unwrap();
    let out = pipeline(Arc::new(InMemoryObjectStore::new())).transform(&manifest).unwrap();

    assert!(!out.snapshot_suppressed);
    let merged = &out.merged;
    assert_eq!(merged.row_count(), 1);
    assert_eq!(merged.get(0, "Category"), Some(&Value::from("Food")));
    assert_eq!(merged.get(0, "Parking"), Some(&Value::from("true")));
    assert_eq!(merged.get(0, "Stars"), Some(&Value::from("5")));
    assert!(!merged.has_column("Business - Name"));

    let mean = &out.aggregates.mean_rating_by_business;
    assert_eq!(mean.row_count(), 1);
    assert_eq!(mean.get(0, "BusinessId"), Some(&Value::from("B1")));
    assert_eq!(mean.get(0, "AverageReviewStars"), Some(&Value::Float(5.0)));
}

// An unreadable snapshot has no known schema, so its columns are absent from
// the merged table rather than present and entirely null.
#[test]
fn test_missing_users_relation_is_suppressed_and_adds_no_columns() {
    let dir = input_dir(None);
    let manifest = discover(dir.path()).unwrap();
    let out = pipeline(Arc::new(InMemoryObjectStore::new())).transform(&manifest).unwrap();

    assert!(out.snapshot_suppressed);
    assert_eq!(out.merged.row_count(), 1);
    assert!(!out.merged.has_column("Parking"));
    assert!(!out.merged.has_column("Name"));
    assert_eq!(out.merged.get(0, "Category"), Some(&Value::from("Food")));
}

#[test]
fn test_review_columns_survive_failed_lookups() {
    let dir = input_dir(Some(USERS));
    std::fs::write(
        dir.path().join("reviews_2.csv"),
        "ReviewId,BusinessId,UserId,Stars\nR2,B404,U9,2\nR3,B1,U1,4\n",
    )
    .unwrap();
    let manifest = discover(dir.path()).unwrap();
    let merged = pipeline(Arc::new(InMemoryObjectStore::new()))
        .transform(&manifest)
        .unwrap()
        .merged;

    assert_eq!(merged.row_count(), 3);
    for column in ["ReviewId", "Stars", "UserId", "BusinessId"] {
        assert!(merged.values(column).unwrap().iter().all(|v| !v.is_null()), "{column}");
    }
    assert_eq!(merged.get(1, "Category"), Some(&Value::Null));
    assert_eq!(merged.get(1, "Parking"), Some(&Value::Null));
}

#[test]
fn test_row_count_holds_with_repeated_snapshot_keys() {
    let users = r#"
        CREATE TABLE Users2 (UserId TEXT, BusinessId TEXT, Name TEXT);
        INSERT INTO Users2 VALUES ('U1', 'B1', 'Ann'), ('U2', 'B1', 'Bo'), ('U3', 'B1', 'Cy');
    "#;
    let dir = input_dir(Some(users));
    let manifest = discover(dir.path()).unwrap();

    let merged = pipeline(Arc::new(InMemoryObjectStore::new()))
        .transform(&manifest)
        .unwrap()
        .merged;
    assert_eq!(merged.row_count(), 1);
    assert_eq!(merged.get(0, "Name"), Some(&Value::from("Ann")));

    let mut config = Config::default();
    config.join.strictness = KeyStrictness::Strict;
    let err = Pipeline::new(config, Arc::new(InMemoryObjectStore::new()))
        .transform(&manifest)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Join(_)));
}

#[test]
fn test_strict_key_violation_inside_snapshot_aborts() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("business.json"), BUSINESSES).unwrap();
    std::fs::write(dir.path().join("reviews_1.csv"), REVIEWS).unwrap();
    let conn = Connection::open(dir.path().join("user.sqlite")).unwrap();
    conn.execute_batch(USERS).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE business_attributes (BusinessId TEXT, Parking TEXT);
        INSERT INTO business_attributes VALUES ('B1', 'true'), ('B1', 'false');
        "#,
    )
    .unwrap();
    drop(conn);
    let manifest = discover(dir.path()).unwrap();

    let mut config = Config::default();
    config.join.strictness = KeyStrictness::Strict;
    let err = Pipeline::new(config, Arc::new(InMemoryObjectStore::new()))
        .transform(&manifest)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Join(JoinError::KeyViolation { .. })));

    // the default keeps the first attribute row
    let out = pipeline(Arc::new(InMemoryObjectStore::new())).transform(&manifest).unwrap();
    assert!(!out.snapshot_suppressed);
    assert_eq!(out.merged.get(0, "Parking"), Some(&Value::from("true")));
}

#[tokio::test]
async fn test_run_writes_artifacts_to_disk() {
    let dir = input_dir(Some(USERS));
    let out_dir = tempdir().unwrap();
    let manifest = discover(dir.path()).unwrap();

    let report = pipeline(Arc::new(FsObjectStore::new(out_dir.path())))
        .run(&manifest)
        .await
        .unwrap();
    assert_eq!(report.receipts.len(), 4);
    assert_eq!(report.merged_rows, 1);

    let mut merged_csv = String::new();
    GzDecoder::new(std::fs::File::open(out_dir.path().join("merged_reviews.csv.gz")).unwrap())
        .read_to_string(&mut merged_csv)
        .unwrap();
    assert!(merged_csv.starts_with("ReviewId,BusinessId,UserId,Stars,Category"));
    assert_eq!(merged_csv.lines().count(), 2);

    let mean = std::fs::read_to_string(out_dir.path().join("mean_rating_by_business.csv")).unwrap();
    assert_eq!(mean, "BusinessId,AverageReviewStars\nB1,5.0\n");
    assert!(out_dir.path().join("top_zipcode_mean_rating.csv").exists());
    assert_eq!(
        std::fs::read_to_string(out_dir.path().join("top_users_by_review_count.csv")).unwrap(),
        "UserId,NumberOfReviewsWritten\nU1,1\n"
    );
}

/// Accepts everything except one key.
struct RejectingStore {
    inner: InMemoryObjectStore,
    reject: &'static str,
}

#[async_trait]
impl ObjectStorePort for RejectingStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        if key == self.reject {
            return Err(PublishError::Rejected {
                name: key.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.inner.put(key, bytes).await
    }
}

#[tokio::test]
async fn test_publish_failure_stops_remaining_artifacts() {
    let dir = input_dir(Some(USERS));
    let manifest = discover(dir.path()).unwrap();
    let store = Arc::new(RejectingStore {
        inner: InMemoryObjectStore::new(),
        reject: "mean_rating_by_business.csv",
    });

    let err = pipeline(store.clone()).run(&manifest).await.unwrap_err();
    assert!(matches!(err, PipelineError::Publish(PublishError::Rejected { status: 503, .. })));
    assert_eq!(store.inner.keys(), vec!["merged_reviews.csv.gz".to_string()]);
}

fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(*name, zip::write::FileOptions::default()).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_end_to_end_example_from_nested_archive() {
    let dir = input_dir(Some(USERS));
    let snapshot = std::fs::read(dir.path().join("user.sqlite")).unwrap();
    let inner = zip_of(&[
        ("Yelp_data_Set/business.json", BUSINESSES.as_bytes()),
        ("Yelp_data_Set/reviews_1.csv", REVIEWS.as_bytes()),
        ("Yelp_data_Set/user.sqlite", &snapshot),
    ]);
    let outer = zip_of(&[("output/Yelp_data_Set.zip", &inner)]);

    let manifest = discover_archive(&outer).unwrap();
    let out = pipeline(Arc::new(InMemoryObjectStore::new())).transform(&manifest).unwrap();

    assert!(!out.snapshot_suppressed);
    assert_eq!(out.merged.row_count(), 1);
    assert_eq!(out.merged.get(0, "Category"), Some(&Value::from("Food")));
    assert_eq!(out.merged.get(0, "Parking"), Some(&Value::from("true")));
    assert_eq!(
        out.aggregates.mean_rating_by_business.get(0, "AverageReviewStars"),
        Some(&Value::Float(5.0))
    );
}

#[test]
fn test_malformed_business_document_aborts() {
    let dir = input_dir(Some(USERS));
    std::fs::write(dir.path().join("business.json"), "[1, 2, 3]").unwrap();
    let manifest = discover(dir.path()).unwrap();
    let err = pipeline(Arc::new(InMemoryObjectStore::new()))
        .transform(&manifest)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));
}
