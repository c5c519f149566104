//! End-to-end enrichment runs against mocked GraphQL endpoints

use camino::Utf8PathBuf;
use catalog_meta::catalog::RecordStore;
use catalog_meta::config::Config;
use catalog_meta::hosting::{Credentials, EnrichOptions, Enricher, ErrorKind, HttpTransport, PauseReason, Sleeper};
use chrono::NaiveDate;
use core::time::Duration;
use serde_json::json;
use serde_yaml::Value;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sleeper that only remembers what it was asked to do
#[derive(Debug, Default)]
struct RecordingSleeper {
    pauses: Mutex<Vec<(Duration, PauseReason)>>,
}

impl RecordingSleeper {
    fn count(&self, reason: PauseReason) -> usize {
        self.pauses.lock().unwrap().iter().filter(|(_, r)| *r == reason).count()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, reason: PauseReason) {
        self.pauses.lock().unwrap().push((duration, reason));
    }
}

struct Catalog {
    _dir: TempDir,
    records: Utf8PathBuf,
}

impl Catalog {
    fn new(records: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("software")).unwrap();
        fs::create_dir_all(&root).unwrap();

        for (file, yaml) in records {
            fs::write(root.join(file), yaml).unwrap();
        }

        Self { _dir: dir, records: root }
    }

    fn store(&self) -> RecordStore {
        RecordStore::new(self.records.clone())
    }

    fn read(&self, file: &str) -> Value {
        serde_yaml::from_str(&fs::read_to_string(self.records.join(file)).unwrap()).unwrap()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
}

fn enricher(server: &MockServer) -> Enricher<HttpTransport, RecordingSleeper> {
    let mut config = Config::default();
    config.github_api_url = format!("{}/github/graphql", server.uri());
    config.gitlab_api_url = format!("{}/gitlab/graphql", server.uri());
    config.sleep_time = 0.5;

    let credentials = Credentials {
        github: Some("gh-token".to_string()),
        gitlab: Some("gl-token".to_string()),
    };

    Enricher::new(
        EnrichOptions::from_config(&config).unwrap(),
        credentials,
        HttpTransport::new(Duration::from_secs(10)).unwrap(),
        RecordingSleeper::default(),
        today(),
    )
}

fn github_repo(url: &str, stars: u64) -> serde_json::Value {
    json!({ "repo": {
        "url": url,
        "stargazerCount": stars,
        "isArchived": false,
        "releases": { "edges": [ { "node": { "tagName": "v1.4.0", "publishedAt": "2024-04-02T10:00:00Z" } } ] },
        "defaultBranchRef": { "target": {
            "committedDate": "2024-05-10T08:00:00Z",
            "month_2024_05": { "totalCount": 7 },
            "month_2024_04": { "totalCount": 12 },
            "month_2024_03": { "totalCount": 0 }
        } }
    } })
}

fn github_search(repos: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "data": { "search": { "repos": repos } } })
}

#[tokio::test]
async fn test_github_record_is_enriched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .and(header("authorization", "Bearer gh-token"))
        .and(body_string_contains("repo:foo/bar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(github_search(vec![github_repo("https://github.com/foo/bar", 42)]))
                .insert_header("x-ratelimit-remaining", "4999"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[(
        "foo.yml",
        "name: Foo\nwebsite_url: https://foo.example\nsource_code_url: https://github.com/foo/bar\ncommit_history:\n  '2022-01': 3\n  '2024-01': 9\n",
    )]);

    let enricher = enricher(&server);
    let report = enricher.run(&catalog.store()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.considered, 1);
    assert_eq!(report.updated, 1);

    let record = catalog.read("foo.yml");
    assert_eq!(record["website_url"].as_str(), Some("https://foo.example"));
    assert_eq!(record["stargazers_count"].as_u64(), Some(42));
    assert_eq!(record["archived"].as_bool(), Some(false));
    assert_eq!(record["updated_at"].as_str(), Some("2024-05-10"));
    assert_eq!(record["current_release"]["tag"].as_str(), Some("v1.4.0"));
    assert_eq!(record["current_release"]["published_at"].as_str(), Some("2024-04-02"));

    let history = record["commit_history"].as_mapping().unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.get("2022-01").is_none());
    assert_eq!(record["commit_history"]["2024-01"].as_u64(), Some(9));
    assert_eq!(record["commit_history"]["2024-04"].as_u64(), Some(12));
}

#[tokio::test]
async fn test_repository_missing_from_response_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(github_search(vec![
            github_repo("https://github.com/a/one", 1),
            github_repo("https://github.com/b/two", 2),
            github_repo("https://github.com/c/three", 3),
        ])))
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[
        ("one.yml", "name: one\nsource_code_url: https://github.com/a/one\n"),
        ("two.yml", "name: two\nsource_code_url: https://github.com/b/two\n"),
        ("three.yml", "name: three\nsource_code_url: https://github.com/c/three\n"),
        ("four.yml", "name: four\nsource_code_url: https://github.com/Dee/Four/\n"),
    ]);

    let report = enricher(&server).run(&catalog.store()).await.unwrap();

    assert_eq!(report.updated, 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::DataConsistency);
    assert_eq!(
        report.errors[0].message,
        "repository not found in search results: https://github.com/Dee/Four/"
    );
    assert!(catalog.read("four.yml").get("stargazers_count").is_none());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(github_search(vec![github_repo("https://github.com/foo/bar", 5)])))
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[("foo.yml", "name: Foo\nsource_code_url: https://github.com/foo/bar\n")]);

    let enricher = enricher(&server);
    let report = enricher.run(&catalog.store()).await.unwrap();

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(catalog.read("foo.yml")["stargazers_count"].as_u64(), Some(5));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(enricher.sleeper().count(PauseReason::Backoff), 2);
}

#[tokio::test]
async fn test_gitlab_record_is_enriched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gitlab/graphql"))
        .and(header("authorization", "Bearer gl-token"))
        .and(body_string_contains("fdroid/fdroidclient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "fdroid_fdroidclient": {
                "fullPath": "fdroid/fdroidclient",
                "starCount": 1500,
                "archived": true,
                "releases": { "edges": [ { "node": { "tagName": "1.19", "releasedAt": "2024-01-05T10:00:00+01:00" } } ] },
                "repository": { "tree": { "lastCommit": { "committedDate": "2024-02-01T12:00:00Z" } } }
            }
        } })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[
        ("fdroid.yml", "name: F-Droid\nsource_code_url: https://gitlab.com/fdroid/fdroidclient\n"),
        ("nested.yml", "name: Nested\nsource_code_url: https://gitlab.com/group/sub/project\n"),
    ]);

    let report = enricher(&server).run(&catalog.store()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.considered, 1);

    let record = catalog.read("fdroid.yml");
    assert_eq!(record["stargazers_count"].as_u64(), Some(1500));
    assert_eq!(record["archived"].as_bool(), Some(true));
    assert_eq!(record["updated_at"].as_str(), Some("2024-02-01"));
    assert_eq!(record["current_release"]["tag"].as_str(), Some("1.19"));
    assert!(record.get("commit_history").is_none());

    assert!(catalog.read("nested.yml").get("stargazers_count").is_none());
}

#[tokio::test]
async fn test_schema_errors_abort_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [ { "message": "Field 'stargazerCount' doesn't exist on type 'Repository'" } ]
        })))
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[
        ("a.yml", "name: a\nsource_code_url: https://github.com/a/a\n"),
        ("b.yml", "name: b\nsource_code_url: https://github.com/b/b\n"),
    ]);

    let _ = enricher(&server).run(&catalog.store()).await.unwrap_err();
    assert!(catalog.read("a.yml").get("stargazers_count").is_none());
}

#[tokio::test]
async fn test_single_gateway_error_backs_off_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(github_search(vec![github_repo("https://github.com/foo/bar", 1)])))
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[("foo.yml", "name: Foo\nsource_code_url: https://github.com/foo/bar\n")]);

    let enricher = enricher(&server);
    let report = enricher.run(&catalog.store()).await.unwrap();
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(enricher.sleeper().count(PauseReason::Backoff), 1);
    assert_eq!(enricher.sleeper().count(PauseReason::BatchPacing), 0);
}

#[tokio::test]
async fn test_malformed_search_result_only_costs_itself() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/github/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(github_search(vec![
            github_repo("https://github.com/a/one", 1),
            json!({ "repo": { "url": "https://github.com/b/two", "stargazerCount": "lots" } }),
        ])))
        .mount(&server)
        .await;

    let catalog = Catalog::new(&[
        ("one.yml", "name: one\nsource_code_url: https://github.com/a/one\n"),
        ("two.yml", "name: two\nsource_code_url: https://github.com/b/two\n"),
    ]);

    let report = enricher(&server).run(&catalog.store()).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].kind, ErrorKind::Request);
    assert!(
        report.errors[0]
            .message
            .starts_with("batch 1: unexpected GitHub repository data for https://github.com/b/two: ")
    );
    assert_eq!(catalog.read("one.yml")["stargazers_count"].as_u64(), Some(1));
    assert!(catalog.read("two.yml").get("stargazers_count").is_none());
}
