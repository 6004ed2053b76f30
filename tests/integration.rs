use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::collections::HashMap;
use std::io::Write;
use tower::util::ServiceExt;
use vendor_availability::config::{
    Config, MatchMode, ServerConfig, SourceConfig, Step, VendorConfig,
};
use vendor_availability::fetcher::Fetcher;
use vendor_availability::server::{AppState, create_router};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STUDIO_CALENDAR: &str = include_str!("fixtures/studio.ics");
const OUTLOOK_CALENDAR: &str = include_str!("fixtures/outlook.ics");

async fn mock_feeds() -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/studio.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STUDIO_CALENDAR))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/outlook.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(OUTLOOK_CALENDAR))
        .mount(&mock_server)
        .await;

    mock_server
}

fn source(url: String, default_timezone: Option<&str>) -> SourceConfig {
    SourceConfig {
        url,
        default_timezone: default_timezone.map(str::to_string),
        include_cancelled: false,
        steps: vec![],
    }
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if status == StatusCode::OK {
        serde_json::from_slice(&body).unwrap()
    } else {
        serde_json::Value::Null
    };
    (status, json)
}

#[tokio::test]
async fn test_full_flow_fetch_parse_filter_serve() {
    let mock_server = mock_feeds().await;

    let mut vendors = HashMap::new();
    vendors.insert(
        "photo-studio".to_string(),
        VendorConfig {
            sources: vec![
                source(format!("{}/studio.ics", mock_server.uri()), None),
                source(
                    format!("{}/outlook.ics", mock_server.uri()),
                    Some("Europe/Berlin"),
                ),
            ],
            steps: vec![Step::Deny {
                patterns: vec!["(?i)inventory".to_string()],
                mode: MatchMode::Any,
                fields: vec!["summary".to_string()],
            }],
        },
    );

    let config = Config {
        server: ServerConfig::default(),
        default_timezone: None,
        vendors,
    };

    let state = AppState::new(config, "config.json".into(), Fetcher::new().unwrap());
    let app = create_router(state.clone());

    let (status, events) = get_json(app, "/vendors/photo-studio/events").await;
    assert_eq!(status, StatusCode::OK);

    let uids: Vec<_> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["uid"].as_str().unwrap().to_string())
        .collect();

    // Studio: shoot + tentative call (holiday denied, fitting cancelled)
    // Outlook: four events with a valid DTSTART
    assert_eq!(uids.len(), 6);
    assert_eq!(uids[0], "confirmed-shoot@google.com");
    assert!(uids.contains(&"tentative-call@google.com".to_string()));
    assert!(!uids.contains(&"holiday@google.com".to_string()));
    assert!(!uids.contains(&"cancelled-fitting@google.com".to_string()));

    let app = create_router(state);
    let (status, busy) = get_json(
        app,
        "/vendors/photo-studio/busy?from=2024-01-15T00:00:00Z&to=2024-01-16T00:00:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(busy["vendor"], "photo-studio");
    assert_eq!(
        busy["busy"],
        serde_json::json!([
            { "start": "2024-01-15T05:00:00Z", "end": "2024-01-15T07:00:00Z" },
            { "start": "2024-01-15T13:00:00Z", "end": "2024-01-15T15:00:00Z" }
        ])
    );
    assert_eq!(busy["failedSources"], serde_json::json!([]));
}

#[tokio::test]
async fn test_config_file_drives_server() {
    let mock_server = mock_feeds().await;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
default_timezone = "Europe/Berlin"

[[vendors.caterer.sources]]
url = "{}/outlook.ics"
"#,
        mock_server.uri()
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    config.validate().unwrap();

    let state = AppState::new(config, file.path().to_path_buf(), Fetcher::new().unwrap());
    let (status, busy) = get_json(create_router(state), "/vendors/caterer/busy").await;

    assert_eq!(status, StatusCode::OK);
    let slots = busy["busy"].as_array().unwrap();
    assert_eq!(slots.len(), 2);
    // The Windows-named zone falls back to the config-wide default
    assert_eq!(slots[1]["start"], "2024-01-19T08:00:00Z");
}

#[tokio::test]
async fn test_unreachable_source_reported() {
    let mock_server = mock_feeds().await;

    let mut vendors = HashMap::new();
    vendors.insert(
        "florist".to_string(),
        VendorConfig {
            sources: vec![
                source(format!("{}/studio.ics", mock_server.uri()), None),
                source(format!("{}/missing.ics", mock_server.uri()), None),
            ],
            steps: vec![],
        },
    );

    let config = Config {
        server: ServerConfig::default(),
        default_timezone: None,
        vendors,
    };

    let state = AppState::new(config, "config.json".into(), Fetcher::new().unwrap());
    let (status, busy) = get_json(create_router(state), "/vendors/florist/busy").await;

    assert_eq!(status, StatusCode::OK);
    let failed = busy["failedSources"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].as_str().unwrap().ends_with("/missing.ics"));
    // Shoot and holiday block time; the tentative call is transparent
    assert_eq!(busy["busy"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_vendor() {
    let config = Config {
        server: ServerConfig::default(),
        default_timezone: None,
        vendors: HashMap::new(),
    };
    let state = AppState::new(config, "config.json".into(), Fetcher::new().unwrap());

    let (status, _) = get_json(create_router(state), "/vendors/nobody/events").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
