use std::path::Path;
use std::sync::Arc;

use portalfill_browser::testkit::{FakeAction, FakeDocument, FakeElement, FakeLauncher, FakePage};
use portalfill_core::{
    AutomationError, AutomationOptions, AutomationSession, CollectRequest, Draft, FillOutcome,
    FillRequest, ProfileResolver, StatusReporter, Timings,
};
use tempfile::TempDir;

const PORTAL: &str = "https://portal.test/";

fn write_mapping(dir: &Path, file: &str, portal_url: &str) {
    let config_dir = dir.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    let mapping = serde_json::json!({
        "portalUrl": portal_url,
        "patientSearch": { "selector": "#patientSearch" },
        "fields": {
            "complaint": { "labelRegex": "complaint" },
            "history": { "labelRegex": "history" }
        }
    });
    std::fs::write(config_dir.join(file), mapping.to_string()).unwrap();
}

fn portal_page() -> Arc<FakePage> {
    Arc::new(
        FakePage::new(
            "about:blank",
            FakeDocument::new(""),
        )
        .with_document(
            PORTAL,
            FakeDocument::new("Patient record")
                .with(FakeElement::new("input").id("patientSearch"))
                .with(FakeElement::new("input").id("complaint").label("Chief complaint"))
                .with(FakeElement::new("textarea").id("history").label("History"))
                .with(
                    FakeElement::new("a")
                        .text("View")
                        .on_click(FakeAction::Navigate(format!("{PORTAL}episode/1"))),
                ),
        )
        .with_document(&format!("{PORTAL}episode/1"), FakeDocument::new("Episode one")),
    )
}

fn session(page: Arc<FakePage>) -> (AutomationSession, Arc<FakeLauncher>, TempDir) {
    let temp = tempfile::tempdir().unwrap();
    write_mapping(temp.path(), "vinavi.mapping.json", PORTAL);
    let launcher = Arc::new(FakeLauncher::new(page));
    let options = AutomationOptions {
        timings: Timings::immediate(),
        ..AutomationOptions::default()
    };
    let session = AutomationSession::new(
        launcher.clone(),
        ProfileResolver::new(temp.path()),
        options,
    );
    (session, launcher, temp)
}

#[tokio::test]
async fn open_is_idempotent() {
    let page = portal_page();
    let (session, launcher, _temp) = session(page.clone());

    let bound = session.open(None).await.unwrap();
    assert_eq!(bound.portal_url, PORTAL);
    session.open(Some("vinavi")).await.unwrap();

    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(page.current_url(), PORTAL);
    assert!(session.is_open().await);
}

#[tokio::test]
async fn close_is_safe_when_already_closed() {
    let page = portal_page();
    let (session, launcher, _temp) = session(page.clone());

    session.close().await;
    session.open(None).await.unwrap();
    session.close().await;
    session.close().await;

    assert!(page.is_closed());
    assert!(!session.is_open().await);

    session.open(None).await.unwrap();
    assert_eq!(launcher.launch_count(), 2);
}

#[tokio::test]
async fn fill_opens_the_portal_and_reports_outcomes() {
    let page = portal_page();
    let (session, _launcher, _temp) = session(page.clone());
    let request: FillRequest = serde_json::from_value(serde_json::json!({
        "idCard": "A000111",
        "draft": { "complaint": "Headache", "history": "" },
        "profile": "vinavi"
    }))
    .unwrap();

    let report = session.fill(request, &StatusReporter::silent()).await;

    assert!(report.ok, "{:?}", report.error);
    assert_eq!(report.outcome_of("complaint"), Some(FillOutcome::Filled));
    assert_eq!(report.outcome_of("history"), Some(FillOutcome::Skipped));
    assert_eq!(page.value_of("patientSearch").as_deref(), Some("A000111"));
    assert_eq!(page.value_of("complaint").as_deref(), Some("Headache"));
}

#[tokio::test]
async fn collect_uses_the_open_page() {
    let page = portal_page();
    let (session, _launcher, _temp) = session(page.clone());

    let report = session
        .collect_episodes(
            CollectRequest {
                profile: None,
                limit: Some(0),
            },
            &StatusReporter::silent(),
        )
        .await;

    assert!(report.ok, "{:?}", report.error);
    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].text, "Episode one");
    assert_eq!(page.current_url(), PORTAL);
}

#[tokio::test]
async fn diagnose_lists_candidates() {
    let page = portal_page();
    let (session, _launcher, _temp) = session(page);

    let fields = session.diagnose(None).await.unwrap();
    let ids: Vec<&str> = fields.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["patientSearch", "complaint", "history"]);
}

#[tokio::test]
async fn each_operation_releases_its_element_handles() {
    let page = portal_page();
    let (session, _launcher, _temp) = session(page.clone());

    session.open(None).await.unwrap();
    assert_eq!(page.release_count(), 0);

    let request = FillRequest {
        id_card: "A000111".to_string(),
        draft: Draft::default(),
        profile: None,
    };
    session.fill(request, &StatusReporter::silent()).await;
    assert_eq!(page.release_count(), 1);

    session
        .collect_episodes(CollectRequest::default(), &StatusReporter::silent())
        .await;
    assert_eq!(page.release_count(), 2);

    session.diagnose(None).await.unwrap();
    assert_eq!(page.release_count(), 3);
}

#[tokio::test]
async fn missing_chromium_is_an_environment_error() {
    let temp = tempfile::tempdir().unwrap();
    write_mapping(temp.path(), "vinavi.mapping.json", PORTAL);
    let page = portal_page();
    let session = AutomationSession::new(
        Arc::new(FakeLauncher::unavailable(page.clone())),
        ProfileResolver::new(temp.path()),
        AutomationOptions::default(),
    );

    let error = session.open(None).await.unwrap_err();
    assert!(matches!(error, AutomationError::Environment(_)));

    let report = session
        .fill(
            FillRequest {
                id_card: "A1".into(),
                draft: Draft::new().with("complaint", "x"),
                profile: None,
            },
            &StatusReporter::silent(),
        )
        .await;
    assert!(!report.ok);
    assert!(report.error.unwrap().contains("Browser runtime unavailable"));
    assert_eq!(page.value_of("patientSearch").as_deref(), Some(""));
}

#[tokio::test]
async fn switching_profiles_rebinds_without_relaunch() {
    let page = portal_page();
    let (session, launcher, temp) = session(page.clone());
    write_mapping(temp.path(), "test.mapping.json", "local:test-portal/index.html");

    session.open(None).await.unwrap();
    let rebound = session.open(Some("test")).await.unwrap();

    assert!(rebound.mapping_path.ends_with("test.mapping.json"));
    assert!(rebound.portal_url.starts_with("file://"));
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(page.current_url(), PORTAL);
}

#[tokio::test]
async fn unknown_portal_url_fails_open_and_releases_page() {
    let temp = tempfile::tempdir().unwrap();
    write_mapping(temp.path(), "vinavi.mapping.json", "https://elsewhere.test/");
    let page = portal_page();
    let session = AutomationSession::new(
        Arc::new(FakeLauncher::new(page.clone())),
        ProfileResolver::new(temp.path()),
        AutomationOptions::default(),
    );

    let error = session.open(None).await.unwrap_err();
    assert!(matches!(error, AutomationError::Browser(_)));
    assert!(page.is_closed());
    assert!(!session.is_open().await);
}
