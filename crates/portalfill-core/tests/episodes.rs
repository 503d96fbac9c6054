use portalfill_browser::testkit::{FakeAction, FakeDocument, FakeElement, FakeModal, FakePage};
use portalfill_core::{CollectOptions, EpisodeSettings, StatusReporter, Timings, collect_episodes};

const LIST: &str = "https://portal.test/patients/42/consultations";

fn options(limit: usize) -> CollectOptions {
    CollectOptions {
        limit,
        text_cap: 20_000,
    }
}

/// A list page whose "View" links navigate to one detail page each.
fn navigation_portal(count: usize, body_len: usize) -> FakePage {
    let mut list = FakeDocument::new("Consultations").with(FakeElement::new("a").text("Home"));
    for i in 1..=count {
        list = list.with(
            FakeElement::new("a")
                .text("View")
                .row_text(&format!("2024-0{}-01\tDr. Hassan\tView", i % 9 + 1))
                .on_click(FakeAction::Navigate(format!("{LIST}/{i}"))),
        );
    }
    let mut page = FakePage::new(LIST, list);
    for i in 1..=count {
        let body = format!("Episode {i} ") + &"x".repeat(body_len);
        page = page.with_document(&format!("{LIST}/{i}"), FakeDocument::new(&body));
    }
    page
}

/// A list page whose "View" buttons open a modal with a close button.
fn modal_portal(count: usize, closes_on_escape: bool) -> FakePage {
    let mut list = FakeDocument::new("Consultations");
    for i in 1..=count {
        let mut modal = FakeModal::new(&format!("Episode {i} details"))
            .with(FakeElement::new("button").text("Close").on_click(FakeAction::CloseModal));
        if closes_on_escape {
            modal = modal.closes_on_escape();
        }
        list = list.with(
            FakeElement::new("button")
                .text("VIEW")
                .on_click(FakeAction::OpenModal(modal)),
        );
    }
    FakePage::new(LIST, list)
}

#[tokio::test]
async fn limit_bounds_episode_count() {
    let page = navigation_portal(10, 50);
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(3),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert!(report.ok, "{:?}", report.error);
    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 3);
    let indexes: Vec<usize> = episodes.iter().map(|e| e.index).collect();
    assert_eq!(indexes, vec![1, 2, 3]);
    for episode in &episodes {
        assert_eq!(episode.url, format!("{LIST}/{}", episode.index));
        assert!(episode.text.starts_with(&format!("Episode {}", episode.index)));
        assert!(episode.text.chars().count() <= 20_000);
        assert!(episode.row_text.contains("Dr. Hassan"));
    }
}

#[tokio::test]
async fn navigation_details_restore_list_before_next_trigger() {
    let page = navigation_portal(4, 10);
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(10),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert_eq!(report.episodes.unwrap().len(), 4);
    let clicks = page.clicks();
    assert_eq!(clicks.len(), 4);
    assert!(clicks.iter().all(|click| click.url == LIST));
    assert_eq!(page.current_url(), LIST);
}

#[tokio::test]
async fn modal_details_are_closed_before_next_trigger() {
    let page = modal_portal(3, false);
    let (status, mut rx) = StatusReporter::channel();
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(10),
        &Timings::immediate(),
        &status,
    )
    .await;

    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 3);
    assert_eq!(episodes[1].url, LIST);
    assert!(episodes[1].text.contains("Episode 2 details"));
    assert_eq!(episodes[0].row_text, "");

    let view_clicks: Vec<_> = page
        .clicks()
        .into_iter()
        .filter(|click| click.text == "VIEW")
        .collect();
    assert_eq!(view_clicks.len(), 3);
    assert!(view_clicks.iter().all(|click| click.open_modals == 0));
    assert_eq!(page.open_modal_count(), 0);

    let mut messages = Vec::new();
    while let Ok(update) = rx.try_recv() {
        messages.push(update.message);
    }
    assert!(messages.contains(&"Opening episode 2 of 3...".to_string()));
    assert_eq!(messages.last().map(String::as_str), Some("Fetched 3 episode(s)"));
}

#[tokio::test]
async fn escape_dismissed_modals_need_no_close_click() {
    let page = modal_portal(2, true);
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(5),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert_eq!(report.episodes.unwrap().len(), 2);
    assert!(page.clicks().iter().all(|click| click.text == "VIEW"));
    assert_eq!(page.open_modal_count(), 0);
}

#[tokio::test]
async fn no_triggers_is_an_actionable_error() {
    let page = FakePage::new(
        LIST,
        FakeDocument::new("Dashboard").with(FakeElement::new("a").text("Home")),
    );
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(10),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert!(!report.ok);
    assert!(report.episodes.is_none());
    assert!(report.error.unwrap().contains("consultations list"));
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn text_is_truncated_to_cap() {
    let page = navigation_portal(1, 30_000);
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(1),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    let episode = &report.episodes.unwrap()[0];
    assert_eq!(episode.text.chars().count(), 20_000);
}

#[tokio::test]
async fn hidden_links_fall_back_to_buttons_and_aria_labels() {
    let page = FakePage::new(
        LIST,
        FakeDocument::new("Consultations")
            .with(FakeElement::new("a").text("View").hidden())
            .with(
                FakeElement::new("button")
                    .aria_label("View episode")
                    .on_click(FakeAction::OpenModal(FakeModal::new("Only episode").closes_on_escape())),
            ),
    );
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(10),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].text.contains("Only episode"));
}

#[tokio::test]
async fn custom_text_selector_and_label() {
    let mut settings = EpisodeSettings::default();
    settings.view_label = "^open record$".to_string();
    settings.text_selector = "#episodeBody".to_string();

    let page = FakePage::new(
        LIST,
        FakeDocument::new("Consultations")
            .with(FakeElement::new("a").text("View"))
            .with(
                FakeElement::new("a")
                    .text("Open record")
                    .on_click(FakeAction::Navigate(format!("{LIST}/7"))),
            ),
    )
    .with_document(
        &format!("{LIST}/7"),
        FakeDocument::new("Header chrome Episode notes")
            .with(FakeElement::new("div").id("episodeBody").text("Episode notes")),
    );

    let report = collect_episodes(
        &page,
        &settings,
        &options(10),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].text, "Episode notes");
    assert_eq!(page.current_url(), LIST);
}

#[tokio::test]
async fn vanished_trigger_stops_early_with_collected_episodes() {
    let rerendered = FakeDocument::new("Consultations (filtered)")
        .with(FakeElement::new("button").text("View"));
    let page = FakePage::new(
        LIST,
        FakeDocument::new("Consultations")
            .with(
                FakeElement::new("button")
                    .text("View")
                    .on_click(FakeAction::Replace(rerendered)),
            )
            .with(FakeElement::new("button").text("View"))
            .with(FakeElement::new("button").text("View")),
    );

    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(3),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert!(report.ok);
    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].index, 1);
}

/// List page with its own "Back to patients" control ahead of the triggers.
fn modal_portal_with_back_button(count: usize, closes_on_escape: bool) -> FakePage {
    let mut list = FakeDocument::new("Consultations").with(
        FakeElement::new("button")
            .text("Back to patients")
            .on_click(FakeAction::Navigate("https://portal.test/patients".to_string())),
    );
    for i in 1..=count {
        let mut modal = FakeModal::new(&format!("Episode {i} details"))
            .with(FakeElement::new("button").text("Close").on_click(FakeAction::CloseModal));
        if closes_on_escape {
            modal = modal.closes_on_escape();
        }
        list = list.with(
            FakeElement::new("button")
                .text("View")
                .on_click(FakeAction::OpenModal(modal)),
        );
    }
    FakePage::new(LIST, list)
        .with_document("https://portal.test/patients", FakeDocument::new("Patients"))
}

#[tokio::test]
async fn list_page_back_control_is_never_clicked() {
    let page = modal_portal_with_back_button(3, true);
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(3),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert!(report.ok, "{:?}", report.error);
    assert_eq!(report.episodes.unwrap().len(), 3);
    assert_eq!(page.current_url(), LIST);
    let clicked: Vec<String> = page.clicks().into_iter().map(|click| click.text).collect();
    assert_eq!(clicked, vec!["View", "View", "View"]);
}

#[tokio::test]
async fn modal_close_wins_over_list_back_control() {
    let page = modal_portal_with_back_button(2, false);
    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(2),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert_eq!(report.episodes.unwrap().len(), 2);
    assert_eq!(page.current_url(), LIST);
    assert_eq!(page.open_modal_count(), 0);
    let clicked: Vec<String> = page.clicks().into_iter().map(|click| click.text).collect();
    assert_eq!(clicked, vec!["View", "Close", "View", "Close"]);
}

#[tokio::test]
async fn failed_trigger_click_keeps_collected_episodes() {
    let page = FakePage::new(
        LIST,
        FakeDocument::new("Consultations")
            .with(
                FakeElement::new("button")
                    .text("View")
                    .on_click(FakeAction::OpenModal(FakeModal::new("First").closes_on_escape())),
            )
            .with(FakeElement::new("button").text("View").rejects_click())
            .with(FakeElement::new("button").text("View")),
    );

    let report = collect_episodes(
        &page,
        &EpisodeSettings::default(),
        &options(3),
        &Timings::immediate(),
        &StatusReporter::silent(),
    )
    .await;

    assert!(report.ok, "{:?}", report.error);
    let episodes = report.episodes.unwrap();
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].text.contains("First"));
}
