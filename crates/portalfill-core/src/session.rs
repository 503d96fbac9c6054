//! Browser session lifetime and the operations scoped to it.

use portalfill_browser::{BrowserLauncher, Page, RuntimeProbe};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::diagnose::{DiagnosedField, diagnose_page};
use crate::episodes::{CollectOptions, CollectReport, collect_episodes};
use crate::error::{AutomationError, Result};
use crate::fill::{Draft, FillReport, fill_form};
use crate::options::AutomationOptions;
use crate::profile::{BoundProfile, ProfileResolver};
use crate::status::{BestEffort, StatusReporter};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRequest {
    pub id_card: String,
    #[serde(default)]
    pub draft: Draft,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Default)]
struct SessionState {
    page: Option<Arc<dyn Page>>,
    profile: Option<BoundProfile>,
}

/// Owns at most one page. Operations run one at a time.
pub struct AutomationSession {
    launcher: Arc<dyn BrowserLauncher>,
    resolver: ProfileResolver,
    options: AutomationOptions,
    state: Mutex<SessionState>,
}

impl AutomationSession {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        resolver: ProfileResolver,
        options: AutomationOptions,
    ) -> Self {
        Self {
            launcher,
            resolver,
            options,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn options(&self) -> &AutomationOptions {
        &self.options
    }

    pub fn resolver(&self) -> &ProfileResolver {
        &self.resolver
    }

    pub async fn probe_runtime(&self) -> Result<RuntimeProbe> {
        Ok(self.launcher.probe_runtime().await?)
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.page.is_some()
    }

    /// Launch the browser and load the profile's portal; a no-op when a page is
    /// already open apart from rebinding to a different profile.
    pub async fn open(&self, profile: Option<&str>) -> Result<BoundProfile> {
        let mut state = self.state.lock().await;
        let (_, bound) = self.open_locked(&mut state, profile).await?;
        Ok(bound)
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.profile = None;
        if let Some(page) = state.page.take() {
            match page.close().await {
                Ok(()) => info!("Browser session closed"),
                Err(e) => warn!("Error while closing browser session: {}", e),
            }
        }
    }

    pub async fn fill(&self, request: FillRequest, status: &StatusReporter) -> FillReport {
        let span = info_span!("fill", run_id = %Uuid::new_v4());
        async {
            let mut state = self.state.lock().await;
            let (page, bound) = match self
                .open_locked(&mut state, request.profile.as_deref())
                .await
            {
                Ok(opened) => opened,
                Err(e) => {
                    warn!("Fill could not start: {}", e);
                    return FillReport::failed(&e);
                }
            };
            let report = fill_form(
                page.as_ref(),
                &bound.config,
                &request.id_card,
                &request.draft,
                &self.options.timings,
                status,
            )
            .await;
            release_handles(page.as_ref()).await;
            report
        }
        .instrument(span)
        .await
    }

    pub async fn collect_episodes(
        &self,
        request: CollectRequest,
        status: &StatusReporter,
    ) -> CollectReport {
        let span = info_span!("collect", run_id = %Uuid::new_v4());
        async {
            let mut state = self.state.lock().await;
            let (page, bound) = match self
                .open_locked(&mut state, request.profile.as_deref())
                .await
            {
                Ok(opened) => opened,
                Err(e) => {
                    warn!("Episode collection could not start: {}", e);
                    return CollectReport::failed(&e);
                }
            };
            let options = CollectOptions {
                limit: request.limit.unwrap_or(self.options.default_limit).max(1),
                text_cap: self.options.text_cap,
            };
            let report = collect_episodes(
                page.as_ref(),
                &bound.config.episodes,
                &options,
                &self.options.timings,
                status,
            )
            .await;
            release_handles(page.as_ref()).await;
            report
        }
        .instrument(span)
        .await
    }

    pub async fn diagnose(&self, profile: Option<&str>) -> Result<Vec<DiagnosedField>> {
        let mut state = self.state.lock().await;
        let (page, _) = self.open_locked(&mut state, profile).await?;
        let fields = diagnose_page(page.as_ref()).await;
        release_handles(page.as_ref()).await;
        debug!("Diagnose found {} candidate field(s)", fields.len());
        Ok(fields)
    }

    async fn open_locked(
        &self,
        state: &mut SessionState,
        profile: Option<&str>,
    ) -> Result<(Arc<dyn Page>, BoundProfile)> {
        let mapping_path = self.resolver.mapping_path(profile);

        if let Some(page) = state.page.clone() {
            let rebind = state
                .profile
                .as_ref()
                .is_none_or(|bound| bound.mapping_path != mapping_path);
            if rebind {
                let bound = self.resolver.bind(profile)?;
                info!("Rebound session to {}", bound.mapping_path.display());
                state.profile = Some(bound);
            }
            let bound = state
                .profile
                .clone()
                .ok_or_else(|| AutomationError::Config("no mapping config bound".to_string()))?;
            return Ok((page, bound));
        }

        let probe = self.launcher.probe_runtime().await?;
        if let Some(message) = probe.failure_message() {
            return Err(AutomationError::Environment(message));
        }

        let bound = self.resolver.bind(profile)?;
        info!(
            "Opening portal {} ({})",
            bound.portal_url,
            bound.mapping_path.display()
        );

        let page = self.launcher.launch(&self.options.launch).await?;
        if let Err(e) = page.goto(&bound.portal_url).await {
            if let Err(close_error) = page.close().await {
                debug!("Failed to close page after navigation error: {}", close_error);
            }
            return Err(e.into());
        }

        state.page = Some(page.clone());
        state.profile = Some(bound.clone());
        Ok((page, bound))
    }
}

/// Element handles do not outlive the operation that looked them up.
async fn release_handles(page: &dyn Page) {
    if let BestEffort::Ignored(reason) =
        BestEffort::from_result("release element handles", page.release_handles().await)
    {
        debug!("Element handles kept alive: {}", reason);
    }
}
