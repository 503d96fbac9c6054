//! Patient search plus per-field fill across a mapping config.

use portalfill_browser::{Key, Page};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::MappingConfig;
use crate::error::{AutomationError, Result};
use crate::injector::{InjectOptions, InjectOutcome, Technique, inject};
use crate::locator::locate;
use crate::options::Timings;
use crate::status::{BestEffort, StatusReporter};

/// Clinician-authored values keyed by logical field. Missing, `null` and
/// blank values are all skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Draft(BTreeMap<String, Option<String>>);

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), Some(value.to_string()));
        self
    }

    pub fn value(&self, key: &str) -> &str {
        self.0.get(key).and_then(|v| v.as_deref()).unwrap_or("")
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<BTreeMap<String, String>> for Draft {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self(values.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillOutcome {
    Filled,
    NotFound,
    /// Located, but every injection technique failed.
    NotFilled,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResult {
    pub key: String,
    pub outcome: FillOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technique: Option<Technique>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FieldResult {
    fn new(key: &str, outcome: FillOutcome) -> Self {
        Self {
            key: key.to_string(),
            outcome,
            technique: None,
            detail: None,
        }
    }
}

/// On the wire `results` maps each field key to its outcome, in mapping
/// order, and `details` carries technique or failure detail where present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillReport {
    pub ok: bool,
    pub results: Option<Vec<FieldResult>>,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct FieldDetail<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    technique: Option<Technique>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

struct OutcomeMap<'a>(&'a [FieldResult]);

impl Serialize for OutcomeMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in self.0 {
            map.serialize_entry(&result.key, &result.outcome)?;
        }
        map.end()
    }
}

struct DetailMap<'a>(&'a [FieldResult]);

impl DetailMap<'_> {
    fn entries(&self) -> impl Iterator<Item = &FieldResult> {
        self.0
            .iter()
            .filter(|r| r.technique.is_some() || r.detail.is_some())
    }
}

impl Serialize for DetailMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for result in self.entries() {
            let detail = FieldDetail {
                technique: result.technique,
                detail: result.detail.as_deref(),
            };
            map.serialize_entry(&result.key, &detail)?;
        }
        map.end()
    }
}

impl Serialize for FillReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("ok", &self.ok)?;
        if let Some(results) = &self.results {
            map.serialize_entry("results", &OutcomeMap(results))?;
            let details = DetailMap(results);
            if details.entries().next().is_some() {
                map.serialize_entry("details", &details)?;
            }
        }
        if let Some(error) = &self.error {
            map.serialize_entry("error", error)?;
        }
        map.end()
    }
}

impl FillReport {
    pub fn completed(results: Vec<FieldResult>) -> Self {
        Self {
            ok: true,
            results: Some(results),
            error: None,
        }
    }

    pub fn failed(error: &AutomationError) -> Self {
        Self {
            ok: false,
            results: None,
            error: Some(error.to_string()),
        }
    }

    pub fn outcome_of(&self, key: &str) -> Option<FillOutcome> {
        self.results
            .as_ref()?
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.outcome)
    }
}

/// Search for the patient, then fill every mapped field that has a draft value.
pub async fn fill_form(
    page: &dyn Page,
    config: &MappingConfig,
    patient_id: &str,
    draft: &Draft,
    timings: &Timings,
    status: &StatusReporter,
) -> FillReport {
    match run_fill(page, config, patient_id, draft, timings, status).await {
        Ok(results) => FillReport::completed(results),
        Err(e) => {
            warn!("Fill aborted: {}", e);
            FillReport::failed(&e)
        }
    }
}

async fn run_fill(
    page: &dyn Page,
    config: &MappingConfig,
    patient_id: &str,
    draft: &Draft,
    timings: &Timings,
    status: &StatusReporter,
) -> Result<Vec<FieldResult>> {
    let patient_id = patient_id.trim();
    if patient_id.is_empty() {
        return Err(AutomationError::precondition(
            "Patient ID is empty. Enter the patient's ID card number and try again.",
        ));
    }

    for key in draft.keys().filter(|k| !config.fields.contains_key(k)) {
        warn!("Draft key {:?} has no entry in {}; ignoring", key, config.source_name());
    }

    status.report("Waiting for portal...");
    page.wait_until_ready(timings.ready_timeout()).await?;

    status.report("Locating patient search...");
    let Some(search) = locate(page, &config.patient_search).await else {
        return Err(AutomationError::precondition(format!(
            "Could not find the patient search field. Update {} with a selector or labelPattern for patientSearch.",
            config.source_name()
        )));
    };

    let inject_options = InjectOptions {
        keystroke_delay: timings.keystroke_delay(),
    };

    status.report("Searching patient...");
    if let InjectOutcome::Failed(reason) = inject(page, &search, patient_id, &inject_options).await
    {
        return Err(AutomationError::precondition(format!(
            "Could not enter the patient ID into the search field: {reason}"
        )));
    }
    BestEffort::from_result(
        "submit patient search",
        page.press_key(Some(&search.handle), Key::Enter).await,
    );
    tokio::time::sleep(timings.search_settle()).await;

    let mut results = Vec::with_capacity(config.fields.len());
    for (key, descriptor) in config.fields.iter() {
        let value = draft.value(key);
        if value.trim().is_empty() {
            debug!("Skipping {}: no draft value", key);
            results.push(FieldResult::new(key, FillOutcome::Skipped));
            continue;
        }

        status.report(format!("Filling {key}..."));
        let Some(target) = locate(page, descriptor).await else {
            status.report(format!("Skipping {key} (not found)"));
            results.push(FieldResult::new(key, FillOutcome::NotFound));
            continue;
        };

        let result = match inject(page, &target, value, &inject_options).await {
            InjectOutcome::Filled(technique) => FieldResult {
                technique: Some(technique),
                ..FieldResult::new(key, FillOutcome::Filled)
            },
            InjectOutcome::Failed(reason) => {
                warn!("Could not fill {}: {}", key, reason);
                status.report(format!("Could not fill {key}"));
                FieldResult {
                    detail: Some(reason),
                    ..FieldResult::new(key, FillOutcome::NotFilled)
                }
            }
            InjectOutcome::Blank => FieldResult::new(key, FillOutcome::Skipped),
        };
        results.push(result);
    }

    let filled = results
        .iter()
        .filter(|r| r.outcome == FillOutcome::Filled)
        .count();
    info!("Filled {} of {} mapped field(s)", filled, results.len());
    status.report("Fill completed (verify in portal)");
    Ok(results)
}
