use portalfill_browser::Page;
use serde::{Deserialize, Serialize};

use crate::locator::{Located, composite_label, text_entry_candidates};

pub const DIAGNOSE_LIMIT: usize = 80;

/// One text-entry candidate, as shown to someone writing a mapping config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosedField {
    pub tag: String,
    /// Input type for `<input>` elements, empty otherwise.
    #[serde(rename = "type")]
    pub input_type: String,
    pub editable: bool,
    pub label: String,
    pub placeholder: String,
    pub aria_label: String,
    pub name: String,
    pub id: String,
    pub selector_hint: String,
}

impl From<&Located> for DiagnosedField {
    fn from(candidate: &Located) -> Self {
        let info = &candidate.info;
        Self {
            tag: info.tag.clone(),
            input_type: info.input_type.clone().unwrap_or_default(),
            editable: info.content_editable,
            label: composite_label(info).unwrap_or_default(),
            placeholder: info.placeholder.clone().unwrap_or_default(),
            aria_label: info.aria_label.clone().unwrap_or_default(),
            name: info.name.clone().unwrap_or_default(),
            id: info.id.clone().unwrap_or_default(),
            selector_hint: info.selector_hint.clone(),
        }
    }
}

/// Visible text-entry candidates on the current page, capped at [`DIAGNOSE_LIMIT`].
pub async fn diagnose_page(page: &dyn Page) -> Vec<DiagnosedField> {
    text_entry_candidates(page)
        .await
        .iter()
        .filter(|candidate| candidate.info.visible)
        .take(DIAGNOSE_LIMIT)
        .map(DiagnosedField::from)
        .collect()
}
