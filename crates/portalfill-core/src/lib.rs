//! PortalFill automation engine.
//!
//! Resolves loosely-labelled form fields on a clinical portal, fills them
//! from a draft, and collects episode history text from list pages. All
//! browser access goes through [`portalfill_browser::Page`].

pub mod config;
pub mod diagnose;
pub mod episodes;
pub mod error;
pub mod fill;
pub mod injector;
pub mod locator;
pub mod options;
pub mod profile;
pub mod session;
pub mod status;

pub use config::{EpisodeSettings, FieldDescriptor, FieldMap, MappingConfig};
pub use diagnose::{DIAGNOSE_LIMIT, DiagnosedField, diagnose_page};
pub use episodes::{CollectOptions, CollectReport, Episode, collect_episodes};
pub use error::{AutomationError, Result};
pub use fill::{Draft, FieldResult, FillOutcome, FillReport, fill_form};
pub use injector::{InjectOptions, InjectOutcome, Technique, WidgetKind, inject};
pub use locator::{LocateStrategy, Located, locate};
pub use options::{AutomationOptions, Timings};
pub use profile::{BoundProfile, DEFAULT_PROFILE, ProfileResolver, TEST_PROFILE};
pub use session::{AutomationSession, CollectRequest, FillRequest};
pub use status::{BestEffort, StatusReporter, StatusUpdate};
