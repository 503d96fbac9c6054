//! Chromium page driver for PortalFill.
//!
//! This crate owns everything that talks to a real browser:
//! - Runtime probing for a usable Chromium executable
//! - Launching Chromium with a persistent profile and a DevTools port
//! - A small DevTools protocol client over WebSocket
//! - The [`Page`] trait the automation engine drives, plus in-memory fakes
//!   in [`testkit`] for exercising that engine without a browser

mod cdp;
mod cdp_page;
mod launcher;
mod page;
mod probe;
pub mod testkit;

pub use cdp::CdpConnection;
pub use cdp_page::CdpPage;
pub use launcher::{ChromiumLauncher, LaunchOptions};
pub use page::{BrowserLauncher, ElementHandle, ElementInfo, Key, Page};
pub use probe::{CHROMIUM_ENV, RuntimeProbe, probe_chromium};
