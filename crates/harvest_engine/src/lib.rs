//! Harvest engine: drives a rendered view to discover and extract records.
mod config;
mod detail;
mod discovery;
mod driver;
mod error;
mod harvest;
mod hooks;
mod persist;
mod profile;
mod session;
mod snapshot;
mod strategy;
mod webdriver;

pub use config::{DelayRange, HarvestConfig, SessionConfig};
pub use detail::DetailExtractor;
pub use discovery::DiscoveryTier;
pub use driver::{
    query_first, ActionKind, ActionTarget, DriverError, DriverFailure, ElementHandle, Selector,
    ViewDriver, WaitCondition, INNER_TEXT,
};
pub use error::{ConfigError, HarvestError};
pub use harvest::{HarvestLoop, HarvestReport};
pub use hooks::{ConsentHandler, NoConsent, NoopHooks, SessionHooks};
pub use persist::{ensure_output_dir, AtomicFileWriter, JsonProgressWriter, PersistError};
pub use profile::SiteProfile;
pub use session::{HarvestSession, SessionOutcome, SessionReport};
pub use snapshot::HtmlSnapshotDriver;
pub use strategy::{Strategy, StrategyChain};
pub use webdriver::{WebDriverClient, WebDriverSettings};
