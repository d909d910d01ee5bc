//! Capability interface to a rendered, scrollable view.
//!
//! The engine never talks to a browser directly. Everything it needs from
//! the view goes through [`ViewDriver`]; session bootstrap hands the engine
//! an already initialized driver.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pseudo-attribute that reads an element's rendered text.
pub const INNER_TEXT: &str = "innerText";

/// CSS selector understood by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(String);

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to one element of the current view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Window,
    Element(ElementHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Click,
    /// Scroll down by this many pixels.
    ScrollBy(i64),
    ScrollToEnd,
    PageDown,
    Reload,
    ZoomOut,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Click => write!(f, "click"),
            ActionKind::ScrollBy(px) => write!(f, "scroll-by {px}px"),
            ActionKind::ScrollToEnd => write!(f, "scroll-to-end"),
            ActionKind::PageDown => write!(f, "page-down"),
            ActionKind::Reload => write!(f, "reload"),
            ActionKind::ZoomOut => write!(f, "zoom-out"),
        }
    }
}

/// Condition polled by [`ViewDriver::wait_until`].
#[derive(Debug, Clone, PartialEq)]
pub enum WaitCondition {
    /// At least one selector matches an element.
    AnyPresent(Vec<Selector>),
    /// The window's scroll extent grew beyond the value.
    ScrollExtentAbove(f64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverFailure,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Worth retrying or falling through to the next strategy.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// The view is gone; the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DriverError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverFailure {
    Timeout,
    StaleElement,
    NoSuchElement,
    InvalidSelector,
    Unsupported,
    Protocol,
    Unreachable,
    SessionClosed,
}

impl DriverFailure {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverFailure::Timeout | DriverFailure::StaleElement | DriverFailure::NoSuchElement
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverFailure::Unreachable | DriverFailure::SessionClosed)
    }
}

impl fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverFailure::Timeout => write!(f, "timeout"),
            DriverFailure::StaleElement => write!(f, "stale element"),
            DriverFailure::NoSuchElement => write!(f, "no such element"),
            DriverFailure::InvalidSelector => write!(f, "invalid selector"),
            DriverFailure::Unsupported => write!(f, "unsupported operation"),
            DriverFailure::Protocol => write!(f, "protocol error"),
            DriverFailure::Unreachable => write!(f, "driver unreachable"),
            DriverFailure::SessionClosed => write!(f, "session closed"),
        }
    }
}

/// The rendered view the engine drives. One driver has exactly one current
/// location; callers never issue concurrent navigation against it.
#[async_trait::async_trait]
pub trait ViewDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError>;

    /// Reads an attribute; [`INNER_TEXT`] reads the rendered text.
    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn invoke_action(&self, target: ActionTarget, kind: ActionKind)
        -> Result<(), DriverError>;

    async fn current_scroll_extent(&self, target: ActionTarget) -> Result<f64, DriverError>;

    /// Resolves to `Ok(false)` when `timeout` elapses first; never blocks
    /// longer than `timeout`.
    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// Lets a caller keep its own handle on a driver moved into a session.
#[async_trait::async_trait]
impl<D: ViewDriver + ?Sized> ViewDriver for Arc<D> {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        (**self).navigate(url).await
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError> {
        (**self).query_all(selector).await
    }

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        (**self).read_attribute(handle, name).await
    }

    async fn invoke_action(&self, target: ActionTarget, kind: ActionKind)
        -> Result<(), DriverError> {
        (**self).invoke_action(target, kind).await
    }

    async fn current_scroll_extent(&self, target: ActionTarget) -> Result<f64, DriverError> {
        (**self).current_scroll_extent(target).await
    }

    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        (**self).wait_until(condition, timeout).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        (**self).close().await
    }
}

/// First handle matched by any of `selectors`, tried in order. Transient
/// failures on one selector move on to the next.
pub async fn query_first(
    driver: &dyn ViewDriver,
    selectors: &[Selector],
) -> Result<Option<ElementHandle>, DriverError> {
    for selector in selectors {
        match driver.query_all(selector).await {
            Ok(handles) => {
                if let Some(handle) = handles.into_iter().next() {
                    return Ok(Some(handle));
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                harvest_logging::harvest_debug!("query {} failed: {}", selector, err);
            }
        }
    }
    Ok(None)
}
