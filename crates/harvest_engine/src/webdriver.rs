//! [`ViewDriver`] over the W3C WebDriver HTTP protocol.
//!
//! The client attaches to a session some bootstrap code already created;
//! it never launches a browser itself.

use std::time::Duration;

use harvest_logging::harvest_trace;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::{self, Instant};

use crate::{
    ActionKind, ActionTarget, DriverError, DriverFailure, ElementHandle, Selector, ViewDriver,
    WaitCondition, INNER_TEXT,
};

/// Key under which WebDriver wraps element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const PAGE_DOWN_KEY: &str = "\u{E00F}";

const SCROLL_ELEMENT_TO_END: &str = "arguments[0].scrollTop = arguments[0].scrollHeight;";
const SCROLL_WINDOW_TO_END: &str = "window.scrollTo(0, document.body.scrollHeight);";
const SCROLL_ELEMENT_BY: &str = "arguments[0].scrollBy(0, arguments[1]);";
const SCROLL_WINDOW_BY: &str = "window.scrollBy(0, arguments[0]);";
const ELEMENT_EXTENT: &str = "return arguments[0].scrollHeight;";
const WINDOW_EXTENT: &str = "return document.body.scrollHeight;";
const ZOOM_OUT: &str =
    "document.body.style.zoom = String((parseFloat(document.body.style.zoom) || 1) * 0.8);";

#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Interval between condition checks in `wait_until`.
    pub poll_interval: Duration,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebDriverClient {
    client: reqwest::Client,
    session_url: String,
    settings: WebDriverSettings,
}

impl WebDriverClient {
    pub fn new(
        base_url: &str,
        session_id: &str,
        settings: WebDriverSettings,
    ) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| DriverError::new(DriverFailure::Unreachable, err.to_string()))?;
        Ok(Self {
            client,
            session_url: format!("{}/session/{}", base_url.trim_end_matches('/'), session_id),
            settings,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.session_url, path);
        harvest_trace!("WebDriver {} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;

        let payload: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|err| DriverError::new(DriverFailure::Protocol, err.to_string()))?
        };
        let value = match payload {
            Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
            _ => Value::Null,
        };

        if !status.is_success() {
            return Err(error_from_value(status.as_u16(), &value));
        }
        Ok(value)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn send_page_down(&self, element: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": PAGE_DOWN_KEY })),
        )
        .await?;
        Ok(())
    }

    async fn body_element(&self) -> Result<String, DriverError> {
        let handles = self.query_all(&Selector::css("body")).await?;
        handles
            .into_iter()
            .next()
            .map(|handle| handle.id().to_string())
            .ok_or_else(|| DriverError::new(DriverFailure::NoSuchElement, "no body element"))
    }

    async fn condition_holds(&self, condition: &WaitCondition) -> Result<bool, DriverError> {
        match condition {
            WaitCondition::AnyPresent(selectors) => {
                for selector in selectors {
                    if !self.query_all(selector).await?.is_empty() {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            WaitCondition::ScrollExtentAbove(threshold) => {
                let extent = self.current_scroll_extent(ActionTarget::Window).await?;
                Ok(extent > *threshold)
            }
        }
    }
}

fn element_arg(handle: &ElementHandle) -> Value {
    let mut reference = serde_json::Map::new();
    reference.insert(ELEMENT_KEY.to_string(), Value::String(handle.id().to_string()));
    Value::Object(reference)
}

#[async_trait::async_trait]
impl ViewDriver for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector.as_str() })),
            )
            .await?;
        let Value::Array(items) = value else {
            return Err(DriverError::new(
                DriverFailure::Protocol,
                "element list is not an array",
            ));
        };
        Ok(items
            .iter()
            .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(ElementHandle::new)
            .collect())
    }

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let id = handle.id();
        let path = match name {
            INNER_TEXT => format!("/element/{id}/text"),
            // The property resolves relative links against the page URL.
            "href" => format!("/element/{id}/property/href"),
            _ => format!("/element/{id}/attribute/{name}"),
        };
        let value = self.command(Method::GET, &path, None).await?;
        Ok(match value {
            Value::Null => None,
            Value::String(text) => Some(text),
            other => Some(other.to_string()),
        })
    }

    async fn invoke_action(
        &self,
        target: ActionTarget,
        kind: ActionKind,
    ) -> Result<(), DriverError> {
        match (kind, target) {
            (ActionKind::Click, ActionTarget::Element(handle)) => {
                self.command(
                    Method::POST,
                    &format!("/element/{}/click", handle.id()),
                    Some(json!({})),
                )
                .await?;
            }
            (ActionKind::Click, ActionTarget::Window) => {
                return Err(DriverError::new(
                    DriverFailure::Unsupported,
                    "click needs an element",
                ));
            }
            (ActionKind::ScrollBy(px), ActionTarget::Element(handle)) => {
                self.execute(SCROLL_ELEMENT_BY, vec![element_arg(&handle), json!(px)])
                    .await?;
            }
            (ActionKind::ScrollBy(px), ActionTarget::Window) => {
                self.execute(SCROLL_WINDOW_BY, vec![json!(px)]).await?;
            }
            (ActionKind::ScrollToEnd, ActionTarget::Element(handle)) => {
                self.execute(SCROLL_ELEMENT_TO_END, vec![element_arg(&handle)])
                    .await?;
            }
            (ActionKind::ScrollToEnd, ActionTarget::Window) => {
                self.execute(SCROLL_WINDOW_TO_END, Vec::new()).await?;
            }
            (ActionKind::PageDown, ActionTarget::Element(handle)) => {
                self.send_page_down(handle.id()).await?;
            }
            (ActionKind::PageDown, ActionTarget::Window) => {
                let body = self.body_element().await?;
                self.send_page_down(&body).await?;
            }
            (ActionKind::Reload, _) => {
                self.command(Method::POST, "/refresh", Some(json!({})))
                    .await?;
            }
            (ActionKind::ZoomOut, _) => {
                self.execute(ZOOM_OUT, Vec::new()).await?;
            }
        }
        Ok(())
    }

    async fn current_scroll_extent(&self, target: ActionTarget) -> Result<f64, DriverError> {
        let value = match target {
            ActionTarget::Element(handle) => {
                self.execute(ELEMENT_EXTENT, vec![element_arg(&handle)])
                    .await?
            }
            ActionTarget::Window => self.execute(WINDOW_EXTENT, Vec::new()).await?,
        };
        value.as_f64().ok_or_else(|| {
            DriverError::new(DriverFailure::Protocol, format!("scroll extent {value}"))
        })
    }

    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            // A slow endpoint must not stretch the wait past its deadline.
            let remaining = deadline.saturating_duration_since(Instant::now());
            match time::timeout(remaining, self.condition_holds(condition)).await {
                Err(_) => return Ok(false),
                Ok(Ok(true)) => return Ok(true),
                Ok(Ok(false)) => {}
                Ok(Err(err)) if err.is_transient() => {}
                Ok(Err(err)) => return Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}

fn error_from_value(status: u16, value: &Value) -> DriverError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("http status {status}"));
    let kind = match code {
        "stale element reference" => DriverFailure::StaleElement,
        "no such element" => DriverFailure::NoSuchElement,
        "invalid selector" => DriverFailure::InvalidSelector,
        "timeout" | "script timeout" => DriverFailure::Timeout,
        "invalid session id" | "no such window" => DriverFailure::SessionClosed,
        "unknown command" | "unsupported operation" => DriverFailure::Unsupported,
        _ => DriverFailure::Protocol,
    };
    DriverError::new(kind, message)
}

fn map_reqwest_error(err: reqwest::Error) -> DriverError {
    if err.is_timeout() {
        return DriverError::new(DriverFailure::Timeout, err.to_string());
    }
    if err.is_connect() {
        return DriverError::new(DriverFailure::Unreachable, err.to_string());
    }
    DriverError::new(DriverFailure::Protocol, err.to_string())
}
