//! [`ViewDriver`] that replays recorded HTML.
//!
//! Each URL maps to a list of frames, the successive states of an
//! incrementally loading page. Scrolling, paging and clicks advance to the
//! next frame; the last frame is sticky. Handles carry the frame generation
//! they were issued for and go stale when the view changes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ego_tree::{NodeId, NodeRef};
use harvest_core::collapse_whitespace;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use url::Url;

use crate::{
    ActionKind, ActionTarget, DriverError, DriverFailure, ElementHandle, Selector, ViewDriver,
    WaitCondition, INNER_TEXT,
};

/// Simulated document height of one frame.
const FRAME_HEIGHT: f64 = 1000.0;

#[derive(Debug, Default)]
struct SnapshotState {
    pages: HashMap<String, Vec<String>>,
    location: Option<String>,
    frame: usize,
    generation: u64,
    zoom_outs: u32,
    closed: bool,
}

impl SnapshotState {
    fn frames(&self) -> Result<(&str, &[String]), DriverError> {
        if self.closed {
            return Err(DriverError::new(DriverFailure::SessionClosed, "driver closed"));
        }
        let location = self
            .location
            .as_deref()
            .ok_or_else(|| DriverError::new(DriverFailure::Protocol, "nothing loaded"))?;
        let frames = self
            .pages
            .get(location)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok((location, frames))
    }

    fn current_html(&self) -> Result<Html, DriverError> {
        let (_, frames) = self.frames()?;
        let source = frames.get(self.frame).map(String::as_str).unwrap_or("");
        Ok(Html::parse_document(source))
    }

    fn advance(&mut self) {
        let last = self.pages_len().saturating_sub(1);
        if self.frame < last {
            self.frame += 1;
            self.generation += 1;
        }
    }

    fn pages_len(&self) -> usize {
        self.location
            .as_ref()
            .and_then(|location| self.pages.get(location))
            .map_or(0, Vec::len)
    }

    fn extent(&self) -> f64 {
        (self.frame + 1) as f64 * FRAME_HEIGHT
    }

    fn position(&self, handle: &ElementHandle) -> Result<usize, DriverError> {
        let malformed =
            || DriverError::new(DriverFailure::Protocol, format!("bad handle {}", handle.id()));
        let (generation, position) = handle.id().split_once(':').ok_or_else(malformed)?;
        let generation: u64 = generation.parse().map_err(|_| malformed())?;
        let position: usize = position.parse().map_err(|_| malformed())?;
        if generation != self.generation {
            return Err(DriverError::new(
                DriverFailure::StaleElement,
                format!("handle {} is from an earlier view", handle.id()),
            ));
        }
        Ok(position)
    }
}

#[derive(Debug, Default)]
pub struct HtmlSnapshotDriver {
    state: Mutex<SnapshotState>,
}

impl HtmlSnapshotDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, frames: Vec<String>) -> Self {
        self.add_page(url, frames);
        self
    }

    pub fn add_page(&self, url: &str, frames: Vec<String>) {
        self.lock().pages.insert(url.to_string(), frames);
    }

    pub fn location(&self) -> Option<String> {
        self.lock().location.clone()
    }

    pub fn frame(&self) -> usize {
        self.lock().frame
    }

    pub fn zoom_outs(&self) -> u32 {
        self.lock().zoom_outs
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, SnapshotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn select(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError> {
        let parsed = scraper::Selector::parse(selector.as_str()).map_err(|err| {
            DriverError::new(DriverFailure::InvalidSelector, format!("{selector}: {err:?}"))
        })?;
        let state = self.lock();
        let html = state.current_html()?;
        let root = html.tree.root();
        Ok(html
            .select(&parsed)
            .filter_map(|element| position_of(root, element.id()))
            .map(|position| ElementHandle::new(format!("{}:{position}", state.generation)))
            .collect())
    }

    fn attribute(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>, DriverError> {
        let state = self.lock();
        let position = state.position(handle)?;
        let (location, _) = state.frames()?;
        let html = state.current_html()?;
        let element = element_at(&html, position).ok_or_else(|| {
            DriverError::new(DriverFailure::NoSuchElement, format!("no element {}", handle.id()))
        })?;

        Ok(match name {
            INNER_TEXT => Some(collapse_whitespace(&element.text().collect::<String>())),
            "href" => element
                .value()
                .attr("href")
                .map(|raw| resolve_link(location, raw)),
            _ => element.value().attr(name).map(str::to_string),
        })
    }

    fn act(&self, target: ActionTarget, kind: ActionKind) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.frames()?;
        if let ActionTarget::Element(handle) = &target {
            let position = state.position(handle)?;
            let html = state.current_html()?;
            if element_at(&html, position).is_none() {
                return Err(DriverError::new(
                    DriverFailure::NoSuchElement,
                    format!("no element {}", handle.id()),
                ));
            }
        }

        match (kind, target) {
            (ActionKind::Click, ActionTarget::Window) => {
                return Err(DriverError::new(
                    DriverFailure::Unsupported,
                    "click needs an element",
                ));
            }
            (ActionKind::Click, _)
            | (ActionKind::ScrollBy(_), _)
            | (ActionKind::ScrollToEnd, _)
            | (ActionKind::PageDown, _) => state.advance(),
            (ActionKind::Reload, _) => state.generation += 1,
            (ActionKind::ZoomOut, _) => state.zoom_outs += 1,
        }
        Ok(())
    }

    fn holds(&self, condition: &WaitCondition) -> Result<bool, DriverError> {
        match condition {
            WaitCondition::AnyPresent(selectors) => {
                for selector in selectors {
                    match self.select(selector) {
                        Ok(handles) if !handles.is_empty() => return Ok(true),
                        Ok(_) => {}
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(_) => {}
                    }
                }
                Ok(false)
            }
            WaitCondition::ScrollExtentAbove(threshold) => {
                let state = self.lock();
                state.frames()?;
                Ok(state.extent() > *threshold)
            }
        }
    }
}

fn position_of(root: NodeRef<'_, Node>, id: NodeId) -> Option<usize> {
    root.descendants().position(|node| node.id() == id)
}

fn element_at(html: &Html, position: usize) -> Option<ElementRef<'_>> {
    html.tree
        .root()
        .descendants()
        .nth(position)
        .and_then(ElementRef::wrap)
}

fn resolve_link(location: &str, raw: &str) -> String {
    Url::parse(location)
        .and_then(|base| base.join(raw))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[async_trait::async_trait]
impl ViewDriver for HtmlSnapshotDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        if state.closed {
            return Err(DriverError::new(DriverFailure::SessionClosed, "driver closed"));
        }
        if !state.pages.contains_key(url) {
            return Err(DriverError::new(
                DriverFailure::Protocol,
                format!("no recorded page for {url}"),
            ));
        }
        state.location = Some(url.to_string());
        state.frame = 0;
        state.generation += 1;
        Ok(())
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError> {
        self.select(selector)
    }

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.attribute(handle, name)
    }

    async fn invoke_action(
        &self,
        target: ActionTarget,
        kind: ActionKind,
    ) -> Result<(), DriverError> {
        self.act(target, kind)
    }

    async fn current_scroll_extent(&self, target: ActionTarget) -> Result<f64, DriverError> {
        let state = self.lock();
        state.frames()?;
        if let ActionTarget::Element(handle) = &target {
            state.position(handle)?;
        }
        Ok(state.extent())
    }

    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        if self.holds(condition)? {
            return Ok(true);
        }
        // Recorded frames never change on their own.
        tokio::time::sleep(timeout).await;
        self.holds(condition)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.lock().closed = true;
        Ok(())
    }
}
