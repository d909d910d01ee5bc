#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

use harvest_engine::{
    ActionKind, ActionTarget, DriverError, DriverFailure, ElementHandle, Selector, ViewDriver,
    WaitCondition,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(harvest_logging::initialize_for_tests);
}

pub fn place(n: usize) -> String {
    format!("https://www.google.com/maps/place/item-{n}")
}

#[derive(Debug, Default)]
struct Script {
    /// Links visible after 0, 1, 2, ... load-more actions; the last view is sticky.
    views: Vec<Vec<String>>,
    view: usize,
    actions: Vec<(bool, ActionKind)>,
    navigations: Vec<String>,
    queries: Vec<String>,
    /// Selector, failure kind and how many more queries fail.
    query_faults: Vec<(String, DriverFailure, u32)>,
    /// Actions that always fail transiently, keyed by (on window, kind).
    failing_actions: Vec<(bool, ActionKind)>,
    /// Selector that matches one scrollable list container.
    container: Option<String>,
    closed: bool,
    panic_on_query: bool,
}

/// List-view driver that reveals a scripted sequence of links. Every link
/// query matches; every other selector matches nothing unless it is the
/// configured container.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub fn new(views: Vec<Vec<String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                views,
                ..Script::default()
            })),
        }
    }

    /// One more link per load-more action, up to `total`.
    pub fn growing(total: usize) -> Self {
        Self::new((1..=total).map(|n| (1..=n).map(place).collect()).collect())
    }

    pub fn empty() -> Self {
        Self::new(vec![Vec::new()])
    }

    pub fn panicking() -> Self {
        let driver = Self::empty();
        driver.lock().panic_on_query = true;
        driver
    }

    /// `selector` fails with `kind` for the next `times` queries.
    pub fn fail_query(self, selector: &str, kind: DriverFailure, times: u32) -> Self {
        self.lock()
            .query_faults
            .push((selector.to_string(), kind, times));
        self
    }

    pub fn fail_action(self, on_window: bool, kind: ActionKind) -> Self {
        self.lock().failing_actions.push((on_window, kind));
        self
    }

    pub fn with_container(self, selector: &str) -> Self {
        self.lock().container = Some(selector.to_string());
        self
    }

    /// Every action attempted, failed ones included, as (on window, kind).
    pub fn actions(&self) -> Vec<(bool, ActionKind)> {
        self.lock().actions.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    /// Kinds of window-level actions, in order.
    pub fn window_actions(&self) -> Vec<ActionKind> {
        self.lock()
            .actions
            .iter()
            .filter(|(on_window, _)| *on_window)
            .map(|(_, kind)| *kind)
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_open(script: &Script) -> Result<(), DriverError> {
        if script.closed {
            Err(DriverError::new(DriverFailure::SessionClosed, "closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ViewDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut script = self.lock();
        Self::check_open(&script)?;
        script.navigations.push(url.to_string());
        Ok(())
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError> {
        let mut script = self.lock();
        Self::check_open(&script)?;
        if script.panic_on_query {
            drop(script);
            panic!("scripted driver exploded");
        }
        script.queries.push(selector.as_str().to_string());
        if let Some(fault) = script
            .query_faults
            .iter_mut()
            .find(|(failing, _, times)| failing == selector.as_str() && *times > 0)
        {
            fault.2 -= 1;
            return Err(DriverError::new(fault.1.clone(), "scripted query failure"));
        }
        if script.container.as_deref() == Some(selector.as_str()) {
            return Ok(vec![ElementHandle::new("container")]);
        }
        if !selector.as_str().contains("/maps/place/") {
            return Ok(Vec::new());
        }
        let links = script.views.get(script.view).map_or(0, Vec::len);
        Ok((0..links)
            .map(|index| ElementHandle::new(index.to_string()))
            .collect())
    }

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let script = self.lock();
        Self::check_open(&script)?;
        if name != "href" {
            return Ok(None);
        }
        let index: usize = handle.id().parse().unwrap();
        Ok(script
            .views
            .get(script.view)
            .and_then(|links| links.get(index))
            .cloned())
    }

    async fn invoke_action(
        &self,
        target: ActionTarget,
        kind: ActionKind,
    ) -> Result<(), DriverError> {
        let mut script = self.lock();
        Self::check_open(&script)?;
        let on_window = matches!(target, ActionTarget::Window);
        script.actions.push((on_window, kind));
        if script.failing_actions.contains(&(on_window, kind)) {
            return Err(DriverError::new(DriverFailure::Unsupported, "scripted action failure"));
        }
        if matches!(
            kind,
            ActionKind::ScrollToEnd | ActionKind::ScrollBy(_) | ActionKind::PageDown
        ) && script.view + 1 < script.views.len()
        {
            script.view += 1;
        }
        Ok(())
    }

    async fn current_scroll_extent(&self, _target: ActionTarget) -> Result<f64, DriverError> {
        let script = self.lock();
        Self::check_open(&script)?;
        Ok(script.view as f64 * 1000.0)
    }

    async fn wait_until(
        &self,
        _condition: &WaitCondition,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        Self::check_open(&self.lock())?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Wraps a driver and fails navigation to chosen locations a number of
/// times before letting it through.
pub struct FlakyNavigation<D> {
    inner: D,
    faults: Mutex<Vec<(String, DriverFailure, u32)>>,
    attempts: Mutex<Vec<String>>,
}

impl<D: ViewDriver> FlakyNavigation<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(self, url: &str, kind: DriverFailure, times: u32) -> Self {
        self.faults
            .lock()
            .unwrap()
            .push((url.to_string(), kind, times));
        self
    }

    pub fn attempts_for(&self, url: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|attempt| attempt.as_str() == url)
            .count()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<D: ViewDriver> ViewDriver for FlakyNavigation<D> {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.attempts.lock().unwrap().push(url.to_string());
        let failure = {
            let mut faults = self.faults.lock().unwrap();
            faults
                .iter_mut()
                .find(|(failing, _, times)| failing == url && *times > 0)
                .map(|fault| {
                    fault.2 -= 1;
                    fault.1.clone()
                })
        };
        match failure {
            Some(kind) => Err(DriverError::new(kind, format!("scripted failure opening {url}"))),
            None => self.inner.navigate(url).await,
        }
    }

    async fn query_all(&self, selector: &Selector) -> Result<Vec<ElementHandle>, DriverError> {
        self.inner.query_all(selector).await
    }

    async fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.inner.read_attribute(handle, name).await
    }

    async fn invoke_action(
        &self,
        target: ActionTarget,
        kind: ActionKind,
    ) -> Result<(), DriverError> {
        self.inner.invoke_action(target, kind).await
    }

    async fn current_scroll_extent(&self, target: ActionTarget) -> Result<f64, DriverError> {
        self.inner.current_scroll_extent(target).await
    }

    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        self.inner.wait_until(condition, timeout).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.inner.close().await
    }
}

fn list_frame(items: &[usize]) -> String {
    let cards: String = items
        .iter()
        .map(|n| {
            format!(
                r#"<div class="Nv2PK"><a class="hfpxzc" href="/maps/place/item-{n}?authuser=0">Cafe {n}</a></div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div role="feed">{cards}</div></body></html>"#)
}

fn named_detail(n: usize) -> String {
    format!(
        r#"<html><body><div role="main">
            <h1 class="DUwDvf">Cafe {n}</h1>
            <button data-item-id="address"><div>{n} Main Street, Pune</div></button>
            <div class="F7nice"><span aria-hidden="true">4.{n}</span><span>({n}23)</span></div>
            <button class="DkEaL">Coffee shop</button>
            <a data-item-id="authority" href="https://cafe-{n}.example/">cafe-{n}.example</a>
            <button data-item-id="phone:tel:+9198765432{n:02}" aria-label="Phone: +91 98765 432{n:02}">
                <div>098765 432{n:02}</div>
            </button>
        </div></body></html>"#
    )
}

fn nameless_detail(n: usize) -> String {
    format!(
        r#"<html><body><div role="main">
            <button data-item-id="address"><div>{n} Main Street, Pune</div></button>
            <a href="tel:+9198765432{n:02}">Call</a>
        </div></body></html>"#
    )
}

/// Search for `query` listing five places over three frames (2, 4, 5
/// visible); places 2 and 4 have no name on their detail view.
pub fn maps_fixture(query: &str) -> harvest_engine::HtmlSnapshotDriver {
    let search = harvest_engine::SiteProfile::maps().search_url(query);
    let driver = harvest_engine::HtmlSnapshotDriver::new().with_page(
        &search,
        vec![
            list_frame(&[1, 2]),
            list_frame(&[1, 2, 3, 4]),
            list_frame(&[1, 2, 3, 4, 5]),
        ],
    );
    for n in 1..=5 {
        let detail = if n % 2 == 0 {
            nameless_detail(n)
        } else {
            named_detail(n)
        };
        driver.add_page(&place(n), vec![detail]);
    }
    driver
}
