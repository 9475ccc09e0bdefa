//! Chromium over CDP.
//!
//! Element access goes through `Runtime.evaluate` with the compiled
//! [`Selector::to_js`] query, input goes through `Input.dispatch*Event`, and
//! completed responses are forwarded from the `Network` domain into the
//! broadcast channel the correlator listens on.

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton as CdpMouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::DriverConfig;
use crate::driver::{
    Driver, ElementState, KeyEvent, MouseButton, NetworkEvent, OriginStorage, PointerEvent,
    StorageEntry, StorageState, StoredCookie, NETWORK_CHANNEL_CAPACITY,
};
use crate::locator::Selector;
use crate::network::HttpMethod;
use crate::result::{E2eError, E2eResult};

fn driver_err(e: impl fmt::Display) -> E2eError {
    E2eError::driver(e.to_string())
}

/// Element snapshot script; `{query}` is a compiled selector
const SNAPSHOT_JS: &str = "(() => { const els = ({query})(document); \
     const norm = (s) => (s || '').replace(/\\s+/g, ' ').trim(); \
     return els.map((el) => { const r = el.getBoundingClientRect(); const cs = getComputedStyle(el); \
       const visible = r.width > 0 && r.height > 0 && cs.visibility !== 'hidden' && cs.display !== 'none'; \
       const cx = r.x + r.width / 2; const cy = r.y + r.height / 2; \
       const top = visible ? document.elementFromPoint(cx, cy) : null; \
       const attrs = {}; for (const a of el.attributes) { attrs[a.name] = a.value; } \
       return { visible, enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true', \
         checked: ('checked' in el && (el.type === 'checkbox' || el.type === 'radio')) ? el.checked \
           : (el.hasAttribute('aria-checked') ? el.getAttribute('aria-checked') === 'true' : null), \
         text: norm(el.innerText || el.textContent), \
         value: ('value' in el && typeof el.value === 'string') ? el.value : null, \
         boundingBox: visible ? { x: r.x, y: r.y, width: r.width, height: r.height } : null, \
         receivesEvents: !!top && (top === el || el.contains(top)), attributes: attrs }; }); })()";

/// Run `{body}` against the `index`th match of `{query}`
const TARGET_JS: &str = "(() => { const el = ({query})(document)[{index}]; \
     if (!el) { throw new Error('no element at index {index}'); } {body} return true; })()";

const FILL_BODY: &str = "el.focus(); \
     const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
     const setter = Object.getOwnPropertyDescriptor(proto, 'value').set; setter.call(el, {value}); \
     el.dispatchEvent(new Event('input', { bubbles: true })); \
     el.dispatchEvent(new Event('change', { bubbles: true }));";

const LOCAL_STORAGE_JS: &str =
    "({ origin: location.origin, entries: Object.entries(localStorage).map(([name, value]) => ({ name, value })) })";

#[derive(Debug, Deserialize)]
struct LocalStorageDump {
    origin: String,
    entries: Vec<StorageEntry>,
}

#[derive(Default)]
struct Inflight {
    methods: HashMap<String, HttpMethod>,
    responses: HashMap<String, NetworkEvent>,
}

/// Chromium-backed driver
pub struct CdpDriver {
    browser: Mutex<Browser>,
    page: Page,
    network: broadcast::Sender<NetworkEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for CdpDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpDriver")
            .field("listeners", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl CdpDriver {
    /// Launch Chromium and open one blank tab with network capture on
    pub async fn launch(config: &DriverConfig) -> E2eResult<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|message| E2eError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| E2eError::BrowserLaunch {
                    message: e.to_string(),
                })?;
        let mut tasks = vec![tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        })];

        let page = browser.new_page("about:blank").await.map_err(driver_err)?;
        page.execute(EnableParams::default()).await.map_err(driver_err)?;

        let (network, _) = broadcast::channel(NETWORK_CHANNEL_CAPACITY);
        tasks.extend(Self::forward_network(&page, &network).await?);
        tracing::info!(headless = config.headless, "chromium launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            network,
            tasks,
        })
    }

    /// Pair request methods with responses and publish once the body is loaded
    async fn forward_network(
        page: &Page,
        network: &broadcast::Sender<NetworkEvent>,
    ) -> E2eResult<Vec<JoinHandle<()>>> {
        let inflight = Arc::new(StdMutex::new(Inflight::default()));
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(driver_err)?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(driver_err)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(driver_err)?;

        let on_request = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                while let Some(req) = requests.next().await {
                    if let Ok(mut state) = inflight.lock() {
                        state.methods.insert(
                            req.request_id.inner().clone(),
                            HttpMethod::parse(&req.request.method),
                        );
                    }
                }
            })
        };

        let on_response = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                while let Some(resp) = responses.next().await {
                    let request_id = resp.request_id.inner().clone();
                    let headers = resp
                        .response
                        .headers
                        .inner()
                        .as_object()
                        .map(|map| {
                            map.iter()
                                .map(|(k, v)| {
                                    (k.to_ascii_lowercase(), v.as_str().unwrap_or_default().to_string())
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    if let Ok(mut state) = inflight.lock() {
                        let method = state
                            .methods
                            .get(&request_id)
                            .copied()
                            .unwrap_or(HttpMethod::Get);
                        state.responses.insert(
                            request_id.clone(),
                            NetworkEvent {
                                request_id,
                                url: resp.response.url.clone(),
                                method,
                                status: u16::try_from(resp.response.status).unwrap_or_default(),
                                headers,
                            },
                        );
                    }
                }
            })
        };

        let on_finished = {
            let network = network.clone();
            tokio::spawn(async move {
                while let Some(done) = finished.next().await {
                    let request_id = done.request_id.inner();
                    let event = inflight.lock().ok().and_then(|mut state| {
                        state.methods.remove(request_id);
                        state.responses.remove(request_id)
                    });
                    if let Some(event) = event {
                        // Nobody armed for this response
                        let _ = network.send(event);
                    }
                }
            })
        };

        Ok(vec![on_request, on_response, on_finished])
    }

    async fn eval_value(&self, script: String) -> E2eResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(driver_err)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn on_target(&self, selector: &Selector, index: usize, body: &str) -> E2eResult<()> {
        let script = TARGET_JS
            .replace("{query}", &selector.to_js())
            .replace("{index}", &index.to_string())
            .replace("{body}", body);
        self.eval_value(script).await.map(|_| ())
    }

    async fn mouse(&self, kind: DispatchMouseEventType, event: &PointerEvent) -> E2eResult<()> {
        let point = event.point();
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(point.x)
            .y(point.y);
        match *event {
            PointerEvent::Down { button, click_count, .. } | PointerEvent::Up { button, click_count, .. } => {
                builder = builder
                    .button(cdp_button(button))
                    .click_count(i64::from(click_count));
            }
            PointerEvent::Wheel { delta_x, delta_y, .. } => {
                builder = builder.delta_x(delta_x).delta_y(delta_y);
            }
            PointerEvent::Move { .. } => {}
        }
        let params = builder.build().map_err(driver_err)?;
        self.page.execute(params).await.map_err(driver_err)?;
        Ok(())
    }

    async fn key_event(&self, kind: DispatchKeyEventType, key: &str) -> E2eResult<()> {
        let mut builder = DispatchKeyEventParams::builder().r#type(kind.clone()).key(key);
        if key.chars().count() == 1 && matches!(kind, DispatchKeyEventType::KeyDown) {
            builder = builder.text(key);
        }
        let params = builder.build().map_err(driver_err)?;
        self.page.execute(params).await.map_err(driver_err)?;
        Ok(())
    }
}

const fn cdp_button(button: MouseButton) -> CdpMouseButton {
    match button {
        MouseButton::Left => CdpMouseButton::Left,
        MouseButton::Right => CdpMouseButton::Right,
        MouseButton::Middle => CdpMouseButton::Middle,
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| E2eError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(driver_err)?
            .unwrap_or_default())
    }

    async fn reload(&self) -> E2eResult<()> {
        self.page.reload().await.map_err(driver_err)?;
        Ok(())
    }

    async fn query(&self, selector: &Selector) -> E2eResult<Vec<ElementState>> {
        let value = self
            .eval_value(SNAPSHOT_JS.replace("{query}", &selector.to_js()))
            .await?;
        serde_json::from_value(value).map_err(|e| E2eError::Decode {
            context: format!("snapshot of {selector}"),
            message: e.to_string(),
            body: String::new(),
        })
    }

    async fn fill(&self, selector: &Selector, index: usize, value: &str) -> E2eResult<()> {
        let literal = serde_json::to_string(value)?;
        self.on_target(selector, index, &FILL_BODY.replace("{value}", &literal))
            .await
    }

    async fn focus(&self, selector: &Selector, index: usize) -> E2eResult<()> {
        self.on_target(selector, index, "el.focus();").await
    }

    async fn scroll_into_view(&self, selector: &Selector, index: usize) -> E2eResult<()> {
        self.on_target(
            selector,
            index,
            "el.scrollIntoView({ block: 'center', inline: 'center' });",
        )
        .await
    }

    async fn pointer(&self, event: PointerEvent) -> E2eResult<()> {
        let kind = match event {
            PointerEvent::Move { .. } => DispatchMouseEventType::MouseMoved,
            PointerEvent::Down { .. } => DispatchMouseEventType::MousePressed,
            PointerEvent::Up { .. } => DispatchMouseEventType::MouseReleased,
            PointerEvent::Wheel { .. } => DispatchMouseEventType::MouseWheel,
        };
        self.mouse(kind, &event).await
    }

    async fn key(&self, event: KeyEvent) -> E2eResult<()> {
        match event {
            KeyEvent::Down(key) => self.key_event(DispatchKeyEventType::KeyDown, &key).await,
            KeyEvent::Up(key) => self.key_event(DispatchKeyEventType::KeyUp, &key).await,
            KeyEvent::Press(key) => {
                self.key_event(DispatchKeyEventType::KeyDown, &key).await?;
                self.key_event(DispatchKeyEventType::KeyUp, &key).await
            }
        }
    }

    async fn evaluate(&self, script: &str) -> E2eResult<serde_json::Value> {
        self.eval_value(script.to_string()).await
    }

    fn subscribe_network(&self) -> broadcast::Receiver<NetworkEvent> {
        self.network.subscribe()
    }

    async fn response_body(&self, request_id: &str) -> E2eResult<String> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::from(request_id.to_string())))
            .await
            .map_err(driver_err)?;
        if response.result.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&response.result.body)
                .map_err(driver_err)?;
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(response.result.body.clone())
    }

    async fn storage_state(&self) -> E2eResult<StorageState> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(driver_err)?
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.map(|s| format!("{s:?}")),
            })
            .collect();
        let dump: LocalStorageDump =
            serde_json::from_value(self.eval_value(LOCAL_STORAGE_JS.to_string()).await?)?;
        let origins = if dump.entries.is_empty() {
            Vec::new()
        } else {
            vec![OriginStorage {
                origin: dump.origin,
                local_storage: dump.entries,
            }]
        };
        Ok(StorageState { cookies, origins })
    }

    async fn restore_storage_state(&self, state: &StorageState) -> E2eResult<()> {
        let cookies = state
            .cookies
            .iter()
            .map(|c| {
                CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .http_only(c.http_only)
                    .secure(c.secure)
                    .build()
                    .map_err(driver_err)
            })
            .collect::<E2eResult<Vec<_>>>()?;
        if !cookies.is_empty() {
            self.page.set_cookies(cookies).await.map_err(driver_err)?;
        }
        for origin in &state.origins {
            self.goto(&origin.origin).await?;
            let entries = serde_json::to_string(&origin.local_storage)?;
            self.eval_value(format!(
                "(() => {{ for (const e of {entries}) {{ localStorage.setItem(e.name, e.value); }} return true; }})()"
            ))
            .await?;
        }
        tracing::debug!(
            cookies = state.cookies.len(),
            origins = state.origins.len(),
            "restored storage state"
        );
        Ok(())
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self.page.execute(params).await.map_err(driver_err)?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(driver_err)
    }

    async fn close(&self) -> E2eResult<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(driver_err)?;
        for task in &self.tasks {
            task.abort();
        }
        Ok(())
    }
}
