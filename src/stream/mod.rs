//! Event Stream
//!
//! A long-lived SSE-style subscription that delivers typed device events
//! to caller-registered callbacks, surviving transient network and server
//! faults by reconnecting with backoff. The whole state machine runs on
//! one spawned [`tokio::task`]; because callback invocation happens
//! synchronously from within that single task, callbacks are serialized
//! relative to each other without any extra delivery-context machinery —
//! this *is* the single serial delivery context the specification calls
//! for.

pub mod decoder;
pub mod events;

use crate::auth::Authenticator;
use crate::config;
use crate::error::{Error, ErrorBody, ErrorKind, StatusOutcome, StreamCodeOutcome, classify_status, map_stream_error_code};
use crate::request::Request;
use crate::retry::RetryScheme;
use decoder::{DecodedEvent, RawEventEnvelope, decode};
use events::*;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, HeaderValue};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Observable lifecycle states. `Idle` from the specification is never
/// externally observed: construction starts connecting immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Backoff,
    Closed,
}

type Callback<T> = Box<dyn Fn(String, T) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_touch: Option<Callback<TouchEvent>>,
    on_temperature: Option<Callback<TemperatureEvent>>,
    on_object_present: Option<Callback<ObjectPresentEvent>>,
    on_humidity: Option<Callback<HumidityEvent>>,
    on_object_present_count: Option<Callback<ObjectPresentCountEvent>>,
    on_touch_count: Option<Callback<TouchCountEvent>>,
    on_water_present: Option<Callback<WaterPresentEvent>>,
    on_network_status: Option<Callback<NetworkStatusEvent>>,
    on_battery_status: Option<Callback<BatteryStatusEvent>>,
    on_labels_changed: Option<Callback<LabelsChangedEvent>>,
    on_connection_status: Option<Callback<ConnectionStatusEvent>>,
    on_ethernet_status: Option<Callback<EthernetStatusEvent>>,
    on_cellular_status: Option<Callback<CellularStatusEvent>>,
    on_error: Option<Box<dyn Fn(Error) + Send + Sync>>,
}

/// A long-lived device-event subscription. Construct with [`EventStream::new`];
/// it starts connecting immediately and keeps reconnecting until
/// [`EventStream::close`] is called.
pub struct EventStream {
    callbacks: Arc<Mutex<Callbacks>>,
    state: Arc<Mutex<StreamState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

macro_rules! callback_setter {
    ($set_name:ident, $clear_name:ident, $field:ident, $event:ty) => {
        /// Register a callback for this event variant, replacing any
        /// previously set one. Safe to call at any time.
        pub fn $set_name(&self, callback: impl Fn(String, $event) + Send + Sync + 'static) {
            self.callbacks.lock().unwrap().$field = Some(Box::new(callback));
        }

        /// Clear a previously registered callback, if any.
        pub fn $clear_name(&self) {
            self.callbacks.lock().unwrap().$field = None;
        }
    };
}

impl EventStream {
    /// Start the stream: spawns a task that connects, authenticates, and
    /// begins reading events. Construction inputs are the request
    /// describing the stream endpoint (filters included as query
    /// parameters by the caller) and the authenticator to use for every
    /// (re)connect attempt.
    pub fn new(request: Request, authenticator: Arc<dyn Authenticator>) -> Self {
        let callbacks = Arc::new(Mutex::new(Callbacks::default()));
        let state = Arc::new(Mutex::new(StreamState::Connecting));
        let cancel = CancellationToken::new();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config::STREAM_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(config::STREAM_TIMEOUT_SECS))
            .build()
            .expect("default stream client config is always valid");

        let task = tokio::spawn(run(
            request,
            authenticator,
            http,
            callbacks.clone(),
            state.clone(),
            cancel.clone(),
        ));

        Self {
            callbacks,
            state,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current observable lifecycle state.
    pub fn state(&self) -> StreamState {
        *self.state.lock().unwrap()
    }

    /// Idempotent: the first call cancels the in-flight HTTP task and
    /// transitions to `Closed`; subsequent calls are no-ops. A closed
    /// stream cannot be reopened.
    pub fn close(&self) {
        self.cancel.cancel();
        *self.state.lock().unwrap() = StreamState::Closed;
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }

    callback_setter!(on_touch, clear_on_touch, on_touch, TouchEvent);
    callback_setter!(
        on_temperature,
        clear_on_temperature,
        on_temperature,
        TemperatureEvent
    );
    callback_setter!(
        on_object_present,
        clear_on_object_present,
        on_object_present,
        ObjectPresentEvent
    );
    callback_setter!(on_humidity, clear_on_humidity, on_humidity, HumidityEvent);
    callback_setter!(
        on_object_present_count,
        clear_on_object_present_count,
        on_object_present_count,
        ObjectPresentCountEvent
    );
    callback_setter!(
        on_touch_count,
        clear_on_touch_count,
        on_touch_count,
        TouchCountEvent
    );
    callback_setter!(
        on_water_present,
        clear_on_water_present,
        on_water_present,
        WaterPresentEvent
    );
    callback_setter!(
        on_network_status,
        clear_on_network_status,
        on_network_status,
        NetworkStatusEvent
    );
    callback_setter!(
        on_battery_status,
        clear_on_battery_status,
        on_battery_status,
        BatteryStatusEvent
    );
    callback_setter!(
        on_labels_changed,
        clear_on_labels_changed,
        on_labels_changed,
        LabelsChangedEvent
    );
    callback_setter!(
        on_connection_status,
        clear_on_connection_status,
        on_connection_status,
        ConnectionStatusEvent
    );
    callback_setter!(
        on_ethernet_status,
        clear_on_ethernet_status,
        on_ethernet_status,
        EthernetStatusEvent
    );
    callback_setter!(
        on_cellular_status,
        clear_on_cellular_status,
        on_cellular_status,
        CellularStatusEvent
    );

    /// Register the error callback, invoked when a `StreamError` frame
    /// maps to a non-session-timeout error kind.
    pub fn on_error(&self, callback: impl Fn(Error) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().on_error = Some(Box::new(callback));
    }

    pub fn clear_on_error(&self) {
        self.callbacks.lock().unwrap().on_error = None;
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

enum ConnectOutcome {
    /// Cancelled mid-connect or mid-stream; the state machine should stop.
    Closed,
    /// Connection terminated (transport error, non-2xx before streaming,
    /// or EOF); carries the error to report via `onError` before
    /// reconnecting.
    Disconnected(Option<Error>),
}

async fn run(
    request: Request,
    authenticator: Arc<dyn Authenticator>,
    http: reqwest::Client,
    callbacks: Arc<Mutex<Callbacks>>,
    state: Arc<Mutex<StreamState>>,
    cancel: CancellationToken,
) {
    let mut retry = RetryScheme::new();

    loop {
        if cancel.is_cancelled() {
            return;
        }
        *state.lock().unwrap() = StreamState::Connecting;

        let outcome = connect_and_stream(
            &request,
            &authenticator,
            &http,
            &callbacks,
            &state,
            &cancel,
            &mut retry,
        )
        .await;

        match outcome {
            ConnectOutcome::Closed => {
                *state.lock().unwrap() = StreamState::Closed;
                return;
            }
            ConnectOutcome::Disconnected(err) => {
                if let Some(err) = err {
                    tracing::warn!(kind = ?err.kind, "event stream: disconnected, notifying onError");
                    invoke_error(&callbacks, err);
                }
            }
        }

        if cancel.is_cancelled() {
            *state.lock().unwrap() = StreamState::Closed;
            return;
        }

        *state.lock().unwrap() = StreamState::Backoff;
        let delay = retry.next();
        tracing::debug!(?delay, "event stream: backing off before reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                *state.lock().unwrap() = StreamState::Closed;
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn connect_and_stream(
    request: &Request,
    authenticator: &Arc<dyn Authenticator>,
    http: &reqwest::Client,
    callbacks: &Arc<Mutex<Callbacks>>,
    state: &Arc<Mutex<StreamState>>,
    cancel: &CancellationToken,
    retry: &mut RetryScheme,
) -> ConnectOutcome {
    let token = match authenticator.get_active().await {
        Ok(t) => t,
        Err(e) => return ConnectOutcome::Disconnected(Some(e)),
    };

    let url = match request.build_url() {
        Ok(u) => u,
        Err(e) => return ConnectOutcome::Disconnected(Some(e)),
    };

    let auth_value = match HeaderValue::from_str(&token) {
        Ok(v) => v,
        Err(e) => {
            return ConnectOutcome::Disconnected(Some(Error::unknown_error(format!(
                "invalid token value: {e}"
            ))));
        }
    };

    let builder = http
        .request(request.method.clone(), url)
        .headers(request.headers.clone())
        .header(AUTHORIZATION, auth_value)
        .header(ACCEPT, HeaderValue::from_static("application/json"))
        .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let response = tokio::select! {
        res = builder.send() => res,
        _ = cancel.cancelled() => return ConnectOutcome::Closed,
    };

    let response = match response {
        Ok(r) => r,
        Err(e) => return ConnectOutcome::Disconnected(Some(Error::server_unavailable(e.to_string()))),
    };

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let kind = match classify_status(status, response.headers()) {
            StatusOutcome::Mapped(kind) => kind,
            StatusOutcome::TooManyRequests { .. } => ErrorKind::ServerUnavailable,
            StatusOutcome::Unknown => ErrorKind::UnknownError,
            StatusOutcome::Success => unreachable!("non-2xx status classified as success"),
        };
        let bytes = response.bytes().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        return ConnectOutcome::Disconnected(Some(Error::with_details(kind, body.error, body.help)));
    }

    *state.lock().unwrap() = StreamState::Streaming;

    let mut bytes_stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            c = bytes_stream.next() => c,
            _ = cancel.cancelled() => return ConnectOutcome::Closed,
        };

        let chunk = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                return ConnectOutcome::Disconnected(Some(Error::server_unavailable(e.to_string())));
            }
            None => {
                return ConnectOutcome::Disconnected(Some(Error::server_unavailable(
                    "stream closed by server",
                )));
            }
        };

        buffer.extend_from_slice(&chunk);
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if !line.is_empty() {
                handle_line(line, callbacks, retry);
            }
        }
    }
}

#[derive(Deserialize)]
struct StreamResultEnvelope {
    result: StreamResultInner,
}

#[derive(Deserialize)]
struct StreamResultInner {
    event: RawEventEnvelope,
}

#[derive(Deserialize)]
struct StreamErrorEnvelope {
    error: StreamErrorInner,
}

#[derive(Deserialize)]
struct StreamErrorInner {
    code: i64,
    message: String,
    #[serde(default)]
    details: Vec<StreamErrorDetail>,
}

#[derive(Deserialize, Default)]
struct StreamErrorDetail {
    #[serde(default)]
    help: Option<String>,
}

/// One complete line: either a `StreamResult` or a `StreamError` envelope.
/// Neither decoding → log and discard.
fn handle_line(line: &[u8], callbacks: &Arc<Mutex<Callbacks>>, retry: &mut RetryScheme) {
    if let Ok(envelope) = serde_json::from_slice::<StreamResultEnvelope>(line) {
        retry.reset();
        match decode(envelope.result.event) {
            Ok(decoded) => dispatch(callbacks, decoded),
            Err(e) => tracing::warn!(error = %e, "event stream: dropping undecodable event"),
        }
        return;
    }

    if let Ok(envelope) = serde_json::from_slice::<StreamErrorEnvelope>(line) {
        match map_stream_error_code(envelope.error.code) {
            StreamCodeOutcome::SessionTimeout => {
                tracing::debug!("event stream: session timeout frame, stream will restart");
            }
            StreamCodeOutcome::Mapped(kind) => {
                let help = envelope
                    .error
                    .details
                    .first()
                    .and_then(|d| d.help.clone());
                tracing::warn!(?kind, ?help, "event stream: server-reported error frame");
                let err = Error::with_details(kind, Some(envelope.error.message), help);
                invoke_error(callbacks, err);
            }
        }
        return;
    }

    tracing::warn!("event stream: discarding unparsable frame");
}

fn dispatch(callbacks: &Arc<Mutex<Callbacks>>, decoded: DecodedEvent) {
    let cbs = callbacks.lock().unwrap();
    let id = decoded.device_id;
    match decoded.event {
        DeviceEvent::Touch(e) => invoke(&cbs.on_touch, id, e),
        DeviceEvent::Temperature(e) => invoke(&cbs.on_temperature, id, e),
        DeviceEvent::ObjectPresent(e) => invoke(&cbs.on_object_present, id, e),
        DeviceEvent::Humidity(e) => invoke(&cbs.on_humidity, id, e),
        DeviceEvent::ObjectPresentCount(e) => invoke(&cbs.on_object_present_count, id, e),
        DeviceEvent::TouchCount(e) => invoke(&cbs.on_touch_count, id, e),
        DeviceEvent::WaterPresent(e) => invoke(&cbs.on_water_present, id, e),
        DeviceEvent::NetworkStatus(e) => invoke(&cbs.on_network_status, id, e),
        DeviceEvent::BatteryStatus(e) => invoke(&cbs.on_battery_status, id, e),
        DeviceEvent::LabelsChanged(e) => invoke(&cbs.on_labels_changed, id, e),
        DeviceEvent::ConnectionStatus(e) => invoke(&cbs.on_connection_status, id, e),
        DeviceEvent::EthernetStatus(e) => invoke(&cbs.on_ethernet_status, id, e),
        DeviceEvent::CellularStatus(e) => invoke(&cbs.on_cellular_status, id, e),
        DeviceEvent::Unknown(name) => {
            tracing::debug!(event_type = %name, "event stream: unknown event type, dropping");
        }
    }
}

fn invoke<T>(callback: &Option<Callback<T>>, device_id: String, event: T) {
    if let Some(cb) = callback {
        cb(device_id, event);
    }
}

fn invoke_error(callbacks: &Arc<Mutex<Callbacks>>, err: Error) {
    let cbs = callbacks.lock().unwrap();
    if let Some(cb) = &cbs.on_error {
        cb(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::auth::basic::BasicAuthenticator;
    use reqwest::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn authenticator() -> Arc<dyn Authenticator> {
        let auth = Arc::new(BasicAuthenticator::new(Credentials::new("e", "k", "s")));
        auth.login().await.unwrap();
        auth
    }

    #[tokio::test]
    async fn dispatches_touch_event_to_its_callback() {
        let server = MockServer::start().await;
        let body = "{\"result\":{\"event\":{\"eventType\":\"touch\",\"targetName\":\"projects/x/devices/D1\",\"data\":{\"touch\":{\"updateTime\":\"2021-01-01T00:00:00.000Z\"}}}}}\n";
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "application/json")
                    .set_delay(Duration::from_millis(0)),
            )
            .mount(&server)
            .await;

        let request = Request::new(Method::GET, server.uri(), "/stream");
        let stream = EventStream::new(request, authenticator().await);

        let touches: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let seen_device = Arc::new(Mutex::new(String::new()));
        let counter = touches.clone();
        let device_slot = seen_device.clone();
        stream.on_touch(move |device_id, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            *device_slot.lock().unwrap() = device_id;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        stream.close();

        assert_eq!(touches.load(Ordering::SeqCst), 1);
        assert_eq!(&*seen_device.lock().unwrap(), "D1");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("", "application/json"))
            .mount(&server)
            .await;

        let request = Request::new(Method::GET, server.uri(), "/stream");
        let stream = EventStream::new(request, authenticator().await);
        stream.close();
        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[tokio::test]
    async fn session_timeout_code_does_not_invoke_on_error() {
        let server = MockServer::start().await;
        let body = "{\"error\":{\"code\":4,\"message\":\"timeout\",\"details\":[]}}\n";
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let request = Request::new(Method::GET, server.uri(), "/stream");
        let stream = EventStream::new(request, authenticator().await);

        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        stream.on_error(move |_err| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        stream.close();

        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
