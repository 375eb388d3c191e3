use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use orchestrator::InvocationSink;
use reqwest::Client;
use shared::{
    domain::{DeviceId, Invocation},
    error::ApiError,
    protocol::{DeviceEvent, InvokeRequest, InvokeResponse},
};
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

/// Performs a method invocation on a device and returns its text output.
#[async_trait]
pub trait DeviceInvoker: Send + Sync {
    async fn invoke(&self, device: DeviceId, invocation: &Invocation) -> Result<String>;
}

/// Device servers addressed by index: the `n`th `--device` URL is device `n`.
pub struct HttpDevices {
    http: Client,
    endpoints: BTreeMap<DeviceId, String>,
}

impl HttpDevices {
    pub fn new(urls: &[String], timeout: Duration) -> Result<Self> {
        let mut endpoints = BTreeMap::new();
        for (index, raw) in urls.iter().enumerate() {
            let url = Url::parse(raw).with_context(|| format!("invalid device url: {raw}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("device url must start with http:// or https://: {raw}");
            }
            let index = i64::try_from(index).context("too many devices")?;
            endpoints.insert(DeviceId(index), raw.trim_end_matches('/').to_string());
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, endpoints })
    }

    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &str)> {
        self.endpoints.iter().map(|(id, url)| (*id, url.as_str()))
    }

    fn endpoint(&self, device: DeviceId) -> Result<&str> {
        self.endpoints
            .get(&device)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("no device {device}"))
    }
}

#[async_trait]
impl DeviceInvoker for HttpDevices {
    async fn invoke(&self, device: DeviceId, invocation: &Invocation) -> Result<String> {
        let server_url = self.endpoint(device)?;
        let response = self
            .http
            .post(method_url(server_url, invocation)?)
            .json(&InvokeRequest {
                parameter: invocation.parameter.clone(),
            })
            .send()
            .await
            .with_context(|| format!("failed to reach device {device} at {server_url}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<ApiError>().await {
                Ok(err) => err.message,
                Err(_) => status.to_string(),
            };
            bail!("device {device} rejected {}: {message}", invocation.browse_name());
        }
        let body: InvokeResponse = response.json().await?;
        Ok(body.output)
    }
}

/// Hands each invocation to its own task so the control loop never waits.
pub struct SpawningSink {
    invoker: Arc<dyn DeviceInvoker>,
    runtime: Handle,
}

impl SpawningSink {
    pub fn new(invoker: Arc<dyn DeviceInvoker>, runtime: Handle) -> Self {
        Self { invoker, runtime }
    }
}

impl InvocationSink for SpawningSink {
    fn submit(&self, device: DeviceId, invocation: Invocation) {
        let invoker = Arc::clone(&self.invoker);
        self.runtime.spawn(async move {
            match invoker.invoke(device, &invocation).await {
                Ok(output) => info!(%device, invocation = %invocation.browse_name(), %output, "method returned"),
                Err(err) => warn!(%device, invocation = %invocation.browse_name(), error = %err, "invocation failed"),
            }
        });
    }
}

/// `<server>/skills/<skill>/methods/<method>`, with both names encoded as
/// single path segments.
pub fn method_url(server_url: &str, invocation: &Invocation) -> Result<Url> {
    let mut url = Url::parse(server_url).with_context(|| format!("invalid device url: {server_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("device url cannot be a base: {server_url}"))?
        .pop_if_empty()
        .extend(["skills", invocation.skill.as_str(), "methods", invocation.method.as_str()]);
    Ok(url)
}

pub type EventHandler = Arc<dyn Fn(DeviceId, DeviceEvent) + Send + Sync>;

pub fn ws_url(server_url: &str) -> Result<String> {
    let ws_url = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!("{}/ws", ws_url.trim_end_matches('/')))
}

/// Connects to a device's event stream and feeds every event to `handler`
/// until the stream ends.
pub async fn subscribe_events(
    device: DeviceId,
    server_url: &str,
    handler: EventHandler,
) -> Result<JoinHandle<()>> {
    let ws_url = ws_url(server_url)?;
    let (ws_stream, _) = connect_async(&ws_url)
        .await
        .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
    let (_, mut ws_reader) = ws_stream.split();
    info!(%device, %ws_url, "subscribed to device events");

    Ok(tokio::spawn(async move {
        while let Some(msg) = ws_reader.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<DeviceEvent>(&text) {
                    Ok(event) => handler(device, event),
                    Err(err) => warn!(%device, error = %err, "invalid device event"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(%device, error = %err, "websocket receive failed");
                    break;
                }
            }
        }
        info!(%device, "device event stream ended");
    }))
}

#[cfg(test)]
#[path = "tests/device_tests.rs"]
mod tests;
