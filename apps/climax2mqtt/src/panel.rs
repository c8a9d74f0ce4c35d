use crate::commands::SwitchState;
use crate::config::Config;
use crate::device::Device;
use crate::history::{DeviceHistory, HistoryEnvelope};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value as JsonValue;

const DEVICE_LIST_PATH: &str = "/action/deviceListGet";
const DEVICE_SWITCH_PATH: &str = "/action/deviceSwitchPSSPost";
const HISTORY_PATH: &str = "/action/historyGet";
const BODY_PREVIEW_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("panel request to {endpoint} failed")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("panel returned undecodable {endpoint} response: {body}")]
    Decode {
        endpoint: &'static str,
        body: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("panel rejected switch command (result {result}): {message}")]
    Rejected { result: i64, message: String },
}

#[derive(Debug, Deserialize)]
struct DeviceListEnvelope {
    #[serde(default)]
    senrows: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    result: i64,
    #[serde(default)]
    message: String,
}

/// HTTP client for the panel's `/action` endpoints.
#[derive(Clone)]
pub struct PanelClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl PanelClient {
    pub fn new(config: &Config) -> Result<Self, PanelError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .timeout(config.panel_timeout())
            .default_headers(headers)
            .build()
            .map_err(|source| PanelError::Http {
                endpoint: "client",
                source,
            })?;
        Ok(Self {
            http,
            base_url: config.panel_base_url.trim_end_matches('/').to_string(),
            username: config.panel_username.clone(),
            password: config.panel_password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, PanelError> {
        let http_err = |source| PanelError::Http { endpoint, source };
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;
        let body = response.bytes().await.map_err(http_err)?;
        Ok(body.to_vec())
    }

    /// Fetches every device the panel knows about. Records that fail to
    /// decode are logged and skipped.
    pub async fn fetch_devices(&self) -> Result<Vec<Device>, PanelError> {
        let body = self
            .send("deviceListGet", self.http.get(self.url(DEVICE_LIST_PATH)))
            .await?;
        decode_device_list(&body)
    }

    pub async fn set_device_switch(
        &self,
        panel_id: &str,
        state: SwitchState,
        pd: Option<&str>,
    ) -> Result<String, PanelError> {
        let form = [
            ("id", panel_id),
            ("switch", state.panel_value()),
            ("pd", pd.unwrap_or("")),
        ];
        tracing::debug!(device_id = %panel_id, switch = state.panel_value(), "sending switch command");
        let body = self
            .send(
                "deviceSwitchPSSPost",
                self.http.post(self.url(DEVICE_SWITCH_PATH)).form(&form),
            )
            .await?;
        decode_switch_response(&body)
    }

    pub async fn fetch_history(&self, max_count: u32) -> Result<Vec<DeviceHistory>, PanelError> {
        let max_count = max_count.to_string();
        let form = [("max_count", max_count.as_str())];
        let body = self
            .send("historyGet", self.http.post(self.url(HISTORY_PATH)).form(&form))
            .await?;
        let envelope: HistoryEnvelope =
            serde_json::from_slice(&body).map_err(|source| decode_error("historyGet", &body, source))?;
        Ok(envelope.rows)
    }
}

fn decode_error(endpoint: &'static str, body: &[u8], source: serde_json::Error) -> PanelError {
    let text = String::from_utf8_lossy(body);
    let body = text.chars().take(BODY_PREVIEW_LEN).collect();
    PanelError::Decode {
        endpoint,
        body,
        source,
    }
}

fn decode_device_list(body: &[u8]) -> Result<Vec<Device>, PanelError> {
    let envelope: DeviceListEnvelope = serde_json::from_slice(body)
        .map_err(|source| decode_error("deviceListGet", body, source))?;

    let mut devices = Vec::with_capacity(envelope.senrows.len());
    for (index, record) in envelope.senrows.iter().enumerate() {
        match Device::from_record(record) {
            Ok(device) => devices.push(device),
            Err(err) => {
                tracing::warn!(index, error = %err, record = %record, "skipping panel device record");
            }
        }
    }
    Ok(devices)
}

fn decode_switch_response(body: &[u8]) -> Result<String, PanelError> {
    let response: ApiResponse = serde_json::from_slice(body)
        .map_err(|source| decode_error("deviceSwitchPSSPost", body, source))?;
    if response.result != 1 {
        return Err(PanelError::Rejected {
            result: response.result,
            message: response.message,
        });
    }
    Ok(response.message)
}
