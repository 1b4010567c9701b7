//! OBS Studio WebSocket (protocol v5) session.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use fillercast_common::config::ControllerConfig;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::controller::{Connector, Controller, ControllerError};

const OP_HELLO: u8 = 0;
const OP_IDENTIFY: u8 = 1;
const OP_IDENTIFIED: u8 = 2;
const OP_REQUEST: u8 = 6;
const OP_REQUEST_RESPONSE: u8 = 7;

const RPC_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct Frame {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hello {
    #[serde(default)]
    obs_web_socket_version: Option<String>,
    rpc_version: u32,
    #[serde(default)]
    authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    challenge: String,
    salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestResponse {
    request_id: String,
    request_status: RequestStatus,
    #[serde(default)]
    response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    result: bool,
    code: i64,
    #[serde(default)]
    comment: Option<String>,
}

/// One entry of a media-source playlist.
#[derive(Debug, Serialize, PartialEq)]
pub struct PlaylistItem<'a> {
    pub hidden: bool,
    pub selected: bool,
    pub value: &'a str,
}

pub fn playlist_settings(paths: &[String]) -> Value {
    let items: Vec<PlaylistItem<'_>> = paths
        .iter()
        .map(|p| PlaylistItem { hidden: false, selected: false, value: p })
        .collect();
    json!({ "playlist": items })
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ObsClient {
    ws: WsStream,
    timeout: Duration,
    next_request_id: u64,
}

impl ObsClient {
    pub async fn connect(config: &ControllerConfig) -> Result<Self, ControllerError> {
        let url = format!("ws://{}:{}", config.host, config.port);
        debug!("[OBS] Connecting to {}", url);

        let (ws, _) = timeout(config.timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ControllerError::Timeout("connect"))??;

        let mut client = Self {
            ws,
            timeout: config.timeout,
            next_request_id: 0,
        };
        timeout(config.timeout, client.identify(config.password.as_deref()))
            .await
            .map_err(|_| ControllerError::Timeout("identify"))??;
        Ok(client)
    }

    async fn identify(&mut self, password: Option<&str>) -> Result<(), ControllerError> {
        let frame = self.recv_frame().await?;
        if frame.op != OP_HELLO {
            return Err(ControllerError::Protocol(format!("expected Hello, got op {}", frame.op)));
        }
        let hello: Hello = serde_json::from_value(frame.d)
            .map_err(|e| ControllerError::Protocol(format!("malformed Hello: {e}")))?;

        let mut identify = json!({
            "rpcVersion": RPC_VERSION,
            "eventSubscriptions": 0,
        });
        match (&hello.authentication, password) {
            (Some(auth), Some(password)) => {
                identify["authentication"] = Value::String(auth_response(password, &auth.salt, &auth.challenge));
            }
            (Some(_), None) => {
                return Err(ControllerError::Auth("controller requires a password".to_string()));
            }
            (None, _) => {}
        }
        self.send_frame(OP_IDENTIFY, identify).await?;

        let frame = self.recv_frame().await?;
        if frame.op != OP_IDENTIFIED {
            return Err(ControllerError::Protocol(format!("expected Identified, got op {}", frame.op)));
        }

        info!(
            "[OBS] Identified with obs-websocket {} (rpc {})",
            hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            hello.rpc_version
        );
        Ok(())
    }

    async fn send_frame(&mut self, op: u8, d: Value) -> Result<(), ControllerError> {
        let text = json!({ "op": op, "d": d }).to_string();
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Frame, ControllerError> {
        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| ControllerError::Protocol(format!("malformed frame: {e}")));
                }
                Message::Close(_) => return Err(ControllerError::Closed),
                _ => continue,
            }
        }
        Err(ControllerError::Closed)
    }

    async fn request(&mut self, request_type: &'static str, data: Option<Value>) -> Result<Value, ControllerError> {
        let limit = self.timeout;
        timeout(limit, self.exchange(request_type, data))
            .await
            .map_err(|_| ControllerError::Timeout(request_type))?
    }

    async fn exchange(&mut self, request_type: &'static str, data: Option<Value>) -> Result<Value, ControllerError> {
        self.next_request_id += 1;
        let request_id = self.next_request_id.to_string();

        let mut d = json!({
            "requestType": request_type,
            "requestId": request_id,
        });
        if let Some(data) = data {
            d["requestData"] = data;
        }
        self.send_frame(OP_REQUEST, d).await?;

        loop {
            let frame = self.recv_frame().await?;
            if frame.op != OP_REQUEST_RESPONSE {
                continue;
            }
            let response: RequestResponse = serde_json::from_value(frame.d)
                .map_err(|e| ControllerError::Protocol(format!("malformed RequestResponse: {e}")))?;
            if response.request_id != request_id {
                debug!("[OBS] Ignoring stale response {}", response.request_id);
                continue;
            }
            if !response.request_status.result {
                return Err(ControllerError::Rejected {
                    request: request_type.to_string(),
                    code: response.request_status.code,
                    comment: response.request_status.comment.unwrap_or_default(),
                });
            }
            return Ok(response.response_data.unwrap_or(Value::Null));
        }
    }
}

#[async_trait]
impl Controller for ObsClient {
    async fn active_scene(&mut self) -> Result<String, ControllerError> {
        let data = self.request("GetCurrentProgramScene", None).await?;
        data.get("currentProgramSceneName")
            .or_else(|| data.get("sceneName"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ControllerError::Protocol("GetCurrentProgramScene returned no scene name".to_string()))
    }

    async fn set_active_scene(&mut self, scene: &str) -> Result<(), ControllerError> {
        self.request("SetCurrentProgramScene", Some(json!({ "sceneName": scene })))
            .await
            .map(|_| ())
    }

    async fn set_input_playlist(&mut self, input: &str, paths: &[String]) -> Result<(), ControllerError> {
        self.request(
            "SetInputSettings",
            Some(json!({
                "inputName": input,
                "inputSettings": playlist_settings(paths),
                "overlay": true,
            })),
        )
        .await
        .map(|_| ())
    }
}

pub struct ObsConnector {
    config: ControllerConfig,
}

impl ObsConnector {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for ObsConnector {
    async fn connect(&self) -> Result<Box<dyn Controller>, ControllerError> {
        let client = ObsClient::connect(&self.config).await?;
        Ok(Box::new(client))
    }
}
