use async_trait::async_trait;
use thiserror::Error;

/// Any failure talking to the scene controller. The scheduler treats every
/// variant the same way: the session is dropped and re-established.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed by controller")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("{request} rejected (code {code}): {comment}")]
    Rejected {
        request: String,
        code: i64,
        comment: String,
    },
}

/// The three operations the scheduler needs from a live controller session.
#[async_trait]
pub trait Controller: Send {
    async fn active_scene(&mut self) -> Result<String, ControllerError>;

    async fn set_active_scene(&mut self, scene: &str) -> Result<(), ControllerError>;

    /// Replaces the playlist of `input` with `paths`, in order.
    async fn set_input_playlist(&mut self, input: &str, paths: &[String]) -> Result<(), ControllerError>;
}

/// Opens controller sessions for the supervisor.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Controller>, ControllerError>;
}
