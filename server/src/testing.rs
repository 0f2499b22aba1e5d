//! In-memory sidecar used by unit tests

use std::sync::Mutex;

use async_trait::async_trait;
use shared::GameServer;

use crate::sdk::{SidecarApi, SidecarResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub args: Vec<String>,
}

/// Records every call and answers with a fixed outcome.
#[derive(Debug)]
pub struct RecordingSidecar {
    ok: bool,
    game_server: Option<GameServer>,
    calls: Mutex<Vec<Call>>,
}

impl Default for RecordingSidecar {
    fn default() -> Self {
        Self {
            ok: true,
            game_server: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingSidecar {
    pub fn failing() -> Self {
        Self {
            ok: false,
            ..Self::default()
        }
    }

    pub fn with_game_server(game_server: GameServer) -> Self {
        Self {
            game_server: Some(game_server),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    fn record(&self, operation: &'static str, args: &[&str]) -> bool {
        self.calls.lock().unwrap().push(Call {
            operation,
            args: args.iter().map(|arg| arg.to_string()).collect(),
        });
        self.ok
    }

    fn snapshot(&self, operation: &'static str) -> SidecarResponse<GameServer> {
        if self.record(operation, &[]) {
            SidecarResponse::success(self.game_server.clone())
        } else {
            SidecarResponse::failure()
        }
    }
}

#[async_trait]
impl SidecarApi for RecordingSidecar {
    async fn ready(&self) -> bool {
        self.record("ready", &[])
    }

    async fn allocate(&self) -> bool {
        self.record("allocate", &[])
    }

    async fn shutdown(&self) -> bool {
        self.record("shutdown", &[])
    }

    async fn health(&self) -> bool {
        self.record("health", &[])
    }

    async fn game_server(&self) -> SidecarResponse<GameServer> {
        self.snapshot("gameserver")
    }

    async fn watch_game_server(&self) -> SidecarResponse<GameServer> {
        self.snapshot("watch")
    }

    async fn reserve(&self, seconds: i32) -> bool {
        self.record("reserve", &[&seconds.to_string()])
    }

    async fn set_label(&self, key: &str, value: &str) -> bool {
        self.record("label", &[key, value])
    }

    async fn set_annotation(&self, key: &str, value: &str) -> bool {
        self.record("annotation", &[key, value])
    }
}
