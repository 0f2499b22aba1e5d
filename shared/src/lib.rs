//! Wire types shared by the echo server and its test client.
//!
//! Two protocols meet here: the JSON status document the sidecar serves for
//! the managed game server, and the space-delimited text commands test
//! clients send over UDP.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Default UDP port the echo server listens on.
pub const DEFAULT_PORT: u16 = 7654;
/// Default port of the sidecar's HTTP gateway.
pub const DEFAULT_SDK_HTTP_PORT: u16 = 9358;
/// Receive buffer size that holds any UDP payload whole.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Label/annotation key used when LABEL or ANNOTATION is sent bare.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Snapshot of the managed game server as reported by the sidecar.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GameServer {
    #[serde(default, alias = "objectMeta")]
    pub object_meta: ObjectMeta,
    #[serde(default)]
    pub status: GameServerStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GameServerStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ports: Vec<GameServerPort>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GameServerPort {
    #[serde(default)]
    pub name: String,
    /// Port exposed on the host; this is what clients connect to.
    #[serde(default)]
    pub port: u16,
    #[serde(default, alias = "containerPort", skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
}

impl GameServer {
    /// `address:port` of the first exposed port, if the sidecar reported one.
    pub fn endpoint(&self) -> Option<String> {
        let port = self.status.ports.first()?;
        Some(format!("{}:{}", self.status.address, port.port))
    }
}

/// One event of the sidecar's watch stream.
///
/// The gateway wraps streamed messages as `{"result": ...}`; plain snapshots
/// are accepted as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WatchEvent {
    Wrapped { result: GameServer },
    Bare(GameServer),
}

impl From<WatchEvent> for GameServer {
    fn from(event: WatchEvent) -> Self {
        match event {
            WatchEvent::Wrapped { result } => result,
            WatchEvent::Bare(game_server) => game_server,
        }
    }
}

/// Which metadata map a LABEL/ANNOTATION command writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Label,
    Annotation,
}

impl MetadataKind {
    pub fn verb(self) -> &'static str {
        match self {
            MetadataKind::Label => "LABEL",
            MetadataKind::Annotation => "ANNOTATION",
        }
    }
}

/// Key/value carried by LABEL or ANNOTATION. `None` means the bare form,
/// which stamps the current time under [`TIMESTAMP_KEY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataArgs {
    pub kind: MetadataKind,
    pub pair: Option<(String, String)>,
}

/// A parsed UDP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Unhealthy,
    GameServer,
    Ready,
    Allocate,
    /// Non-integer or missing arguments parse as 0 seconds.
    Reserve { seconds: i32 },
    Watch,
    Metadata(MetadataArgs),
    Crash,
    /// Anything unrecognised is echoed back.
    Echo,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid {} command, must use zero or 2 arguments", .0.verb())]
    MetadataArgCount(MetadataKind),
}

/// A datagram decoded into text, trimmed, with its tokens split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub text: &'a str,
    pub verb: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> CommandLine<'a> {
    /// Trims surrounding whitespace and splits on single spaces, so runs of
    /// spaces yield empty tokens.
    pub fn new(raw: &'a str) -> Self {
        let text = raw.trim();
        let mut tokens = text.split(' ');
        let verb = tokens.next().unwrap_or("");
        CommandLine {
            text,
            verb,
            args: tokens.collect(),
        }
    }

    pub fn parse(&self) -> Result<Command, CommandError> {
        let command = match self.verb {
            "EXIT" => Command::Exit,
            "UNHEALTHY" => Command::Unhealthy,
            "GAMESERVER" => Command::GameServer,
            "READY" => Command::Ready,
            "ALLOCATE" => Command::Allocate,
            "RESERVE" => Command::Reserve {
                seconds: self
                    .args
                    .first()
                    .and_then(|arg| arg.parse().ok())
                    .unwrap_or(0),
            },
            "WATCH" => Command::Watch,
            "LABEL" => Command::Metadata(self.metadata(MetadataKind::Label)?),
            "ANNOTATION" => Command::Metadata(self.metadata(MetadataKind::Annotation)?),
            "CRASH" => Command::Crash,
            _ => Command::Echo,
        };
        Ok(command)
    }

    fn metadata(&self, kind: MetadataKind) -> Result<MetadataArgs, CommandError> {
        match self.args.as_slice() {
            [] => Ok(MetadataArgs { kind, pair: None }),
            [key, value] => Ok(MetadataArgs {
                kind,
                pair: Some((key.to_string(), value.to_string())),
            }),
            _ => Err(CommandError::MetadataArgCount(kind)),
        }
    }
}

/// Reply acknowledging `text`.
pub fn ack(text: &str) -> String {
    format!("ACK: {}", text)
}

/// Reply reporting a protocol error.
pub fn error_reply(message: impl std::fmt::Display) -> String {
    format!("ERROR: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_trims_and_splits() {
        let line = CommandLine::new("  LABEL  key value \n");
        assert_eq!(line.text, "LABEL  key value");
        assert_eq!(line.verb, "LABEL");
        assert_eq!(line.args, vec!["", "key", "value"]);
    }

    #[test]
    fn test_empty_datagram_is_echo() {
        let line = CommandLine::new("");
        assert_eq!(line.verb, "");
        assert_eq!(line.parse(), Ok(Command::Echo));
        assert_eq!(ack(line.text), "ACK: ");
    }

    #[test]
    fn test_verbs_are_case_sensitive() {
        assert_eq!(CommandLine::new("EXIT").parse(), Ok(Command::Exit));
        assert_eq!(CommandLine::new("exit").parse(), Ok(Command::Echo));
        assert_eq!(CommandLine::new("Ready").parse(), Ok(Command::Echo));
    }

    #[test]
    fn test_reserve_parses_tolerantly() {
        let cases = vec![
            ("RESERVE 30", 30),
            ("RESERVE -5", -5),
            ("RESERVE soon", 0),
            ("RESERVE", 0),
            ("RESERVE 10 extra", 10),
            ("RESERVE 99999999999", 0),
            ("RESERVE 2147483647", i32::MAX),
        ];

        for (input, expected) in cases {
            assert_eq!(
                CommandLine::new(input).parse(),
                Ok(Command::Reserve { seconds: expected }),
                "input: {}",
                input
            );
        }
    }

    #[test]
    fn test_metadata_argument_counts() {
        assert_eq!(
            CommandLine::new("LABEL").parse(),
            Ok(Command::Metadata(MetadataArgs {
                kind: MetadataKind::Label,
                pair: None,
            }))
        );
        assert_eq!(
            CommandLine::new("ANNOTATION color blue").parse(),
            Ok(Command::Metadata(MetadataArgs {
                kind: MetadataKind::Annotation,
                pair: Some(("color".to_string(), "blue".to_string())),
            }))
        );
        assert_eq!(
            CommandLine::new("LABEL foo").parse(),
            Err(CommandError::MetadataArgCount(MetadataKind::Label))
        );
        assert_eq!(
            CommandLine::new("ANNOTATION a b c").parse(),
            Err(CommandError::MetadataArgCount(MetadataKind::Annotation))
        );
    }

    #[test]
    fn test_metadata_error_text() {
        let err = CommandError::MetadataArgCount(MetadataKind::Label);
        assert_eq!(
            error_reply(err),
            "ERROR: Invalid LABEL command, must use zero or 2 arguments"
        );
        let err = CommandError::MetadataArgCount(MetadataKind::Annotation);
        assert_eq!(
            error_reply(err),
            "ERROR: Invalid ANNOTATION command, must use zero or 2 arguments"
        );
    }

    #[test]
    fn test_game_server_deserializes_gateway_json() {
        let json = r#"{
            "object_meta": {
                "name": "simple-udp-x7k2",
                "namespace": "default",
                "labels": {"mode": "test"},
                "annotations": {}
            },
            "status": {
                "state": "Ready",
                "address": "10.0.0.5",
                "ports": [{"name": "default", "port": 7777, "containerPort": 7654}]
            }
        }"#;

        let game_server: GameServer = serde_json::from_str(json).unwrap();
        assert_eq!(game_server.object_meta.name, "simple-udp-x7k2");
        assert_eq!(game_server.object_meta.labels["mode"], "test");
        assert_eq!(game_server.status.state, "Ready");
        assert_eq!(game_server.status.ports[0].container_port, Some(7654));
        assert_eq!(game_server.endpoint().as_deref(), Some("10.0.0.5:7777"));
    }

    #[test]
    fn test_endpoint_requires_a_port() {
        let mut game_server = GameServer::default();
        game_server.status.address = "10.0.0.5".to_string();
        assert_eq!(game_server.endpoint(), None);
    }

    #[test]
    fn test_watch_event_accepts_both_shapes() {
        let wrapped = r#"{"result": {"status": {"address": "1.2.3.4", "ports": [{"port": 1}]}}}"#;
        let bare = r#"{"status": {"address": "1.2.3.4", "ports": [{"port": 1}]}}"#;

        for json in [wrapped, bare] {
            let event: WatchEvent = serde_json::from_str(json).unwrap();
            let game_server = GameServer::from(event);
            assert_eq!(game_server.endpoint().as_deref(), Some("1.2.3.4:1"));
        }
    }
}
