//! Maps UDP command text to sidecar operations and replies

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use shared::{ack, error_reply, Command, CommandLine, MetadataArgs, MetadataKind, TIMESTAMP_KEY};

use crate::health::ReporterState;
use crate::sdk::SidecarApi;

/// What the server loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Send the reply, then stop with exit status 0.
    Exit,
    /// Stop immediately with exit status 1; nothing is sent.
    Crash,
}

/// Result of dispatching one datagram. Replies carry no trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub reply: Option<String>,
    pub control: Control,
}

impl Dispatch {
    fn silent() -> Self {
        Self {
            reply: None,
            control: Control::Continue,
        }
    }

    fn reply(text: String) -> Self {
        Self {
            reply: Some(text),
            control: Control::Continue,
        }
    }
}

pub struct Dispatcher {
    sidecar: Arc<dyn SidecarApi>,
    state: Arc<ReporterState>,
}

impl Dispatcher {
    pub fn new(sidecar: Arc<dyn SidecarApi>, state: Arc<ReporterState>) -> Self {
        Self { sidecar, state }
    }

    pub async fn dispatch(&self, raw: &str) -> Dispatch {
        let line = CommandLine::new(raw);
        let command = match line.parse() {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected command '{}': {}", line.text, e);
                return Dispatch::reply(error_reply(e));
            }
        };

        match command {
            Command::Exit => {
                info!("Shutdown gameserver.");
                if !self.sidecar.shutdown().await {
                    warn!("Sidecar shutdown call failed");
                }
                Dispatch {
                    reply: Some(ack(line.text)),
                    control: Control::Exit,
                }
            }
            Command::Unhealthy => {
                info!("Turns off health pings.");
                self.state.disable_health();
                Dispatch::silent()
            }
            Command::GameServer => {
                let response = self.sidecar.game_server().await;
                match response.payload.as_ref().and_then(|gs| gs.endpoint()) {
                    Some(endpoint) if response.ok => Dispatch::reply(endpoint),
                    _ => {
                        warn!("GameServer status unavailable");
                        Dispatch::reply(error_reply("GameServer status unavailable"))
                    }
                }
            }
            Command::Ready => {
                self.sidecar.ready().await;
                Dispatch::silent()
            }
            Command::Allocate => {
                self.sidecar.allocate().await;
                Dispatch::silent()
            }
            Command::Reserve { seconds } => {
                self.sidecar.reserve(seconds).await;
                Dispatch::silent()
            }
            Command::Watch => {
                self.sidecar.watch_game_server().await;
                Dispatch::silent()
            }
            Command::Metadata(args) => {
                self.set_metadata(args).await;
                Dispatch::silent()
            }
            Command::Crash => {
                info!("Crashing.");
                Dispatch {
                    reply: None,
                    control: Control::Crash,
                }
            }
            Command::Echo => Dispatch::reply(ack(line.text)),
        }
    }

    async fn set_metadata(&self, args: MetadataArgs) {
        let (key, value) = args
            .pair
            .unwrap_or_else(|| (TIMESTAMP_KEY.to_string(), utc_timestamp()));
        match args.kind {
            MetadataKind::Label => self.sidecar.set_label(&key, &value).await,
            MetadataKind::Annotation => self.sidecar.set_annotation(&key, &value).await,
        };
    }
}

fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
