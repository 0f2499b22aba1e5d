//! UDP command server: receives one command per datagram and replies to the sender

use crate::commands::{Control, Dispatcher};
use crate::error::ServerError;
use crate::sdk::SidecarApi;
use log::{debug, error, info};
use shared::MAX_DATAGRAM_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// How the server loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExit {
    /// EXIT was received.
    Done,
    /// CRASH was received.
    Crashed,
}

impl ServerExit {
    /// Process exit status for this outcome.
    pub fn code(self) -> i32 {
        match self {
            ServerExit::Done => 0,
            ServerExit::Crashed => 1,
        }
    }
}

pub struct Server {
    socket: UdpSocket,
    sidecar: Arc<dyn SidecarApi>,
    dispatcher: Dispatcher,
}

impl Server {
    pub async fn bind(
        addr: &str,
        sidecar: Arc<dyn SidecarApi>,
        dispatcher: Dispatcher,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Starting UDP server, listening on {}", socket.local_addr()?);

        Ok(Server {
            socket,
            sidecar,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Marks the game server ready, then processes datagrams one at a time
    /// until EXIT, CRASH or cancellation. On cancellation the socket is closed
    /// before `ServerError::Cancelled` is returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<ServerExit, ServerError> {
        info!("Marking this server as ready");
        if !self.sidecar.ready().await {
            error!("Sidecar did not accept ready");
        }

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => None,
                received = self.socket.recv_from(&mut buffer) => Some(received),
            };
            let Some(received) = received else {
                info!("Server cancelled, closing socket");
                drop(self.socket);
                return Err(ServerError::Cancelled);
            };

            let (len, addr) = match received {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let text = String::from_utf8_lossy(&buffer[..len]);
            debug!("Received {:?} from {}", text, addr);

            let dispatch = self.dispatcher.dispatch(&text).await;

            if let Some(reply) = dispatch.reply {
                if let Err(e) = self.send_reply(&reply, addr).await {
                    error!("Failed to send reply to {}: {}", addr, e);
                }
            }

            match dispatch.control {
                Control::Continue => {}
                Control::Exit => {
                    info!("Server exiting");
                    return Ok(ServerExit::Done);
                }
                Control::Crash => {
                    error!("Force crash by client request from {}", addr);
                    return Ok(ServerExit::Crashed);
                }
            }
        }
    }

    async fn send_reply(&self, reply: &str, addr: SocketAddr) -> Result<(), ServerError> {
        let message = format!("{}\n", reply);
        self.socket.send_to(message.as_bytes(), addr).await?;
        Ok(())
    }
}
