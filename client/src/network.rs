use log::debug;
use shared::MAX_DATAGRAM_SIZE;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Sends text commands to the echo server and waits briefly for a reply.
pub struct CommandClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    reply_timeout: Duration,
}

impl CommandClient {
    pub async fn new(
        server_addr: &str,
        reply_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let bind_addr = if server_addr.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(CommandClient {
            socket,
            server_addr,
            reply_timeout,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Sends one command. Returns the reply without its trailing newline, or
    /// `None` if nothing arrived within the reply timeout; several commands
    /// never reply.
    pub async fn send(&self, command: &str) -> std::io::Result<Option<String>> {
        self.socket.send_to(command.as_bytes(), self.server_addr).await?;
        debug!("Sent {:?} to {}", command, self.server_addr);

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let received =
                match tokio::time::timeout(self.reply_timeout, self.socket.recv_from(&mut buf))
                    .await
                {
                    Ok(received) => received?,
                    Err(_) => return Ok(None),
                };

            let (len, addr) = received;
            if addr != self.server_addr {
                debug!("Ignoring datagram from {}", addr);
                continue;
            }

            let reply = String::from_utf8_lossy(&buf[..len]);
            return Ok(Some(reply.trim_end_matches(['\r', '\n']).to_string()));
        }
    }
}
