//! Socket.IO message channel over a WebSocket
//!
//! Speaks the Engine.IO v4 / Socket.IO v5 text protocol on the default
//! namespace. The socket runs on a dedicated I/O thread with a short read
//! timeout so it can interleave reads with queued outbound events.
//!
//! **Packet framing** (first character Engine.IO type, second Socket.IO type):
//! - `0{...}` open, `2` ping, `3` pong, `1` close
//! - `40` connect request / `40{...}` connect ack, `44{...}` connect error
//! - `42["event", payload]` event, `41` disconnect

use crate::error::{Error, Result};
use crate::session::channel::{ChannelConnector, ChannelLink, InboundEvent, OutboundEvent, TransportHalf};
use ambi_common::StreamFormat;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use tungstenite::{Message, WebSocket};
use url::Url;

/// Read timeout while pumping; bounds outbound latency
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decoded protocol packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Connect,
    ConnectError(String),
    Disconnect,
    Event { name: String, payload: Value },
    Noop,
}

/// Decode one text frame
pub fn decode_packet(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let engine = chars
        .next()
        .ok_or_else(|| Error::Protocol("Empty packet".to_string()))?;
    let rest = chars.as_str();

    match engine {
        '0' => Ok(Packet::Open(parse_json_or_null(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => decode_message(rest),
        other => Err(Error::Protocol(format!("Unknown packet type '{}'", other))),
    }
}

fn decode_message(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::Protocol("Empty message packet".to_string()))?;
    let body = strip_namespace_and_ack(chars.as_str());

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '4' => {
            let detail = parse_json_or_null(body)?;
            let message = detail
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| detail.to_string());
            Ok(Packet::ConnectError(message))
        }
        '2' => {
            let args: Vec<Value> = serde_json::from_str(body)
                .map_err(|e| Error::Protocol(format!("Bad event payload: {}", e)))?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(Error::Protocol("Event without a name".to_string())),
            };
            Ok(Packet::Event {
                name,
                payload: args.next().unwrap_or(Value::Null),
            })
        }
        other => Err(Error::Protocol(format!("Unsupported message type '{}'", other))),
    }
}

/// Drop a leading `/namespace,` and a numeric ack id
fn strip_namespace_and_ack(body: &str) -> &str {
    let body = match body.strip_prefix('/') {
        Some(after) => after.split_once(',').map_or("", |(_, rest)| rest),
        None => body,
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_json_or_null(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| Error::Protocol(format!("Bad JSON: {}", e)))
}

/// Encode an outbound event frame
pub fn encode_event(event: &OutboundEvent) -> String {
    let (name, session_id) = match event {
        OutboundEvent::Join { session_id } => ("join_session", session_id),
        OutboundEvent::Leave { session_id } => ("leave_session", session_id),
    };
    format!("42{}", json!([name, { "session_id": session_id }]))
}

/// Map a server event onto the channel vocabulary; `None` for events the
/// player does not consume
pub fn map_event(name: &str, payload: &Value) -> Option<InboundEvent> {
    match name {
        "session_joined" => {
            let format = serde_json::from_value::<StreamFormat>(payload.clone()).unwrap_or_default();
            Some(InboundEvent::Joined(format))
        }
        "audio_chunk" => Some(match payload.get("data").and_then(Value::as_str) {
            Some(data) => match BASE64.decode(data) {
                Ok(bytes) => InboundEvent::AudioChunk(bytes),
                Err(e) => InboundEvent::MalformedChunk(format!("Invalid base64: {}", e)),
            },
            None => InboundEvent::MalformedChunk("Missing data field".to_string()),
        }),
        "status" => payload
            .get("is_playing")
            .and_then(Value::as_bool)
            .map(|is_playing| InboundEvent::Status { is_playing }),
        "session_stopped" => Some(InboundEvent::Stopped),
        "error" => {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown server error");
            Some(InboundEvent::Error(message.to_string()))
        }
        _ => None,
    }
}

/// Build the Engine.IO WebSocket endpoint from the server base URL
pub fn socket_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        other => {
            return Err(Error::Config(format!(
                "Unsupported channel scheme '{}' (expected http or ws)",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("Cannot use {} as a channel URL", server_url)))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Opens Socket.IO channels to the music server
pub struct SocketIoConnector {
    url: Url,
    handshake_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(server_url: &str, handshake_timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: socket_url(server_url)?,
            handshake_timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ChannelConnector for SocketIoConnector {
    async fn connect(&self) -> Result<ChannelLink> {
        let (link, transport) = ChannelLink::pair();
        let (ready_tx, ready_rx) = oneshot::channel();
        let url = self.url.clone();
        let timeout = self.handshake_timeout;

        std::thread::Builder::new()
            .name("ambi-channel".to_string())
            .spawn(move || run_connection(url, timeout, transport, ready_tx))
            .map_err(|e| Error::Transport(format!("Failed to spawn channel thread: {}", e)))?;

        ready_rx
            .await
            .map_err(|_| Error::Transport("Channel thread exited during connect".to_string()))??;
        Ok(link)
    }
}

type Socket = WebSocket<TcpStream>;

fn run_connection(
    url: Url,
    timeout: Duration,
    transport: TransportHalf,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut socket = match open_socket(&url, timeout).and_then(|mut s| handshake(&mut s).map(|_| s)) {
        Ok(socket) => socket,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = socket.get_mut().set_read_timeout(Some(POLL_INTERVAL)) {
        let _ = ready.send(Err(Error::Transport(format!("Socket setup failed: {}", e))));
        return;
    }

    if ready.send(Ok(())).is_err() {
        // Caller gave up waiting
        let _ = socket.close(None);
        return;
    }

    info!("Message channel connected to {}", url);
    pump(&mut socket, transport);
    let _ = socket.close(None);
    let _ = socket.flush();
    debug!("Message channel thread exiting");
}

fn open_socket(url: &Url, timeout: Duration) -> Result<Socket> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("No host in {}", url)))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Transport(format!("Failed to resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| Error::Transport(format!("No address for {}", host)))?;

    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| Error::Transport(format!("Connect to {} failed: {}", addr, e)))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;

    let (socket, _response) = tungstenite::client::client(url.as_str(), stream)
        .map_err(|e| Error::Transport(format!("WebSocket handshake failed: {}", e)))?;
    Ok(socket)
}

/// Blocking read of the next text frame, mapping the read timeout
fn read_text(socket: &mut Socket) -> Result<String> {
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => return Ok(text.as_str().to_string()),
            Ok(Message::Close(_)) => {
                return Err(Error::Transport("Server closed the channel".to_string()))
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => {
                return Err(Error::Timeout("Socket.IO handshake".to_string()))
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn handshake(socket: &mut Socket) -> Result<()> {
    loop {
        match decode_packet(&read_text(socket)?)? {
            Packet::Open(info) => {
                trace!("Engine.IO open: {}", info);
                break;
            }
            Packet::Ping => socket.send(Message::text("3"))?,
            other => {
                return Err(Error::Protocol(format!(
                    "Expected open packet, got {:?}",
                    other
                )))
            }
        }
    }

    socket.send(Message::text("40"))?;

    loop {
        match decode_packet(&read_text(socket)?)? {
            Packet::Connect => return Ok(()),
            Packet::ConnectError(message) => {
                return Err(Error::Protocol(format!("Namespace connect refused: {}", message)))
            }
            Packet::Ping => socket.send(Message::text("3"))?,
            Packet::Close | Packet::Disconnect => {
                return Err(Error::Transport("Server closed during handshake".to_string()))
            }
            _ => continue,
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn pump(socket: &mut Socket, mut transport: TransportHalf) {
    loop {
        if transport.inbound.is_closed() {
            return;
        }

        loop {
            match transport.outbound.try_recv() {
                Ok(event) => {
                    debug!("Channel send: {:?}", event);
                    if let Err(e) = socket.send(Message::text(encode_event(&event))) {
                        warn!("Channel send failed: {}", e);
                        let _ = transport.inbound.blocking_send(InboundEvent::Error(e.to_string()));
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        let text = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Server closed the message channel");
                return;
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e)) if is_timeout(e) => continue,
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return
            }
            Err(e) => {
                warn!("Channel read failed: {}", e);
                return;
            }
        };

        let packet = match decode_packet(text.as_str()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Ignoring undecodable packet: {}", e);
                continue;
            }
        };

        let inbound = match packet {
            Packet::Ping => {
                if let Err(e) = socket.send(Message::text("3")) {
                    warn!("Pong failed: {}", e);
                    return;
                }
                continue;
            }
            Packet::Event { name, payload } => match map_event(&name, &payload) {
                Some(event) => event,
                None => {
                    trace!("Ignoring event '{}'", name);
                    continue;
                }
            },
            Packet::Close | Packet::Disconnect => {
                info!("Server disconnected the channel");
                return;
            }
            _ => continue,
        };

        if transport.inbound.blocking_send(inbound).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_engine_packets() {
        assert_eq!(decode_packet("2").unwrap(), Packet::Ping);
        assert_eq!(decode_packet("3").unwrap(), Packet::Pong);
        assert_eq!(decode_packet("1").unwrap(), Packet::Close);
        match decode_packet(r#"0{"sid":"abc","pingInterval":25000}"#).unwrap() {
            Packet::Open(info) => assert_eq!(info["sid"], "abc"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(decode_packet("").is_err());
        assert!(decode_packet("9").is_err());
    }

    #[test]
    fn test_decode_socket_packets() {
        assert_eq!(decode_packet("40").unwrap(), Packet::Connect);
        assert_eq!(decode_packet(r#"40{"sid":"xyz"}"#).unwrap(), Packet::Connect);
        assert_eq!(decode_packet("41").unwrap(), Packet::Disconnect);
        assert_eq!(
            decode_packet(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError("Not authorized".to_string())
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = decode_packet(r#"42/music,17["status",{"is_playing":true}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "status".to_string(),
                payload: json!({"is_playing": true})
            }
        );
    }

    #[test]
    fn test_decode_event_without_payload() {
        let packet = decode_packet(r#"42["session_stopped"]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "session_stopped".to_string(),
                payload: Value::Null
            }
        );
        assert!(decode_packet(r#"42[17]"#).is_err());
        assert!(decode_packet(r#"42not json"#).is_err());
    }

    #[test]
    fn test_encode_join_and_leave() {
        let join = encode_event(&OutboundEvent::Join {
            session_id: "s-1".to_string(),
        });
        assert_eq!(join, r#"42["join_session",{"session_id":"s-1"}]"#);

        let leave = encode_event(&OutboundEvent::Leave {
            session_id: "s-1".to_string(),
        });
        assert!(leave.starts_with(r#"42["leave_session""#));
    }

    #[test]
    fn test_map_audio_chunk() {
        let encoded = BASE64.encode([1u8, 2, 3, 4]);
        let event = map_event("audio_chunk", &json!({ "data": encoded }));
        assert_eq!(event, Some(InboundEvent::AudioChunk(vec![1, 2, 3, 4])));

        let bad = map_event("audio_chunk", &json!({ "data": "%%%" }));
        assert!(matches!(bad, Some(InboundEvent::MalformedChunk(_))));

        let missing = map_event("audio_chunk", &json!({}));
        assert!(matches!(missing, Some(InboundEvent::MalformedChunk(_))));
    }

    #[test]
    fn test_map_session_events() {
        let joined = map_event(
            "session_joined",
            &json!({"session_id": "s", "is_playing": true, "sample_rate": 44100, "channels": 2, "format": "pcm16"}),
        );
        match joined {
            Some(InboundEvent::Joined(format)) => assert_eq!(format.sample_rate, 44_100),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            map_event("status", &json!({"is_playing": false})),
            Some(InboundEvent::Status { is_playing: false })
        );
        assert_eq!(
            map_event("session_stopped", &json!({"session_id": "s"})),
            Some(InboundEvent::Stopped)
        );
        assert_eq!(
            map_event("error", &json!({"message": "Session not found"})),
            Some(InboundEvent::Error("Session not found".to_string()))
        );
        assert_eq!(map_event("metrics", &json!({})), None);
    }

    #[test]
    fn test_socket_url() {
        let url = socket_url("http://localhost:8000").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
        assert!(socket_url("https://secure.example").is_err());
        assert!(socket_url("localhost").is_err());
    }
}
