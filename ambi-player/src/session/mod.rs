//! Session layer
//!
//! Control-plane client, message channel, and the state machine that ties a
//! remote session to local playback.

pub mod channel;
pub mod control;
pub mod machine;
pub mod player;
pub mod socketio;
pub mod state;

pub use channel::{ChannelConnector, ChannelLink, InboundEvent, OutboundEvent, TransportHalf};
pub use control::{ControlOutcome, ControlPlane, HttpControlClient, RemoteStatus, StartedSession};
pub use machine::SessionSettings;
pub use player::Player;
pub use socketio::SocketIoConnector;
pub use state::{Book, PlayerSnapshot, Prompt, Session};
