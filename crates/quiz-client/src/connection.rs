//! Connection manager: one supervised transport connection.
//!
//! A [`Connection`] is a thin handle talking to a background supervisor
//! task over channels. The supervisor owns the socket for its whole
//! life: it dials via a [`Connector`], pumps frames while the link is
//! up, sends the application heartbeat, and on an unexpected drop
//! redials with exponential backoff up to a fixed attempt cap. Frames
//! are parsed exactly once, here, and delivered in arrival order.
//!
//! Only this module writes to the transport; every outbound send from
//! any consumer funnels through the handle's command channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use quiz_core::protocol::{ClientMessage, ServerMessage};
use quiz_core::session::ConnectionStatus;

use crate::transport::{Connector, Transport, TransportReader, TransportWriter};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Maximum number of automatic reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay between reconnection attempts (doubles each attempt).
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the reconnection delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Application heartbeat period while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Reconnection and heartbeat tunables. The defaults are the production
/// values; tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff before the `attempt`-th reconnection attempt (1-based):
    /// `min(base × 2^(attempt−1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// Outcome of parsing one inbound text frame.
#[derive(Debug)]
pub enum InboundFrame {
    /// A recognised message, deserialized.
    Message(ServerMessage),
    /// Well-formed envelope with a `type` we don't know — ignored for
    /// forward compatibility.
    UnknownType { tag: String, raw: String },
    /// Not a valid envelope at all.
    Malformed(String),
    /// Blank frame — skip it.
    Empty,
}

/// Parse a raw frame into an [`InboundFrame`]. Never fails: malformed
/// input is reported, not propagated, so a bad frame can never take the
/// connection down.
pub fn parse_frame(text: &str) -> InboundFrame {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return InboundFrame::Empty;
    }
    match serde_json::from_str::<ServerMessage>(trimmed) {
        Ok(msg) => InboundFrame::Message(msg),
        Err(_) => {
            // Distinguish "envelope from a newer server" from garbage.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
                && let Some(tag) = value.get("type").and_then(|t| t.as_str())
            {
                return InboundFrame::UnknownType {
                    tag: tag.to_string(),
                    raw: trimmed.to_string(),
                };
            }
            InboundFrame::Malformed(trimmed.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Handle <-> supervisor channel protocol
// ---------------------------------------------------------------------------

/// Commands the handle sends to the supervisor.
#[derive(Debug)]
enum ConnCommand {
    Send(ClientMessage),
    Reconnect,
    Close,
}

/// Events the supervisor delivers to the consumer.
#[derive(Debug)]
pub enum ConnEvent {
    /// Connectivity changed.
    Status(ConnectionStatus),
    /// A parsed server message, in arrival order. Heartbeat replies are
    /// consumed here and never delivered.
    Message(ServerMessage),
    /// A malformed frame was dropped (non-fatal).
    ProtocolError(String),
    /// An outbound message could not be written (transport not open or
    /// the write failed). The message is returned for the caller's
    /// retry policy.
    SendFailed(ClientMessage),
}

// ---------------------------------------------------------------------------
// Connection handle
// ---------------------------------------------------------------------------

/// Handle to one supervised server connection.
///
/// Exactly one of these exists per game view; the session facade owns
/// it and fans its state out to consumers. Dropping the handle (or
/// calling [`close`](Connection::close)) shuts the supervisor down
/// without any further reconnection.
pub struct Connection {
    /// Events from the supervisor. Channel close = supervisor gone.
    pub events: mpsc::UnboundedReceiver<ConnEvent>,
    commands: mpsc::UnboundedSender<ConnCommand>,
}

impl Connection {
    /// Open a connection through `connector`, spawning the background
    /// supervisor.
    pub fn open_with<C: Connector>(connector: C, policy: ReconnectPolicy) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_supervisor(connector, policy, cmd_rx, event_tx));
        Self { events: event_rx, commands: cmd_tx }
    }

    /// Enqueue a message for transmission. Non-blocking: if the
    /// transport is not open the supervisor answers with
    /// [`ConnEvent::SendFailed`] instead of writing.
    pub fn send(&self, msg: ClientMessage) {
        let _ = self.commands.send(ConnCommand::Send(msg));
    }

    /// Ask for a reconnect. A no-op while connected or connecting;
    /// from the terminal failed state it restarts the cycle with a
    /// fresh attempt counter.
    pub fn reconnect(&self) {
        let _ = self.commands.send(ConnCommand::Reconnect);
    }

    /// Clean, non-retrying shutdown. The supervisor emits a final
    /// `Disconnected` status and exits.
    pub fn close(&self) {
        let _ = self.commands.send(ConnCommand::Close);
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Why the connected pump stopped.
enum PumpExit {
    /// Explicit close (or the handle went away): stop for good.
    Closed,
    /// The transport dropped out from under us: schedule a reconnect.
    Dropped,
}

async fn run_supervisor<C: Connector>(
    mut connector: C,
    policy: ReconnectPolicy,
    mut commands: mpsc::UnboundedReceiver<ConnCommand>,
    events: mpsc::UnboundedSender<ConnEvent>,
) {
    // Consecutive failed attempts since the last successful open.
    let mut attempt: u32 = 0;
    let _ = events.send(ConnEvent::Status(ConnectionStatus::Connecting));

    loop {
        match connector.connect().await {
            Ok(transport) => {
                debug!("transport open");
                attempt = 0;
                let _ = events.send(ConnEvent::Status(ConnectionStatus::Connected));

                match pump(transport, policy.heartbeat_interval, &mut commands, &events).await {
                    PumpExit::Closed => {
                        let _ = events.send(ConnEvent::Status(ConnectionStatus::Disconnected));
                        return;
                    }
                    PumpExit::Dropped => {
                        warn!("connection dropped");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
            }
        }

        attempt += 1;
        if attempt > policy.max_attempts {
            warn!(attempts = policy.max_attempts, "reconnect attempts exhausted");
            let _ = events.send(ConnEvent::Status(ConnectionStatus::Failed));
            // Terminal until the user explicitly retries or tears down.
            loop {
                match commands.recv().await {
                    Some(ConnCommand::Reconnect) => {
                        attempt = 0;
                        let _ = events.send(ConnEvent::Status(ConnectionStatus::Connecting));
                        break;
                    }
                    Some(ConnCommand::Send(msg)) => {
                        let _ = events.send(ConnEvent::SendFailed(msg));
                    }
                    Some(ConnCommand::Close) | None => {
                        let _ = events.send(ConnEvent::Status(ConnectionStatus::Disconnected));
                        return;
                    }
                }
            }
            continue;
        }

        // The link is already down: say so before waiting, not after,
        // so consumers never sit on a stale Connected status through
        // the backoff window.
        let _ = events.send(ConnEvent::Status(ConnectionStatus::Reconnecting { attempt }));

        // Backoff before the next attempt, staying responsive to the
        // handle: queued sends fail fast, close cancels the wait.
        let delay = policy.delay_for(attempt);
        debug!(attempt, ?delay, "reconnect scheduled");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = commands.recv() => match cmd {
                    Some(ConnCommand::Send(msg)) => {
                        let _ = events.send(ConnEvent::SendFailed(msg));
                    }
                    // An explicit retry skips the remaining wait.
                    Some(ConnCommand::Reconnect) => break,
                    Some(ConnCommand::Close) | None => {
                        let _ = events.send(ConnEvent::Status(ConnectionStatus::Disconnected));
                        return;
                    }
                },
            }
        }
    }
}

/// Drive one open transport until it closes or drops.
async fn pump<T: Transport>(
    transport: T,
    heartbeat_interval: Duration,
    commands: &mut mpsc::UnboundedReceiver<ConnCommand>,
    events: &mpsc::UnboundedSender<ConnEvent>,
) -> PumpExit {
    let (mut reader, mut writer) = transport.split();

    // First heartbeat one full period after open.
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = reader.recv() => match frame {
                Ok(Some(text)) => match parse_frame(&text) {
                    InboundFrame::Message(ServerMessage::Pong) => {
                        // Liveness only; nothing tracks round trips.
                        trace!("heartbeat reply");
                    }
                    InboundFrame::Message(msg) => {
                        if events.send(ConnEvent::Message(msg)).is_err() {
                            return PumpExit::Closed;
                        }
                    }
                    InboundFrame::UnknownType { tag, .. } => {
                        warn!(%tag, "ignoring unknown message type");
                    }
                    InboundFrame::Malformed(raw) => {
                        warn!(frame = %raw, "dropping malformed frame");
                        let _ = events.send(ConnEvent::ProtocolError(raw));
                    }
                    InboundFrame::Empty => {}
                },
                Ok(None) => return PumpExit::Dropped,
                Err(e) => {
                    warn!(error = %e, "transport error");
                    return PumpExit::Dropped;
                }
            },

            cmd = commands.recv() => match cmd {
                Some(ConnCommand::Send(msg)) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(_) => continue,
                    };
                    if writer.send(&json).await.is_err() {
                        let _ = events.send(ConnEvent::SendFailed(msg));
                        return PumpExit::Dropped;
                    }
                }
                // Already connected: nothing to do.
                Some(ConnCommand::Reconnect) => {}
                Some(ConnCommand::Close) | None => return PumpExit::Closed,
            },

            _ = heartbeat.tick() => {
                trace!("heartbeat");
                if let Ok(json) = serde_json::to_string(&ClientMessage::Ping)
                    && writer.send(&json).await.is_err()
                {
                    return PumpExit::Dropped;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptConnector, mem_pair};
    use quiz_core::protocol::ClientMessage;
    use crate::transport::TransportError;

    /// Collect status events until (and including) the first `Failed`.
    async fn statuses_until_failed(conn: &mut Connection) -> Vec<ConnectionStatus> {
        let mut seen = Vec::new();
        while let Some(event) = conn.events.recv().await {
            if let ConnEvent::Status(status) = event {
                seen.push(status);
                if status == ConnectionStatus::Failed {
                    break;
                }
            }
        }
        seen
    }

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let secs: Vec<u64> = (1..=5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn parse_frame_classifies_input() {
        assert!(matches!(parse_frame("   "), InboundFrame::Empty));
        assert!(matches!(
            parse_frame(r#"{"type":"PONG"}"#),
            InboundFrame::Message(ServerMessage::Pong)
        ));
        assert!(matches!(
            parse_frame(r#"{"type":"SHINY_NEW_THING","data":{"x":1}}"#),
            InboundFrame::UnknownType { tag, .. } if tag == "SHINY_NEW_THING"
        ));
        assert!(matches!(parse_frame("{not json"), InboundFrame::Malformed(_)));
        // Valid JSON without an envelope is malformed, not unknown.
        assert!(matches!(parse_frame(r#"{"foo":1}"#), InboundFrame::Malformed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_five_attempts_then_manual_reconnect_restarts() {
        // Every dial fails.
        let connector = ScriptConnector::failing();
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        let seen = statuses_until_failed(&mut conn).await;
        assert_eq!(
            seen,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Reconnecting { attempt: 1 },
                ConnectionStatus::Reconnecting { attempt: 2 },
                ConnectionStatus::Reconnecting { attempt: 3 },
                ConnectionStatus::Reconnecting { attempt: 4 },
                ConnectionStatus::Reconnecting { attempt: 5 },
                ConnectionStatus::Failed,
            ]
        );

        // Terminal: sends fail fast instead of being queued forever.
        conn.send(ClientMessage::Ping);
        match conn.events.recv().await {
            Some(ConnEvent::SendFailed(ClientMessage::Ping)) => {}
            other => panic!("expected SendFailed, got {other:?}"),
        }

        // Manual retry restarts the cycle from a fresh counter.
        conn.reconnect();
        match conn.events.recv().await {
            Some(ConnEvent::Status(ConnectionStatus::Connecting)) => {}
            other => panic!("expected Connecting, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_the_attempt_counter() {
        let (transport, endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![
            Err(TransportError::Io("refused".to_string())),
            Err(TransportError::Io("refused".to_string())),
            Ok(transport),
        ]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        let mut seen = Vec::new();
        while let Some(event) = conn.events.recv().await {
            if let ConnEvent::Status(status) = event {
                seen.push(status);
                if status == ConnectionStatus::Connected {
                    break;
                }
            }
        }
        assert_eq!(
            seen,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Reconnecting { attempt: 1 },
                ConnectionStatus::Reconnecting { attempt: 2 },
                ConnectionStatus::Connected,
            ]
        );

        // Kill the link: the next cycle starts over at attempt 1, not 3.
        drop(endpoint);
        match conn.events.recv().await {
            Some(ConnEvent::Status(ConnectionStatus::Reconnecting { attempt: 1 })) => {}
            other => panic!("expected Reconnecting {{attempt: 1}}, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drop_is_reported_before_the_backoff_wait() {
        let (transport, endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![Ok(transport)]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        loop {
            if let Some(ConnEvent::Status(ConnectionStatus::Connected)) = conn.events.recv().await {
                break;
            }
        }

        // Kill the link. The status change must arrive ahead of the
        // backoff sleep — a consumer must never see a stale Connected
        // for the whole backoff window.
        let before = tokio::time::Instant::now();
        drop(endpoint);
        match conn.events.recv().await {
            Some(ConnEvent::Status(ConnectionStatus::Reconnecting { attempt: 1 })) => {}
            other => panic!("expected immediate Reconnecting, got {other:?}"),
        }
        assert!(
            tokio::time::Instant::now() - before < RECONNECT_BASE_DELAY,
            "status was delayed behind the backoff sleep"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sends_heartbeat_while_connected() {
        let (transport, mut endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![Ok(transport)]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        // Wait until connected.
        loop {
            if let Some(ConnEvent::Status(ConnectionStatus::Connected)) = conn.events.recv().await {
                break;
            }
        }

        // Paused time auto-advances to the heartbeat deadline.
        let frame = endpoint.from_client.recv().await.unwrap();
        let msg: ClientMessage = serde_json::from_str(&frame).unwrap();
        assert_eq!(msg, ClientMessage::Ping);

        // And the reply never reaches the consumer.
        endpoint.push(r#"{"type":"PONG"}"#);
        endpoint.push(r#"{"type":"GAME_STARTED","data":{"countdown":3}}"#);
        match conn.events.recv().await {
            Some(ConnEvent::Message(ServerMessage::GameStarted { countdown: 3, .. })) => {}
            other => panic!("PONG should be swallowed; got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_frames_in_order_and_survives_garbage() {
        let (transport, mut endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![Ok(transport)]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        endpoint.push(r#"{"type":"GAME_STARTED","data":{"countdown":5}}"#);
        endpoint.push("{definitely not json");
        endpoint.push(r#"{"type":"FROM_THE_FUTURE","data":{}}"#);
        endpoint.push(r#"{"type":"GAME_OVER","data":{"prizePool":1.0}}"#);

        let mut messages = Vec::new();
        let mut protocol_errors = 0;
        while messages.len() < 2 {
            match conn.events.recv().await.unwrap() {
                ConnEvent::Message(msg) => messages.push(msg),
                ConnEvent::ProtocolError(_) => protocol_errors += 1,
                ConnEvent::Status(_) => {}
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert!(matches!(messages[0], ServerMessage::GameStarted { countdown: 5, .. }));
        assert!(matches!(messages[1], ServerMessage::GameOver { .. }));
        assert_eq!(protocol_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_sends_reach_the_wire() {
        let (transport, mut endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![Ok(transport)]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        loop {
            if let Some(ConnEvent::Status(ConnectionStatus::Connected)) = conn.events.recv().await {
                break;
            }
        }

        conn.send(ClientMessage::JoinRoom {
            player_name: "ada".to_string(),
            room_id: "AB12CD".to_string(),
        });
        let frame = endpoint.from_client.recv().await.unwrap();
        let msg: ClientMessage = serde_json::from_str(&frame).unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_while_connected_is_a_no_op() {
        // The script holds exactly one transport: a redial would fail
        // and show up as a status change.
        let (transport, mut endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![Ok(transport)]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        loop {
            if let Some(ConnEvent::Status(ConnectionStatus::Connected)) = conn.events.recv().await {
                break;
            }
        }

        conn.reconnect();
        endpoint.push(r#"{"type":"GAME_STARTED","data":{"countdown":3}}"#);
        match conn.events.recv().await {
            Some(ConnEvent::Message(ServerMessage::GameStarted { .. })) => {}
            other => panic!("connection should be undisturbed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_clean_and_final() {
        let (transport, _endpoint) = mem_pair();
        let connector = ScriptConnector::new(vec![Ok(transport)]);
        let mut conn = Connection::open_with(connector, ReconnectPolicy::default());

        loop {
            if let Some(ConnEvent::Status(ConnectionStatus::Connected)) = conn.events.recv().await {
                break;
            }
        }

        conn.close();
        match conn.events.recv().await {
            Some(ConnEvent::Status(ConnectionStatus::Disconnected)) => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
        // Supervisor exited: no reconnection, the channel just closes.
        assert!(conn.events.recv().await.is_none());
    }
}
