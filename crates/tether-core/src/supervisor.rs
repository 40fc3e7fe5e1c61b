//! Connection supervisor state machine.
//!
//! Owns the lifecycle of exactly one outbound realtime channel: connect,
//! disconnect, reconnect with backoff, and reauthentication when the server
//! rejects the presented credential.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as parameter where timers are involved
//! - Methods return `Vec<SupervisorAction>`
//! - The runtime executes actions (fetch a credential, open or close a socket,
//!   publish connection state, report an error) and feeds results back in
//!
//! # State Machine
//!
//! ```text
//!            connect()             socket opened
//! ┌──────┐ ──────────> ┌────────────┐ ──────────> ┌───────────┐
//! │ Idle │             │ Connecting │             │ Connected │
//! └──────┘ <─ give up ─└────────────┘             └───────────┘
//!    ^                   │   ^    ^                     │
//!    │        auth error │   │    │ backoff timer       │ socket closed
//!    │                   v   │    │                     v
//!    │      ┌──────────────────┐  │            ┌──────────────────────┐
//!    └──────│ Reauthenticating │  └────────────│ Disconnected(reason) │
//!  give up  └──────────────────┘  recoverable  └──────────────────────┘
//! ```
//!
//! `disconnect()` returns to `Idle` from any state.
//!
//! # Staleness
//!
//! Every socket gets a fresh [`SocketId`] and every credential request a fresh
//! cycle number. Results tagged with anything but the current id or cycle are
//! ignored, so a torn-down socket can never deliver events or flip state.

use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    error::{ConnectError, DisconnectReason, SupervisorError},
    policy::{ReconnectBudget, ReconnectPolicy},
};

/// Identity of one socket instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Supervisor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// No channel and no attempt in progress.
    Idle,
    /// Obtaining a credential or waiting for the socket to open.
    Connecting,
    /// Channel open and acknowledged.
    Connected,
    /// Channel lost; a reconnect may be scheduled.
    Disconnected(DisconnectReason),
    /// Server rejected the credential; a forced refresh is in flight.
    Reauthenticating,
}

/// Effects requested by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Obtain a usable access token and report back with
    /// [`Supervisor::credential_ready`] or [`Supervisor::credential_failed`].
    AcquireCredential {
        /// Tag to echo back with the result.
        cycle: u64,
        /// Refresh even if the stored access token looks valid.
        force_refresh: bool,
    },

    /// Open a socket and report back with [`Supervisor::socket_opened`] or
    /// [`Supervisor::socket_failed`].
    OpenSocket {
        /// Identity of the new socket.
        socket: SocketId,
        /// Token to present.
        access_token: String,
    },

    /// Tear down a socket and detach all of its listeners.
    CloseSocket {
        /// Socket to close.
        socket: SocketId,
    },

    /// Observable connected flag changed.
    ConnectionChanged(bool),

    /// Surface an unrecoverable failure to the caller's error handler.
    ReportError(SupervisorError),
}

/// Connection supervisor.
///
/// Pure state machine - no I/O, no clock. At most one socket is current at
/// any time and no new attempt starts while one is in progress or a channel
/// is connected.
#[derive(Debug, Clone)]
pub struct Supervisor {
    state: SupervisorState,
    budget: ReconnectBudget,
    /// Current socket (opening or open)
    socket: Option<SocketId>,
    next_socket: u64,
    /// Tag of the credential request that is allowed to complete
    cycle: u64,
    /// Whether this cycle already forced a refresh after an auth failure
    reauthenticated: bool,
    /// Armed reconnect timer
    reconnect_at: Option<Instant>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl Supervisor {
    /// Create an idle supervisor.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: SupervisorState::Idle,
            budget: ReconnectBudget::new(policy),
            socket: None,
            next_socket: 0,
            cycle: 0,
            reauthenticated: false,
            reconnect_at: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Whether the channel is open.
    pub fn is_connected(&self) -> bool {
        self.state == SupervisorState::Connected
    }

    /// Whether a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self.state, SupervisorState::Connecting | SupervisorState::Reauthenticating)
    }

    /// Current socket, if any.
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Whether `socket` is the current one.
    pub fn is_current(&self, socket: SocketId) -> bool {
        self.socket == Some(socket)
    }

    /// Automatic reconnect attempts spent since the last reset.
    pub fn reconnect_attempts(&self) -> u32 {
        self.budget.attempt()
    }

    /// When the armed reconnect timer fires, if one is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Delay until the armed reconnect timer fires, measured from `now`.
    pub fn time_until_reconnect(&self, now: Instant) -> Option<Duration> {
        self.reconnect_at.map(|at| at.saturating_duration_since(now))
    }

    /// Start connecting.
    ///
    /// Ignored while an attempt is in progress or the channel is open, so
    /// re-entrant calls can never produce a second socket.
    pub fn connect(&mut self) -> Vec<SupervisorAction> {
        if self.is_connecting() || self.is_connected() {
            debug!(state = ?self.state, "connect ignored, attempt in progress or connected");
            return Vec::new();
        }
        self.begin_cycle()
    }

    /// Tear everything down and return to `Idle`.
    ///
    /// Cancels the reconnect timer and resets the attempt budget without
    /// re-arming anything. A no-op when already idle.
    pub fn disconnect(&mut self) -> Vec<SupervisorAction> {
        let had_timer = self.reconnect_at.take().is_some();
        if self.state == SupervisorState::Idle && self.socket.is_none() && !had_timer {
            return Vec::new();
        }

        let actions = self.release();
        self.budget.reset();
        self.transition(SupervisorState::Idle);
        info!("disconnected by request");
        actions
    }

    /// Drop whatever exists and start a fresh attempt with a full budget.
    pub fn force_reconnect(&mut self) -> Vec<SupervisorAction> {
        info!(state = ?self.state, "forced reconnect");
        let mut actions = self.release();
        self.reconnect_at = None;
        self.budget.reset();
        self.transition(SupervisorState::Idle);
        actions.extend(self.begin_cycle());
        actions
    }

    /// The host app came back to the foreground.
    ///
    /// Revives the channel if nothing is connected or connecting, with a
    /// fresh attempt budget.
    pub fn app_foregrounded(&mut self) -> Vec<SupervisorAction> {
        if self.is_connected() || self.is_connecting() {
            debug!(state = ?self.state, "foregrounded, channel already live");
            return Vec::new();
        }
        info!("foregrounded, reconnecting");
        self.reconnect_at = None;
        self.budget.reset();
        self.begin_cycle()
    }

    /// A credential request completed.
    pub fn credential_ready(&mut self, cycle: u64, access_token: String) -> Vec<SupervisorAction> {
        if cycle != self.cycle || !self.is_connecting() || self.socket.is_some() {
            debug!(cycle, current = self.cycle, "ignoring stale credential");
            return Vec::new();
        }

        if self.state == SupervisorState::Reauthenticating {
            self.transition(SupervisorState::Connecting);
        }

        self.next_socket += 1;
        let socket = SocketId(self.next_socket);
        self.socket = Some(socket);
        debug!(%socket, "opening socket");

        vec![SupervisorAction::OpenSocket { socket, access_token }]
    }

    /// A credential request failed. The session cannot be recovered
    /// automatically.
    pub fn credential_failed(
        &mut self,
        cycle: u64,
        error: SupervisorError,
    ) -> Vec<SupervisorAction> {
        if cycle != self.cycle || !self.is_connecting() {
            debug!(cycle, current = self.cycle, "ignoring stale credential failure");
            return Vec::new();
        }
        warn!(%error, "no usable credential, giving up");
        self.give_up(error)
    }

    /// The transport acknowledged `socket`.
    pub fn socket_opened(&mut self, socket: SocketId) -> Vec<SupervisorAction> {
        if !self.is_current(socket) || self.state != SupervisorState::Connecting {
            debug!(%socket, "ignoring open of stale socket");
            return Vec::new();
        }

        self.budget.reset();
        self.reauthenticated = false;
        self.transition(SupervisorState::Connected);
        info!(%socket, "connected");

        vec![SupervisorAction::ConnectionChanged(true)]
    }

    /// Opening `socket` failed.
    ///
    /// Credential rejections trigger one forced refresh per cycle; anything
    /// else is treated as a transient failure and backs off.
    pub fn socket_failed(
        &mut self,
        socket: SocketId,
        error: &ConnectError,
        now: Instant,
    ) -> Vec<SupervisorAction> {
        if !self.is_current(socket) || self.state != SupervisorState::Connecting {
            debug!(%socket, "ignoring failure of stale socket");
            return Vec::new();
        }

        self.socket = None;
        let mut actions = vec![SupervisorAction::CloseSocket { socket }];

        if error.is_auth_failure() {
            if self.reauthenticated {
                warn!(%socket, %error, "credential rejected again after refresh");
                actions.extend(self.give_up(SupervisorError::AuthRejected(error.message.clone())));
                return actions;
            }

            info!(%socket, %error, "credential rejected, refreshing");
            self.reauthenticated = true;
            self.cycle += 1;
            self.transition(SupervisorState::Reauthenticating);
            actions.push(SupervisorAction::AcquireCredential {
                cycle: self.cycle,
                force_refresh: true,
            });
            return actions;
        }

        warn!(%socket, %error, "connect failed");
        self.transition(SupervisorState::Disconnected(DisconnectReason::HandshakeFailed));
        actions.extend(self.schedule_reconnect(now));
        actions
    }

    /// `socket` went away.
    pub fn socket_closed(
        &mut self,
        socket: SocketId,
        reason: DisconnectReason,
        now: Instant,
    ) -> Vec<SupervisorAction> {
        if !self.is_current(socket) {
            debug!(%socket, "ignoring close of stale socket");
            return Vec::new();
        }

        let was_connected = self.is_connected();
        self.socket = None;

        let mut actions = vec![SupervisorAction::CloseSocket { socket }];
        if was_connected {
            actions.push(SupervisorAction::ConnectionChanged(false));
        }

        let recoverable = reason.is_recoverable();
        info!(%socket, %reason, recoverable, "socket closed");
        self.transition(SupervisorState::Disconnected(reason));

        if recoverable {
            actions.extend(self.schedule_reconnect(now));
        }
        actions
    }

    /// Fire the reconnect timer if it is due.
    pub fn tick(&mut self, now: Instant) -> Vec<SupervisorAction> {
        match self.reconnect_at {
            Some(at) if now >= at => {
                self.reconnect_at = None;
                if !matches!(self.state, SupervisorState::Disconnected(_)) {
                    return Vec::new();
                }
                info!(attempt = self.budget.attempt(), "reconnect timer fired");
                self.begin_cycle()
            },
            _ => Vec::new(),
        }
    }

    /// Start a new credential cycle.
    ///
    /// Every attempt, initial or automatic, asks for a credential first. The
    /// runtime refreshes proactively when the stored access token has
    /// expired, so the reactive reauthentication path is rarely needed.
    fn begin_cycle(&mut self) -> Vec<SupervisorAction> {
        let mut actions = self.release();
        self.reconnect_at = None;
        self.cycle += 1;
        self.reauthenticated = false;
        self.transition(SupervisorState::Connecting);
        actions.push(SupervisorAction::AcquireCredential { cycle: self.cycle, force_refresh: false });
        actions
    }

    /// Arm the backoff timer, or give up once the budget is spent.
    fn schedule_reconnect(&mut self, now: Instant) -> Vec<SupervisorAction> {
        match self.budget.next() {
            Some((attempt, delay)) => {
                self.reconnect_at = Some(now + delay);
                info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                Vec::new()
            },
            None => {
                let attempts = self.budget.attempt();
                warn!(attempts, "reconnect attempts exhausted");
                self.reconnect_at = None;
                vec![SupervisorAction::ReportError(SupervisorError::ReconnectExhausted { attempts })]
            },
        }
    }

    /// Settle in `Idle` after an unrecoverable failure.
    fn give_up(&mut self, error: SupervisorError) -> Vec<SupervisorAction> {
        let mut actions = self.release();
        self.reconnect_at = None;
        self.budget.reset();
        self.transition(SupervisorState::Idle);
        actions.push(SupervisorAction::ReportError(error));
        actions
    }

    /// Close the current socket and invalidate in-flight results.
    fn release(&mut self) -> Vec<SupervisorAction> {
        let mut actions = Vec::new();
        if let Some(socket) = self.socket.take() {
            actions.push(SupervisorAction::CloseSocket { socket });
        }
        if self.is_connected() {
            actions.push(SupervisorAction::ConnectionChanged(false));
        }
        self.cycle += 1;
        actions
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "supervisor transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectErrorCode;

    fn acquire(actions: &[SupervisorAction]) -> (u64, bool) {
        actions
            .iter()
            .find_map(|a| match a {
                SupervisorAction::AcquireCredential { cycle, force_refresh } => {
                    Some((*cycle, *force_refresh))
                },
                _ => None,
            })
            .expect("acquire credential action")
    }

    fn open(actions: &[SupervisorAction]) -> SocketId {
        actions
            .iter()
            .find_map(|a| match a {
                SupervisorAction::OpenSocket { socket, .. } => Some(*socket),
                _ => None,
            })
            .expect("open socket action")
    }

    /// Drive a fresh supervisor to Connected, returning the socket.
    fn connected(sup: &mut Supervisor) -> SocketId {
        let (cycle, _) = acquire(&sup.connect());
        let socket = open(&sup.credential_ready(cycle, "token".into()));
        sup.socket_opened(socket);
        socket
    }

    #[test]
    fn connect_lifecycle() {
        let mut sup = Supervisor::default();
        assert_eq!(sup.state(), &SupervisorState::Idle);

        let actions = sup.connect();
        let (cycle, force) = acquire(&actions);
        assert!(!force);
        assert!(sup.is_connecting());

        let actions = sup.credential_ready(cycle, "abc".into());
        assert!(matches!(
            &actions[..],
            [SupervisorAction::OpenSocket { access_token, .. }] if access_token == "abc"
        ));
        let socket = open(&actions);

        let actions = sup.socket_opened(socket);
        assert_eq!(actions, vec![SupervisorAction::ConnectionChanged(true)]);
        assert!(sup.is_connected());
    }

    #[test]
    fn reentrant_connect_is_ignored() {
        let mut sup = Supervisor::default();
        assert_eq!(sup.connect().len(), 1);
        assert!(sup.connect().is_empty());

        let mut sup = Supervisor::default();
        connected(&mut sup);
        assert!(sup.connect().is_empty());
    }

    #[test]
    fn recoverable_close_schedules_backoff() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let socket = connected(&mut sup);

        let actions = sup.socket_closed(socket, DisconnectReason::TransportClose, t0);
        assert_eq!(actions, vec![
            SupervisorAction::CloseSocket { socket },
            SupervisorAction::ConnectionChanged(false),
        ]);
        assert_eq!(sup.next_deadline(), Some(t0 + Duration::from_millis(1000)));
        assert_eq!(sup.reconnect_attempts(), 1);

        // Not due yet
        assert!(sup.tick(t0 + Duration::from_millis(999)).is_empty());

        let actions = sup.tick(t0 + Duration::from_millis(1000));
        let (_, force) = acquire(&actions);
        assert!(!force, "proactive check, not a forced refresh");
        assert_eq!(sup.next_deadline(), None);
    }

    #[test]
    fn terminal_close_does_not_reconnect() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let socket = connected(&mut sup);

        sup.socket_closed(socket, DisconnectReason::TransportError, t0);
        assert_eq!(sup.state(), &SupervisorState::Disconnected(DisconnectReason::TransportError));
        assert_eq!(sup.next_deadline(), None);
    }

    #[test]
    fn auth_failure_forces_one_refresh() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let (cycle, _) = acquire(&sup.connect());
        let first = open(&sup.credential_ready(cycle, "stale".into()));

        let error = ConnectError::from_message("jwt expired");
        let actions = sup.socket_failed(first, &error, t0);
        assert_eq!(actions[0], SupervisorAction::CloseSocket { socket: first });
        let (cycle, force) = acquire(&actions);
        assert!(force);
        assert_eq!(sup.state(), &SupervisorState::Reauthenticating);

        let second = open(&sup.credential_ready(cycle, "fresh".into()));
        assert_ne!(first, second);

        // Stale socket events are ignored
        assert!(sup.socket_opened(first).is_empty());
        assert!(sup.socket_closed(first, DisconnectReason::TransportClose, t0).is_empty());

        sup.socket_opened(second);
        assert!(sup.is_connected());
    }

    #[test]
    fn second_auth_failure_gives_up() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let (cycle, _) = acquire(&sup.connect());
        let first = open(&sup.credential_ready(cycle, "a".into()));
        let unauthorized = ConnectError::new(ConnectErrorCode::Unauthorized, "401");

        let (cycle, _) = acquire(&sup.socket_failed(first, &unauthorized, t0));
        let second = open(&sup.credential_ready(cycle, "b".into()));
        let actions = sup.socket_failed(second, &unauthorized, t0);

        assert!(actions.contains(&SupervisorAction::ReportError(SupervisorError::AuthRejected(
            "401".into()
        ))));
        assert_eq!(sup.state(), &SupervisorState::Idle);
        assert_eq!(sup.next_deadline(), None);
    }

    #[test]
    fn credential_failure_gives_up_once() {
        let mut sup = Supervisor::default();
        let (cycle, _) = acquire(&sup.connect());

        let actions = sup.credential_failed(cycle, SupervisorError::RefreshTokenExpired);
        assert_eq!(actions, vec![SupervisorAction::ReportError(
            SupervisorError::RefreshTokenExpired
        )]);
        assert_eq!(sup.state(), &SupervisorState::Idle);

        // Replayed result is stale
        assert!(sup.credential_failed(cycle, SupervisorError::RefreshTokenExpired).is_empty());
    }

    #[test]
    fn transient_connect_error_backs_off() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let (cycle, _) = acquire(&sup.connect());
        let socket = open(&sup.credential_ready(cycle, "t".into()));

        let actions = sup.socket_failed(socket, &ConnectError::timeout(), t0);
        assert_eq!(actions, vec![SupervisorAction::CloseSocket { socket }]);
        assert_eq!(sup.state(), &SupervisorState::Disconnected(DisconnectReason::HandshakeFailed));
        assert_eq!(sup.time_until_reconnect(t0), Some(Duration::from_secs(1)));
    }

    #[test]
    fn exhaustion_after_five_failures() {
        let mut now = Instant::now();
        let mut sup = Supervisor::default();
        let (mut cycle, _) = acquire(&sup.connect());
        let mut delays = Vec::new();

        loop {
            let socket = open(&sup.credential_ready(cycle, "t".into()));
            let actions = sup.socket_failed(socket, &ConnectError::timeout(), now);
            let Some(delay) = sup.time_until_reconnect(now) else {
                assert!(actions.contains(&SupervisorAction::ReportError(
                    SupervisorError::ReconnectExhausted { attempts: 5 }
                )));
                break;
            };
            delays.push(delay.as_millis() as u64);
            now += delay;
            cycle = acquire(&sup.tick(now)).0;
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000]);
        assert!(sup.tick(now + Duration::from_secs(60)).is_empty());

        // Foreground revives with a fresh budget
        let (cycle, _) = acquire(&sup.app_foregrounded());
        let socket = open(&sup.credential_ready(cycle, "t".into()));
        sup.socket_failed(socket, &ConnectError::timeout(), now);
        assert_eq!(sup.time_until_reconnect(now), Some(Duration::from_secs(1)));
    }

    #[test]
    fn success_resets_budget() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let socket = connected(&mut sup);

        sup.socket_closed(socket, DisconnectReason::PingTimeout, t0);
        let t1 = t0 + Duration::from_secs(1);
        let (cycle, _) = acquire(&sup.tick(t1));
        let socket = open(&sup.credential_ready(cycle, "t".into()));
        sup.socket_failed(socket, &ConnectError::timeout(), t1);
        assert_eq!(sup.reconnect_attempts(), 2);

        let t2 = t1 + Duration::from_secs(2);
        let (cycle, _) = acquire(&sup.tick(t2));
        let socket = open(&sup.credential_ready(cycle, "t".into()));
        sup.socket_opened(socket);
        assert_eq!(sup.reconnect_attempts(), 0);

        sup.socket_closed(socket, DisconnectReason::ServerDisconnect, t2);
        assert_eq!(sup.time_until_reconnect(t2), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn disconnect_cancels_everything() {
        let t0 = Instant::now();
        let mut sup = Supervisor::default();
        let socket = connected(&mut sup);

        let actions = sup.disconnect();
        assert_eq!(actions, vec![
            SupervisorAction::CloseSocket { socket },
            SupervisorAction::ConnectionChanged(false),
        ]);
        assert_eq!(sup.state(), &SupervisorState::Idle);

        // Armed timer is cancelled too
        let socket = connected(&mut sup);
        sup.socket_closed(socket, DisconnectReason::TransportClose, t0);
        assert!(sup.next_deadline().is_some());
        sup.disconnect();
        assert_eq!(sup.next_deadline(), None);
        assert_eq!(sup.reconnect_attempts(), 0);
        assert!(sup.tick(t0 + Duration::from_secs(30)).is_empty());
    }

    #[test]
    fn disconnect_when_idle_is_noop() {
        let mut sup = Supervisor::default();
        assert!(sup.disconnect().is_empty());
        assert!(sup.disconnect().is_empty());
        assert_eq!(sup.state(), &SupervisorState::Idle);
    }

    #[test]
    fn disconnect_invalidates_pending_credential() {
        let mut sup = Supervisor::default();
        let (cycle, _) = acquire(&sup.connect());
        sup.disconnect();
        assert!(sup.credential_ready(cycle, "late".into()).is_empty());
        assert_eq!(sup.socket(), None);
    }

    #[test]
    fn force_reconnect_replaces_socket() {
        let mut sup = Supervisor::default();
        let socket = connected(&mut sup);

        let actions = sup.force_reconnect();
        assert_eq!(actions[0], SupervisorAction::CloseSocket { socket });
        assert_eq!(actions[1], SupervisorAction::ConnectionChanged(false));
        acquire(&actions);
        assert!(sup.is_connecting());
    }

    #[test]
    fn foreground_while_connected_is_noop() {
        let mut sup = Supervisor::default();
        connected(&mut sup);
        assert!(sup.app_foregrounded().is_empty());
    }
}
