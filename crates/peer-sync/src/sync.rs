//! Frame exchange over an established link

use crate::frame::{GameStatus, SyncFrame};
use bt_protocol::hex::HexPolicy;
use bt_protocol::response::patterns;
use bt_protocol::{BtError, CommandSession, LinkState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which side of the link this console plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Authoritative side, sends status frames
    Server,
    /// Follower, sends key frames
    Client,
}

/// Synchronisation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum time between two unforced sends (half the 30 ms paddle period)
    pub status_interval_ms: u64,

    pub hex_policy: HexPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 15,
            hex_policy: HexPolicy::Strict,
        }
    }
}

/// One side of a running game link
pub struct PeerSync<'s> {
    session: &'s mut CommandSession,
    role: Role,
    config: SyncConfig,
    last_sent_ms: Option<u64>,
    remote_status: Option<GameStatus>,
    remote_key: Option<u8>,
    frames_received: u64,
}

impl<'s> PeerSync<'s> {
    /// Start synchronising over `session`, which must be connected
    pub fn new(
        session: &'s mut CommandSession,
        role: Role,
        config: SyncConfig,
    ) -> Result<Self, BtError> {
        let state = session.link_state();
        if !state.is_connected() {
            return Err(BtError::InvalidState(state.to_string()));
        }

        info!("Peer sync started as {:?}", role);
        Ok(Self {
            session,
            role,
            config,
            last_sent_ms: None,
            remote_status: None,
            remote_key: None,
            frames_received: 0,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Drain every complete incoming line
    ///
    /// Empty lines are skipped. `NO CARRIER` ends the link; any other line
    /// that is not a well-formed frame is a protocol mismatch. Either way
    /// the caller should treat the link as down.
    pub fn handle_comm(&mut self) -> Result<usize, BtError> {
        let mut handled = 0;
        while let Some(line) = self.session.poll_line() {
            if line.is_empty() {
                continue;
            }
            if patterns::NO_CARRIER.matches(&line) {
                warn!("Peer dropped the link");
                self.session.set_link_state(LinkState::Idle);
                return Err(BtError::LinkLost);
            }

            let frame = SyncFrame::decode(line.as_bytes(), self.config.hex_policy).map_err(|e| {
                warn!("Bad frame {:?}: {}", line, e);
                BtError::from(e)
            })?;
            self.apply(frame);
            handled += 1;
        }
        Ok(handled)
    }

    fn apply(&mut self, frame: SyncFrame) {
        self.frames_received += 1;
        match (self.role, frame) {
            (Role::Client, SyncFrame::Status(status)) => self.remote_status = Some(status),
            (Role::Server, SyncFrame::KeyPress { key }) => self.remote_key = Some(key),
            (role, frame) => debug!("Ignoring {:?} as {:?}", frame, role),
        }
    }

    /// Handle incoming frames, then send the game state if due
    ///
    /// Returns whether a frame went out. `force` bypasses the rate limit.
    pub async fn send_status(&mut self, status: &GameStatus, force: bool) -> Result<bool, BtError> {
        self.expect_role(Role::Server)?;
        self.send(SyncFrame::Status(*status), force).await
    }

    /// Handle incoming frames, then send the held key if due
    pub async fn send_key(&mut self, key: u8, force: bool) -> Result<bool, BtError> {
        self.expect_role(Role::Client)?;
        self.send(SyncFrame::KeyPress { key }, force).await
    }

    async fn send(&mut self, frame: SyncFrame, force: bool) -> Result<bool, BtError> {
        self.handle_comm()?;

        let now = self.session.clock().now_ms();
        let due = self
            .last_sent_ms
            .map_or(true, |last| now.saturating_sub(last) >= self.config.status_interval_ms);
        if !due && !force {
            return Ok(false);
        }

        self.session.send_raw(&frame.encode()).await?;
        self.last_sent_ms = Some(now);
        Ok(true)
    }

    fn expect_role(&self, role: Role) -> Result<(), BtError> {
        if self.role == role {
            Ok(())
        } else {
            Err(BtError::InvalidState(format!("{:?} side", self.role)))
        }
    }

    /// Last status received from the server
    pub fn remote_status(&self) -> Option<GameStatus> {
        self.remote_status
    }

    /// Last key received from the client
    pub fn remote_key(&self) -> Option<u8> {
        self.remote_key
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }
}
