//! Connection handshake
//!
//! Server side: listen under the game's service name, wait for `CONNECT`,
//! then let the user accept or refuse the client. Client side: page the
//! server and wait for `CONNECT` followed by the server's ready line.

use crate::address::BtAddress;
use crate::command::AtCommand;
use crate::error::BtError;
use crate::indicator::Glyph;
use crate::link::LinkState;
use crate::response::{tables, Response};
use crate::session::CommandSession;
use tracing::{debug, info};

/// Line the server sends once it accepts a client
pub const READY_LINE: &str = "LETS START PLAYING";

/// The user's answer to an incoming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    Accept,
    Refuse,
}

/// Drives one connection attempt on a borrowed session
pub struct ConnectionCoordinator<'s> {
    session: &'s mut CommandSession,
}

impl<'s> ConnectionCoordinator<'s> {
    pub fn new(session: &'s mut CommandSession) -> Self {
        Self { session }
    }

    pub fn link_state(&self) -> LinkState {
        self.session.link_state()
    }

    /// Become discoverable under the configured service name
    pub async fn listen(&mut self) -> Result<(), BtError> {
        self.session.enter_command_mode().await?;
        self.session.cancel_pending().await?;
        self.session.reset_reader();

        let command = AtCommand::Listen {
            timeout_secs: self.session.config().server_timeout_secs,
            service: self.session.config().service_name.clone(),
        };
        self.session.send_command(&command).await?;
        self.session.set_link_state(LinkState::Listening);
        info!("Listening as {}", self.session.config().service_name);
        Ok(())
    }

    /// Check once for an incoming `CONNECT`
    pub fn poll_incoming(&mut self) -> Result<Option<BtAddress>, BtError> {
        self.expect_state(matches!(self.session.link_state(), LinkState::Listening))?;

        match self.session.poll_response(tables::INCOMING)? {
            Some(Response::Connect(peer)) => {
                info!("Incoming connection from {}", peer);
                self.session
                    .set_link_state(LinkState::AwaitingAcceptance { peer });
                Ok(Some(peer))
            }
            _ => Ok(None),
        }
    }

    /// Wait for a client until one connects or `cancel` returns true
    ///
    /// Cancelling stops the module listening.
    pub async fn wait_for_client(
        &mut self,
        mut cancel: impl FnMut() -> bool,
    ) -> Result<BtAddress, BtError> {
        let result = loop {
            match self.poll_incoming() {
                Ok(Some(peer)) => break Ok(peer),
                Ok(None) => {}
                Err(e) => break Err(e),
            }

            if cancel() {
                debug!("Wait for client cancelled");
                self.session.set_link_state(LinkState::CommandMode);
                break match self.session.cancel_pending().await {
                    Ok(()) => Err(BtError::Cancelled),
                    Err(e) => Err(e),
                };
            }

            self.session.refresh_indicator(Glyph::Star);
            let poll = self.session.config().poll_interval_ms;
            self.session.sleep_ms(poll).await;
        };
        self.session.clear_indicator();
        result
    }

    /// Accept or refuse the client found by [`wait_for_client`](Self::wait_for_client)
    pub async fn resolve(&mut self, decision: AcceptDecision) -> Result<LinkState, BtError> {
        let LinkState::AwaitingAcceptance { peer } = self.session.link_state() else {
            return Err(BtError::InvalidState(self.session.link_state().to_string()));
        };

        match decision {
            AcceptDecision::Accept => {
                let ready = format!("\n{}\n", READY_LINE);
                self.session.send_raw(ready.as_bytes()).await?;
                self.session.set_link_state(LinkState::Connected { peer });
            }
            AcceptDecision::Refuse => {
                info!("Refusing {}", peer);
                self.session.send_command(&AtCommand::Escape).await?;
                self.session.set_link_state(LinkState::Idle);
            }
        }
        Ok(self.session.link_state())
    }

    /// Connect to `peer` as client and wait for the server to accept
    ///
    /// Each phase has its own deadline measured from the moment it began.
    /// `NO CARRIER` fails the attempt at once; there is no retry.
    pub async fn connect(&mut self, peer: BtAddress) -> Result<(), BtError> {
        self.session.enter_command_mode().await?;
        self.session.cancel_pending().await?;
        self.session.reset_reader();

        let config = self.session.config();
        let command = AtCommand::Connect {
            address: peer,
            timeout_secs: config.client_connect_timeout_secs,
            retries: config.client_connect_retries,
        };
        let timeout_ms = config.connect_timeout_ms;

        info!("Connecting to {}", peer);
        self.session.send_command(&command).await?;
        self.session.set_link_state(LinkState::Connecting { peer });

        let result = self.await_acceptance(peer, timeout_ms).await;
        self.session.clear_indicator();

        match result {
            Ok(()) => {
                self.session.set_link_state(LinkState::Connected { peer });
                Ok(())
            }
            Err(e) => {
                if !e.is_link_lost() {
                    self.session.set_link_state(LinkState::CommandMode);
                }
                Err(e)
            }
        }
    }

    async fn await_acceptance(&mut self, peer: BtAddress, timeout_ms: u64) -> Result<(), BtError> {
        let deadline = self.session.deadline(timeout_ms);
        loop {
            let response = self
                .session
                .next_response(tables::CLIENT_CONNECT, &deadline, Some(Glyph::Dot), "CONNECT")
                .await?;
            match response {
                Response::Connect(address) if address == peer => break,
                Response::Connect(address) => debug!("Ignoring CONNECT from {}", address),
                _ => {}
            }
        }

        debug!("Link up, waiting for {} to accept", peer);
        let deadline = self.session.deadline(timeout_ms);
        self.session
            .next_response(tables::PEER_READY, &deadline, Some(Glyph::Dot), "ready line")
            .await?;
        Ok(())
    }

    fn expect_state(&self, ok: bool) -> Result<(), BtError> {
        if ok {
            Ok(())
        } else {
            Err(BtError::InvalidState(self.session.link_state().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::config::BtConfig;
    use serial_transport::mock::{mock_transport, ModemHandle, SimulatedModem};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    const PEER: &str = "0012F3A1B2C3";
    const LISTEN: &str = "AT+BTSRV=20,\"PingPongServer\"\r";
    const CLIENT: &str = "AT+BTCLT=\"0012F3A1B2C3\",20,3\r";

    /// Command mode plus cancel settle time before the first command
    const PREAMBLE_MS: u128 = 1_000 + 1_500 + 500;

    fn setup(
        script: impl FnOnce(SimulatedModem) -> SimulatedModem,
    ) -> (CommandSession, ModemHandle) {
        let (transport, handle) = mock_transport();
        let modem = script(SimulatedModem::new(Arc::clone(&transport), handle)).spawn();
        let session =
            CommandSession::new(transport, Arc::new(TokioClock::new()), BtConfig::default());
        (session, modem)
    }

    fn peer() -> BtAddress {
        BtAddress::parse(PEER).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_accepts_client() {
        let (mut session, modem) = setup(|m| {
            m.on_delayed(LISTEN, "\r\nOK\r\nCONNECT 0012F3A1B2C3\r\n", Duration::from_secs(2))
        });
        let mut coordinator = ConnectionCoordinator::new(&mut session);

        coordinator.listen().await.unwrap();
        assert_eq!(coordinator.link_state(), LinkState::Listening);

        let client = coordinator.wait_for_client(|| false).await.unwrap();
        assert_eq!(client, peer());
        assert_eq!(
            coordinator.link_state(),
            LinkState::AwaitingAcceptance { peer: peer() }
        );

        let state = coordinator.resolve(AcceptDecision::Accept).await.unwrap();
        assert_eq!(state, LinkState::Connected { peer: peer() });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(modem.heard().ends_with("\nLETS START PLAYING\n"));
        assert!(modem.heard().starts_with("+++AT+BTCAN\rAT+BTSRV=20,\"PingPongServer\"\r"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_refuses_client() {
        let (mut session, modem) = setup(|m| m.on(LISTEN, "CONNECT 0012F3A1B2C3\r\n"));
        let mut coordinator = ConnectionCoordinator::new(&mut session);

        coordinator.listen().await.unwrap();
        coordinator.wait_for_client(|| false).await.unwrap();
        let state = coordinator.resolve(AcceptDecision::Refuse).await.unwrap();

        assert_eq!(state, LinkState::Idle);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(modem.heard().ends_with("\r+++"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_client_cancelled() {
        let (mut session, modem) = setup(|m| m);
        let mut coordinator = ConnectionCoordinator::new(&mut session);
        coordinator.listen().await.unwrap();

        let mut polls = 0;
        let err = coordinator
            .wait_for_client(|| {
                polls += 1;
                polls > 50
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BtError::Cancelled));
        assert_eq!(coordinator.link_state(), LinkState::CommandMode);
        assert!(modem.heard().ends_with("AT+BTCAN\r"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_without_client_is_rejected() {
        let (mut session, _modem) = setup(|m| m);
        let mut coordinator = ConnectionCoordinator::new(&mut session);

        let err = coordinator.resolve(AcceptDecision::Accept).await.unwrap_err();
        assert!(matches!(err, BtError::InvalidState(_)));
        assert!(coordinator.poll_incoming().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_connects() {
        let (mut session, modem) = setup(|m| {
            m.on_delayed(
                CLIENT,
                "CONNECT 0012F3FFFFFF\r\nCONNECT 0012F3A1B2C3\r\n",
                Duration::from_secs(3),
            )
            .on_delayed("", "\r\nLETS START PLAYING\r\n", Duration::from_secs(4))
        });
        let mut coordinator = ConnectionCoordinator::new(&mut session);

        coordinator.connect(peer()).await.unwrap();

        assert_eq!(coordinator.link_state(), LinkState::Connected { peer: peer() });
        assert!(modem.heard().contains(CLIENT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_no_carrier_fails_fast() {
        let (mut session, _modem) = setup(|m| m.on(CLIENT, "NO CARRIER\r\n"));
        let mut coordinator = ConnectionCoordinator::new(&mut session);
        let started = Instant::now();

        let err = coordinator.connect(peer()).await.unwrap_err();

        assert!(err.is_link_lost());
        assert!(started.elapsed().as_millis() < PREAMBLE_MS + 100);
        assert_eq!(coordinator.link_state(), LinkState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_silence_times_out_at_deadline() {
        let (mut session, _modem) = setup(|m| m);
        let mut coordinator = ConnectionCoordinator::new(&mut session);
        let started = Instant::now();

        let err = coordinator.connect(peer()).await.unwrap_err();

        assert!(matches!(err, BtError::Timeout { waiting_for: "CONNECT", after_ms: 10_000 }));
        let waited = started.elapsed().as_millis();
        let expected = PREAMBLE_MS + 10_000;
        assert!(
            (expected..=expected + 10).contains(&waited),
            "waited {waited}ms"
        );
        assert_eq!(coordinator.link_state(), LinkState::CommandMode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_waits_for_ready_line_with_own_deadline() {
        let (mut session, _modem) =
            setup(|m| m.on_delayed(CLIENT, "CONNECT 0012F3A1B2C3\r\n", Duration::from_secs(9)));
        let mut coordinator = ConnectionCoordinator::new(&mut session);
        let started = Instant::now();

        let err = coordinator.connect(peer()).await.unwrap_err();

        assert!(matches!(err, BtError::Timeout { waiting_for: "ready line", .. }));
        assert!(started.elapsed().as_millis() >= PREAMBLE_MS + 19_000);
    }
}
