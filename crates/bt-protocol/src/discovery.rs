//! Discovery directory
//!
//! Five slots filled by an inquiry in arrival order, optionally annotated
//! with the first service name each device advertises.

use crate::address::BtAddress;
use crate::command::AtCommand;
use crate::error::BtError;
use crate::indicator::Glyph;
use crate::link::LinkState;
use crate::response::{tables, Response};
use crate::session::CommandSession;
use serde::Serialize;
use tracing::{debug, info};

/// Number of devices one inquiry can record
pub const MAX_PEERS: usize = 5;

/// Service name as reported by the module, at most 16 characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceName {
    pub name: String,
    /// No closing quote within the first 16 characters
    pub truncated: bool,
}

impl ServiceName {
    pub fn starts_with(&self, literal: &str) -> bool {
        self.name.starts_with(literal)
    }
}

/// One directory slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveredPeer {
    pub active: bool,
    pub address: Option<BtAddress>,
    pub name: Option<ServiceName>,
}

/// Result of one inquiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InquiryOutcome {
    pub found: usize,
    /// `+BTINQ: COMPLETE` arrived before the deadline
    pub completed: bool,
}

/// Result of one service lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceLookup {
    /// Records seen, named or not
    pub services: usize,
    pub names: Vec<ServiceName>,
    /// `+BTSDP: COMPLETE` arrived before the deadline
    pub completed: bool,
}

impl ServiceLookup {
    pub fn first_name(&self) -> Option<&ServiceName> {
        self.names.first()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryDirectory {
    peers: [DiscoveredPeer; MAX_PEERS],
}

impl DiscoveryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peers(&self) -> &[DiscoveredPeer] {
        &self.peers
    }

    pub fn get(&self, slot: usize) -> Option<&DiscoveredPeer> {
        self.peers.get(slot)
    }

    /// Slots currently marked active, with their index
    pub fn active(&self) -> impl Iterator<Item = (usize, &DiscoveredPeer)> {
        self.peers.iter().enumerate().filter(|(_, p)| p.active)
    }

    pub fn clear(&mut self) {
        self.peers = Default::default();
    }

    fn record(&mut self, address: BtAddress) -> bool {
        match self.peers.iter_mut().find(|p| p.address.is_none()) {
            Some(slot) => {
                slot.address = Some(address);
                slot.active = true;
                true
            }
            None => false,
        }
    }

    /// Clear the directory and record the devices answering an inquiry
    ///
    /// The session must already be in command mode. Reaching the deadline
    /// without the completion line is not an error.
    pub async fn run_inquiry(
        &mut self,
        session: &mut CommandSession,
    ) -> Result<InquiryOutcome, BtError> {
        self.clear();
        let secs = session.config().inquiry_secs;
        info!("Starting {}s inquiry", secs);

        session.cancel_pending().await?;
        session.reset_reader();
        session.set_link_state(LinkState::Inquiring);

        let result = self.collect_inquiry(session, secs).await;
        session.clear_indicator();
        session.set_link_state(LinkState::CommandMode);

        let outcome = result?;
        info!("Inquiry found {} device(s)", outcome.found);
        Ok(outcome)
    }

    async fn collect_inquiry(
        &mut self,
        session: &mut CommandSession,
        secs: u8,
    ) -> Result<InquiryOutcome, BtError> {
        session.send_command(&AtCommand::Inquiry { secs }).await?;
        let deadline = session.deadline(session.config().inquiry_timeout_ms());
        let mut found = 0;

        loop {
            match session
                .next_response(tables::INQUIRY, &deadline, Some(Glyph::Dot), "inquiry")
                .await
            {
                Ok(Response::InquiryFound(address)) => {
                    if self.record(address) {
                        debug!("Found {} in slot {}", address, found);
                        found += 1;
                    } else {
                        debug!("Directory full, dropping {}", address);
                    }
                }
                Ok(Response::InquiryComplete) => {
                    return Ok(InquiryOutcome {
                        found,
                        completed: true,
                    })
                }
                Ok(_) => {}
                Err(BtError::Timeout { .. }) => {
                    return Ok(InquiryOutcome {
                        found,
                        completed: false,
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Collect the service names advertised by `address`
    pub async fn lookup_services(
        session: &mut CommandSession,
        address: BtAddress,
    ) -> Result<ServiceLookup, BtError> {
        Self::collect_services(session, address, Glyph::Dash).await
    }

    async fn collect_services(
        session: &mut CommandSession,
        address: BtAddress,
        glyph: Glyph,
    ) -> Result<ServiceLookup, BtError> {
        debug!("Looking up services of {}", address);
        session.reset_reader();
        session
            .send_command(&AtCommand::ServiceDiscovery(address))
            .await?;
        let deadline = session.deadline(session.config().service_lookup_timeout_ms);
        let mut lookup = ServiceLookup::default();

        let result = loop {
            match session
                .next_response(tables::SERVICE_DISCOVERY, &deadline, Some(glyph), "service records")
                .await
            {
                Ok(Response::ServiceRecord(name)) => {
                    lookup.services += 1;
                    lookup.names.extend(name);
                }
                Ok(Response::ServiceComplete) => {
                    lookup.completed = true;
                    break Ok(lookup);
                }
                Ok(_) => {}
                Err(BtError::Timeout { .. }) => break Ok(lookup),
                Err(e) => break Err(e),
            }
        };
        session.clear_indicator();
        result
    }

    /// Look up the device in `slot` and remember its first service name
    pub async fn resolve_service_name(
        &mut self,
        session: &mut CommandSession,
        slot: usize,
    ) -> Result<ServiceLookup, BtError> {
        let address = self.address_of(slot)?;
        let lookup = Self::lookup_services(session, address).await?;
        info!("Found {} service(s) on {}", lookup.services, address);

        if let Some(peer) = self.peers.get_mut(slot) {
            peer.name = lookup.first_name().cloned();
        }
        Ok(lookup)
    }

    /// Keep active only the devices advertising a service starting with `literal`
    ///
    /// Returns the number of devices still active.
    pub async fn filter_by_service(
        &mut self,
        session: &mut CommandSession,
        literal: &str,
    ) -> Result<usize, BtError> {
        let mut matching = 0;
        for slot in 0..MAX_PEERS {
            let Some(address) = self.peers[slot].address.filter(|_| self.peers[slot].active) else {
                continue;
            };

            let lookup = Self::collect_services(session, address, Glyph::Star).await?;
            let name = lookup.names.into_iter().find(|n| n.starts_with(literal));
            let peer = &mut self.peers[slot];
            peer.active = name.is_some();
            if name.is_some() {
                peer.name = name;
                matching += 1;
            }
        }
        info!("{} device(s) offer {}", matching, literal);
        Ok(matching)
    }

    fn address_of(&self, slot: usize) -> Result<BtAddress, BtError> {
        self.peers
            .get(slot)
            .and_then(|p| p.address)
            .ok_or_else(|| BtError::InvalidState(format!("slot {} is empty", slot)))
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

    const FOUND: [&str; 3] = [
        "+BTINQ: 0012F3000001,0x5A020\r\n",
        "+BTINQ: 0012F3000002,0x5A020\r\n",
        "+BTINQ: 0012F3000003,0x5A020\r\n",
    ];

    fn setup(
        script: impl FnOnce(SimulatedModem) -> SimulatedModem,
    ) -> (CommandSession, ModemHandle) {
        let (transport, handle) = mock_transport();
        let modem = script(SimulatedModem::new(Arc::clone(&transport), handle)).spawn();
        let session =
            CommandSession::new(transport, Arc::new(TokioClock::new()), BtConfig::default());
        (session, modem)
    }

    fn addr(text: &str) -> BtAddress {
        BtAddress::parse(text).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_inquiry_records_peers_in_arrival_order() {
        let script = format!("\r\nOK\r\n{}{}{}+BTINQ: COMPLETE\r\n", FOUND[0], FOUND[1], FOUND[2]);
        let (mut session, modem) = setup(|m| {
            m.on_delayed("AT+BTINQ=6\r", &script, Duration::from_millis(1_000))
        });

        let started = Instant::now();
        let mut directory = DiscoveryDirectory::new();
        let outcome = directory.run_inquiry(&mut session).await.unwrap();

        assert_eq!(outcome, InquiryOutcome { found: 3, completed: true });
        assert!(started.elapsed() < Duration::from_millis(500 + 6_500));
        assert!(modem.heard().starts_with("AT+BTCAN\rAT+BTINQ=6\r"));

        let active: Vec<_> = directory.active().map(|(i, p)| (i, p.address)).collect();
        assert_eq!(
            active,
            vec![
                (0, Some(addr("0012F3000001"))),
                (1, Some(addr("0012F3000002"))),
                (2, Some(addr("0012F3000003"))),
            ]
        );
        assert!(!directory.peers()[3].active);
        assert_eq!(session.link_state(), LinkState::CommandMode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inquiry_keeps_first_five_and_ignores_garbage() {
        let mut script = String::from("+BTINQ: 0012F30000\r\n");
        for i in 1..=7 {
            script.push_str(&format!("+BTINQ: 0012F300000{},0x5A020\r\n", i));
        }
        let (mut session, _modem) = setup(|m| m.on("AT+BTINQ=6\r", &script));

        let mut directory = DiscoveryDirectory::new();
        let outcome = directory.run_inquiry(&mut session).await.unwrap();

        // No completion line: the inquiry runs to its deadline
        assert_eq!(outcome, InquiryOutcome { found: 5, completed: false });
        assert_eq!(
            directory.peers()[4].address,
            Some(addr("0012F3000005"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inquiry_clears_previous_results() {
        let (mut session, _modem) = setup(|m| {
            m.on("AT+BTINQ=6\r", &format!("{}+BTINQ: COMPLETE\r\n", FOUND[0]))
                .on("AT+BTINQ=6\r", "+BTINQ: COMPLETE\r\n")
        });

        let mut directory = DiscoveryDirectory::new();
        directory.run_inquiry(&mut session).await.unwrap();
        assert_eq!(directory.active().count(), 1);

        let outcome = directory.run_inquiry(&mut session).await.unwrap();
        assert_eq!(outcome.found, 0);
        assert_eq!(directory.active().count(), 0);
        assert_eq!(directory.peers()[0], DiscoveredPeer::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_service_name() {
        let (mut session, _modem) = setup(|m| {
            m.on("AT+BTINQ=6\r", &format!("{}+BTINQ: COMPLETE\r\n", FOUND[0]))
                .on(
                    "AT+BTSDP=0012F3000001\r",
                    "+BTSDP: 0x1101, \"PingPongServer\"\r\n+BTSDP: 0x1105\r\n+BTSDP: COMPLETE\r\n",
                )
        });

        let mut directory = DiscoveryDirectory::new();
        directory.run_inquiry(&mut session).await.unwrap();
        let lookup = directory.resolve_service_name(&mut session, 0).await.unwrap();

        assert_eq!(lookup.services, 2);
        assert!(lookup.completed);
        assert_eq!(
            directory.peers()[0].name.as_ref().map(|n| n.name.as_str()),
            Some("PingPongServer")
        );

        let err = directory.resolve_service_name(&mut session, 3).await.unwrap_err();
        assert!(matches!(err, BtError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_by_service() {
        let (mut session, _modem) = setup(|m| {
            m.on(
                    "AT+BTINQ=6\r",
                    &format!("{}{}+BTINQ: COMPLETE\r\n", FOUND[0], FOUND[1]),
                )
                .on(
                    "AT+BTSDP=0012F3000001\r",
                    "+BTSDP: 0x1101, \"Serial Port\"\r\n+BTSDP: COMPLETE\r\n",
                )
                .on(
                    "AT+BTSDP=0012F3000002\r",
                    "+BTSDP: 0x1101, \"Serial Port\"\r\n+BTSDP: 0x1101, \"PingPongServer\"\r\n+BTSDP: COMPLETE\r\n",
                )
        });

        let mut directory = DiscoveryDirectory::new();
        directory.run_inquiry(&mut session).await.unwrap();
        let matching = directory
            .filter_by_service(&mut session, "PingPongServer")
            .await
            .unwrap();

        assert_eq!(matching, 1);
        let active: Vec<_> = directory.active().map(|(i, _)| i).collect();
        assert_eq!(active, vec![1]);
        assert_eq!(
            directory.peers()[1].name.as_ref().map(|n| n.name.as_str()),
            Some("PingPongServer")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_without_completion_runs_to_deadline() {
        let (mut session, _modem) = setup(|m| {
            m.on("AT+BTSDP=0012F3000009\r", "+BTSDP: \"A Very Long Service Name\"\r\n")
        });

        let started = Instant::now();
        let lookup = DiscoveryDirectory::lookup_services(&mut session, addr("0012F3000009"))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(6_000));
        assert!(!lookup.completed);
        assert_eq!(lookup.names[0].name, "A Very Long Serv");
        assert!(lookup.names[0].truncated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_longer_than_line_still_counted() {
        let (mut session, _modem) = setup(|m| {
            m.on(
                "AT+BTSDP=0012F3000009\r",
                "+BTSDP: 0x00011101, \"Serial Port Profile Svc\"\r\n+BTSDP: COMPLETE\r\n",
            )
        });

        let lookup = DiscoveryDirectory::lookup_services(&mut session, addr("0012F3000009"))
            .await
            .unwrap();

        assert!(lookup.completed);
        assert_eq!(lookup.services, 1);
        assert_eq!(lookup.names[0].name, "Serial Port Prof");
        assert!(lookup.names[0].truncated);
        assert_eq!(session.line_overflows(), 1);
    }
}
