//! Owner of the Bluetooth subsystem state

use crate::arbiter::ChannelArbiter;
use crate::bridge::{run_bridge, Terminal};
use crate::config::ManagerConfig;
use bt_protocol::response::tables;
use bt_protocol::wire::NAME_MAX;
use bt_protocol::{
    AcceptDecision, ActivityIndicator, AtCommand, BtAddress, BtError, Clock, CommandSession,
    ConnectionCoordinator, DiscoveryDirectory, InquiryOutcome, LinkState, ModemMode, Response,
    ResponseRule, ServiceLookup,
};
use peer_sync::{PeerSync, Role};
use serde::Serialize;
use serial_transport::SerialTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Reset input of the module
pub trait ResetLine: Send {
    /// `true` holds the module in reset
    fn set_reset(&mut self, asserted: bool);
}

/// For boards without a controllable reset line
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetLine;

impl ResetLine for NoResetLine {
    fn set_reset(&mut self, _asserted: bool) {}
}

/// What the module reported during the startup sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub local_name: Option<String>,
    pub local_address: Option<BtAddress>,
    pub devices_seen: usize,
}

/// Single owner of the module, its link and the serial channel
///
/// Foreground operations block the terminal bridge first and reactivate it
/// on every exit path. A successful [`connect`](Self::connect),
/// [`listen`](Self::listen) or accepted client keeps the channel until
/// [`hang_up`](Self::hang_up).
pub struct BluetoothManager {
    session: CommandSession,
    directory: DiscoveryDirectory,
    arbiter: ChannelArbiter,
    reset: Box<dyn ResetLine>,
    config: ManagerConfig,
    mode: ModemMode,
    powered: bool,
    role: Option<Role>,
    local_name: Option<String>,
    local_address: Option<BtAddress>,
    bridge: Option<JoinHandle<()>>,
}

impl BluetoothManager {
    pub fn new(transport: Arc<SerialTransport>, clock: Arc<dyn Clock>, config: ManagerConfig) -> Self {
        Self {
            session: CommandSession::new(transport, clock, config.bluetooth.clone()),
            directory: DiscoveryDirectory::new(),
            arbiter: ChannelArbiter::new(),
            reset: Box::new(NoResetLine),
            config,
            mode: ModemMode::default(),
            powered: true,
            role: None,
            local_name: None,
            local_address: None,
            bridge: None,
        }
    }

    pub fn with_reset_line(mut self, reset: Box<dyn ResetLine>) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_indicator(self, indicator: Box<dyn ActivityIndicator>) -> Self {
        Self {
            session: self.session.with_indicator(indicator),
            ..self
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.session.link_state()
    }

    pub fn mode(&self) -> ModemMode {
        self.mode
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn directory(&self) -> &DiscoveryDirectory {
        &self.directory
    }

    pub fn arbiter(&self) -> &ChannelArbiter {
        &self.arbiter
    }

    pub fn transport(&self) -> &Arc<SerialTransport> {
        self.session.transport()
    }

    /// Last name read from or written to the module
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn local_address(&self) -> Option<BtAddress> {
        self.local_address
    }

    /// Start passing bytes between `terminal` and the module
    pub fn start_bridge(&mut self, terminal: impl Terminal) {
        if self.bridge.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Terminal bridge already running");
            return;
        }

        let idle = Duration::from_millis(self.config.bridge.idle_ms);
        self.bridge = Some(tokio::spawn(run_bridge(
            Arc::clone(self.session.transport()),
            self.arbiter.bridge_gate(),
            terminal,
            idle,
        )));
    }

    pub async fn stop_bridge(&mut self) {
        if let Some(task) = self.bridge.take() {
            self.arbiter.shutdown();
            if let Err(e) = task.await {
                warn!("Terminal bridge ended abnormally: {}", e);
            }
        }
    }

    /// Take the serial channel away from the bridge
    pub async fn block(&self) {
        self.arbiter.block().await;
    }

    /// Hand the channel back to the bridge and restore the selected mode
    pub async fn activate(&mut self) -> Result<(), BtError> {
        self.arbiter.release();
        if !self.powered {
            return Ok(());
        }
        self.session.apply_mode(self.mode).await
    }

    async fn finish<T>(&mut self, result: Result<T, BtError>) -> Result<T, BtError> {
        let restored = self.activate().await;
        let value = result?;
        restored?;
        Ok(value)
    }

    fn ensure_ready(&self) -> Result<(), BtError> {
        if !self.powered {
            return Err(BtError::InvalidState("module powered off".into()));
        }
        // A listen or link owns the channel until hang_up
        match self.session.link_state() {
            state @ (LinkState::Listening
            | LinkState::Connecting { .. }
            | LinkState::AwaitingAcceptance { .. }
            | LinkState::Connected { .. }) => Err(BtError::InvalidState(state.to_string())),
            _ => Ok(()),
        }
    }

    /// Reset the module and run the production identification sequence
    ///
    /// Ends in data mode so other devices can find this console; data mode
    /// also becomes the selected mode.
    pub async fn startup(&mut self) -> Result<StartupReport, BtError> {
        let bt = &self.config.bluetooth;
        let (pulse, recovery) = (bt.reset_pulse_ms, bt.reset_recovery_ms);

        info!("Resetting Bluetooth module");
        self.reset.set_reset(true);
        self.session.sleep_ms(pulse).await;
        self.reset.set_reset(false);
        self.session.sleep_ms(recovery).await;
        self.powered = true;

        self.block().await;
        let result = self.identify().await;
        self.mode = ModemMode::Data;
        let report = self.finish(result).await?;

        info!(
            "Module {} ({}) saw {} device(s)",
            report.local_name.as_deref().unwrap_or("?"),
            report.local_address.map(|a| a.to_string()).unwrap_or_default(),
            report.devices_seen
        );
        Ok(report)
    }

    async fn identify(&mut self) -> Result<StartupReport, BtError> {
        let startup = self.config.startup.clone();
        let mut report = StartupReport::default();

        self.session.sleep_ms(startup.step_ms).await;
        self.session.send_command(&AtCommand::Escape).await?;
        self.session.set_link_state(LinkState::CommandMode);
        self.session.sleep_ms(startup.step_ms).await;
        self.session.send_command(&AtCommand::Identify).await?;
        self.session.sleep_ms(startup.step_ms).await;

        if let Some(Response::LocalName(name)) = self
            .optional_query(AtCommand::ReadLocalName, tables::LOCAL_NAME, startup.query_ms, "local name")
            .await?
        {
            self.local_name = Some(name.clone());
            report.local_name = Some(name);
        }
        if let Some(Response::LocalAddress(address)) = self
            .optional_query(
                AtCommand::ReadLocalAddress,
                tables::LOCAL_ADDRESS,
                startup.query_ms,
                "local address",
            )
            .await?
        {
            self.local_address = Some(address);
            report.local_address = Some(address);
        }

        self.session
            .send_command(&AtCommand::Inquiry {
                secs: startup.inquiry_secs,
            })
            .await?;
        let deadline = self.session.deadline(startup.inquiry_ms);
        loop {
            match self
                .session
                .next_response(tables::INQUIRY, &deadline, None, "startup inquiry")
                .await
            {
                Ok(Response::InquiryFound(_)) => report.devices_seen += 1,
                Ok(Response::InquiryComplete) | Err(BtError::Timeout { .. }) => break,
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    async fn optional_query(
        &mut self,
        command: AtCommand,
        rules: &[ResponseRule],
        timeout_ms: u64,
        waiting_for: &'static str,
    ) -> Result<Option<Response>, BtError> {
        match self.session.exchange(&command, rules, timeout_ms, waiting_for).await {
            Ok(response) => Ok(Some(response)),
            Err(BtError::Timeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run an inquiry into the discovery directory
    pub async fn run_inquiry(&mut self) -> Result<InquiryOutcome, BtError> {
        self.ensure_ready()?;
        self.block().await;
        let result = async {
            self.session.enter_command_mode().await?;
            self.directory.run_inquiry(&mut self.session).await
        }
        .await;
        self.finish(result).await
    }

    /// Look up the services of the device in directory slot `slot`
    pub async fn resolve_service_name(&mut self, slot: usize) -> Result<ServiceLookup, BtError> {
        self.ensure_ready()?;
        self.block().await;
        let result = async {
            self.session.enter_command_mode().await?;
            self.directory
                .resolve_service_name(&mut self.session, slot)
                .await
        }
        .await;
        self.finish(result).await
    }

    /// Inquiry followed by the game-service filter
    ///
    /// Returns the slots and addresses of the devices offering the game.
    pub async fn search_servers(&mut self) -> Result<Vec<(usize, BtAddress)>, BtError> {
        self.ensure_ready()?;
        self.block().await;
        let service = self.config.bluetooth.service_name.clone();
        let result = async {
            self.session.enter_command_mode().await?;
            self.directory.run_inquiry(&mut self.session).await?;
            self.directory
                .filter_by_service(&mut self.session, &service)
                .await?;
            Ok::<_, BtError>(
                self.directory
                    .active()
                    .filter_map(|(slot, peer)| Some((slot, peer.address?)))
                    .collect::<Vec<_>>(),
            )
        }
        .await;
        self.finish(result).await
    }

    /// Connect to a game server; the channel stays blocked on success
    pub async fn connect(&mut self, peer: BtAddress) -> Result<(), BtError> {
        self.ensure_ready()?;
        self.block().await;
        match ConnectionCoordinator::new(&mut self.session).connect(peer).await {
            Ok(()) => {
                self.role = Some(Role::Client);
                Ok(())
            }
            Err(e) => self.finish(Err(e)).await,
        }
    }

    /// Become a discoverable game server; the channel stays blocked on success
    pub async fn listen(&mut self) -> Result<(), BtError> {
        self.ensure_ready()?;
        self.block().await;
        match ConnectionCoordinator::new(&mut self.session).listen().await {
            Ok(()) => Ok(()),
            Err(e) => self.finish(Err(e)).await,
        }
    }

    /// Wait for a client after [`listen`](Self::listen)
    pub async fn wait_for_client(
        &mut self,
        cancel: impl FnMut() -> bool,
    ) -> Result<BtAddress, BtError> {
        match ConnectionCoordinator::new(&mut self.session)
            .wait_for_client(cancel)
            .await
        {
            Ok(peer) => Ok(peer),
            Err(e) => self.finish(Err(e)).await,
        }
    }

    /// Accept or refuse the waiting client
    pub async fn resolve_incoming(&mut self, decision: AcceptDecision) -> Result<LinkState, BtError> {
        let result = ConnectionCoordinator::new(&mut self.session)
            .resolve(decision)
            .await;
        match result {
            Ok(state @ LinkState::Connected { .. }) => {
                self.role = Some(Role::Server);
                Ok(state)
            }
            other => self.finish(other).await,
        }
    }

    /// Game-state exchange over the current link
    pub fn peer_sync(&mut self) -> Result<PeerSync<'_>, BtError> {
        let role = self
            .role
            .ok_or_else(|| BtError::InvalidState("no game link".into()))?;
        PeerSync::new(&mut self.session, role, self.config.sync.clone())
    }

    /// End the current link or listen and give the channel back
    pub async fn hang_up(&mut self) -> Result<(), BtError> {
        let result = async {
            if self.session.link_state() != LinkState::Idle {
                info!("Hanging up ({})", self.session.link_state());
                self.session.set_link_state(LinkState::Idle);
                self.session.enter_command_mode().await?;
            }
            Ok::<(), BtError>(())
        }
        .await;
        self.role = None;
        self.finish(result).await
    }

    /// Switch between command and data mode
    pub async fn toggle_mode(&mut self) -> Result<ModemMode, BtError> {
        self.ensure_ready()?;
        self.mode = self.mode.toggled();
        info!("Selected {:?} mode", self.mode);
        self.block().await;
        self.finish(Ok(self.mode)).await
    }

    /// Hold the module in reset, or release it and restore the selected mode
    pub async fn set_powered(&mut self, on: bool) -> Result<(), BtError> {
        if on == self.powered {
            return Ok(());
        }

        if !on {
            info!("Powering Bluetooth module down");
            self.reset.set_reset(true);
            self.powered = false;
            self.role = None;
            self.session.set_link_state(LinkState::Idle);
            return Ok(());
        }

        info!("Powering Bluetooth module up");
        self.reset.set_reset(false);
        let recovery = self.config.bluetooth.reset_recovery_ms;
        self.session.sleep_ms(recovery).await;
        self.powered = true;
        self.block().await;
        self.finish(Ok(())).await
    }

    pub async fn read_local_name(&mut self) -> Result<String, BtError> {
        self.ensure_ready()?;
        self.block().await;
        let timeout = self.config.bluetooth.local_query_timeout_ms;
        let result = async {
            self.session.enter_command_mode().await?;
            match self
                .session
                .exchange(&AtCommand::ReadLocalName, tables::LOCAL_NAME, timeout, "local name")
                .await?
            {
                Response::LocalName(name) => Ok(name),
                other => Err(BtError::ProtocolMismatch(format!("{:?}", other))),
            }
        }
        .await;
        let name = self.finish(result).await?;
        self.local_name = Some(name.clone());
        Ok(name)
    }

    /// Set the name other devices see, saved to the module's flash
    ///
    /// Trailing spaces are dropped.
    pub async fn store_local_name(&mut self, name: &str) -> Result<(), BtError> {
        let name = validate_name(name)?;
        self.ensure_ready()?;
        self.block().await;
        let settle = self.config.bluetooth.settings_settle_ms;
        let result = async {
            self.session.enter_command_mode().await?;
            self.session
                .send_command(&AtCommand::WriteLocalName(name.clone()))
                .await?;
            self.session.sleep_ms(settle).await;
            self.session.send_command(&AtCommand::SaveSettings).await?;
            self.session.sleep_ms(settle).await;
            Ok::<(), BtError>(())
        }
        .await;
        self.finish(result).await?;
        info!("Local name set to {:?}", name);
        self.local_name = Some(name);
        Ok(())
    }

    pub async fn read_local_address(&mut self) -> Result<BtAddress, BtError> {
        self.ensure_ready()?;
        self.block().await;
        let timeout = self.config.bluetooth.local_query_timeout_ms;
        let result = async {
            self.session.enter_command_mode().await?;
            match self
                .session
                .exchange(
                    &AtCommand::ReadLocalAddress,
                    tables::LOCAL_ADDRESS,
                    timeout,
                    "local address",
                )
                .await?
            {
                Response::LocalAddress(address) => Ok(address),
                other => Err(BtError::ProtocolMismatch(format!("{:?}", other))),
            }
        }
        .await;
        let address = self.finish(result).await?;
        self.local_address = Some(address);
        Ok(address)
    }

    /// Change the module's own address; the module persists it
    pub async fn store_local_address(&mut self, address: BtAddress) -> Result<(), BtError> {
        self.ensure_ready()?;
        self.block().await;
        let settle = self.config.bluetooth.settings_settle_ms;
        let result = async {
            self.session.enter_command_mode().await?;
            self.session
                .send_command(&AtCommand::WriteLocalAddress(address))
                .await?;
            self.session.sleep_ms(settle).await;
            Ok::<(), BtError>(())
        }
        .await;
        self.finish(result).await?;
        info!("Local address set to {}", address);
        self.local_address = Some(address);
        Ok(())
    }
}

/// Trim trailing spaces and check the name fits the module
fn validate_name(name: &str) -> Result<String, BtError> {
    let trimmed = name.trim_end_matches(' ');
    let printable = trimmed
        .chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '"');

    if trimmed.is_empty() || trimmed.len() > NAME_MAX || !printable {
        return Err(BtError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}
