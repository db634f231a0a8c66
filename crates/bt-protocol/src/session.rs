//! Command session engine
//!
//! Owns the foreground side of the serial channel while a command-mode
//! activity runs: it sends AT commands, assembles response lines, classifies
//! them against the step's rule table and enforces the step's deadline.
//! It also owns the [`LinkState`], which only it and the connection
//! coordinator mutate.

use crate::clock::{Clock, Deadline};
use crate::command::AtCommand;
use crate::config::BtConfig;
use crate::error::BtError;
use crate::indicator::{ActivityIndicator, Glyph, NoIndicator, Spinner};
use crate::line::{Line, LineReader};
use crate::link::{LinkState, ModemMode};
use crate::response::{classify, Response, ResponseRule};
use serial_transport::SerialTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Foreground driver of the Bluetooth module
pub struct CommandSession {
    transport: Arc<SerialTransport>,
    reader: LineReader,
    clock: Arc<dyn Clock>,
    config: BtConfig,
    indicator: Box<dyn ActivityIndicator>,
    spinner: Spinner,
    link: LinkState,
}

impl CommandSession {
    pub fn new(transport: Arc<SerialTransport>, clock: Arc<dyn Clock>, config: BtConfig) -> Self {
        Self {
            transport,
            reader: LineReader::new(config.line_capacity),
            clock,
            config,
            indicator: Box::new(NoIndicator),
            spinner: Spinner::new(),
            link: LinkState::Idle,
        }
    }

    /// Draw progress on `indicator` while waiting for responses
    pub fn with_indicator(mut self, indicator: Box<dyn ActivityIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn transport(&self) -> &Arc<SerialTransport> {
        &self.transport
    }

    pub fn config(&self) -> &BtConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Queue raw bytes, waiting briefly for room in the transmit ring
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), BtError> {
        let deadline = self.deadline(self.config.escape_guard_ms);
        while self.transport.tx_free() < bytes.len() && !deadline.is_expired(self.clock.as_ref()) {
            self.sleep_ms(self.config.poll_interval_ms).await;
        }
        self.transport.send(bytes)?;
        Ok(())
    }

    pub async fn send_command(&mut self, command: &AtCommand) -> Result<(), BtError> {
        debug!("Sending {}", command.name());
        self.send_raw(command.to_wire().as_bytes()).await
    }

    pub async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Guard time, `+++`, settle time
    pub async fn enter_command_mode(&mut self) -> Result<(), BtError> {
        info!("Switching module to command mode");
        self.sleep_ms(self.config.escape_guard_ms).await;
        self.send_command(&AtCommand::Escape).await?;
        self.sleep_ms(self.config.command_settle_ms).await;

        if self.link == LinkState::Idle {
            self.set_link_state(LinkState::CommandMode);
        }
        Ok(())
    }

    /// Guard time, `+++`, guard time, `AT+BTSRV=1`
    pub async fn enter_data_mode(&mut self) -> Result<(), BtError> {
        info!("Switching module to data mode");
        self.sleep_ms(self.config.escape_guard_ms).await;
        self.send_command(&AtCommand::Escape).await?;
        self.sleep_ms(self.config.escape_guard_ms).await;
        self.send_command(&AtCommand::ServerMode).await?;

        if self.link == LinkState::CommandMode {
            self.set_link_state(LinkState::Idle);
        }
        Ok(())
    }

    pub async fn apply_mode(&mut self, mode: ModemMode) -> Result<(), BtError> {
        match mode {
            ModemMode::Command => self.enter_command_mode().await,
            ModemMode::Data => self.enter_data_mode().await,
        }
    }

    /// `AT+BTCAN` followed by its settle time
    pub async fn cancel_pending(&mut self) -> Result<(), BtError> {
        self.send_command(&AtCommand::Cancel).await?;
        self.sleep_ms(self.config.cancel_settle_ms).await;
        Ok(())
    }

    /// Forget any partial line left from earlier traffic
    pub fn reset_reader(&mut self) {
        self.reader.reset();
    }

    pub fn deadline(&self, timeout_ms: u64) -> Deadline {
        Deadline::after(self.clock.as_ref(), timeout_ms)
    }

    /// Next line from the transport, if one is complete
    pub fn poll_line(&mut self) -> Option<Line> {
        let line = self.reader.poll(&self.transport)?;
        trace!("<< {}", line);
        Some(line)
    }

    /// Classify every complete line without waiting
    ///
    /// Returns the first recognised response; unrecognised lines are
    /// consumed and ignored.
    pub fn poll_response(&mut self, rules: &[ResponseRule]) -> Result<Option<Response>, BtError> {
        while let Some(line) = self.poll_line() {
            if let Some(response) = classify(rules, &line) {
                return self.accept(response).map(Some);
            }
        }
        Ok(None)
    }

    fn accept(&mut self, response: Response) -> Result<Response, BtError> {
        debug!("Matched {:?}", response);
        if response == Response::NoCarrier {
            self.set_link_state(LinkState::Idle);
            return Err(BtError::LinkLost);
        }
        Ok(response)
    }

    /// Wait for the next response matching `rules`
    ///
    /// Fails with [`BtError::Timeout`] once `deadline` has passed and with
    /// [`BtError::LinkLost`] when the table matches `NO CARRIER`.
    pub async fn next_response(
        &mut self,
        rules: &[ResponseRule],
        deadline: &Deadline,
        glyph: Option<Glyph>,
        waiting_for: &'static str,
    ) -> Result<Response, BtError> {
        loop {
            if let Some(response) = self.poll_response(rules)? {
                return Ok(response);
            }

            if deadline.is_expired(self.clock.as_ref()) {
                warn!(
                    "Timeout waiting for {} after {}ms",
                    waiting_for,
                    deadline.elapsed_ms(self.clock.as_ref())
                );
                metrics::counter!("bt_timeouts_total").increment(1);
                return Err(BtError::Timeout {
                    waiting_for,
                    after_ms: deadline.timeout_ms(),
                });
            }

            if let Some(glyph) = glyph {
                self.refresh_indicator(glyph);
            }
            self.sleep_ms(self.config.poll_interval_ms).await;
        }
    }

    /// Send `command` and wait up to `timeout_ms` for a response from `rules`
    pub async fn exchange(
        &mut self,
        command: &AtCommand,
        rules: &[ResponseRule],
        timeout_ms: u64,
        waiting_for: &'static str,
    ) -> Result<Response, BtError> {
        self.send_command(command).await?;
        let deadline = self.deadline(timeout_ms);
        self.next_response(rules, &deadline, None, waiting_for).await
    }

    pub fn refresh_indicator(&mut self, glyph: Glyph) {
        if let Some(frame) = self.spinner.tick(glyph) {
            self.indicator.show(&frame);
        }
    }

    pub fn clear_indicator(&mut self) {
        self.spinner.reset();
        self.indicator.clear();
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn set_link_state(&mut self, state: LinkState) {
        if self.link != state {
            info!("Link {} -> {}", self.link, state);
            self.link = state;
        }
    }

    /// Lines dropped by the reader for exceeding its capacity
    pub fn line_overflows(&self) -> u64 {
        self.reader.overflows()
    }
}
