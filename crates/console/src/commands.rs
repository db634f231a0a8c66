//! One user-level operation per invocation

use crate::cli::{Cli, Command};
use crate::settings::ConsoleConfig;
use crate::terminal::{StderrIndicator, StdioTerminal};
use anyhow::Context;
use bt_manager::{BluetoothManager, Terminal};
use bt_protocol::{AcceptDecision, BtAddress, LinkState, TokioClock};
use peer_sync::GameStatus;
use serde::Serialize;
use serde_json::json;
use serial_transport::SerialPump;
use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const KEY_NOTHING: u8 = 0x00;
const KEY_UP: u8 = 0x01;
const KEY_DOWN: u8 = 0x02;

/// Lowest paddle position the host-side server reports
const PADDLE_Y_MAX: u8 = 100;

/// How results reach the user
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

/// Open the serial port and run the selected command
pub async fn run(cli: Cli, config: ConsoleConfig) -> anyhow::Result<()> {
    let (transport, pump) = SerialPump::open(&config.transport)
        .with_context(|| format!("opening {}", config.transport.device))?;

    let frame = Duration::from_millis(config.manager.sync.status_interval_ms);
    let mut manager = BluetoothManager::new(transport, Arc::new(TokioClock::new()), config.manager);
    if !cli.json && io::stderr().is_terminal() {
        manager = manager.with_indicator(Box::new(StderrIndicator));
    }

    let out = Output { json: cli.json };
    let result = execute(&mut manager, cli.command, &out, frame).await;
    manager.stop_bridge().await;
    pump.shutdown();
    result
}

async fn execute(
    manager: &mut BluetoothManager,
    command: Command,
    out: &Output,
    frame: Duration,
) -> anyhow::Result<()> {
    match command {
        Command::Bridge => {
            manager.start_bridge(StdioTerminal::spawn());
            info!("Bridge running, Ctrl-C to quit");
            tokio::signal::ctrl_c().await?;
        }
        Command::Startup => {
            let report = manager.startup().await?;
            out.emit(&report, || {
                format!(
                    "{} ({}), {} device(s) nearby",
                    report.local_name.as_deref().unwrap_or("unnamed"),
                    report
                        .local_address
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "address unknown".into()),
                    report.devices_seen
                )
            })?;
        }
        Command::Inquiry => {
            let outcome = manager.run_inquiry().await?;
            if !outcome.completed {
                warn!("Inquiry did not complete before its deadline");
            }
            print_directory(manager, out)?;
        }
        Command::Services { slot } => {
            manager.run_inquiry().await?;
            let lookup = manager.resolve_service_name(slot).await?;
            out.emit(&lookup, || {
                let names: Vec<_> = lookup.names.iter().map(|n| n.name.as_str()).collect();
                format!("{} service(s): {}", lookup.services, names.join(", "))
            })?;
        }
        Command::Search => {
            let servers = manager.search_servers().await?;
            let rows: Vec<_> = servers
                .iter()
                .map(|(slot, address)| json!({ "slot": slot, "address": address }))
                .collect();
            out.emit(&rows, || {
                servers
                    .iter()
                    .map(|(slot, address)| format!("{}: {}", slot, address))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Command::Info => {
            let name = manager.read_local_name().await?;
            let address = manager.read_local_address().await?;
            out.emit(&json!({ "name": name, "address": address }), || {
                format!("{} ({})", name, address)
            })?;
        }
        Command::SetName { name } => {
            manager.store_local_name(&name).await?;
            info!("Name stored");
        }
        Command::SetAddress { address } => {
            manager.store_local_address(address).await?;
            info!("Address stored");
        }
        Command::Connect { address } => {
            manager.connect(address).await?;
            let stop = interrupt_flag();
            let played = play_client(manager, &stop, out, frame).await;
            manager.hang_up().await?;
            played?;
        }
        Command::Listen { accept } => {
            manager.listen().await?;
            let stop = interrupt_flag();
            let client = manager
                .wait_for_client(|| stop.load(Ordering::Acquire))
                .await?;

            let decision = if accept || confirm(client).await? {
                AcceptDecision::Accept
            } else {
                AcceptDecision::Refuse
            };
            if let LinkState::Connected { .. } = manager.resolve_incoming(decision).await? {
                let played = play_server(manager, &stop, out, frame).await;
                manager.hang_up().await?;
                played?;
            }
        }
    }
    Ok(())
}

fn print_directory(manager: &BluetoothManager, out: &Output) -> anyhow::Result<()> {
    let rows: Vec<_> = manager
        .directory()
        .active()
        .map(|(slot, peer)| json!({ "slot": slot, "address": peer.address, "name": peer.name }))
        .collect();
    out.emit(&rows, || {
        manager
            .directory()
            .active()
            .map(|(slot, peer)| {
                let address = peer.address.map(|a| a.to_string()).unwrap_or_default();
                match &peer.name {
                    Some(name) => format!("{}: {} {:?}", slot, address, name.name),
                    None => format!("{}: {}", slot, address),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Set once Ctrl-C is pressed
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            raised.store(true, Ordering::Release);
        }
    });
    flag
}

async fn confirm(client: BtAddress) -> anyhow::Result<bool> {
    eprint!("Accept {}? [y/N] ", client);
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn key_code(input: &[u8]) -> u8 {
    match input.first() {
        Some(b'w' | b'W') => KEY_UP,
        Some(b's' | b'S') => KEY_DOWN,
        _ => KEY_NOTHING,
    }
}

/// Send the held key and print the server's state until interrupted
async fn play_client(
    manager: &mut BluetoothManager,
    stop: &AtomicBool,
    out: &Output,
    frame: Duration,
) -> anyhow::Result<()> {
    let mut keys = StdioTerminal::spawn();
    let mut sync = manager.peer_sync()?;
    let mut held = KEY_NOTHING;
    let mut shown: Option<GameStatus> = None;

    while !stop.load(Ordering::Acquire) {
        if let Some(input) = keys.try_read() {
            held = key_code(&input);
        }
        match sync.send_key(held, false).await {
            Ok(_) => {}
            Err(e) if e.is_link_lost() => {
                warn!("Server left the game");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(status) = sync.remote_status().filter(|s| shown != Some(*s)) {
            shown = Some(status);
            out.emit(&status, || {
                format!(
                    "{}:{}  paddles {}/{}  ball {},{}",
                    status.score1, status.score2, status.p1_y, status.p2_y, status.ball_x, status.ball_y
                )
            })?;
        }
        tokio::time::sleep(frame).await;
    }
    Ok(())
}

/// Move the client's paddle as its keys arrive and send the state back
async fn play_server(
    manager: &mut BluetoothManager,
    stop: &AtomicBool,
    out: &Output,
    frame: Duration,
) -> anyhow::Result<()> {
    let mut sync = manager.peer_sync()?;
    let mut status = GameStatus {
        p1_y: PADDLE_Y_MAX / 2,
        p2_y: PADDLE_Y_MAX / 2,
        ..Default::default()
    };

    while !stop.load(Ordering::Acquire) {
        status.p2_y = step_paddle(status.p2_y, sync.remote_key());
        match sync.send_status(&status, false).await {
            Ok(_) => {}
            Err(e) if e.is_link_lost() => {
                warn!("Client left the game");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(frame).await;
    }

    out.emit(&json!({ "frames_received": sync.frames_received() }), || {
        format!("{} frame(s) received", sync.frames_received())
    })
}

fn step_paddle(y: u8, key: Option<u8>) -> u8 {
    match key {
        Some(KEY_UP) => y.saturating_sub(1),
        Some(KEY_DOWN) => y.saturating_add(1).min(PADDLE_Y_MAX),
        _ => y,
    }
}
