//! Virtual simulator actor task
//!
//! This module provides a pure async task that owns a [`VirtualSimulator`]
//! and serves the control protocol over an async stream. The task uses a
//! select! loop to:
//! - Read request frames from the stream and answer each one in order
//! - Handle obstruction and shutdown commands from a channel
//! - Emit obstruction changes via a broadcast channel

use std::io;

use dash_protocol::{FrameCodec, Packet, ProtocolCodec, SimRequest, SimResponse};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::world::{Obstruction, VirtualSimulator};

/// Commands that can be sent to a virtual simulator actor
#[derive(Debug, Clone)]
pub enum VirtualSimCommand {
    /// Start an obstruction immediately
    Obstruct(Obstruction),
    /// Start an obstruction once the clock reaches a tick
    Schedule { tick: u64, kind: Obstruction },
    /// Shutdown the virtual simulator actor
    Shutdown,
}

/// Emitted whenever the set of active obstructions changes
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSimEvent {
    /// Simulation tick of the change
    pub tick: u64,
    /// Obstructions active after the change
    pub obstructions: Vec<Obstruction>,
}

/// Run the virtual simulator actor task
///
/// Serves requests until the stream closes, a shutdown command arrives or
/// the command channel is dropped, then hands the simulator back so callers
/// can inspect what it recorded.
pub async fn run_virtual_sim_task<S>(
    mut stream: S,
    mut sim: VirtualSimulator,
    mut cmd_rx: mpsc::Receiver<VirtualSimCommand>,
    event_tx: broadcast::Sender<VirtualSimEvent>,
) -> io::Result<VirtualSimulator>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = FrameCodec::<SimRequest>::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut commands_open = true;

    info!("Starting virtual simulator task for {}", sim.name());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual simulator stream closed for {}", sim.name());
                        break;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);
                        loop {
                            let response = match codec.next_packet() {
                                Ok(Some(packet)) => Some(packet.message),
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Virtual simulator {} got a bad frame: {}", sim.name(), e);
                                    None
                                }
                            };

                            let before = sim.active_obstructions();
                            let response = match response {
                                Some(req) => sim.handle(req),
                                None => Packet::new(SimResponse::Error {
                                    message: "malformed request frame".into(),
                                }),
                            };
                            let bytes = response
                                .encode()
                                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                            stream.write_all(&bytes).await?;
                            stream.flush().await?;

                            let after = sim.active_obstructions();
                            if before != after {
                                let _ = event_tx.send(VirtualSimEvent {
                                    tick: sim.tick(),
                                    obstructions: after,
                                });
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Virtual simulator {} stream error: {}", sim.name(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(VirtualSimCommand::Obstruct(kind)) => {
                        sim.obstruct(kind);
                        let _ = event_tx.send(VirtualSimEvent {
                            tick: sim.tick(),
                            obstructions: sim.active_obstructions(),
                        });
                    }
                    Some(VirtualSimCommand::Schedule { tick, kind }) => {
                        sim.schedule(tick, kind);
                    }
                    Some(VirtualSimCommand::Shutdown) => {
                        info!("Shutdown requested for virtual simulator {}", sim.name());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual simulator {}", sim.name());
                        commands_open = false;
                    }
                }
            }
        }
    }

    info!(
        "Virtual simulator task ended for {} after {} requests",
        sim.name(),
        sim.requests()
    );
    Ok(sim)
}
