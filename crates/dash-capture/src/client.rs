//! Async simulator client
//!
//! [`SimClient`] speaks the frame protocol over any byte stream. Real runs
//! use a TCP connection; tests connect it to the virtual simulator through
//! `tokio::io::duplex()`.

use dash_protocol::{
    encode_message, AiMode, CameraSpec, FrameCodec, Packet, ProtocolCodec, ProtocolError, Quat,
    ScenarioSpec, SimRequest, SimResponse, SpeedMode, Vec3, VehicleSnapshot, PROTOCOL_VERSION,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::simulator::{CameraCapture, Simulator};

/// Name announced in the hello request
const CLIENT_NAME: &str = concat!("dashcap/", env!("CARGO_PKG_VERSION"));

/// Read buffer size; camera frames arrive in many reads
const READ_CHUNK: usize = 64 * 1024;

/// Simulator connection over a byte stream
pub struct SimClient<T> {
    io: T,
    codec: FrameCodec<SimResponse>,
    buffer: Vec<u8>,
    server: Option<String>,
}

impl SimClient<TcpStream> {
    /// Connect to a simulator over TCP and perform the hello exchange
    pub async fn connect(host: &str, port: u16) -> Result<Self, CaptureError> {
        info!("Connecting to simulator at {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        let mut client = Self::new(stream);
        let server = client.hello().await?;
        info!("Connected to {}", server);
        Ok(client)
    }
}

impl<T> SimClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    ///
    /// No hello exchange is performed; call [`Simulator::hello`] first.
    pub fn new(io: T) -> Self {
        Self {
            io,
            codec: FrameCodec::new(),
            buffer: vec![0u8; READ_CHUNK],
            server: None,
        }
    }

    /// Simulator name from the hello exchange
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Send one request and wait for its response
    async fn request(&mut self, req: &SimRequest) -> Result<Packet<SimResponse>, CaptureError> {
        let name = req.name();
        let bytes = encode_message(req)?;

        debug!("-> {} ({} bytes)", name, bytes.len());
        self.io.write_all(&bytes).await?;
        self.io.flush().await?;

        let packet = loop {
            if let Some(packet) = self.codec.next_packet()? {
                break packet;
            }
            let n = self.io.read(&mut self.buffer).await?;
            if n == 0 {
                return Err(CaptureError::Disconnected);
            }
            self.codec.push_bytes(&self.buffer[..n]);
        };

        debug!(
            "<- {} for {} ({} payload bytes)",
            packet.message.name(),
            name,
            packet.payload.len()
        );

        if let SimResponse::Error { message } = packet.message {
            return Err(CaptureError::Simulator {
                request: name,
                message,
            });
        }
        Ok(packet)
    }

    /// Send a request that must be answered with an acknowledgement
    async fn expect_ack(&mut self, req: SimRequest) -> Result<(), CaptureError> {
        let packet = self.request(&req).await?;
        match packet.message {
            SimResponse::Ack => Ok(()),
            other => Err(unexpected(&req, &other)),
        }
    }
}

fn unexpected(req: &SimRequest, resp: &SimResponse) -> CaptureError {
    ProtocolError::UnexpectedResponse {
        request: req.name(),
        response: resp.name(),
    }
    .into()
}

impl<T> Simulator for SimClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    async fn hello(&mut self) -> Result<String, CaptureError> {
        let req = SimRequest::Hello {
            client: CLIENT_NAME.to_string(),
            version: PROTOCOL_VERSION,
        };
        let packet = self.request(&req).await?;
        match packet.message {
            SimResponse::Hello { server, version } => {
                if version != PROTOCOL_VERSION {
                    return Err(ProtocolError::VersionMismatch {
                        local: PROTOCOL_VERSION,
                        remote: version,
                    }
                    .into());
                }
                self.server = Some(server.clone());
                Ok(server)
            }
            other => Err(unexpected(&req, &other)),
        }
    }

    async fn set_deterministic(&mut self, steps_per_second: u32) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::SetDeterministic { steps_per_second })
            .await
    }

    async fn load_scenario(&mut self, scenario: &ScenarioSpec) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::LoadScenario {
            scenario: scenario.clone(),
        })
        .await
    }

    async fn start_scenario(&mut self) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::StartScenario).await
    }

    async fn pause(&mut self) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::Pause).await
    }

    async fn resume(&mut self) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::Resume).await
    }

    async fn step(&mut self, count: u32) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::Step { count }).await
    }

    async fn teleport_vehicle(
        &mut self,
        vid: &str,
        pos: Vec3,
        rot: Quat,
    ) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::Teleport {
            vid: vid.to_string(),
            pos,
            rot,
        })
        .await
    }

    async fn queue_lua(&mut self, chunk: &str) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::QueueLua {
            chunk: chunk.to_string(),
        })
        .await
    }

    async fn spawn_traffic(&mut self) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::SpawnTraffic).await
    }

    async fn set_time_of_day(&mut self, tod: f64, play: bool) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::SetTimeOfDay { tod, play }).await
    }

    async fn hide_hud(&mut self) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::HideHud).await
    }

    async fn open_camera(
        &mut self,
        name: &str,
        vid: &str,
        camera: &CameraSpec,
    ) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::OpenCamera {
            name: name.to_string(),
            vid: vid.to_string(),
            camera: camera.clone(),
        })
        .await
    }

    async fn poll_vehicle(&mut self, vid: &str) -> Result<VehicleSnapshot, CaptureError> {
        let req = SimRequest::PollVehicle {
            vid: vid.to_string(),
        };
        let packet = self.request(&req).await?;
        match packet.message {
            SimResponse::VehicleState { snapshot } => Ok(snapshot),
            other => Err(unexpected(&req, &other)),
        }
    }

    async fn poll_camera(&mut self, name: &str) -> Result<CameraCapture, CaptureError> {
        let req = SimRequest::PollCamera {
            name: name.to_string(),
        };
        let packet = self.request(&req).await?;
        match packet.message {
            SimResponse::CameraData { frame } => {
                let capture = CameraCapture {
                    header: frame,
                    payload: packet.payload,
                };
                // Reject a payload that disagrees with its header right away
                capture.buffers()?;
                Ok(capture)
            }
            other => Err(unexpected(&req, &other)),
        }
    }

    async fn ai_set_mode(&mut self, vid: &str, mode: AiMode) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::AiSetMode {
            vid: vid.to_string(),
            mode,
        })
        .await
    }

    async fn ai_drive_in_lane(&mut self, vid: &str, enabled: bool) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::AiDriveInLane {
            vid: vid.to_string(),
            enabled,
        })
        .await
    }

    async fn ai_set_speed(
        &mut self,
        vid: &str,
        speed_mps: f64,
        mode: SpeedMode,
    ) -> Result<(), CaptureError> {
        self.expect_ack(SimRequest::AiSetSpeed {
            vid: vid.to_string(),
            speed_mps,
            mode,
        })
        .await
    }
}
