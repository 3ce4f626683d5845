//! TETHER demo pair
//!
//! Runs one half of a device pair against a relay, with a synthetic device
//! in place of real hardware: the controller sweeps an angle back and forth,
//! the receiver prints whatever it is told to apply.
//!
//! Environment variables:
//! - TETHER_ROLE: "controller" or "receiver" (default: controller)
//! - TETHER_HOST: relay hostname (required)
//! - TETHER_PORT: relay port (default: 443)
//! - TETHER_PATH: handshake path (default: /api/channels/default)
//! - TETHER_TLS: "0" to disable TLS (default: enabled)
//! - RUST_LOG: log filter (default: info)

use std::env;
use std::process::ExitCode;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{error, info};

use tether_protocol::core::{DeviceIo, LinkConfigBuilder, Role};
use tether_protocol::client::ConnectionSupervisor;

/// Synthetic stand-in for the potentiometer/servo hardware.
struct SweepDevice {
    role: Role,
    started: Instant,
    current: f64,
}

impl SweepDevice {
    fn new(role: Role) -> Self {
        Self {
            role,
            started: Instant::now(),
            current: 90.0,
        }
    }
}

impl DeviceIo for SweepDevice {
    fn read_local_value(&mut self) -> f64 {
        match self.role {
            // Triangle wave over 0..180, one full sweep per minute.
            Role::Controller => {
                let t = self.started.elapsed().as_secs_f64() % 60.0;
                let phase = t / 30.0;
                if phase <= 1.0 { phase * 180.0 } else { (2.0 - phase) * 180.0 }
            }
            Role::Receiver => self.current,
        }
    }

    fn apply_remote_value(&mut self, value: f64) {
        self.current = value;
        info!(value, "actuator moved");
    }
}

fn parse_role() -> Role {
    match env::var("TETHER_ROLE").as_deref() {
        Ok("receiver") => Role::Receiver,
        _ => Role::Controller,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Ok(host) = env::var("TETHER_HOST") else {
        error!("TETHER_HOST is required");
        return ExitCode::FAILURE;
    };
    let role = parse_role();
    let port = env::var("TETHER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(443);
    let path =
        env::var("TETHER_PATH").unwrap_or_else(|_| "/api/channels/default".to_string());
    let tls = env::var("TETHER_TLS").as_deref() != Ok("0");

    let config = match LinkConfigBuilder::new(role)
        .host(host)
        .port(port)
        .path(path)
        .tls(tls)
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "bad configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(?role, "starting demo device");
    let device = SweepDevice::new(role);
    let mut supervisor = match ConnectionSupervisor::new(config, device) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "supervisor setup failed");
            return ExitCode::FAILURE;
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("stop requested");
        let _ = stop_tx.send(true);
    });

    match supervisor.run(stop_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "link failed");
            ExitCode::FAILURE
        }
    }
}
