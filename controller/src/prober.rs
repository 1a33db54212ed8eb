use std::{future::Future, time::Duration};

use presence_common::count_present;
use tokio::process::Command;
use tracing::debug;

const HCITOOL: &str = "hcitool";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const RSSI_PREFIX: &str = "RSSI return value:";

/// Reads the signal strength of one Bluetooth device.
pub trait RssiProber {
    fn address(&self) -> &str;

    /// `None` when the device cannot be reached right now.
    fn request_rssi(&self) -> impl Future<Output = Option<i32>> + Send;
}

/// Probes every device in order and counts the ones close enough to be
/// present.
pub async fn active_device_count<P: RssiProber>(probers: &[P]) -> usize {
    let mut readings = Vec::with_capacity(probers.len());
    for prober in probers {
        let rssi = prober.request_rssi().await;
        match rssi {
            Some(value) => debug!("RSSI of {}: {value}", prober.address()),
            None => debug!("RSSI of {}: unreachable", prober.address()),
        }
        readings.push(rssi);
    }
    count_present(readings)
}

/// Prober backed by the BlueZ `hcitool` utility. The RSSI of a classic
/// Bluetooth device is only readable over an open link, so every probe
/// first asks for a connection.
#[derive(Debug, Clone)]
pub struct HcitoolProber {
    address: String,
    timeout: Duration,
}

impl HcitoolProber {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    async fn hcitool(&self, command: &str) -> Option<String> {
        let output = Command::new(HCITOOL)
            .arg(command)
            .arg(&self.address)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Err(_) => {
                debug!("{HCITOOL} {command} {} timed out", self.address);
                None
            }
            Ok(Err(err)) => {
                debug!("failed to run {HCITOOL} {command}: {err}");
                None
            }
            Ok(Ok(output)) if !output.status.success() => {
                debug!(
                    "{HCITOOL} {command} {} exited with {}: {}",
                    self.address,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
        }
    }
}

impl RssiProber for HcitoolProber {
    fn address(&self) -> &str {
        &self.address
    }

    async fn request_rssi(&self) -> Option<i32> {
        // Fails harmlessly when the link is already up.
        let _ = self.hcitool("cc").await;
        parse_rssi(&self.hcitool("rssi").await?)
    }
}

pub fn parse_rssi(output: &str) -> Option<i32> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix(RSSI_PREFIX))
        .and_then(|value| value.trim().parse().ok())
}
