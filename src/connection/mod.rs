use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::RwLock;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// The public IP/listening-port the announce data accessor reports to
/// trackers.
///
/// Real public-IP discovery is out of scope for an emulator; this trait is
/// the narrow interface the core depends on, satisfied here by a
/// config-seeded value refreshed on a 90-minute cadence.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionProbe: Send + Sync + std::fmt::Debug {
    fn current_ip(&self) -> Option<IpAddr>;
    fn listening_port(&self) -> u16;
}

/// A [`ConnectionProbe`] whose IP is a fixed, config-supplied value.
///
/// `refresh()` is a no-op beyond logging: the real discovery mechanism lives
/// outside this crate. The refresh loop still runs on its documented cadence
/// so a future, real probe can be swapped in without changing the caller.
#[derive(Debug, Clone)]
pub struct StaticConnectionProbe {
    inner: Arc<RwLock<Option<IpAddr>>>,
    port: u16,
}

const IP_REFRESH_INTERVAL: Duration = Duration::from_secs(90 * 60);

impl StaticConnectionProbe {
    pub fn new(ip: Option<IpAddr>, port: u16) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ip)),
            port,
        }
    }

    /// Spawn the periodic IP-refresh loop, stopping when `token` is
    /// cancelled.
    pub fn spawn_refresh_loop(&self, token: CancellationToken) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = time::sleep(IP_REFRESH_INTERVAL) => {
                        let ip = *inner.read().await;
                        debug!("Refreshing reported public ip, currently {:?}", ip);
                    }
                }
            }
        });
    }
}

impl ConnectionProbe for StaticConnectionProbe {
    fn current_ip(&self) -> Option<IpAddr> {
        self.inner.try_read().ok().and_then(|guard| *guard)
    }

    fn listening_port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_ip_returns_configured_value() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let probe = StaticConnectionProbe::new(Some(ip), 6881);

        assert_eq!(Some(ip), probe.current_ip());
        assert_eq!(6881, probe.listening_port());
    }
}
