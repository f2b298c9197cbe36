//! OTAA join procedure.
//!
//! One call to [`JoinHandler::handle`] runs one join transaction:
//!
//! 1. Parse the join request.
//! 2. Find the device by DevEUI and check the MIC with its AppKey.
//! 3. Draw a join nonce and device address, derive the session keys.
//! 4. Build the encrypted join accept and commit the new session.
//! 5. Wait for the RX2 window and transmit the accept.
//!
//! Steps 3 and 4 run under the device's join lock, so two transactions for
//! the same device cannot mix one's keys with the other's address. The
//! transaction that commits last wins. Both still transmit their own accept.

use log::{debug, info};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceRegistry, Session};
use crate::lorawan::{
    derive_session_keys, CryptoError, DevAddr, Eui64, FrameError, JoinAccept, JoinNonce,
    JoinRequest, NetId,
};
use crate::radio::{DownlinkProfile, RadioError, Transmitter};
use crate::random::RandomSource;

/// Delay from join-request reception to the RX2 downlink.
pub const RX2_DELAY: Duration = Duration::from_secs(6);

/// Network identifier advertised in join accepts.
pub const NET_ID: NetId = NetId::new([0x01, 0x02, 0x03]);

/// Fixed top two bytes of every assigned device address.
pub const DEV_ADDR_PREFIX: [u8; 2] = [0x01, 0x02];

const DL_SETTINGS: u8 = 0x00;
const RX_DELAY_SECS: u8 = 0x01;

/// Reasons a join transaction ends without a transmitted accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// Payload is not a well-formed join request.
    MalformedFrame(FrameError),
    /// No configured device has this DevEUI. Routine on a shared band.
    UnknownDevice(Eui64),
    /// The matching device is provisioned with ABP.
    NotOtaa(String),
    /// MIC did not verify against the device's AppKey.
    InvalidMic(String),
    /// Session key derivation or accept encryption failed.
    KeyDerivationFailed(CryptoError),
    /// The radio rejected the join accept.
    RadioTransmitFailed(RadioError),
    /// Shutdown began before the RX2 window opened.
    Cancelled,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::MalformedFrame(e) => write!(f, "malformed join request: {}", e),
            JoinError::UnknownDevice(eui) => write!(f, "join request from unknown device {}", eui),
            JoinError::NotOtaa(name) => write!(f, "device {} does not use OTAA", name),
            JoinError::InvalidMic(name) => write!(f, "invalid join request MIC from {}", name),
            JoinError::KeyDerivationFailed(e) => write!(f, "key derivation failed: {}", e),
            JoinError::RadioTransmitFailed(e) => write!(f, "join accept transmit failed: {}", e),
            JoinError::Cancelled => write!(f, "join cancelled by shutdown"),
        }
    }
}

impl std::error::Error for JoinError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JoinError::MalformedFrame(e) => Some(e),
            JoinError::KeyDerivationFailed(e) => Some(e),
            JoinError::RadioTransmitFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of a completed join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccepted {
    pub device: String,
    pub dev_addr: DevAddr,
}

/// Runs join transactions against a device registry.
pub struct JoinHandler {
    registry: Arc<DeviceRegistry>,
    transmitter: Transmitter,
    random: Arc<dyn RandomSource>,
    downlink: DownlinkProfile,
    rx2_delay: Duration,
    net_id: NetId,
}

impl JoinHandler {
    /// Create a handler with the default RX2 delay, downlink profile and NetID.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        transmitter: Transmitter,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            registry,
            transmitter,
            random,
            downlink: DownlinkProfile::RX2,
            rx2_delay: RX2_DELAY,
            net_id: NET_ID,
        }
    }

    /// Override the RX2 delay (tests use a short one).
    pub fn with_rx2_delay(mut self, delay: Duration) -> Self {
        self.rx2_delay = delay;
        self
    }

    /// Override the downlink radio profile.
    pub fn with_downlink(mut self, downlink: DownlinkProfile) -> Self {
        self.downlink = downlink;
        self
    }

    /// Run one join transaction for a payload received at `received_at`.
    pub async fn handle(
        &self,
        payload: &[u8],
        received_at: Instant,
        cancel: &CancellationToken,
    ) -> Result<JoinAccepted, JoinError> {
        let request = JoinRequest::parse(payload).map_err(JoinError::MalformedFrame)?;

        let entry = self
            .registry
            .lookup_by_dev_eui(&request.dev_eui)
            .map_err(|_| JoinError::UnknownDevice(request.dev_eui))?;
        let name = entry.name().to_string();
        let app_key = entry
            .device()
            .app_key()
            .ok_or_else(|| JoinError::NotOtaa(name.clone()))?;

        match request.verify(app_key) {
            Ok(true) => {}
            Ok(false) | Err(_) => return Err(JoinError::InvalidMic(name)),
        }
        debug!(
            "Join request from {} (DevEUI {}, DevNonce {})",
            name,
            request.dev_eui,
            request.dev_nonce.value()
        );

        let (frame, dev_addr) = {
            let _join = entry.join_lock().lock().await;

            let mut nonce = [0u8; 3];
            self.random
                .fill(&mut nonce)
                .map_err(JoinError::KeyDerivationFailed)?;
            let join_nonce = JoinNonce::new(nonce);

            let mut low = [0u8; 2];
            self.random
                .fill(&mut low)
                .map_err(JoinError::KeyDerivationFailed)?;
            let dev_addr = DevAddr::new([DEV_ADDR_PREFIX[0], DEV_ADDR_PREFIX[1], low[0], low[1]]);

            let keys = derive_session_keys(app_key, join_nonce, self.net_id, request.dev_nonce)
                .map_err(JoinError::KeyDerivationFailed)?;

            let accept = JoinAccept {
                join_nonce,
                net_id: self.net_id,
                dev_addr,
                dl_settings: DL_SETTINGS,
                rx_delay: RX_DELAY_SECS,
            };
            let frame = accept
                .encode(app_key)
                .map_err(JoinError::KeyDerivationFailed)?;

            self.registry
                .apply_join_result(
                    &name,
                    Session {
                        dev_addr,
                        app_s_key: keys.app_s_key,
                        nwk_s_key: keys.nwk_s_key,
                    },
                )
                .map_err(|_| JoinError::NotOtaa(name.clone()))?;

            (frame, dev_addr)
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(JoinError::Cancelled),
            _ = tokio::time::sleep_until(received_at + self.rx2_delay) => {}
        }

        self.transmitter
            .transmit(self.downlink.frame(frame))
            .await
            .map_err(JoinError::RadioTransmitFailed)?;

        info!("Join accepted for {} (DevAddr {})", name, dev_addr);
        Ok(JoinAccepted {
            device: name,
            dev_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::lorawan::{AesKey, DevNonce};
    use crate::radio::{shared, RadioPort, RawPacket, TxFrame};
    use std::sync::Mutex;

    const APP_KEY: [u8; 16] = [0x2B; 16];

    fn dev_eui() -> Eui64 {
        Eui64::new([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x05, 0x1A, 0x2B])
    }

    struct RecordingRadio {
        sent: Arc<Mutex<Vec<TxFrame>>>,
        fail: bool,
    }

    impl RadioPort for RecordingRadio {
        fn initialize(&mut self, _device_index: u8) -> Result<(), RadioError> {
            Ok(())
        }

        fn poll(&mut self) -> Result<Option<RawPacket>, RadioError> {
            Ok(None)
        }

        fn transmit(&mut self, frame: &TxFrame) -> Result<(), RadioError> {
            if self.fail {
                return Err(RadioError::Hal {
                    op: "lgw_send",
                    code: -1,
                });
            }
            self.sent.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), RadioError> {
            Ok(())
        }
    }

    struct Counter(Mutex<u8>);

    impl RandomSource for Counter {
        fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
            let mut next = self.0.lock().unwrap();
            for b in dest.iter_mut() {
                *next = next.wrapping_add(1);
                *b = *next;
            }
            Ok(())
        }
    }

    struct NoEntropy;

    impl RandomSource for NoEntropy {
        fn fill(&self, _dest: &mut [u8]) -> Result<(), CryptoError> {
            Err(CryptoError::EntropyUnavailable)
        }
    }

    fn handler(fail: bool) -> (JoinHandler, Arc<DeviceRegistry>, Arc<Mutex<Vec<TxFrame>>>) {
        let registry = Arc::new(
            DeviceRegistry::new(vec![
                Device::otaa("soil", "decoders/soil.js", dev_eui(), AesKey::new(APP_KEY)),
                Device::abp(
                    "meter",
                    "decoders/meter.js",
                    DevAddr::new([0x26, 0, 0, 1]),
                    AesKey::new([3; 16]),
                    AesKey::new([4; 16]),
                )
                .with_dev_eui(Eui64::new([9; 8])),
            ])
            .unwrap(),
        );
        let sent = Arc::new(Mutex::new(Vec::new()));
        let radio = RecordingRadio {
            sent: sent.clone(),
            fail,
        };
        let handler = JoinHandler::new(
            registry.clone(),
            Transmitter::new(shared(radio)),
            Arc::new(Counter(Mutex::new(0))),
        )
        .with_rx2_delay(Duration::from_millis(20));
        (handler, registry, sent)
    }

    fn request(eui: Eui64, key: [u8; 16]) -> Vec<u8> {
        JoinRequest::build(Eui64::new([0; 8]), eui, DevNonce::new(0x0102), &AesKey::new(key))
            .unwrap()
    }

    // ==================== Join Tests ====================

    #[tokio::test]
    async fn test_join_commits_and_transmits() {
        let (handler, registry, sent) = handler(false);
        let cancel = CancellationToken::new();

        let accepted = handler
            .handle(&request(dev_eui(), APP_KEY), Instant::now(), &cancel)
            .await
            .unwrap();

        // Counter source: nonce 01 02 03, address low bytes 04 05.
        assert_eq!(accepted.dev_addr, DevAddr::new([1, 2, 4, 5]));
        let session = registry.session("soil").unwrap().unwrap();
        assert_eq!(session.dev_addr, accepted.dev_addr);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].invert_polarity);
        let accept = JoinAccept::decrypt(&sent[0].payload, &AesKey::new(APP_KEY)).unwrap();
        assert_eq!(accept.dev_addr, accepted.dev_addr);
        assert_eq!(accept.join_nonce, JoinNonce::new([1, 2, 3]));
        assert_eq!(accept.net_id, NET_ID);
        assert_eq!(accept.rx_delay, 1);
    }

    #[tokio::test]
    async fn test_session_keys_match_accept() {
        let (handler, registry, sent) = handler(false);
        handler
            .handle(&request(dev_eui(), APP_KEY), Instant::now(), &CancellationToken::new())
            .await
            .unwrap();

        let frame = sent.lock().unwrap()[0].payload.clone();
        let accept = JoinAccept::decrypt(&frame, &AesKey::new(APP_KEY)).unwrap();
        let keys = derive_session_keys(
            &AesKey::new(APP_KEY),
            accept.join_nonce,
            accept.net_id,
            DevNonce::new(0x0102),
        )
        .unwrap();

        let session = registry.session("soil").unwrap().unwrap();
        assert_eq!(session.app_s_key, keys.app_s_key);
        assert_eq!(session.nwk_s_key, keys.nwk_s_key);
    }

    #[tokio::test]
    async fn test_waits_for_rx2() {
        let (handler, _, sent) = handler(false);
        let handler = handler.with_rx2_delay(Duration::from_millis(150));
        let start = Instant::now();

        handler
            .handle(&request(dev_eui(), APP_KEY), start, &CancellationToken::new())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let (handler, registry, sent) = handler(false);
        let other = Eui64::new([0xAA; 8]);
        let err = handler
            .handle(&request(other, APP_KEY), Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, JoinError::UnknownDevice(other));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(registry.session("soil").unwrap(), None);
    }

    #[tokio::test]
    async fn test_bad_mic_leaves_session_untouched() {
        let (handler, registry, sent) = handler(false);
        let err = handler
            .handle(&request(dev_eui(), [0x99; 16]), Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, JoinError::InvalidMic("soil".into()));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(registry.session("soil").unwrap(), None);
    }

    #[tokio::test]
    async fn test_abp_device_cannot_join() {
        let (handler, _, _) = handler(false);
        let frame = request(Eui64::new([9; 8]), [3; 16]);
        let err = handler
            .handle(&frame, Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, JoinError::NotOtaa("meter".into()));
    }

    #[tokio::test]
    async fn test_short_frame() {
        let (handler, _, _) = handler(false);
        let err = handler
            .handle(&[0u8; 10], Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn test_transmit_failure_reported() {
        let (handler, _, _) = handler(true);
        let err = handler
            .handle(&request(dev_eui(), APP_KEY), Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::RadioTransmitFailed(_)));
    }

    #[tokio::test]
    async fn test_random_failure_reported() {
        let (handler, registry, sent) = handler(false);
        let handler = JoinHandler::new(
            registry.clone(),
            handler.transmitter.clone(),
            Arc::new(NoEntropy),
        );
        let err = handler
            .handle(&request(dev_eui(), APP_KEY), Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JoinError::KeyDerivationFailed(CryptoError::EntropyUnavailable)
        );
        assert_eq!(registry.session("soil").unwrap(), None);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_rx2_wait() {
        let (handler, _, sent) = handler(false);
        let handler = handler.with_rx2_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = handler
            .handle(&request(dev_eui(), APP_KEY), Instant::now(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, JoinError::Cancelled);
        assert!(sent.lock().unwrap().is_empty());
    }
}
