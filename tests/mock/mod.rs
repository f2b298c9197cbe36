//! Test doubles for gateway integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sx1302_gateway::lorawan::{
    crypt_frm_payload, AesKey, CryptoError, DevAddr, DevNonce, Direction, Eui64, JoinRequest,
};
use sx1302_gateway::radio::{shared, RadioError, RadioPort, RawPacket, SharedRadio, TxFrame};
use sx1302_gateway::{Device, DeviceRegistry, RandomSource};

pub const APP_KEY: [u8; 16] = [
    0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF, 0x4F, 0x3C,
];

/// DevEUI as printed on the label (big-endian).
pub const DEV_EUI: Eui64 = Eui64::new([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x05, 0x1A, 0x2B]);

/// Second OTAA device with its own key.
pub const APP_KEY_2: [u8; 16] = [
    0x60, 0x3D, 0xEB, 0x10, 0x15, 0xCA, 0x71, 0xBE, 0x2B, 0x73, 0xAE, 0xF0, 0x85, 0x7D, 0x77, 0x81,
];
pub const DEV_EUI_2: Eui64 = Eui64::new([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x05, 0x1A, 0x3C]);

pub const JOIN_EUI: Eui64 = Eui64::new([0; 8]);

pub const ABP_ADDR: DevAddr = DevAddr::new([0x26, 0x01, 0x1F, 0x2A]);
pub const ABP_APP_S_KEY: [u8; 16] = [0x0A; 16];
pub const ABP_NWK_S_KEY: [u8; 16] = [0x0B; 16];

/// A transmission seen by the mock radio.
#[derive(Debug, Clone)]
pub struct Sent {
    pub frame: TxFrame,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    rx: VecDeque<Result<RawPacket, RadioError>>,
    sent: Vec<Sent>,
    initialized: Option<u8>,
    shutdown: bool,
    fail_init: bool,
    fail_transmit: bool,
    transmit_time: Duration,
}

/// Radio double. Clones share state, so a test keeps one handle after
/// passing another to the gateway.
#[derive(Clone, Default)]
pub struct MockRadio {
    state: Arc<Mutex<State>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> SharedRadio {
        shared(self.clone())
    }

    pub fn fail_init(&self) {
        self.state.lock().unwrap().fail_init = true;
    }

    pub fn fail_transmit(&self) {
        self.state.lock().unwrap().fail_transmit = true;
    }

    /// Make each transmission hold the radio for `d`.
    pub fn set_transmit_time(&self, d: Duration) {
        self.state.lock().unwrap().transmit_time = d;
    }

    /// Queue a packet for the next poll.
    pub fn receive(&self, payload: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .rx
            .push_back(Ok(RawPacket::new(payload)));
    }

    /// Queue a poll error.
    pub fn receive_error(&self) {
        self.state.lock().unwrap().rx.push_back(Err(RadioError::Hal {
            op: "lgw_receive",
            code: -1,
        }));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn initialized(&self) -> Option<u8> {
        self.state.lock().unwrap().initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }
}

impl RadioPort for MockRadio {
    fn initialize(&mut self, device_index: u8) -> Result<(), RadioError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_init {
            return Err(RadioError::Hal {
                op: "setUpGateway",
                code: -1,
            });
        }
        state.initialized = Some(device_index);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<RawPacket>, RadioError> {
        let mut state = self.state.lock().unwrap();
        if state.initialized.is_none() || state.shutdown {
            return Err(RadioError::NotStarted);
        }
        state.rx.pop_front().transpose()
    }

    fn transmit(&mut self, frame: &TxFrame) -> Result<(), RadioError> {
        let (fail, hold) = {
            let state = self.state.lock().unwrap();
            (state.fail_transmit, state.transmit_time)
        };
        if fail {
            return Err(RadioError::Hal {
                op: "lgw_send",
                code: -1,
            });
        }
        std::thread::sleep(hold);
        self.state.lock().unwrap().sent.push(Sent {
            frame: frame.clone(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), RadioError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}

/// Random source returning an incrementing byte sequence.
#[derive(Default)]
pub struct SequenceRandom(Mutex<u8>);

impl RandomSource for SequenceRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        let mut next = self.0.lock().unwrap();
        for b in dest.iter_mut() {
            *next = next.wrapping_add(1);
            *b = *next;
        }
        Ok(())
    }
}

/// Two OTAA devices ("soil", "air") and one ABP device ("meter").
pub fn registry() -> DeviceRegistry {
    DeviceRegistry::new(vec![
        Device::otaa("soil", "decoders/soil.js", DEV_EUI, AesKey::new(APP_KEY)),
        Device::otaa("air", "decoders/air.js", DEV_EUI_2, AesKey::new(APP_KEY_2)),
        Device::abp(
            "meter",
            "decoders/meter.js",
            ABP_ADDR,
            AesKey::new(ABP_APP_S_KEY),
            AesKey::new(ABP_NWK_S_KEY),
        ),
    ])
    .unwrap()
}

pub fn join_request(dev_eui: Eui64, dev_nonce: u16, app_key: [u8; 16]) -> Vec<u8> {
    JoinRequest::build(JOIN_EUI, dev_eui, DevNonce::new(dev_nonce), &AesKey::new(app_key)).unwrap()
}

/// Unconfirmed data uplink with an encrypted FRMPayload and a zero MIC.
pub fn data_uplink(addr: DevAddr, f_cnt: u16, f_port: u8, key: &AesKey, plain: &[u8]) -> Vec<u8> {
    let enc = crypt_frm_payload(key, addr, f_cnt as u32, Direction::Uplink, plain).unwrap();
    let mut frame = vec![0x40];
    frame.extend_from_slice(&addr.to_wire());
    frame.push(0x00);
    frame.extend_from_slice(&f_cnt.to_le_bytes());
    frame.push(f_port);
    frame.extend_from_slice(&enc);
    frame.extend_from_slice(&[0; 4]);
    frame
}

/// Poll `cond` until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
