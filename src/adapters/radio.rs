//! ESP-NOW radio adapter.
//!
//! Implements [`Radio`] over ESP-NOW unicast. Wi-Fi is started in station
//! mode without connecting, which is all ESP-NOW needs. Inbound frames go
//! to one callback registered with [`EspNowRadio::on_receive`]; it runs in
//! the Wi-Fi task and must only do non-blocking hand-offs.
//!
//! The simulation backend records outbound frames and lets tests inject
//! inbound ones.

use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use crate::app::ports::{Radio, RadioError};
use crate::transport::MacAddr;

#[cfg(target_os = "espidf")]
use esp_idf_svc::espnow::{EspNow, PeerInfo};
#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::EspSystemEventLoop;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::modem::Modem;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};

#[cfg(not(target_os = "espidf"))]
type RecvCallback = Box<dyn FnMut(&MacAddr, &[u8]) + Send>;

pub struct EspNowRadio {
    #[cfg(target_os = "espidf")]
    _wifi: Mutex<EspWifi<'static>>,
    #[cfg(target_os = "espidf")]
    espnow: Mutex<EspNow<'static>>,

    #[cfg(not(target_os = "espidf"))]
    sent: Mutex<Vec<(MacAddr, Vec<u8>)>>,
    #[cfg(not(target_os = "espidf"))]
    callback: Mutex<Option<RecvCallback>>,
}

#[cfg(target_os = "espidf")]
impl EspNowRadio {
    /// Bring up Wi-Fi (STA, unconnected) and ESP-NOW, and register `peer`.
    pub fn start(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        peer: MacAddr,
    ) -> Result<Self, RadioError> {
        let mut wifi = EspWifi::new(modem, sysloop, None).map_err(|e| {
            warn!("Radio: wifi init failed ({})", e);
            RadioError::NotInitialised
        })?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))
            .and_then(|()| wifi.start())
            .map_err(|e| {
                warn!("Radio: wifi start failed ({})", e);
                RadioError::NotInitialised
            })?;

        let espnow = EspNow::take().map_err(|e| {
            warn!("Radio: ESP-NOW init failed ({})", e);
            RadioError::NotInitialised
        })?;
        espnow
            .add_peer(PeerInfo {
                peer_addr: peer,
                channel: 0,
                encrypt: false,
                ..Default::default()
            })
            .map_err(|e| {
                warn!("Radio: add peer failed ({})", e);
                RadioError::UnknownPeer
            })?;
        info!("Radio: ESP-NOW up, peer {:02X?}", peer);

        Ok(Self {
            _wifi: Mutex::new(wifi),
            espnow: Mutex::new(espnow),
        })
    }

    /// Register the receive callback. Call once.
    pub fn on_receive(
        &self,
        mut callback: impl FnMut(&MacAddr, &[u8]) + Send + 'static,
    ) -> Result<(), RadioError> {
        let espnow = self.espnow.lock().unwrap_or_else(PoisonError::into_inner);
        espnow
            .register_recv_cb(move |info: &esp_idf_svc::espnow::ReceiveInfo, data: &[u8]| {
                callback(info.src_addr, data);
            })
            .map_err(|_| RadioError::NotInitialised)
    }
}

#[cfg(target_os = "espidf")]
impl Radio for EspNowRadio {
    fn send(&self, peer: &MacAddr, bytes: &[u8]) -> Result<(), RadioError> {
        let espnow = self.espnow.lock().unwrap_or_else(PoisonError::into_inner);
        espnow.send(*peer, bytes).map_err(|e| {
            warn!("Radio: send failed ({})", e);
            RadioError::SendFailed
        })
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for EspNowRadio {
    fn default() -> Self {
        Self::simulated()
    }
}

#[cfg(not(target_os = "espidf"))]
impl EspNowRadio {
    pub fn simulated() -> Self {
        info!("Radio: simulation backend");
        Self {
            sent: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
        }
    }

    pub fn on_receive(
        &self,
        callback: impl FnMut(&MacAddr, &[u8]) + Send + 'static,
    ) -> Result<(), RadioError> {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
        Ok(())
    }

    /// Deliver `bytes` from `from` as if it arrived over the air.
    pub fn inject(&self, from: &MacAddr, bytes: &[u8]) {
        let mut cb = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        match cb.as_mut() {
            Some(f) => f(from, bytes),
            None => warn!("Radio: frame dropped, no receive callback"),
        }
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<(MacAddr, Vec<u8>)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Radio for EspNowRadio {
    fn send(&self, peer: &MacAddr, bytes: &[u8]) -> Result<(), RadioError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((*peer, bytes.to_vec()));
        Ok(())
    }
}
