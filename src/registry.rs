// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Route ISO SELECT frames to registered applets and forward traffic to the active one.
// Author: Lukas Bower

//! Applet registry.
//!
//! An ISO `SELECT` by DF name activates the applet whose AID matches the
//! payload; every other frame goes to the active applet. With no applet
//! active, frames are refused with `6999`.

use std::sync::Mutex;

use desfire_codec::{CommandApdu, ResponseApdu, StatusWord};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::processor::Processor;

/// AID of the DESFire card applet.
pub const CARD_APPLET_AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x00];

/// Frame handler selectable by AID.
pub trait Applet: Send {
    /// Identifier matched against SELECT payloads.
    fn aid(&self) -> &[u8];
    /// Called when the applet becomes active.
    fn select(&mut self) {}
    /// Called when another applet takes over.
    fn deselect(&mut self) {}
    /// Process one frame while active.
    fn process(&mut self, frame: &[u8]) -> Vec<u8>;
}

impl Applet for Processor {
    fn aid(&self) -> &[u8] {
        &CARD_APPLET_AID
    }

    fn select(&mut self) {
        self.reset_session();
    }

    fn deselect(&mut self) {
        self.reset_session();
    }

    fn process(&mut self, frame: &[u8]) -> Vec<u8> {
        Processor::process(self, frame)
    }
}

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The global registry mutex was poisoned.
    #[error("applet registry lock poisoned")]
    LockPoisoned,
    /// An applet with this AID is already registered.
    #[error("applet {0} already registered")]
    DuplicateAid(String),
}

type RegistryResult<T> = Result<T, RegistryError>;

/// Set of applets with at most one active.
#[derive(Default)]
pub struct AppletRegistry {
    applets: Vec<Box<dyn Applet>>,
    active: Option<usize>,
}

impl core::fmt::Debug for AppletRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let aids: Vec<String> = self.applets.iter().map(|a| hex::encode_upper(a.aid())).collect();
        f.debug_struct("AppletRegistry")
            .field("applets", &aids)
            .field("active", &self.active)
            .finish()
    }
}

impl AppletRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an applet; AIDs must be unique.
    pub fn register(&mut self, applet: Box<dyn Applet>) -> RegistryResult<()> {
        let aid = hex::encode_upper(applet.aid());
        if self.applets.iter().any(|known| known.aid() == applet.aid()) {
            return Err(RegistryError::DuplicateAid(aid));
        }
        self.applets.push(applet);
        info!("applet {aid} registered");
        Ok(())
    }

    /// AID of the active applet.
    #[must_use]
    pub fn active_aid(&self) -> Option<&[u8]> {
        self.active.map(|index| self.applets[index].aid())
    }

    /// Route one frame.
    pub fn transmit(&mut self, frame: &[u8]) -> Vec<u8> {
        if let Ok(apdu) = CommandApdu::parse(frame) {
            if apdu.is_select_by_name() {
                return self.select(&apdu.data).encode();
            }
        }
        match self.active {
            Some(index) => self.applets[index].process(frame),
            None => {
                debug!("frame refused, no applet selected");
                ResponseApdu::status_only(StatusWord::APPLET_SELECT_FAILED).encode()
            }
        }
    }

    fn select(&mut self, aid: &[u8]) -> ResponseApdu {
        if let Some(previous) = self.active.take() {
            self.applets[previous].deselect();
        }
        match self.applets.iter().position(|applet| applet.aid() == aid) {
            Some(index) => {
                self.applets[index].select();
                self.active = Some(index);
                info!("applet {} selected", hex::encode_upper(aid));
                ResponseApdu::status_only(StatusWord::ISO_OK)
            }
            None => {
                warn!("no applet for aid {}", hex::encode_upper(aid));
                ResponseApdu::status_only(StatusWord::APPLET_SELECT_FAILED)
            }
        }
    }

    /// Drop every applet.
    pub fn clear(&mut self) {
        if let Some(previous) = self.active.take() {
            self.applets[previous].deselect();
        }
        self.applets.clear();
    }
}

static REGISTRY: Lazy<Mutex<AppletRegistry>> = Lazy::new(|| Mutex::new(AppletRegistry::new()));

/// Process-wide registry shared by transport front ends.
pub struct GlobalRegistry;

impl GlobalRegistry {
    /// Register an applet globally.
    pub fn register(applet: Box<dyn Applet>) -> RegistryResult<()> {
        REGISTRY
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?
            .register(applet)
    }

    /// Route one frame through the global registry.
    pub fn transmit(frame: &[u8]) -> RegistryResult<Vec<u8>> {
        Ok(REGISTRY
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?
            .transmit(frame))
    }

    /// AID of the globally active applet.
    pub fn active_aid() -> RegistryResult<Option<Vec<u8>>> {
        Ok(REGISTRY
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?
            .active_aid()
            .map(<[u8]>::to_vec))
    }

    /// Remove every applet. Only used in tests.
    pub fn reset() -> RegistryResult<()> {
        REGISTRY
            .lock()
            .map_err(|_| RegistryError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

/// Clears the global registry on creation and drop.
pub struct TestRegistryGuard;

impl TestRegistryGuard {
    /// Start from an empty global registry.
    #[must_use]
    pub fn new() -> Self {
        let _ = GlobalRegistry::reset();
        TestRegistryGuard
    }
}

impl Default for TestRegistryGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRegistryGuard {
    fn drop(&mut self) {
        let _ = GlobalRegistry::reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;

    struct Echo;

    impl Applet for Echo {
        fn aid(&self) -> &[u8] {
            &[0xA0, 0x00, 0x01]
        }

        fn process(&mut self, frame: &[u8]) -> Vec<u8> {
            let mut out = frame.to_vec();
            out.extend_from_slice(&[0x90, 0x00]);
            out
        }
    }

    fn select(aid: &[u8]) -> Vec<u8> {
        CommandApdu::select_by_name(aid).encode().expect("encode")
    }

    #[test]
    fn routes_to_selected_applet() {
        let mut registry = AppletRegistry::new();
        registry
            .register(Box::new(Processor::with_seed(Card::default(), 3)))
            .expect("card");
        registry.register(Box::new(Echo)).expect("echo");
        assert!(matches!(
            registry.register(Box::new(Echo)),
            Err(RegistryError::DuplicateAid(_))
        ));

        assert_eq!(registry.transmit(&[0x90, 0x6E, 0, 0, 0]), vec![0x69, 0x99]);
        assert_eq!(registry.transmit(&select(&CARD_APPLET_AID)), vec![0x90, 0x00]);
        assert_eq!(
            registry.transmit(&[0x90, 0x6E, 0, 0, 0]),
            vec![0x00, 0x20, 0x00, 0x91, 0x00]
        );
        assert_eq!(registry.transmit(&select(&[0xA0, 0x00, 0x01])), vec![0x90, 0x00]);
        assert_eq!(registry.transmit(&[1, 2, 3, 4, 5]), vec![1, 2, 3, 4, 5, 0x90, 0x00]);
        assert_eq!(registry.transmit(&select(&[0xFF])), vec![0x69, 0x99]);
        assert_eq!(registry.active_aid(), None);
    }
}
