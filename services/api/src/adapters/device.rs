//! services/api/src/adapters/device.rs
//!
//! In the browser deployment the device readings are taken client-side and sent
//! along with the request. These adapters present those submitted readings
//! through the `LocationProvider` and `PhotoCapture` ports.

use async_trait::async_trait;
use presensi_core::domain::{Coordinate, PhotoRef};
use presensi_core::ports::{DeviceError, LocationProvider, PhotoCapture};

/// A position reported by the client, if it managed to get one.
#[derive(Clone, Debug)]
pub struct SubmittedLocation(Option<Coordinate>);

impl SubmittedLocation {
    pub fn new(location: Option<Coordinate>) -> Self {
        Self(location)
    }
}

#[async_trait]
impl LocationProvider for SubmittedLocation {
    async fn current_location(&self) -> Result<Coordinate, DeviceError> {
        self.0.ok_or_else(|| {
            DeviceError::LocationUnavailable("no location was submitted".to_string())
        })
    }
}

/// A photo reported by the client. Empty payloads count as missing.
#[derive(Clone, Debug)]
pub struct SubmittedPhoto(Option<String>);

impl SubmittedPhoto {
    pub fn new(photo: Option<String>) -> Self {
        Self(photo.filter(|p| !p.trim().is_empty()))
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

#[async_trait]
impl PhotoCapture for SubmittedPhoto {
    async fn capture(&self) -> Result<PhotoRef, DeviceError> {
        self.0
            .clone()
            .map(PhotoRef)
            .ok_or_else(|| DeviceError::CameraUnavailable("a photo is required".to_string()))
    }
}
