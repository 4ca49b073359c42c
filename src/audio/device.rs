//! Audio device resolution
//!
//! Selection never fails just because a preferred device is missing: an
//! explicit choice wins, then a known-good sound server device, then the
//! host default. Only a host with no device at all is an error.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::{Error, Result};

/// Sound-server devices that respect the desktop's routing
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse"];

/// Check if a device name belongs to a preferred sound server
#[must_use]
pub fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|pref| lower.contains(pref))
}

/// Pick a device position from enumerated names
///
/// An explicit `wanted` name matches exactly first, then case-insensitively as
/// a substring. Without a match the first preferred device is chosen.
#[must_use]
pub fn pick_device(names: &[String], wanted: Option<&str>) -> Option<usize> {
    if let Some(wanted) = wanted {
        let lower = wanted.to_lowercase();
        let found = names.iter().position(|n| n == wanted).or_else(|| {
            names
                .iter()
                .position(|n| n.to_lowercase().contains(&lower))
        });
        if found.is_some() {
            return found;
        }
        tracing::warn!(device = wanted, "configured audio device not found");
    }
    names.iter().position(|n| is_preferred_device(n))
}

fn named(devices: impl Iterator<Item = Device>) -> Vec<(String, Device)> {
    devices
        .map(|d| (d.name().unwrap_or_default(), d))
        .collect()
}

/// Resolve the capture device, falling back to the host default
///
/// # Errors
///
/// Returns `Error::Device` if the host has no input device at all
pub fn select_input_device(host: &Host, wanted: Option<&str>) -> Result<Device> {
    match host.input_devices() {
        Ok(devices) => {
            let mut devices = named(devices);
            let names: Vec<String> = devices.iter().map(|(n, _)| n.clone()).collect();
            if let Some(i) = pick_device(&names, wanted) {
                let (name, device) = devices.swap_remove(i);
                tracing::debug!(device = %name, "selected input device");
                return Ok(device);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate input devices, using default");
        }
    }

    host.default_input_device()
        .ok_or_else(|| Error::Device("no input device available".to_string()))
}

/// Resolve the playback device
///
/// A configured index takes priority, then a configured or preferred name,
/// then the host default.
///
/// # Errors
///
/// Returns `Error::Device` if the host has no output device at all
pub fn select_output_device(
    host: &Host,
    index: Option<usize>,
    wanted: Option<&str>,
) -> Result<Device> {
    match host.output_devices() {
        Ok(devices) => {
            let mut devices = named(devices);
            if let Some(index) = index {
                if index < devices.len() {
                    let (name, device) = devices.swap_remove(index);
                    tracing::debug!(index, device = %name, "using configured output device index");
                    return Ok(device);
                }
                tracing::warn!(index, available = devices.len(), "configured output device index out of range");
            }
            let names: Vec<String> = devices.iter().map(|(n, _)| n.clone()).collect();
            if let Some(i) = pick_device(&names, wanted) {
                let (name, device) = devices.swap_remove(i);
                tracing::debug!(device = %name, "selected output device");
                return Ok(device);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate output devices, using default");
        }
    }

    tracing::debug!("no preferred output device found, using system default");
    host.default_output_device()
        .ok_or_else(|| Error::Device("no output device available".to_string()))
}

/// List input device names, preferred devices marked `[recommended]`
///
/// # Errors
///
/// Returns `Error::Device` if enumeration fails
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| Error::Device(format!("failed to enumerate input devices: {e}")))?;
    Ok(describe(devices))
}

/// List output device names with their index, preferred devices marked `[recommended]`
///
/// # Errors
///
/// Returns `Error::Device` if enumeration fails
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Device(format!("failed to enumerate output devices: {e}")))?;
    Ok(describe(devices))
}

fn describe(devices: impl Iterator<Item = Device>) -> Vec<String> {
    devices
        .enumerate()
        .map(|(i, d)| {
            let name = d.name().unwrap_or_else(|_| "<unknown>".to_string());
            if is_preferred_device(&name) {
                format!("{i}: {name} [recommended]")
            } else {
                format!("{i}: {name}")
            }
        })
        .collect()
}
