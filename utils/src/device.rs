use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

use crate::backend::BackendError;

/// Name and default configuration of an audio endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub is_default: bool,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, " * {}({}ch, {}hz)", self.name, self.channels, self.sample_rate)?;
        if self.is_default {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}

fn get_host() -> cpal::Host {
    cpal::default_host()
}

fn unavailable(err: impl std::fmt::Display) -> BackendError {
    BackendError::Unavailable(err.to_string())
}

/// Finds the named input device, or the host default when `device_name` is `None`.
pub fn get_or_default_input(device_name: Option<&str>) -> Result<Device, BackendError> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    let Some(target) = device_name else {
        return host
            .default_input_device()
            .ok_or_else(|| BackendError::Unavailable("no default input device".into()));
    };
    host.input_devices()
        .map_err(unavailable)?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| BackendError::Unavailable(format!("input device {target:?} not found")))
}

/// Finds the named output device, or the host default when `device_name` is `None`.
pub fn get_or_default_output(device_name: Option<&str>) -> Result<Device, BackendError> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    let Some(target) = device_name else {
        return host
            .default_output_device()
            .ok_or_else(|| BackendError::Unavailable("no default output device".into()));
    };
    host.output_devices()
        .map_err(unavailable)?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| BackendError::Unavailable(format!("output device {target:?} not found")))
}

pub fn list_inputs() -> Result<Vec<DeviceInfo>, BackendError> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }
    let host = get_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let mut infos = Vec::new();
    for device in host.input_devices().map_err(unavailable)? {
        let Ok(name) = device.name() else { continue };
        let Ok(config) = device.default_input_config() else {
            tracing::debug!("skipping input {name}: no default config");
            continue;
        };
        infos.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels: config.channels(),
            sample_rate: config.sample_rate().0,
        });
    }
    Ok(infos)
}

pub fn list_outputs() -> Result<Vec<DeviceInfo>, BackendError> {
    let host = get_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut infos = Vec::new();
    for device in host.output_devices().map_err(unavailable)? {
        let Ok(name) = device.name() else { continue };
        let Ok(config) = device.default_output_config() else {
            tracing::debug!("skipping output {name}: no default config");
            continue;
        };
        infos.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels: config.channels(),
            sample_rate: config.sample_rate().0,
        });
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_display_marks_default() {
        let info = DeviceInfo {
            name: "Built-in Mic".into(),
            channels: 2,
            sample_rate: 48_000,
            is_default: true,
        };
        assert_eq!(info.to_string(), " * Built-in Mic(2ch, 48000hz) [default]");

        let info = DeviceInfo {
            is_default: false,
            ..info
        };
        assert_eq!(info.to_string(), " * Built-in Mic(2ch, 48000hz)");
    }
}
