// Copyright 2026 LOKE Flasher Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Raw OS-level serial port enumeration. [`crate::locator`] layers the
//! Samsung VID/PID filtering (spec.md §4.1) on top of this.

use std::ffi::OsString;

#[cfg(target_os = "linux")]
mod list_linux;

/// Information about an available serial port, before any Samsung
/// filtering is applied.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub port: OsString,
    pub name: OsString,
    pub usb_info: Option<PortUsbInfo>,
}

impl PortInfo {
    /// List all serial ports the OS currently exposes.
    #[cfg(target_os = "linux")]
    pub fn list_all() -> Vec<PortInfo> {
        self::list_linux::list_all()
    }

    /// List all serial ports the OS currently exposes.
    ///
    /// On non-Linux targets this goes through `serialport`'s portable
    /// enumerator rather than hand-parsed OS device trees, since the
    /// teacher's `list_macos`/`list_windows` modules were never filled in
    /// and no pack example supplies a from-scratch sysfs-equivalent for
    /// those platforms.
    #[cfg(not(target_os = "linux"))]
    pub fn list_all() -> Vec<PortInfo> {
        let Ok(ports) = serialport::available_ports() else {
            return Vec::new();
        };

        ports
            .into_iter()
            .map(|p| {
                let usb_info = match p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => Some(PortUsbInfo {
                        num_if: 1,
                        vid: usb.vid,
                        pid: usb.pid,
                        serial: usb.serial_number,
                        manufacturer: usb.manufacturer,
                        product: usb.product,
                        interface: None,
                    }),
                    _ => None,
                };

                PortInfo {
                    port: OsString::from(&p.port_name),
                    name: OsString::from(&p.port_name),
                    usb_info,
                }
            })
            .collect()
    }
}

/// Information about USB serial ports.
#[derive(Debug, Clone)]
pub struct PortUsbInfo {
    /// Number of interfaces in this device.
    pub num_if: usize,
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
    /// Serial number string.
    pub serial: Option<String>,
    /// Device manufacturer.
    pub manufacturer: Option<String>,
    /// Device product description.
    pub product: Option<String>,
    /// Device product interface.
    pub interface: Option<String>,
}
