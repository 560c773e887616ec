//! Enumeration of the serial devices present on this machine.

use super::error::PortError;
use super::traits::{PortInfo, PortKind};
use serialport::SerialPortType;

/// List the serial ports currently visible to the operating system.
///
/// Results are sorted by name so repeated listings are stable.
pub fn list_ports() -> Result<Vec<PortInfo>, PortError> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(|p| describe(p.port_name, &p.port_type))
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}

fn describe(name: String, port_type: &SerialPortType) -> PortInfo {
    match port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            name,
            kind: PortKind::Usb,
            vid: Some(usb.vid),
            pid: Some(usb.pid),
            manufacturer: usb.manufacturer.clone(),
            product: usb.product.clone(),
        },
        SerialPortType::PciPort => PortInfo {
            kind: PortKind::Pci,
            ..PortInfo::plain(name)
        },
        SerialPortType::BluetoothPort => PortInfo {
            kind: PortKind::Bluetooth,
            ..PortInfo::plain(name)
        },
        SerialPortType::Unknown => PortInfo::plain(name),
    }
}
