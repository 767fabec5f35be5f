//! List available serial ports.

use anyhow::Result;
use cuvelink::{NativePortEnumerator, PortEnumerator, PortInfo};

/// One table row: name, USB identity, product string.
fn format_row(port: &PortInfo) -> String {
    let usb = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!("{vid:04X}:{pid:04X}"),
        _ => "-".to_string(),
    };

    let product = port
        .product
        .as_deref()
        .or(port.manufacturer.as_deref())
        .unwrap_or("-");

    format!("{:<24} {usb:<9} {product}", port.name)
}

pub(crate) fn run() -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if ports.is_empty() {
        eprintln!("No serial ports found");
        return Ok(());
    }

    for port in &ports {
        println!("{}", format_row(port));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    #[test]
    fn test_format_row_full_info() {
        let mut info = port("/dev/ttyUSB0");
        info.vid = Some(0x0403);
        info.pid = Some(0x6001);
        info.product = Some("FT232R USB UART".to_string());

        let row = format_row(&info);
        assert!(row.starts_with("/dev/ttyUSB0"));
        assert!(row.contains("0403:6001"));
        assert!(row.contains("FT232R USB UART"));
    }

    #[test]
    fn test_format_row_bare_port() {
        let row = format_row(&port("/dev/ttyS0"));
        assert!(row.starts_with("/dev/ttyS0"));
        // No USB identity and no product string.
        assert!(row.contains(" - "));
        assert!(row.trim_end().ends_with('-'));
    }

    #[test]
    fn test_format_row_falls_back_to_manufacturer() {
        let mut info = port("COM5");
        info.manufacturer = Some("Silicon Labs".to_string());

        let row = format_row(&info);
        assert!(row.contains("Silicon Labs"));
    }
}
