//! `list-ports` command implementation.

use {
    crate::use_fancy_output,
    anyhow::Result,
    console::style,
    ideaflash::{DetectedPort, auto_detect_port, discover_ports, format_port_list},
};

/// List serial ports, as JSON on stdout or as a styled list on stderr.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = discover_ports();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports_json(&detected))?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    if use_fancy_output() {
        for port in &detected {
            eprintln!("  {} {}", style("•").green(), styled_port(port));
        }
    } else {
        for line in format_port_list(&detected) {
            eprintln!("  {line}");
        }
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→")
                .green()
                .bold(),
            style(&auto_port.name)
                .cyan()
                .bold()
        );
    }
    Ok(())
}

fn styled_port(port: &DetectedPort) -> String {
    let device_type = if port
        .device
        .is_known()
    {
        format!(
            " [{}]",
            style(
                port.device
                    .name()
            )
            .yellow()
        )
    } else {
        String::new()
    };
    let vid_pid = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_deref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{device_type}{vid_pid}{product}", style(&port.name).cyan())
}

fn ports_json(ports: &[DetectedPort]) -> Vec<serde_json::Value> {
    ports
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "device": p.device.name(),
                "known": p.device.is_known(),
                "vid": p.vid,
                "pid": p.pid,
                "manufacturer": p.manufacturer,
                "product": p.product,
                "serial": p.serial,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {super::*, ideaflash::DeviceKind};

    #[test]
    fn test_ports_json_fields() {
        let port = DetectedPort {
            device: DeviceKind::Cp210x,
            vid: Some(0x10C4),
            pid: Some(0xEA60),
            product: Some("CP2102N".to_string()),
            ..DetectedPort::named("/dev/ttyUSB0")
        };
        let json = ports_json(&[port]);
        assert_eq!(json[0]["name"], "/dev/ttyUSB0");
        assert_eq!(json[0]["known"], true);
        assert_eq!(json[0]["vid"], 0x10C4);
        assert!(json[0]["serial"].is_null());
    }

    #[test]
    fn test_list_ports_json_reports_success() {
        assert!(cmd_list_ports(true).is_ok());
    }

    #[test]
    fn test_styled_port_plain_text() {
        console::set_colors_enabled(false);
        let port = DetectedPort {
            vid: Some(0xABCD),
            pid: Some(0x0001),
            ..DetectedPort::named("COM7")
        };
        assert_eq!(
            console::strip_ansi_codes(&styled_port(&port)),
            "COM7 (ABCD:0001)"
        );
    }
}
