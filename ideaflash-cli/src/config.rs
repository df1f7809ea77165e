//! Configuration file support for ideaflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (IDEAFLASH_*)
//! 3. Local config file (./ideaflash.toml)
//! 4. Global config file (~/.config/ideaflash/config.toml)

use {
    directories::ProjectDirs,
    ideaflash::session::{DEFAULT_FLASH_OFFSET, DEFAULT_SETTLE_DELAY},
    log::{debug, info, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "ideaflash.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Known USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Directory firmware identifiers are resolved against.
    pub firmware_dir: Option<PathBuf>,
    /// Flash offset the image is written to.
    pub offset: Option<u32>,
    /// Pulse reset after programming.
    pub soft_reset: Option<bool>,
    /// Delay after closing the port, in milliseconds (at least 1500).
    pub settle_ms: Option<u64>,
}

impl FlashConfig {
    /// Configured firmware directory, or the working directory.
    pub fn firmware_dir(&self) -> PathBuf {
        self.firmware_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Configured offset or the default.
    pub fn offset(&self) -> u32 {
        self.offset
            .unwrap_or(DEFAULT_FLASH_OFFSET)
    }

    /// Whether to reset after programming (on unless disabled).
    pub fn soft_reset(&self) -> bool {
        self.soft_reset
            .unwrap_or(true)
    }

    /// Post-close settle delay, never shorter than the default.
    pub fn settle_delay(&self) -> Duration {
        self.settle_ms
            .map_or(DEFAULT_SETTLE_DELAY, Duration::from_millis)
            .max(DEFAULT_SETTLE_DELAY)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ideaflash").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        let connection = &mut self
            .port
            .connection;
        if other
            .port
            .connection
            .serial
            .is_some()
        {
            connection.serial = other
                .port
                .connection
                .serial;
        }
        if other
            .port
            .connection
            .baud
            .is_some()
        {
            connection.baud = other
                .port
                .connection
                .baud;
        }
        for device in other
            .port
            .usb_device
        {
            if !self
                .port
                .usb_device
                .contains(&device)
            {
                self.port
                    .usb_device
                    .push(device);
            }
        }

        let flash = &mut self.flash;
        if other
            .flash
            .firmware_dir
            .is_some()
        {
            flash.firmware_dir = other
                .flash
                .firmware_dir;
        }
        if other
            .flash
            .offset
            .is_some()
        {
            flash.offset = other
                .flash
                .offset;
        }
        if other
            .flash
            .soft_reset
            .is_some()
        {
            flash.soft_reset = other
                .flash
                .soft_reset;
        }
        if other
            .flash
            .settle_ms
            .is_some()
        {
            flash.settle_ms = other
                .flash
                .settle_ms;
        }
    }

    /// Save USB device for future auto-detection.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };

        if self
            .port
            .usb_device
            .contains(&device)
        {
            return Ok(());
        }

        // Prefer the local file when the project already has one
        let path = if Path::new(LOCAL_CONFIG_FILE).exists() {
            PathBuf::from(LOCAL_CONFIG_FILE)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from(LOCAL_CONFIG_FILE)
        };

        let mut on_disk = Self::load_from_file(&path).unwrap_or_default();
        on_disk
            .port
            .usb_device
            .push(device.clone());
        self.port
            .usb_device
            .push(device);

        let content = toml::to_string_pretty(&on_disk)?;
        fs::write(&path, content)?;
        info!("Saved USB device to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.port.connection.serial.is_none());
        assert!(config.port.connection.baud.is_none());
        assert!(config.port.usb_device.is_empty());
        assert_eq!(config.flash.firmware_dir(), PathBuf::from("."));
        assert_eq!(config.flash.offset(), 0);
        assert!(config.flash.soft_reset());
        assert_eq!(config.flash.settle_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn test_usb_device_matches() {
        let device = UsbDevice {
            vid: 0x1A86,
            pid: 0x7523,
        };
        assert!(device.matches(0x1A86, 0x7523));
        assert!(!device.matches(0x1A86, 0x7522));
        assert!(!device.matches(0x10C4, 0x7523));
    }

    #[test]
    fn test_config_merge_overrides_set_fields() {
        let mut base = Config::default();
        base.port.connection.baud = Some(115200);
        base.flash.offset = Some(0x1000);

        let mut other = Config::default();
        other.port.connection.serial = Some("/dev/ttyUSB0".to_string());
        other.port.connection.baud = Some(921600);
        other.flash.soft_reset = Some(false);

        base.merge(other);

        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.port.connection.baud, Some(921600));
        assert_eq!(base.flash.offset(), 0x1000);
        assert!(!base.flash.soft_reset());
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.port.connection.serial = Some("/dev/ttyUSB0".to_string());
        base.flash.settle_ms = Some(2000);

        base.merge(Config::default());

        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.flash.settle_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn test_config_merge_usb_devices_dedup() {
        let mut base = Config::default();
        base.port.usb_device.push(UsbDevice { vid: 0x1A86, pid: 0x7523 });

        let mut other = Config::default();
        other.port.usb_device.push(UsbDevice { vid: 0x1A86, pid: 0x7523 });
        other.port.usb_device.push(UsbDevice { vid: 0x10C4, pid: 0xEA60 });

        base.merge(other);
        assert_eq!(base.port.usb_device.len(), 2);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[port.connection]
serial = "/dev/ttyUSB0"
baud = 460800

[[port.usb_device]]
vid = 4292
pid = 60000

[flash]
firmware_dir = "/opt/ideaboard"
offset = 65536
soft_reset = false
settle_ms = 2500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.port.connection.baud, Some(460800));
        assert_eq!(config.port.usb_device, vec![UsbDevice { vid: 0x10C4, pid: 0xEA60 }]);
        assert_eq!(config.flash.firmware_dir(), PathBuf::from("/opt/ideaboard"));
        assert_eq!(config.flash.offset(), 0x10000);
        assert!(!config.flash.soft_reset());
        assert_eq!(config.flash.settle_delay(), Duration::from_millis(2500));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.port.connection.serial.is_none());
        assert!(config.flash.firmware_dir.is_none());
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[port.connection]
serial = "/dev/ttyUSB1"
[flash]
settle_ms = 0
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.flash.settle_delay(), DEFAULT_SETTLE_DELAY);
    }

    #[test]
    fn test_settle_delay_has_a_floor() {
        let mut flash = FlashConfig::default();
        assert_eq!(flash.settle_delay(), Duration::from_millis(1500));

        flash.settle_ms = Some(10);
        assert_eq!(flash.settle_delay(), Duration::from_millis(1500));

        flash.settle_ms = Some(3000);
        assert_eq!(flash.settle_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_load_from_path_invalid_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[flash\noffset = ").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.flash.offset.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.port.connection.serial.is_none());
    }

    #[test]
    fn test_global_config_path_shape() {
        if let Some(p) = Config::global_config_path() {
            let s = p.to_string_lossy();
            assert!(s.contains("ideaflash"));
            assert!(s.ends_with("config.toml"));
        }
    }
}
