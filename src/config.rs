use anyhow::Context;
use std::path::PathBuf;

use crate::qr::{EncodeOptions, Rgb, MAX_EDGE};

pub const DEFAULT_STORAGE_KEY: &str = "emergency-network-users";

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub fps: u32,
    pub camera_allowed: bool, // false refuses every camera acquisition
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            camera_allowed: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub qr: EncodeOptions,
    pub export_dir: Option<PathBuf>, // registrations also drop their QR png here
    pub scan: ScanConfig,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_color(name: &str, default: Rgb) -> anyhow::Result<Rgb> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<Rgb>()
            .with_context(|| format!("{} is not a #RRGGBB color: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = EncodeOptions::default();
        let qr = EncodeOptions {
            size: env_or("QR_SIZE", defaults.size),
            margin: env_or("QR_MARGIN", defaults.margin),
            foreground: env_color("QR_FOREGROUND", defaults.foreground)?,
            background: env_color("QR_BACKGROUND", defaults.background)?,
        };
        anyhow::ensure!(
            qr.size <= MAX_EDGE && qr.margin <= MAX_EDGE / 2,
            "QR_SIZE must be at most {} and QR_MARGIN at most {}",
            MAX_EDGE,
            MAX_EDGE / 2
        );
        let scan_defaults = ScanConfig::default();
        let scan = ScanConfig {
            fps: env_or("SCAN_FPS", scan_defaults.fps).max(1),
            camera_allowed: env_or("SCAN_CAMERA_ALLOWED", scan_defaults.camera_allowed),
        };
        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env_or("APP_PORT", 8080),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            storage_key: std::env::var("STORAGE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.into()),
            qr,
            export_dir: std::env::var("QR_EXPORT_DIR").ok().map(PathBuf::from),
            scan,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
