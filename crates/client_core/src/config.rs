use std::{fs, path::Path, time::Duration};

use scanner_integration::{CameraPreference, DecodeOptions, DEFAULT_FPS, DEFAULT_QRBOX};
use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "checkin.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub camera: CameraPreference,
    pub fps: u32,
    pub qrbox: u32,
    /// How long the loading indicator stays up after a start attempt.
    pub loading_grace_ms: u64,
    /// Pause between releasing the camera and acquiring it again.
    pub restart_delay_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            camera: CameraPreference::Environment,
            fps: DEFAULT_FPS,
            qrbox: DEFAULT_QRBOX,
            loading_grace_ms: 1200,
            restart_delay_ms: 1000,
        }
    }
}

impl ScannerSettings {
    /// Settings with no artificial waits, for headless runs and tests.
    pub fn immediate() -> Self {
        Self {
            loading_grace_ms: 0,
            restart_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            fps: self.fps.max(1),
            qrbox: self.qrbox,
        }
    }

    pub fn loading_grace(&self) -> Duration {
        Duration::from_millis(self.loading_grace_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
    pub scanner: ScannerSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:10000".into(),
            scanner: ScannerSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn from_sources(file_contents: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = match file_contents.map(toml::from_str::<ClientSettings>) {
            Some(Ok(parsed)) => parsed,
            Some(Err(error)) => {
                warn!(%error, "ignoring unreadable {SETTINGS_FILE}");
                ClientSettings::default()
            }
            None => ClientSettings::default(),
        };

        if let Some(v) = env("CHECKIN_SERVER_URL") {
            settings.server_url = v;
        }
        if let Some(v) = env("APP__SERVER_URL") {
            settings.server_url = v;
        }
        if let Some(v) = env("APP__SCANNER_FPS").and_then(|v| v.trim().parse().ok()) {
            settings.scanner.fps = v;
        }
        if let Some(v) = env("APP__SCANNER_QRBOX").and_then(|v| v.trim().parse().ok()) {
            settings.scanner.qrbox = v;
        }

        settings
    }

    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(SETTINGS_FILE));
        let raw = fs::read_to_string(path).ok();
        Self::from_sources(raw.as_deref(), |key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_scanner_conventions() {
        let settings = ClientSettings::from_sources(None, env_from(&[]));
        assert_eq!(settings.scanner.decode_options(), DecodeOptions::default());
        assert_eq!(settings.scanner.camera, CameraPreference::Environment);
        assert_eq!(settings.scanner.loading_grace(), Duration::from_millis(1200));
        assert_eq!(settings.scanner.restart_delay(), Duration::from_secs(1));
    }

    #[test]
    fn file_then_environment_override_defaults() {
        let file = r#"
server_url = "http://checkin.local:8080"

[scanner]
camera = "user"
qrbox = 300
"#;
        let settings = ClientSettings::from_sources(
            Some(file),
            env_from(&[("APP__SCANNER_FPS", "15"), ("APP__SCANNER_QRBOX", "bogus")]),
        );
        assert_eq!(settings.server_url, "http://checkin.local:8080");
        assert_eq!(settings.scanner.camera, CameraPreference::User);
        assert_eq!(settings.scanner.qrbox, 300);
        assert_eq!(settings.scanner.fps, 15);
        assert_eq!(settings.scanner.restart_delay_ms, 1000);
    }

    #[test]
    fn app_prefixed_server_url_wins() {
        let settings = ClientSettings::from_sources(
            None,
            env_from(&[
                ("CHECKIN_SERVER_URL", "http://a"),
                ("APP__SERVER_URL", "http://b"),
            ]),
        );
        assert_eq!(settings.server_url, "http://b");
    }

    #[test]
    fn zero_fps_is_clamped_when_decoding() {
        let settings = ScannerSettings {
            fps: 0,
            ..ScannerSettings::default()
        };
        assert_eq!(settings.decode_options().fps, 1);
    }
}
