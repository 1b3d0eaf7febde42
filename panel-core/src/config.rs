//! Panel configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Durations are stored in milliseconds.

use std::time::Duration;

use panel_proto::DEFAULT_KEY;
use serde::{Deserialize, Serialize};

use crate::component::potentiometer::Granularity;
use crate::component::rotary::StepMode;
use crate::error::{PanelError, Result};

/// Top-level configuration for a panel connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub serial: SerialConfig,
    /// CRC-8 polynomial key shared with the board firmware.
    pub checksum_key: u8,
    /// Minimum time spent reading frames before binding, so that every
    /// node has reported through the master at least once.
    pub discovery_window_ms: u64,
    /// Give up discovery when the master roles have not appeared by then.
    pub discovery_timeout_ms: u64,
    /// Upper bound on how long a blocked call sleeps between checks.
    pub poll_interval_ms: u64,
    /// Delay before each reader-side sample.
    pub settle_delay_ms: u64,
    pub gestures: GestureConfig,
    pub potentiometer: PotentiometerConfig,
    pub rotary: RotaryConfig,
    pub roles: RoleNames,
    /// Optional pin layout of the master board, validated at startup.
    pub layout: Option<BoardLayout>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            checksum_key: DEFAULT_KEY,
            discovery_window_ms: 9_000,
            discovery_timeout_ms: 15_000,
            poll_interval_ms: 20,
            settle_delay_ms: 10,
            gestures: GestureConfig::default(),
            potentiometer: PotentiometerConfig::default(),
            rotary: RotaryConfig::default(),
            roles: RoleNames::default(),
            layout: None,
        }
    }
}

impl PanelConfig {
    /// Check values that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(PanelError::Config("poll_interval_ms must be positive".into()));
        }
        if self.discovery_timeout_ms < self.discovery_window_ms {
            return Err(PanelError::Config(
                "discovery_timeout_ms must not be shorter than discovery_window_ms".into(),
            ));
        }
        if !(self.rotary.step.is_finite() && self.rotary.step > 0.0) {
            return Err(PanelError::Config("rotary.step must be positive".into()));
        }
        if let Some(layout) = &self.layout {
            layout.validate()?;
        }
        Ok(())
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Case-sensitive substring of the port description.
    pub port_filter: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_filter: "Arduino Uno".into(),
            baud_rate: 9600,
            read_timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub hold_time_ms: u64,
    pub double_click_gap_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            hold_time_ms: 1000,
            double_click_gap_ms: 750,
        }
    }
}

impl GestureConfig {
    pub fn hold_time(&self) -> Duration {
        Duration::from_millis(self.hold_time_ms)
    }

    pub fn double_click_gap(&self) -> Duration {
        Duration::from_millis(self.double_click_gap_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PotentiometerConfig {
    pub granularity: Granularity,
    /// Apply the EMA filter before scaling.
    pub smoothing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotaryConfig {
    /// Fixed step, or base step when `dynamic` is set.
    pub step: f64,
    /// Scale the step with rotation speed.
    pub dynamic: bool,
}

impl Default for RotaryConfig {
    fn default() -> Self {
        Self {
            step: 1.0,
            dynamic: false,
        }
    }
}

impl RotaryConfig {
    pub fn step_mode(&self) -> StepMode {
        if self.dynamic {
            StepMode::Dynamic { base: self.step }
        } else {
            StepMode::Fixed(self.step)
        }
    }
}

/// Keys under the `master` node that carry the fixed roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleNames {
    pub confirm: String,
    pub decline: String,
    pub wheel: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            confirm: "Accept".into(),
            decline: "Decline".into(),
            wheel: "Rotary".into(),
        }
    }
}

impl RoleNames {
    pub fn all(&self) -> [&str; 3] {
        [self.confirm.as_str(), self.decline.as_str(), self.wheel.as_str()]
    }
}

/// Pin class on an Arduino Uno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinKind {
    Digital,
    Analog,
}

impl PinKind {
    /// Lowest usable pin. Digital 0 and 1 carry the serial link.
    pub const fn min_pin(self) -> u8 {
        match self {
            Self::Digital => 2,
            Self::Analog => 0,
        }
    }

    pub const fn max_pin(self) -> u8 {
        match self {
            Self::Digital => 13,
            Self::Analog => 5,
        }
    }

    pub fn check(self, pin: u8) -> Result<u8> {
        if (self.min_pin()..=self.max_pin()).contains(&pin) {
            Ok(pin)
        } else {
            Err(PanelError::PinOutOfRange { kind: self, pin })
        }
    }
}

impl std::fmt::Display for PinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Digital => write!(f, "digital"),
            Self::Analog => write!(f, "analog"),
        }
    }
}

/// Wiring of the master board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardLayout {
    pub confirm_button_pin: u8,
    pub decline_button_pin: u8,
    pub wheel_pins: [u8; 2],
    pub potentiometer_pins: Vec<u8>,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self {
            confirm_button_pin: 3,
            decline_button_pin: 2,
            wheel_pins: [8, 9],
            potentiometer_pins: Vec::new(),
        }
    }
}

impl BoardLayout {
    pub fn validate(&self) -> Result<()> {
        PinKind::Digital.check(self.confirm_button_pin)?;
        PinKind::Digital.check(self.decline_button_pin)?;
        for &pin in &self.wheel_pins {
            PinKind::Digital.check(pin)?;
        }
        for &pin in &self.potentiometer_pins {
            PinKind::Analog.check(pin)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config: PanelConfig = toml::from_str("").unwrap();
        assert_eq!(config, PanelConfig::default());
        assert_eq!(config.serial.port_filter, "Arduino Uno");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.checksum_key, 7);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: PanelConfig = toml::from_str(
            r#"
            checksum_key = 49
            [serial]
            port_filter = "USB Serial"
            [potentiometer]
            granularity = "normalized"
            smoothing = true
            [rotary]
            step = 0.5
            dynamic = true
            [layout]
            potentiometer_pins = [0, 1, 2]
            "#,
        )
        .unwrap();
        assert_eq!(config.checksum_key, 49);
        assert_eq!(config.serial.port_filter, "USB Serial");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.potentiometer.granularity, Granularity::Normalized);
        assert!(config.potentiometer.smoothing);
        assert_eq!(config.rotary.step_mode(), StepMode::Dynamic { base: 0.5 });
        let layout = config.layout.as_ref().unwrap();
        assert_eq!(layout.confirm_button_pin, 3);
        assert_eq!(layout.potentiometer_pins, vec![0, 1, 2]);
        config.validate().unwrap();
    }

    #[test]
    fn test_pin_validation() {
        let mut layout = BoardLayout::default();
        layout.validate().unwrap();

        layout.confirm_button_pin = 1;
        assert!(matches!(
            layout.validate(),
            Err(PanelError::PinOutOfRange {
                kind: PinKind::Digital,
                pin: 1
            })
        ));

        layout.confirm_button_pin = 3;
        layout.wheel_pins = [8, 14];
        assert!(matches!(
            layout.validate(),
            Err(PanelError::PinOutOfRange { pin: 14, .. })
        ));

        layout.wheel_pins = [8, 9];
        layout.potentiometer_pins = vec![0, 6];
        assert!(matches!(
            layout.validate(),
            Err(PanelError::PinOutOfRange {
                kind: PinKind::Analog,
                pin: 6
            })
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PanelConfig {
            poll_interval_ms: 0,
            ..PanelConfig::default()
        };
        assert!(matches!(config.validate(), Err(PanelError::Config(_))));

        config.poll_interval_ms = 20;
        config.discovery_timeout_ms = 10;
        assert!(matches!(config.validate(), Err(PanelError::Config(_))));

        config.discovery_timeout_ms = 20_000;
        config.rotary.step = 0.0;
        assert!(matches!(config.validate(), Err(PanelError::Config(_))));

        config.rotary.step = 1.0;
        config.layout = Some(BoardLayout {
            decline_button_pin: 20,
            ..BoardLayout::default()
        });
        assert!(matches!(
            config.validate(),
            Err(PanelError::PinOutOfRange { pin: 20, .. })
        ));
    }
}
