//! Source configuration and user preferences.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How bare NoteOns are interpreted while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteMode {
    /// A NoteOn sounds until its NoteOff.
    #[default]
    Sustained,
    /// NoteOns are one-shot triggers and never leave a note hanging.
    Percussive,
}

/// What to do with notes still sounding when a session or read window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StuckNoteOption {
    /// Drop them; the data is left with unmatched NoteOns.
    Silence,
    /// Synthesize a NoteOff at the boundary.
    Force { velocity: u8 },
    /// Keep them sounding into whatever follows.
    Extend,
}

impl Default for StuckNoteOption {
    fn default() -> Self {
        StuckNoteOption::Force { velocity: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub sample_rate: f64,
    /// Ticks per quarter note for newly recorded files.
    pub ppqn: u16,
    /// Realtime capture ring size, in events.
    pub capture_capacity: usize,
    pub stuck_note_option: StuckNoteOption,
    /// Realtime write errors kept for the butler thread.
    pub error_log_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            ppqn: 1920,
            capture_capacity: 4096,
            stuck_note_option: StuckNoteOption::default(),
            error_log_capacity: 64,
        }
    }
}

impl SourceConfig {
    pub fn builder() -> SourceConfigBuilder {
        SourceConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::Config(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.ppqn == 0 || self.ppqn > miditape_smf::MAX_DIVISION {
            return Err(Error::Config(format!(
                "ppqn {} out of range (1-{})",
                self.ppqn,
                miditape_smf::MAX_DIVISION
            )));
        }
        if self.capture_capacity == 0 {
            return Err(Error::Config("capture_capacity must be > 0".into()));
        }
        if self.error_log_capacity == 0 {
            return Err(Error::Config("error_log_capacity must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`SourceConfig`].
///
/// ```ignore
/// let config = SourceConfig::builder()
///     .sample_rate(44100.0)
///     .ppqn(960)
///     .stuck_note_option(StuckNoteOption::Extend)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SourceConfigBuilder {
    config: SourceConfig,
}

impl SourceConfigBuilder {
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn ppqn(mut self, ppqn: u16) -> Self {
        self.config.ppqn = ppqn;
        self
    }

    pub fn capture_capacity(mut self, capacity: usize) -> Self {
        self.config.capture_capacity = capacity;
        self
    }

    pub fn stuck_note_option(mut self, option: StuckNoteOption) -> Self {
        self.config.stuck_note_option = option;
        self
    }

    pub fn error_log_capacity(mut self, capacity: usize) -> Self {
        self.config.error_log_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<SourceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SourceConfig::default();
        assert_eq!(config.ppqn, 1920);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(SourceConfig::builder().sample_rate(1000.0).build().is_err());
        assert!(SourceConfig::builder().ppqn(0).build().is_err());
        assert!(SourceConfig::builder().ppqn(0x8000).build().is_err());
        assert!(SourceConfig::builder().capture_capacity(0).build().is_err());
        assert!(SourceConfig::builder()
            .sample_rate(96000.0)
            .ppqn(480)
            .build()
            .is_ok());
    }

    #[test]
    fn test_preference_serialization() {
        let json = serde_json::to_string(&StuckNoteOption::Force { velocity: 64 }).unwrap();
        assert_eq!(json, r#"{"policy":"force","velocity":64}"#);
        let back: StuckNoteOption = serde_json::from_str(r#"{"policy":"extend"}"#).unwrap();
        assert_eq!(back, StuckNoteOption::Extend);

        let config: SourceConfig = serde_json::from_str(r#"{"ppqn":960}"#).unwrap();
        assert_eq!(config.ppqn, 960);
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.stuck_note_option, StuckNoteOption::default());
    }
}
