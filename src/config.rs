use std::{fs, ops::RangeInclusive, path::Path};

use serde::{Deserialize, Serialize};

use crate::{OtpError, OtpHashAlgorithm};

pub const DEFAULT_STEP: u64 = 30;
pub const DEFAULT_DIGITS: u32 = 6;
/// Fewer than 6 digits is too guessable, more than 9 overflows the truncated u32.
pub const DIGITS_RANGE: RangeInclusive<u32> = 6..=9;
pub const MAX_SKEW_WINDOWS: u64 = 10;

/// Parameters shared by every user of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of a time step in seconds
    pub step: u64,
    pub digits: u32,
    pub algorithm: OtpHashAlgorithm,
    /// Steps before the current one still accepted by `verify`
    pub past_windows: u64,
    /// Steps after the current one still accepted by `verify`
    pub future_windows: u64,
    /// Shown by authenticator apps next to the account name
    pub issuer: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            digits: DEFAULT_DIGITS,
            algorithm: OtpHashAlgorithm::SHA1,
            past_windows: 1,
            future_windows: 1,
            issuer: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OtpError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| OtpError::InvalidConfig(format!("{}: {e}", path.display())))?;

        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| OtpError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OtpError> {
        if self.step == 0 {
            return Err(OtpError::InvalidConfig("step must be positive".into()));
        }

        if !DIGITS_RANGE.contains(&self.digits) {
            return Err(OtpError::InvalidConfig(format!(
                "digits must be within {DIGITS_RANGE:?}, got {}",
                self.digits
            )));
        }

        if self.past_windows > MAX_SKEW_WINDOWS || self.future_windows > MAX_SKEW_WINDOWS {
            return Err(OtpError::InvalidConfig(format!(
                "skew windows are capped at {MAX_SKEW_WINDOWS}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::EngineConfig;
    use crate::{OtpError, OtpHashAlgorithm};

    #[test]
    fn defaults_follow_rfc_6238() {
        let config = EngineConfig::default();

        assert_eq!(30, config.step);
        assert_eq!(6, config.digits);
        assert_eq!(OtpHashAlgorithm::SHA1, config.algorithm);
        assert_eq!((1, 1), (config.past_windows, config.future_windows));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(EngineConfig { step: 0, ..EngineConfig::default() })]
    #[case(EngineConfig { digits: 5, ..EngineConfig::default() })]
    #[case(EngineConfig { digits: 10, ..EngineConfig::default() })]
    #[case(EngineConfig { past_windows: 11, ..EngineConfig::default() })]
    fn rejects_invalid(#[case] config: EngineConfig) {
        assert!(matches!(config.validate(), Err(OtpError::InvalidConfig(_))));
    }

    #[test]
    fn reads_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"digits": 8, "algorithm": "SHA256", "issuer": "Chain2FA"}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();

        assert_eq!(
            EngineConfig {
                digits: 8,
                algorithm: OtpHashAlgorithm::SHA256,
                issuer: Some("Chain2FA".into()),
                ..EngineConfig::default()
            },
            config
        );
    }

    #[test]
    fn file_values_are_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"step": 0}}"#).unwrap();

        assert!(matches!(
            EngineConfig::from_json_file(file.path()),
            Err(OtpError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_json_file("/nonexistent/otpguard.json"),
            Err(OtpError::InvalidConfig(_))
        ));
    }
}
