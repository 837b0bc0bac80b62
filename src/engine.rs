use std::sync::Arc;

use tracing::debug;

use crate::{
    clock::Clock,
    config::EngineConfig,
    registry::SeedRegistry,
    store::{RecordStore, UserRecord},
    totp::Totp,
    OtpCode, OtpError,
};

/// A code together with the window it belongs to.
///
/// `expires_at` is the first UNIX second at which the code is no longer the
/// current one; callers poll their clock against it instead of running a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedCode {
    pub code: OtpCode,
    pub step: u64,
    pub expires_at: u64,
}

impl GeneratedCode {
    pub fn remaining_seconds(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Derives codes for registered users. Output depends only on the user's
/// seed and the time step, never on stored state.
pub struct OtpEngine<S> {
    registry: SeedRegistry<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore> OtpEngine<S> {
    pub fn new(
        registry: SeedRegistry<S>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OtpError> {
        config.validate()?;

        Ok(Self {
            registry,
            config,
            clock,
        })
    }

    pub fn registry(&self) -> &SeedRegistry<S> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn totp_for(&self, record: &UserRecord) -> Totp {
        Totp::from_config(record.seed.clone(), &self.config)
    }

    /// The current code of `identifier`
    pub fn generate(&self, identifier: &str) -> Result<GeneratedCode, OtpError> {
        self.generate_at(identifier, self.clock.now())
    }

    pub fn generate_at(
        &self,
        identifier: &str,
        seconds_since_epoch: u64,
    ) -> Result<GeneratedCode, OtpError> {
        let record = self.registry.lookup(identifier)?;
        let totp = self.totp_for(&record);

        let generated = GeneratedCode {
            code: totp.generate(seconds_since_epoch)?,
            step: totp.time_step(seconds_since_epoch),
            expires_at: totp.expires_at(seconds_since_epoch),
        };

        debug!(identifier, step = generated.step, "code generated");
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::{assert_eq, assert_ne};
    use rstest::{fixture, rstest};

    use super::OtpEngine;
    use crate::{
        clock::FixedClock, config::EngineConfig, registry::SeedRegistry, store::MemoryStore,
        OtpError, OtpHashAlgorithm,
    };

    const T: u64 = 1111111080;

    fn engine_with(config: EngineConfig) -> OtpEngine<MemoryStore> {
        let clock = Arc::new(FixedClock::new(T));
        let registry = SeedRegistry::new(MemoryStore::new(), clock.clone());
        registry
            .register("alice", "0x04ab", b"12345678901234567890")
            .unwrap();

        OtpEngine::new(registry, config, clock).unwrap()
    }

    #[fixture]
    fn engine() -> OtpEngine<MemoryStore> {
        engine_with(EngineConfig::default())
    }

    #[rstest]
    fn generates_rfc_code(engine: OtpEngine<MemoryStore>) {
        // RFC 6238 vector 1111111109 -> 07081804, same step as T
        let generated = engine.generate_at("alice", T).unwrap();

        assert_eq!("081804", generated.code.to_string());
        assert_eq!(37037036, generated.step);
        assert_eq!(T + 30, generated.expires_at);
        assert_eq!(generated, engine.generate("alice").unwrap());
    }

    #[rstest]
    fn next_step_yields_another_code(engine: OtpEngine<MemoryStore>) {
        assert_ne!(
            engine.generate_at("alice", T).unwrap().code,
            engine.generate_at("alice", T + 30).unwrap().code
        );
    }

    #[rstest]
    fn expiry_is_checked_against_the_clock(engine: OtpEngine<MemoryStore>) {
        let generated = engine.generate_at("alice", T + 10).unwrap();

        assert_eq!(20, generated.remaining_seconds(T + 10));
        assert!(!generated.is_expired(T + 29));
        assert!(generated.is_expired(T + 30));
        assert_eq!(0, generated.remaining_seconds(T + 45));
    }

    #[rstest]
    fn unknown_user(engine: OtpEngine<MemoryStore>) {
        assert!(matches!(
            engine.generate_at("mallory", T),
            Err(OtpError::UnknownUser(_))
        ));
    }

    #[test]
    fn honours_configured_parameters() {
        let engine = engine_with(EngineConfig {
            digits: 8,
            algorithm: OtpHashAlgorithm::SHA1,
            ..EngineConfig::default()
        });

        assert_eq!("07081804", engine.generate_at("alice", 1111111109).unwrap().code.to_string());
    }

    #[test]
    fn rejects_invalid_config() {
        let clock = Arc::new(FixedClock::new(T));
        let registry = SeedRegistry::new(MemoryStore::new(), clock.clone());

        assert!(matches!(
            OtpEngine::new(registry, EngineConfig { step: 0, ..EngineConfig::default() }, clock),
            Err(OtpError::InvalidConfig(_))
        ));
    }
}
