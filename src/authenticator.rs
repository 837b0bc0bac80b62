//! Code verification with clock-skew tolerance and replay protection.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    clock::Clock,
    config::EngineConfig,
    engine::{GeneratedCode, OtpEngine},
    registry::SeedRegistry,
    store::RecordStore,
    OtpCode, OtpError,
};

/// Front door of the crate: registration, generation and verification over
/// one record store, one configuration and one clock.
pub struct Authenticator<S> {
    engine: OtpEngine<S>,
}

impl<S: RecordStore> Authenticator<S> {
    pub fn new(store: S, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, OtpError> {
        let registry = SeedRegistry::new(store, clock.clone());

        Ok(Self {
            engine: OtpEngine::new(registry, config, clock)?,
        })
    }

    pub fn engine(&self) -> &OtpEngine<S> {
        &self.engine
    }

    pub fn registry(&self) -> &SeedRegistry<S> {
        self.engine.registry()
    }

    pub fn register(&self, identifier: &str, public_key: &str, seed: &[u8]) -> Result<(), OtpError> {
        self.registry().register(identifier, public_key, seed)
    }

    pub fn generate(&self, identifier: &str) -> Result<GeneratedCode, OtpError> {
        self.engine.generate(identifier)
    }

    pub fn provisioning_uri(&self, identifier: &str) -> Result<String, OtpError> {
        self.registry()
            .provisioning_uri(identifier, self.engine.config())
    }

    /// Verifies `submitted` against the clock's current time.
    pub fn verify(&self, identifier: &str, submitted: &str) -> Result<bool, OtpError> {
        self.verify_at(identifier, submitted, self.engine.clock().now())
    }

    /// Checks `submitted` against the steps around `seconds_since_epoch`.
    ///
    /// A match marks its step as used: that code, and every code of an earlier
    /// step, is refused from then on. Mismatches and replays yield `Ok(false)`.
    pub fn verify_at(
        &self,
        identifier: &str,
        submitted: &str,
        seconds_since_epoch: u64,
    ) -> Result<bool, OtpError> {
        let record = self.registry().lookup(identifier)?;
        let config = self.engine.config();
        let submitted = OtpCode::parse(submitted, config.digits)?;

        let totp = self.engine.totp_for(&record);
        let matched = totp.validate_window(
            submitted.integer(),
            seconds_since_epoch,
            config.past_windows,
            config.future_windows,
            record.last_used_step,
        )?;

        let Some(step) = matched else {
            info!(identifier, "verification failed");
            return Ok(false);
        };

        // Another verification may have consumed this step since the lookup
        if !self.registry().store().advance_last_used(identifier, step)? {
            warn!(identifier, step, "code replayed");
            return Ok(false);
        }

        info!(identifier, step, "verification succeeded");
        Ok(true)
    }
}
