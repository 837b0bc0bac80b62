use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    clock::Clock,
    config::EngineConfig,
    store::{RecordStore, UserRecord},
    totp::Totp,
    OtpError, Seed,
};

/// Upper bound on identifier and public key lengths
pub const MAX_FIELD_LEN: usize = 256;

/// Owns user records. A seed is written once, at registration, and never changes.
pub struct SeedRegistry<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

fn check_field(name: &str, value: &str) -> Result<(), OtpError> {
    if value.trim().is_empty() {
        return Err(OtpError::InvalidInput(format!("{name} must not be empty")));
    }

    if value.len() > MAX_FIELD_LEN {
        return Err(OtpError::InvalidInput(format!(
            "{name} is longer than {MAX_FIELD_LEN} bytes"
        )));
    }

    Ok(())
}

impl<S: RecordStore> SeedRegistry<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enrolls `identifier` with its public key and shared seed.
    pub fn register(&self, identifier: &str, public_key: &str, seed: &[u8]) -> Result<(), OtpError> {
        self.register_seed(identifier, public_key, Seed::new(seed)?)
    }

    pub fn register_seed(
        &self,
        identifier: &str,
        public_key: &str,
        seed: Seed,
    ) -> Result<(), OtpError> {
        check_field("identifier", identifier)?;
        check_field("public key", public_key)?;

        let record = UserRecord {
            identifier: identifier.to_string(),
            public_key: public_key.to_string(),
            seed,
            last_used_step: None,
            registered_at: self.clock.now(),
        };

        match self.store.insert_new(record) {
            Ok(()) => {
                info!(identifier, "user registered");
                Ok(())
            }
            Err(e) => {
                warn!(identifier, "registration refused: {e}");
                Err(e)
            }
        }
    }

    pub fn contains(&self, identifier: &str) -> Result<bool, OtpError> {
        Ok(self.store.get(identifier)?.is_some())
    }

    /// Fetches the record of a registered user.
    pub fn lookup(&self, identifier: &str) -> Result<UserRecord, OtpError> {
        self.store
            .get(identifier)?
            .ok_or_else(|| OtpError::UnknownUser(identifier.to_string()))
    }

    /// An `otpauth://` URI an authenticator app can import the user's seed from.
    pub fn provisioning_uri(
        &self,
        identifier: &str,
        config: &EngineConfig,
    ) -> Result<String, OtpError> {
        let record = self.lookup(identifier)?;

        Totp::from_config(record.seed.clone(), config)
            .to_uri(&record.identifier, config.issuer.as_deref())
    }
}
