use crate::{
    config::EngineConfig,
    uri_helper::{self, otp_to_uri},
    Otp, OtpCode, OtpError, OtpHashAlgorithm, Seed,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Totp {
    pub(crate) secret: Seed,
    pub(crate) algorithm: OtpHashAlgorithm,
    pub(crate) period: u64,
    pub(crate) digits: u32,
}

impl Otp for Totp {
    fn secret(&self) -> &Seed {
        &self.secret
    }

    fn algorithm(&self) -> OtpHashAlgorithm {
        self.algorithm
    }

    fn digits(&self) -> u32 {
        self.digits
    }
}

impl Totp {
    /// Creates the config for the [Time-based One-time Password Algorithm](http://en.wikipedia.org/wiki/Time-based_One-time_Password_Algorithm)
    /// (TOTP) for the given seed.
    ///
    /// Obs.: This method defaults to the SHA1 hash, a 6-digit code and a period of 30 seconds
    pub fn new(secret: Seed) -> Self {
        Self {
            secret,
            algorithm: OtpHashAlgorithm::SHA1,
            period: 30,
            digits: 6,
        }
    }

    /// Creates a TOTP for `secret` using the engine-wide parameters
    pub fn from_config(secret: Seed, config: &EngineConfig) -> Self {
        let mut totp = Self::new(secret);
        totp.with_algorithm(config.algorithm)
            .with_period(config.step)
            .with_digits(config.digits);

        totp
    }

    ///  Sets hashing algorithm
    pub fn with_algorithm(&mut self, algorithm: OtpHashAlgorithm) -> &mut Self {
        self.algorithm = algorithm;

        self
    }

    ///  Sets the period in seconds
    pub fn with_period(&mut self, period: u64) -> &mut Self {
        self.period = period;

        self
    }

    ///  Sets the number of digits to generate
    pub fn with_digits(&mut self, digits: u32) -> &mut Self {
        self.digits = digits;

        self
    }

    /// The time step (window) a UNIX timestamp falls into
    pub fn time_step(&self, seconds_since_epoch: u64) -> u64 {
        seconds_since_epoch / self.period
    }

    /// Seconds left before the code for `seconds_since_epoch` rolls over
    pub fn remaining_seconds(&self, seconds_since_epoch: u64) -> u64 {
        self.period - (seconds_since_epoch % self.period)
    }

    /// First UNIX second at which the code for `seconds_since_epoch` is no longer current
    pub fn expires_at(&self, seconds_since_epoch: u64) -> u64 {
        (self.time_step(seconds_since_epoch) + 1).saturating_mul(self.period)
    }

    /// Generates a Totp from the provided seconds since the UNIX epoch
    /// truncated to the specified number of digits
    pub fn generate(&self, seconds_since_epoch: u64) -> Result<OtpCode, OtpError> {
        self.generate_for_step(self.time_step(seconds_since_epoch))
    }

    pub fn generate_for_step(&self, step: u64) -> Result<OtpCode, OtpError> {
        self.code_for_counter(step)
    }

    /// Validates a code around the step of `seconds_since_epoch`,
    /// returning the step it matched or None if the code is invalid.
    ///
    /// The current step is checked first, then the past ones, then the future ones.
    /// Steps at or below `used_up_to` are never considered.
    ///
    /// Obs.: the RFC recommends a window of 1 frame in the future and 1 in the past,
    /// but this function accepts any window you would like
    pub fn validate_window(
        &self,
        otp_to_validate: u32,
        seconds_since_epoch: u64,
        past_frames: u64,
        future_frames: u64,
        used_up_to: Option<u64>,
    ) -> Result<Option<u64>, OtpError> {
        let current = self.time_step(seconds_since_epoch);
        let mut frames = vec![current];

        for i in 1..=past_frames {
            match current.checked_sub(i) {
                Some(old_frame) => frames.push(old_frame),
                None => break,
            }
        }

        for i in 1..=future_frames {
            match current.checked_add(i) {
                Some(new_frame) => frames.push(new_frame),
                None => break,
            }
        }

        for frame in frames {
            if used_up_to.is_some_and(|used| frame <= used) {
                continue;
            }

            if self.generate_for_step(frame)?.integer() == otp_to_validate {
                return Ok(Some(frame));
            }
        }

        Ok(None)
    }

    pub fn to_uri(&self, user: &str, issuer: Option<&str>) -> Result<String, OtpError> {
        otp_to_uri(self, user, issuer)
    }

    pub fn from_uri(uri: &str) -> Result<Self, OtpError> {
        uri_helper::otp_from_uri(uri)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};
    use rstest::{fixture, rstest};

    use crate::{config::EngineConfig, totp::Totp, OtpError, OtpHashAlgorithm, Seed};

    #[fixture]
    #[once]
    pub fn sha1_secret() -> String {
        "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ".to_string()
    }

    #[fixture]
    #[once]
    pub fn sha256_secret() -> String {
        "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA".to_string()
    }

    #[fixture]
    #[once]
    pub fn sha512_secret() -> String {
        "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNA".to_string()
    }

    fn totp(secret: &str) -> Totp {
        Totp::new(Seed::from_base32(secret).unwrap())
    }

    #[rstest]
    #[case(sha1_secret(), "sha1", 59, "94287082")]
    #[case(sha256_secret(), "sha256", 59, "46119246")]
    #[case(sha512_secret(), "sha512", 59, "90693936")]
    #[case(sha1_secret(), "sha1", 1111111109, "07081804")]
    #[case(sha256_secret(), "sha256", 1111111109, "68084774")]
    #[case(sha512_secret(), "sha512", 1111111109, "25091201")]
    #[case(sha1_secret(), "sha1", 1111111111, "14050471")]
    #[case(sha256_secret(), "sha256", 1111111111, "67062674")]
    #[case(sha512_secret(), "sha512", 1111111111, "99943326")]
    #[case(sha1_secret(), "sha1", 1234567890, "89005924")]
    #[case(sha256_secret(), "sha256", 1234567890, "91819424")]
    #[case(sha512_secret(), "sha512", 1234567890, "93441116")]
    #[case(sha1_secret(), "sha1", 2000000000, "69279037")]
    #[case(sha256_secret(), "sha256", 2000000000, "90698825")]
    #[case(sha512_secret(), "sha512", 2000000000, "38618901")]
    #[case(sha1_secret(), "sha1", 20000000000, "65353130")]
    #[case(sha256_secret(), "sha256", 20000000000, "77737706")]
    #[case(sha512_secret(), "sha512", 20000000000, "47863826")]
    #[case(sha1_secret(), "sha1", 20000000000, "353130")]
    #[case(sha256_secret(), "sha256", 20000000000, "737706")]
    #[case(sha512_secret(), "sha512", 20000000000, "863826")]
    fn totp_test(
        #[case] secret: String,
        #[case] hash: OtpHashAlgorithm,
        #[case] timestamp: u64,
        #[case] expected: &str,
    ) {
        let mut totp_base = totp(&secret);
        totp_base
            .with_algorithm(hash)
            .with_digits(expected.len() as u32);

        let generated_otp = totp_base.generate(timestamp).unwrap();
        assert_eq!(expected, generated_otp.to_string());
    }

    // RFC 4226 appendix D, the counter being the time step
    #[rstest]
    #[case(0, 755224)]
    #[case(1, 287082)]
    #[case(2, 359152)]
    #[case(3, 969429)]
    #[case(4, 338314)]
    #[case(5, 254676)]
    #[case(6, 287922)]
    #[case(7, 162583)]
    #[case(8, 399871)]
    #[case(9, 520489)]
    fn step_codes_match_hotp_vectors(#[case] step: u64, #[case] expected: u32) {
        let totp_base = totp(&sha1_secret());

        assert_eq!(expected, totp_base.generate_for_step(step).unwrap().integer());
    }

    #[test]
    fn generation_is_deterministic_within_a_step() {
        let totp_base = totp(&sha1_secret());

        assert_eq!(
            totp_base.generate(1111111080).unwrap(),
            totp_base.generate(1111111109).unwrap()
        );
        assert_ne!(
            totp_base.generate(1111111080).unwrap(),
            totp_base.generate(1111111110).unwrap()
        );
    }

    #[rstest]
    #[case(0, 30, 30)]
    #[case(29, 1, 30)]
    #[case(30, 30, 60)]
    #[case(1111111109, 1, 1111111110)]
    fn reports_expiry(#[case] now: u64, #[case] remaining: u64, #[case] expires_at: u64) {
        let totp_base = totp(&sha1_secret());

        assert_eq!(remaining, totp_base.remaining_seconds(now));
        assert_eq!(expires_at, totp_base.expires_at(now));
    }

    #[rstest]
    #[case(1111111080, Some(37037036))]
    #[case(1111111110, Some(37037036))]
    #[case(1111111050, Some(37037036))]
    #[case(1111111140, None)]
    #[case(1111111020, None)]
    fn validates_one_step_either_side(#[case] now: u64, #[case] expected: Option<u64>) {
        let totp_base = totp(&sha1_secret());
        let code = totp_base.generate(1111111080).unwrap().integer();

        assert_eq!(
            expected,
            totp_base.validate_window(code, now, 1, 1, None).unwrap()
        );
    }

    #[test]
    fn skips_used_steps() {
        let totp_base = totp(&sha1_secret());
        let code = totp_base.generate(1111111080).unwrap().integer();

        assert_eq!(
            None,
            totp_base
                .validate_window(code, 1111111080, 1, 1, Some(37037036))
                .unwrap()
        );
        assert_eq!(
            Some(37037036),
            totp_base
                .validate_window(code, 1111111080, 1, 1, Some(37037035))
                .unwrap()
        );
    }

    #[test]
    fn past_window_stops_at_epoch() {
        let totp_base = totp(&sha1_secret());
        let code = totp_base.generate(0).unwrap().integer();

        assert_eq!(Some(0), totp_base.validate_window(code, 5, 3, 0, None).unwrap());
    }

    #[test]
    fn builds_from_engine_config() {
        let config = EngineConfig {
            step: 60,
            digits: 8,
            algorithm: OtpHashAlgorithm::SHA256,
            ..EngineConfig::default()
        };

        let totp_base = Totp::from_config(Seed::from_base32(&sha1_secret()).unwrap(), &config);

        assert_eq!(60, totp_base.period);
        assert_eq!(8, totp_base.digits);
        assert_eq!(OtpHashAlgorithm::SHA256, totp_base.algorithm);
    }

    #[rstest]
    #[case("sha1", 6, 30,
        "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME+Co&algorithm=SHA1&digits=6&period=30")]
    #[case("sha256", 8, 30,
        "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME+Co&algorithm=SHA256&digits=8&period=30")]
    #[case("sha512", 6, 10,
        "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME+Co&algorithm=SHA512&digits=6&period=10")]
    fn to_uri_test(
        #[case] hash: OtpHashAlgorithm,
        #[case] digits: u32,
        #[case] period: u64,
        #[case] expected: &str,
    ) {
        let mut totp_base = totp("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ");
        totp_base
            .with_algorithm(hash)
            .with_period(period)
            .with_digits(digits);

        let generated_uri = totp_base
            .to_uri("john.doe@email.com", Some("ACME Co"))
            .unwrap();

        assert_eq!(expected, generated_uri)
    }

    #[test]
    fn to_uri_without_issuer() {
        let generated_uri = totp("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ")
            .to_uri("0xabc", None)
            .unwrap();

        assert_eq!(
            "otpauth://totp/0xabc?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&algorithm=SHA1&digits=6&period=30",
            generated_uri
        );
    }

    #[rstest]
    #[case("sha1", 6, 30,
        "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME%20Co&algorithm=SHA1&digits=6&period=30")]
    #[case("sha256", 8, 30,
        "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME+Co&algorithm=SHA256&digits=8&period=30")]
    #[case("sha512", 6, 10,
        "otpauth://totp/ACME%20Co:john.doe@email.com?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME%20Co&algorithm=SHA512&digits=6&period=10")]
    fn from_uri_test(
        #[case] hash: OtpHashAlgorithm,
        #[case] digits: u32,
        #[case] period: u64,
        #[case] input_uri: &str,
    ) {
        let mut expected_totp = totp("HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ");
        expected_totp
            .with_algorithm(hash)
            .with_period(period)
            .with_digits(digits);

        let totp_base = Totp::from_uri(input_uri).unwrap();

        assert_eq!(expected_totp, totp_base);
        assert_eq!(
            expected_totp.generate(0).unwrap(),
            totp_base.generate(0).unwrap()
        );
    }

    #[rstest]
    #[case("otpauth://hotp/john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&counter=1")]
    #[case("otpauth://totp/john?algorithm=SHA1")]
    #[case("otpauth://totp/john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&period=0")]
    #[case("otpauth://totp/john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&digits=12")]
    #[case("otpauth://totp/john?secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&period=soon")]
    #[case("not a uri")]
    fn from_uri_rejects(#[case] input_uri: &str) {
        let result: Result<Totp, OtpError> = Totp::from_uri(input_uri);

        assert!(result.is_err());
    }
}
