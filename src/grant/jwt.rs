//! App-auth assertion signing.

// crates.io
use jsonwebtoken::{EncodingKey, Header};
use rand::{Rng, distr::Alphanumeric};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{Subject, TokenSecret},
	config::PlatformConfig,
	error::ConfigError,
};

const JTI_LEN: usize = 32;

/// Signs JWT bearer assertions for app-auth sessions.
///
/// Claims: `iss` (client id), `sub` (subject id), the configurable subject-type claim, `aud`
/// (token endpoint), a random `jti`, and `exp` = now + assertion TTL.
#[derive(Clone)]
pub struct JwtSigner {
	key: EncodingKey,
	header: Header,
	issuer: String,
	audience: String,
	subject_type_claim: String,
	ttl: Duration,
}
impl JwtSigner {
	/// Builds a signer from the app-auth section of `config`.
	pub fn from_config(config: &PlatformConfig) -> Result<Self> {
		let app_auth = config.app_auth.as_ref().ok_or(ConfigError::Unsupported {
			operation: "app auth",
			reason: "no app-auth key material is configured",
		})?;
		let key = app_auth.encoding_key().map_err(ConfigError::from)?;
		let mut header = Header::new(app_auth.algorithm.into());

		header.kid = Some(app_auth.key_id.to_string());

		Ok(Self {
			key,
			header,
			issuer: config.client_id.clone(),
			audience: config.endpoints.token.to_string(),
			subject_type_claim: config.quirks.subject_type_claim.clone(),
			ttl: app_auth.assertion_ttl,
		})
	}

	/// Signs an assertion for `subject` as of `now`.
	pub fn sign(&self, subject: &Subject, now: OffsetDateTime) -> Result<TokenSecret> {
		let jti: String =
			rand::rng().sample_iter(Alphanumeric).take(JTI_LEN).map(char::from).collect();
		let mut claims = Map::new();

		claims.insert("iss".into(), Value::from(self.issuer.as_str()));
		claims.insert("sub".into(), Value::from(subject.id()));
		claims.insert(self.subject_type_claim.clone(), Value::from(subject.kind()));
		claims.insert("aud".into(), Value::from(self.audience.as_str()));
		claims.insert("jti".into(), Value::from(jti));
		claims.insert("exp".into(), Value::from((now + self.ttl).unix_timestamp()));

		let assertion = jsonwebtoken::encode(&self.header, &Value::Object(claims), &self.key)
			.map_err(ConfigError::from)?;

		Ok(TokenSecret::new(assertion))
	}
}
impl Debug for JwtSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwtSigner")
			.field("kid", &self.header.kid)
			.field("alg", &self.header.alg)
			.field("issuer", &self.issuer)
			.field("audience", &self.audience)
			.field("ttl", &self.ttl)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::{DecodingKey, Validation};
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::scripted_config,
		auth::{EnterpriseId, KeyId},
		config::AppAuthConfig,
	};

	const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/app_auth_key.pem");
	const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/app_auth_key.pub.pem");

	#[test]
	fn signed_assertions_carry_expected_claims() {
		let mut config = scripted_config();

		config.app_auth = Some(AppAuthConfig::new(
			KeyId::new("key-7").expect("Key fixture should be valid."),
			PRIVATE_KEY,
		));

		let signer = JwtSigner::from_config(&config).expect("Signer should build.");
		let subject =
			Subject::Enterprise(EnterpriseId::new("9001").expect("Enterprise fixture is valid."));
		let now = OffsetDateTime::now_utc();
		let assertion = signer.sign(&subject, now).expect("Assertion should sign.");
		let header =
			jsonwebtoken::decode_header(assertion.expose()).expect("Header should decode.");

		assert_eq!(header.kid.as_deref(), Some("key-7"));

		let mut validation = Validation::new(jsonwebtoken::Algorithm::RS256);

		validation.set_audience(&[config.endpoints.token.as_str()]);
		validation.set_issuer(&["client-test"]);

		let claims = jsonwebtoken::decode::<Value>(
			assertion.expose(),
			&DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).expect("Public key should parse."),
			&validation,
		)
		.expect("Assertion should verify.")
		.claims;

		assert_eq!(claims["sub"], "9001");
		assert_eq!(claims["sub_type"], "enterprise");
		assert_eq!(claims["exp"], (now + Duration::seconds(30)).unix_timestamp());
		assert_eq!(claims["jti"].as_str().map(str::len), Some(JTI_LEN));
	}

	#[test]
	fn each_assertion_gets_a_fresh_jti() {
		let mut config = scripted_config();

		config.app_auth = Some(AppAuthConfig::new(
			KeyId::new("key-7").expect("Key fixture should be valid."),
			PRIVATE_KEY,
		));

		let signer = JwtSigner::from_config(&config).expect("Signer should build.");
		let subject =
			Subject::Enterprise(EnterpriseId::new("9001").expect("Enterprise fixture is valid."));
		let now = macros::datetime!(2030-01-01 00:00 UTC);
		let first = signer.sign(&subject, now).expect("Assertion should sign.");
		let second = signer.sign(&subject, now).expect("Assertion should sign.");

		assert_ne!(first, second);
	}

	#[test]
	fn missing_key_material_is_a_config_error() {
		let err = JwtSigner::from_config(&scripted_config()).expect_err("Signer requires keys.");

		assert!(matches!(err, Error::Config(ConfigError::Unsupported { .. })));
	}
}
