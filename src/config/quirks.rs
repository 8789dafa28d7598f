// self
use crate::_prelude::*;

/// Platform-specific names and toggles that influence request construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformQuirks {
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Form parameter carrying the subject type on client-credentials grants.
	pub subject_type_param: String,
	/// Form parameter carrying the subject id on client-credentials grants.
	pub subject_id_param: String,
	/// JWT claim carrying the subject type on app-auth assertions.
	pub subject_type_claim: String,
	/// Header naming the user a request acts on behalf of.
	pub impersonation_header: String,
}
impl Default for PlatformQuirks {
	fn default() -> Self {
		Self {
			scope_delimiter: ' ',
			subject_type_param: "subject_type".into(),
			subject_id_param: "subject_id".into(),
			subject_type_claim: "sub_type".into(),
			impersonation_header: "As-User".into(),
		}
	}
}
