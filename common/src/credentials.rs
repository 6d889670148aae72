//! Credential resolution
//!
//! Credentials are looked up through an ordered table of sources; the first source that
//! yields something wins:
//!
//! | order | source                               | result                        |
//! |-------|--------------------------------------|-------------------------------|
//! | 1     | access key AND secret key given      | [`CredentialSource::Static`]  |
//! | 2     | profile name given                   | [`CredentialSource::Profile`] |
//! | -     | nothing matched                      | [`CredentialsError::NoCredentials`] |
//!
//! The resolved value is opaque to the upload pipeline, only the object store consumes it.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error(
        "no credentials available: pass --access-key and --secret-key (or set AWS_ACCESS_KEY and AWS_SECRET_KEY), or select a profile with --profile"
    )]
    NoCredentials,
}

/// Where the object store should take its credentials from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Static {
        access_key: String,
        secret_key: String,
    },
    /// Named profile from the shared credentials/config files.
    Profile(String),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            CredentialSource::Profile(name) => f.debug_tuple("Profile").field(name).finish(),
        }
    }
}

/// Raw credential inputs as they came from the command line or environment.
#[derive(Debug, Clone, Default)]
pub struct CredentialInputs<'a> {
    pub access_key: Option<&'a str>,
    pub secret_key: Option<&'a str>,
    pub profile: Option<&'a str>,
}

type Rule = fn(&CredentialInputs) -> Option<CredentialSource>;

const RESOLUTION_ORDER: &[(&str, Rule)] = &[
    ("explicit key pair", explicit_keys),
    ("named profile", named_profile),
];

fn non_empty<'a>(value: Option<&'a str>) -> Option<&'a str> {
    value.filter(|v| !v.is_empty())
}

fn explicit_keys(inputs: &CredentialInputs) -> Option<CredentialSource> {
    match (non_empty(inputs.access_key), non_empty(inputs.secret_key)) {
        (Some(access_key), Some(secret_key)) => Some(CredentialSource::Static {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }),
        (None, None) => None,
        _ => {
            tracing::warn!("only one of access key / secret key was given, ignoring both");
            None
        }
    }
}

fn named_profile(inputs: &CredentialInputs) -> Option<CredentialSource> {
    non_empty(inputs.profile).map(|name| CredentialSource::Profile(name.to_string()))
}

pub fn resolve(inputs: &CredentialInputs) -> Result<CredentialSource, CredentialsError> {
    RESOLUTION_ORDER
        .iter()
        .find_map(|(name, rule)| {
            let source = rule(inputs)?;
            tracing::debug!("using credentials from {}", name);
            Some(source)
        })
        .ok_or(CredentialsError::NoCredentials)
}
