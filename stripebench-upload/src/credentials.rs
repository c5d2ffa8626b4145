//! Access keys for the object store.
//!
//! Keys given explicitly win. Otherwise they are read from a credentials file in the format of the
//! AWS command line tools.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, UploadError};

/// The profile used when none is selected.
pub const DEFAULT_PROFILE: &str = "default";

/// An access key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    /// Creates credentials from an access key and a secret key.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Picks explicit keys if both are given, otherwise loads `profile` from a credentials file.
    ///
    /// Without `file`, the file named by `AWS_SHARED_CREDENTIALS_FILE` or `~/.aws/credentials` is
    /// used. Giving only one of the two keys is an error.
    pub fn resolve(
        access_key: Option<&str>,
        secret_key: Option<&str>,
        file: Option<&Path>,
        profile: Option<&str>,
    ) -> Result<Self> {
        match (access_key, secret_key) {
            (Some(access), Some(secret)) => return Ok(Self::new(access, secret)),
            (None, None) => {}
            _ => {
                return Err(UploadError::InvalidArgument(
                    "both access and secret keys have to be specified".into(),
                ));
            }
        }

        let path = match file {
            Some(path) => path.to_owned(),
            None => default_credentials_file().ok_or_else(|| {
                UploadError::Credentials("cannot locate the credentials file".into())
            })?,
        };
        Self::from_file(&path, profile.unwrap_or(DEFAULT_PROFILE))
    }

    /// Loads `profile` from the credentials file at `path`.
    pub fn from_file(path: &Path, profile: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(UploadError::io(format!(
            "failed to read credentials file {}",
            path.display()
        )))?;
        Self::from_ini(&contents, profile)
    }

    /// Parses `profile` out of the contents of a credentials file.
    pub fn from_ini(contents: &str, profile: &str) -> Result<Self> {
        let sections = parse_ini(contents);
        let section = sections
            .get(profile)
            .ok_or_else(|| UploadError::Credentials(format!("profile {profile} not found")))?;

        let field = |name: &str| {
            section.get(name).cloned().ok_or_else(|| {
                UploadError::Credentials(format!("profile {profile} has no {name}"))
            })
        };
        Ok(Self::new(
            field("aws_access_key_id")?,
            field("aws_secret_access_key")?,
        ))
    }

    /// The access key id.
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// The secret access key.
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[redacted]")
            .finish()
    }
}

fn default_credentials_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".aws").join("credentials"))
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn parse_ini(contents: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current = DEFAULT_PROFILE.to_owned();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_owned();
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        sections
            .entry(current.clone())
            .or_default()
            .insert(key.trim().to_ascii_lowercase(), strip_quotes(value).to_owned());
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "
# shared credentials
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = secret-default

[bench]
AWS_ACCESS_KEY_ID=\"AKIDBENCH\"
aws_secret_access_key='secret=bench'
";

    #[test]
    fn reads_profiles() {
        let creds = Credentials::from_ini(FILE, "default").unwrap();
        assert_eq!(creds.access_key(), "AKIDDEFAULT");
        assert_eq!(creds.secret_key(), "secret-default");

        let creds = Credentials::from_ini(FILE, "bench").unwrap();
        assert_eq!(creds.access_key(), "AKIDBENCH");
        assert_eq!(creds.secret_key(), "secret=bench");
    }

    #[test]
    fn missing_profile() {
        let err = Credentials::from_ini(FILE, "prod").unwrap_err();
        assert!(matches!(err, UploadError::Credentials(_)));
    }

    #[test]
    fn explicit_keys_win() {
        let creds =
            Credentials::resolve(Some("a"), Some("s"), Some(Path::new("/nonexistent")), None)
                .unwrap();
        assert_eq!(creds, Credentials::new("a", "s"));
    }

    #[test]
    fn requires_both_keys() {
        let err = Credentials::resolve(Some("a"), None, None, None).unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(&path, FILE).unwrap();

        let creds = Credentials::resolve(None, None, Some(&path), Some("bench")).unwrap();
        assert_eq!(creds.access_key(), "AKIDBENCH");
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new("a", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
