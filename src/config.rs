use std::path::PathBuf;

use url::Url;

use crate::errors::{PalettaError, Result};

pub const DEFAULT_PROFILE: &str = "default";

pub struct AppPaths {
    pub base_dir: PathBuf,
    pub profile_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppPaths {
    pub fn new(profile: &str) -> Result<Self> {
        let base = match std::env::var_os("PALETTA_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| PalettaError::Config("could not determine home directory".into()))?
                .join(".paletta"),
        };
        Self::from_base(base, profile)
    }

    pub fn from_base(base: PathBuf, profile: &str) -> Result<Self> {
        validate_profile(profile)?;
        let profile_dir = base.join("profiles").join(profile);
        Ok(Self {
            db_path: profile_dir.join("store.db"),
            profile_dir,
            base_dir: base,
        })
    }
}

fn validate_profile(profile: &str) -> Result<()> {
    let ok = !profile.is_empty()
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(PalettaError::Config(format!("invalid profile name \"{}\"", profile)))
    }
}

/// Where every store of a deployment keeps its state. Never mixed.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Local,
    Remote(Url),
}

pub struct Settings {
    pub paths: AppPaths,
    pub backend: Backend,
}

impl Settings {
    pub fn resolve(profile: &str, remote_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            paths: AppPaths::new(profile)?,
            backend: parse_backend(remote_url)?,
        })
    }
}

pub fn parse_backend(remote_url: Option<&str>) -> Result<Backend> {
    match remote_url.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Backend::Local),
        Some(raw) => {
            let url = Url::parse(raw).map_err(|e| {
                PalettaError::Config(format!("invalid remote url \"{}\": {}", raw, e))
            })?;
            match url.scheme() {
                "http" | "https" => Ok(Backend::Remote(url)),
                other => Err(PalettaError::Config(format!(
                    "remote url must be http or https, got {}",
                    other
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_base() {
        let paths = AppPaths::from_base(PathBuf::from("/tmp/test-paletta"), "default").unwrap();
        assert_eq!(paths.base_dir, PathBuf::from("/tmp/test-paletta"));
        assert_eq!(paths.profile_dir, PathBuf::from("/tmp/test-paletta/profiles/default"));
        assert_eq!(paths.db_path, PathBuf::from("/tmp/test-paletta/profiles/default/store.db"));
    }

    #[test]
    fn test_profiles_are_isolated() {
        let a = AppPaths::from_base(PathBuf::from("/tmp/p"), "alice").unwrap();
        let b = AppPaths::from_base(PathBuf::from("/tmp/p"), "bob").unwrap();
        assert_ne!(a.db_path, b.db_path);
    }

    #[test]
    fn test_rejects_path_like_profile() {
        assert!(AppPaths::from_base(PathBuf::from("/tmp/p"), "../etc").is_err());
        assert!(AppPaths::from_base(PathBuf::from("/tmp/p"), "").is_err());
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend(None).unwrap(), Backend::Local);
        assert_eq!(parse_backend(Some("  ")).unwrap(), Backend::Local);
        assert!(matches!(
            parse_backend(Some("https://paletta.example/api/")).unwrap(),
            Backend::Remote(_)
        ));
        assert!(matches!(parse_backend(Some("ftp://x")), Err(PalettaError::Config(_))));
        assert!(matches!(parse_backend(Some("not a url")), Err(PalettaError::Config(_))));
    }
}
