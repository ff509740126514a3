//! Configuration loading
//!
//! Layers, lowest first: defaults, `config.toml`, environment
//! (`PARLANCE_API_URL`, `PARLANCE_TOKEN`), command-line flags. A token can
//! also live in the data dir's `auth-token` file.

use std::path::Path;

use anyhow::Context;
use parlance_client::ClientConfig;

use crate::paths::DataDir;

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub token: Option<String>,
}

pub fn load(
    data_dir: &DataDir,
    env: impl Fn(&str) -> Option<String>,
    overrides: &Overrides,
) -> anyhow::Result<ClientConfig> {
    let mut config = read_file(&data_dir.config_path())?;

    if let Some(url) = non_blank(env("PARLANCE_API_URL")) {
        config.api_url = url;
    }
    if let Some(token) = non_blank(env("PARLANCE_TOKEN")) {
        config.token = Some(token);
    }
    if let Some(url) = non_blank(overrides.api_url.clone()) {
        config.api_url = url;
    }
    if let Some(token) = non_blank(overrides.token.clone()) {
        config.token = Some(token);
    }

    if config.token.is_none() {
        config.token = read_token_file(&data_dir.token_file_path())?;
    }

    Ok(config)
}

fn read_file(path: &Path) -> anyhow::Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_token_file(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(non_blank(Some(raw.trim().to_string())))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn data_dir(tmp: &tempfile::TempDir) -> DataDir {
        DataDir::resolve(Some(tmp.path()), None).expect("resolve")
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = load(&data_dir(&tmp), env_of(&[]), &Overrides::default()).expect("load");
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn file_then_env_then_flags() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            tmp.path().join("config.toml"),
            "api_url = \"http://file:8000\"\nhistory_limit = 20\ntoken = \"from-file\"\n",
        )
        .expect("write");

        let dir = data_dir(&tmp);
        let config = load(&dir, env_of(&[]), &Overrides::default()).expect("load");
        assert_eq!(config.api_url, "http://file:8000");
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.token.as_deref(), Some("from-file"));

        let env = env_of(&[
            ("PARLANCE_API_URL", "http://env:8000"),
            ("PARLANCE_TOKEN", "from-env"),
        ]);
        let config = load(&dir, &env, &Overrides::default()).expect("load");
        assert_eq!(config.api_url, "http://env:8000");
        assert_eq!(config.token.as_deref(), Some("from-env"));

        let flags = Overrides {
            api_url: Some("http://flag:8000".into()),
            token: None,
        };
        let config = load(&dir, &env, &flags).expect("load");
        assert_eq!(config.api_url, "http://flag:8000");
        assert_eq!(config.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn token_file_is_the_last_resort() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("auth-token"), "  saved-token\n").expect("write");

        let dir = data_dir(&tmp);
        let config = load(&dir, env_of(&[]), &Overrides::default()).expect("load");
        assert_eq!(config.token.as_deref(), Some("saved-token"));

        let config = load(&dir, env_of(&[("PARLANCE_TOKEN", "env")]), &Overrides::default())
            .expect("load");
        assert_eq!(config.token.as_deref(), Some("env"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("config.toml"), "api_url = [").expect("write");
        let err = load(&data_dir(&tmp), env_of(&[]), &Overrides::default())
            .expect_err("bad toml");
        assert!(err.to_string().contains("config.toml"));
    }
}
