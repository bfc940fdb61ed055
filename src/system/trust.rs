// src/system/trust.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{RCKIT_CONFIG_DIR, TRUST_FILENAME};
use crate::models::{TrustConfig, TrustLevel};

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("Could not determine the user configuration directory.")]
    ConfigDirUnavailable,
    #[error("Could not read or write the trust list: {0}")]
    Io(#[from] std::io::Error),
    #[error("The trust list is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Could not serialize the default trust list: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// The allow-list of shell-integration tools whose init lines skip the
/// security scan. Loaded from `trust.toml` in the user config directory,
/// which is written out with the stock entries on first use so users
/// have something concrete to edit.
#[derive(Debug)]
pub struct TrustList {
    tools: BTreeMap<String, bool>,
}

impl TrustList {
    pub fn load_or_generate() -> Result<Self, TrustError> {
        let path = trust_file_path()?;
        Self::load_or_generate_at(&path)
    }

    /// Same as [`TrustList::load_or_generate`] against an explicit file.
    pub fn load_or_generate_at(path: &Path) -> Result<Self, TrustError> {
        if !path.exists() {
            let defaults = generate_default_trust_config();
            let toml_string = toml::to_string_pretty(&defaults)?;
            fs::write(path, toml_string)?;
            Ok(Self {
                tools: defaults.tools,
            })
        } else {
            let content = fs::read_to_string(path)?;
            let config: TrustConfig = toml::from_str(&content)?;
            Ok(Self {
                tools: config.tools,
            })
        }
    }

    /// A list that trusts nothing. Used when the config directory is
    /// unusable, where failing open would be the wrong direction.
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Builds a list from an in-memory config, bypassing the filesystem.
    pub fn from_config(config: TrustConfig) -> Self {
        Self {
            tools: config.tools,
        }
    }

    /// Whether the first word of `command_text` names an enabled tool.
    /// Tools invoked through an absolute path count via their file name.
    pub fn is_trusted(&self, command_text: &str) -> bool {
        let Some(words) = shlex::split(command_text) else {
            return false;
        };
        let Some(first) = words.first() else {
            return false;
        };
        if self.enabled(first) {
            return true;
        }
        Path::new(first)
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.enabled(name))
    }

    pub fn classify(&self, command_text: &str) -> TrustLevel {
        if self.is_trusted(command_text) {
            TrustLevel::ShellInit
        } else {
            TrustLevel::Untrusted
        }
    }

    fn enabled(&self, name: &str) -> bool {
        self.tools.get(name).copied().unwrap_or(false)
    }
}

fn generate_default_trust_config() -> TrustConfig {
    let mut tools = BTreeMap::new();
    for name in [
        "starship",
        "zoxide",
        "direnv",
        "mise",
        "atuin",
        "oh-my-posh",
        "fnm",
        "rbenv",
        "pyenv",
    ] {
        tools.insert(name.to_string(), true);
    }
    TrustConfig { tools }
}

fn trust_file_path() -> Result<PathBuf, TrustError> {
    let base = dirs::config_dir().ok_or(TrustError::ConfigDirUnavailable)?;
    let dir = base.join(RCKIT_CONFIG_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(TRUST_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_list_trusts_known_init_lines_only() {
        let list = TrustList {
            tools: generate_default_trust_config().tools,
        };
        assert!(list.is_trusted("starship init bash"));
        assert!(list.is_trusted("zoxide init --cmd cd bash"));
        assert!(!list.is_trusted("rm -rf /"));
        assert!(!list.is_trusted("starshipped init"));
    }

    #[test]
    fn missing_file_is_generated_with_the_stock_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.toml");

        let list = TrustList::load_or_generate_at(&path).unwrap();
        assert!(path.exists());
        assert!(list.is_trusted("direnv hook bash"));

        // A second load reads the file it just wrote.
        let reloaded = TrustList::load_or_generate_at(&path).unwrap();
        assert!(reloaded.is_trusted("direnv hook bash"));
    }

    #[test]
    fn disabled_entries_are_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.toml");
        fs::write(&path, "[tools]\nstarship = false\nzoxide = true\n").unwrap();

        let list = TrustList::load_or_generate_at(&path).unwrap();
        assert!(!list.is_trusted("starship init bash"));
        assert!(list.is_trusted("zoxide init bash"));
        assert!(!list.is_trusted("direnv hook bash"));
    }

    #[test]
    fn absolute_invocations_match_by_file_name() {
        let list = TrustList {
            tools: generate_default_trust_config().tools,
        };
        assert!(list.is_trusted("/usr/local/bin/starship init bash"));
        assert!(!list.is_trusted("/usr/local/bin/unknown-tool init"));
    }

    #[test]
    fn unparseable_or_empty_lines_are_untrusted() {
        let list = TrustList {
            tools: generate_default_trust_config().tools,
        };
        assert!(!list.is_trusted(""));
        assert!(!list.is_trusted("   "));
        assert!(!list.is_trusted("starship \"unterminated"));
        assert_eq!(list.classify(""), TrustLevel::Untrusted);
        assert_eq!(list.classify("mise activate bash"), TrustLevel::ShellInit);
    }
}
