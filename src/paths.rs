use anyhow::Result;
use std::{env, path::PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    pub home: PathBuf,
    pub config: PathBuf,
    pub record: PathBuf,
    pub downloads: PathBuf,
}

impl Paths {
    /// Lay out the state files under `home`.
    pub fn under(home: PathBuf) -> Self {
        Paths {
            config: home.join("config.toml"),
            record: home.join("last_version.toml"),
            downloads: home.join("downloads"),
            home,
        }
    }
}

pub fn fcup_home() -> Result<PathBuf> {
    if let Some(explicit) = env::var_os("FCUP_HOME") {
        return Ok(PathBuf::from(explicit));
    }
    let xdg = env::var_os("XDG_CONFIG_HOME");
    let base = xdg
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env::var_os("HOME").unwrap_or_default()).join(".config"));
    Ok(base.join("fcup"))
}

pub fn paths() -> Result<Paths> {
    Ok(Paths::under(fcup_home()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_home() {
        let p = Paths::under(PathBuf::from("/tmp/fcup"));
        assert_eq!(p.config, PathBuf::from("/tmp/fcup/config.toml"));
        assert_eq!(p.record, PathBuf::from("/tmp/fcup/last_version.toml"));
        assert_eq!(p.downloads, PathBuf::from("/tmp/fcup/downloads"));
    }

    #[test]
    fn home_ends_with_app_dir_without_override() {
        if env::var_os("FCUP_HOME").is_some() {
            return;
        }
        let home = fcup_home().unwrap();
        assert!(home.ends_with("fcup"));
    }
}
