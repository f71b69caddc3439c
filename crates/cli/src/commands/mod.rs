// CLI subcommand dispatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use folio_sync::{FolioConfig, SqliteCache};
use tokio::runtime::Runtime;

pub mod ls;
pub mod normalize;
pub mod push;
pub mod show;

#[derive(Subcommand)]
pub enum Command {
    /// Print the canonical form of a raw document record
    Normalize(normalize::NormalizeArgs),
    /// List documents held in the local cache
    Ls(ls::LsArgs),
    /// Show the cached copy of a document
    Show(show::ShowArgs),
    /// Merge the cached draft with the remote copy and write it remotely now
    Push(push::PushArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Normalize(args) => normalize::run(args),
        Command::Ls(args) => ls::run(args),
        Command::Show(args) => show::run(args),
        Command::Push(args) => push::run(args),
    }
}

/// Options for commands that read the local cache.
#[derive(Debug, Clone, Default, Args)]
pub struct CacheArgs {
    /// SQLite cache file. Defaults to `cache_path` from the config file,
    /// then `~/.folio/cache.db`.
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Config file. Defaults to `~/.folio/config.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CacheArgs {
    pub fn load_config(&self) -> anyhow::Result<FolioConfig> {
        match &self.config {
            Some(path) => FolioConfig::load_from(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => Ok(FolioConfig::load()),
        }
    }

    pub fn cache_path(&self, config: &FolioConfig) -> anyhow::Result<PathBuf> {
        self.cache
            .clone()
            .or_else(|| config.cache_path())
            .context("no cache location: pass --cache or set cache_path in the config file")
    }

    pub fn open_cache(&self, config: &FolioConfig) -> anyhow::Result<(SqliteCache, PathBuf)> {
        let path = self.cache_path(config)?;
        let cache = SqliteCache::open(&path)?;
        Ok((cache, path))
    }
}

pub(crate) fn runtime() -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cache_path_wins_over_config() {
        let args = CacheArgs { cache: Some(PathBuf::from("/tmp/explicit.db")), config: None };
        let config = FolioConfig {
            cache_path: Some(PathBuf::from("/tmp/configured.db")),
            ..FolioConfig::default()
        };
        assert_eq!(args.cache_path(&config).unwrap(), PathBuf::from("/tmp/explicit.db"));

        let args = CacheArgs::default();
        assert_eq!(args.cache_path(&config).unwrap(), PathBuf::from("/tmp/configured.db"));
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "cache_path = \"/srv/folio/cache.db\"\n").unwrap();

        let args = CacheArgs { cache: None, config: Some(path) };
        let config = args.load_config().unwrap();
        assert_eq!(config.cache_path, Some(PathBuf::from("/srv/folio/cache.db")));
    }

    #[test]
    fn missing_config_file_is_an_error_when_named() {
        let tmp = tempfile::TempDir::new().unwrap();
        let args = CacheArgs { cache: None, config: Some(tmp.path().join("absent.toml")) };
        assert!(args.load_config().is_err());
    }
}
