//! Subcommand implementations

pub mod apply;
pub mod destroy;
pub mod import;
pub mod plan;
pub mod refresh;
pub mod rules;
pub mod state;

use anyhow::{Context as AnyhowContext, Result};
use declarative::{Address, Driver, Registry};

use crate::Context;
use crate::client::HttpRemote;
use crate::config::{Config, Settings};
use crate::manifest::Manifest;
use crate::resource::Catalog;
use crate::state::FileStateStore;

/// Everything a command needs to talk to one SigNoz instance
pub struct Session {
    pub config: Config,
    pub catalog: Catalog,
    pub registry: Registry,
    pub remote: HttpRemote,
    pub store: FileStateStore,
}

impl Session {
    pub fn open(ctx: &Context) -> Result<Self> {
        let settings = Settings::load()?;
        let config = Config::resolve(&settings, ctx.overrides.clone())?;
        log::debug!("endpoint {}, state {}", config.endpoint, config.state_file.display());

        let catalog = Catalog::new(&config.endpoint);
        let registry = catalog.registry();
        let remote = HttpRemote::new(&config.endpoint, config.api_key.clone(), config.timeout);
        let store = FileStateStore::open(&config.state_file)?;

        Ok(Self {
            config,
            catalog,
            registry,
            remote,
            store,
        })
    }

    pub fn driver(&self) -> Driver<'_> {
        Driver::new(&self.remote)
    }

    /// Load the manifest named on the command line
    pub fn manifest(&self, ctx: &Context) -> Result<Manifest> {
        Manifest::load(&ctx.manifest, &self.catalog)
    }
}

/// Parse a `kind.name` address given on the command line
pub fn parse_address(text: &str) -> Result<Address> {
    text.parse::<Address>()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Invalid address `{text}` (expected kind.name, e.g. alert.cpu-high)"))
}
