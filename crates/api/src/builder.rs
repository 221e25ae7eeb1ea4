//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general block retrieval builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the builder.
    pub config: Config,

    /// The [Crypto] implementation to use.
    pub crypto: DynCrypto,

    /// The [FatalErrorHandler] every fatal retrieval error is escalated to.
    pub fatal_error_handler: DynFatalErrorHandler,

    /// The [BlockServerFactory] to be used for creating
    /// [BlockServer] instances.
    pub block_server: DynBlockServerFactory,

    /// The [KeyManagerFactory] to be used for creating
    /// [KeyManager] instances.
    pub key_manager: DynKeyManagerFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Note, this should be called before freezing the Builder instance
    /// in an Arc<>.
    pub fn with_default_config(mut self) -> BrResult<Self> {
        {
            let Self {
                config,
                crypto: _,
                fatal_error_handler: _,
                block_server,
                key_manager,
            } = &mut self;

            block_server.default_config(config)?;
            key_manager.default_config(config)?;
        }

        Ok(self)
    }

    /// Validate the current configuration against the configured module
    /// factories.
    pub fn validate_config(&self) -> BrResult<()> {
        self.block_server.validate_config(&self.config)?;
        self.key_manager.validate_config(&self.config)?;

        Ok(())
    }
}
