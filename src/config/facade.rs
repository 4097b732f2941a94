//! Config loading facade: builds the layered source stack and deserializes it.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::DocweaveConfig;
use crate::error::ApiError;
use config::File;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace: defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<DocweaveConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        let config: DocweaveConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        debug!(
            workspace = %workspace_root.display(),
            provider = config.provider.provider_type.as_str(),
            model = %config.provider.model,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load from one explicit file (plus defaults and environment), skipping discovery.
    pub fn load_from_file(path: &Path) -> Result<DocweaveConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        let builder = environment::add_to_builder(builder);

        let config: DocweaveConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }
}
