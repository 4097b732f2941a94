//! Environment source: DOCWEAVE__GENERATION__MAX_WORKERS=4 style overrides.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("DOCWEAVE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("models.worker_models")
            .with_list_parse_key("models.support_keywords"),
    )
}
