pub mod simulate;

use std::path::Path;

use grabby::ReaderConfig;

/// Load a reader config from `path`, or assemble one from flags.
pub fn load_config(
    path: Option<&Path>,
    queue: &str,
    track: bool,
    stats_scope: Option<&str>,
) -> anyhow::Result<ReaderConfig> {
    let config = match path {
        Some(path) => ReaderConfig::from_file(path)?,
        None => {
            let mut config = ReaderConfig::new(queue).with_tracking(track);
            if let Some(scope) = stats_scope {
                config = config.with_stats_scope(scope);
            }
            config
        }
    };
    config.validate()?;
    Ok(config)
}
