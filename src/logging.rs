use log::LevelFilter;

/// Environment variable holding the `env_logger` filter directives.
pub const LOG_ENV: &str = "AUTOML_LOG";

/// Install `env_logger` for the process. Defaults to errors only, with this
/// crate's own records at `info`. Calling it twice is a no-op.
pub fn init_logging() {
    let _ = env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or(LOG_ENV, "error,automl_model_builder=info"))
        .try_init();
}
