use crate::config::Settings;
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|err| {
        eprintln!("invalid EDUTUTOR_LOG filter {:?}: {err}", settings.log_filter);
        EnvFilter::new("info")
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
