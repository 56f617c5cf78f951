use bgrun::cli::{print_error, Service};
use bgrun::config::DaemonConfig;
use bgrun::heartbeat;
use bgrun::logging::init_logging;

fn main() {
    // Config comes from BGRUN_CONFIG so argv stays `<program> start|stop`
    let config = match DaemonConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(e.exit_code());
        }
    };

    init_logging(&config.log_level);

    let heartbeat = config.heartbeat.clone();
    let pid_file = config.pid_file.clone();

    let code = Service::from_config(&config)
        .finalizer(move || {
            tracing::info!("Daemon shut down, removed {}", pid_file.display());
        })
        .execute(std::env::args_os(), move || {
            heartbeat::run(&heartbeat).map(|_| ())
        });

    std::process::exit(code);
}
