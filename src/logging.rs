use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Initialise logging. `debug` raises the default level to `debug` and lets
/// `RUST_LOG` override it. When `log_file` is set, output goes to that file
/// instead of stderr.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    // Without debug logging we force `info` so a stray `RUST_LOG` in the
    // user's environment cannot flood the console.
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(path) = log_file {
        let dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "whatsapp_blur.log".into());
        let appender = tracing_appender::rolling::never(dir, name);
        let _ = builder.with_writer(appender).with_ansi(false).try_init();
    } else {
        let _ = builder.try_init();
    }
}
