use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Default file name used when logging to a file without an explicit path.
pub const DEFAULT_LOG_FILE: &str = "kademlia.log";

/// Install the global logger.
///
/// Records go to stdout unless `log_file` is given, in which case they are
/// appended to that file. `RUST_LOG` still overrides `level`.
pub fn setup_logging(level: LevelFilter, log_file: Option<&Path>) {
    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    let mut file_error = None;
    match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                builder.target(Target::Stdout);
                file_error = Some(format!("{}: {}", path.display(), e));
            }
        },
        None => {
            builder.target(Target::Stdout);
        }
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] [{}:{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    // A second init (e.g. from tests) is harmless.
    if builder.try_init().is_ok() {
        if let Some(reason) = file_error {
            log::info!("Failed to log to file ({}), using stdout", reason);
        }
    }
}
