use console::style;
use env_logger::{Builder, Env};
use log::{Level, LevelFilter};
use std::io::Write;

/// Initialize logger based on verbose flag; `RUST_LOG` wins when set
pub fn init_logger(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default));

    builder.format(|buf, record| {
        let level = match record.level() {
            Level::Error => style("ERROR").red().bold(),
            Level::Warn => style("WARN ").yellow().bold(),
            Level::Info => style("INFO ").green(),
            Level::Debug => style("DEBUG").cyan(),
            Level::Trace => style("TRACE").dim(),
        };
        writeln!(buf, "{} [{}] {}", level, record.target(), record.args())
    });

    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        });
    }

    builder.init();
}
