use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

const LOG_FORMAT: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:>5.5})} {t:<30.30} : {m}{n}";
const CONSOLE_APPENDER: &str = "stdout";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Console-only logger bootstrap. A running instance has no file/GUI
/// surface worth rotating logs for, so this sticks to one appender instead
/// of carrying the rolling-file machinery a desktop build would need.
pub fn init(level: LevelFilter) -> Result<(), String> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err("logger has already been initialized".to_string());
    }

    let appender = Appender::builder().build(
        CONSOLE_APPENDER,
        Box::new(
            ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new(LOG_FORMAT)))
                .build(),
        ),
    );
    let config = Config::builder()
        .appender(appender)
        .build(Root::builder().appender(CONSOLE_APPENDER).build(level))
        .map_err(|e| e.to_string())?;

    log4rs::init_config(config).map_err(|e| e.to_string())?;
    info!("logger initialized at {}", level);
    Ok(())
}
