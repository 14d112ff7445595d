//! Logger initialisation helpers

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Parameters
///
/// * `level` - Log level used when `RUST_LOG` is absent
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) is not an error for us
    let _ = env_logger::Builder::from_env(env).try_init();
}
