use cxlens_service::ServiceConfig;
use serde_json::Value;
use std::path::PathBuf;
use std::process;

/// Config file values with command-line overrides applied on top.
pub fn load_config_or_exit(
    config: Option<&str>,
    bind: Option<&str>,
    engine: Option<&str>,
    timeout_secs: Option<u64>,
) -> ServiceConfig {
    let mut loaded = match config {
        Some(path) => ServiceConfig::load(path).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        }),
        None => ServiceConfig::default(),
    };

    if let Some(bind) = bind {
        loaded.bind = bind.parse().unwrap_or_else(|e| {
            eprintln!("error: invalid --bind address `{bind}`: {e}");
            process::exit(1);
        });
    }
    if let Some(engine) = engine {
        loaded.engine = PathBuf::from(engine);
    }
    if let Some(secs) = timeout_secs {
        loaded.engine_timeout_secs = secs;
    }

    if let Err(e) = loaded.check() {
        eprintln!("error: {e}");
        process::exit(1);
    }
    loaded
}

pub fn read_file_or_exit(path: &str) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| {
        eprintln!("error: failed to read {path}: {e}");
        process::exit(1);
    })
}

pub fn print_json(payload: &Value) {
    match serde_json::to_string_pretty(payload) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to encode json output: {e}");
            process::exit(1);
        }
    }
}

pub fn runtime_or_exit() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        })
}
