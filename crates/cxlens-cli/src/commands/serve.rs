use crate::support::{load_config_or_exit, runtime_or_exit};
use cxlens_service::http::{HttpServerConfig, serve_analysis_api};
use std::process;
use std::sync::Arc;

pub struct Args {
    pub config: Option<String>,
    pub bind: Option<String>,
    pub engine: Option<String>,
    pub timeout_secs: Option<u64>,
}

pub fn run(args: Args) {
    let config = load_config_or_exit(
        args.config.as_deref(),
        args.bind.as_deref(),
        args.engine.as_deref(),
        args.timeout_secs,
    );

    let server = HttpServerConfig {
        bind: config.bind,
        max_body_bytes: config.max_body_bytes,
    };
    let pipeline = Arc::new(config.pipeline());

    println!("cxlens serve");
    println!("  bind: {}", config.bind);
    println!("  engine: {}", config.engine.display());
    println!("  engine timeout: {}s", config.engine_timeout_secs);
    println!("  temp dir: {}", pipeline.store().root().display());
    println!("  routes:");
    println!("    GET /healthz");
    println!("    POST /api/analyze/");
    println!("    POST /api/download-pdf/");

    let runtime = runtime_or_exit();
    runtime.block_on(async move {
        if let Err(e) = serve_analysis_api(server, pipeline).await {
            eprintln!("error: analysis API failed: {e}");
            process::exit(1);
        }
    });
}
