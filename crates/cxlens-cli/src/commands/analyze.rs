use crate::support::{load_config_or_exit, print_json, read_file_or_exit, runtime_or_exit};
use cxlens_report::layout;
use cxlens_service::{PipelineError, Submission};
use serde_json::json;
use std::path::Path;
use std::process;

pub struct Args {
    pub source: String,
    pub config: Option<String>,
    pub engine: Option<String>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

pub fn run(args: Args) {
    let config = load_config_or_exit(
        args.config.as_deref(),
        None,
        args.engine.as_deref(),
        args.timeout_secs,
    );
    let bytes = read_file_or_exit(&args.source);
    let filename = Path::new(&args.source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let pipeline = config.pipeline();

    let runtime = runtime_or_exit();
    let outcome = runtime.block_on(pipeline.analyze(Some(Submission::new(filename, bytes))));

    match outcome {
        Ok(result) if args.json => match result.to_json_value() {
            Ok(value) => print_json(&value),
            Err(e) => {
                eprintln!("error: failed to encode analysis result: {e}");
                process::exit(1);
            }
        },
        Ok(result) => {
            println!("cxlens analyze {}", args.source);
            println!("  engine: {}", config.engine.display());
            println!();
            println!("{}", layout(&result).to_plain_text());
        }
        Err(err) if args.json => {
            print_json(&failure_payload(&err));
            process::exit(1);
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

fn failure_payload(err: &PipelineError) -> serde_json::Value {
    let mut payload = json!({
        "ok": false,
        "category": err.category(),
        "error": err.to_string(),
    });
    match err {
        PipelineError::Execution(inner) => {
            payload["details"] = json!(inner.diagnostic());
            payload["exitCode"] = json!(inner.exit_code());
        }
        PipelineError::Schema { error, .. } => {
            payload["output"] = json!(error.raw());
        }
        _ => {}
    }
    payload
}
