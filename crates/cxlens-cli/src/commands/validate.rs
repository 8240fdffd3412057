use crate::support::{print_json, read_file_or_exit};
use cxlens_service::validate_output;
use serde_json::json;
use std::process;

pub fn run(file: String, json_output: bool) {
    let bytes = read_file_or_exit(&file);

    match validate_output(&bytes) {
        Ok(result) if json_output => print_json(&json!({
            "file": file,
            "valid": true,
            "metrics": result.summary().names(),
            "functionCount": result.functions().len(),
        })),
        Ok(result) => {
            println!("cxlens validate {file}");
            println!("  Valid: yes");
            println!("  Metrics: {}", result.summary().len());
            println!("  Functions: {}", result.functions().len());
        }
        Err(err) if json_output => {
            print_json(&json!({
                "file": file,
                "valid": false,
                "reason": err.to_string(),
            }));
            process::exit(1);
        }
        Err(err) => {
            eprintln!("error: {file}: {err}");
            process::exit(1);
        }
    }
}
