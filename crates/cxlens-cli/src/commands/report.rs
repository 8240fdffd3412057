use crate::support::{print_json, read_file_or_exit};
use serde_json::json;
use std::process;

pub fn run(input: String, out: String, json_output: bool) {
    let body = read_file_or_exit(&input);

    let artifact = cxlens_service::report(&body).unwrap_or_else(|e| {
        eprintln!("error: {input}: {e}");
        process::exit(1);
    });

    if let Err(e) = std::fs::write(&out, artifact.bytes()) {
        eprintln!("error: failed to write {out}: {e}");
        process::exit(1);
    }

    if json_output {
        print_json(&json!({
            "input": input,
            "out": out,
            "mediaType": artifact.media_type(),
            "pages": artifact.page_count(),
            "bytes": artifact.len(),
            "digest": artifact.digest(),
        }));
    } else {
        println!("cxlens report {input}");
        println!("  Wrote: {out}");
        println!("  Pages: {}", artifact.page_count());
        println!("  Bytes: {}", artifact.len());
        println!("  Digest: {}", artifact.digest());
    }
}
