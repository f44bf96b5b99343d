//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the REST API, so the web client can generate
//! its types without a running server. Usage: `openapi [OUTPUT]` (default `openapi.json`).

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn build_document() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = "Station 1 Fit API".to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let json = build_document().to_pretty_json()?;
    std::fs::write(&path, json)?;
    println!("OpenAPI specification written to {}", path);
    Ok(())
}
