//! Binary entrypoint: read one AnalysisRequest from stdin, write one
//! AnalysisOutcome to stdout. Logs go to stderr.

use speculator_engine::{run, AnalysisRequest};
use std::io::{self, Read, Write};
use tracing_subscriber::EnvFilter;

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .with_target(false)
    .init();

  if let Err(e) = run_binary() {
    let _ = writeln!(io::stderr(), "speculator-engine error: {}", e);
    std::process::exit(1);
  }
}

fn run_binary() -> Result<(), Box<dyn std::error::Error>> {
  let mut raw = String::new();
  io::stdin().lock().read_to_string(&mut raw)?;
  let request: AnalysisRequest = serde_json::from_str(&raw)?;

  let outcome = run(&request)?;
  let json = serde_json::to_vec(&outcome)?;
  let mut out = io::stdout().lock();
  out.write_all(&json)?;
  out.write_all(b"\n")?;
  Ok(())
}
