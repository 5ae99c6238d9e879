//! braindead-bgremove command-line tool
//!
//! Removes image backgrounds with ONNX Runtime or Tract, keeping one model
//! session warm across files.

#[cfg(feature = "cli")]
use braindead_bgremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
