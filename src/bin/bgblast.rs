//! bgblast CLI Tool
//!
//! Queues images, removes their backgrounds with a MODNet model on the ONNX
//! Runtime or Tract backend, and exports the results.

#[cfg(feature = "cli")]
use bgblast::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
