//! Launch a real browser, perform the startup handshake, and tear it down
//! gracefully. The smallest possible use of the core: no typed bindings
//! beyond `Browser.getVersion`/`Browser.close`, both of which
//! `cdpdrive::Scope` already issues internally — this just prints what the
//! handshake returned.

use cdpdrive::{LaunchOptions, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let scope = Session::launch(LaunchOptions::new()).await?;
    println!("session output dir: {}", scope.output_dir().display());

    let version = scope
        .send_and_wait::<cdpdrive_cdp::GetVersion>(cdpdrive_cdp::GetVersion::default())
        .await?;
    println!("{} ({})", version.product, version.protocol_version);

    scope.close().await?;
    Ok(())
}
