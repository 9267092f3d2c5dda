//! Spec §4.5 "second tab": one browser process, two independently navigable
//! targets sharing the same transport and correlator. Cancelling the
//! derived scope closes only its own target; cancelling the root scope
//! still tears down the whole browser.

use cdpdrive::{LaunchOptions, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let root = Session::launch(LaunchOptions::new()).await?;

    let tab_a = root.open_tab("about:blank").await?;
    let tab_b = root.open_tab("about:blank").await?;
    println!(
        "tab A target = {}, tab B target = {}",
        tab_a.target().unwrap().target_id,
        tab_b.target().unwrap().target_id,
    );

    let mut frame_navigated = tab_a.subscribe_event::<cdpdrive_cdp::FrameNavigated>();
    let nav = tab_a
        .send_and_wait::<cdpdrive_cdp::Navigate>(cdpdrive_cdp::Navigate::new("about:blank"))
        .await?;
    println!("tab A navigated, frameId = {}", nav.frame_id);
    if let Some(event) = frame_navigated.next().await {
        println!("tab A frameNavigated -> {}", event.frame.url);
    }

    // Closing tab A's scope leaves tab B and the browser process untouched.
    tab_a.cancel();

    tab_b
        .send_and_wait::<cdpdrive_cdp::Navigate>(cdpdrive_cdp::Navigate::new("about:blank"))
        .await?;
    println!("tab B still responds after tab A closed");

    root.close().await?;
    Ok(())
}
