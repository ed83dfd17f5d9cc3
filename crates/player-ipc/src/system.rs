//! Host output volume call-outs, separate from the player's own volume.

#[cfg(target_os = "macos")]
pub async fn set_system_volume(volume: i32) -> std::io::Result<()> {
    run_osascript(&format!("set volume output volume {volume}")).await
}

#[cfg(target_os = "macos")]
pub async fn set_system_mute(mute: bool) -> std::io::Result<()> {
    let script = if mute {
        "set volume with output muted"
    } else {
        "set volume without output muted"
    };
    run_osascript(script).await
}

#[cfg(target_os = "macos")]
async fn run_osascript(script: &str) -> std::io::Result<()> {
    let status = tokio::process::Command::new("osascript")
        .arg("-e")
        .arg(script)
        .status()
        .await?;
    if !status.success() {
        return Err(std::io::Error::other(format!(
            "osascript exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub async fn set_system_volume(_volume: i32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub async fn set_system_mute(_mute: bool) -> std::io::Result<()> {
    Ok(())
}
