use clover::audio::{MusicScanner, PlaybackController};
use clover::Config;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Clover Audio Playback Test");
    println!("==========================");

    let config = Config::default();
    let music_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.music_directory.clone());

    if !music_dir.exists() {
        println!("Music directory not found: {:?}", music_dir);
        return Ok(());
    }

    println!("Scanning for music files...");
    let library = MusicScanner::new().scan(&music_dir).await?;

    // First track we have a decoder for
    let test_track = library
        .iter()
        .find(|track| track.format().is_decodable())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No playable tracks found"))?;

    println!("Testing playback with:");
    println!("   Title: {}", test_track.name());
    println!("   Artist: {}", test_track.artist());
    println!("   Path: {:?}", test_track.path());

    let controller = std::sync::Arc::new(PlaybackController::with_default_output(
        config.playback.buffer_duration(),
    ));

    println!("\nStarting playback...");
    let player = controller.clone();
    let done = task::spawn_blocking(move || player.play(&test_track)).await??;
    if let Some(format) = controller.device_format() {
        println!(
            "   Device: {} Hz, {} channel(s), {} frame buffer",
            format.sample_rate, format.channels, format.buffer_frames
        );
    }

    println!("Playing for 10 seconds...");
    sleep(Duration::from_secs(10)).await;
    println!("   Progress: {:.1}%", controller.progress().unwrap_or(0.0) * 100.0);

    println!("Pausing...");
    controller.pause_resume();
    sleep(Duration::from_secs(2)).await;

    println!("Resuming...");
    controller.pause_resume();
    sleep(Duration::from_secs(3)).await;

    println!("Seeking forward 30 seconds...");
    if let Err(e) = controller.seek_seconds(30) {
        println!("   Seek failed: {}", e);
    }
    sleep(Duration::from_secs(3)).await;

    println!("Seeking back 10 seconds...");
    if let Err(e) = controller.seek_seconds(-10) {
        println!("   Seek failed: {}", e);
    }
    sleep(Duration::from_secs(3)).await;

    println!("Stopping playback...");
    controller.stop();
    println!("   Completion after stop: {:?}", done.await.is_ok());

    println!("Playback test completed");
    Ok(())
}
