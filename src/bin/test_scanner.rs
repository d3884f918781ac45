use clover::audio::MusicScanner;
use clover::Config;
use std::collections::HashMap;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Clover Music Scanner Test");
    println!("=========================");

    let music_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Config::default().music_directory);

    if !music_dir.exists() {
        println!("Music directory not found: {:?}", music_dir);
        return Ok(());
    }

    println!("Scanning music directory: {:?}", music_dir);

    let scanner = MusicScanner::new();

    match scanner.scan(&music_dir).await {
        Ok(library) => {
            println!("Found {} music files", library.len());
            println!();

            // Show first 10 tracks
            for (i, track) in library.iter().take(10).enumerate() {
                println!("{}. {}", i + 1, track.name());
                println!("   Artist: {}", track.artist());
                println!("   Album: {}", track.album());
                println!("   Year: {}", track.release_year());
                println!("   Format: {:?}", track.format());
                println!("   Path: {:?}", track.path());
                println!();
            }

            if library.len() > 10 {
                println!("... and {} more tracks", library.len() - 10);
            }

            let mut format_counts = HashMap::new();
            for track in &library {
                *format_counts.entry(format!("{:?}", track.format())).or_insert(0) += 1;
            }

            println!("\nFormat breakdown:");
            for (format, count) in format_counts {
                println!("   {}: {} files", format, count);
            }
        }
        Err(e) => {
            println!("Error scanning directory: {}", e);
        }
    }

    Ok(())
}
