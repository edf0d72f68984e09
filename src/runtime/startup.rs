use std::io;
use std::sync::Arc;

use crate::audio::{EngineSettings, Jukebox, RodioSinkFactory};
use crate::config::{MediaSettings, Settings};
use crate::library::PlatformResolver;
use crate::notify::ConsoleNotifier;

/// Leftovers from a previous run are never referenced again, so the media root
/// starts out empty unless configured otherwise.
pub async fn prepare_media_root(media: &MediaSettings) -> io::Result<()> {
    if media.wipe_on_startup {
        match tokio::fs::remove_dir_all(&media.root).await {
            Ok(()) => tracing::info!(root = ?media.root, "cleared media directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    tokio::fs::create_dir_all(&media.root).await
}

pub fn build_jukebox(settings: &Settings) -> Jukebox {
    let resolver = PlatformResolver::new(&settings.resolver, &settings.library);
    Jukebox::new(
        EngineSettings::from_settings(settings),
        Arc::new(resolver),
        Arc::new(RodioSinkFactory),
        Arc::new(ConsoleNotifier::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn media_root_is_wiped_and_recreated() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("downloaded_music");
        std::fs::create_dir_all(root.join("1").join("req-1")).unwrap();
        std::fs::write(root.join("1").join("req-1").join("old.webm"), b"x").unwrap();

        let media = MediaSettings {
            root: root.clone(),
            wipe_on_startup: true,
        };
        prepare_media_root(&media).await.unwrap();
        assert!(root.is_dir());
        assert!(!root.join("1").exists());
    }

    #[tokio::test]
    async fn media_root_is_kept_when_wiping_is_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("media");
        std::fs::create_dir_all(root.join("1")).unwrap();

        let media = MediaSettings {
            root: root.clone(),
            wipe_on_startup: false,
        };
        prepare_media_root(&media).await.unwrap();
        assert!(root.join("1").is_dir());
    }
}
