use nickelsync_content::{ContentId, image_id};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::render::{CoverRenderer, decode_thumbnail};

/// Background cover generation for the books saved during a session.
///
/// One blocking task per book. Tasks run concurrently with the rest of the
/// session; [`join`](Self::join) must be awaited before the session is
/// considered complete.
#[derive(Debug)]
pub struct CoverPipeline {
    renderer: Arc<CoverRenderer>,
    tasks: JoinSet<usize>,
}

impl CoverPipeline {
    pub fn new(renderer: CoverRenderer) -> Self {
        Self { renderer: Arc::new(renderer), tasks: JoinSet::new() }
    }

    /// Queue cover generation for a book from Calibre's base64 thumbnail.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(&mut self, content_id: &ContentId, thumbnail: String) {
        if self.renderer.options().level.classes().is_empty() {
            return;
        }
        let renderer = Arc::clone(&self.renderer);
        let content_id = content_id.clone();
        self.tasks.spawn_blocking(move || {
            let image = match decode_thumbnail(&thumbnail) {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(%content_id, "could not decode cover thumbnail: {err:?}");
                    return 0;
                },
            };
            renderer.render(image, &image_id(&content_id)).len()
        });
    }

    /// Number of books whose covers are still being generated.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every queued task to finish. Returns the number of cover
    /// files written.
    pub async fn join(&mut self) -> usize {
        let mut written = 0;
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(count) => written += count,
                Err(err) => tracing::error!("cover task failed: {err}"),
            }
        }
        tracing::debug!(written, "cover generation finished");
        written
    }
}
