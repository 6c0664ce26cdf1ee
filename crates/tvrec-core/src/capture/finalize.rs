//! Post-processing of a recorded capture: final names, thumbnails, probing.

use super::supervisor::{CaptureSupervisor, RecordedCapture};
use super::{Artifact, CaptureError, CapturePlan, RemoveOnDrop};
use crate::media::Quality;
use crate::naming::ArtifactName;

impl CaptureSupervisor {
    /// Turns each output unit into an `Artifact`: renames it to a
    /// collision-resistant final name, extracts a thumbnail and measures the
    /// duration (falling back to the requested length) and quality.
    ///
    /// On error, artifacts finalized so far are removed.
    pub async fn finalize(
        &self,
        plan: &CapturePlan,
        recorded: RecordedCapture,
    ) -> Result<Vec<Artifact>, CaptureError> {
        let count = recorded.files.len();
        let mut artifacts = Vec::with_capacity(count);
        let mut created = RemoveOnDrop::default();

        for (index, file) in recorded.files.iter().enumerate() {
            let quality = match self.media.media_quality(file).await {
                Ok(q) => q,
                Err(e) => {
                    tracing::warn!(path = %file.display(), "reading quality failed: {:#}", e);
                    Quality::Unknown
                }
            };
            let name = ArtifactName {
                title: &plan.title,
                channel: &plan.channel,
                started_at: plan.started_at,
                ended_at: plan.planned_end(),
                part: (count > 1).then_some(index + 1),
                quality: quality.label(),
                ext: &plan.ext,
            }
            .render();
            let path = plan.dir.join(&name);
            tokio::fs::rename(file, &path).await?;
            created.push(path.clone());

            let thumb = plan.dir.join(format!("{}.jpg", name));
            let thumbnail = match self.media.extract_thumbnail(&path, &thumb).await {
                Ok(()) if thumb.exists() => {
                    created.push(thumb.clone());
                    Some(thumb)
                }
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "thumbnail extraction failed: {:#}", e);
                    let _ = tokio::fs::remove_file(&thumb).await;
                    None
                }
            };

            let fallback = fallback_duration(plan, &recorded);
            let duration_secs = match self.media.media_duration(&path).await {
                Ok(d) if d.is_finite() && d > 0.0 => d,
                Ok(d) => {
                    tracing::warn!(path = %path.display(), measured = d, "unusable measured duration");
                    fallback
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "reading duration failed: {:#}", e);
                    fallback
                }
            };

            let size = tokio::fs::metadata(&path).await?.len();
            tracing::debug!(job_id = %plan.job, path = %path.display(), size, duration_secs, %quality, "artifact ready");
            artifacts.push(Artifact {
                path,
                size,
                duration_secs,
                thumbnail,
                index,
                quality,
            });
        }

        created.disarm();
        Ok(artifacts)
    }
}

/// Duration assumed for an output unit whose duration could not be read.
fn fallback_duration(plan: &CapturePlan, recorded: &RecordedCapture) -> f64 {
    match (plan.segment_secs, plan.duration_secs) {
        (Some(seg), total) if total == 0 || seg < total => seg as f64,
        (_, 0) => recorded.elapsed.as_secs_f64(),
        (_, total) => total as f64,
    }
}

