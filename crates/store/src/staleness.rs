use crate::codec::{snapshot_path, store_dir};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const WATERMARK_FILE: &str = "watermark.json";

/// Written beside the snapshot after a successful build; kept separate so
/// a cache-hit run never perturbs `snapshot.json` bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWatermark {
    pub built_at_unix_ms: u64,
    /// The artifact paths (compiled outputs or newest sources) the build
    /// actually consumed; these are what staleness is assessed against.
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    SnapshotMissing,
    WatermarkMissing,
    WatermarkCorrupt,
    ArtifactMissing,
    ArtifactNewer,
}

/// Outcome of a staleness assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDecision {
    pub fresh: bool,
    pub reasons: Vec<StaleReason>,
    /// Oldest artifact timestamp, the floor of the solution's build state.
    pub oldest_artifact_ms: Option<u64>,
}

#[must_use]
pub fn watermark_path(root: &Path) -> PathBuf {
    store_dir(root).join(WATERMARK_FILE)
}

pub async fn write_watermark(root: &Path, artifacts: Vec<PathBuf>) -> Result<()> {
    let dir = store_dir(root);
    tokio::fs::create_dir_all(&dir).await?;

    let persisted = StoredWatermark {
        built_at_unix_ms: unix_now_ms(),
        artifacts,
    };
    let bytes = serde_json::to_vec_pretty(&persisted)?;

    let path = watermark_path(root);
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

/// `Ok(None)` when no watermark exists; a corrupt one is also `None` (the
/// caller reports it as a stale reason, not an error).
pub async fn read_watermark(root: &Path) -> Result<Option<StoredWatermark>> {
    let path = watermark_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = tokio::fs::read(&path).await?;
    match serde_json::from_slice(&bytes) {
        Ok(mark) => Ok(Some(mark)),
        Err(err) => {
            log::warn!("corrupt watermark {}: {err}", path.display());
            Ok(None)
        }
    }
}

/// Pure staleness assessment.
///
/// The snapshot is reusable only when it exists and is at least as new as
/// every artifact it was built from; a touched or vanished artifact flips
/// the decision to a miss with the reason recorded.
#[must_use]
pub fn assess(
    snapshot_exists: bool,
    watermark: Option<&StoredWatermark>,
    watermark_corrupt: bool,
    artifact_mtimes_ms: &[Option<u64>],
) -> CacheDecision {
    let mut reasons = Vec::new();

    if !snapshot_exists {
        reasons.push(StaleReason::SnapshotMissing);
    }
    if watermark_corrupt {
        reasons.push(StaleReason::WatermarkCorrupt);
    }

    let oldest_artifact_ms = artifact_mtimes_ms.iter().flatten().copied().min();

    match watermark {
        None => {
            if !watermark_corrupt {
                reasons.push(StaleReason::WatermarkMissing);
            }
        }
        Some(mark) => {
            if artifact_mtimes_ms.iter().any(Option::is_none) {
                reasons.push(StaleReason::ArtifactMissing);
            }
            if artifact_mtimes_ms
                .iter()
                .flatten()
                .any(|&mtime| mtime > mark.built_at_unix_ms)
            {
                reasons.push(StaleReason::ArtifactNewer);
            }
        }
    }

    CacheDecision {
        fresh: reasons.is_empty(),
        reasons,
        oldest_artifact_ms,
    }
}

/// Assess a solution root against the artifacts recorded in its watermark.
pub async fn assess_solution(root: &Path) -> Result<CacheDecision> {
    let snapshot_exists = snapshot_path(root).exists();
    let watermark_present_on_disk = watermark_path(root).exists();
    let watermark = read_watermark(root).await?;
    let watermark_corrupt = watermark_present_on_disk && watermark.is_none();

    let mut mtimes = Vec::new();
    if let Some(mark) = &watermark {
        for artifact in &mark.artifacts {
            mtimes.push(mtime_ms(artifact).await);
        }
    }

    let decision = assess(
        snapshot_exists,
        watermark.as_ref(),
        watermark_corrupt,
        &mtimes,
    );
    log::debug!(
        "cache decision for {}: fresh={} reasons={:?}",
        root.display(),
        decision.fresh,
        decision.reasons
    );
    Ok(decision)
}

async fn mtime_ms(path: &Path) -> Option<u64> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_millis()).ok()
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mark(built_at: u64) -> StoredWatermark {
        StoredWatermark {
            built_at_unix_ms: built_at,
            artifacts: vec![PathBuf::from("bin/LibA.dll"), PathBuf::from("bin/AppB.exe")],
        }
    }

    #[test]
    fn fresh_when_snapshot_is_at_least_as_new_as_every_artifact() {
        let out = assess(true, Some(&mark(1_000)), false, &[Some(900), Some(1_000)]);
        assert!(out.fresh);
        assert_eq!(out.reasons, Vec::<StaleReason>::new());
        assert_eq!(out.oldest_artifact_ms, Some(900));
    }

    #[test]
    fn stale_when_any_artifact_is_newer() {
        let out = assess(true, Some(&mark(1_000)), false, &[Some(900), Some(1_001)]);
        assert!(!out.fresh);
        assert_eq!(out.reasons, vec![StaleReason::ArtifactNewer]);
    }

    #[test]
    fn touching_one_artifact_flips_a_hit_to_a_miss() {
        let before = assess(true, Some(&mark(1_000)), false, &[Some(500), Some(600)]);
        assert!(before.fresh);

        let after = assess(true, Some(&mark(1_000)), false, &[Some(500), Some(2_000)]);
        assert!(!after.fresh);
        assert_eq!(after.reasons, vec![StaleReason::ArtifactNewer]);
    }

    #[test]
    fn stale_when_snapshot_missing() {
        let out = assess(false, Some(&mark(1_000)), false, &[Some(900)]);
        assert!(!out.fresh);
        assert_eq!(out.reasons, vec![StaleReason::SnapshotMissing]);
    }

    #[test]
    fn stale_when_watermark_missing() {
        let out = assess(true, None, false, &[]);
        assert!(!out.fresh);
        assert_eq!(out.reasons, vec![StaleReason::WatermarkMissing]);
    }

    #[test]
    fn stale_when_watermark_corrupt() {
        let out = assess(true, None, true, &[]);
        assert!(!out.fresh);
        assert_eq!(out.reasons, vec![StaleReason::WatermarkCorrupt]);
    }

    #[test]
    fn stale_when_an_artifact_vanished() {
        let out = assess(true, Some(&mark(1_000)), false, &[Some(900), None]);
        assert!(!out.fresh);
        assert_eq!(out.reasons, vec![StaleReason::ArtifactMissing]);
    }

    #[tokio::test]
    async fn watermark_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = vec![dir.path().join("LibA.dll")];

        write_watermark(dir.path(), artifacts.clone()).await.unwrap();
        let restored = read_watermark(dir.path()).await.unwrap().unwrap();

        assert_eq!(restored.artifacts, artifacts);
        assert!(restored.built_at_unix_ms > 0);
    }

    #[tokio::test]
    async fn solution_assessment_reports_hit_after_build_and_miss_after_touch() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("LibA.dll");
        tokio::fs::write(&artifact, b"module bytes").await.unwrap();

        // Simulate a successful build: snapshot + watermark newer than the
        // artifact.
        tokio::fs::create_dir_all(store_dir(dir.path())).await.unwrap();
        tokio::fs::write(snapshot_path(dir.path()), b"{}").await.unwrap();
        write_watermark(dir.path(), vec![artifact.clone()]).await.unwrap();

        let decision = assess_solution(dir.path()).await.unwrap();
        assert!(decision.fresh, "reasons: {:?}", decision.reasons);

        // Touch the artifact so it postdates the watermark.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tokio::fs::write(&artifact, b"rebuilt module bytes").await.unwrap();

        let decision = assess_solution(dir.path()).await.unwrap();
        assert!(!decision.fresh);
        assert!(decision.reasons.contains(&StaleReason::ArtifactNewer));
    }
}
