use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use dbkeeper_core::{Artifact, EngineError};
use dbkeeper_storage::{ArtifactStore, DiskSpaceProbe, DiskStats};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What the configured policy saw on one admission pass. Recomputed for
/// every pass, never cached: the pool is shared and changes underneath us.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionSnapshot {
    pub free_bytes: u64,
    pub total_bytes: u64,
    /// Largest single artifact anywhere in the pool, a conservative proxy
    /// for the space the next backup might need.
    pub largest_artifact_bytes: u64,
}

/// Space-pressure admission rule. Both policies sit behind the same
/// interface; the active one is a configuration choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionPolicy {
    /// Require `free / total >= reserved_fraction` of the volume.
    /// Bounds steady-state headroom.
    Ratio { reserved_fraction: f64 },
    /// Require `largest_artifact * safety_multiplier <= free`. The
    /// multiplier tolerates a burst of uncompressed intermediate data
    /// while a dump runs.
    Margin { safety_multiplier: u64 },
}

impl AdmissionPolicy {
    pub const DEFAULT_RESERVED_FRACTION: f64 = 0.10;
    pub const DEFAULT_SAFETY_MULTIPLIER: u64 = 8;

    pub fn admits(&self, snapshot: &AdmissionSnapshot) -> bool {
        match *self {
            Self::Ratio { reserved_fraction } => {
                snapshot.total_bytes > 0
                    && snapshot.free_bytes as f64 / snapshot.total_bytes as f64
                        >= reserved_fraction
            }
            Self::Margin { safety_multiplier } => {
                snapshot
                    .largest_artifact_bytes
                    .saturating_mul(safety_multiplier)
                    <= snapshot.free_bytes
            }
        }
    }
}

/// Gates every backup attempt on disk capacity, evicting from the shared
/// artifact pool until the configured policy admits.
///
/// Retention counts are per-schedule but disk space is shared, so this
/// controller reads across every schedule's directory and may evict any
/// schedule's oldest artifact.
pub struct AdmissionController {
    store: ArtifactStore,
    probe: Arc<dyn DiskSpaceProbe>,
    policy: AdmissionPolicy,
    mount_point: PathBuf,
    directories: Vec<PathBuf>,
    // Serializes the evict-reprobe loop so two schedules never race to
    // delete the same selection. Deletes stay idempotent regardless.
    evict_gate: Mutex<()>,
}

impl AdmissionController {
    pub fn new(
        store: ArtifactStore,
        probe: Arc<dyn DiskSpaceProbe>,
        policy: AdmissionPolicy,
        mount_point: PathBuf,
        directories: Vec<PathBuf>,
    ) -> Self {
        Self {
            store,
            probe,
            policy,
            mount_point,
            directories,
            evict_gate: Mutex::new(()),
        }
    }

    /// Admission check over the shared pool.
    ///
    /// While the policy rejects, evicts the globally-oldest artifact and
    /// re-probes. The loop is bounded: each pass removes exactly one
    /// artifact, so after `initial pool size + 1` passes either the policy
    /// holds or nothing is left and the attempt fails with
    /// `DiskPressureUnresolved`. In-flight dumps write under a `.part` name
    /// the store does not recognize, so they are never eviction candidates.
    pub async fn ensure_capacity(&self) -> Result<()> {
        let _gate = self.evict_gate.lock().await;

        let mut pool = self.pool()?;
        let passes = pool.len() + 1;
        for pass in 0..passes {
            if pass > 0 {
                pool = self.pool()?;
            }
            let snapshot = self.snapshot(&pool)?;
            if self.policy.admits(&snapshot) {
                debug!(
                    free_bytes = snapshot.free_bytes,
                    total_bytes = snapshot.total_bytes,
                    largest_artifact_bytes = snapshot.largest_artifact_bytes,
                    "admission granted"
                );
                return Ok(());
            }

            let Some(oldest) = globally_oldest(&pool) else {
                return Err(EngineError::DiskPressureUnresolved {
                    free_bytes: snapshot.free_bytes,
                    total_bytes: snapshot.total_bytes,
                }
                .into());
            };
            info!(
                path = %oldest.path.display(),
                size_bytes = oldest.size_bytes,
                free_bytes = snapshot.free_bytes,
                "evicting oldest artifact under disk pressure"
            );
            self.store.delete(oldest)?;
        }

        // The pool grew as fast as we evicted; report the pressure instead
        // of looping further.
        let snapshot = self.snapshot(&[])?;
        Err(EngineError::DiskPressureUnresolved {
            free_bytes: snapshot.free_bytes,
            total_bytes: snapshot.total_bytes,
        }
        .into())
    }

    fn pool(&self) -> Result<Vec<Artifact>> {
        let mut all = Vec::new();
        for directory in &self.directories {
            all.extend(self.store.list(directory)?);
        }
        Ok(all)
    }

    fn snapshot(&self, pool: &[Artifact]) -> Result<AdmissionSnapshot> {
        let stats: DiskStats = self.probe.stats(&self.mount_point)?;
        Ok(AdmissionSnapshot {
            free_bytes: stats.free_bytes,
            total_bytes: stats.total_bytes,
            largest_artifact_bytes: pool.iter().map(|a| a.size_bytes).max().unwrap_or(0),
        })
    }
}

/// Oldest `created_at` across the whole pool; equal timestamps fall back to
/// lexical directory order so eviction stays reproducible.
fn globally_oldest(pool: &[Artifact]) -> Option<&Artifact> {
    pool.iter().min_by(|a, b| {
        (a.created_at_ms, a.directory()).cmp(&(b.created_at_ms, b.directory()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    const GB: u64 = 1 << 30;

    /// Plays back a scripted sequence of stats, repeating the last one.
    struct ScriptedProbe {
        responses: StdMutex<VecDeque<DiskStats>>,
        last: DiskStats,
    }

    impl ScriptedProbe {
        fn new(responses: impl IntoIterator<Item = DiskStats>) -> Self {
            let responses: VecDeque<_> = responses.into_iter().collect();
            let last = *responses.back().expect("at least one scripted response");
            Self {
                responses: StdMutex::new(responses),
                last,
            }
        }
    }

    impl DiskSpaceProbe for ScriptedProbe {
        fn stats(&self, _mount_point: &Path) -> Result<DiskStats, EngineError> {
            let mut responses = self.responses.lock().unwrap();
            Ok(if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                self.last
            })
        }
    }

    struct FailingProbe;

    impl DiskSpaceProbe for FailingProbe {
        fn stats(&self, _mount_point: &Path) -> Result<DiskStats, EngineError> {
            Err(EngineError::Probe("probe exploded".into()))
        }
    }

    fn write_artifact(dir: &Path, created_at_ms: i64, size: usize) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{created_at_ms}.sql")), vec![0u8; size]).unwrap();
    }

    fn controller(
        probe: Arc<dyn DiskSpaceProbe>,
        policy: AdmissionPolicy,
        directories: Vec<PathBuf>,
    ) -> AdmissionController {
        AdmissionController::new(
            ArtifactStore::new(),
            probe,
            policy,
            PathBuf::from("/"),
            directories,
        )
    }

    #[tokio::test]
    async fn admits_when_ratio_holds() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), 100, 8);
        let probe = Arc::new(ScriptedProbe::new([DiskStats {
            free_bytes: 50 * GB,
            total_bytes: 100 * GB,
        }]));
        let ctrl = controller(
            probe,
            AdmissionPolicy::Ratio {
                reserved_fraction: 0.10,
            },
            vec![tmp.path().to_path_buf()],
        );
        ctrl.ensure_capacity().await.unwrap();
        assert_eq!(ArtifactStore::new().list(tmp.path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ratio_pressure_evicts_oldest_then_admits() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), 100, 8);
        write_artifact(tmp.path(), 200, 8);
        // Below the 10% reserve, then healthy after one eviction.
        let probe = Arc::new(ScriptedProbe::new([
            DiskStats {
                free_bytes: 5 * GB,
                total_bytes: 100 * GB,
            },
            DiskStats {
                free_bytes: 15 * GB,
                total_bytes: 100 * GB,
            },
        ]));
        let ctrl = controller(
            probe,
            AdmissionPolicy::Ratio {
                reserved_fraction: 0.10,
            },
            vec![tmp.path().to_path_buf()],
        );
        ctrl.ensure_capacity().await.unwrap();

        let remaining = ArtifactStore::new().list(tmp.path()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].created_at_ms, 200);
    }

    #[tokio::test]
    async fn unresolvable_pressure_empties_pool_then_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), 100, 1 << 20);
        write_artifact(tmp.path(), 200, 1 << 20);
        write_artifact(tmp.path(), 300, 1 << 20);
        let probe = Arc::new(ScriptedProbe::new([DiskStats {
            free_bytes: 5 * GB,
            total_bytes: 100 * GB,
        }]));
        let ctrl = controller(
            probe,
            AdmissionPolicy::Ratio {
                reserved_fraction: 0.10,
            },
            vec![tmp.path().to_path_buf()],
        );

        let err = ctrl.ensure_capacity().await.unwrap_err();
        let engine_err = err.downcast_ref::<EngineError>().unwrap();
        assert!(engine_err.is_disk_pressure());
        // Everything was evicted before giving up.
        assert!(ArtifactStore::new().list(tmp.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn margin_policy_uses_largest_artifact_across_schedules() {
        let tmp = tempfile::tempdir().unwrap();
        let dir_a = tmp.path().join("a");
        let dir_b = tmp.path().join("b");
        write_artifact(&dir_a, 100, 16);
        write_artifact(&dir_b, 200, 1024);

        // free = 4096 < 1024 * 8: pressure until the big artifact is one of
        // the evicted, but eviction goes oldest-first so the small one in
        // `a` goes before the large one in `b`.
        let probe = Arc::new(ScriptedProbe::new([DiskStats {
            free_bytes: 4096,
            total_bytes: 1 << 40,
        }]));
        let ctrl = controller(
            probe,
            AdmissionPolicy::Margin {
                safety_multiplier: 8,
            },
            vec![dir_a.clone(), dir_b.clone()],
        );
        ctrl.ensure_capacity().await.unwrap();

        let store = ArtifactStore::new();
        assert!(store.list(&dir_a).unwrap().is_empty());
        assert!(store.list(&dir_b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn margin_policy_admits_empty_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Arc::new(ScriptedProbe::new([DiskStats {
            free_bytes: 1024,
            total_bytes: 1 << 40,
        }]));
        let ctrl = controller(
            probe,
            AdmissionPolicy::Margin {
                safety_multiplier: 8,
            },
            vec![tmp.path().to_path_buf()],
        );
        ctrl.ensure_capacity().await.unwrap();
    }

    #[tokio::test]
    async fn equal_timestamps_evict_lexically_first_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir_a = tmp.path().join("alpha");
        let dir_b = tmp.path().join("beta");
        write_artifact(&dir_a, 100, 4);
        write_artifact(&dir_b, 100, 4);
        let probe = Arc::new(ScriptedProbe::new([
            DiskStats {
                free_bytes: 1 * GB,
                total_bytes: 100 * GB,
            },
            DiskStats {
                free_bytes: 20 * GB,
                total_bytes: 100 * GB,
            },
        ]));
        let ctrl = controller(
            probe,
            AdmissionPolicy::Ratio {
                reserved_fraction: 0.10,
            },
            vec![dir_a.clone(), dir_b.clone()],
        );
        ctrl.ensure_capacity().await.unwrap();

        let store = ArtifactStore::new();
        assert!(store.list(&dir_a).unwrap().is_empty());
        assert_eq!(store.list(&dir_b).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn probe_failure_fails_the_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), 100, 4);
        let ctrl = controller(
            Arc::new(FailingProbe),
            AdmissionPolicy::Ratio {
                reserved_fraction: 0.10,
            },
            vec![tmp.path().to_path_buf()],
        );

        let err = ctrl.ensure_capacity().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Probe(_))
        ));
        // Nothing was evicted on the strength of a failed probe.
        assert_eq!(ArtifactStore::new().list(tmp.path()).unwrap().len(), 1);
    }
}
