//! Media catalog: every imported asset and what the pipeline knows about it.

use montage_core::{
    AssetId, AssetLookup, AssetStatus, IdGenerator, MediaAsset, MediaMetadata, MontageError,
    Result,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct CatalogState {
    assets: BTreeMap<AssetId, MediaAsset>,
    by_path: HashMap<PathBuf, AssetId>,
}

/// Registry of imported media.
///
/// Status only moves forward (`Pending → Probed → ProxyReady`, or to
/// `Failed`), and only the scheduler drives those transitions.
#[derive(Debug, Default)]
pub struct MediaCatalog {
    state: Mutex<CatalogState>,
    ids: IdGenerator,
}

impl MediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file, returning the existing id for a known path.
    ///
    /// A previously failed asset is reset to `Pending` for another attempt.
    pub fn register_asset(&self, path: impl AsRef<Path>) -> Result<AssetId> {
        let path = normalize(path.as_ref())?;
        let mut state = self.state.lock();

        if let Some(&id) = state.by_path.get(&path) {
            if let Some(asset) = state.assets.get_mut(&id) {
                if asset.status == AssetStatus::Failed {
                    asset.status = AssetStatus::Pending;
                    asset.failure = None;
                    asset.metadata = None;
                    asset.proxy_path = None;
                    asset.attempt += 1;
                    info!(asset = %id, attempt = asset.attempt, "re-registered failed asset");
                }
            }
            return Ok(id);
        }

        let id = AssetId::from_raw(self.ids.next_raw());
        info!(asset = %id, path = %path.display(), "registered asset");
        state.by_path.insert(path.clone(), id);
        state.assets.insert(id, MediaAsset::new(id, path));
        Ok(id)
    }

    pub fn get(&self, id: AssetId) -> Option<MediaAsset> {
        self.state.lock().assets.get(&id).cloned()
    }

    pub fn status(&self, id: AssetId) -> Option<AssetStatus> {
        self.state.lock().assets.get(&id).map(|a| a.status)
    }

    /// Look up by path; the path is normalized the same way registration does.
    pub fn find_by_path(&self, path: impl AsRef<Path>) -> Option<MediaAsset> {
        let path = normalize(path.as_ref()).ok()?;
        let state = self.state.lock();
        let id = state.by_path.get(&path)?;
        state.assets.get(id).cloned()
    }

    /// All assets in registration order.
    pub fn list(&self) -> Vec<MediaAsset> {
        self.state.lock().assets.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn on_probed(&self, id: AssetId, metadata: MediaMetadata) -> Result<()> {
        self.transition(id, AssetStatus::Probed, |asset| {
            asset.metadata = Some(metadata);
        })
    }

    pub(crate) fn on_proxy_ready(&self, id: AssetId, proxy_path: PathBuf) -> Result<()> {
        self.transition(id, AssetStatus::ProxyReady, |asset| {
            asset.proxy_path = Some(proxy_path);
        })
    }

    pub(crate) fn on_failed(&self, id: AssetId, reason: &str) -> Result<()> {
        self.transition(id, AssetStatus::Failed, |asset| {
            asset.failure = Some(reason.to_string());
        })
    }

    fn transition(
        &self,
        id: AssetId,
        to: AssetStatus,
        apply: impl FnOnce(&mut MediaAsset),
    ) -> Result<()> {
        let mut state = self.state.lock();
        let asset = state
            .assets
            .get_mut(&id)
            .ok_or_else(|| MontageError::NotFound(format!("asset {id}")))?;

        let from = asset.status;
        let allowed = matches!(
            (from, to),
            (AssetStatus::Pending, AssetStatus::Probed)
                | (AssetStatus::Probed, AssetStatus::ProxyReady)
                | (AssetStatus::Pending | AssetStatus::Probed, AssetStatus::Failed)
        );
        if !allowed {
            warn!(asset = %id, %from, %to, "refused asset transition");
            return Err(MontageError::InvalidTransition {
                asset_id: id,
                from,
                to,
            });
        }

        asset.status = to;
        apply(asset);
        info!(asset = %id, %from, %to, "asset status changed");
        Ok(())
    }
}

impl AssetLookup for MediaCatalog {
    fn asset(&self, id: AssetId) -> Option<MediaAsset> {
        self.get(id)
    }
}

/// Absolute path with `.` and `..` resolved; symlinks too when the file exists.
fn normalize(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(path)?;
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}
