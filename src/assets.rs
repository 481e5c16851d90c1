mod pool;
mod types;

pub use types::{Material, MaterialDesc, Mesh, Texture, Vertex};

use std::any::{Any, TypeId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use rustc_hash::FxHashMap;

use crate::error::{HandleError, LoadError};
use crate::handle::{Handle, HandleTable};

use pool::LoaderPool;

/// Whether a load links its dependencies inline or through the worker
/// pool. Passed down to [`Asset::build`] so a composite asset (a
/// material pulling in its diffuse texture) inherits the mode of the
/// request it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    Sync,
    Async,
}

/// A cacheable resource kind. `read_source` is the file-format loader:
/// it runs on a worker thread for async loads and must not touch the
/// cache. `build` runs on the owning thread and may request further
/// assets.
pub trait Asset: Sized + Send + 'static {
    const KIND: &'static str;

    type Source: Send + 'static;

    fn read_source(path: &Path) -> Result<Self::Source, LoadError>;

    fn build(source: Self::Source, cache: &mut AssetCache, mode: LoadMode) -> Result<Self, LoadError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetStatus {
    Absent,
    Loading,
    Ready,
}

/// An asynchronous load that did not produce a value. The key was
/// removed from the cache, so a later `load` starts over.
#[derive(Debug)]
pub struct FailedLoad {
    pub key: Arc<str>,
    pub error: LoadError,
}

#[derive(Clone, Copy)]
enum KeyState<A> {
    Loading(Handle<A>),
    Ready(Handle<A>),
}

impl<A> KeyState<A> {
    fn handle(&self) -> Handle<A> {
        match self {
            KeyState::Loading(handle) | KeyState::Ready(handle) => *handle,
        }
    }
}

struct KindStore<A: Asset> {
    table: HandleTable<A>,
    keys: FxHashMap<Arc<str>, KeyState<A>>,
}

impl<A: Asset> KindStore<A> {
    fn new() -> Self {
        Self {
            table: HandleTable::new(),
            keys: FxHashMap::default(),
        }
    }
}

type Completion = Box<dyn FnOnce(&mut AssetCache) -> Option<FailedLoad> + Send>;

pub struct CacheSettings {
    /// Keys are joined under this directory.
    pub root: PathBuf,
    pub loader_threads: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            loader_threads: usize::max(1, num_cpus::get_physical() - 1),
        }
    }
}

/// Deduplicating asset storage. Every key maps to at most one handle
/// per kind; repeated requests return that handle without touching the
/// loader again. Decode work can be pushed onto the loader pool, in
/// which case the returned handle stays pending (`NotReady`) until
/// [`Self::maintain`] applies the completion on the owning thread.
pub struct AssetCache {
    settings: CacheSettings,
    kinds: FxHashMap<TypeId, Box<dyn Any + Send>>,
    pool: LoaderPool,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl AssetCache {
    pub fn new(settings: CacheSettings) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        let pool = LoaderPool::new(settings.loader_threads);
        Self {
            settings,
            kinds: FxHashMap::default(),
            pool,
            completion_tx,
            completion_rx,
        }
    }

    fn kind_mut<A: Asset>(&mut self) -> &mut KindStore<A> {
        self.kinds
            .entry(TypeId::of::<A>())
            .or_insert_with(|| Box::new(KindStore::<A>::new()))
            .downcast_mut::<KindStore<A>>()
            .unwrap()
    }

    fn kind<A: Asset>(&self) -> Option<&KindStore<A>> {
        self.kinds
            .get(&TypeId::of::<A>())
            .map(|kind| kind.downcast_ref::<KindStore<A>>().unwrap())
    }

    /// Synchronous load. A key that is already mapped returns its
    /// handle without I/O; if the mapping is still in flight from an
    /// earlier [`Self::load_async`], the pending handle is returned
    /// rather than racing a second decode. On failure nothing is
    /// cached, so the next call retries from scratch.
    pub fn load<A: Asset>(&mut self, key: &str) -> Result<Handle<A>, LoadError> {
        if let Some(state) = self.kind_mut::<A>().keys.get(key) {
            return Ok(state.handle());
        }
        log::debug!("{} cache miss for {:?}, loading inline", A::KIND, key);
        let path = self.settings.root.join(key);
        let source = A::read_source(&path)?;
        let value = A::build(source, self, LoadMode::Sync)?;
        let kind = self.kind_mut::<A>();
        let handle = kind.table.allocate(value);
        kind.keys.insert(Arc::from(key), KeyState::Ready(handle));
        Ok(handle)
    }

    /// Deferred load. Returns a pending handle immediately and pushes
    /// the decode onto the loader pool; the handle resolves `NotReady`
    /// until a [`Self::maintain`] call has applied the completion.
    /// Repeated requests for an in-flight key all receive the same
    /// pending handle, only one decode runs.
    pub fn load_async<A: Asset>(&mut self, key: &str) -> Handle<A> {
        let kind = self.kind_mut::<A>();
        if let Some(state) = kind.keys.get(key) {
            return state.handle();
        }
        let handle = kind.table.reserve();
        let key: Arc<str> = Arc::from(key);
        kind.keys.insert(key.clone(), KeyState::Loading(handle));
        log::debug!("{} cache miss for {:?}, decode submitted", A::KIND, key);

        let path = self.settings.root.join(&*key);
        let completion_tx = self.completion_tx.clone();
        self.pool.submit(Box::new(move || {
            let result = A::read_source(&path);
            let apply: Completion =
                Box::new(move |cache| cache.finish_load::<A>(key, handle, result));
            // the receiver lives in the cache, send only fails mid-teardown
            let _ = completion_tx.send(apply);
        }));
        handle
    }

    /// Allocates a value constructed in-process. No key, no
    /// deduplication: two takes of identical values yield distinct
    /// handles.
    pub fn take<A: Asset>(&mut self, value: A) -> Handle<A> {
        self.kind_mut::<A>().table.allocate(value)
    }

    pub fn resolve<A: Asset>(&self, handle: Handle<A>) -> Result<&A, HandleError> {
        match self.kind::<A>() {
            Some(kind) => kind.table.get(handle),
            None => Err(HandleError::Stale),
        }
    }

    pub fn resolve_mut<A: Asset>(&mut self, handle: Handle<A>) -> Result<&mut A, HandleError> {
        self.kind_mut::<A>().table.get_mut(handle)
    }

    /// Removes the mapping and frees the underlying slot; outstanding
    /// handle copies go stale. Evicting a key that is still loading
    /// abandons the load, its completion is discarded on arrival.
    /// Absent keys are a no-op.
    pub fn evict<A: Asset>(&mut self, key: &str) {
        let kind = self.kind_mut::<A>();
        if let Some(state) = kind.keys.remove(key) {
            kind.table.free(state.handle());
            log::debug!("evicted {} {:?}", A::KIND, key);
        }
    }

    /// Frees a handle that came from [`Self::take`]. Key-addressed
    /// assets must go through [`Self::evict`] instead so the mapping
    /// dies with the slot.
    pub fn release<A: Asset>(&mut self, handle: Handle<A>) -> bool {
        self.kind_mut::<A>().table.free(handle)
    }

    pub fn status<A: Asset>(&self, key: &str) -> AssetStatus {
        match self.kind::<A>().and_then(|kind| kind.keys.get(key)) {
            None => AssetStatus::Absent,
            Some(KeyState::Loading(_)) => AssetStatus::Loading,
            Some(KeyState::Ready(_)) => AssetStatus::Ready,
        }
    }

    /// Number of live slots of a kind, pending ones included.
    pub fn len<A: Asset>(&self) -> usize {
        self.kind::<A>().map_or(0, |kind| kind.table.len())
    }

    /// Owning-thread pump. Drains finished decodes, links and fulfills
    /// their handles, and reports the loads that failed. Must be called
    /// once per frame while async loads are in use.
    pub fn maintain(&mut self) -> Vec<FailedLoad> {
        profiling::scope!("asset_cache_maintain");
        let mut failures = Vec::new();
        let completion_rx = self.completion_rx.clone();
        while let Ok(apply) = completion_rx.try_recv() {
            if let Some(failure) = apply(self) {
                failures.push(failure);
            }
        }
        failures
    }

    fn finish_load<A: Asset>(
        &mut self,
        key: Arc<str>,
        handle: Handle<A>,
        result: Result<A::Source, LoadError>,
    ) -> Option<FailedLoad> {
        // the key may have been evicted (and possibly re-requested)
        // while the decode was in flight
        let still_wanted = matches!(
            self.kind_mut::<A>().keys.get(&key),
            Some(KeyState::Loading(pending)) if *pending == handle
        );
        if !still_wanted {
            log::debug!("discarding abandoned {} load for {:?}", A::KIND, key);
            return None;
        }

        let built = match result {
            Ok(source) => A::build(source, self, LoadMode::Async),
            Err(error) => Err(error),
        };
        match built {
            Ok(value) => {
                let kind = self.kind_mut::<A>();
                match kind.table.fulfill(handle, value) {
                    Ok(()) => {
                        kind.keys.insert(key, KeyState::Ready(handle));
                    }
                    Err(_) => {
                        kind.keys.remove(&key);
                    }
                }
                None
            }
            Err(error) => {
                let kind = self.kind_mut::<A>();
                kind.table.free(handle);
                kind.keys.remove(&key);
                log::warn!("failed to load {} {:?}: {}", A::KIND, key, error);
                Some(FailedLoad { key, error })
            }
        }
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    static TEST_DIR: AtomicUsize = AtomicUsize::new(0);

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "grund-cache-test-{}-{}",
            std::process::id(),
            TEST_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cache_at(root: PathBuf) -> AssetCache {
        AssetCache::new(CacheSettings {
            root,
            loader_threads: 2,
        })
    }

    fn write_obj(root: &Path, name: &str) {
        std::fs::write(
            root.join(name),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
    }

    fn pump_until_settled<A: Asset>(cache: &mut AssetCache, key: &str) -> Vec<FailedLoad> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut failures = Vec::new();
        while cache.status::<A>(key) == AssetStatus::Loading {
            failures.extend(cache.maintain());
            assert!(Instant::now() < deadline, "load of {:?} never settled", key);
            std::thread::sleep(Duration::from_millis(1));
        }
        failures
    }

    #[test]
    fn sync_load_dedups_by_key() {
        let root = scratch_dir();
        write_obj(&root, "tri.obj");
        let mut cache = cache_at(root.clone());

        let first = cache.load::<Mesh>("tri.obj").unwrap();
        // deleting the file proves the second call never reaches the loader
        std::fs::remove_file(root.join("tri.obj")).unwrap();
        let second = cache.load::<Mesh>("tri.obj").unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.resolve(first).unwrap().indices.len(), 3);
        assert_eq!(cache.len::<Mesh>(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn take_never_dedups() {
        let mut cache = cache_at(scratch_dir());
        let mesh = Mesh {
            vertices: Vec::new(),
            indices: vec![0, 1, 2],
        };
        let a = cache.take(mesh.clone());
        let b = cache.take(mesh);
        assert_ne!(a, b);
        assert_eq!(cache.len::<Mesh>(), 2);
    }

    #[test]
    fn load_failure_does_not_poison_the_key() {
        let root = scratch_dir();
        let mut cache = cache_at(root.clone());

        assert!(cache.load::<Mesh>("missing.obj").is_err());
        assert_eq!(cache.status::<Mesh>("missing.obj"), AssetStatus::Absent);

        write_obj(&root, "missing.obj");
        assert!(cache.load::<Mesh>("missing.obj").is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn evict_makes_outstanding_handles_stale() {
        let root = scratch_dir();
        write_obj(&root, "tri.obj");
        let mut cache = cache_at(root.clone());

        let handle = cache.load::<Mesh>("tri.obj").unwrap();
        cache.evict::<Mesh>("tri.obj");
        assert_eq!(cache.resolve(handle), Err(HandleError::Stale));
        assert_eq!(cache.status::<Mesh>("tri.obj"), AssetStatus::Absent);

        // absent key is a no-op
        cache.evict::<Mesh>("tri.obj");

        // a fresh load allocates a new slot generation
        let again = cache.load::<Mesh>("tri.obj").unwrap();
        assert_ne!(again, handle);
        assert!(cache.resolve(again).is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn async_load_is_pending_until_maintain() {
        let root = scratch_dir();
        write_obj(&root, "tri.obj");
        let mut cache = cache_at(root.clone());

        let handle = cache.load_async::<Mesh>("tri.obj");
        assert_eq!(cache.status::<Mesh>("tri.obj"), AssetStatus::Loading);
        // also the second caller sees the same pending handle
        assert_eq!(cache.load_async::<Mesh>("tri.obj"), handle);
        assert_eq!(cache.len::<Mesh>(), 1);

        let failures = pump_until_settled::<Mesh>(&mut cache, "tri.obj");
        assert!(failures.is_empty());
        assert_eq!(cache.status::<Mesh>("tri.obj"), AssetStatus::Ready);
        assert_eq!(cache.resolve(handle).unwrap().vertices.len(), 3);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn pending_handle_resolves_not_ready() {
        let root = scratch_dir();
        write_obj(&root, "tri.obj");
        let mut cache = cache_at(root.clone());

        let handle = cache.load_async::<Mesh>("tri.obj");
        // no maintain yet, the completion cannot have been applied
        assert_eq!(cache.resolve(handle), Err(HandleError::NotReady));

        pump_until_settled::<Mesh>(&mut cache, "tri.obj");
        assert!(cache.resolve(handle).is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn sync_load_of_inflight_key_returns_pending_handle() {
        let root = scratch_dir();
        write_obj(&root, "tri.obj");
        let mut cache = cache_at(root.clone());

        let pending = cache.load_async::<Mesh>("tri.obj");
        let synced = cache.load::<Mesh>("tri.obj").unwrap();
        assert_eq!(pending, synced);
        assert_eq!(cache.len::<Mesh>(), 1);
        pump_until_settled::<Mesh>(&mut cache, "tri.obj");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn async_failure_is_reported_and_retryable() {
        let root = scratch_dir();
        let mut cache = cache_at(root.clone());

        let handle = cache.load_async::<Mesh>("late.obj");
        let failures = pump_until_settled::<Mesh>(&mut cache, "late.obj");
        assert_eq!(failures.len(), 1);
        assert_eq!(&*failures[0].key, "late.obj");
        assert_eq!(cache.status::<Mesh>("late.obj"), AssetStatus::Absent);
        assert_eq!(cache.resolve(handle), Err(HandleError::Stale));

        write_obj(&root, "late.obj");
        let retry = cache.load_async::<Mesh>("late.obj");
        let failures = pump_until_settled::<Mesh>(&mut cache, "late.obj");
        assert!(failures.is_empty());
        assert!(cache.resolve(retry).is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn evict_during_flight_abandons_the_load() {
        let root = scratch_dir();
        write_obj(&root, "tri.obj");
        let mut cache = cache_at(root.clone());

        let handle = cache.load_async::<Mesh>("tri.obj");
        cache.evict::<Mesh>("tri.obj");
        assert_eq!(cache.resolve(handle), Err(HandleError::Stale));

        // give the stray completion time to arrive, it must be discarded
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            assert!(cache.maintain().is_empty());
            assert_eq!(cache.len::<Mesh>(), 0);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(cache.status::<Mesh>("tri.obj"), AssetStatus::Absent);
        assert_eq!(cache.resolve(handle), Err(HandleError::Stale));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn material_links_its_diffuse_texture() {
        let root = scratch_dir();
        std::fs::write(
            root.join("mat.toml"),
            "base_color = [0.5, 0.5, 0.5, 1.0]\ndiffuse = \"checker.png\"\n",
        )
        .unwrap();
        image::save_buffer(
            root.join("checker.png"),
            &[255u8, 0, 255, 255],
            1,
            1,
            image::ColorType::Rgba8,
        )
        .unwrap();
        let mut cache = cache_at(root.clone());

        let material = cache.load::<Material>("mat.toml").unwrap();
        let diffuse = cache.resolve(material).unwrap().diffuse.unwrap();
        let texture = cache.resolve(diffuse).unwrap();
        assert_eq!((texture.width, texture.height), (1, 1));
        assert_eq!(texture.pixels, vec![255, 0, 255, 255]);

        // the texture is key-cached, another material load reuses it
        std::fs::write(
            root.join("mat2.toml"),
            "diffuse = \"checker.png\"\n",
        )
        .unwrap();
        let other = cache.load::<Material>("mat2.toml").unwrap();
        assert_eq!(cache.resolve(other).unwrap().diffuse, Some(diffuse));
        assert_eq!(cache.len::<Texture>(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn async_material_links_asynchronously() {
        let root = scratch_dir();
        std::fs::write(root.join("mat.toml"), "diffuse = \"checker.png\"\n").unwrap();
        image::save_buffer(
            root.join("checker.png"),
            &[1u8, 2, 3, 4],
            1,
            1,
            image::ColorType::Rgba8,
        )
        .unwrap();
        let mut cache = cache_at(root.clone());

        let material = cache.load_async::<Material>("mat.toml");
        pump_until_settled::<Material>(&mut cache, "mat.toml");
        let diffuse = cache.resolve(material).unwrap().diffuse.unwrap();
        pump_until_settled::<Texture>(&mut cache, "checker.png");
        assert!(cache.resolve(diffuse).is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn release_frees_taken_handles() {
        let mut cache = cache_at(scratch_dir());
        let handle = cache.take(Mesh {
            vertices: Vec::new(),
            indices: Vec::new(),
        });
        assert!(cache.release(handle));
        assert!(!cache.release(handle));
        assert_eq!(cache.resolve(handle), Err(HandleError::Stale));
    }
}
