//! Texture Replacer
//!
//! Entry point for the renderer. Holds the active pack, its configuration
//! snapshot, the replacement cache and the save pipeline, and wires them to
//! the task pool and session clock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use retexture_core::{
    CacheBudget, ResidentStats, SharedClock, ShutdownMode, SystemClock, Task, TaskKind, TaskPool,
    TaskPriority,
};
use retexture_platform::{ensure_save_dir, open_pack, PackSource, VfsBackend, NEW_TEXTURE_DIR};
use smallvec::SmallVec;

use crate::cache::{CacheLookup, ReplacementCache, TextureHandle};
use crate::config::{PackConfig, PackSummary, ReplacerSettings};
use crate::decimate::{self, DecimateMode, DecimationReport};
use crate::hash::{self, HashRequest};
use crate::key::{hash_name, ReplacementKey, TextureFiltering, MAX_REPLACEMENT_MIP_LEVELS};
use crate::loader::load_pack_config;
use crate::overrides::AliasLookup;
use crate::save::{DecodedTexture, ReplacedTextureDecodeInfo, SaveContext, SaveOutcome, SavePipeline};
use crate::texture::{ImageDecoder, ReplacedTexture, ReplacementDesc, ReplacementState, TextureDecoder};

const FILENAME_WARNING: &str = "textures.ini filenames may not be cross-platform (banned characters)";

/// Receives user-facing notifications
pub trait HostNotifier: Send + Sync {
    /// Show a transient message for `duration_secs`
    fn notify_user_message(&self, message: &str, duration_secs: f32);
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl HostNotifier for LogNotifier {
    fn notify_user_message(&self, message: &str, _duration_secs: f32) {
        log::warn!("{}", message);
    }
}

/// Texture replacement front end
pub struct TextureReplacer {
    settings: ReplacerSettings,
    enabled: bool,
    base_path: PathBuf,
    new_texture_dir: PathBuf,
    source: Option<PackSource>,
    config: Arc<PackConfig>,
    generation: u64,
    cache: ReplacementCache,
    saves: SavePipeline,
    budget: CacheBudget,
    resident: ResidentStats,
    decoder: Arc<dyn TextureDecoder>,
    pool: TaskPool,
    clock: SharedClock,
    host: Arc<dyn HostNotifier>,
}

impl TextureReplacer {
    /// Create a disabled replacer. Call
    /// [`notify_config_changed`](Self::notify_config_changed) to activate it.
    pub fn new(settings: ReplacerSettings, host: Arc<dyn HostNotifier>) -> Self {
        Self {
            settings,
            enabled: false,
            base_path: PathBuf::new(),
            new_texture_dir: PathBuf::new(),
            source: None,
            config: Arc::new(PackConfig::default()),
            generation: 0,
            cache: ReplacementCache::new(),
            saves: SavePipeline::default(),
            budget: CacheBudget::default(),
            resident: ResidentStats::new(),
            decoder: Arc::new(ImageDecoder),
            pool: TaskPool::with_cores(),
            clock: Arc::new(SystemClock::new()),
            host,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TextureDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_pool(mut self, pool: TaskPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_budget(mut self, budget: CacheBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Replace the host settings and re-evaluate
    pub fn update_settings(&mut self, settings: ReplacerSettings) {
        self.settings = settings;
        self.notify_config_changed();
    }

    /// Re-read host settings and reload the pack.
    ///
    /// Replacement is active when replacing or saving is switched on and the
    /// title's pack directory exists. Disabling drops the pack and purges
    /// every loaded texture.
    pub fn notify_config_changed(&mut self) {
        let was_enabled = self.enabled;
        self.enabled = self.settings.replace_textures || self.settings.save_new_textures;

        if self.enabled {
            if self.settings.game_id.is_empty() {
                log::warn!("Texture replacement needs a game ID");
                self.enabled = false;
            } else {
                self.base_path = self.settings.pack_dir();
                self.new_texture_dir = self.base_path.join(NEW_TEXTURE_DIR);

                if self.settings.save_new_textures {
                    if let Err(err) = ensure_save_dir(&self.new_texture_dir) {
                        log::error!("Failed to create {}: {}", self.new_texture_dir.display(), err);
                    }
                }
                self.enabled = self.base_path.is_dir();
            }
        }

        if !self.enabled {
            if was_enabled {
                self.source = None;
                self.decimate(DecimateMode::PurgeAll);
            }
            return;
        }

        self.enabled = self.load_pack();
    }

    fn load_pack(&mut self) -> bool {
        let source = open_pack(&self.base_path);
        self.generation += 1;

        // First-level entries and save records encode the old snapshot.
        self.cache.clear_index();
        self.saves.clear();

        match load_pack_config(&source, &self.settings, self.generation) {
            Ok(loaded) => {
                if loaded.filename_warning {
                    self.host.notify_user_message(FILENAME_WARNING, 6.0);
                }
                log::info!("Texture pack activated from '{}'", source.vfs.describe());
                self.config = Arc::new(loaded.config);
                self.source = Some(source);
                true
            }
            Err(err) => {
                log::error!("Texture pack disabled: {}", err);
                self.config = Arc::new(PackConfig {
                    generation: self.generation,
                    ..PackConfig::default()
                });
                self.source = None;
                false
            }
        }
    }

    /// Whether replacing or saving is active
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn settings(&self) -> &ReplacerSettings {
        &self.settings
    }

    /// Active configuration snapshot
    pub fn config(&self) -> &Arc<PackConfig> {
        &self.config
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn new_texture_dir(&self) -> &Path {
        &self.new_texture_dir
    }

    pub fn cache(&self) -> &ReplacementCache {
        &self.cache
    }

    pub fn resident_stats(&self) -> &ResidentStats {
        &self.resident
    }

    pub fn pack_summary(&self) -> PackSummary {
        self.config.summary()
    }

    /// Fingerprint a texture. Only valid while enabled.
    pub fn compute_hash(&self, memory: &[u8], req: &HashRequest) -> u32 {
        debug_assert!(self.enabled, "Replacement not enabled");
        hash::compute_hash(&self.config, memory, req)
    }

    /// Handle to the replacement for a texture, if the pack has one.
    ///
    /// Always `None` while only saving. The asset is created without loading
    /// any pixel data; see [`poll_texture`](Self::poll_texture).
    pub fn find_replacement(&self, cache_key: u64, hash: u32, w: u32, h: u32) -> Option<TextureHandle> {
        if !self.enabled || !self.settings.replace_textures {
            return None;
        }

        let config = &self.config;
        let location = config.effective_location(cache_key);
        let key = ReplacementKey::new(location, hash);
        match self.cache.lookup(&key) {
            CacheLookup::Hit(texture) => return Some(texture),
            CacheLookup::Ignored => return None,
            CacheLookup::Miss => {}
        }

        let (new_w, new_h) = config
            .overrides
            .lookup_hash_range((cache_key >> 32) as u32, w, h)
            .unwrap_or((w, h));

        let alias = config
            .overrides
            .lookup_hash_file(location, hash, config.ignore_address);
        if alias.ignored() {
            self.cache.insert_ignored(key);
            return None;
        }

        let (filenames, hash_files): (SmallVec<[String; 4]>, String) = match alias {
            AliasLookup::Files(files) => (files.split('|').map(str::to_string).collect(), files.to_string()),
            _ => {
                let names: SmallVec<[String; 4]> = (0..MAX_REPLACEMENT_MIP_LEVELS)
                    .map(|level| format!("{}.png", hash_name(location, hash, level)))
                    .collect();
                let first = names[0].clone();
                (names, first)
            }
        };

        let force_filtering = config
            .overrides
            .find_filtering(location, hash, config.ignore_address);
        let (texture, created) = self.cache.get_or_create(key, &hash_files, || {
            ReplacedTexture::new(ReplacementDesc {
                new_w,
                new_h,
                w,
                h,
                key,
                force_filtering,
                filenames,
                log_id: hash_files.clone(),
                hash_files: hash_files.clone(),
            })
        });
        if created {
            log::debug!("New replacement {} for {}", hash_files, key);
        }
        Some(texture)
    }

    /// Filtering mode forced by the pack for a texture
    pub fn find_filtering(&self, cache_key: u64, hash: u32) -> Option<TextureFiltering> {
        if !self.enabled || !self.settings.replace_textures {
            return None;
        }
        let location = self.config.effective_location(cache_key);
        self.config
            .overrides
            .find_filtering(location, hash, self.config.ignore_address)
    }

    /// Alias resolution for a texture
    pub fn lookup_hash_file(&self, cache_key: u64, hash: u32) -> AliasLookup<'_> {
        let location = self.config.effective_location(cache_key);
        self.config
            .overrides
            .lookup_hash_file(location, hash, self.config.ignore_address)
    }

    /// Whether a decoded texture with this identity would be dumped
    pub fn will_save(&self, info: &ReplacedTextureDecodeInfo) -> bool {
        debug_assert!(self.enabled, "Replacement not enabled");
        if !self.settings.save_new_textures {
            return false;
        }
        if self.settings.is_reserved(info.addr) {
            return false;
        }
        !info.is_video || self.config.allow_video
    }

    /// Hand a freshly decoded level to the save pipeline
    pub fn notify_texture_decoded(
        &self,
        info: &ReplacedTextureDecodeInfo,
        texture: &DecodedTexture<'_>,
    ) -> SaveOutcome {
        debug_assert!(self.enabled, "Replacement not enabled");
        if !self.enabled || !self.will_save(info) {
            return SaveOutcome::NotSaving;
        }

        let ctx = SaveContext {
            config: &self.config,
            base_path: &self.base_path,
            new_texture_dir: &self.new_texture_dir,
            pool: &self.pool,
            now: self.clock.now(),
        };
        self.saves.notify(&ctx, info, texture)
    }

    /// Free pixel data that hasn't been used recently
    pub fn decimate(&self, mode: DecimateMode) -> DecimationReport {
        decimate::decimate(&self.cache, &self.budget, &self.resident, mode, self.clock.now())
    }

    /// Mark a texture as used and start loading it if it has no data.
    ///
    /// Returns the state at the time of the call; a load started here
    /// finishes on the task pool.
    pub fn poll_texture(&self, texture: &TextureHandle) -> ReplacementState {
        texture.mark_used(self.clock.now());
        if texture.begin_load() {
            match &self.source {
                Some(source) => {
                    self.pool.submit(LoadTextureTask {
                        texture: texture.clone(),
                        vfs: source.vfs.clone(),
                        decoder: self.decoder.clone(),
                        clock: self.clock.clone(),
                    });
                }
                None => texture.abort_load(),
            }
        }
        texture.state()
    }

    /// Block until queued saves and loads have finished
    pub fn wait_idle(&self) {
        self.pool.wait_idle();
    }

    /// Stop the task pool. Returns the number of discarded tasks.
    pub fn shutdown(&mut self, mode: ShutdownMode) -> usize {
        let discarded = self.pool.shutdown(mode);
        if discarded > 0 {
            log::warn!("Discarded {} pending texture tasks", discarded);
        }
        discarded
    }
}

/// Reads an asset's files on the task pool
struct LoadTextureTask {
    texture: TextureHandle,
    vfs: Arc<dyn VfsBackend>,
    decoder: Arc<dyn TextureDecoder>,
    clock: SharedClock,
}

impl Task for LoadTextureTask {
    fn run(self: Box<Self>) {
        let state = self
            .texture
            .load(self.vfs.as_ref(), self.decoder.as_ref(), self.clock.now());
        log::debug!("Loaded {}: {:?}", self.texture.desc().log_id, state);
    }

    fn name(&self) -> &str {
        "load-replacement"
    }

    fn priority(&self) -> TaskPriority {
        TaskPriority::Normal
    }

    fn kind(&self) -> TaskKind {
        TaskKind::IoBlocking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use retexture_core::ManualClock;
    use retexture_platform::INI_FILENAME;

    const GAME: &str = "ULUS10000";

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl HostNotifier for RecordingNotifier {
        fn notify_user_message(&self, message: &str, _duration_secs: f32) {
            self.messages.lock().push(message.to_string());
        }
    }

    struct Fixture {
        root: tempfile::TempDir,
        clock: Arc<ManualClock>,
        host: Arc<RecordingNotifier>,
    }

    impl Fixture {
        fn new(ini: &str) -> Self {
            let root = tempfile::tempdir().unwrap();
            let pack = root.path().join(GAME);
            std::fs::create_dir_all(&pack).unwrap();
            std::fs::write(pack.join(INI_FILENAME), ini).unwrap();
            Self {
                root,
                clock: Arc::new(ManualClock::starting_at(100.0)),
                host: Arc::new(RecordingNotifier::default()),
            }
        }

        fn pack(&self) -> PathBuf {
            self.root.path().join(GAME)
        }

        fn settings(&self, replace: bool, save: bool) -> ReplacerSettings {
            ReplacerSettings {
                replace_textures: replace,
                save_new_textures: save,
                textures_root: self.root.path().to_path_buf(),
                game_id: GAME.to_string(),
                ..ReplacerSettings::default()
            }
        }

        fn replacer(&self, replace: bool, save: bool) -> TextureReplacer {
            let mut replacer = TextureReplacer::new(self.settings(replace, save), self.host.clone())
                .with_clock(self.clock.clone())
                .with_pool(TaskPool::new(1));
            replacer.notify_config_changed();
            replacer
        }

        fn write_png(&self, name: &str, w: u32, h: u32) {
            let pixels = vec![200u8; (w * h * 4) as usize];
            image::save_buffer(self.pack().join(name), &pixels, w, h, image::ExtendedColorType::Rgba8).unwrap();
        }
    }

    #[test]
    fn test_disabled_by_default() {
        let fx = Fixture::new("");
        let replacer = fx.replacer(false, false);
        assert!(!replacer.enabled());
        assert!(replacer.find_replacement(1, 2, 16, 16).is_none());
    }

    #[test]
    fn test_missing_pack_directory_disables() {
        let fx = Fixture::new("");
        let mut settings = fx.settings(true, false);
        settings.game_id = "NOPE00000".to_string();
        let mut replacer = TextureReplacer::new(settings, fx.host.clone()).with_pool(TaskPool::new(1));
        replacer.notify_config_changed();
        assert!(!replacer.enabled());
    }

    #[test]
    fn test_saving_only_never_materializes_assets() {
        let fx = Fixture::new("[options]\nhash = xxh32\n");
        let replacer = fx.replacer(false, true);
        assert!(replacer.enabled());
        assert!(replacer.find_replacement(0x0880_0000_0000_0000, 7, 16, 16).is_none());
        assert_eq!(replacer.cache().asset_len(), 0);
        assert!(fx.pack().join("new").join(retexture_platform::NOMEDIA_FILENAME).is_file());
    }

    #[test]
    fn test_shared_files_share_one_asset() {
        let fx = Fixture::new(
            "[options]\nhash = xxh32\n\n[hashes]\n0000000000000001deadbeef = shared.png\n0000000000000002cafef00d = shared.png\n",
        );
        let replacer = fx.replacer(true, false);

        let a = replacer.find_replacement(1, 0xdead_beef, 64, 64).unwrap();
        let b = replacer.find_replacement(2, 0xcafe_f00d, 64, 64).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(replacer.cache().asset_len(), 1);
        assert_eq!(replacer.cache().index_len(), 2);

        // Repeat lookups come from the first level.
        let again = replacer.find_replacement(1, 0xdead_beef, 64, 64).unwrap();
        assert!(Arc::ptr_eq(&a, &again));
    }

    #[test]
    fn test_alias_levels_resolve_in_order() {
        let fx = Fixture::new("[hashes]\n00000000000000000000000c_0 = foo.png\n00000000000000000000000c_1 = bar.png\n");
        let replacer = fx.replacer(true, false);

        let texture = replacer.find_replacement(0x0880_0000_0000_0001, 0xc, 32, 32).unwrap();
        let desc = texture.desc();
        assert_eq!(desc.filenames.as_slice(), ["foo.png", "bar.png"]);
        assert_eq!(desc.hash_files, "foo.png|bar.png");
    }

    #[test]
    fn test_synthesized_names_without_alias() {
        let fx = Fixture::new("");
        let replacer = fx.replacer(true, false);

        let texture = replacer.find_replacement(0x08b3_1020_0000_0000, 0x1234_5678, 32, 32).unwrap();
        let desc = texture.desc();
        assert_eq!(desc.filenames.len(), MAX_REPLACEMENT_MIP_LEVELS);
        assert_eq!(desc.filenames[0], "08b310200000000012345678.png");
        assert_eq!(desc.filenames[1], "08b310200000000012345678_1.png");
        assert_eq!(desc.hash_files, desc.filenames[0]);
    }

    #[test]
    fn test_ignored_alias_creates_nothing() {
        let fx = Fixture::new("[hashes]\n08b3102000000909ba70b2af =\n");
        let replacer = fx.replacer(true, false);

        assert!(replacer.find_replacement(0x08b3_1020_0000_0909, 0xba70_b2af, 64, 64).is_none());
        assert!(replacer.find_replacement(0x08b3_1020_0000_0909, 0xba70_b2af, 64, 64).is_none());
        assert_eq!(replacer.cache().asset_len(), 0);
        assert_eq!(replacer.cache().index_len(), 1);
        assert!(replacer.lookup_hash_file(0x08b3_1020_0000_0909, 0xba70_b2af).ignored());
    }

    #[test]
    fn test_ignore_address_shares_entry_across_addresses() {
        let fx = Fixture::new("[options]\nhash = xxh64\nignoreAddress = true\n");
        let replacer = fx.replacer(true, false);
        assert!(replacer.config().ignore_address);

        let a = replacer.find_replacement(0x0880_0000_0000_0909, 0x55, 16, 16).unwrap();
        let b = replacer.find_replacement(0x0990_0000_0000_0909, 0x55, 16, 16).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(replacer.cache().index_len(), 1);
        assert_eq!(a.desc().filenames[0], "000000000000090900000055.png");
    }

    #[test]
    fn test_hash_range_sets_hashed_size() {
        let fx = Fixture::new("[hashranges]\n08b31020,512,512 = 480,272\n");
        let replacer = fx.replacer(true, false);

        let texture = replacer.find_replacement(0x08b3_1020_0000_0000, 1, 512, 512).unwrap();
        assert_eq!((texture.desc().new_w, texture.desc().new_h), (480, 272));
        assert_eq!((texture.desc().w, texture.desc().h), (512, 512));
    }

    #[test]
    fn test_forced_filtering() {
        let fx = Fixture::new("[filtering]\n0000000000000000 = nearest\n");
        let replacer = fx.replacer(true, false);
        assert_eq!(replacer.find_filtering(5, 6), Some(TextureFiltering::Nearest));
        let texture = replacer.find_replacement(5, 6, 8, 8).unwrap();
        assert_eq!(texture.desc().force_filtering, Some(TextureFiltering::Nearest));
    }

    #[test]
    fn test_poll_loads_and_decimation_keeps_handle() {
        let fx = Fixture::new("");
        fx.write_png("000000000000000100000002.png", 8, 8);
        let replacer = fx.replacer(true, false);

        let texture = replacer.find_replacement(1, 2, 8, 8).unwrap();
        let polled = replacer.poll_texture(&texture);
        assert!(matches!(polled, ReplacementState::Loading | ReplacementState::Active));
        replacer.wait_idle();
        assert_eq!(texture.state(), ReplacementState::Active);
        assert_eq!(texture.total_data_size(), 8 * 8 * 4);

        fx.clock.advance(2000.0);
        let report = replacer.decimate(DecimateMode::Normal);
        assert_eq!(report.purged, 1);
        assert_eq!(texture.state(), ReplacementState::Unloaded);

        // The old handle is still the cached asset and reloads on demand.
        let same = replacer.find_replacement(1, 2, 8, 8).unwrap();
        assert!(Arc::ptr_eq(&texture, &same));
        replacer.poll_texture(&texture);
        replacer.wait_idle();
        assert!(texture.is_ready());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fx = Fixture::new("");
        let replacer = fx.replacer(true, false);
        let texture = replacer.find_replacement(3, 4, 8, 8).unwrap();
        replacer.poll_texture(&texture);
        replacer.wait_idle();
        assert_eq!(texture.state(), ReplacementState::NotFound);
    }

    #[test]
    fn test_reload_clears_index_keeps_assets() {
        let fx = Fixture::new("[hashes]\n0000000000000001deadbeef = a.png\n");
        let mut replacer = fx.replacer(true, false);
        let before = replacer.find_replacement(1, 0xdead_beef, 8, 8).unwrap();
        assert_eq!(replacer.config().generation, 1);

        replacer.notify_config_changed();
        assert_eq!(replacer.config().generation, 2);
        assert_eq!(replacer.cache().index_len(), 0);
        assert_eq!(replacer.cache().asset_len(), 1);

        let after = replacer.find_replacement(1, 0xdead_beef, 8, 8).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_disable_purges_everything() {
        let fx = Fixture::new("");
        fx.write_png("000000000000000100000002.png", 4, 4);
        let mut replacer = fx.replacer(true, false);
        let texture = replacer.find_replacement(1, 2, 4, 4).unwrap();
        replacer.poll_texture(&texture);
        replacer.wait_idle();
        assert!(texture.is_ready());

        replacer.update_settings(fx.settings(false, false));
        assert!(!replacer.enabled());
        assert_eq!(texture.state(), ReplacementState::Unloaded);
        assert_eq!(replacer.resident_stats().last(), 0);
    }

    #[test]
    fn test_save_respects_reserved_region_and_video() {
        let fx = Fixture::new("");
        let replacer = fx.replacer(false, true);
        let data = vec![0u8; 16 * 16 * 4];
        let texture = DecodedTexture {
            data: &data,
            pitch: 64,
            level: 0,
            orig_w: 16,
            orig_h: 16,
            scaled_w: 16,
            scaled_h: 16,
        };

        let reserved = ReplacedTextureDecodeInfo {
            cache_key: 0x0600_0000_0000_0000,
            hash: 1,
            addr: 0x0600_0000,
            is_video: false,
        };
        assert_eq!(replacer.notify_texture_decoded(&reserved, &texture), SaveOutcome::NotSaving);

        let video = ReplacedTextureDecodeInfo {
            addr: 0x0900_0000,
            is_video: true,
            ..reserved
        };
        assert_eq!(replacer.notify_texture_decoded(&video, &texture), SaveOutcome::NotSaving);

        let normal = ReplacedTextureDecodeInfo { is_video: false, ..video };
        assert_eq!(replacer.notify_texture_decoded(&normal, &texture), SaveOutcome::Submitted);
        assert_eq!(replacer.notify_texture_decoded(&normal, &texture), SaveOutcome::AlreadySaved);
        replacer.wait_idle();
        assert!(replacer.new_texture_dir().join("060000000000000000000001.png").is_file());
    }

    #[test]
    fn test_filename_warning_reaches_host() {
        let fx = Fixture::new("[hashes]\n0000000000000001deadbeef = Bad?Name.png\n");
        let _replacer = fx.replacer(true, true);
        assert_eq!(fx.host.messages.lock().as_slice(), [FILENAME_WARNING.to_string()]);
    }

    #[test]
    fn test_shutdown_drains() {
        let fx = Fixture::new("");
        let mut replacer = fx.replacer(false, true);
        assert_eq!(replacer.shutdown(ShutdownMode::Drain), 0);
    }
}
