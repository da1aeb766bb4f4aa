//! One running controller: the command queue, the reconciler and the
//! shared state they work on.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogStore};
use crate::command_queue::{CommandQueue, DEFAULT_CALL_TIMEOUT};
use crate::controller::{PlayOutcome, PlaybackController, RestartOutcome};
use crate::errors::CueError;
use crate::features::FeatureToggles;
use crate::index_cache::IndexCache;
use crate::now_playing::UiPublisher;
use crate::player::{MediaPlayer, NotificationSource, PlayerNotification};
use crate::reconcile::{ReconcileCore, Reconciler};
use crate::shortcuts::{KeyBindings, ShortcutAction};
use crate::window_fit::{FitGeometry, FitOutcome, FitScheduler};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FIT_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub call_timeout: Duration,
    pub poll_interval: Duration,
    pub fit_delay: Duration,
    pub fit_geometry: FitGeometry,
    pub auto_fit: bool,
    pub resume_stuck_video: bool,
    pub key_bindings: KeyBindings,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fit_delay: DEFAULT_FIT_DELAY,
            fit_geometry: FitGeometry::default(),
            auto_fit: true,
            resume_stuck_video: false,
            key_bindings: KeyBindings::default(),
        }
    }
}

#[derive(Debug)]
pub struct CueSession {
    catalog: Arc<CatalogStore>,
    controller: PlaybackController,
    reconciler: Reconciler,
    features: Arc<FeatureToggles>,
    key_bindings: KeyBindings,
}

impl CueSession {
    pub fn new(
        player: Box<dyn MediaPlayer>,
        catalog: Catalog,
        options: SessionOptions,
        publisher: UiPublisher,
    ) -> Result<Self, CueError> {
        let queue = CommandQueue::spawn(player, options.call_timeout)?;
        let store = Arc::new(CatalogStore::new(catalog));
        let features = Arc::new(FeatureToggles::new(
            options.auto_fit,
            options.resume_stuck_video,
        ));

        let fitter = FitScheduler::new(queue.clone(), options.fit_geometry, options.fit_delay);
        let controller = PlaybackController::new(
            queue.clone(),
            Arc::clone(&store),
            Arc::new(Mutex::new(IndexCache::new())),
            Arc::clone(&features),
            fitter,
        );

        let core = ReconcileCore::new(queue, Arc::clone(&store), publisher);
        let reconciler = Reconciler::spawn(core, controller.clone(), options.poll_interval)?;

        info!(
            poll_interval = ?options.poll_interval,
            call_timeout = ?options.call_timeout,
            "Session started"
        );
        Ok(Self {
            catalog: store,
            controller,
            reconciler,
            features,
            key_bindings: options.key_bindings,
        })
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn features(&self) -> &Arc<FeatureToggles> {
        &self.features
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.current()
    }

    pub fn key_bindings(&self) -> KeyBindings {
        self.key_bindings
    }

    pub fn play_item(
        &self,
        collection: &str,
        sub_collection: &str,
        offset: f64,
    ) -> Result<PlayOutcome, CueError> {
        self.controller.play_item(collection, sub_collection, offset)
    }

    pub fn resume_video(&self) -> Result<RestartOutcome, CueError> {
        self.controller.resume_video()
    }

    pub fn fit_window(&self) -> Option<FitOutcome> {
        self.controller.fit_window()
    }

    /// Swaps the catalog, drops every cached index and republishes.
    pub fn reload_catalog(&self, catalog: Catalog) {
        self.catalog.replace(catalog);
        self.controller.reset_index_cache();
        self.reconciler.refresh();
    }

    /// Loads a catalog file. On failure the current catalog stays in place.
    pub fn load_catalog(&self, path: &Path) -> Result<(), CueError> {
        match Catalog::load(path) {
            Ok(catalog) => {
                self.reload_catalog(catalog);
                Ok(())
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Catalog rejected, keeping the current one");
                Err(err)
            }
        }
    }

    pub fn surface_opened(&self) -> Result<(), CueError> {
        Ok(self.reconciler.surface_opened()?)
    }

    pub fn surface_closed(&self) {
        self.reconciler.surface_closed();
    }

    pub fn is_polling(&self) -> bool {
        self.reconciler.is_polling()
    }

    pub fn notify(&self, notification: PlayerNotification) {
        self.reconciler.notify(notification);
    }

    /// Starts forwarding the player's own notifications to the reconciler.
    pub fn watch_notifications(&self, source: Arc<dyn NotificationSource>) -> Result<(), CueError> {
        Ok(self.reconciler.watch(source)?)
    }

    /// Dispatches a raw key code. Unbound codes are ignored.
    pub fn handle_key(&self, code: u16) -> Result<Option<PlayOutcome>, CueError> {
        match self.key_bindings.action_for(code) {
            Some(action) => self.handle_action(action),
            None => {
                debug!(code, "Unbound key");
                Ok(None)
            }
        }
    }

    pub fn handle_action(&self, action: ShortcutAction) -> Result<Option<PlayOutcome>, CueError> {
        debug!(?action, "Shortcut");
        self.controller.step(action.step())
    }

    pub fn shutdown(&self) {
        self.reconciler.shutdown();
        info!("Session stopped");
    }
}
