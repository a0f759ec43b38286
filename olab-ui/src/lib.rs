//! olab-ui library - HTTP service for the ontology labeler
//!
//! Serves the browser UI and a JSON API over the annotation core. Each
//! signed-in user owns one [`olab_core::AnnotationSession`], kept in the
//! [`SessionRegistry`] and driven one request at a time.

use axum::Router;
use olab_common::config::TomlConfig;
use olab_common::events::{EventBus, LabelEvent};
use olab_common::models::User;
use olab_core::auth::AuthProvider;
use olab_core::store::{CatalogStore, SentenceStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub mod api;
pub mod sessions;

pub use sessions::SessionRegistry;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub sentences: Arc<dyn SentenceStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub sessions: Arc<SessionRegistry>,
    /// Service configuration; the `[ui]` table is written back on change
    pub config: Arc<RwLock<TomlConfig>>,
    /// Where `config` is persisted, `None` to keep changes in memory
    pub config_path: Option<PathBuf>,
    pub admin_email: String,
    pub label_events: EventBus<LabelEvent>,
}

impl AppState {
    /// Build state around one backend serving both the annotation core and
    /// the dashboard views
    pub fn new<S>(
        store: Arc<S>,
        auth: Arc<dyn AuthProvider>,
        config: TomlConfig,
        config_path: Option<PathBuf>,
    ) -> Self
    where
        S: SentenceStore + CatalogStore + 'static,
    {
        Self {
            sentences: store.clone(),
            catalog: store,
            auth,
            sessions: Arc::new(SessionRegistry::new(config.session.batch_size)),
            admin_email: config.admin_email.clone(),
            config: Arc::new(RwLock::new(config)),
            config_path,
            label_events: EventBus::new(),
        }
    }

    pub fn is_admin(&self, user: &User) -> bool {
        user.email.eq_ignore_ascii_case(&self.admin_email)
    }

    /// Drop annotation sessions of users whose auth session ended
    pub fn watch_auth_events(&self) -> JoinHandle<()> {
        sessions::spawn_auth_listener(self.sessions.clone(), self.auth.subscribe())
    }
}

/// Build application router
///
/// Health, UI shell, sign-up and sign-in are public; everything else needs
/// a bearer token, and `/api/admin/*` additionally the admin account.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    let admin = Router::new()
        .route("/api/admin/stats", get(api::admin_stats))
        .route("/api/admin/export", get(api::export_labels))
        .route("/api/admin/properties/:id", put(api::update_property))
        .layer(middleware::from_fn(api::require_admin));

    // Protected routes (require a signed-in user)
    let protected = Router::new()
        .route("/api/auth/signout", post(api::sign_out))
        .route("/api/auth/password", post(api::update_password))
        .route("/api/auth/me", get(api::me))
        .route(
            "/api/preferences",
            get(api::get_preferences).put(api::update_preferences),
        )
        .route("/api/properties", get(api::list_properties))
        .route("/api/session", get(api::get_session).post(api::open_session))
        .route("/api/session/next", post(api::next_sentence))
        .route("/api/session/prev", post(api::prev_sentence))
        .route("/api/session/next-unlabeled", post(api::next_unlabeled))
        .route("/api/session/prev-unlabeled", post(api::prev_unlabeled))
        .route("/api/session/editor", post(api::editor_action))
        .route("/api/session/save", post(api::save_label))
        .route("/api/labels", get(api::list_labels))
        .route("/api/labels/:sentence_id", put(api::edit_label))
        .route("/api/profile", get(api::get_profile).put(api::update_profile))
        .route("/api/leaderboard", get(api::get_leaderboard))
        .merge(admin)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .route("/api/auth/signup", post(api::sign_up))
        .route("/api/auth/signin", post(api::sign_in))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
}
