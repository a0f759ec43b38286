//! HTTP API handlers for olab-ui

pub mod admin;
pub mod auth;
pub mod buildinfo;
pub mod error;
pub mod health;
pub mod labels;
pub mod preferences;
pub mod profile;
pub mod properties;
pub mod session;
pub mod ui;

pub use admin::{admin_stats, export_labels, update_property};
pub use auth::{
    auth_middleware, me, require_admin, sign_in, sign_out, sign_up, update_password, CurrentUser,
};
pub use buildinfo::get_build_info;
pub use error::ApiError;
pub use health::health_routes;
pub use labels::{edit_label, list_labels};
pub use preferences::{get_preferences, update_preferences};
pub use profile::{get_leaderboard, get_profile, update_profile};
pub use properties::list_properties;
pub use session::{
    editor_action, get_session, next_sentence, next_unlabeled, open_session, prev_sentence,
    prev_unlabeled, save_label,
};
pub use ui::{serve_app_js, serve_index};
