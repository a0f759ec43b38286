//! Dashboard views: property progress, label history, admin statistics,
//! export and profiles

use chrono::{DateTime, Utc};
use olab_common::models::{
    Contributor, ExportRow, LabelHistoryEntry, LabelKind, Profile, Property, PropertyId,
    PropertyProgress, User,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::store::CatalogStore;

/// Number of contributors shown on the admin dashboard
pub const TOP_CONTRIBUTORS: usize = 10;

/// Redundancy thresholds reported on the admin dashboard
pub const REDUNDANCY_THRESHOLDS: [i64; 4] = [1, 2, 3, 5];

/// Default number of leaderboard rows
pub const LEADERBOARD_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyOverview {
    #[serde(flatten)]
    pub property: Property,
    pub progress: PropertyProgress,
}

/// Properties visible to the user with their progress on each
pub async fn property_overview(
    store: &dyn CatalogStore,
    user_id: &str,
    include_hidden: bool,
) -> StoreResult<Vec<PropertyOverview>> {
    let properties = store.list_properties(include_hidden).await?;
    let totals = store.sentence_totals().await?;
    let labeled = store.user_label_counts(user_id).await?;

    Ok(properties
        .into_iter()
        .map(|property| {
            let total = totals.get(&property.id).copied().unwrap_or(0);
            let done = labeled.get(&property.id).copied().unwrap_or(0);
            PropertyOverview {
                progress: PropertyProgress::new(total, done),
                property,
            }
        })
        .collect())
}

/// First property (in name order) the user has not finished
pub fn auto_select(overview: &[PropertyOverview]) -> Option<PropertyId> {
    overview
        .iter()
        .find(|p| p.progress.labeled < p.progress.total)
        .map(|p| p.property.id)
}

/// Property after `current` in name order
pub fn next_property(overview: &[PropertyOverview], current: PropertyId) -> Option<PropertyId> {
    let position = overview.iter().position(|p| p.property.id == current)?;
    overview.get(position + 1).map(|p| p.property.id)
}

// ========================================
// Label history
// ========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    #[default]
    Newest,
    Oldest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub property_id: Option<PropertyId>,
    pub kind: Option<LabelKind>,
    /// Case-insensitive substring of the sentence text
    pub search: Option<String>,
    pub order: HistoryOrder,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &LabelHistoryEntry) -> bool {
        if let Some(property_id) = self.property_id {
            if entry.label.property_id != property_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.label.kind != kind {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => entry
                .sentence_text
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }

    pub fn apply(&self, mut entries: Vec<LabelHistoryEntry>) -> Vec<LabelHistoryEntry> {
        entries.retain(|e| self.matches(e));
        match self.order {
            HistoryOrder::Newest => entries.sort_by(|a, b| b.label.created_at.cmp(&a.label.created_at)),
            HistoryOrder::Oldest => entries.sort_by(|a, b| a.label.created_at.cmp(&b.label.created_at)),
        }
        entries
    }
}

pub async fn label_history(
    store: &dyn CatalogStore,
    user_id: &str,
    filter: &HistoryFilter,
) -> StoreResult<Vec<LabelHistoryEntry>> {
    let entries = store.list_user_labels(user_id).await?;
    Ok(filter.apply(entries))
}

// ========================================
// Admin
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundancyBucket {
    pub min_labels: i64,
    pub sentences: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminStats {
    pub total_sentences: i64,
    pub labeled_sentences: i64,
    pub coverage_pct: f64,
    pub redundancy: Vec<RedundancyBucket>,
    pub top_contributors: Vec<Contributor>,
}

pub async fn admin_stats(store: &dyn CatalogStore) -> StoreResult<AdminStats> {
    let total_sentences = store.count_all_sentences().await?;
    let counts = store.labeled_sentence_counts().await?;
    let contributors = store.label_counts_by_user().await?;
    Ok(build_stats(total_sentences, &counts, contributors))
}

fn build_stats(
    total_sentences: i64,
    counts: &[i64],
    mut contributors: Vec<Contributor>,
) -> AdminStats {
    let labeled_sentences = counts.iter().filter(|&&c| c > 0).count() as i64;
    let coverage_pct = if total_sentences > 0 {
        ((labeled_sentences as f64 / total_sentences as f64) * 1000.0).round() / 10.0
    } else {
        0.0
    };
    let redundancy = REDUNDANCY_THRESHOLDS
        .iter()
        .map(|&min_labels| RedundancyBucket {
            min_labels,
            sentences: counts.iter().filter(|&&c| c >= min_labels).count() as i64,
        })
        .collect();

    contributors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.user_id.cmp(&b.user_id)));
    contributors.truncate(TOP_CONTRIBUTORS);

    AdminStats {
        total_sentences,
        labeled_sentences,
        coverage_pct,
        redundancy,
        top_contributors: contributors,
    }
}

/// Rows and download name for an export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportFile {
    pub file_name: String,
    pub rows: Vec<ExportRow>,
}

/// Lowercase, everything outside `[a-z0-9]` becomes `_`
pub fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Export labels of one property, or of every property when `property_id`
/// is `None`. `min_labels` is raised to at least 1.
pub async fn export_labels(
    store: &dyn CatalogStore,
    property_id: Option<PropertyId>,
    min_labels: i64,
) -> StoreResult<ExportFile> {
    let min_labels = min_labels.max(1);
    match property_id {
        Some(id) => {
            let property = store
                .get_property(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("property {}", id)))?;
            let rows = store.export_labels(id, min_labels).await?;
            info!(property_id = id, rows = rows.len(), min_labels, "Exported labels");
            Ok(ExportFile {
                file_name: format!(
                    "{}_min{}_labels.json",
                    sanitize_file_stem(&property.name),
                    min_labels
                ),
                rows,
            })
        }
        None => {
            let mut rows = Vec::new();
            for property in store.list_properties(true).await? {
                rows.extend(store.export_labels(property.id, min_labels).await?);
            }
            info!(rows = rows.len(), min_labels, "Exported labels for all properties");
            Ok(ExportFile {
                file_name: format!("all_properties_min{}_labels.json", min_labels),
                rows,
            })
        }
    }
}

// ========================================
// Profile and leaderboard
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub profile: Profile,
    pub total_labels: i64,
    pub total_sentences: i64,
    pub overall_pct: i64,
    pub properties_started: usize,
    pub properties_completed: usize,
    pub generated_at: DateTime<Utc>,
}

/// Create the profile row for a user if it does not exist yet
pub async fn ensure_profile(store: &dyn CatalogStore, user: &User) -> StoreResult<Profile> {
    if let Some(profile) = store.get_profile(&user.id).await? {
        return Ok(profile);
    }
    let display_name = user
        .metadata
        .get("display_name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let total_labels = store.count_user_labels(&user.id).await?;
    info!(user_id = %user.id, "Creating profile");
    store
        .upsert_profile(&Profile {
            user_id: user.id.clone(),
            display_name,
            email: user.email.clone(),
            total_labels,
        })
        .await
}

pub async fn profile_summary(store: &dyn CatalogStore, user: &User) -> StoreResult<ProfileSummary> {
    let profile = ensure_profile(store, user).await?;
    let overview = property_overview(store, &user.id, false).await?;
    let total_labels = store.count_user_labels(&user.id).await?;

    let total_sentences: i64 = overview.iter().map(|p| p.progress.total).sum();
    let labeled: i64 = overview.iter().map(|p| p.progress.labeled).sum();

    Ok(ProfileSummary {
        profile,
        total_labels,
        total_sentences,
        overall_pct: PropertyProgress::new(total_sentences, labeled).pct,
        properties_started: overview.iter().filter(|p| p.progress.labeled > 0).count(),
        properties_completed: overview.iter().filter(|p| p.progress.is_complete()).count(),
        generated_at: Utc::now(),
    })
}

/// Change the display name and resync `total_labels` with the real count
pub async fn update_display_name(
    store: &dyn CatalogStore,
    user: &User,
    display_name: &str,
) -> StoreResult<Profile> {
    let display_name = display_name.trim();
    let mut profile = ensure_profile(store, user).await?;
    let actual = store.count_user_labels(&user.id).await?;
    if profile.total_labels != actual {
        warn!(
            user_id = %user.id,
            stored = profile.total_labels,
            actual,
            "Profile label total drifted, resyncing"
        );
    }
    profile.display_name = if display_name.is_empty() {
        None
    } else {
        Some(display_name.to_string())
    };
    profile.total_labels = actual;
    store.upsert_profile(&profile).await
}

/// Set the profile's `total_labels` to the user's real label count
pub async fn refresh_label_total(store: &dyn CatalogStore, user: &User) -> StoreResult<Profile> {
    let mut profile = ensure_profile(store, user).await?;
    let actual = store.count_user_labels(&user.id).await?;
    if profile.total_labels == actual {
        return Ok(profile);
    }
    profile.total_labels = actual;
    store.upsert_profile(&profile).await
}

pub async fn leaderboard(store: &dyn CatalogStore, limit: usize) -> StoreResult<Vec<Profile>> {
    store.top_profiles(limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use olab_common::models::Label;

    fn overview(entries: &[(PropertyId, i64, i64)]) -> Vec<PropertyOverview> {
        entries
            .iter()
            .map(|&(id, total, labeled)| PropertyOverview {
                property: Property {
                    id,
                    name: format!("p{}", id),
                    domain: "Person".to_string(),
                    range: "Place".to_string(),
                    iri: format!("ex:p{}", id),
                    sentence_count: total,
                    is_active: true,
                    description: None,
                    domain_link: None,
                    range_link: None,
                },
                progress: PropertyProgress::new(total, labeled),
            })
            .collect()
    }

    #[test]
    fn test_auto_select_skips_completed() {
        let o = overview(&[(1, 3, 3), (2, 4, 1), (3, 2, 0)]);
        assert_eq!(auto_select(&o), Some(2));
        assert_eq!(auto_select(&overview(&[(1, 2, 2)])), None);
    }

    #[test]
    fn test_next_property() {
        let o = overview(&[(1, 3, 3), (2, 4, 1)]);
        assert_eq!(next_property(&o, 1), Some(2));
        assert_eq!(next_property(&o, 2), None);
        assert_eq!(next_property(&o, 9), None);
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("birthPlace"), "birthplace");
        assert_eq!(sanitize_file_stem("dbo:Place of Birth"), "dbo_place_of_birth");
    }

    #[test]
    fn test_stats_rollup() {
        let contributors: Vec<Contributor> = (0..12)
            .map(|i| Contributor {
                user_id: format!("u{:02}", i),
                count: i,
            })
            .collect();
        let stats = build_stats(10, &[1, 2, 2, 3, 5, 6], contributors);

        assert_eq!(stats.labeled_sentences, 6);
        assert_eq!(stats.coverage_pct, 60.0);
        let buckets: Vec<(i64, i64)> = stats.redundancy.iter().map(|b| (b.min_labels, b.sentences)).collect();
        assert_eq!(buckets, vec![(1, 6), (2, 5), (3, 3), (5, 2)]);
        assert_eq!(stats.top_contributors.len(), 10);
        assert_eq!(stats.top_contributors[0].user_id, "u11");
    }

    #[test]
    fn test_history_filter() {
        let entry = |id, property_id, kind, text: &str, secs| LabelHistoryEntry {
            label: Label {
                id,
                sentence_id: id,
                user_id: "u1".to_string(),
                property_id,
                kind,
                subject: None,
                object: None,
                created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            },
            sentence_text: text.to_string(),
            label_count: 1,
        };
        let entries = vec![
            entry(1, 1, LabelKind::None, "Ada Lovelace was born in London", 10),
            entry(2, 1, LabelKind::PropertyOnly, "Paris is lovely", 30),
            entry(3, 2, LabelKind::None, "London calling", 20),
        ];

        let filter = HistoryFilter {
            search: Some("LONDON".to_string()),
            ..Default::default()
        };
        let ids: Vec<i64> = filter.apply(entries.clone()).iter().map(|e| e.label.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let filter = HistoryFilter {
            property_id: Some(1),
            order: HistoryOrder::Oldest,
            ..Default::default()
        };
        let ids: Vec<i64> = filter.apply(entries.clone()).iter().map(|e| e.label.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let filter = HistoryFilter {
            kind: Some(LabelKind::PropertyOnly),
            ..Default::default()
        };
        assert_eq!(filter.apply(entries).len(), 1);
    }
}
