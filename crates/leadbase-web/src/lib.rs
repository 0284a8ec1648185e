//! Axum + Askama dashboard for the lead table and upload runs.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Multipart, Path as AxumPath, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tokio::net::TcpListener;
use tracing::warn;
use uuid::Uuid;

use leadbase_core::feed::ActivityFeed;
use leadbase_core::Lead;
use leadbase_ingest::{import_csv, HookEngine, HookJobSpec, JobTracker};
use leadbase_storage::PgLeadStore;

pub const CRATE_NAME: &str = "leadbase-web";

const LEADS_PER_PAGE: i64 = 50;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tracker: Arc<JobTracker>,
    pub feed: Arc<ActivityFeed>,
    /// Absent when no text-generation credential was resolved at startup.
    pub hooks: Option<HookEngine>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        tracker: Arc<JobTracker>,
        feed: Arc<ActivityFeed>,
        hooks: Option<HookEngine>,
    ) -> Self {
        Self {
            pool,
            tracker,
            feed,
            hooks,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/leads", get(leads_handler))
        .route("/leads/{id}", get(lead_detail_handler))
        .route("/leads/{id}/viewed", post(mark_viewed_handler))
        .route("/leads/{id}/hook", post(trigger_hook_handler))
        .route("/upload", get(upload_form_handler).post(upload_post_handler))
        .route("/jobs/{id}", get(job_status_handler))
        .route("/api/stats", get(api_stats_handler))
        .route("/api/activity", get(api_activity_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct UploadHistoryRow {
    id: i64,
    filename: String,
    rows_inserted: i64,
    rows_updated: i64,
    rows_failed: i64,
    status: String,
    upload_date: String,
}

#[derive(Debug, Clone)]
struct LeadRowView {
    id: i64,
    name: String,
    title: String,
    company: String,
    location: String,
    viewed: bool,
    has_hook: bool,
}

#[derive(Debug, Clone)]
struct LeadDetailView {
    id: i64,
    name: String,
    headline: String,
    title: String,
    company: String,
    location: String,
    email: String,
    phone: String,
    profile_url: String,
    active_project: String,
    notes: String,
    feedback: String,
    viewed: bool,
    viewed_by: String,
    hook: String,
    created_at: String,
}

#[derive(Debug, Clone)]
struct UploadResultView {
    filename: String,
    ok: bool,
    inserted: i64,
    updated: i64,
    failed: i64,
    removed: i64,
    error: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    total_leads: i64,
    total_uploads: i64,
    total_companies: i64,
    recent_uploads: Vec<UploadHistoryRow>,
}

#[derive(Template)]
#[template(path = "leads.html")]
struct LeadsTemplate {
    leads: Vec<LeadRowView>,
    page: i64,
    total_pages: i64,
    total: i64,
}

#[derive(Template)]
#[template(path = "lead_detail.html")]
struct LeadDetailTemplate {
    lead: LeadDetailView,
}

#[derive(Template)]
#[template(path = "upload.html")]
struct UploadTemplate {}

#[derive(Template)]
#[template(path = "upload_results.html")]
struct UploadResultsTemplate {
    results: Vec<UploadResultView>,
}

#[derive(Debug, Deserialize, Default)]
struct LeadsQuery {
    page: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct MarkViewedBody {
    viewer: Option<String>,
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_index_data(&state.pool).await {
        Ok(tpl) => render_html(tpl),
        Err(err) => server_error(err),
    }
}

async fn load_index_data(pool: &PgPool) -> anyhow::Result<IndexTemplate> {
    let total_leads: i64 = sqlx::query("SELECT COUNT(*) AS total FROM leads")
        .fetch_one(pool)
        .await?
        .try_get("total")?;
    let total_uploads: i64 = sqlx::query("SELECT COUNT(*) AS total FROM upload_history")
        .fetch_one(pool)
        .await?
        .try_get("total")?;
    let total_companies: i64 = sqlx::query(
        r#"
        SELECT COUNT(DISTINCT current_company) AS total
          FROM leads
         WHERE current_company IS NOT NULL AND current_company != ''
        "#,
    )
    .fetch_one(pool)
    .await?
    .try_get("total")?;

    let rows = sqlx::query(
        r#"
        SELECT id, filename, rows_inserted, rows_updated, rows_failed, status, upload_date
          FROM upload_history
         ORDER BY upload_date DESC
         LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut recent_uploads = Vec::with_capacity(rows.len());
    for row in rows {
        let upload_date: chrono::DateTime<chrono::Utc> = row.try_get("upload_date")?;
        recent_uploads.push(UploadHistoryRow {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            rows_inserted: row.try_get("rows_inserted")?,
            rows_updated: row.try_get("rows_updated")?,
            rows_failed: row.try_get("rows_failed")?,
            status: row.try_get("status")?,
            upload_date: upload_date.format("%Y-%m-%d %H:%M").to_string(),
        });
    }

    Ok(IndexTemplate {
        total_leads,
        total_uploads,
        total_companies,
        recent_uploads,
    })
}

async fn leads_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeadsQuery>,
) -> Response {
    match load_leads_page(&state.pool, query.page.unwrap_or(1)).await {
        Ok(tpl) => render_html(tpl),
        Err(err) => server_error(err),
    }
}

async fn load_leads_page(pool: &PgPool, page: i64) -> anyhow::Result<LeadsTemplate> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM leads")
        .fetch_one(pool)
        .await?
        .try_get("total")?;
    let total_pages = (total + LEADS_PER_PAGE - 1) / LEADS_PER_PAGE;
    let page = page.clamp(1, total_pages.max(1));
    let offset = (page - 1) * LEADS_PER_PAGE;

    let rows = sqlx::query(
        r#"
        SELECT * FROM leads
         ORDER BY created_at DESC
         LIMIT $1 OFFSET $2
        "#,
    )
    .bind(LEADS_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let leads = rows
        .iter()
        .map(|row| {
            let lead = leadbase_storage::lead_from_row(row)?;
            Ok(lead_row_view(&lead))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(LeadsTemplate {
        leads,
        page,
        total_pages,
        total,
    })
}

fn lead_row_view(lead: &Lead) -> LeadRowView {
    LeadRowView {
        id: lead.id,
        name: lead.full_name(),
        title: lead.current_title.clone().unwrap_or_default(),
        company: lead.current_company.clone().unwrap_or_default(),
        location: lead.location.clone().unwrap_or_default(),
        viewed: lead.viewed,
        has_hook: lead.hook.as_deref().is_some_and(|h| !h.is_empty()),
    }
}

async fn lead_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    match leadbase_storage::get_lead(&state.pool, id).await {
        Ok(Some(lead)) => render_html(LeadDetailTemplate {
            lead: lead_detail_view(&lead),
        }),
        Ok(None) => (StatusCode::NOT_FOUND, Html("Lead not found".to_string())).into_response(),
        Err(err) => server_error(err.into()),
    }
}

fn lead_detail_view(lead: &Lead) -> LeadDetailView {
    LeadDetailView {
        id: lead.id,
        name: lead.full_name(),
        headline: lead.headline.clone().unwrap_or_default(),
        title: lead.current_title.clone().unwrap_or_default(),
        company: lead.current_company.clone().unwrap_or_default(),
        location: lead.location.clone().unwrap_or_default(),
        email: lead.email_address.clone().unwrap_or_default(),
        phone: lead.phone_number.clone().unwrap_or_default(),
        profile_url: lead.profile_url.clone().unwrap_or_default(),
        active_project: lead.active_project.clone().unwrap_or_default(),
        notes: lead.notes.clone().unwrap_or_default(),
        feedback: lead.feedback.clone().unwrap_or_default(),
        viewed: lead.viewed,
        viewed_by: lead.viewed_by.clone().unwrap_or_default(),
        hook: lead.hook.clone().unwrap_or_default(),
        created_at: lead.created_at.format("%Y-%m-%d %H:%M").to_string(),
    }
}

async fn mark_viewed_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    body: Option<Json<MarkViewedBody>>,
) -> Response {
    let viewer = body
        .and_then(|Json(b)| b.viewer)
        .unwrap_or_else(|| "dashboard".to_string());
    match leadbase_storage::mark_viewed(&state.pool, id, &viewer).await {
        Ok(true) => Json(serde_json::json!({ "ok": true })).into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "ok": false })))
            .into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn trigger_hook_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> Response {
    let Some(hooks) = &state.hooks else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "text generation is not configured" })),
        )
            .into_response();
    };
    let job_id = hooks.submit(HookJobSpec {
        lead_id: Some(id),
        ..Default::default()
    });
    Json(serde_json::json!({ "job_id": job_id })).into_response()
}

async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match state.tracker.get(id) {
        Some(status) => Json(status).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "unknown job" })),
        )
            .into_response(),
    }
}

async fn upload_form_handler() -> Response {
    render_html(UploadTemplate {})
}

async fn upload_post_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let store = PgLeadStore::new(state.pool.clone());
    let mut results = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return server_error(anyhow::anyhow!("reading multipart body: {err}")),
        };

        let Some(filename) = field.file_name().map(ToString::to_string) else {
            continue;
        };
        if filename.is_empty() {
            continue;
        }
        if !filename.to_ascii_lowercase().ends_with(".csv") {
            results.push(UploadResultView {
                filename,
                ok: false,
                inserted: 0,
                updated: 0,
                failed: 0,
                removed: 0,
                error: "only .csv files are accepted".to_string(),
            });
            continue;
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return server_error(anyhow::anyhow!("reading upload body: {err}")),
        };

        match import_csv(&store, &filename, &bytes).await {
            Ok(summary) => {
                state.feed.push(format!(
                    "imported {}: {} inserted, {} updated, {} failed",
                    summary.filename, summary.inserted, summary.updated, summary.failed
                ));
                results.push(UploadResultView {
                    filename: summary.filename.clone(),
                    ok: true,
                    inserted: summary.inserted,
                    updated: summary.updated,
                    failed: summary.failed,
                    removed: summary.dedupe.records_removed,
                    error: summary.sample_errors.join("\n"),
                });
            }
            Err(err) => {
                warn!(filename, error = %err, "import aborted");
                state.feed.push(format!("import of {filename} failed: {err}"));
                results.push(UploadResultView {
                    filename,
                    ok: false,
                    inserted: 0,
                    updated: 0,
                    failed: 0,
                    removed: 0,
                    error: err.to_string(),
                });
            }
        }
    }

    render_html(UploadResultsTemplate { results })
}

async fn api_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_index_data(&state.pool).await {
        Ok(data) => Json(serde_json::json!({
            "total_leads": data.total_leads,
            "total_uploads": data.total_uploads,
            "total_companies": data.total_companies,
        }))
        .into_response(),
        Err(err) => server_error(err),
    }
}

async fn api_activity_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.feed.recent()).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        // Lazy pool: no connection is made until a handler actually queries.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:5432/leadbase_test")
            .expect("lazy pool");
        AppState::new(
            pool,
            Arc::new(JobTracker::new()),
            Arc::new(ActivityFeed::new(16)),
            None,
        )
    }

    #[tokio::test]
    async fn upload_form_renders_without_a_database() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/upload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Upload CSV"));
    }

    #[tokio::test]
    async fn activity_feed_is_served_as_json() {
        let state = test_state();
        state.feed.push("import finished");
        let app = app(state);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/activity")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "import finished");
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/jobs/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn known_job_status_is_pollable() {
        let state = test_state();
        let id = state.tracker.create();
        let app = app(state);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/jobs/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status["state"], "queued");
    }

    #[tokio::test]
    async fn hook_trigger_without_credentials_is_unavailable() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/leads/1/hook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
