use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::Settings;
use crate::db::{
    create_pool, get_all_teams, get_game, get_games, get_news, get_news_article, get_odds,
    get_odds_for_game, get_parlay, get_parlays, get_player, get_player_prop, get_player_props,
    get_players_by_team, get_team_by_id, init_database_with_pool, record_game_result,
    upsert_odds_quote, upsert_player_prop, upsert_player_stat, GameFilter, NewsFilter, PropFilter,
};
use crate::error::{ApiError, BettingError};
use crate::models::*;
use crate::services::news::{ingest_article, refresh_news, NewsRefreshSummary};
use crate::services::odds_fetcher::{refresh_odds, FetchSummary};
use crate::services::{select_best_odds, AnalysisService, ParlayService, ParlaySweeper, SweepReport};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub settings: Arc<Settings>,
    pub sweeper: ParlaySweeper,
    pub parlays: ParlayService,
    pub analysis: AnalysisService,
}

impl AppState {
    pub fn new(pool: SqlitePool, settings: Settings) -> anyhow::Result<Self> {
        let sweeper = ParlaySweeper::new(settings.reference_sportsbook.clone());
        let parlays = ParlayService::new(settings.reference_sportsbook.clone());
        let analysis = AnalysisService::new(&settings)?;
        if !analysis.is_enabled() {
            tracing::info!("LLM_API_KEY not set; analysis serves cached results only");
        }
        Ok(Self {
            pool,
            settings: Arc::new(settings),
            sweeper,
            parlays,
            analysis,
        })
    }
}

pub async fn serve(settings: Settings, port: u16) -> anyhow::Result<()> {
    let pool = create_pool(&settings.database_url).await?;
    init_database_with_pool(&pool).await?;

    let host = settings.api_host.clone();
    let state = AppState::new(pool, settings)?;

    if let Some(secs) = state.settings.sweep_interval_secs {
        spawn_interval_sweep(state.pool.clone(), state.sweeper.clone(), secs);
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("ParlayDesk API server listening on {}:{}", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

fn spawn_interval_sweep(pool: SqlitePool, sweeper: ParlaySweeper, secs: u64) {
    tracing::info!("Sweeping pending parlays every {}s", secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.sweep(&pool).await {
                tracing::error!("Scheduled sweep failed: {}", e);
            }
        }
    });
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/teams", get(list_teams_handler))
        .route("/api/teams/{id}", get(get_team_handler))
        .route("/api/games", get(list_games_handler).post(create_game_handler))
        .route("/api/games/{id}", get(get_game_handler))
        .route("/api/games/{id}/result", put(record_result_handler))
        .route("/api/odds", get(list_odds_handler).post(upsert_odds_handler))
        .route("/api/odds/compare", get(compare_odds_handler))
        .route("/api/odds/best", get(best_odds_handler))
        .route("/api/odds/refresh", post(refresh_odds_handler))
        .route("/api/player-props", get(list_props_handler).post(upsert_prop_handler))
        .route("/api/player-props/{id}", get(get_prop_handler))
        .route("/api/player-stats", post(record_stat_handler))
        .route("/api/parlays", get(list_parlays_handler).post(create_parlay_handler))
        .route("/api/parlays/update-status", post(sweep_handler))
        .route(
            "/api/parlays/{id}",
            get(get_parlay_handler)
                .put(update_parlay_handler)
                .delete(delete_parlay_handler),
        )
        .route("/api/news", get(list_news_handler).post(create_news_handler))
        .route("/api/news/refresh", post(refresh_news_handler))
        .route("/api/news/team/{id}", get(team_news_handler))
        .route("/api/news/player/{id}", get(player_news_handler))
        .route("/api/news/{id}", get(get_news_handler))
        .route("/api/analysis/game/{id}", get(game_analysis_handler))
        .route("/api/analysis/team/{id}", get(team_analysis_handler))
        .route("/api/analysis/parlay/evaluate", post(evaluate_parlay_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ParlayDesk API is running"))
}

// ── Teams ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TeamWithRoster {
    #[serde(flatten)]
    team: Team,
    players: Vec<Player>,
}

async fn list_teams_handler(State(state): State<AppState>) -> ApiResult<Vec<Team>> {
    Ok(Json(ApiResponse::success(get_all_teams(&state.pool).await?)))
}

async fn get_team_handler(State(state): State<AppState>, Path(team_id): Path<String>) -> ApiResult<TeamWithRoster> {
    let team = get_team_by_id(&state.pool, &team_id)
        .await?
        .ok_or_else(|| BettingError::not_found("team", team_id.clone()))?;
    let players = get_players_by_team(&state.pool, &team_id).await?;
    Ok(Json(ApiResponse::success(TeamWithRoster { team, players })))
}

// ── Games ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GamesQuery {
    status: Option<GameStatus>,
    team_id: Option<String>,
    date: Option<NaiveDate>,
    days: Option<i64>,
}

async fn list_games_handler(State(state): State<AppState>, Query(params): Query<GamesQuery>) -> ApiResult<Vec<Game>> {
    let filter = GameFilter {
        status: params.status,
        team_id: params.team_id,
        date: params.date,
        upcoming_days: params.days.map(|d| d.clamp(1, 60)),
    };
    Ok(Json(ApiResponse::success(get_games(&state.pool, &filter).await?)))
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(request): Json<NewGame>,
) -> Result<(StatusCode, Json<ApiResponse<Game>>), ApiError> {
    let game = crate::db::create_game(&state.pool, &request).await?;
    tracing::info!("Created game {} ({} vs {})", game.id, game.home_team_name, game.away_team_name);
    Ok((StatusCode::CREATED, Json(ApiResponse::success(game))))
}

async fn get_game_handler(State(state): State<AppState>, Path(game_id): Path<String>) -> ApiResult<Game> {
    let game = get_game(&state.pool, &game_id)
        .await?
        .ok_or_else(|| BettingError::not_found("game", game_id))?;
    Ok(Json(ApiResponse::success(game)))
}

async fn record_result_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(result): Json<GameResult>,
) -> ApiResult<Game> {
    Ok(Json(ApiResponse::success(record_game_result(&state.pool, &game_id, &result).await?)))
}

// ── Odds ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct OddsQuery {
    game_id: Option<String>,
    sportsbook: Option<String>,
}

#[derive(Deserialize)]
struct GameQuery {
    game_id: String,
}

#[derive(Deserialize)]
struct RefreshQuery {
    force: Option<bool>,
}

async fn list_odds_handler(State(state): State<AppState>, Query(params): Query<OddsQuery>) -> ApiResult<Vec<OddsQuote>> {
    let quotes = get_odds(&state.pool, params.game_id.as_deref(), params.sportsbook.as_deref()).await?;
    Ok(Json(ApiResponse::success(quotes)))
}

async fn upsert_odds_handler(State(state): State<AppState>, Json(input): Json<OddsQuoteInput>) -> ApiResult<OddsQuote> {
    Ok(Json(ApiResponse::success(upsert_odds_quote(&state.pool, &input).await?)))
}

async fn compare_odds_handler(State(state): State<AppState>, Query(params): Query<GameQuery>) -> ApiResult<Vec<OddsQuote>> {
    let quotes = get_odds_for_game(&state.pool, &params.game_id, None).await?;
    if quotes.is_empty() {
        return Err(BettingError::not_found("odds for game", params.game_id).into());
    }
    Ok(Json(ApiResponse::success(quotes)))
}

async fn best_odds_handler(State(state): State<AppState>, Query(params): Query<GameQuery>) -> ApiResult<BestOdds> {
    if get_game(&state.pool, &params.game_id).await?.is_none() {
        return Err(BettingError::not_found("game", params.game_id).into());
    }
    let quotes = get_odds_for_game(&state.pool, &params.game_id, None).await?;
    Ok(Json(ApiResponse::success(select_best_odds(&params.game_id, &quotes))))
}

async fn refresh_odds_handler(State(state): State<AppState>, Query(params): Query<RefreshQuery>) -> ApiResult<FetchSummary> {
    let summary = refresh_odds(&state.pool, &state.settings, params.force.unwrap_or(false)).await?;
    Ok(Json(ApiResponse::success(summary)))
}

// ── Player props and stats ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct PropsQuery {
    game_id: Option<String>,
    player_id: Option<String>,
    prop_type: Option<PropCategory>,
    sportsbook: Option<String>,
}

async fn list_props_handler(
    State(state): State<AppState>,
    Query(params): Query<PropsQuery>,
) -> ApiResult<Vec<PlayerPropQuote>> {
    let filter = PropFilter {
        game_id: params.game_id,
        player_id: params.player_id,
        prop_type: params.prop_type,
        sportsbook: params.sportsbook,
    };
    Ok(Json(ApiResponse::success(get_player_props(&state.pool, &filter).await?)))
}

async fn upsert_prop_handler(
    State(state): State<AppState>,
    Json(input): Json<PlayerPropInput>,
) -> ApiResult<PlayerPropQuote> {
    Ok(Json(ApiResponse::success(upsert_player_prop(&state.pool, &input).await?)))
}

async fn get_prop_handler(State(state): State<AppState>, Path(prop_id): Path<String>) -> ApiResult<PlayerPropQuote> {
    let prop = get_player_prop(&state.pool, &prop_id)
        .await?
        .ok_or_else(|| BettingError::not_found("player prop", prop_id))?;
    Ok(Json(ApiResponse::success(prop)))
}

async fn record_stat_handler(State(state): State<AppState>, Json(input): Json<PlayerStatInput>) -> ApiResult<PlayerStat> {
    Ok(Json(ApiResponse::success(upsert_player_stat(&state.pool, &input).await?)))
}

// ── Parlays ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ParlaysQuery {
    status: Option<ParlayStatus>,
    limit: Option<i64>,
}

async fn list_parlays_handler(
    State(state): State<AppState>,
    Query(params): Query<ParlaysQuery>,
) -> ApiResult<Vec<ParlayWithLegs>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    Ok(Json(ApiResponse::success(get_parlays(&state.pool, params.status, Some(limit)).await?)))
}

async fn create_parlay_handler(
    State(state): State<AppState>,
    Json(request): Json<NewParlay>,
) -> Result<(StatusCode, Json<ApiResponse<ParlayWithLegs>>), ApiError> {
    let parlay = state.parlays.create_parlay(&state.pool, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(parlay))))
}

async fn get_parlay_handler(State(state): State<AppState>, Path(parlay_id): Path<String>) -> ApiResult<ParlayWithLegs> {
    let parlay = get_parlay(&state.pool, &parlay_id)
        .await?
        .ok_or_else(|| BettingError::not_found("parlay", parlay_id))?;
    Ok(Json(ApiResponse::success(parlay)))
}

async fn update_parlay_handler(
    State(state): State<AppState>,
    Path(parlay_id): Path<String>,
    Json(update): Json<ParlayUpdate>,
) -> ApiResult<ParlayWithLegs> {
    let parlay = state.parlays.update_parlay(&state.pool, &parlay_id, update).await?;
    Ok(Json(ApiResponse::success(parlay)))
}

async fn delete_parlay_handler(State(state): State<AppState>, Path(parlay_id): Path<String>) -> ApiResult<String> {
    state.parlays.delete_parlay(&state.pool, &parlay_id).await?;
    Ok(Json(ApiResponse::success(format!("Parlay {} deleted", parlay_id))))
}

// POST /api/parlays/update-status - run the settlement sweep now
async fn sweep_handler(State(state): State<AppState>) -> ApiResult<SweepReport> {
    let report = state.sweeper.sweep_with_report(&state.pool).await?;
    Ok(Json(ApiResponse::success(report)))
}

// ── News ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NewsQuery {
    team_id: Option<String>,
    player_id: Option<String>,
    source: Option<String>,
    days: Option<i64>,
    limit: Option<i64>,
}

impl NewsQuery {
    fn filter(self) -> NewsFilter {
        let days = self.days.unwrap_or(7).clamp(1, 365);
        NewsFilter {
            team_id: self.team_id,
            player_id: self.player_id,
            source: self.source,
            since: Some(chrono::Utc::now() - chrono::Duration::days(days)),
            limit: Some(self.limit.unwrap_or(20).clamp(1, 100)),
        }
    }
}

async fn list_news_handler(State(state): State<AppState>, Query(params): Query<NewsQuery>) -> ApiResult<Vec<NewsArticle>> {
    Ok(Json(ApiResponse::success(get_news(&state.pool, &params.filter()).await?)))
}

async fn create_news_handler(
    State(state): State<AppState>,
    Json(input): Json<NewsArticleInput>,
) -> Result<(StatusCode, Json<ApiResponse<NewsArticle>>), ApiError> {
    let article = ingest_article(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(article))))
}

async fn get_news_handler(State(state): State<AppState>, Path(article_id): Path<String>) -> ApiResult<NewsArticle> {
    let article = get_news_article(&state.pool, &article_id)
        .await?
        .ok_or_else(|| BettingError::not_found("news article", article_id))?;
    Ok(Json(ApiResponse::success(article)))
}

async fn team_news_handler(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(params): Query<NewsQuery>,
) -> ApiResult<Vec<NewsArticle>> {
    if get_team_by_id(&state.pool, &team_id).await?.is_none() {
        return Err(BettingError::not_found("team", team_id).into());
    }
    let filter = NewsFilter {
        team_id: Some(team_id),
        ..params.filter()
    };
    Ok(Json(ApiResponse::success(get_news(&state.pool, &filter).await?)))
}

async fn player_news_handler(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Query(params): Query<NewsQuery>,
) -> ApiResult<Vec<NewsArticle>> {
    if get_player(&state.pool, &player_id).await?.is_none() {
        return Err(BettingError::not_found("player", player_id).into());
    }
    let filter = NewsFilter {
        player_id: Some(player_id),
        ..params.filter()
    };
    Ok(Json(ApiResponse::success(get_news(&state.pool, &filter).await?)))
}

async fn refresh_news_handler(State(state): State<AppState>) -> ApiResult<NewsRefreshSummary> {
    Ok(Json(ApiResponse::success(refresh_news(&state.pool, &state.settings).await?)))
}

// ── Analysis ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AnalysisQuery {
    refresh: Option<bool>,
}

#[derive(Deserialize)]
struct EvaluateQuery {
    parlay_id: String,
    refresh: Option<bool>,
}

async fn game_analysis_handler(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(params): Query<AnalysisQuery>,
) -> ApiResult<Analysis> {
    let analysis = state
        .analysis
        .analyze_game(&state.pool, &game_id, params.refresh.unwrap_or(false))
        .await?;
    Ok(Json(ApiResponse::success(analysis)))
}

async fn team_analysis_handler(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(params): Query<AnalysisQuery>,
) -> ApiResult<Analysis> {
    let analysis = state
        .analysis
        .analyze_team(&state.pool, &team_id, params.refresh.unwrap_or(false))
        .await?;
    Ok(Json(ApiResponse::success(analysis)))
}

async fn evaluate_parlay_handler(
    State(state): State<AppState>,
    Query(params): Query<EvaluateQuery>,
) -> ApiResult<Analysis> {
    let analysis = state
        .analysis
        .evaluate_parlay(&state.pool, &params.parlay_id, params.refresh.unwrap_or(false))
        .await?;
    Ok(Json(ApiResponse::success(analysis)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_game, seed_player, seed_quote};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> (Router, SqlitePool) {
        let pool = memory_pool().await;
        let state = AppState::new(pool.clone(), Settings::default()).unwrap();
        (create_router(state), pool)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_index_serves_html() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8_lossy(&bytes);
        assert!(page.contains("ParlayDesk"));
        assert!(page.contains("id=\"slip-form\""));
        assert!(page.contains("api('/api/parlays', {"));
        assert!(page.contains("id=\"slip-error\""));
    }

    #[tokio::test]
    async fn test_parlay_lifecycle() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;
        seed_quote(&pool, OddsQuoteInput {
            game_id: game.id.clone(),
            sportsbook: "DraftKings".into(),
            home_moneyline: Some(100.0),
            ..Default::default()
        })
        .await;

        let (status, body) = call(&app, Method::POST, "/api/parlays", Some(json!({
            "stake": 10.0,
            "legs": [{"game_id": game.id, "bet_type": "moneyline", "selection": "home"}]
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["total_price"], 2.0);
        assert_eq!(body["data"]["legs"][0]["price"], 100.0);

        let (status, _) = call(&app, Method::GET, &format!("/api/parlays/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::PUT, &format!("/api/games/{}/result", game.id), Some(json!({
            "home_score": 3, "away_score": 1
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "finished");

        let (status, body) = call(&app, Method::POST, "/api/parlays/update-status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["settled"], 1);

        let (_, body) = call(&app, Method::GET, "/api/parlays?status=won", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, Method::DELETE, &format!("/api/parlays/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::GET, &format!("/api/parlays/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_leg_shape_is_bad_request() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;
        let (status, body) = call(&app, Method::POST, "/api/parlays", Some(json!({
            "stake": 10.0,
            "legs": [{"game_id": game.id, "bet_type": "moneyline", "selection": "over", "price": -110}]
        })))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_best_and_compare_odds() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;

        let (status, _) = call(&app, Method::GET, &format!("/api/odds/compare?game_id={}", game.id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for (book, price) in [("DraftKings", -120.0), ("FanDuel", -110.0)] {
            let (status, _) = call(&app, Method::POST, "/api/odds", Some(json!({
                "game_id": game.id, "sportsbook": book, "home_moneyline": price
            })))
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, body) = call(&app, Method::GET, &format!("/api/odds/compare?game_id={}", game.id), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = call(&app, Method::GET, &format!("/api/odds/best?game_id={}", game.id), None).await;
        assert_eq!(body["data"]["home_moneyline"]["sportsbook"], "FanDuel");

        let (status, _) = call(&app, Method::GET, "/api/odds/best?game_id=missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_refresh_without_key_is_bad_request() {
        let (app, _) = app().await;
        let (status, _) = call(&app, Method::POST, "/api/odds/refresh", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_changing_final_score_is_rejected() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;
        let uri = format!("/api/games/{}/result", game.id);
        call(&app, Method::PUT, &uri, Some(json!({"home_score": 2, "away_score": 2}))).await;
        let (status, _) = call(&app, Method::PUT, &uri, Some(json!({"home_score": 3, "away_score": 2}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_game_cannot_be_posted_as_finished() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;
        let request = |status: &str| {
            json!({
                "home_team_id": game.home_team_id,
                "away_team_id": game.away_team_id,
                "game_time": "2026-03-01T00:00:00Z",
                "status": status
            })
        };

        let (status, body) = call(&app, Method::POST, "/api/games", Some(request("finished"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = call(&app, Method::POST, "/api/games", Some(request("scheduled"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["home_score"], Value::Null);
    }

    #[tokio::test]
    async fn test_get_player_prop_by_id() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;
        let player = seed_player(&pool, &game.home_team_id, "Top Scorer").await;

        let (status, body) = call(&app, Method::POST, "/api/player-props", Some(json!({
            "game_id": game.id, "sportsbook": "DraftKings", "player_id": player.id,
            "prop_type": "shots_on_goal", "line": 3.5, "over_price": -120, "under_price": 100
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        let prop_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, Method::GET, &format!("/api/player-props/{prop_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["line"], 3.5);

        let (status, _) = call(&app, Method::GET, "/api/player-props/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_news_routes() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;
        let player = seed_player(&pool, &game.away_team_id, "Star Winger").await;

        let (status, body) = call(&app, Method::POST, "/api/news", Some(json!({
            "source": "Wire",
            "title": "Star Winger questionable",
            "url": "https://example.com/winger",
            "content": "Lower-body injury.",
            "published_at": chrono::Utc::now()
        })))
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["teams"][0]["id"], game.away_team_id.as_str());

        let (status, body) = call(&app, Method::GET, &format!("/api/news/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["players"][0]["name"], "Star Winger");

        let (_, body) = call(&app, Method::GET, &format!("/api/news/team/{}", game.away_team_id), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        let (_, body) = call(&app, Method::GET, &format!("/api/news/team/{}", game.home_team_id), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
        let (_, body) = call(&app, Method::GET, &format!("/api/news/player/{}", player.id), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        let (_, body) = call(&app, Method::GET, "/api/news?source=Wire", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, Method::GET, "/api/news/team/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::GET, "/api/news/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::POST, "/api/news/refresh", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analysis_without_key_is_bad_request() {
        let (app, pool) = app().await;
        let game = seed_game(&pool, "g1").await;

        let (status, body) = call(&app, Method::GET, &format!("/api/analysis/game/{}", game.id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("LLM_API_KEY"));

        let (status, _) = call(&app, Method::GET, &format!("/api/analysis/team/{}", game.home_team_id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, Method::GET, "/api/analysis/game/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::POST, "/api/analysis/parlay/evaluate?parlay_id=missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
