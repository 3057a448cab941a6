//! Axum router and all HTTP handlers for mkp-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  Handlers stay thin: extract, call one `mkp_db`
//! operation, map the result. Errors go through [`ApiError`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use mkp_ledger::{ListingDraft, MarketError, WithdrawalDraft};

use crate::{
    api_types::{
        AccountView, AdminLoginRequest, AdminLoginResponse, CallbackQuery, CreateGameRequest,
        DashboardResponse, DeletedResponse, HealthResponse, ListingsQuery, LoginResponse,
        OnboardingResponse, PostMessageRequest, PurchaseRequest,
    },
    auth::{AdminSession, AuthedAccount, Session},
    error::ApiError,
    oauth_state::{onboarding_account, onboarding_subject, LOGIN_SUBJECT},
    state::AppState,
};

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        // auth
        .route("/v1/auth/login", get(auth_login))
        .route("/v1/auth/callback", get(auth_callback))
        .route("/v1/auth/logout", post(auth_logout))
        .route("/v1/me", get(me))
        // catalog and listings
        .route("/v1/games", get(games))
        .route("/v1/listings", get(listings_public).post(listings_submit))
        .route("/v1/listings/:id", get(listing_fetch))
        .route("/v1/listings/:id/purchase", post(listing_purchase))
        // purchases and chat
        .route("/v1/purchases", get(purchases_list))
        .route(
            "/v1/purchases/:id/messages",
            get(messages_list).post(messages_post),
        )
        // balance
        .route("/v1/withdrawals", get(withdrawals_list).post(withdrawals_request))
        .route("/v1/payouts/connect", get(payouts_connect))
        .route("/v1/payouts/callback", get(payouts_callback))
        // admin
        .route("/v1/admin/login", post(admin_login))
        .route("/v1/admin/dashboard", get(admin_dashboard))
        .route("/v1/admin/listings/:id/approve", post(admin_listing_approve))
        .route("/v1/admin/listings/:id/deny", post(admin_listing_deny))
        .route("/v1/admin/accounts/:id/ban", post(admin_account_ban))
        .route("/v1/admin/accounts/:id/unban", post(admin_account_unban))
        .route("/v1/admin/accounts/:id/delete", post(admin_account_delete))
        .route(
            "/v1/admin/withdrawals/:id/complete",
            post(admin_withdrawal_complete),
        )
        .route(
            "/v1/admin/withdrawals/:id/reject",
            post(admin_withdrawal_reject),
        )
        .route("/v1/admin/games", post(admin_game_create))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

/// Redirect the browser to the identity provider.
pub(crate) async fn auth_login(State(st): State<Arc<AppState>>) -> ApiResult<Redirect> {
    let state = st.oauth_states.issue(LOGIN_SUBJECT)?;
    let url = st
        .identity
        .authorize_url(&state)
        .map_err(|e| anyhow::anyhow!("identity provider misconfigured: {e}"))?;
    Ok(Redirect::to(&url))
}

pub(crate) async fn auth_callback(
    State(st): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> ApiResult<Json<LoginResponse>> {
    if !st.oauth_states.verify(&q.state, LOGIN_SUBJECT) {
        return Err(MarketError::validation("invalid or expired login state").into());
    }

    let token = st
        .identity
        .exchange_code(&q.code)
        .await
        .map_err(|e| MarketError::ExternalAuthFailed(e.to_string()))?;
    let identity = st
        .identity
        .fetch_identity(&token)
        .await
        .map_err(|e| MarketError::ExternalAuthFailed(e.to_string()))?;

    let account = mkp_db::upsert_account_on_login(&st.db, &identity).await?;
    let session_token = mkp_db::create_session(&st.db, account.id).await?;
    info!(account_id = account.id, provider = st.identity.name(), "login");

    Ok(Json(LoginResponse {
        session_token,
        account: account.into(),
    }))
}

pub(crate) async fn auth_logout(
    State(st): State<Arc<AppState>>,
    Session(subject): Session,
) -> ApiResult<StatusCode> {
    mkp_db::delete_session(&st.db, subject.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn me(auth: AuthedAccount) -> Json<AccountView> {
    Json(auth.account.into())
}

// ---------------------------------------------------------------------------
// Catalog and listings
// ---------------------------------------------------------------------------

pub(crate) async fn games(State(st): State<Arc<AppState>>) -> ApiResult<Response> {
    let games = mkp_db::list_games(&st.db).await?;
    Ok(Json(games).into_response())
}

pub(crate) async fn listings_public(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListingsQuery>,
) -> ApiResult<Response> {
    let listings = mkp_db::list_public(&st.db, q.game).await?;
    Ok(Json(listings).into_response())
}

/// Anonymous callers see only public listings. The seller and admins also see
/// the listing in any other state.
pub(crate) async fn listing_fetch(
    State(st): State<Arc<AppState>>,
    session: Option<Session>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let listing = match mkp_db::fetch_public_listing(&st.db, id).await {
        Ok(listing) => listing,
        Err(hidden) => {
            let Some(Session(viewer)) = session else {
                return Err(hidden.into());
            };
            let listing = mkp_db::fetch_listing(&st.db, id).await?;
            let owner = viewer.account.as_ref().map(|a| a.id) == Some(listing.seller_id);
            if !(viewer.is_admin || owner) {
                return Err(hidden.into());
            }
            listing
        }
    };
    Ok(Json(listing).into_response())
}

pub(crate) async fn listings_submit(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
    Json(draft): Json<ListingDraft>,
) -> ApiResult<Response> {
    let listing =
        mkp_db::submit_listing(&st.db, auth.id(), draft, st.settings.moderation).await?;
    Ok((StatusCode::CREATED, Json(listing)).into_response())
}

pub(crate) async fn listing_purchase(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
    Path(id): Path<i64>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Response> {
    let purchase = mkp_db::purchase(
        &st.db,
        st.payments.as_ref(),
        &st.purchase_terms(),
        id,
        auth.id(),
        &req.payment_token,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(purchase)).into_response())
}

// ---------------------------------------------------------------------------
// Purchases and chat
// ---------------------------------------------------------------------------

pub(crate) async fn purchases_list(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> ApiResult<Response> {
    let purchases = mkp_db::list_purchases(&st.db, auth.id()).await?;
    Ok(Json(purchases).into_response())
}

pub(crate) async fn messages_list(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
    Path(purchase_id): Path<i64>,
) -> ApiResult<Response> {
    let messages = mkp_db::list_messages(&st.db, purchase_id, auth.id()).await?;
    Ok(Json(messages).into_response())
}

pub(crate) async fn messages_post(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
    Path(purchase_id): Path<i64>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<Response> {
    let message = mkp_db::post_message(&st.db, purchase_id, auth.id(), &req.content).await?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

// ---------------------------------------------------------------------------
// Balance, withdrawals, merchant onboarding
// ---------------------------------------------------------------------------

pub(crate) async fn withdrawals_list(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> ApiResult<Response> {
    let withdrawals = mkp_db::list_withdrawals(&st.db, auth.id()).await?;
    Ok(Json(withdrawals).into_response())
}

pub(crate) async fn withdrawals_request(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
    Json(draft): Json<WithdrawalDraft>,
) -> ApiResult<Response> {
    let withdrawal =
        mkp_db::request_withdrawal(&st.db, auth.id(), draft, &st.settings.payout_methods).await?;
    Ok((StatusCode::CREATED, Json(withdrawal)).into_response())
}

pub(crate) async fn payouts_connect(
    State(st): State<Arc<AppState>>,
    auth: AuthedAccount,
) -> ApiResult<Json<OnboardingResponse>> {
    let state = st.oauth_states.issue(&onboarding_subject(auth.id()))?;
    let url = st
        .payments
        .onboarding_url(&state)
        .map_err(|e| anyhow::anyhow!("payment processor misconfigured: {e}"))?;
    Ok(Json(OnboardingResponse { url }))
}

/// Browser redirect back from the processor. There is no bearer token here;
/// the account is the one named in the signed state.
pub(crate) async fn payouts_callback(
    State(st): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> ApiResult<Json<AccountView>> {
    let account_id = st
        .oauth_states
        .verified_subject(&q.state)
        .as_deref()
        .and_then(onboarding_account)
        .ok_or_else(|| MarketError::validation("invalid or expired onboarding state"))?;

    let account = mkp_db::fetch_account(&st.db, account_id).await?;
    if account.banned {
        return Err(MarketError::forbidden("banned accounts cannot connect payouts").into());
    }

    let link = st
        .payments
        .exchange_onboarding_code(&q.code)
        .await
        .map_err(|e| MarketError::ExternalAuthFailed(e.to_string()))?;
    let account = mkp_db::set_merchant_id(&st.db, account_id, &link.merchant_id).await?;
    info!(account_id = account.id, merchant_id = %link.merchant_id, "merchant account connected");
    Ok(Json(account.into()))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub(crate) async fn admin_login(
    State(st): State<Arc<AppState>>,
    Json(req): Json<AdminLoginRequest>,
) -> ApiResult<Json<AdminLoginResponse>> {
    let Some(credential) = st.admin_credential.clone() else {
        return Err(MarketError::forbidden("admin login is disabled").into());
    };
    let verified = tokio::task::spawn_blocking(move || credential.verify(&req.password))
        .await
        .map_err(|e| anyhow::anyhow!("admin credential check panicked: {e}"))?;
    if !verified {
        tracing::warn!("admin login refused");
        return Err(MarketError::Unauthenticated.into());
    }

    let session_token = mkp_db::create_admin_session(&st.db).await?;
    info!("admin login");
    Ok(Json(AdminLoginResponse { session_token }))
}

pub(crate) async fn admin_dashboard(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
) -> ApiResult<Json<DashboardResponse>> {
    let accounts = mkp_db::list_accounts(&st.db).await?;
    let pending_listings = mkp_db::list_pending(&st.db).await?;
    let pending_withdrawals = mkp_db::list_pending_withdrawals(&st.db).await?;
    Ok(Json(DashboardResponse {
        accounts: accounts.into_iter().map(AccountView::from).collect(),
        pending_listings,
        pending_withdrawals,
    }))
}

pub(crate) async fn admin_listing_approve(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let listing = mkp_db::approve_listing(&st.db, id).await?;
    Ok(Json(listing).into_response())
}

pub(crate) async fn admin_listing_deny(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeletedResponse>> {
    mkp_db::deny_listing(&st.db, id).await?;
    Ok(Json(DeletedResponse { deleted: true, id }))
}

pub(crate) async fn admin_account_ban(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<AccountView>> {
    let account = mkp_db::ban_account(&st.db, id).await?;
    Ok(Json(account.into()))
}

pub(crate) async fn admin_account_unban(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<AccountView>> {
    let account = mkp_db::unban_account(&st.db, id).await?;
    Ok(Json(account.into()))
}

pub(crate) async fn admin_account_delete(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeletedResponse>> {
    mkp_db::delete_account(&st.db, id).await?;
    Ok(Json(DeletedResponse { deleted: true, id }))
}

pub(crate) async fn admin_withdrawal_complete(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let withdrawal = mkp_db::complete_withdrawal(&st.db, id).await?;
    Ok(Json(withdrawal).into_response())
}

pub(crate) async fn admin_withdrawal_reject(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let withdrawal = mkp_db::reject_withdrawal(&st.db, id).await?;
    Ok(Json(withdrawal).into_response())
}

pub(crate) async fn admin_game_create(
    State(st): State<Arc<AppState>>,
    _admin: AdminSession,
    Json(req): Json<CreateGameRequest>,
) -> ApiResult<Response> {
    let game = mkp_db::create_game(&st.db, &req.name, req.icon_url.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(game)).into_response())
}
