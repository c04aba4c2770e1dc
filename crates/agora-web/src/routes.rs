//! Web routes.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use agora_board::{
    Board, Comment, CommentView, EntityId, EventKind, IdentityResolver, Post, PostPatch, PostView,
};

use crate::error::WebError;
use crate::identity::ClientIdentity;
use crate::sse::{SubscriptionScope, create_sse_stream};

/// Request body cap. Large enough for inline base64 images.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// HTTP layer configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Prefer proxy headers over the peer address when resolving identity.
    pub trust_proxy: bool,
    /// Honour `postId` / `commentId` on event streams.
    pub scoped_subscriptions: bool,
    /// Maximum accepted request body in bytes.
    pub body_limit: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            trust_proxy: false,
            scoped_subscriptions: false,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Shared state for the web server.
pub struct AppState {
    pub board: Board,
    pub resolver: IdentityResolver,
    pub config: WebConfig,
}

type WebResult<T> = Result<T, WebError>;

/// Create the web router.
pub fn create_router(board: Board, config: WebConfig) -> Router {
    info!(
        trust_proxy = config.trust_proxy,
        scoped_subscriptions = config.scoped_subscriptions,
        body_limit = config.body_limit,
        "creating router"
    );

    let layers = ServiceBuilder::new()
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(config.body_limit));

    let state = Arc::new(AppState {
        board,
        resolver: IdentityResolver::new(config.trust_proxy),
        config,
    });

    Router::new()
        .route("/health", get(health))
        // Posts
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/mine", get(my_posts))
        .route("/api/posts/{id}", put(update_post).delete(delete_post))
        .route("/api/posts/{id}/like", post(like_post).delete(unlike_post))
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
        // Comments
        .route(
            "/api/comments/{id}",
            put(update_comment).delete(delete_comment),
        )
        .route("/api/comments/{id}/replies", get(list_replies))
        .route(
            "/api/comments/{id}/like",
            post(like_comment).delete(unlike_comment),
        )
        // Live updates
        .route("/api/events/{kind}", get(events))
        .layer(layers)
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> WebResult<impl IntoResponse> {
    let stats = state.board.stats().await?;
    Ok(Json(json!({
        "status": "ok",
        "posts": stats.posts,
        "comments": stats.comments,
    })))
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatePostBody {
    title: Option<String>,
    text: Option<String>,
    image: Option<String>,
}

async fn list_posts(State(state): State<Arc<AppState>>) -> WebResult<Json<Vec<PostView>>> {
    Ok(Json(state.board.posts().await?))
}

async fn my_posts(
    State(state): State<Arc<AppState>>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Vec<PostView>>> {
    Ok(Json(state.board.my_posts(&identity).await?))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    ClientIdentity(identity): ClientIdentity,
    body: Result<Json<CreatePostBody>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Post>)> {
    let Json(body) = body?;
    let post = state
        .board
        .post_manager()
        .create_post(body.title, body.text, body.image, &identity)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
    patch: Result<Json<PostPatch>, JsonRejection>,
) -> WebResult<Json<Post>> {
    let Json(patch) = patch?;
    let post = state
        .board
        .post_manager()
        .update_post(&id, patch, &identity)
        .await?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Post>> {
    let post = state
        .board
        .post_manager()
        .delete_post(&id, &identity)
        .await?;
    Ok(Json(post))
}

async fn like_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Post>> {
    Ok(Json(state.board.like_engine().like_post(&id, &identity).await?))
}

async fn unlike_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Post>> {
    Ok(Json(
        state.board.like_engine().unlike_post(&id, &identity).await?,
    ))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentBody {
    text: String,
    parent_id: Option<EntityId>,
}

#[derive(Debug, Deserialize)]
struct UpdateCommentBody {
    text: String,
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<EntityId>,
) -> WebResult<Json<Vec<CommentView>>> {
    Ok(Json(state.board.comments(&post_id).await?))
}

async fn list_replies(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
) -> WebResult<Json<Vec<CommentView>>> {
    Ok(Json(state.board.replies(&id).await?))
}

async fn create_comment(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
    body: Result<Json<CreateCommentBody>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Comment>)> {
    let Json(body) = body?;
    let comment = state
        .board
        .comment_tree()
        .create_comment(&post_id, &body.text, body.parent_id.as_ref(), &identity)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
    body: Result<Json<UpdateCommentBody>, JsonRejection>,
) -> WebResult<Json<Comment>> {
    let Json(body) = body?;
    let comment = state
        .board
        .comment_tree()
        .update_comment(&id, &body.text, &identity)
        .await?;
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Comment>> {
    let comment = state
        .board
        .comment_tree()
        .delete_comment(&id, &identity)
        .await?;
    Ok(Json(comment))
}

async fn like_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Comment>> {
    Ok(Json(
        state.board.like_engine().like_comment(&id, &identity).await?,
    ))
}

async fn unlike_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<EntityId>,
    ClientIdentity(identity): ClientIdentity,
) -> WebResult<Json<Comment>> {
    Ok(Json(
        state
            .board
            .like_engine()
            .unlike_comment(&id, &identity)
            .await?,
    ))
}

// ---------------------------------------------------------------------------
// Live updates
// ---------------------------------------------------------------------------

async fn events(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(scope): Query<SubscriptionScope>,
) -> WebResult<impl IntoResponse> {
    let kind: EventKind = kind.parse().map_err(WebError::UnknownEventKind)?;

    // Broadcast unless scoping was switched on
    let scope = if state.config.scoped_subscriptions {
        scope
    } else {
        SubscriptionScope::default()
    };

    info!(%kind, scoped = !scope.is_unscoped(), "event stream opened");
    Ok(create_sse_stream(state.board.bus().subscribe(kind), scope))
}
