//! Reviews nested under `/medias/:id/reviews`.
//!
//! Every operation checks the parent media first. Update and delete then
//! address the review by its own ID across the whole collection; they do not
//! re-check that the review's `elementId` matches the path.

use crate::api::{AppState, RequestContext};
use crate::error::ApiError;
use crate::models::{NewReview, Review, ReviewPatch};
use crate::validation::ValidJson;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};

async fn ensure_media(state: &AppState, media_id: &str) -> Result<(), ApiError> {
    if state.store.media_exists(media_id).await? {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("Media not found with id {media_id}")))
    }
}

/// Create a review; responds with the whole review collection
#[instrument(skip(state, ctx, input), fields(request_id = %ctx.request_id, user = %ctx.user))]
pub async fn create_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(media_id): Path<String>,
    ValidJson(input): ValidJson<NewReview>,
) -> Result<(StatusCode, Json<Vec<Review>>), ApiError> {
    ensure_media(&state, &media_id).await?;

    let review = Review::new(&media_id, input);
    let review_id = review.id.clone();

    let guard = state.store.reviews.lock().await;
    let mut reviews = guard.load().await?;
    reviews.push(review);
    guard.save(&reviews).await?;

    info!(media_id = %media_id, review_id = %review_id, "Review created");
    metrics::counter!("catalog.reviews.created").increment(1);

    Ok((StatusCode::CREATED, Json(reviews)))
}

/// List the reviews of one media
#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    ensure_media(&state, &media_id).await?;

    let mut reviews = state.store.reviews.load().await?;
    reviews.retain(|r| r.media_id == media_id);

    Ok(Json(reviews))
}

#[instrument(skip(state))]
pub async fn get_review(
    State(state): State<AppState>,
    Path((media_id, review_id)): Path<(String, String)>,
) -> Result<Json<Review>, ApiError> {
    ensure_media(&state, &media_id).await?;

    state
        .store
        .reviews
        .load()
        .await?
        .into_iter()
        .find(|r| r.media_id == media_id && r.id == review_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Review not found with id {review_id} of media with id {media_id}"
            ))
        })
}

#[instrument(skip(state, ctx, patch), fields(request_id = %ctx.request_id))]
pub async fn update_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((media_id, review_id)): Path<(String, String)>,
    ValidJson(patch): ValidJson<ReviewPatch>,
) -> Result<Json<Review>, ApiError> {
    ensure_media(&state, &media_id).await?;

    let guard = state.store.reviews.lock().await;
    let mut reviews = guard.load().await?;

    let review = reviews
        .iter_mut()
        .find(|r| r.id == review_id)
        .ok_or_else(|| ApiError::review_not_found(&review_id))?;
    review.apply(patch);
    let updated = review.clone();

    guard.save(&reviews).await?;

    Ok(Json(updated))
}

#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((media_id, review_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    ensure_media(&state, &media_id).await?;

    let guard = state.store.reviews.lock().await;
    let mut reviews = guard.load().await?;
    let before = reviews.len();

    reviews.retain(|r| r.id != review_id);
    if reviews.len() == before {
        return Err(ApiError::review_not_found(&review_id));
    }

    guard.save(&reviews).await?;

    info!(media_id = %media_id, review_id = %review_id, "Review deleted");

    Ok(StatusCode::NO_CONTENT)
}
