use crate::api::{AppState, RequestContext};
use crate::error::ApiError;
use crate::models::{Media, MediaPatch, NewMedia};
use crate::pdf::{render_media_sheet, PosterFetcher, PosterImage};
use crate::s3_uploader::PosterUpload;
use crate::validation::{FieldViolation, ValidJson};
use anyhow::Context;
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};

const PDF_CHUNK_SIZE: usize = 16 * 1024;

/// Query parameters for the media list
#[derive(Debug, Deserialize)]
pub struct MediaListQuery {
    /// Exact, case-sensitive title match
    pub title: Option<String>,
}

/// Create a media record
#[instrument(skip(state, ctx, input), fields(request_id = %ctx.request_id, user = %ctx.user))]
pub async fn create_media(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ValidJson(input): ValidJson<NewMedia>,
) -> Result<impl IntoResponse, ApiError> {
    let media = Media::new(input);
    let id = media.id.clone();

    let guard = state.store.medias.lock().await;
    let mut medias = guard.load().await?;
    medias.push(media);
    guard.save(&medias).await?;

    info!(media_id = %id, "Media created");
    metrics::counter!("catalog.medias.created").increment(1);

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// List media, optionally filtered by exact title
#[instrument(skip(state))]
pub async fn list_medias(
    State(state): State<AppState>,
    Query(params): Query<MediaListQuery>,
) -> Result<Json<Vec<Media>>, ApiError> {
    let mut medias = state.store.medias.load().await?;

    if let Some(title) = params.title.filter(|t| !t.is_empty()) {
        medias.retain(|m| m.title == title);
    }

    Ok(Json(medias))
}

/// Get a single media record
#[instrument(skip(state))]
pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Media>, ApiError> {
    state
        .store
        .find_media(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::media_not_found(&id))
}

/// Shallow-merge the present fields into a media record
#[instrument(skip(state, ctx, patch), fields(request_id = %ctx.request_id))]
pub async fn update_media(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<MediaPatch>,
) -> Result<Json<Media>, ApiError> {
    let guard = state.store.medias.lock().await;
    let mut medias = guard.load().await?;

    let media = medias
        .iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| ApiError::media_not_found(&id))?;
    media.apply(patch);
    let updated = media.clone();

    guard.save(&medias).await?;

    debug!(media_id = %id, "Media updated");

    Ok(Json(updated))
}

/// Delete a media record
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn delete_media(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let guard = state.store.medias.lock().await;
    let medias = guard.load().await?;
    let before = medias.len();

    let remaining: Vec<Media> = medias.into_iter().filter(|m| m.id != id).collect();
    if remaining.len() == before {
        return Err(ApiError::media_not_found(&id));
    }

    guard.save(&remaining).await?;

    info!(media_id = %id, "Media deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Upload a poster image and point the record at it
#[instrument(skip(state, ctx, multipart), fields(request_id = %ctx.request_id))]
pub async fn upload_poster(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Media>, ApiError> {
    if !state.store.media_exists(&id).await? {
        return Err(ApiError::media_not_found(&id));
    }

    let mut multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let upload = read_poster_part(&mut multipart, &id).await?;

    let url = state.posters.upload_poster(upload).await?;

    let guard = state.store.medias.lock().await;
    let mut medias = guard.load().await?;

    // The record may have been deleted while the upload was in flight
    let media = medias
        .iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| ApiError::media_not_found(&id))?;
    media.set_poster(url);
    let updated = media.clone();

    guard.save(&medias).await?;

    info!(media_id = %id, poster = %updated.poster, "Poster updated");
    metrics::counter!("catalog.posters.uploaded").increment(1);

    Ok(Json(updated))
}

/// Pull the `Poster` file out of a multipart form
async fn read_poster_part(multipart: &mut Multipart, media_id: &str) -> Result<PosterUpload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("Poster") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if let Some(ref ct) = content_type {
            if !ct.starts_with("image/") {
                return Err(ApiError::Validation(vec![FieldViolation::new(
                    "Poster",
                    format!("Poster must be an image, got {ct}"),
                )]));
            }
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        if data.is_empty() {
            break;
        }

        return Ok(PosterUpload {
            media_id: media_id.to_string(),
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }

    Err(ApiError::Validation(vec![FieldViolation::new(
        "Poster",
        "Poster is a mandatory file field!",
    )]))
}

/// Stream a single-page PDF describing the media
#[instrument(skip(state))]
pub async fn export_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let media = state
        .store
        .find_media(&id)
        .await?
        .ok_or_else(|| ApiError::media_not_found(&id))?;

    let disposition = content_disposition(&media.title);
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(stream_pdf(state.poster_fetcher.clone(), media, tx));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .context("Failed to build PDF response")?;

    Ok(response)
}

type PdfChunk = Result<Vec<u8>, std::io::Error>;

/// Render the sheet and feed it to the response body.
///
/// Failures here happen after the status line went out, so they are logged
/// and the body simply ends.
async fn stream_pdf(fetcher: PosterFetcher, media: Media, tx: mpsc::Sender<PdfChunk>) {
    let poster = match fetcher.load(&media.poster).await {
        Ok(bytes) => match tokio::task::spawn_blocking(move || PosterImage::decode(&bytes)).await {
            Ok(Ok(image)) => Some(image),
            Ok(Err(e)) => {
                warn!(media_id = %media.id, error = %e, "Poster could not be decoded, exporting without it");
                None
            }
            Err(e) => {
                error!(media_id = %media.id, error = %e, "Poster decode task failed");
                None
            }
        },
        Err(e) => {
            warn!(media_id = %media.id, error = %e, "Poster could not be fetched, exporting without it");
            None
        }
    };

    let media_id = media.id.clone();
    let rendered =
        tokio::task::spawn_blocking(move || render_media_sheet(&media, poster.as_ref())).await;

    let pdf = match rendered {
        Ok(Ok(pdf)) => pdf,
        Ok(Err(e)) => {
            error!(media_id = %media_id, error = ?e, "PDF rendering failed");
            return;
        }
        Err(e) => {
            error!(media_id = %media_id, error = %e, "PDF rendering task failed");
            return;
        }
    };

    for chunk in pdf.chunks(PDF_CHUNK_SIZE) {
        if tx.send(Ok(chunk.to_vec())).await.is_err() {
            warn!(media_id = %media_id, "Client went away during PDF download");
            return;
        }
    }

    info!(media_id = %media_id, size_bytes = pdf.len(), "PDF exported");
    metrics::counter!("catalog.pdf.exported").increment(1);
}

/// `attachment` with an ASCII `filename` fallback and the exact title in
/// an RFC 5987 `filename*`
fn content_disposition(title: &str) -> String {
    let title = title.trim();
    let title = if title.is_empty() { "media" } else { title };

    let ascii: String = title
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::new();
    for byte in format!("{title}.pdf").bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => encoded.push(char::from(byte)),
            b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    format!("attachment; filename=\"{ascii}.pdf\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::json_store::CatalogStore;
    use crate::s3_uploader::MockPosterStore;
    use axum::extract::FromRequest;
    use std::sync::Arc;
    use std::time::Duration;

    async fn test_state(dir: &std::path::Path, posters: MockPosterStore) -> AppState {
        let data = DataConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        };

        AppState {
            store: Arc::new(CatalogStore::open(&data).await.unwrap()),
            posters: Arc::new(posters),
            poster_fetcher: PosterFetcher::new(Duration::from_secs(1), 1024 * 1024).unwrap(),
            default_user: "tester".to_string(),
            allowed_origins: Arc::new(Vec::new()),
        }
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("Dune"),
            "attachment; filename=\"Dune.pdf\"; filename*=UTF-8''Dune.pdf"
        );
        assert_eq!(
            content_disposition("AC/DC \"Live\""),
            "attachment; filename=\"AC_DC _Live_.pdf\"; filename*=UTF-8''AC%2FDC%20%22Live%22.pdf"
        );
        assert_eq!(
            content_disposition("  "),
            "attachment; filename=\"media.pdf\"; filename*=UTF-8''media.pdf"
        );
    }

    #[test]
    fn test_content_disposition_keeps_unicode_title() {
        assert_eq!(
            content_disposition("Amélie"),
            "attachment; filename=\"Am_lie.pdf\"; filename*=UTF-8''Am%C3%A9lie.pdf"
        );
    }

    #[tokio::test]
    async fn test_upload_poster_missing_media_skips_storage() {
        let tmp = tempfile::tempdir().unwrap();

        let mut posters = MockPosterStore::new();
        posters.expect_upload_poster().never();

        let state = test_state(tmp.path(), posters).await;

        // The 404 is decided before the multipart body is read
        let request = axum::http::Request::builder()
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=poster")
            .body(Body::empty())
            .unwrap();
        let multipart = Multipart::from_request(request, &()).await;

        let result = upload_poster(
            State(state),
            Extension(RequestContext::new("tester")),
            Path("missing".to_string()),
            multipart,
        )
        .await;

        match result {
            Err(ApiError::NotFound(message)) => assert!(message.contains("missing")),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_media_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path(), MockPosterStore::new()).await;

        let result = update_media(
            State(state.clone()),
            Extension(RequestContext::new("tester")),
            Path("nope".to_string()),
            ValidJson(MediaPatch::default()),
        )
        .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert!(state.store.medias.load().await.unwrap().is_empty());
    }
}
