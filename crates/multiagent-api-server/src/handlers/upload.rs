use crate::document::DocumentParser;
use crate::models::{UploadKind, UploadResponse};
use crate::services::session::DocumentUpload;
use crate::state::AppState;
use crate::utils::error::ApiError;
use crate::utils::hashing::hash_bytes;
use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use tracing::{error, info, warn};

pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut session_id: Option<String> = None;
    let mut file_data: Option<Bytes> = None;
    let mut filename: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "session_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid session_id: {}", e)))?;
                session_id = Some(text.trim().to_string());
            }
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let session_id = session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("session_id mancante".to_string()))?;
    let file_data = file_data.ok_or_else(|| ApiError::BadRequest("file required".to_string()))?;
    let filename = filename.ok_or_else(|| ApiError::BadRequest("filename required".to_string()))?;

    let upload = &state.settings.upload;
    if file_data.len() > upload.max_file_size_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "❌ File troppo grande (max {} MB)",
            upload.max_file_size_bytes / 1024 / 1024
        )));
    }

    let size = file_data.len();
    let extension = DocumentParser::extension(&filename).unwrap_or_default();
    info!(
        "📂 File '{}' ({} bytes) uploaded to session {}",
        filename, size, session_id
    );

    if upload.image_extensions.contains(&extension) {
        let images = state
            .registry
            .attach_image(&session_id, file_data, Some(filename.clone()))
            .await?;
        info!("Session {} now holds {} image(s)", session_id, images);

        return Ok(Json(UploadResponse {
            message: format!("✅ Immagine '{}' caricata", filename),
            size,
            session_id,
            kind: UploadKind::Image,
            index: None,
            chunks: None,
            pages: None,
        }));
    }

    if !upload.document_extensions.contains(&extension) {
        return Err(ApiError::UnsupportedMediaType(format!(
            "Formato non supportato: .{}",
            extension
        )));
    }

    let fingerprint = hash_bytes(&file_data);

    // lopdf and zip are synchronous and can take a while on large files
    let parse_name = filename.clone();
    let parsed = tokio::task::spawn_blocking(move || DocumentParser::parse_bytes(&parse_name, &file_data))
        .await
        .map_err(|e| {
            error!("Parser task failed: {}", e);
            ApiError::InternalError("Errore durante upload.".to_string())
        })?
        .map_err(|e| {
            warn!("Failed to parse {}: {:#}", filename, e);
            ApiError::BadRequest(format!("⚠️ Nessun contenuto valido in {}", filename))
        })?;

    let chunks = state.chunker.passages(&parsed.content, &filename);
    if chunks.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "⚠️ Nessun contenuto valido in {}",
            filename
        )));
    }
    let chunk_count = chunks.len();

    let lifecycle = state
        .registry
        .attach_document(
            &session_id,
            DocumentUpload {
                source: filename.clone(),
                fingerprint,
                chunks,
            },
        )
        .await?;

    Ok(Json(UploadResponse {
        message: format!("✅ File '{}' caricato", filename),
        size,
        session_id,
        kind: UploadKind::Document,
        index: Some(lifecycle),
        chunks: Some(chunk_count),
        pages: parsed.pages,
    }))
}
