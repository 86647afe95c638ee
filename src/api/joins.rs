//! Thin HTTP surface over the Manager facade (spec §4.5, §6): enough to
//! exercise `ProcessCSV`/`List`/`Read`/`Remove`/enrichment end to end. The
//! feature-provider integration itself (PostGIS, GeoJSON, ...) is out of
//! scope, so a single shared `FeatureProvider` stands in for it.

use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::join::{CsvOptions, FeatureProvider, Manager, UploadedFile};

/// Registered feature providers, keyed by `collectionId`. Stands in for the
/// real provider integration, which this crate does not implement.
pub type ProviderRegistry = std::collections::BTreeMap<String, Arc<dyn FeatureProvider>>;

pub fn configure_join_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(upload_join)
        .service(list_joins)
        .service(read_join)
        .service(remove_join)
        .service(enrich_feature);
}

fn lookup_provider<'a>(
    registry: &'a ProviderRegistry,
    collection_id: &str,
) -> AppResult<&'a Arc<dyn FeatureProvider>> {
    registry
        .get(collection_id)
        .ok_or_else(|| AppError::NotFound(format!("unknown collection: {collection_id}")))
}

#[post("/collections/{collectionId}/joins")]
async fn upload_join(
    path: web::Path<String>,
    mut payload: Multipart,
    manager: web::Data<Manager>,
    providers: web::Data<ProviderRegistry>,
) -> AppResult<HttpResponse> {
    let collection_id = path.into_inner();
    let provider = lookup_provider(&providers, &collection_id)?.clone();

    let mut collection_key: Option<String> = None;
    let mut join_key: Option<String> = None;
    let mut join_fields = String::new();
    let mut csv_delimiter = ',';
    let mut csv_header_row: usize = 1;
    let mut csv_data_start_row: usize = 2;
    let mut join_file: Option<UploadedFile> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::InvalidInput(format!("multipart error: {e}")))?;
        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::InvalidInput("missing content disposition".to_string()))?
            .clone();
        let field_name = content_disposition.get_name().unwrap_or("").to_string();

        if let Some(filename) = content_disposition.get_filename() {
            let filename = filename.to_string();
            let content_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let mut buffer = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("read error: {e}")))?;
                buffer.extend_from_slice(&chunk);
            }

            join_file = Some(UploadedFile {
                name: filename,
                content_type,
                buffer,
            });
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("read error: {e}")))?;
            bytes.extend_from_slice(&chunk);
        }
        let value = String::from_utf8_lossy(&bytes).trim().to_string();

        match field_name.as_str() {
            "collectionKey" => collection_key = Some(value),
            "joinKey" => join_key = Some(value),
            "joinFields" => join_fields = value,
            "csvDelimiter" => {
                if let Some(c) = value.chars().next() {
                    csv_delimiter = c;
                }
            }
            "csvHeaderRow" => {
                csv_header_row = value
                    .parse()
                    .map_err(|_| AppError::InvalidInput("csvHeaderRow must be an integer".to_string()))?;
            }
            "csvDataStartRow" => {
                csv_data_start_row = value.parse().map_err(|_| {
                    AppError::InvalidInput("csvDataStartRow must be an integer".to_string())
                })?;
            }
            _ => {
                tracing::warn!("ignoring unrecognized multipart field: {field_name}");
            }
        }
    }

    let options = CsvOptions {
        collection_key: collection_key
            .ok_or_else(|| AppError::InvalidInput("missing collectionKey".to_string()))?,
        join_key: join_key.ok_or_else(|| AppError::InvalidInput("missing joinKey".to_string()))?,
        join_file: join_file.ok_or_else(|| AppError::InvalidInput("missing joinFile".to_string()))?,
        join_fields,
        csv_delimiter,
        csv_header_row,
        csv_data_start_row,
    };

    let manager = manager.into_inner();
    let collection_id_for_block = collection_id.clone();
    let table = web::block(move || {
        manager.process_csv(&collection_id_for_block, provider.as_ref(), &options)
    })
    .await
    .map_err(|e| AppError::Io(e.to_string()))??;

    tracing::info!(
        "ingested join source {} for collection {} ({} rows)",
        table.id,
        collection_id,
        table.number_of_rows
    );

    Ok(HttpResponse::Created().json(table))
}

#[get("/collections/{collectionId}/joins")]
async fn list_joins(path: web::Path<String>, manager: web::Data<Manager>) -> AppResult<HttpResponse> {
    let collection_id = path.into_inner();
    let manager = manager.into_inner();
    let refs = web::block(move || manager.list(&collection_id))
        .await
        .map_err(|e| AppError::Io(e.to_string()))??;

    let payload: Vec<_> = refs
        .into_iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "collectionId": r.collection_id,
                "timeStamp": r.time_stamp.to_rfc3339(),
                "joinSource": r.join_source,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(payload))
}

#[get("/collections/{collectionId}/joins/{id}")]
async fn read_join(
    path: web::Path<(String, String)>,
    manager: web::Data<Manager>,
) -> AppResult<HttpResponse> {
    let (collection_id, id) = path.into_inner();
    let manager = manager.into_inner();
    let table = web::block(move || manager.read(&collection_id, &id))
        .await
        .map_err(|e| AppError::Io(e.to_string()))??;

    Ok(HttpResponse::Ok().json(table))
}

#[delete("/collections/{collectionId}/joins/{id}")]
async fn remove_join(
    path: web::Path<(String, String)>,
    manager: web::Data<Manager>,
) -> AppResult<HttpResponse> {
    let (collection_id, id) = path.into_inner();
    let manager = manager.into_inner();
    let removed = web::block(move || manager.remove(&collection_id, &id))
        .await
        .map_err(|e| AppError::Io(e.to_string()))??;

    if removed {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Ok(HttpResponse::NotFound().finish())
    }
}

#[derive(Debug, Deserialize)]
struct EnrichQuery {
    #[serde(default)]
    join_id: Option<String>,
}

/// Demonstration-only: enriches a caller-supplied Feature/FeatureCollection
/// JSON body against the join source named by `?join_id=`.
#[post("/collections/{collectionId}/joins/enrich")]
async fn enrich_feature(
    path: web::Path<String>,
    query: web::Query<EnrichQuery>,
    body: web::Json<Value>,
    manager: web::Data<Manager>,
) -> AppResult<HttpResponse> {
    let collection_id = path.into_inner();
    let join_id = query
        .into_inner()
        .join_id
        .ok_or_else(|| AppError::InvalidInput("missing join_id query parameter".to_string()))?;

    let manager = manager.into_inner();
    let mut feature_value = body.into_inner();
    web::block(move || {
        manager
            .perform_join(&collection_id, &join_id, &mut feature_value)
            .map(|_| feature_value)
    })
    .await
    .map_err(|e| AppError::Io(e.to_string()))?
    .map(|enriched| HttpResponse::Ok().json(enriched))
    .map_err(AppError::from)
}
