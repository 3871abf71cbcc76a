//! JSON read surface over the snapshot stores and the punctuality ledger.

use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, web};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::model::ObjectType;
use crate::punctuality::PunctualityLedger;
use crate::reader::SnapshotReader;
use crate::store::{ScanFilter, SnapshotStore};

#[derive(Clone)]
pub struct ApiState {
    pub transient: Arc<dyn SnapshotStore>,
    pub permanent: Arc<dyn SnapshotStore>,
    pub ledger: Arc<dyn PunctualityLedger>,
}

#[derive(Debug, Deserialize)]
struct TypeQuery {
    #[serde(rename = "objectType")]
    object_type: Option<String>,
}

impl TypeQuery {
    fn types(&self) -> ApiResult<Vec<ObjectType>> {
        match &self.object_type {
            None => Ok(Vec::new()),
            Some(raw) => ObjectType::parse_list(raw).map_err(|e| ApiError::BadObjectType(e.0)),
        }
    }
}

#[get("/ok")]
async fn ok() -> ApiResult<impl Responder> {
    Ok(HttpResponse::Ok().finish())
}

#[get("/transient")]
async fn transient(
    query: web::Query<TypeQuery>,
    state: web::Data<ApiState>,
) -> ApiResult<impl Responder> {
    let filter = ScanFilter::types(&query.types()?);
    let records = state.transient.scan_all(&filter).await?;
    Ok(web::Json(records))
}

#[get("/transient/latest")]
async fn transient_latest(
    query: web::Query<TypeQuery>,
    state: web::Data<ApiState>,
) -> ApiResult<impl Responder> {
    let reader = SnapshotReader::new(state.transient.clone());
    let snapshot = reader.latest(&query.types()?).await?;
    Ok(web::Json(snapshot.records))
}

#[get("/permanent")]
async fn permanent(
    query: web::Query<TypeQuery>,
    state: web::Data<ApiState>,
) -> ApiResult<impl Responder> {
    let types = query.types()?;
    let records = match types.as_slice() {
        [single] => state.permanent.query_by_type(*single).await?,
        _ => state.permanent.scan_all(&ScanFilter::types(&types)).await?,
    };
    Ok(web::Json(records))
}

#[get("/coordinates")]
async fn coordinates(
    query: web::Query<TypeQuery>,
    state: web::Data<ApiState>,
) -> ApiResult<impl Responder> {
    let filter = ScanFilter::types(&query.types()?);
    let records = state.transient.scan_all(&filter).await?;
    let coordinates: Vec<[&str; 2]> = records.iter().filter_map(|r| r.coordinates()).collect();
    Ok(HttpResponse::Ok().json(json!({ "coordinates": coordinates })))
}

#[get("/punctuality/objects")]
async fn punctuality_objects(
    query: web::Query<TypeQuery>,
    state: web::Data<ApiState>,
) -> ApiResult<impl Responder> {
    let types = query.types()?;
    let mut states = state.ledger.states().await?;
    if !types.is_empty() {
        let prefixes: Vec<String> = types.iter().map(|t| format!("{t}-")).collect();
        states.retain(|s| prefixes.iter().any(|p| s.object_id.starts_with(p)));
    }
    Ok(web::Json(states))
}

#[get("/punctuality/cycles")]
async fn punctuality_cycles(state: web::Data<ApiState>) -> ApiResult<impl Responder> {
    Ok(web::Json(state.ledger.cycle_averages().await?))
}

/// Registers every read route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ok)
        .service(transient_latest)
        .service(transient)
        .service(permanent)
        .service(coordinates)
        .service(punctuality_objects)
        .service(punctuality_cycles);
}
