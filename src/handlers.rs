use actix_web::{http::header, web, HttpRequest, HttpResponse};
use std::sync::Arc;
use tracing::{debug, error, info};
use validator::Validate;

use crate::{
    catalog::{self, Listing},
    config::AppConfig,
    errors::ApiError,
    ids::IdGenerator,
    models::{
        AddedResponse, NewComment, NewProduct, ProductsQuery, RemoveCommentRequest,
        RemoveProductRequest, RemovedResponse,
    },
    store::{encode, Collection, Filter, RecordStore, StoreError, INTERNAL_ID},
};

/// Attempts at drawing a product id that is not taken yet.
const MAX_ID_ATTEMPTS: usize = 16;

type Store = web::Data<Arc<dyn RecordStore>>;
type Ids = web::Data<Arc<dyn IdGenerator>>;

/// Store failures on mutation routes are reported as bad requests.
fn rejected(action: &str, e: StoreError) -> ApiError {
    error!("Failed to {}: {}", action, e);
    ApiError::Validation(format!("failed to {}", action))
}

/// Runs store work on the blocking thread pool, off the worker thread.
/// `on_cancel` is returned if the work never completes.
async fn blocking<T, F>(on_cancel: ApiError, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    web::block(work).await.map_err(|e| {
        error!("Store call did not complete: {}", e);
        on_cancel
    })?
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        debug!("Rejected request body: {}", err);
        ApiError::Validation(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        debug!("Rejected query string: {}", err);
        ApiError::Validation(err.to_string()).into()
    }))
    .route("/ping", web::get().to(ping))
    .route("/", web::get().to(home))
    .route("/product/{request}/{product_id}", web::get().to(get_product))
    .route("/products", web::get().to(list_products))
    .route("/comments", web::post().to(create_comment))
    .route("/removecomment", web::post().to(delete_comment))
    .route("/product", web::post().to(create_product))
    .route("/removeproduct", web::post().to(delete_product));
}

pub async fn ping(req: HttpRequest) -> HttpResponse {
    info!("Ping from host {}", req.connection_info().host());
    HttpResponse::Ok().finish()
}

pub async fn home(config: web::Data<AppConfig>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, config.redirect_url.as_str()))
        .finish()
}

pub async fn get_product(
    store: Store,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (request, product_id) = path.into_inner();
    let store = Arc::clone(store.get_ref());

    debug!("Fetching {} for product {}", request, product_id);

    match request.as_str() {
        "comments" => {
            let comments = blocking(ApiError::NotFound, move || {
                catalog::get_comments(store.as_ref(), &product_id).map_err(|e| {
                    error!("Failed to fetch comments for {}: {}", product_id, e);
                    ApiError::NotFound
                })
            })
            .await?;
            Ok(HttpResponse::Ok().json(comments))
        }
        "info" => {
            let info = blocking(ApiError::NotFound, move || {
                catalog::get_product_info(store.as_ref(), &product_id).map_err(|e| {
                    match &e {
                        catalog::LookupError::ProductNotFound(_) => debug!("{}", e),
                        _ => error!("Failed to fetch product {}: {}", product_id, e),
                    }
                    ApiError::NotFound
                })
            })
            .await?;
            Ok(HttpResponse::Ok().json(info))
        }
        other => {
            debug!("Unknown product request: {}", other);
            Err(ApiError::NotFound)
        }
    }
}

pub async fn list_products(
    store: Store,
    query: web::Query<ProductsQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let cat = query
        .cat
        .as_deref()
        .filter(|cat| !cat.is_empty())
        .ok_or_else(|| ApiError::Validation("cat is required".to_string()))?;
    let listing = Listing::parse(cat, query.min.as_deref(), query.max.as_deref());

    debug!("Listing products: {:?}", listing);

    let store = Arc::clone(store.get_ref());
    let products = blocking(ApiError::Internal("listing cancelled".to_string()), move || {
        catalog::get_products(store.as_ref(), &listing).map_err(|e| {
            error!("Failed to list products: {}", e);
            ApiError::Internal(e.to_string())
        })
    })
    .await?;

    info!("Retrieved {} products", products.len());
    Ok(HttpResponse::Ok().json(products))
}

pub async fn create_comment(
    store: Store,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    debug!("Creating comment for product {}", payload.product_id);

    let store = Arc::clone(store.get_ref());
    let id = blocking(ApiError::Validation("save cancelled".to_string()), move || {
        let store = store.as_ref();
        if catalog::find_product(store, &payload.product_id)
            .map_err(|e| rejected("look up product", e))?
            .is_none()
        {
            debug!("Comment refers to unknown product {}", payload.product_id);
            return Err(ApiError::Validation("unknown product".to_string()));
        }

        let doc = encode(Collection::Comments, &payload.into_comment())
            .map_err(|e| rejected("encode comment", e))?;
        let saved = store
            .save(Collection::Comments, doc)
            .map_err(|e| rejected("save comment", e))?;

        Ok(saved
            .get(INTERNAL_ID)
            .and_then(|id| id.as_str())
            .map(str::to_string))
    })
    .await?;

    info!("Comment created: {:?}", id);
    Ok(HttpResponse::Ok().json(AddedResponse { added: id.into() }))
}

pub async fn delete_comment(
    store: Store,
    payload: web::Json<RemoveCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    debug!("Removing comment {}", payload.internal_id);

    let store = Arc::clone(store.get_ref());
    let filter = Filter::eq(INTERNAL_ID, payload.internal_id.as_str());
    let removed = blocking(ApiError::Validation("remove cancelled".to_string()), move || {
        remove_and_confirm(store.as_ref(), Collection::Comments, &filter)
            .map_err(|e| rejected("remove comment", e))
    })
    .await?;

    info!("Comment {} removed: {}", payload.internal_id, removed);
    Ok(HttpResponse::Ok().json(RemovedResponse { removed }))
}

pub async fn create_product(
    store: Store,
    ids: Ids,
    payload: web::Json<NewProduct>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();

    debug!("Creating product {:?} in category {}", payload.name, payload.category);

    let store = Arc::clone(store.get_ref());
    let ids = Arc::clone(ids.get_ref());
    let id = blocking(ApiError::Validation("save cancelled".to_string()), move || {
        let store = store.as_ref();
        if catalog::find_category(store, payload.category)
            .map_err(|e| rejected("look up category", e))?
            .is_none()
        {
            debug!("Product refers to unknown category {}", payload.category);
            return Err(ApiError::Validation("unknown category".to_string()));
        }

        let id = unused_product_id(store, ids.as_ref())?;
        let doc = encode(Collection::Products, &payload.into_product(id))
            .map_err(|e| rejected("encode product", e))?;
        let saved = store
            .save(Collection::Products, doc)
            .map_err(|e| rejected("save product", e))?;

        Ok(saved
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string))
    })
    .await?;

    info!("Product created: {:?}", id);
    Ok(HttpResponse::Ok().json(AddedResponse { added: id.into() }))
}

pub async fn delete_product(
    store: Store,
    payload: web::Json<RemoveProductRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    payload
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    debug!("Removing product {}", payload.id);

    // Comments on the product are left in place.
    let store = Arc::clone(store.get_ref());
    let filter = Filter::eq("id", payload.id.as_str());
    let removed = blocking(ApiError::Validation("remove cancelled".to_string()), move || {
        remove_and_confirm(store.as_ref(), Collection::Products, &filter)
            .map_err(|e| rejected("remove product", e))
    })
    .await?;

    info!("Product {} removed: {}", payload.id, removed);
    Ok(HttpResponse::Ok().json(RemovedResponse { removed }))
}

/// Removes the first match, then reports whether it is really gone.
fn remove_and_confirm(
    store: &dyn RecordStore,
    collection: Collection,
    filter: &Filter,
) -> Result<bool, StoreError> {
    store.remove(collection, filter, false)?;
    Ok(store.find_one(collection, filter)?.is_none())
}

fn unused_product_id(store: &dyn RecordStore, ids: &dyn IdGenerator) -> Result<String, ApiError> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = ids.generate();
        let taken = catalog::find_product(store, &candidate)
            .map_err(|e| rejected("check product id", e))?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
        debug!("Product id {} already taken", candidate);
    }
    error!("No free product id after {} attempts", MAX_ID_ATTEMPTS);
    Err(ApiError::Validation("no free product id".to_string()))
}
