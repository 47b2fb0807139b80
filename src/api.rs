use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use diesel::MysqlConnection;
use failsafe::CircuitBreaker;
use serde::Serialize;

use crate::error::{ApiError, StoreError};
use crate::models::{Category, Ingredient, Menu, Recipe, RecipeIngredient};
use crate::params::{FromParams, Params};
use crate::payload::SubmittedForm;
use crate::query::{self, Resource};
use crate::report;
use crate::{Breaker, DbPool};

pub(crate) const ACTION_PARAM: &str = "action";

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct ApiResponse<T = ()> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub(crate) fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            id: None,
            message: None,
        }
    }
}

impl ApiResponse {
    pub(crate) fn ok() -> Self {
        Self::flag(true)
    }

    pub(crate) fn flag(success: bool) -> Self {
        Self {
            success,
            data: None,
            id: None,
            message: None,
        }
    }

    pub(crate) fn with_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Self::ok()
        }
    }

    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::flag(false)
        }
    }
}

/// What a call against one of the CRUD resources asks for.
#[derive(Debug, PartialEq)]
pub(crate) enum ResourceCommand<F> {
    List,
    Get(i32),
    Create(F),
    Update(i32, F),
    Delete(i32),
}

impl<F: FromParams> ResourceCommand<F> {
    pub(crate) fn parse(params: &Params) -> Result<Self, ApiError> {
        let command = match action(params)? {
            "list" | "getAll" => Self::List,
            "get" => Self::Get(params.required_id("id")?),
            "create" | "add" => Self::Create(F::from_params(params)?),
            "update" => Self::Update(params.required_id("id")?, F::from_params(params)?),
            "delete" => Self::Delete(params.required_id("id")?),
            other => return Err(ApiError::InvalidAction(other.to_string())),
        };
        Ok(command)
    }
}

impl<F> ResourceCommand<F> {
    pub(crate) fn is_write(&self) -> bool {
        !matches!(self, Self::List | Self::Get(_))
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum ReportCommand {
    MostUsedIngredients,
    UsageSummary,
    AddUsage(RecipeIngredient),
    UpdateUsage(RecipeIngredient),
    RemoveUsage { recipe_id: i32, ingredient_id: i32 },
}

impl ReportCommand {
    pub(crate) fn parse(params: &Params) -> Result<Self, ApiError> {
        let command = match action(params)? {
            "getMostUsedIngredients" => Self::MostUsedIngredients,
            "getUsageSummary" => Self::UsageSummary,
            "addRecipeIngredient" => Self::AddUsage(RecipeIngredient::from_params(params)?),
            "updateRecipeIngredient" => Self::UpdateUsage(RecipeIngredient::from_params(params)?),
            "removeRecipeIngredient" => {
                let (recipe_id, ingredient_id) = RecipeIngredient::key_from_params(params)?;
                Self::RemoveUsage {
                    recipe_id,
                    ingredient_id,
                }
            }
            other => return Err(ApiError::InvalidAction(other.to_string())),
        };
        Ok(command)
    }

    pub(crate) fn is_write(&self) -> bool {
        !matches!(self, Self::MostUsedIngredients | Self::UsageSummary)
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum DashboardCommand {
    Stats,
}

impl DashboardCommand {
    pub(crate) fn parse(params: &Params) -> Result<Self, ApiError> {
        match action(params)? {
            "getStats" => Ok(Self::Stats),
            other => Err(ApiError::InvalidAction(other.to_string())),
        }
    }
}

fn action(params: &Params) -> Result<&str, ApiError> {
    params
        .action()
        .ok_or_else(|| ApiError::InvalidAction("no action given".to_string()))
}

/// GET requests may only read.
fn write_over_get(params: &Params) -> ApiError {
    ApiError::WriteOverGet(params.action().unwrap_or_default().to_string())
}

/// Runs `op` on a pooled connection off the async executor, through the
/// circuit breaker. The connection goes back to the pool when `op` returns.
async fn run<T, F>(
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    op: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&MysqlConnection) -> Result<T, StoreError> + Send + 'static,
{
    let result = web::block(move || {
        breaker.call_with(StoreError::is_storage_fault, || -> Result<T, StoreError> {
            let conn = pool.get()?;
            op(&*conn)
        })
    })
    .await?;

    match result {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(err)) => Err(err.into()),
        Err(failsafe::Error::Rejected) => Err(StoreError::Unavailable.into()),
    }
}

async fn execute_resource<R: Resource>(
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    command: ResourceCommand<R::Fields>,
) -> Result<HttpResponse, ApiError> {
    let response = match command {
        ResourceCommand::List => {
            let records = run(pool, breaker, query::list::<R>).await?;
            HttpResponse::Ok().json(ApiResponse::data(records))
        }
        ResourceCommand::Get(id) => {
            let record = run(pool, breaker, move |conn| query::get::<R>(id, conn)).await?;
            HttpResponse::Ok().json(ApiResponse::data(record))
        }
        ResourceCommand::Create(fields) => {
            let id = run(pool, breaker, move |conn| query::create::<R>(&fields, conn)).await?;
            log::info!("{} {} created", R::NAME, id);
            HttpResponse::Ok().json(ApiResponse::with_id(id))
        }
        ResourceCommand::Update(id, fields) => {
            run(pool, breaker, move |conn| query::update::<R>(id, &fields, conn)).await?;
            HttpResponse::Ok().json(ApiResponse::with_id(id))
        }
        ResourceCommand::Delete(id) => {
            let deleted = run(pool, breaker, move |conn| query::delete::<R>(id, conn)).await?;
            if deleted {
                log::info!("{} {} deleted", R::NAME, id);
            }
            HttpResponse::Ok().json(ApiResponse::flag(deleted))
        }
    };
    Ok(response)
}

async fn execute_report(
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    command: ReportCommand,
) -> Result<HttpResponse, ApiError> {
    let response = match command {
        ReportCommand::MostUsedIngredients => {
            let records = run(pool, breaker, query::find_usage_records).await?;
            HttpResponse::Ok().json(ApiResponse::data(report::aggregate(records)))
        }
        ReportCommand::UsageSummary => {
            let records = run(pool, breaker, query::find_usage_records).await?;
            let rows = report::aggregate(records);
            HttpResponse::Ok().json(ApiResponse::data(report::summarize(&rows)))
        }
        ReportCommand::AddUsage(usage) => {
            run(pool, breaker, move |conn| query::add_usage(&usage, conn)).await?;
            HttpResponse::Ok().json(ApiResponse::ok())
        }
        ReportCommand::UpdateUsage(usage) => {
            run(pool, breaker, move |conn| query::update_usage(&usage, conn)).await?;
            HttpResponse::Ok().json(ApiResponse::ok())
        }
        ReportCommand::RemoveUsage {
            recipe_id,
            ingredient_id,
        } => {
            let removed = run(pool, breaker, move |conn| {
                query::remove_usage(recipe_id, ingredient_id, conn)
            })
            .await?;
            HttpResponse::Ok().json(ApiResponse::flag(removed))
        }
    };
    Ok(response)
}

async fn execute_dashboard(
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    command: DashboardCommand,
) -> Result<HttpResponse, ApiError> {
    match command {
        DashboardCommand::Stats => {
            let stats = run(pool, breaker, query::count_entities).await?;
            Ok(HttpResponse::Ok().json(ApiResponse::data(stats)))
        }
    }
}

fn logged<T>(req: &HttpRequest, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(err) = &result {
        match err {
            ApiError::Store(e) if e.is_storage_fault() => {
                log::error!("{} {}: {}", req.method(), req.path(), err)
            }
            ApiError::Blocking(_) => log::error!("{} {}: {}", req.method(), req.path(), err),
            _ => log::warn!("{} {}: {}", req.method(), req.path(), err),
        }
    }
    result
}

async fn resource_query<R: Resource>(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, ApiError> {
    let params = Params::from(query.into_inner());
    let result = match ResourceCommand::<R::Fields>::parse(&params) {
        Ok(command) if command.is_write() => Err(write_over_get(&params)),
        Ok(command) => execute_resource::<R>(pool, breaker, command).await,
        Err(err) => Err(err),
    };
    logged(&req, result)
}

async fn resource_submit<R: Resource>(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    query: web::Query<HashMap<String, String>>,
    form: SubmittedForm,
) -> Result<HttpResponse, ApiError> {
    let params = Params::from(query.into_inner()).merge(form.into_inner());
    let result = match ResourceCommand::<R::Fields>::parse(&params) {
        Ok(command) => execute_resource::<R>(pool, breaker, command).await,
        Err(err) => Err(err),
    };
    logged(&req, result)
}

async fn report_query(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, ApiError> {
    let params = Params::from(query.into_inner());
    let result = match ReportCommand::parse(&params) {
        Ok(command) if command.is_write() => Err(write_over_get(&params)),
        Ok(command) => execute_report(pool, breaker, command).await,
        Err(err) => Err(err),
    };
    logged(&req, result)
}

async fn report_submit(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    query: web::Query<HashMap<String, String>>,
    form: SubmittedForm,
) -> Result<HttpResponse, ApiError> {
    let params = Params::from(query.into_inner()).merge(form.into_inner());
    let result = match ReportCommand::parse(&params) {
        Ok(command) => execute_report(pool, breaker, command).await,
        Err(err) => Err(err),
    };
    logged(&req, result)
}

async fn dashboard_query(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    breaker: web::Data<Breaker>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, ApiError> {
    let params = Params::from(query.into_inner());
    let result = match DashboardCommand::parse(&params) {
        Ok(command) => execute_dashboard(pool, breaker, command).await,
        Err(err) => Err(err),
    };
    logged(&req, result)
}

async fn unknown_endpoint(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let result = Err(ApiError::InvalidAction(format!(
        "no endpoint at {}",
        req.path()
    )));
    logged(&req, result)
}

fn crud<R: Resource>(path: &str) -> actix_web::Resource {
    web::resource(path)
        .route(web::get().to(resource_query::<R>))
        .route(web::post().to(resource_submit::<R>))
}

/// Registers every endpoint plus the extractor error handlers that turn
/// malformed input into the JSON envelope. Reads go over GET; writes need
/// POST, with the fields urlencoded or as multipart form data.
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _| {
        ApiError::MalformedPayload(err.to_string()).into()
    }))
    .app_data(web::FormConfig::default().error_handler(|err, _| {
        ApiError::MalformedPayload(err.to_string()).into()
    }))
    .service(crud::<Category>("/api/categories"))
    .service(crud::<Ingredient>("/api/ingredients"))
    .service(crud::<Recipe>("/api/recipes"))
    .service(crud::<Menu>("/api/menus"))
    .service(
        web::resource("/api/reports")
            .route(web::get().to(report_query))
            .route(web::post().to(report_submit)),
    )
    .service(web::resource("/api/dashboard").route(web::get().to(dashboard_query)))
    .default_service(web::to(unknown_endpoint));
}
