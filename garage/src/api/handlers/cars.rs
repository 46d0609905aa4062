use crate::api::models::cars::{
    CarAvailabilityResponse, CarAvailabilityUpdate, CarBulkCreate, CarCreate, CarResponse, CarTransfer, CarUpdate, ListCarsQuery,
};
use crate::api::models::envelope::{ApiResponse, Envelope, ErrorEnvelope, MessageResponse, RequestMeta};
use crate::api::models::pagination::Pagination;
use crate::db::queries::SqlIdent;
use crate::errors::Result;
use crate::types::CarId;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};

#[utoipa::path(
    post,
    path = "/cars",
    tag = "cars",
    summary = "Create car",
    request_body = CarCreate,
    responses(
        (status = 201, description = "Car created successfully", body = ApiResponse<CarResponse>),
        (status = 400, description = "Invalid request or unknown owner", body = ErrorEnvelope),
        (status = 409, description = "License plate already registered", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_car(
    State(state): State<AppState>,
    request: RequestMeta,
    body: std::result::Result<Json<CarCreate>, JsonRejection>,
) -> Result<Envelope<CarResponse>> {
    let Json(create) = body?;
    create.validate()?;

    let car = state.cars.create(create).await?;
    Ok(Envelope::created(request, CarResponse::from(car)))
}

#[utoipa::path(
    post,
    path = "/cars/bulk",
    tag = "cars",
    summary = "Create cars in bulk",
    description = "Creates up to 50 cars for one owner in a single transaction. Either every car is created or none is.",
    request_body = CarBulkCreate,
    responses(
        (status = 201, description = "Cars created successfully", body = ApiResponse<Vec<CarResponse>>),
        (status = 400, description = "Invalid request or unknown owner", body = ErrorEnvelope),
        (status = 409, description = "License plate already registered", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_cars_bulk(
    State(state): State<AppState>,
    request: RequestMeta,
    body: std::result::Result<Json<CarBulkCreate>, JsonRejection>,
) -> Result<Envelope<Vec<CarResponse>>> {
    let Json(bulk) = body?;
    bulk.validate()?;

    let cars = state.cars.create_bulk(bulk).await?;
    Ok(Envelope::created(request, cars.into_iter().map(CarResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/cars",
    tag = "cars",
    summary = "List cars",
    params(ListCarsQuery),
    responses(
        (status = 200, description = "Page of cars", body = ApiResponse<Vec<CarResponse>>),
        (status = 400, description = "Invalid query parameters", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_cars(
    State(state): State<AppState>,
    request: RequestMeta,
    query: std::result::Result<Query<ListCarsQuery>, QueryRejection>,
) -> Result<Envelope<Vec<CarResponse>>> {
    let Query(query) = query?;
    let filter = query.into_filter()?;

    let (cars, total) = state.cars.list(&filter).await?;
    let pagination = Pagination::compute(
        total,
        filter.page.page,
        filter.page.page_size,
        cars.len() as i64,
        filter.sort_by.sql_ident(),
    );

    let data = cars.into_iter().map(CarResponse::from).collect();
    Ok(Envelope::ok(request, data).paginated(pagination))
}

#[utoipa::path(
    get,
    path = "/cars/{id}",
    tag = "cars",
    summary = "Get car",
    params(
        ("id" = uuid::Uuid, Path, description = "Car ID")
    ),
    responses(
        (status = 200, description = "Car details", body = ApiResponse<CarResponse>),
        (status = 400, description = "Invalid car ID", body = ErrorEnvelope),
        (status = 404, description = "Car not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_car(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<CarId>, PathRejection>,
) -> Result<Envelope<CarResponse>> {
    let Path(id) = path?;
    let car = state.cars.get(id).await?;
    Ok(Envelope::ok(request, CarResponse::from(car)))
}

/// Serves both PUT and PATCH.
#[utoipa::path(
    patch,
    path = "/cars/{id}",
    tag = "cars",
    summary = "Update car",
    request_body = CarUpdate,
    params(
        ("id" = uuid::Uuid, Path, description = "Car ID")
    ),
    responses(
        (status = 200, description = "Car updated successfully", body = ApiResponse<CarResponse>),
        (status = 400, description = "Invalid request", body = ErrorEnvelope),
        (status = 404, description = "Car not found", body = ErrorEnvelope),
        (status = 409, description = "License plate already registered", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_car(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<CarId>, PathRejection>,
    body: std::result::Result<Json<CarUpdate>, JsonRejection>,
) -> Result<Envelope<CarResponse>> {
    let Path(id) = path?;
    let Json(update) = body?;
    update.validate()?;

    let car = state.cars.update(id, update).await?;
    Ok(Envelope::ok(request, CarResponse::from(car)))
}

#[utoipa::path(
    delete,
    path = "/cars/{id}",
    tag = "cars",
    summary = "Delete car",
    params(
        ("id" = uuid::Uuid, Path, description = "Car ID")
    ),
    responses(
        (status = 200, description = "Car deleted successfully", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Invalid car ID", body = ErrorEnvelope),
        (status = 404, description = "Car not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_car(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<CarId>, PathRejection>,
) -> Result<Envelope<MessageResponse>> {
    let Path(id) = path?;
    state.cars.delete(id).await?;
    Ok(Envelope::ok(request, MessageResponse::new("Car deleted successfully")))
}

#[utoipa::path(
    post,
    path = "/cars/{id}/transfer",
    tag = "cars",
    summary = "Transfer car ownership",
    request_body = CarTransfer,
    params(
        ("id" = uuid::Uuid, Path, description = "Car ID")
    ),
    responses(
        (status = 200, description = "Car transferred", body = ApiResponse<CarResponse>),
        (status = 400, description = "Invalid request or unknown new owner", body = ErrorEnvelope),
        (status = 404, description = "Car not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn transfer_car(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<CarId>, PathRejection>,
    body: std::result::Result<Json<CarTransfer>, JsonRejection>,
) -> Result<Envelope<CarResponse>> {
    let Path(id) = path?;
    let Json(transfer) = body?;

    let car = state.cars.transfer(id, transfer.new_user_id).await?;
    Ok(Envelope::ok(request, CarResponse::from(car)))
}

#[utoipa::path(
    patch,
    path = "/cars/availability",
    tag = "cars",
    summary = "Set availability of several cars",
    description = "Unknown car ids are skipped; the response lists the cars that were updated.",
    request_body = CarAvailabilityUpdate,
    responses(
        (status = 200, description = "Availability updated", body = ApiResponse<CarAvailabilityResponse>),
        (status = 400, description = "Invalid request", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_cars_availability(
    State(state): State<AppState>,
    request: RequestMeta,
    body: std::result::Result<Json<CarAvailabilityUpdate>, JsonRejection>,
) -> Result<Envelope<CarAvailabilityResponse>> {
    let Json(update) = body?;
    update.validate()?;

    let updated_ids = state.cars.set_availability(&update.car_ids, update.is_available).await?;
    Ok(Envelope::ok(
        request,
        CarAvailabilityResponse {
            updated_count: updated_ids.len(),
            updated_ids,
        },
    ))
}
