use crate::api::models::envelope::{ApiResponse, Envelope, ErrorEnvelope, MessageResponse, RequestMeta};
use crate::api::models::pagination::Pagination;
use crate::api::models::users::{ListUsersQuery, UserCreate, UserResponse, UserUpdate};
use crate::api::models::{cars::CarResponse, cars::ListCarsQuery};
use crate::db::queries::SqlIdent;
use crate::errors::Result;
use crate::types::UserId;
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
    path = "/users",
    tag = "users",
    summary = "Create user",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created successfully", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorEnvelope),
        (status = 409, description = "Email already registered", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    request: RequestMeta,
    body: std::result::Result<Json<UserCreate>, JsonRejection>,
) -> Result<Envelope<UserResponse>> {
    let Json(create) = body?;
    create.validate()?;

    let user = state.users.create(create).await?;
    Ok(Envelope::created(request, UserResponse::from(user)))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users", body = ApiResponse<Vec<UserResponse>>),
        (status = 400, description = "Invalid query parameters", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    request: RequestMeta,
    query: std::result::Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Envelope<Vec<UserResponse>>> {
    let Query(query) = query?;
    let filter = query.into_filter()?;

    let (users, total) = state.users.list(&filter).await?;
    let pagination = Pagination::compute(
        total,
        filter.page.page,
        filter.page.page_size,
        users.len() as i64,
        filter.sort_by.sql_ident(),
    );

    let data = users.into_iter().map(UserResponse::from).collect();
    Ok(Envelope::ok(request, data).paginated(pagination))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    summary = "Get user",
    params(
        ("id" = uuid::Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid user ID", body = ErrorEnvelope),
        (status = 404, description = "User not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<UserId>, PathRejection>,
) -> Result<Envelope<UserResponse>> {
    let Path(id) = path?;
    let user = state.users.get(id).await?;
    Ok(Envelope::ok(request, UserResponse::from(user)))
}

/// Serves both PUT and PATCH; either way only the fields present in the body change.
#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    summary = "Update user",
    request_body = UserUpdate,
    params(
        ("id" = uuid::Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User updated successfully", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorEnvelope),
        (status = 404, description = "User not found", body = ErrorEnvelope),
        (status = 409, description = "Email already registered", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<UserId>, PathRejection>,
    body: std::result::Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Envelope<UserResponse>> {
    let Path(id) = path?;
    let Json(update) = body?;
    update.validate()?;

    let user = state.users.update(id, update).await?;
    Ok(Envelope::ok(request, UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    summary = "Delete user",
    description = "Deletes the user and, by cascade, every car they own.",
    params(
        ("id" = uuid::Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted successfully", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Invalid user ID", body = ErrorEnvelope),
        (status = 404, description = "User not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<UserId>, PathRejection>,
) -> Result<Envelope<MessageResponse>> {
    let Path(id) = path?;
    state.users.delete(id).await?;
    Ok(Envelope::ok(request, MessageResponse::new("User deleted successfully")))
}

#[utoipa::path(
    get,
    path = "/users/{id}/cars",
    tag = "users",
    summary = "List cars owned by a user",
    params(
        ("id" = uuid::Uuid, Path, description = "User ID"),
        ListCarsQuery
    ),
    responses(
        (status = 200, description = "Page of the user's cars", body = ApiResponse<Vec<CarResponse>>),
        (status = 400, description = "Invalid request", body = ErrorEnvelope),
        (status = 404, description = "User not found", body = ErrorEnvelope),
        (status = 500, description = "Internal server error", body = ErrorEnvelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_user_cars(
    State(state): State<AppState>,
    request: RequestMeta,
    path: std::result::Result<Path<UserId>, PathRejection>,
    query: std::result::Result<Query<ListCarsQuery>, QueryRejection>,
) -> Result<Envelope<Vec<CarResponse>>> {
    let Path(user_id) = path?;
    let Query(query) = query?;
    let filter = query.into_filter()?;

    let (cars, total) = state.cars.list_for_user(user_id, filter.clone()).await?;
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
