//! OpenAPI document for the `/api/v1` surface, served at `/api-docs/openapi.json` and
//! rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Garage API",
        description = "Manage users and the cars they own. Every response is wrapped in a `{meta, data, pagination}` envelope; \
        errors carry `meta.error` with a stable code and a message localized by the `x-app-lang` header (`en` or `id`)."
    ),
    servers(
        (url = "/api/v1", description = "Garage API server")
    ),
    paths(
        api::handlers::users::create_user,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::users::list_user_cars,
        api::handlers::cars::create_car,
        api::handlers::cars::create_cars_bulk,
        api::handlers::cars::list_cars,
        api::handlers::cars::get_car,
        api::handlers::cars::update_car,
        api::handlers::cars::delete_car,
        api::handlers::cars::transfer_car,
        api::handlers::cars::update_cars_availability,
    ),
    components(
        schemas(
            api::models::users::UserCreate,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::cars::CarCreate,
            api::models::cars::CarBulkItem,
            api::models::cars::CarBulkCreate,
            api::models::cars::CarUpdate,
            api::models::cars::CarTransfer,
            api::models::cars::CarAvailabilityUpdate,
            api::models::cars::CarAvailabilityResponse,
            api::models::cars::CarResponse,
            api::models::pagination::Pagination,
            api::models::envelope::Meta,
            api::models::envelope::ErrorBody,
            api::models::envelope::ErrorEnvelope,
            api::models::envelope::MessageResponse,
            crate::errors::ErrorCode,
        )
    ),
    tags(
        (name = "users", description = "Create, list, update and delete users, and list the cars a user owns."),
        (name = "cars", description = "Create cars singly or in bulk, transfer ownership and toggle availability."),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();

        for path in [
            "/users",
            "/users/{id}",
            "/users/{id}/cars",
            "/cars",
            "/cars/bulk",
            "/cars/availability",
            "/cars/{id}",
            "/cars/{id}/transfer",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }

        assert!(paths["/users/{id}"].get("delete").is_some());
        assert!(paths["/cars/availability"].get("patch").is_some());
        assert!(doc["components"]["schemas"].get("ErrorEnvelope").is_some());

        let params = paths["/cars"]["get"]["parameters"].as_array().unwrap();
        let owner = params.iter().find(|p| p["name"] == "user_id").unwrap();
        assert_eq!(owner["schema"]["format"], "uuid");
    }
}
