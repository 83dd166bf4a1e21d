use {
    crate::{
        api::{
            ApiResponse,
            Auth,
            RestError,
            ServerState,
        },
        auction::{
            entities,
            service::categories::CreateCategoryInput,
        },
    },
    axum::{
        extract::{
            Path,
            State,
        },
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::sync::Arc,
};

#[derive(Serialize, Clone, Debug)]
pub struct CategoryResponse {
    pub id:          entities::CategoryId,
    pub name:        String,
    pub description: Option<String>,
}

impl From<&entities::Category> for CategoryResponse {
    fn from(category: &entities::Category) -> Self {
        Self {
            id:          category.id,
            name:        category.name.clone(),
            description: category.description.clone(),
        }
    }
}

pub async fn list(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ApiResponse<Vec<CategoryResponse>>>, RestError> {
    let categories = state.auction_service.list_categories().await?;
    Ok(ApiResponse::ok(
        categories.iter().map(CategoryResponse::from).collect(),
    ))
}

pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(category_id): Path<entities::CategoryId>,
) -> Result<Json<ApiResponse<CategoryResponse>>, RestError> {
    let category = state.auction_service.get_category(category_id).await?;
    Ok(ApiResponse::ok(CategoryResponse::from(&category)))
}

#[derive(Deserialize, Clone, Debug)]
pub struct CreateCategoryRequest {
    pub name:        String,
    pub description: Option<String>,
}

pub async fn create(
    Auth(_claims): Auth,
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, RestError> {
    let category = state
        .auction_service
        .create_category(CreateCategoryInput {
            name:        request.name,
            description: request.description,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(CategoryResponse::from(&category), "Category created"),
    ))
}
