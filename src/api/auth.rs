use {
    crate::{
        api::{
            ApiResponse,
            Auth,
            RestError,
            ServerState,
        },
        kernel::entities::UserId,
        user::service::{
            IssuedTokens,
            LoginInput,
            LogoutInput,
            RefreshInput,
            RegisterInput,
        },
    },
    axum::{
        extract::State,
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

#[derive(Deserialize, Clone, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email:    String,
    pub password: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct UserResponse {
    pub id:       UserId,
    pub username: String,
    pub email:    String,
}

pub async fn register(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, RestError> {
    let user = state
        .user_service
        .register(RegisterInput {
            username: request.username,
            email:    request.email,
            password: request.password,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(
            UserResponse {
                id:       user.id,
                username: user.username,
                email:    user.email.value.to_string(),
            },
            "Registration successful",
        ),
    ))
}

#[derive(Deserialize, Clone, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct TokensResponse {
    pub access_token:  String,
    pub refresh_token: String,
    pub token_type:    String,
    pub expires_in:    i64,
}

impl From<IssuedTokens> for TokensResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token:  tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type:    "Bearer".to_string(),
            expires_in:    tokens.expires_in,
        }
    }
}

pub async fn login(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<TokensResponse>>, RestError> {
    let tokens = state
        .user_service
        .login(LoginInput {
            username: request.username,
            password: request.password,
        })
        .await?;
    Ok(ApiResponse::ok(tokens.into()))
}

#[derive(Deserialize, Clone, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokensResponse>>, RestError> {
    let tokens = state
        .user_service
        .refresh(RefreshInput {
            refresh_token: request.refresh_token,
        })
        .await?;
    Ok(ApiResponse::ok(tokens.into()))
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

pub async fn logout(
    Auth(claims): Auth,
    State(state): State<Arc<ServerState>>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<ApiResponse<()>>, RestError> {
    state
        .user_service
        .logout(LogoutInput {
            refresh_token: request.refresh_token,
            caller_id:     claims.sub,
        })
        .await?;
    Ok(ApiResponse::message_only("Logged out"))
}
