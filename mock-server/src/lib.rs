//! In-memory stand-in for the admin backend.
//!
//! Serves the routes the client talks to: JWT obtain, the public
//! identification collection (`/api/images/`) with its `change-nation` and
//! `user-assess` actions, and the per-user merged image collection
//! (`/api/merged-images/`) with the `merge` and `travelled` actions.
//! Merged image routes require an `Authorization: JWT <token>` header.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_SECRET: &str = "mock-server-secret";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 50;

const IMAGES_PATH: &str = "/api/images/";
const MERGED_IMAGES_PATH: &str = "/api/merged-images/";

#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            jwt_secret: DEFAULT_SECRET.to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub full_name: String,
}

fn seed_users() -> Vec<User> {
    [
        (1, "admin", "admin-pass", "Site Admin"),
        (2, "alice", "wonderland", "Alice Liddell"),
    ]
    .into_iter()
    .map(|(id, username, password, full_name)| User {
        id,
        username: username.to_string(),
        password: password.to_string(),
        full_name: full_name.to_string(),
    })
    .collect()
}

/// Claims carried by issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub exp: i64,
    pub orig_iat: i64,
    pub jti: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One clothing identification run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identification {
    pub id: i64,
    pub user: Option<String>,
    pub upload_images: String,
    pub nation1: String,
    pub nation2: String,
    pub nation3: String,
    pub modified_nation: String,
    pub user_assess: String,
    pub time_consuming: String,
    pub created: String,
    pub modified: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateIdentification {
    pub upload_images: String,
    pub nation1: Option<String>,
    pub nation2: Option<String>,
    pub nation3: Option<String>,
}

#[derive(Debug, Clone)]
struct MergedImageRecord {
    id: i64,
    owner: i64,
    background_name: String,
    result_image: String,
    person_1_head_image: String,
    person_2_head_image: String,
    person_1_identification: Option<i64>,
    person_2_identification: Option<i64>,
}

/// Body of create and full update.
#[derive(Debug, Deserialize)]
pub struct MergedImageInput {
    pub background_name: String,
    #[serde(default)]
    pub person_1_head_image: String,
    #[serde(default)]
    pub person_2_head_image: String,
    #[serde(default)]
    pub person_1_identification: Option<i64>,
    #[serde(default)]
    pub person_2_identification: Option<i64>,
}

/// Body of partial update; absent fields are left alone.
#[derive(Debug, Deserialize)]
pub struct MergedImagePatch {
    pub background_name: Option<String>,
    pub person_1_head_image: Option<String>,
    pub person_2_head_image: Option<String>,
    pub person_1_identification: Option<i64>,
    pub person_2_identification: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NationQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssessQuery {
    pub assess: Option<String>,
}

#[derive(Default)]
struct Db {
    users: Vec<User>,
    identifications: BTreeMap<i64, Identification>,
    merged_images: BTreeMap<i64, MergedImageRecord>,
    next_identification: i64,
    next_merged_image: i64,
}

impl Db {
    fn seeded() -> Self {
        let mut db = Db {
            users: seed_users(),
            next_identification: 1,
            next_merged_image: 1,
            ..Default::default()
        };
        for (upload, nations) in [
            ("/media/upload/1.jpg", ["Miao", "Dai", "Yi"]),
            ("/media/upload/2.jpg", ["Dai", "Bai", "Han"]),
        ] {
            db.insert_identification(
                None,
                CreateIdentification {
                    upload_images: upload.to_string(),
                    nation1: Some(nations[0].to_string()),
                    nation2: Some(nations[1].to_string()),
                    nation3: Some(nations[2].to_string()),
                },
            );
        }
        db
    }

    fn insert_identification(
        &mut self,
        user: Option<String>,
        input: CreateIdentification,
    ) -> Identification {
        let now = Utc::now().to_rfc3339();
        let id = self.next_identification;
        self.next_identification += 1;
        let ident = Identification {
            id,
            user,
            upload_images: input.upload_images,
            nation1: input.nation1.unwrap_or_else(|| "Han".to_string()),
            nation2: input.nation2.unwrap_or_else(|| "Miao".to_string()),
            nation3: input.nation3.unwrap_or_else(|| "Dai".to_string()),
            modified_nation: String::new(),
            user_assess: String::new(),
            time_consuming: "0.42s".to_string(),
            created: now.clone(),
            modified: now,
        };
        self.identifications.insert(id, ident.clone());
        ident
    }

    fn username(&self, user_id: i64) -> Option<String> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
    }

    fn render(&self, record: &MergedImageRecord) -> Value {
        let detail = |id: Option<i64>| id.and_then(|id| self.identifications.get(&id));
        json!({
            "id": record.id,
            "user": self.username(record.owner),
            "detail_url": format!("{MERGED_IMAGES_PATH}{}/", record.id),
            "background_name": record.background_name,
            "result_image": record.result_image,
            "person_1_head_image": record.person_1_head_image,
            "person_2_head_image": record.person_2_head_image,
            "person_1_identification": record.person_1_identification,
            "person_2_identification": record.person_2_identification,
            "person_1_identification_detail": detail(record.person_1_identification),
            "person_2_identification_detail": detail(record.person_2_identification),
        })
    }

    fn owned(&self, user: &User, id: i64) -> Result<&MergedImageRecord, Failure> {
        self.merged_images
            .get(&id)
            .filter(|r| r.owner == user.id)
            .ok_or_else(not_found)
    }

    fn owned_mut(&mut self, user: &User, id: i64) -> Result<&mut MergedImageRecord, Failure> {
        self.merged_images
            .get_mut(&id)
            .filter(|r| r.owner == user.id)
            .ok_or_else(not_found)
    }
}

struct AppState {
    settings: Settings,
    db: RwLock<Db>,
}

type Shared = Arc<AppState>;
type Failure = (StatusCode, Json<Value>);
type Reply<T = Json<Value>> = Result<T, Failure>;

fn not_found() -> Failure {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."})))
}

fn bad_request(message: &str) -> Failure {
    (StatusCode::BAD_REQUEST, Json(json!({"detail": message})))
}

fn unauthorized(message: &str) -> Failure {
    (StatusCode::UNAUTHORIZED, Json(json!({"detail": message})))
}

pub fn app() -> Router {
    app_with(Settings::default())
}

pub fn app_with(settings: Settings) -> Router {
    let state = Arc::new(AppState {
        settings,
        db: RwLock::new(Db::seeded()),
    });
    Router::new()
        .route("/api/token/obtain/", post(obtain_token))
        .route(IMAGES_PATH, get(list_identifications).post(create_identification))
        .route(
            "/api/images/{id}/",
            get(get_identification).delete(delete_identification),
        )
        .route("/api/images/{id}/change-nation/", get(change_nation))
        .route("/api/images/{id}/user-assess/", get(user_assess))
        .route(
            MERGED_IMAGES_PATH,
            get(list_merged_images).post(create_merged_image),
        )
        .route("/api/merged-images/travelled/", get(travelled))
        .route(
            "/api/merged-images/{id}/",
            get(get_merged_image)
                .put(replace_merged_image)
                .patch(update_merged_image)
                .delete(delete_merged_image),
        )
        .route("/api/merged-images/{id}/merge/", get(merge))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Issue a signed token for `user`.
pub fn issue_token(settings: &Settings, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id: user.id,
        username: user.username.clone(),
        exp: now + settings.token_ttl_secs,
        orig_iat: now,
        jti: Uuid::new_v4().simple().to_string(),
        token_type: "access".to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, Failure> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("JWT "))
        .ok_or_else(|| unauthorized("Authentication credentials were not provided."))?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.settings.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        warn!(error = %e, "rejected token");
        unauthorized("Signature has expired or is invalid.")
    })?
    .claims;

    let db = state.db.read().await;
    db.users
        .iter()
        .find(|u| u.id == claims.user_id)
        .cloned()
        .ok_or_else(|| unauthorized("User not found."))
}

fn paginate(path: &str, items: Vec<Value>, pagination: &Pagination) -> Value {
    let limit = pagination.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = pagination.offset.unwrap_or(0);
    let count = items.len();

    let next = (offset + limit < count).then(|| format!("{path}?limit={limit}&offset={}", offset + limit));
    let previous = (offset > 0).then(|| {
        let back = offset.saturating_sub(limit);
        if back == 0 {
            format!("{path}?limit={limit}")
        } else {
            format!("{path}?limit={limit}&offset={back}")
        }
    });
    let results: Vec<Value> = items.into_iter().skip(offset).take(limit).collect();

    json!({
        "count": count,
        "next": next,
        "previous": previous,
        "results": results,
    })
}

// --- token ---

async fn obtain_token(State(state): State<Shared>, Json(credentials): Json<Credentials>) -> Reply {
    let db = state.db.read().await;
    let user = db
        .users
        .iter()
        .find(|u| u.username == credentials.username && u.password == credentials.password)
        .ok_or_else(|| {
            warn!(username = %credentials.username, "bad credentials");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"non_field_errors": ["Unable to log in with provided credentials."]})),
            )
        })?;

    let token = issue_token(&state.settings, user).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": e.to_string()})),
        )
    })?;
    info!(username = %user.username, "issued token");
    Ok(Json(json!({
        "id": user.id,
        "token": token,
        "username": user.username,
        "fullName": user.full_name,
    })))
}

// --- identifications ---

async fn list_identifications(
    State(state): State<Shared>,
    Query(pagination): Query<Pagination>,
) -> Json<Value> {
    let db = state.db.read().await;
    let items = db
        .identifications
        .values()
        .map(|i| json!(i))
        .collect();
    Json(paginate(IMAGES_PATH, items, &pagination))
}

async fn create_identification(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(input): Json<CreateIdentification>,
) -> (StatusCode, Json<Identification>) {
    let user = authenticate(&state, &headers).await.ok().map(|u| u.username);
    let ident = state.db.write().await.insert_identification(user, input);
    info!(id = ident.id, "identification created");
    (StatusCode::CREATED, Json(ident))
}

async fn get_identification(
    State(state): State<Shared>,
    Path(id): Path<i64>,
) -> Reply<Json<Identification>> {
    let db = state.db.read().await;
    db.identifications.get(&id).cloned().map(Json).ok_or_else(not_found)
}

async fn delete_identification(State(state): State<Shared>, Path(id): Path<i64>) -> Reply<StatusCode> {
    let mut db = state.db.write().await;
    db.identifications
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(not_found)
}

async fn change_nation(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Query(query): Query<NationQuery>,
) -> Reply<Json<Identification>> {
    let name = query
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad_request("name is required"))?;
    let mut db = state.db.write().await;
    let ident = db.identifications.get_mut(&id).ok_or_else(not_found)?;
    ident.modified_nation = name;
    ident.modified = Utc::now().to_rfc3339();
    Ok(Json(ident.clone()))
}

async fn user_assess(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Query(query): Query<AssessQuery>,
) -> Reply<Json<Identification>> {
    let assess = query
        .assess
        .filter(|a| !a.is_empty())
        .ok_or_else(|| bad_request("assess is required"))?;
    let mut db = state.db.write().await;
    let ident = db.identifications.get_mut(&id).ok_or_else(not_found)?;
    ident.user_assess = assess;
    ident.modified = Utc::now().to_rfc3339();
    Ok(Json(ident.clone()))
}

// --- merged images ---

async fn list_merged_images(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let db = state.db.read().await;
    let items = db
        .merged_images
        .values()
        .filter(|r| r.owner == user.id)
        .map(|r| db.render(r))
        .collect();
    Ok(Json(paginate(MERGED_IMAGES_PATH, items, &pagination)))
}

async fn create_merged_image(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(input): Json<MergedImageInput>,
) -> Reply<(StatusCode, Json<Value>)> {
    let user = authenticate(&state, &headers).await?;
    let mut db = state.db.write().await;
    let id = db.next_merged_image;
    db.next_merged_image += 1;
    let record = MergedImageRecord {
        id,
        owner: user.id,
        background_name: input.background_name,
        result_image: String::new(),
        person_1_head_image: input.person_1_head_image,
        person_2_head_image: input.person_2_head_image,
        person_1_identification: input.person_1_identification,
        person_2_identification: input.person_2_identification,
    };
    let body = db.render(&record);
    db.merged_images.insert(id, record);
    info!(id, user = %user.username, "merged image created");
    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_merged_image(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let db = state.db.read().await;
    let record = db.owned(&user, id)?;
    Ok(Json(db.render(record)))
}

async fn replace_merged_image(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(input): Json<MergedImageInput>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let mut db = state.db.write().await;
    let record = db.owned_mut(&user, id)?;
    record.background_name = input.background_name;
    record.person_1_head_image = input.person_1_head_image;
    record.person_2_head_image = input.person_2_head_image;
    record.person_1_identification = input.person_1_identification;
    record.person_2_identification = input.person_2_identification;
    let record = record.clone();
    Ok(Json(db.render(&record)))
}

async fn update_merged_image(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(input): Json<MergedImagePatch>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let mut db = state.db.write().await;
    let record = db.owned_mut(&user, id)?;
    if let Some(name) = input.background_name {
        record.background_name = name;
    }
    if let Some(head) = input.person_1_head_image {
        record.person_1_head_image = head;
    }
    if let Some(head) = input.person_2_head_image {
        record.person_2_head_image = head;
    }
    if let Some(ident) = input.person_1_identification {
        record.person_1_identification = Some(ident);
    }
    if let Some(ident) = input.person_2_identification {
        record.person_2_identification = Some(ident);
    }
    let record = record.clone();
    Ok(Json(db.render(&record)))
}

async fn delete_merged_image(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply<StatusCode> {
    let user = authenticate(&state, &headers).await?;
    let mut db = state.db.write().await;
    db.owned(&user, id)?;
    db.merged_images.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// Compose the result image. Both people must have an identification.
async fn merge(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let mut db = state.db.write().await;
    let record = db.owned(&user, id)?;
    let ready = [record.person_1_identification, record.person_2_identification]
        .iter()
        .all(|ident| ident.is_some_and(|i| db.identifications.contains_key(&i)));
    if !ready {
        return Err(bad_request("both people need an identification before merging"));
    }

    let record = db.owned_mut(&user, id)?;
    record.result_image = format!("/media/merged-image/{id}.png");
    let record = record.clone();
    info!(id, "merged");
    Ok(Json(db.render(&record)))
}

/// The latest composed image for each background.
async fn travelled(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let db = state.db.read().await;
    let mut latest: BTreeMap<&str, &MergedImageRecord> = BTreeMap::new();
    for record in db
        .merged_images
        .values()
        .filter(|r| r.owner == user.id && !r.result_image.is_empty())
    {
        latest.insert(&record.background_name, record);
    }
    let items = latest.values().map(|r| db.render(r)).collect();
    Ok(Json(paginate(
        "/api/merged-images/travelled/",
        items,
        &pagination,
    )))
}
