use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc, Duration};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use bcrypt::{hash, verify, DEFAULT_COST};
use uuid::Uuid;
use warp::{Filter, Rejection, reject};
use base64::prelude::*;

const JWT_SECRET: &[u8] = b"change-this-secret-before-deploying";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub api_keys: Vec<ApiKey>,
    pub quota: ResourceQuota,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub key_hash: String,
    pub user_id: String,
    pub permissions: Vec<Permission>,
    pub rate_limit: RateLimit,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Permission {
    CreateMachine,
    DeleteMachine,
    ReadMachine,
    WriteMachine,
    RunMachine,
    ManageSnapshots,
    ViewMetrics,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub max_concurrent_machines: u32,
    pub max_cycles_per_second: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub max_machines: u32,
    pub max_cycles_per_run: u32,
    pub max_snapshots: u32,
    pub max_api_calls_per_hour: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub permissions: Vec<Permission>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub permissions: Vec<Permission>,
    pub expires_in_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub quota: ResourceQuota,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: String,
    pub key: String, // Only returned on creation
    pub permissions: Vec<Permission>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub type UserStore = Arc<Mutex<HashMap<String, User>>>;

impl Default for ResourceQuota {
    fn default() -> Self {
        Self {
            max_machines: 5,
            max_cycles_per_run: 1_000_000,
            max_snapshots: 20,
            max_api_calls_per_hour: 1000,
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_concurrent_machines: 3,
            max_cycles_per_second: 1_000_000,
        }
    }
}

impl User {
    pub fn new(username: String, email: String, password: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let password_hash = hash(password, DEFAULT_COST)?;

        Ok(User {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            api_keys: Vec::new(),
            quota: ResourceQuota::default(),
            created_at: Utc::now(),
            is_active: true,
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        verify(password, &self.password_hash).unwrap_or(false)
    }

    pub fn create_api_key(&mut self, name: String, permissions: Vec<Permission>, expires_in_days: Option<u32>) -> ApiKeyResponse {
        let key_id = Uuid::new_v4().to_string();
        let raw_key = generate_api_key();
        let key_hash = hash_api_key(&raw_key);

        let expires_at = expires_in_days.map(|days| {
            Utc::now() + Duration::days(days as i64)
        });

        let api_key = ApiKey {
            id: key_id.clone(),
            name: name.clone(),
            key_hash,
            user_id: self.id.clone(),
            permissions: permissions.clone(),
            rate_limit: RateLimit::default(),
            created_at: Utc::now(),
            last_used: None,
            expires_at,
            is_active: true,
        };

        self.api_keys.push(api_key);

        ApiKeyResponse {
            id: key_id,
            name,
            key: raw_key,
            permissions,
            expires_at,
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.api_keys.iter().any(|key| {
            key.is_active &&
            key.expires_at.map_or(true, |exp| exp > Utc::now()) &&
            (key.permissions.contains(permission) || key.permissions.contains(&Permission::Admin))
        })
    }
}

pub fn generate_api_key() -> String {
    use rand::RngCore;
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    format!("cycle65_{}", BASE64_STANDARD.encode(secret))
}

pub fn hash_api_key(key: &str) -> String {
    use sha2::{Sha256, Digest};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn create_jwt_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::hours(24);

    let claims = Claims {
        sub: user.id.clone(),
        username: user.username.clone(),
        permissions: user.api_keys.iter()
            .filter(|key| key.is_active)
            .flat_map(|key| key.permissions.iter())
            .cloned()
            .collect(),
        exp: expiration.timestamp(),
        iat: Utc::now().timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET))
}

pub fn verify_jwt_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET),
        &Validation::new(Algorithm::HS256),
    ).map(|data| data.claims)
}

pub fn authenticate_api_key(users: UserStore, key: &str) -> Result<User, AuthError> {
    let key_hash = hash_api_key(key);
    let users_lock = users.lock().unwrap();

    users_lock
        .values()
        .filter(|user| user.is_active)
        .find(|user| {
            user.api_keys.iter().any(|api_key| {
                api_key.key_hash == key_hash
                    && api_key.is_active
                    && api_key.expires_at.map_or(true, |exp| exp > Utc::now())
            })
        })
        .cloned()
        .ok_or(AuthError::InvalidApiKey)
}

#[derive(Debug)]
pub enum AuthError {
    InvalidCredentials,
    InvalidApiKey,
    InsufficientPermissions,
    QuotaExceeded,
    UserNotFound,
    UserInactive,
}

impl reject::Reject for AuthError {}

// Resolve an Authorization header value to a user. Accepts "Bearer <jwt>"
// and "ApiKey <key>" schemes.
fn resolve_credentials(users: UserStore, auth_header: &str) -> Option<User> {
    if let Some(token) = auth_header.strip_prefix("Bearer ") {
        let claims = verify_jwt_token(token).ok()?;
        let users_lock = users.lock().unwrap();
        return users_lock
            .get(&claims.sub)
            .filter(|user| user.is_active)
            .cloned();
    }

    if let Some(api_key) = auth_header.strip_prefix("ApiKey ") {
        return authenticate_api_key(users, api_key).ok();
    }

    None
}

pub fn with_auth(users: UserStore) -> impl Filter<Extract = (User,), Error = Rejection> + Clone {
    warp::header::<String>("authorization")
        .and_then(move |auth_header: String| {
            let users = users.clone();
            async move {
                match resolve_credentials(users, &auth_header) {
                    Some(user) => Ok(user),
                    None => Err(reject::custom(AuthError::InvalidCredentials)),
                }
            }
        })
}

// Middleware to check permissions after authentication
pub fn with_permission(
    users: UserStore,
    permission: Permission,
) -> impl Filter<Extract = (User,), Error = Rejection> + Clone {
    with_auth(users)
        .and_then(move |user: User| {
            let perm = permission.clone();
            async move {
                if user.has_permission(&perm) {
                    Ok(user)
                } else {
                    Err(reject::custom(AuthError::InsufficientPermissions))
                }
            }
        })
}

fn seed_user(
    users: &UserStore,
    username: &str,
    password: &str,
    key_name: &str,
    permissions: Vec<Permission>,
    expires_in_days: Option<u32>,
) {
    let email = format!("{}@localhost", username);
    match User::new(username.to_string(), email, password) {
        Ok(mut user) => {
            let api_key = user.create_api_key(key_name.to_string(), permissions, expires_in_days);
            println!(
                "Seeded user '{}'; authorize with: ApiKey {}",
                username, api_key.key
            );
            users.lock().unwrap().insert(user.id.clone(), user);
        }
        Err(error) => println!("Failed to seed user '{}': {}", username, error),
    }
}

pub fn init_default_users(users: UserStore) {
    seed_user(
        &users,
        "admin",
        "admin123",
        "Default Admin Key",
        vec![Permission::Admin],
        None,
    );

    seed_user(
        &users,
        "demo",
        "demo123",
        "Demo Key",
        vec![
            Permission::CreateMachine,
            Permission::ReadMachine,
            Permission::WriteMachine,
            Permission::RunMachine,
            Permission::ViewMetrics,
        ],
        Some(30),
    );
}
