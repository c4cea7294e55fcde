use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use parlor_api::auth::{self, AppState, AppStateInner};
use parlor_api::chats;
use parlor_api::messages;
use parlor_api::middleware::require_auth;
use parlor_blob::DiskStore;
use parlor_core::{AttachmentLinker, ChatRegistry, EventSink, MessageStore, ReadTracker};
use parlor_gateway::connection;
use parlor_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLOR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLOR_DB_PATH").unwrap_or_else(|_| "parlor.db".into());
    let media_dir = std::env::var("PARLOR_MEDIA_DIR").unwrap_or_else(|_| "./media".into());
    let host = std::env::var("PARLOR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLOR_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database and blob storage
    let db = Arc::new(parlor_db::Database::open(&PathBuf::from(&db_path))?);
    let blobs = Arc::new(DiskStore::new(PathBuf::from(&media_dir))?);

    // Event fan-out: the gateway dispatcher is the one live EventSink
    let dispatcher = Dispatcher::new();
    let events: Arc<dyn EventSink> = Arc::new(dispatcher.clone());

    // Core services
    let linker = AttachmentLinker::new(blobs);
    let registry = ChatRegistry::new(db.clone(), events.clone());
    let message_store = MessageStore::new(db.clone(), linker, events.clone());
    let reads = ReadTracker::new(db.clone(), events.clone());

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        registry,
        messages: message_store,
        reads,
        events,
        jwt_secret: jwt_secret.clone(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/chats", get(chats::list_chats))
        .route("/chats", post(chats::create_chat))
        .route("/chats/{chat_id}", delete(chats::delete_chat))
        .route("/chats/{chat_id}/messages", get(messages::get_messages))
        .route("/chats/{chat_id}/messages", post(messages::send_message))
        .route(
            "/chats/{chat_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(
        GatewayState {
            dispatcher,
            jwt_secret,
        },
    );

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/media", ServeDir::new(&media_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parlor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
