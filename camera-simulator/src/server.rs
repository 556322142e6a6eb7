//! 模拟摄像头的HTTP接口：快照、MJPEG、报警事件流，带 Basic/Digest 认证

use crate::frames::{event_part, jpeg_frame, EVENT_BOUNDARY};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use common::auth::{random_hex, verify_basic, DigestChallenge, DigestCredentials};
use common::mjpeg::{frame_part, stream_content_type};
use rand::Rng;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// 认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Basic,
    Digest,
}

impl AuthMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(AuthMode::None),
            "basic" => Some(AuthMode::Basic),
            "digest" => Some(AuthMode::Digest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorSettings {
    pub user: String,
    pub password: String,
    pub auth: AuthMode,
    pub fps: u32,
    /// 平均多少秒触发一次移动事件
    pub motion_every: u64,
}

struct SimulatorState {
    settings: SimulatorSettings,
    realm: String,
    nonce: String,
    frames: AtomicU64,
}

impl SimulatorState {
    fn next_frame(&self) -> Bytes {
        jpeg_frame(self.frames.fetch_add(1, Ordering::Relaxed))
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.settings.fps.max(1)))
    }

    fn challenge(&self) -> DigestChallenge {
        DigestChallenge {
            realm: self.realm.clone(),
            nonce: self.nonce.clone(),
            opaque: None,
            qop: Some("auth".to_string()),
            algorithm: None,
        }
    }

    fn authorized(&self, authorization: Option<&str>, method: &str) -> bool {
        let settings = &self.settings;
        match settings.auth {
            AuthMode::None => true,
            AuthMode::Basic => authorization
                .map(|value| verify_basic(value, &settings.user, &settings.password))
                .unwrap_or(false),
            AuthMode::Digest => authorization
                .and_then(DigestCredentials::parse)
                .map(|credentials| {
                    credentials.username == settings.user
                        && credentials.nonce == self.nonce
                        && credentials.verify(&settings.password, method)
                })
                .unwrap_or(false),
        }
    }

    fn unauthorized(&self) -> Response {
        let challenge = match self.settings.auth {
            AuthMode::Digest => self.challenge().render(),
            _ => format!(r#"Basic realm="{}""#, self.realm),
        };
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
        )
            .into_response()
    }
}

pub fn create_router(settings: SimulatorSettings) -> Router {
    let state = Arc::new(SimulatorState {
        settings,
        realm: "camera-simulator".to_string(),
        nonce: random_hex(),
        frames: AtomicU64::new(0),
    });

    Router::new()
        .route("/snapshot.jpg", get(snapshot))
        .route("/cgi-bin/snapshot.cgi", get(snapshot))
        .route("/mjpeg", get(mjpeg))
        .route("/cgi-bin/mjpg/video.cgi", get(mjpeg))
        .route("/events", get(events))
        .route("/cgi-bin/eventManager.cgi", get(events))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn authenticate(
    State(state): State<Arc<SimulatorState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !state.authorized(authorization, request.method().as_str()) {
        debug!("Rejected {} {}", request.method(), request.uri());
        return state.unauthorized();
    }
    next.run(request).await
}

async fn snapshot(State(state): State<Arc<SimulatorState>>) -> Response {
    ([(header::CONTENT_TYPE, "image/jpeg")], state.next_frame()).into_response()
}

async fn mjpeg(State(state): State<Arc<SimulatorState>>) -> Response {
    info!("📹 MJPEG client connected");
    let interval = state.frame_interval();
    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            yield Ok::<_, Infallible>(frame_part(&state.next_frame()));
        }
    };
    (
        [(header::CONTENT_TYPE, stream_content_type())],
        Body::from_stream(stream),
    )
        .into_response()
}

/// 大华风格的报警事件流：随机触发移动开始，几秒后结束
async fn events(State(state): State<Arc<SimulatorState>>) -> Response {
    info!("Alarm stream client connected");
    let every = state.settings.motion_every.max(1);
    let stream = async_stream::stream! {
        loop {
            let wait = rand::thread_rng().gen_range(1..=every * 2);
            tokio::time::sleep(Duration::from_secs(wait)).await;
            info!("Motion started");
            yield Ok::<_, Infallible>(event_part("VideoMotion", true));
            tokio::time::sleep(Duration::from_secs(3)).await;
            info!("Motion stopped");
            yield Ok::<_, Infallible>(event_part("VideoMotion", false));
        }
    };
    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", EVENT_BOUNDARY),
        )],
        Body::from_stream(stream),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use common::auth::{basic_authorization, DigestAuth};
    use futures::StreamExt;
    use tower::ServiceExt;

    fn settings(auth: AuthMode) -> SimulatorSettings {
        SimulatorSettings {
            user: "admin".into(),
            password: "secret".into(),
            auth,
            fps: 20,
            motion_every: 10,
        }
    }

    #[tokio::test]
    async fn test_digest_challenge_and_retry() {
        let app = create_router(settings(AuthMode::Digest));

        let response = app
            .clone()
            .oneshot(Request::get("/snapshot.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let www_authenticate = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        let challenge = DigestChallenge::parse(www_authenticate).unwrap();

        let mut digest = DigestAuth::new("admin", "secret", challenge);
        let response = app
            .oneshot(
                Request::get("/snapshot.jpg")
                    .header(header::AUTHORIZATION, digest.authorization("GET", "/snapshot.jpg"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_basic_rejects_wrong_password() {
        let app = create_router(settings(AuthMode::Basic));
        let response = app
            .clone()
            .oneshot(
                Request::get("/snapshot.jpg")
                    .header(header::AUTHORIZATION, basic_authorization("admin", "wrong"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/snapshot.jpg")
                    .header(header::AUTHORIZATION, basic_authorization("admin", "secret"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mjpeg_stream_frames() {
        let app = create_router(settings(AuthMode::None));
        let response = app
            .oneshot(Request::get("/mjpeg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=thisMjpegStream"
        );
        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let second = body.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"--thisMjpegStream"));
        assert_ne!(first, second);
    }
}
