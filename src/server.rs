//! HTTP 接口：POST / 分析图片，GET /health 查看状态

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::request::ImageRequest;
use crate::models::result::{AnalysisResponse, ErrorResponse, HealthResponse};
use crate::recognition::engine::Engine;

/// 监听直到 shutdown 完成，正在处理的请求会等它结束
pub async fn serve<F>(engine: Arc<Engine>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let engine = Arc::clone(&engine);
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, Arc::clone(&engine)))) }
    });

    let server = Server::try_bind(&addr).with_context(|| format!("bind {addr}"))?.serve(make_svc);
    log::info!("listening on http://{}", server.local_addr());
    server.with_graceful_shutdown(shutdown).await.context("http server")?;
    log::info!("server stopped");
    Ok(())
}

pub async fn handle(req: Request<Body>, engine: Arc<Engine>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => empty_response(StatusCode::NO_CONTENT),
        (&Method::GET, "/health") => health(&engine),
        (&Method::POST, "/") => analyze(req, engine).await,
        (method, path) => {
            log::debug!("no route for {method} {path}");
            error_response(StatusCode::NOT_FOUND, "Not found")
        }
    };
    Ok(response)
}

fn health(engine: &Engine) -> Response<Body> {
    let detector = engine.detector();
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "healthy".to_string(),
            detector_available: detector.is_available(),
            device: detector.device().to_string(),
        },
    )
}

async fn analyze(req: Request<Body>, engine: Arc<Engine>) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("Could not read request body: {e}")),
    };
    let request: ImageRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request body: {e}")),
    };

    // 图像处理是纯CPU计算，放到阻塞线程池里
    let worker = Arc::clone(&engine);
    let outcome = tokio::task::spawn_blocking(move || worker.analyze(&request.image)).await;
    match outcome {
        Ok(Ok(report)) => {
            let response = AnalysisResponse::new(report, engine.detector().method());
            json_response(StatusCode::OK, &response)
        }
        Ok(Err(e)) => analysis_error_response(&e),
        Err(e) => {
            log::error!("analysis task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Analysis task failed")
        }
    }
}

/// 图片解码失败是400，其余阶段失败都是200带error字段
fn analysis_error_response(e: &AnalysisError) -> Response<Body> {
    if e.is_client_error() {
        log::warn!("rejected request: {e}");
        error_response(StatusCode::BAD_REQUEST, &e.to_string())
    } else {
        log::info!("analysis finished without result: {e}");
        error_response(StatusCode::OK, &e.to_string())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &ErrorResponse { error: message.to_string() })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let mut response = match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
        }
        Err(e) => {
            log::error!("serialize response failed: {e}");
            let mut response = Response::new(Body::from(r#"{"error":"Internal serialization error"}"#));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    with_cors(response)
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    with_cors(response)
}

/// 前端跨域，全部放开
fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Detection, Roi};
    use crate::my_utils::image::image_to_base64;
    use crate::recognition::detector::BottleDetector;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_ellipse_mut;
    use serde_json::{json, Value};

    struct FixedDetector(Vec<Detection>);

    impl BottleDetector for FixedDetector {
        fn detect(&self, _img: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
        fn device(&self) -> &str {
            "cpu"
        }
        fn method(&self) -> &str {
            "Fixed + Contour"
        }
    }

    fn engine(detections: Vec<Detection>) -> Arc<Engine> {
        Arc::new(Engine::with_detector(Config::default(), Box::new(FixedDetector(detections))).unwrap())
    }

    fn bottle_detection() -> Detection {
        Detection { bbox: Roi::new(60, 50, 180, 250), confidence: 0.87 }
    }

    fn bottle_payload() -> String {
        let mut img = RgbImage::from_pixel(240, 300, Rgb([30, 30, 30]));
        draw_filled_ellipse_mut(&mut img, (120, 150), 25, 80, Rgb([240, 240, 240]));
        json!({ "image": image_to_base64(&img).unwrap() }).to_string()
    }

    async fn call(engine: Arc<Engine>, method: Method, path: &str, body: &str) -> (StatusCode, Response<Body>) {
        let req = Request::builder().method(method).uri(path).body(Body::from(body.to_string())).unwrap();
        let response = handle(req, engine).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_detector() {
        let (status, response) = call(engine(vec![]), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["detector_available"], true);
        assert_eq!(body["device"], "cpu");
    }

    #[tokio::test]
    async fn preflight_and_unknown_route() {
        let (status, response) = call(engine(vec![]), Method::OPTIONS, "/", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let (status, _) = call(engine(vec![]), Method::GET, "/missing", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn analyze_returns_classification() {
        let (status, response) = call(engine(vec![bottle_detection()]), Method::POST, "/", &bottle_payload()).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["classification"], "500mL");
        assert_eq!(body["detection_method"], "Fixed + Contour");
        assert_eq!(body["bbox"], json!([60, 50, 180, 250]));
        assert!(body["detector_confidence"].as_f64().unwrap() > 0.86);
        assert_eq!(body["measurement_details"]["scale_method"], "context");
        assert!(body["processed_image"].as_str().unwrap().starts_with("data:image/png;base64,"));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn pipeline_failure_is_200_with_error() {
        let (status, response) = call(engine(vec![]), Method::POST, "/", &bottle_payload()).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body, json!({ "error": "No bottles detected by detector" }));
    }

    #[tokio::test]
    async fn bad_input_is_400() {
        let (status, response) = call(engine(vec![]), Method::POST, "/", r#"{"image": "%%%"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid image data"));

        let (status, response) = call(engine(vec![]), Method::POST, "/", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }
}
