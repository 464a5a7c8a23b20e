use crate::config::WebhookConfig;
use crate::metrics_defs::WEBHOOK_REQUESTS;
use crate::relay::MetricsRelay;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::counter;
use shared::http::{full_body, make_boxed_error_response};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

type WebhookResponse = Response<BoxBody<Bytes, Infallible>>;

/// Accepts webhook deliveries (a JSON array of events) and hands them to the relay.
pub struct WebhookService {
    relay: MetricsRelay,
    path: String,
    credentials: Option<(String, String)>,
    max_body_bytes: usize,
}

impl WebhookService {
    pub fn new(relay: MetricsRelay, config: &WebhookConfig) -> Self {
        WebhookService {
            relay,
            path: config.path.clone(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            max_body_bytes: config.max_body_bytes,
        }
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some((username, password)) = &self.credentials else {
            return true;
        };

        match parse_basic_auth(headers) {
            Some((user, pass)) => user == *username && pass == *password,
            None => false,
        }
    }
}

impl Service<Request<Incoming>> for WebhookService {
    type Response = WebhookResponse;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let matches_path = req.uri().path() == self.path;
        let authorized = self.is_authorized(req.headers());
        let relay = self.relay.clone();
        let max_body_bytes = self.max_body_bytes;

        Box::pin(async move {
            let response = match (matches_path, req.method() == Method::POST, authorized) {
                (false, _, _) => make_boxed_error_response(StatusCode::NOT_FOUND),
                (true, false, _) => make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED),
                (true, true, false) => unauthorized(),
                (true, true, true) => receive_batch(relay, req, max_body_bytes).await,
            };

            counter!(WEBHOOK_REQUESTS, "status" => response.status().as_str().to_owned())
                .increment(1);
            Ok(response)
        })
    }
}

async fn receive_batch(
    relay: MetricsRelay,
    req: Request<Incoming>,
    max_body_bytes: usize,
) -> WebhookResponse {
    let body = match Limited::new(req.into_body(), max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return make_boxed_error_response(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => {
            tracing::warn!("Failed to read webhook body: {e}");
            return make_boxed_error_response(StatusCode::BAD_REQUEST);
        }
    };

    // Elements are decoded individually by the relay
    let events: Vec<serde_json::Value> = match serde_json::from_slice(&body) {
        Ok(events) => events,
        Err(e) => return bad_request(&format!("invalid webhook payload: {e}")),
    };

    if events.is_empty() {
        return bad_request("empty webhook batch");
    }

    let summary = relay.process_batch(events).await;
    tracing::info!(
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        "Processed webhook batch"
    );

    Response::new(full_body("ok\n"))
}

fn bad_request(message: &str) -> WebhookResponse {
    tracing::debug!("Rejecting webhook delivery: {message}");
    let mut response = Response::new(full_body(format!("{message}\n")));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

fn unauthorized() -> WebhookResponse {
    let mut response = make_boxed_error_response(StatusCode::UNAUTHORIZED);
    response.headers_mut().insert(
        WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"webhook\""),
    );
    response
}

fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CounterSink, TimeSeriesSink};
    use crate::testutils::{RecordingCounterSink, RecordingTimeSeriesSink};
    use shared::http::serve_listener;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    const BATCH: &str = r#"[
        {
            "msys": {
                "message_event": {
                    "type": "click",
                    "geo_ip": {"country": "abc"},
                    "timestamp": 1234567890,
                    "campaign_id": "this is a campaign id"
                }
            }
        }
    ]"#;

    struct TestWebhook {
        url: String,
        time_series: Arc<RecordingTimeSeriesSink>,
        counters: Arc<RecordingCounterSink>,
    }

    async fn spawn_webhook(config: WebhookConfig) -> TestWebhook {
        let time_series = Arc::new(RecordingTimeSeriesSink::default());
        let counters = Arc::new(RecordingCounterSink::default());
        let relay = MetricsRelay::new(
            Some(time_series.clone() as Arc<dyn TimeSeriesSink>),
            Some(counters.clone() as Arc<dyn CounterSink>),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}{}", config.path);
        tokio::spawn(serve_listener(listener, WebhookService::new(relay, &config)));

        TestWebhook {
            url,
            time_series,
            counters,
        }
    }

    fn authenticated_config() -> WebhookConfig {
        WebhookConfig {
            username: Some("sparkpost".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_valid_batch() {
        let webhook = spawn_webhook(WebhookConfig::default()).await;

        let response = reqwest::Client::new()
            .post(&webhook.url)
            .body(BATCH)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(webhook.time_series.writes().len(), 1);
        assert_eq!(webhook.counters.increments().len(), 3);
    }

    #[tokio::test]
    async fn test_basic_auth() {
        let webhook = spawn_webhook(authenticated_config()).await;
        let client = reqwest::Client::new();

        let response = client.post(&webhook.url).body(BATCH).send().await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(
            response.headers().get("www-authenticate").unwrap(),
            "Basic realm=\"webhook\""
        );

        let response = client
            .post(&webhook.url)
            .basic_auth("sparkpost", Some("wrong"))
            .body(BATCH)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        assert!(webhook.time_series.writes().is_empty());

        let response = client
            .post(&webhook.url)
            .basic_auth("sparkpost", Some("hunter2"))
            .body(BATCH)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(webhook.time_series.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_requests() {
        let webhook = spawn_webhook(WebhookConfig::default()).await;
        let client = reqwest::Client::new();

        let response = client.get(&webhook.url).send().await.unwrap();
        assert_eq!(response.status(), 405);

        let other_path = webhook.url.replace("/api/sparkpost/webhook", "/other");
        let response = client.post(other_path).body(BATCH).send().await.unwrap();
        assert_eq!(response.status(), 404);

        let response = client.post(&webhook.url).body("{").send().await.unwrap();
        assert_eq!(response.status(), 400);

        // A single event instead of an array
        let response = client
            .post(&webhook.url)
            .body(r#"{"msys": {}}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let response = client.post(&webhook.url).body("[]").send().await.unwrap();
        assert_eq!(response.status(), 400);

        assert!(webhook.time_series.writes().is_empty());
        assert!(webhook.counters.increments().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_reject_batch() {
        let webhook = spawn_webhook(WebhookConfig::default()).await;

        let batch = r#"[
            {"msys": {"message_event": {"type": "click", "timestamp": 1234567890}}},
            {"msys": {"track_event": {"type": "open", "timestamp": "1234567891"}}},
            {"msys": {"gen_event": {"type": "generation_failure"}}}
        ]"#;
        let response = reqwest::Client::new()
            .post(&webhook.url)
            .body(batch)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(webhook.time_series.writes().len(), 2);
        assert_eq!(webhook.counters.increments().len(), 6);
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let webhook = spawn_webhook(WebhookConfig {
            max_body_bytes: 1024,
            ..Default::default()
        })
        .await;
        let client = reqwest::Client::new();

        let oversized = format!("[{}]", " ".repeat(1024));
        let response = client.post(&webhook.url).body(oversized).send().await.unwrap();
        assert_eq!(response.status(), 413);
        assert!(webhook.time_series.writes().is_empty());

        // Still accepted right at the limit
        let padded = format!("{BATCH:<1024}");
        assert_eq!(padded.len(), 1024);
        let response = client.post(&webhook.url).body(padded).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(webhook.time_series.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_ping_batch() {
        let webhook = spawn_webhook(WebhookConfig::default()).await;

        let response = reqwest::Client::new()
            .post(&webhook.url)
            .body(r#"[{"msys": {}}]"#)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert!(webhook.time_series.writes().is_empty());
    }

    #[test]
    fn test_parse_basic_auth() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_basic_auth(&headers), None);

        // base64("user:pa:ss")
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYTpzcw=="));
        assert_eq!(
            parse_basic_auth(&headers),
            Some(("user".to_string(), "pa:ss".to_string()))
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer dXNlcjpwYXNz"));
        assert_eq!(parse_basic_auth(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert_eq!(parse_basic_auth(&headers), None);
    }
}
