use crate::errors::SinkError;
use crate::normalize::{CounterEmission, NormalizedPoint};
use crate::sink::{CounterSink, TimeSeriesSink};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use shared::http::serve_listener;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Local HTTP server recording every request and answering with a fixed status.
pub struct CaptureServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CaptureServer {
    pub async fn spawn(status: StatusCode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let captured = requests.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let captured = captured.clone();
            async move {
                let (parts, body) = req.into_parts();
                let body = body.collect().await.unwrap().to_bytes();
                captured.lock().unwrap().push(CapturedRequest {
                    method: parts.method.to_string(),
                    uri: parts.uri.to_string(),
                    headers: parts.headers,
                    body,
                });

                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() = status;
                Ok::<_, Infallible>(response)
            }
        });
        tokio::spawn(serve_listener(listener, service));

        CaptureServer { port, requests }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// In-memory time-series sink recording every write.
#[derive(Default)]
pub struct RecordingTimeSeriesSink {
    pub fail: bool,
    /// Time each write takes before it is recorded.
    pub delay: Duration,
    writes: Mutex<Vec<(String, Vec<NormalizedPoint>)>>,
}

impl RecordingTimeSeriesSink {
    pub fn failing() -> Self {
        RecordingTimeSeriesSink {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        RecordingTimeSeriesSink {
            delay,
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<(String, Vec<NormalizedPoint>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeSeriesSink for RecordingTimeSeriesSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn write_points(
        &self,
        measurement: &str,
        points: &[NormalizedPoint],
    ) -> Result<(), SinkError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.writes
            .lock()
            .unwrap()
            .push((measurement.to_string(), points.to_vec()));
        if self.fail {
            return Err(SinkError::Status {
                status: 500,
                body: "write failed".into(),
            });
        }
        Ok(())
    }
}

/// In-memory counter sink recording every increment.
#[derive(Default)]
pub struct RecordingCounterSink {
    pub fail: bool,
    increments: Mutex<Vec<CounterEmission>>,
}

impl RecordingCounterSink {
    pub fn failing() -> Self {
        RecordingCounterSink {
            fail: true,
            ..Default::default()
        }
    }

    pub fn increments(&self) -> Vec<CounterEmission> {
        self.increments.lock().unwrap().clone()
    }
}

#[async_trait]
impl CounterSink for RecordingCounterSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn increment(&self, name: &str, value: u64, timestamp: i64) -> Result<(), SinkError> {
        self.increments.lock().unwrap().push(CounterEmission {
            name: name.to_string(),
            value,
            timestamp,
        });
        if self.fail {
            return Err(SinkError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}
