use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use pharmabot_core::{
    ApiKey, Credential, CredentialPool, FailoverClient, GeminiGenerator, GenerationErrorKind,
    GenerationRequest, HttpClient, HttpError, HttpRequest, HttpResponse, PoolConfig,
    TextGenerator,
};
use serde_json::Value;

/// Transport double: replays canned results and keeps every request it saw.
#[derive(Default)]
struct CannedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl CannedTransport {
    fn replying(replies: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<HttpRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl HttpClient for CannedTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.seen.lock().expect("seen lock").push(request);
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::ok_json(success_body("ok"))));
        Box::pin(async move { reply })
    }
}

fn success_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

fn credential(name: &str, model: &str) -> Credential {
    Credential::new(name, ApiKey::new(format!("secret-{name}")), model)
}

fn generator(transport: Arc<CannedTransport>) -> GeminiGenerator {
    GeminiGenerator::new(transport)
        .with_base_url("https://gemini.test/v1beta/")
        .with_timeout_ms(5_000)
}

#[tokio::test]
async fn request_targets_generate_content_with_key_header_and_sampling() {
    let transport = CannedTransport::replying(vec![Ok(HttpResponse::ok_json(success_body(
        "Take with water.",
    )))]);
    let gemini = generator(Arc::clone(&transport));
    let request = GenerationRequest::new("How do I take ibuprofen?")
        .with_temperature(0.2)
        .with_max_output_tokens(128);

    let text = gemini
        .generate(&credential("key_1", "models/gemini-2.0-flash"), &request)
        .await
        .expect("generation succeeds");

    assert_eq!(text, "Take with water.");

    let seen = transport.seen();
    assert_eq!(seen.len(), 1);
    let sent = &seen[0];
    assert_eq!(
        sent.url,
        "https://gemini.test/v1beta/models/gemini-2.0-flash:generateContent"
    );
    assert_eq!(sent.header("x-goog-api-key"), Some("secret-key_1"));
    assert_eq!(sent.header("content-type"), Some("application/json"));
    assert_eq!(sent.timeout_ms, 5_000);
    assert!(!sent.url.contains("secret"));

    let body: Value = serde_json::from_str(sent.body.as_deref().expect("body")).expect("json body");
    assert_eq!(
        body["contents"][0]["parts"][0]["text"],
        "How do I take ibuprofen?"
    );
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 128);
    let temperature = body["generationConfig"]["temperature"]
        .as_f64()
        .expect("temperature");
    assert!((temperature - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn request_debug_output_masks_the_api_key() {
    let transport = CannedTransport::replying(Vec::new());
    let gemini = generator(Arc::clone(&transport));

    gemini
        .generate(
            &credential("key_1", "gemini-2.0-flash"),
            &GenerationRequest::new("hello"),
        )
        .await
        .expect("generation succeeds");

    let rendered = format!("{:?}", transport.seen()[0]);
    assert!(!rendered.contains("secret-key_1"));
    assert!(rendered.contains("***"));
}

#[tokio::test]
async fn http_failures_are_classified_for_rotation() {
    let cases = [
        (
            429,
            r#"{"error":{"code":429,"message":"Quota exceeded for metric","status":"RESOURCE_EXHAUSTED"}}"#,
            GenerationErrorKind::QuotaExceeded,
        ),
        (429, "Too Many Requests", GenerationErrorKind::RateLimited),
        (
            401,
            r#"{"error":{"code":401,"message":"Request had invalid authentication credentials","status":"UNAUTHENTICATED"}}"#,
            GenerationErrorKind::AuthFailure,
        ),
        (
            404,
            r#"{"error":{"code":404,"message":"models/gemini-0 is not found","status":"NOT_FOUND"}}"#,
            GenerationErrorKind::ModelNotFound,
        ),
        (500, "internal error", GenerationErrorKind::TransientNetwork),
        (
            400,
            r#"{"error":{"code":400,"message":"Invalid JSON payload","status":"INVALID_ARGUMENT"}}"#,
            GenerationErrorKind::MalformedRequest,
        ),
    ];

    for (status, body, expected) in cases {
        let transport = CannedTransport::replying(vec![Ok(HttpResponse::new(status, body))]);
        let gemini = generator(transport);

        let error = gemini
            .generate(
                &credential("key_1", "gemini-2.0-flash"),
                &GenerationRequest::new("hello"),
            )
            .await
            .expect_err("failure response");

        assert_eq!(error.kind(), expected, "status {status}");
        assert!(error.message().starts_with(&format!("HTTP {status}")));
        assert!(!error.message().contains("secret"));
    }
}

#[tokio::test]
async fn transport_errors_map_by_retryability() {
    let transport = CannedTransport::replying(vec![
        Err(HttpError::new("request timed out after 5000ms")),
        Err(HttpError::non_retryable("invalid header value")),
    ]);
    let gemini = generator(transport);
    let target = credential("key_1", "gemini-2.0-flash");
    let request = GenerationRequest::new("hello");

    let timeout = gemini.generate(&target, &request).await.expect_err("timeout");
    let builder = gemini.generate(&target, &request).await.expect_err("builder");

    assert_eq!(timeout.kind(), GenerationErrorKind::TransientNetwork);
    assert!(timeout.retryable());
    assert_eq!(builder.kind(), GenerationErrorKind::MalformedRequest);
    assert!(!builder.retryable());
}

#[tokio::test]
async fn failover_rotates_to_next_model_after_quota_response() {
    let transport = CannedTransport::replying(vec![
        Ok(HttpResponse::new(
            429,
            r#"{"error":{"code":429,"message":"You exceeded your current quota","status":"RESOURCE_EXHAUSTED"}}"#,
        )),
        Ok(HttpResponse::ok_json(success_body("from the second model"))),
    ]);
    let gemini = Arc::new(generator(Arc::clone(&transport)));
    let pool = Arc::new(
        CredentialPool::new(
            vec![
                credential("key_1", "gemini-2.0-flash"),
                credential("key_1", "gemini-2.5-flash"),
            ],
            PoolConfig::default(),
        )
        .expect("pool"),
    );
    let client = FailoverClient::new(pool, gemini);

    let outcome = client
        .generate(&GenerationRequest::new("hello"))
        .await
        .expect("second model answers");

    assert_eq!(outcome.text, "from the second model");
    assert_eq!(outcome.model, "gemini-2.5-flash");
    assert!(outcome.degraded);

    let urls: Vec<String> = transport.seen().into_iter().map(|request| request.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://gemini.test/v1beta/models/gemini-2.0-flash:generateContent",
            "https://gemini.test/v1beta/models/gemini-2.5-flash:generateContent",
        ]
    );
}
