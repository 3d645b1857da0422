//! Wire-level tests of the Gemini curator: payload decoding, verdict
//! handling, cost arithmetic, and key-less passthrough.

use news_aggregator::{Curator, GeminiCurator, Verdict};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/gemini-1.5-flash-latest:generateContent";

fn model_response(text: &str, prompt_tokens: u64, output_tokens: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ],
        "usageMetadata": {
            "promptTokenCount": prompt_tokens,
            "candidatesTokenCount": output_tokens
        }
    }))
}

fn curator_for(server: &MockServer) -> GeminiCurator {
    GeminiCurator::new(Some("gm-key".to_string()), reqwest::Client::new())
        .with_base_url(server.uri())
}

#[tokio::test]
async fn canonical_headline_is_priced_from_usage_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(query_param("key", "gm-key"))
        .respond_with(model_response(
            "Descoberta fábrica de gordura Neandertal na Alemanha",
            1_000,
            500,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let curator = curator_for(&server);
    let result = curator
        .canonical_headline("Neandertais: descoberta na Alemanha", "corpo do artigo")
        .await
        .unwrap();

    assert_eq!(
        result.value.as_deref(),
        Some("Descoberta fábrica de gordura Neandertal na Alemanha")
    );
    // 1000 in-tokens at $0.10/M plus 500 out-tokens at $0.40/M.
    assert!((result.cost_usd - 0.0003).abs() < 1e-12);
    assert!((curator.session_cost().await - 0.0003).abs() < 1e-12);
}

#[tokio::test]
async fn session_cost_accumulates_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(model_response("Categoria", 1_000, 500))
        .mount(&server)
        .await;

    let curator = curator_for(&server);
    curator.categorize("t", "b").await.unwrap();
    curator.categorize("t2", "b2").await.unwrap();

    assert!((curator.session_cost().await - 0.0006).abs() < 1e-12);
}

#[tokio::test]
async fn relevance_verdicts_are_parsed_and_fail_closed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{}] }]
        })))
        .respond_with(model_response("APPROVED", 10, 1))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let curator = curator_for(&server);
    let verdict = curator.check_relevance("título", "corpo").await.unwrap();
    assert_eq!(verdict.value, Verdict::Approved);

    // Anything that is not a clean token rejects.
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(model_response("Bem, depende do contexto...", 10, 5))
        .mount(&server)
        .await;
    let verdict = curator.check_relevance("título", "corpo").await.unwrap();
    assert!(matches!(verdict.value, Verdict::Rejected(_)));
}

#[tokio::test]
async fn model_failure_degrades_to_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let curator = curator_for(&server);

    let canonical = curator.canonical_headline("Título", "corpo").await.unwrap();
    assert!(canonical.value.is_none());
    assert_eq!(canonical.cost_usd, 0.0);

    let refined = curator.refine_title("Título original").await.unwrap();
    assert_eq!(refined.value, "Título original");

    let verdict = curator.check_relevance("Título", "corpo").await.unwrap();
    assert_eq!(verdict.value, Verdict::Approved);
}

#[tokio::test]
async fn missing_key_means_free_passthrough() {
    let curator = GeminiCurator::new(None, reqwest::Client::new());

    let translated = curator.translate("The headline", "English").await.unwrap();
    assert_eq!(translated.value, "The headline");
    assert_eq!(translated.cost_usd, 0.0);

    let category = curator.categorize("t", "b").await.unwrap();
    assert_eq!(category.value, "Geral");

    let tags = curator.hashtags("seed").await.unwrap();
    assert_eq!(tags.value, "");

    assert_eq!(curator.session_cost().await, 0.0);
}

#[tokio::test]
async fn rewritten_caption_is_split_on_the_hook_marker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(model_response(
            "1. Resumo objetivo da notícia em um parágrafo.|||E você, concorda?",
            100,
            50,
        ))
        .mount(&server)
        .await;

    let curator = curator_for(&server);
    let caption = curator.rewrite_caption("corpo original").await.unwrap();

    assert_eq!(
        caption.value,
        "Resumo objetivo da notícia em um parágrafo.\n\nE você, concorda?"
    );
}

#[tokio::test]
async fn refined_titles_lose_stray_quotes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(model_response("\"Título refinado\"", 10, 5))
        .mount(&server)
        .await;

    let curator = curator_for(&server);
    let refined = curator.refine_title("titulo bruto").await.unwrap();
    assert_eq!(refined.value, "Título refinado");
}
