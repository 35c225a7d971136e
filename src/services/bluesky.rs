// src/services/bluesky.rs

//! Bluesky (AT Protocol) posting client.
//!
//! Logs in with an app password, creates `app.bsky.feed.post` records and
//! refreshes the session once when the access token expires.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Credentials;
use crate::error::{AppError, Result};
use crate::pipeline::FormattedPost;
use crate::utils::http::snippet;
use crate::utils::url::xrpc_url;

const POST_COLLECTION: &str = "app.bsky.feed.post";
const TAG_FEATURE: &str = "app.bsky.richtext.facet#tag";

/// Identifier of a created post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReceipt {
    pub uri: String,
}

/// A social network that accepts formatted posts.
#[async_trait]
pub trait Poster: Send + Sync {
    /// Publish one post. Errors are classified as rate limited, transient,
    /// permanent or authentication failures.
    async fn post(&self, post: &FormattedPost) -> Result<PostReceipt>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    did: String,
    access_jwt: String,
    refresh_jwt: String,
}

#[derive(Debug, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordOutput {
    uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecordInput<'a> {
    repo: &'a str,
    collection: &'static str,
    record: PostRecord<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord<'a> {
    #[serde(rename = "$type")]
    kind: &'static str,
    text: &'a str,
    created_at: String,
    langs: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facets: Vec<Facet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Facet {
    index: ByteSlice,
    features: Vec<TagFeature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ByteSlice {
    byte_start: usize,
    byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct TagFeature {
    #[serde(rename = "$type")]
    kind: &'static str,
    tag: String,
}

/// Authenticated Bluesky client.
pub struct BlueskyClient {
    client: Client,
    service: String,
    language: String,
    session: Mutex<Session>,
}

impl BlueskyClient {
    /// Log in and keep the session for later posts.
    ///
    /// Rejected credentials are an authentication failure.
    pub async fn login(
        client: Client,
        service: &str,
        credentials: &Credentials,
        language: &str,
    ) -> Result<Self> {
        let url = xrpc_url(service, "com.atproto.server.createSession")?;
        let response = client
            .post(url)
            .json(&serde_json::json!({
                "identifier": credentials.handle,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| AppError::authentication(format!("login request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::authentication(format!(
                "login as {} rejected ({}): {}",
                credentials.handle,
                status,
                snippet(&body)
            )));
        }

        let session: Session = serde_json::from_str(&body)?;
        log::info!("Logged in to {} as {}", service, credentials.handle);

        Ok(Self {
            client,
            service: service.to_string(),
            language: language.to_string(),
            session: Mutex::new(session),
        })
    }

    /// Exchange the refresh token for a new session.
    async fn refresh(&self, session: &mut Session) -> Result<()> {
        let url = xrpc_url(&self.service, "com.atproto.server.refreshSession")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&session.refresh_jwt)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(AppError::authentication(format!(
                "session refresh rejected ({}): {}",
                status,
                snippet(&body)
            )));
        }

        *session = serde_json::from_str(&body)?;
        log::info!("Refreshed Bluesky session");
        Ok(())
    }

    async fn create_record(&self, session: &Session, post: &FormattedPost) -> Result<PostReceipt> {
        let url = xrpc_url(&self.service, "com.atproto.repo.createRecord")?;
        let input = CreateRecordInput {
            repo: &session.did,
            collection: POST_COLLECTION,
            record: PostRecord {
                kind: POST_COLLECTION,
                text: &post.text,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                langs: vec![self.language.as_str()],
                facets: tag_facets(&post.text, &post.hashtags),
            },
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&session.access_jwt)
            .json(&input)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let output: CreateRecordOutput = serde_json::from_str(&body).map_err(|e| {
            AppError::TransientPublish(format!("unreadable createRecord reply: {e}"))
        })?;
        Ok(PostReceipt { uri: output.uri })
    }
}

#[async_trait]
impl Poster for BlueskyClient {
    async fn post(&self, post: &FormattedPost) -> Result<PostReceipt> {
        let mut session = self.session.lock().await;
        match self.create_record(&session, post).await {
            Err(AppError::Authentication(reason)) if reason.contains("ExpiredToken") => {
                log::info!("Access token expired, refreshing session");
                self.refresh(&mut session).await?;
                self.create_record(&session, post).await
            }
            other => other,
        }
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    AppError::TransientPublish(format!("network error: {e}"))
}

/// Map an XRPC error response onto the publish failure classes.
fn classify_failure(status: StatusCode, body: &str) -> AppError {
    let detail = serde_json::from_str::<XrpcError>(body)
        .map(|e| format!("{} {}", e.error, e.message).trim().to_string())
        .unwrap_or_else(|_| snippet(body));
    let reason = format!("{status}: {detail}");

    if detail.starts_with("ExpiredToken") || detail.starts_with("InvalidToken") {
        return AppError::Authentication(reason);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Authentication(reason),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(reason),
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            AppError::TransientPublish(reason)
        }
        _ => AppError::PermanentPublish(reason),
    }
}

/// Tag facets for the hashtags in the trailing hashtag paragraph.
fn tag_facets(text: &str, hashtags: &[String]) -> Vec<Facet> {
    let Some(start) = text.rfind("\n\n").map(|i| i + 2) else {
        return Vec::new();
    };
    let tail = &text[start..];

    let mut facets = Vec::new();
    let mut cursor = 0;
    for tag in hashtags {
        if let Some(pos) = tail[cursor..].find(tag.as_str()) {
            let byte_start = start + cursor + pos;
            let byte_end = byte_start + tag.len();
            facets.push(Facet {
                index: ByteSlice {
                    byte_start,
                    byte_end,
                },
                features: vec![TagFeature {
                    kind: TAG_FEATURE,
                    tag: tag.trim_start_matches('#').to_string(),
                }],
            });
            cursor += pos + tag.len();
        }
    }
    facets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_facets_use_byte_offsets() {
        let text = "🆕 Neu!\n\n🍽️ Café\n\n#Chicago #Café";
        let tags = vec!["#Chicago".to_string(), "#Café".to_string()];
        let facets = tag_facets(text, &tags);

        assert_eq!(facets.len(), 2);
        for (facet, tag) in facets.iter().zip(&tags) {
            assert_eq!(&text[facet.index.byte_start..facet.index.byte_end], tag);
        }
        assert_eq!(facets[1].features[0].tag, "Café");
    }

    #[test]
    fn test_tag_facets_ignore_body_text() {
        // A tag spelled inside the body is not linked; only the trailing paragraph is.
        let text = "Header\n\n#Chicago style pizza\n\n#Chicago";
        let facets = tag_facets(text, &["#Chicago".to_string()]);
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].index.byte_start, text.len() - "#Chicago".len());
    }

    #[test]
    fn test_no_facets_without_hashtags() {
        assert!(tag_facets("single line", &[]).is_empty());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, "{}"),
            AppError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "<html>"),
            AppError::TransientPublish(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, r#"{"error":"AuthMissing"}"#),
            AppError::Authentication(_)
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                r#"{"error":"ExpiredToken","message":"Token has expired"}"#
            ),
            AppError::Authentication(reason) if reason.contains("ExpiredToken")
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                r#"{"error":"InvalidRequest","message":"Record/text must not be longer than 300 graphemes"}"#
            ),
            AppError::PermanentPublish(_)
        ));
    }

    #[test]
    fn test_record_serialization() {
        let input = CreateRecordInput {
            repo: "did:plc:abc",
            collection: POST_COLLECTION,
            record: PostRecord {
                kind: POST_COLLECTION,
                text: "hi\n\n#Chicago",
                created_at: "2024-01-01T00:00:00.000Z".to_string(),
                langs: vec!["en"],
                facets: tag_facets("hi\n\n#Chicago", &["#Chicago".to_string()]),
            },
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["collection"], "app.bsky.feed.post");
        assert_eq!(value["record"]["$type"], "app.bsky.feed.post");
        assert_eq!(value["record"]["createdAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(value["record"]["facets"][0]["index"]["byteStart"], 4);
        assert_eq!(value["record"]["facets"][0]["index"]["byteEnd"], 12);
        assert_eq!(
            value["record"]["facets"][0]["features"][0]["$type"],
            "app.bsky.richtext.facet#tag"
        );
    }

    mod session {
        use super::*;
        use serde_json::json;
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const CREATE_SESSION: &str = "/xrpc/com.atproto.server.createSession";
        const REFRESH_SESSION: &str = "/xrpc/com.atproto.server.refreshSession";
        const CREATE_RECORD: &str = "/xrpc/com.atproto.repo.createRecord";

        fn credentials() -> Credentials {
            Credentials {
                handle: "bot.bsky.social".into(),
                password: "app-password".into(),
            }
        }

        fn session(access: &str, refresh: &str) -> serde_json::Value {
            json!({
                "did": "did:plc:bot",
                "handle": "bot.bsky.social",
                "accessJwt": access,
                "refreshJwt": refresh,
            })
        }

        fn session_reply(access: &str, refresh: &str) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(session(access, refresh))
        }

        fn post() -> FormattedPost {
            let text = "🆕 New Restaurant Alert!\n\n🍽️ Noodle Bar\n\n#Chicago";
            FormattedPost {
                text: text.to_string(),
                length: text.len(),
                hashtags: vec!["#Chicago".to_string()],
                truncated: false,
            }
        }

        async fn logged_in(server: &MockServer) -> BlueskyClient {
            Mock::given(method("POST"))
                .and(path(CREATE_SESSION))
                .and(body_partial_json(json!({ "identifier": "bot.bsky.social" })))
                .respond_with(session_reply("access-1", "refresh-1"))
                .expect(1)
                .mount(server)
                .await;
            BlueskyClient::login(Client::new(), &server.uri(), &credentials(), "en")
                .await
                .unwrap()
        }

        fn expired() -> ResponseTemplate {
            ResponseTemplate::new(400).set_body_json(json!({
                "error": "ExpiredToken",
                "message": "Token has expired",
            }))
        }

        fn created(n: u32) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(json!({
                "uri": format!("at://did:plc:bot/app.bsky.feed.post/{n}"),
                "cid": "bafy",
            }))
        }

        #[tokio::test]
        async fn test_expired_token_is_refreshed_once() {
            let server = MockServer::start().await;
            let client = logged_in(&server).await;

            Mock::given(method("POST"))
                .and(path(CREATE_RECORD))
                .and(header("Authorization", "Bearer access-1"))
                .respond_with(expired())
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path(REFRESH_SESSION))
                .and(header("Authorization", "Bearer refresh-1"))
                .respond_with(session_reply("access-2", "refresh-2"))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path(CREATE_RECORD))
                .and(header("Authorization", "Bearer access-2"))
                .and(body_partial_json(json!({
                    "repo": "did:plc:bot",
                    "collection": "app.bsky.feed.post",
                    "record": { "langs": ["en"] },
                })))
                .respond_with(created(1))
                .expect(2)
                .mount(&server)
                .await;

            let first = client.post(&post()).await.unwrap();
            assert_eq!(first.uri, "at://did:plc:bot/app.bsky.feed.post/1");

            // The refreshed session is kept for later posts.
            client.post(&post()).await.unwrap();
        }

        #[tokio::test]
        async fn test_second_expiry_after_refresh_is_fatal() {
            let server = MockServer::start().await;
            let client = logged_in(&server).await;

            Mock::given(method("POST"))
                .and(path(CREATE_RECORD))
                .respond_with(expired())
                .expect(2)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path(REFRESH_SESSION))
                .respond_with(session_reply("access-2", "refresh-2"))
                .expect(1)
                .mount(&server)
                .await;

            let err = client.post(&post()).await.unwrap_err();
            assert!(matches!(
                err,
                AppError::Authentication(reason) if reason.contains("ExpiredToken")
            ));
        }

        #[tokio::test]
        async fn test_rejected_refresh_is_authentication_failure() {
            let server = MockServer::start().await;
            let client = logged_in(&server).await;

            Mock::given(method("POST"))
                .and(path(CREATE_RECORD))
                .respond_with(expired())
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path(REFRESH_SESSION))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                    "error": "ExpiredToken",
                    "message": "Refresh token has expired",
                })))
                .expect(1)
                .mount(&server)
                .await;

            let err = client.post(&post()).await.unwrap_err();
            assert!(matches!(err, AppError::Authentication(reason) if reason.contains("refresh")));
        }

        #[tokio::test]
        async fn test_rate_limit_is_not_an_auth_problem() {
            let server = MockServer::start().await;
            let client = logged_in(&server).await;

            Mock::given(method("POST"))
                .and(path(CREATE_RECORD))
                .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                    "error": "RateLimitExceeded",
                    "message": "Rate Limit Exceeded",
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path(REFRESH_SESSION))
                .respond_with(session_reply("a", "r"))
                .expect(0)
                .mount(&server)
                .await;

            let err = client.post(&post()).await.unwrap_err();
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn test_rejected_login_is_authentication_failure() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(CREATE_SESSION))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "error": "AuthenticationRequired",
                    "message": "Invalid identifier or password",
                })))
                .mount(&server)
                .await;

            let result =
                BlueskyClient::login(Client::new(), &server.uri(), &credentials(), "en").await;
            assert!(matches!(result, Err(AppError::Authentication(_))));
        }
    }
}
