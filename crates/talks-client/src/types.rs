use serde::{Deserialize, Deserializer, Serialize};

/// Response body of `POST /talks/streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamResponse {
    pub id: String,
    pub offer: SessionDescription,
    pub ice_servers: Vec<IceServer>,
    /// Server-side correlator used when posting the answer. Not the stream id.
    pub session_id: String,
}

/// An SDP blob with its type, in the shape the service uses on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(sdp_type: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: sdp_type.into(),
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(default, deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

// The service sends `urls` either as a bare string or as a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(url)) => vec![url],
        Some(OneOrMany::Many(urls)) => urls,
        None => Vec::new(),
    })
}

/// A locally gathered ICE candidate, ready to be trickled to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TalkScript {
    Text { input: String },
}

impl TalkScript {
    pub fn text(input: impl Into<String>) -> Self {
        TalkScript::Text {
            input: input.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateStreamRequest<'a> {
    pub source_url: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerRequest<'a> {
    pub answer: &'a SessionDescription,
    pub session_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct IceCandidateRequest<'a> {
    pub candidate: &'a str,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: &'a str,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
    pub session_id: &'a str,
}

impl<'a> IceCandidateRequest<'a> {
    pub fn new(stream_id: &'a str, candidate: &'a IceCandidate) -> Self {
        Self {
            candidate: &candidate.candidate,
            sdp_mid: candidate.sdp_mid.as_deref().unwrap_or(""),
            sdp_mline_index: candidate.sdp_mline_index.unwrap_or(0),
            session_id: stream_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartTalkRequest<'a> {
    pub script: &'a TalkScript,
    pub session_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteStreamRequest<'a> {
    pub session_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_single_url_as_one_element_list() {
        let server: IceServer =
            serde_json::from_value(json!({ "urls": "stun:stun.l.google.com:19302" })).unwrap();
        assert_eq!(server.urls, vec!["stun:stun.l.google.com:19302".to_string()]);
        assert_eq!(server.username, None);
    }

    #[test]
    fn decodes_url_list_with_credentials() {
        let server: IceServer = serde_json::from_value(json!({
            "urls": ["turn:a.example:3478?transport=udp", "turn:a.example:3478?transport=tcp"],
            "username": "user",
            "credential": "secret"
        }))
        .unwrap();
        assert_eq!(server.urls.len(), 2);
        assert_eq!(server.username.as_deref(), Some("user"));
        assert_eq!(server.credential.as_deref(), Some("secret"));
    }

    #[test]
    fn missing_urls_decode_to_empty_list() {
        let server: IceServer = serde_json::from_value(json!({ "username": "u" })).unwrap();
        assert!(server.urls.is_empty());
        let server: IceServer = serde_json::from_value(json!({ "urls": null })).unwrap();
        assert!(server.urls.is_empty());
    }

    #[test]
    fn stream_response_keeps_ice_server_count() {
        let response: StreamResponse = serde_json::from_value(json!({
            "id": "strm_1",
            "offer": { "type": "offer", "sdp": "v=0\r\n" },
            "ice_servers": [
                { "urls": "stun:stun.l.google.com:19302" },
                { "urls": ["turn:t.example:3478"], "username": "u", "credential": "c" },
                { "urls": [] }
            ],
            "session_id": "tok_1"
        }))
        .unwrap();
        assert_eq!(response.ice_servers.len(), 3);
        assert_eq!(response.ice_servers[0].urls.len(), 1);
        assert_eq!(response.session_id, "tok_1");
        assert_eq!(response.offer.sdp_type, "offer");
    }

    #[test]
    fn stream_response_requires_session_token() {
        let result = serde_json::from_value::<StreamResponse>(json!({
            "id": "strm_1",
            "offer": { "type": "offer", "sdp": "v=0" },
            "ice_servers": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn candidate_request_fills_missing_mid_and_index() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
            sdp_mid: None,
            sdp_mline_index: None,
        };
        let body = serde_json::to_value(IceCandidateRequest::new("strm_1", &candidate)).unwrap();
        assert_eq!(
            body,
            json!({
                "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host",
                "sdpMid": "",
                "sdpMLineIndex": 0,
                "session_id": "strm_1"
            })
        );
    }

    #[test]
    fn answer_request_shape() {
        let answer = SessionDescription::new("answer", "v=0");
        let body = serde_json::to_value(AnswerRequest {
            answer: &answer,
            session_id: "tok_1",
        })
        .unwrap();
        assert_eq!(
            body,
            json!({ "answer": { "type": "answer", "sdp": "v=0" }, "session_id": "tok_1" })
        );
    }

    #[test]
    fn text_script_shape() {
        let script = TalkScript::text("hello");
        let body = serde_json::to_value(StartTalkRequest {
            script: &script,
            session_id: "tok_1",
        })
        .unwrap();
        assert_eq!(
            body,
            json!({ "script": { "type": "text", "input": "hello" }, "session_id": "tok_1" })
        );
    }
}
