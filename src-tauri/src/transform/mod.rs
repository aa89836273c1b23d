//! Intercept-and-rewrite pipeline for content flowing from the remote chat
//! client into the page: structured response bodies get message
//! classification (emoji sizing, anti-recall), raw template sources get the
//! menu capability hooks spliced in. Accepted messages are fed to the
//! history cache off the response path.

pub mod constants;
pub mod message;

use serde_json::Value;

pub use constants::RemoteConstants;
pub use message::{Message, MsgKind};

use crate::history::HistoryCache;
use message::FIELD_TYPE;

const FIELD_MSG_LIST: &str = "AddMsgList";

const CONTEXT_MENU_ANCHOR: &str = "optionMenu();";
const CONTEXT_MENU_SPLICED: &str = "optionMenu();shareMenu();";
const MENTION_ANCHOR: &str = "editAreaKeydown($event)";
const MENTION_SPLICED: &str = "editAreaKeydown($event);mentionMenu($event)";

/// Either a decoded response body or a raw script/template source.
#[derive(Debug, Clone)]
pub enum Payload {
    Structured(Value),
    Template(String),
}

pub struct TransformPipeline {
    constants: RemoteConstants,
    history: HistoryCache,
}

impl TransformPipeline {
    /// The discriminant table is resolved once, when the page registers it,
    /// and injected here; the pipeline never looks it up ambiently.
    pub fn new(constants: RemoteConstants, history: HistoryCache) -> Self {
        Self { constants, history }
    }

    /// Rewrites the payload in place and returns it. Never fails: payloads
    /// without the expected shape pass through unchanged, and the response
    /// path never waits on history storage.
    pub fn transform(&self, payload: Payload) -> Payload {
        match payload {
            Payload::Structured(value) => Payload::Structured(self.transform_structured(value)),
            Payload::Template(source) => Payload::Template(splice_template_hooks(source)),
        }
    }

    fn transform_structured(&self, mut value: Value) -> Value {
        if let Some(list) = value.get_mut(FIELD_MSG_LIST).and_then(Value::as_array_mut) {
            for element in list.iter_mut() {
                let mut msg = Message::from_raw(element);
                let msg_type = element.get(FIELD_TYPE).cloned().unwrap_or(Value::Null);

                if msg_type == self.constants.emoticon {
                    msg.classify_emoticon();
                } else if msg_type == self.constants.recalled {
                    msg.classify_recalled(self.constants.sys.clone());
                }

                *element = msg.raw().clone();
                self.history.append_deferred(msg);
            }
        }

        value
    }
}

/// Splices a capability hook immediately after the first matching template
/// anchor. At most one anchor matches per invocation; an unmatched source
/// passes through unchanged.
pub fn splice_template_hooks(source: String) -> String {
    if source.contains(CONTEXT_MENU_ANCHOR) {
        source.replacen(CONTEXT_MENU_ANCHOR, CONTEXT_MENU_SPLICED, 1)
    } else if source.contains(MENTION_ANCHOR) {
        source.replacen(MENTION_ANCHOR, MENTION_SPLICED, 1)
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    fn test_pipeline() -> (TransformPipeline, HistoryCache) {
        let path =
            std::env::temp_dir().join(format!("webchat-transform-{}.sqlite3", Uuid::new_v4()));
        let history = HistoryCache::new(path).unwrap();
        let constants = RemoteConstants::from_value(json!({
            "MSGTYPE_EMOTICON": 47,
            "MSGTYPE_RECALLED": 10002,
            "MSGTYPE_SYS": 10000,
        }))
        .unwrap();
        (TransformPipeline::new(constants, history.clone()), history)
    }

    fn structured(pipeline: &TransformPipeline, value: Value) -> Value {
        match pipeline.transform(Payload::Structured(value)) {
            Payload::Structured(out) => out,
            Payload::Template(_) => panic!("structured payload came back as template"),
        }
    }

    #[test]
    fn recalled_message_is_retyped_and_substituted() {
        let (pipeline, _history) = test_pipeline();
        let out = structured(
            &pipeline,
            json!({ "AddMsgList": [{ "MsgType": 10002, "MMPeerUserName": "u2" }] }),
        );

        let element = &out["AddMsgList"][0];
        assert_eq!(element["MsgType"], json!(10000));
        assert_eq!(element["MMActualContent"], json!(config::RECALL_PLACEHOLDER));
        assert_eq!(element["MMDigest"], json!(config::RECALL_PLACEHOLDER));
    }

    #[test]
    fn oversized_emoticon_is_clamped() {
        let (pipeline, _history) = test_pipeline();
        let out = structured(
            &pipeline,
            json!({ "AddMsgList": [{
                "MsgType": 47,
                "MMPeerUserName": "u3",
                "ImgWidth": 80,
                "ImgHeight": 240,
            }] }),
        );

        let element = &out["AddMsgList"][0];
        assert_eq!(element["MMDigest"], json!(config::EMOTICON_DIGEST));
        assert_eq!(element["MMImgStyle"]["height"], json!("100px"));
        assert_eq!(element["MMImgStyle"]["width"], json!("initial"));
    }

    #[test]
    fn payload_without_message_list_passes_through() {
        let (pipeline, _history) = test_pipeline();
        let original = json!({ "BaseResponse": { "Ret": 0 }, "AddMsgList": "not a list" });
        let out = structured(&pipeline, original.clone());
        assert_eq!(out, original);
    }

    #[test]
    fn unclassified_elements_are_left_intact() {
        let (pipeline, _history) = test_pipeline();
        let out = structured(
            &pipeline,
            json!({ "AddMsgList": [{
                "MsgType": 1,
                "MMPeerUserName": "u4",
                "MMActualContent": "hello",
                "MMDigest": "hello",
            }] }),
        );

        let element = &out["AddMsgList"][0];
        assert_eq!(element["MsgType"], json!(1));
        assert_eq!(element["MMDigest"], json!("hello"));
    }

    #[tokio::test]
    async fn classified_messages_reach_history() {
        let (pipeline, history) = test_pipeline();
        structured(
            &pipeline,
            json!({ "AddMsgList": [{ "MsgType": 10002, "MMPeerUserName": "u5" }] }),
        );

        // The append is deferred; poll until the store has caught up.
        for _ in 0..200 {
            if !history.read_all("u5").await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let record = history.read_all("u5").await;
        assert_eq!(record.len(), 1);
        assert_eq!(record[0].kind(), MsgKind::SystemRecallNotice);
        assert_eq!(record[0].digest(), config::RECALL_PLACEHOLDER);
    }

    #[test]
    fn context_menu_anchor_is_spliced_exactly_once() {
        let source = "<div ng-click=\"optionMenu();\">menu</div> editAreaKeydown($event)".to_string();
        let out = splice_template_hooks(source);

        assert_eq!(out.matches("shareMenu();").count(), 1);
        assert!(out.contains("optionMenu();shareMenu();"));
        // The mention path must stay untouched when the menu anchor matched.
        assert!(!out.contains("mentionMenu($event)"));
    }

    #[test]
    fn mention_anchor_is_spliced_when_menu_anchor_absent() {
        let source = "<pre ng-keydown=\"editAreaKeydown($event)\"></pre>".to_string();
        let out = splice_template_hooks(source);
        assert!(out.contains("editAreaKeydown($event);mentionMenu($event)"));
    }

    #[test]
    fn unmatched_template_passes_through() {
        let source = "<div>plain template</div>".to_string();
        assert_eq!(splice_template_hooks(source.clone()), source);
    }
}
