// File: src/platforms/teamspeak/events.rs
//
// WebSocket subscription to the server's event gateway. Frames we do not
// care about are dropped here; only "client entered view" events reach the
// rest of the daemon.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::Error;
use crate::platforms::{ClientEnterView, ClientType, ConnectEventSource};

pub struct TsEventFeed {
    events_url: String,
    api_key: String,
    shutdown_rx: watch::Receiver<bool>,
}

impl TsEventFeed {
    pub fn new(events_url: &str, api_key: &str, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            events_url: events_url.to_string(),
            api_key: api_key.to_string(),
            shutdown_rx,
        }
    }
}

#[async_trait]
impl ConnectEventSource for TsEventFeed {
    async fn subscribe_connects(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<ClientEnterView>, Error> {
        let url = format!("{}?api-key={}", self.events_url, self.api_key);
        let (ws_stream, _response) = connect_async(&url).await?;
        let (_write_half, mut read_half) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            info!("TeamSpeak event feed connected");
            loop {
                select! {
                    msg_opt = read_half.next() => {
                        match msg_opt {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(event) = parse_enter_view(text.as_str()) {
                                    if tx.send(event).is_err() {
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("TeamSpeak event feed closed by server");
                                return;
                            }
                            Some(Ok(_)) => {
                                // ping/pong/binary frames
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "TeamSpeak event feed read error");
                                return;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("TeamSpeak event feed stopping");
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[derive(Debug, Deserialize)]
struct EventFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EnterViewData {
    client_database_id: String,
    #[serde(default)]
    client_type: Option<String>,
}

fn parse_enter_view(text: &str) -> Option<ClientEnterView> {
    let frame: EventFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "dropping unparsable event frame");
            return None;
        }
    };
    if frame.kind != "notifycliententerview" {
        return None;
    }
    let data: EnterViewData = match serde_json::from_value(frame.data) {
        Ok(data) => data,
        Err(e) => {
            debug!(error = %e, "dropping malformed cliententerview frame");
            return None;
        }
    };
    let client_db_id = match data.client_database_id.parse::<u64>() {
        Ok(id) => id,
        Err(_) => {
            debug!(raw = %data.client_database_id, "dropping event with bad database id");
            return None;
        }
    };
    let raw_type = data
        .client_type
        .as_deref()
        .and_then(|t| t.parse::<i64>().ok())
        .unwrap_or(0);
    Some(ClientEnterView {
        client_db_id,
        client_type: ClientType::from_raw(raw_type),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_voice_client_enter_view() {
        let frame = r#"{
            "type": "notifycliententerview",
            "data": {"clid": "12", "client_database_id": "5", "client_type": "0", "client_nickname": "alice"}
        }"#;

        let event = parse_enter_view(frame).expect("frame should parse");
        assert_eq!(event.client_db_id, 5);
        assert_eq!(event.client_type, ClientType::Voice);
    }

    #[test]
    fn query_clients_are_flagged_as_query() {
        let frame = r#"{
            "type": "notifycliententerview",
            "data": {"client_database_id": "9", "client_type": "1"}
        }"#;

        let event = parse_enter_view(frame).expect("frame should parse");
        assert_eq!(event.client_type, ClientType::Query);
    }

    #[test]
    fn unrelated_frames_are_dropped() {
        let frame = r#"{"type": "notifytextmessage", "data": {"msg": "hi"}}"#;
        assert!(parse_enter_view(frame).is_none());

        assert!(parse_enter_view("not json at all").is_none());

        let bad_id = r#"{
            "type": "notifycliententerview",
            "data": {"client_database_id": "abc", "client_type": "0"}
        }"#;
        assert!(parse_enter_view(bad_id).is_none());
    }
}
