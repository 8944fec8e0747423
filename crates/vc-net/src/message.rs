use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use vc_transaction::now_secs;

use crate::NetError;

/// Message kinds dispatched on the wire, rendered as the `type` field of
/// the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Register,
    PeerList,
    Heartbeat,
    GetMiner,
    ChainRequest,
    ChainResponse,
    NewBlock,
    NewTransaction,
    /// Any `type` string this build does not recognize; logged and dropped
    /// by recipients.
    #[serde(other)]
    Unknown,
}

/// The wire envelope every message travels in:
/// `{ "type": <string>, "data": <any|null>, "timestamp": <float>, "sender": "<host>:<port>" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub data: Option<serde_json::Value>,
    pub timestamp: f64,
    pub sender: String,
}

impl Envelope {
    /// Build an envelope stamped with the current wall-clock time. The
    /// sender is the originating node's listening endpoint.
    pub fn new(
        kind: MessageType,
        data: Option<serde_json::Value>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            data,
            timestamp: now_secs(),
            sender: sender.into(),
        }
    }

    /// Deserialize the `data` field into a typed payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, NetError> {
        let data = self.data.clone().ok_or(NetError::MissingPayload)?;
        Ok(serde_json::from_value(data)?)
    }
}

/// `REGISTER` payload: the registrant's listening endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    pub host: String,
    pub port: u16,
}

/// `HEARTBEAT` payload: the sender's full serialized blockchain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatData {
    pub blockchain: serde_json::Value,
}

/// `GET_MINER` reply payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MinerInfo {
    pub miner_id: u64,
    pub difficulty: usize,
}

/// One peer's endpoint in a `PEER_LIST` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    /// `host:port`, the form used both for dialing and as peer ids.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `PEER_LIST` payload: peer id → endpoint.
pub type PeerList = BTreeMap<String, PeerAddr>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_types_render_as_wire_strings() {
        let cases = [
            (MessageType::Register, "\"REGISTER\""),
            (MessageType::PeerList, "\"PEER_LIST\""),
            (MessageType::Heartbeat, "\"HEARTBEAT\""),
            (MessageType::GetMiner, "\"GET_MINER\""),
            (MessageType::ChainRequest, "\"CHAIN_REQUEST\""),
            (MessageType::ChainResponse, "\"CHAIN_RESPONSE\""),
            (MessageType::NewBlock, "\"NEW_BLOCK\""),
            (MessageType::NewTransaction, "\"NEW_TRANSACTION\""),
        ];

        for (kind, wire) in cases {
            assert_eq!(serde_json::to_string(&kind).unwrap(), wire);
            assert_eq!(serde_json::from_str::<MessageType>(wire).unwrap(), kind);
        }
    }

    #[test]
    fn unrecognized_types_parse_as_unknown() {
        let parsed: MessageType = serde_json::from_str("\"GOSSIP_V2\"").unwrap();
        assert_eq!(parsed, MessageType::Unknown);
    }

    #[test]
    fn envelope_carries_the_four_wire_fields() {
        let envelope = Envelope::new(MessageType::ChainRequest, None, "127.0.0.1:5001");
        let value = serde_json::to_value(&envelope).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["type"], "CHAIN_REQUEST");
        assert_eq!(object["data"], serde_json::Value::Null);
        assert_eq!(object["sender"], "127.0.0.1:5001");
        assert!(object["timestamp"].is_f64());
        assert_eq!(object.len(), 4);
    }

    #[test]
    fn typed_payload_round_trips() {
        let data = serde_json::to_value(RegisterData {
            host: "127.0.0.1".into(),
            port: 5001,
        })
        .unwrap();
        let envelope = Envelope::new(MessageType::Register, Some(data), "127.0.0.1:5001");

        let parsed: RegisterData = envelope.payload().unwrap();
        assert_eq!(parsed.host, "127.0.0.1");
        assert_eq!(parsed.port, 5001);
    }

    #[test]
    fn missing_payload_is_an_error() {
        let envelope = Envelope::new(MessageType::ChainRequest, None, "a:1");
        assert!(matches!(
            envelope.payload::<RegisterData>(),
            Err(NetError::MissingPayload)
        ));
    }
}
