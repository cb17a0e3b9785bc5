use aurora_core::{Address, Block, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope missing '{0}' field")]
    MissingField(&'static str),
    #[error("envelope 'data' field has the wrong shape for tag '{0}'")]
    MalformedPayload(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Tx(Transaction),
    ShareBlock {
        block: Block,
        host: String,
        port: u16,
    },
    RequestChain,
    Chain {
        blocks: Vec<Block>,
    },
    ChooseCreator,
    Creator,
    Signature {
        signature: String,
        address: Address,
    },
    FinalizeBlock(Block),
    Rebroadcast {
        host: String,
        port: u16,
        block: Block,
    },
    Disconnect {
        host: String,
        port: u16,
    },
    Unknown(String),
}

impl Message {
    pub fn tag(&self) -> &str {
        match self {
            Message::Tx(_) => "tx",
            Message::ShareBlock { .. } => "share_block",
            Message::RequestChain => "request_chain",
            Message::Chain { .. } => "chain",
            Message::ChooseCreator => "choose_creator",
            Message::Creator => "creator",
            Message::Signature { .. } => "signature",
            Message::FinalizeBlock(_) => "finalize_block",
            Message::Rebroadcast { .. } => "rebroadcast",
            Message::Disconnect { .. } => "disconnect",
            Message::Unknown(tag) => tag,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let envelope = match self {
            Message::Tx(tx) => envelope_with_data("tx", tx)?,
            Message::ShareBlock { block, host, port } => envelope_with_data(
                "share_block",
                &serde_json::json!({ "block": block, "host": host, "port": port }),
            )?,
            Message::RequestChain => envelope_without_data("request_chain"),
            Message::Chain { blocks } => {
                envelope_with_data("chain", &serde_json::json!({ "blocks": blocks }))?
            }
            Message::ChooseCreator => envelope_without_data("choose_creator"),
            Message::Creator => envelope_without_data("creator"),
            Message::Signature { signature, address } => envelope_with_data(
                "signature",
                &serde_json::json!({ "signature": signature, "address": address }),
            )?,
            Message::FinalizeBlock(block) => envelope_with_data("finalize_block", block)?,
            Message::Rebroadcast { host, port, block } => envelope_with_data(
                "rebroadcast",
                &serde_json::json!({ "host": host, "port": port, "block": block }),
            )?,
            Message::Disconnect { host, port } => envelope_with_data(
                "disconnect",
                &serde_json::json!({ "host": host, "port": port }),
            )?,
            Message::Unknown(tag) => envelope_without_data(tag),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        let data = envelope.data.unwrap_or(Value::Null);

        let message = match envelope.message_type.as_str() {
            "tx" => Message::Tx(serde_json::from_value(data).map_err(|_| {
                CodecError::MalformedPayload("tx")
            })?),
            "share_block" => {
                let obj = ShareBlockPayload::from_value(data)?;
                Message::ShareBlock {
                    block: obj.block,
                    host: obj.host,
                    port: obj.port,
                }
            }
            "request_chain" => Message::RequestChain,
            "chain" => {
                let obj: ChainPayload = serde_json::from_value(data)
                    .map_err(|_| CodecError::MalformedPayload("chain"))?;
                Message::Chain { blocks: obj.blocks }
            }
            "choose_creator" => Message::ChooseCreator,
            "creator" => Message::Creator,
            "signature" => {
                let obj: SignaturePayload = serde_json::from_value(data)
                    .map_err(|_| CodecError::MalformedPayload("signature"))?;
                Message::Signature {
                    signature: obj.signature,
                    address: obj.address,
                }
            }
            "finalize_block" => Message::FinalizeBlock(
                serde_json::from_value(data).map_err(|_| CodecError::MalformedPayload("finalize_block"))?,
            ),
            "rebroadcast" => {
                let obj: RebroadcastPayload = serde_json::from_value(data)
                    .map_err(|_| CodecError::MalformedPayload("rebroadcast"))?;
                Message::Rebroadcast {
                    host: obj.host,
                    port: obj.port,
                    block: obj.block,
                }
            }
            "disconnect" => {
                let obj: DisconnectPayload = serde_json::from_value(data)
                    .map_err(|_| CodecError::MalformedPayload("disconnect"))?;
                Message::Disconnect {
                    host: obj.host,
                    port: obj.port,
                }
            }
            other => Message::Unknown(other.to_string()),
        };
        Ok(message)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    data: Option<Value>,
}

fn envelope_with_data<T: Serialize>(tag: &str, data: &T) -> Result<Value, CodecError> {
    Ok(serde_json::json!({ "type": tag, "data": serde_json::to_value(data)? }))
}

fn envelope_without_data(tag: &str) -> Value {
    serde_json::json!({ "type": tag })
}

#[derive(Debug, Deserialize)]
struct ShareBlockPayload {
    block: Block,
    host: String,
    #[serde(deserialize_with = "deserialize_port")]
    port: u16,
}

impl ShareBlockPayload {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        serde_json::from_value(value).map_err(|_| CodecError::MalformedPayload("share_block"))
    }
}

#[derive(Debug, Deserialize)]
struct ChainPayload {
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct SignaturePayload {
    signature: String,
    address: String,
}

#[derive(Debug, Deserialize)]
struct RebroadcastPayload {
    host: String,
    #[serde(deserialize_with = "deserialize_port")]
    port: u16,
    block: Block,
}

#[derive(Debug, Deserialize)]
struct DisconnectPayload {
    host: String,
    #[serde(deserialize_with = "deserialize_port")]
    port: u16,
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }
    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(n) => Ok(n),
        PortRepr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
