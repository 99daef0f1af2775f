use borsh::BorshDeserialize;
use skein_types::constants::MAX_MESSAGE_SIZE;
use skein_types::network::LedgerMessage;

use crate::error::NetError;
use crate::protocol::PROTOCOL_VERSION;

// Gossipsub frames each message itself, so the envelope carries no length
// prefix: `[1-byte protocol version][borsh payload]`.

/// Encode a LedgerMessage into a versioned byte vector for gossipsub.
pub fn encode_message(msg: &LedgerMessage) -> Result<Vec<u8>, NetError> {
    let data = borsh::to_vec(msg).map_err(|e| NetError::CodecError {
        reason: e.to_string(),
    })?;

    if 1 + data.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            size: 1 + data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut out = Vec::with_capacity(1 + data.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Decode a versioned byte slice received over gossipsub.
pub fn decode_message(data: &[u8]) -> Result<LedgerMessage, NetError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let Some((&version, payload)) = data.split_first() else {
        return Err(NetError::CodecError {
            reason: "message too short: missing protocol version byte".to_string(),
        });
    };

    if version != PROTOCOL_VERSION {
        return Err(NetError::VersionMismatch {
            peer: version,
            ours: PROTOCOL_VERSION,
        });
    }

    LedgerMessage::try_from_slice(payload).map_err(|e| NetError::CodecError {
        reason: e.to_string(),
    })
}
