//! Binary encoding of executor options
//!
//! Layout of one executor record:
//!
//! ```text
//! worker_id: u8 (= 1) | length: u16 | option_type: u8 | [index: u16] | gas: u128 | [value: u128]
//! ```
//!
//! `length` counts the option type byte and the payload. A per-message-type
//! blob is the type-3 header `0x0003` followed by records, with `value`
//! omitted when it is zero. The combined blob concatenates
//! `message_type: u16 | blob_len: u16 | blob` groups in ascending message
//! type order and always writes `value`.

use super::{canonicalize, EnforcedOption, MessageType, OptionKind};
use crate::error::{BridgeError, BridgeResult};

const OPTIONS_TYPE_3: u16 = 3;
const EXECUTOR_WORKER_ID: u8 = 1;

const GAS_LEN: usize = 16;
const VALUE_LEN: usize = 16;
const INDEX_LEN: usize = 2;

/// Encode enforced options into the combined, canonically ordered blob
pub fn encode(options: &[EnforcedOption]) -> BridgeResult<Vec<u8>> {
    let sorted = canonicalize(options)?;
    let mut out = Vec::new();

    let mut start = 0;
    while start < sorted.len() {
        let message_type = sorted[start].message_type;
        let end = sorted[start..]
            .iter()
            .position(|o| o.message_type != message_type)
            .map(|offset| start + offset)
            .unwrap_or(sorted.len());

        let blob = type3_blob(&sorted[start..end], false);
        let blob_len = u16::try_from(blob.len()).map_err(|_| {
            BridgeError::InvalidOption(format!(
                "options for {:?} exceed {} bytes",
                message_type,
                u16::MAX
            ))
        })?;

        out.extend_from_slice(&message_type.as_u16().to_be_bytes());
        out.extend_from_slice(&blob_len.to_be_bytes());
        out.extend_from_slice(&blob);
        start = end;
    }

    Ok(out)
}

/// Decode a combined blob produced by [`encode`]
pub fn decode(bytes: &[u8]) -> BridgeResult<Vec<EnforcedOption>> {
    let mut reader = Reader::new(bytes);
    let mut options = Vec::new();
    let mut last_type: Option<MessageType> = None;

    while !reader.is_empty() {
        let message_type = MessageType::from_u16(reader.u16()?)?;
        if let Some(previous) = last_type {
            if message_type <= previous {
                return Err(BridgeError::MalformedOptions(format!(
                    "message type group {:?} out of order",
                    message_type
                )));
            }
        }
        last_type = Some(message_type);

        let blob_len = reader.u16()? as usize;
        let blob = reader.take(blob_len)?;
        options.extend(decode_type3(blob, message_type)?);
    }

    Ok(options)
}

/// Encode the type-3 options blob configured on chain for one message type.
///
/// Zero values are left out, byte for byte what `setEnforcedOptions`
/// receives from the LayerZero options builder. Returns `None` when no
/// option targets `message_type`.
pub fn encode_for_message_type(
    options: &[EnforcedOption],
    message_type: MessageType,
) -> BridgeResult<Option<Vec<u8>>> {
    let group: Vec<EnforcedOption> = canonicalize(options)?
        .into_iter()
        .filter(|o| o.message_type == message_type)
        .collect();

    if group.is_empty() {
        return Ok(None);
    }
    Ok(Some(type3_blob(&group, true)))
}

fn type3_blob(group: &[EnforcedOption], compact: bool) -> Vec<u8> {
    let mut blob = OPTIONS_TYPE_3.to_be_bytes().to_vec();
    for option in group {
        write_record(
            &mut blob,
            option.kind,
            option.compose_index,
            option.gas_limit,
            option.native_value,
            compact,
        );
    }
    blob
}

fn decode_type3(blob: &[u8], message_type: MessageType) -> BridgeResult<Vec<EnforcedOption>> {
    let mut reader = Reader::new(blob);
    let header = reader.u16()?;
    if header != OPTIONS_TYPE_3 {
        return Err(BridgeError::MalformedOptions(format!(
            "unsupported options type {}",
            header
        )));
    }

    let mut options = Vec::new();
    while !reader.is_empty() {
        let worker = reader.u8()?;
        if worker != EXECUTOR_WORKER_ID {
            return Err(BridgeError::MalformedOptions(format!(
                "unexpected worker id {}",
                worker
            )));
        }
        let length = reader.u16()? as usize;
        let record = reader.take(length)?;
        options.push(decode_record(record, message_type)?);
    }

    Ok(options)
}

fn decode_record(record: &[u8], message_type: MessageType) -> BridgeResult<EnforcedOption> {
    let mut reader = Reader::new(record);
    let kind = OptionKind::from_discriminant(reader.u8()?)?;

    let compose_index = match kind {
        OptionKind::Compose => Some(reader.u16()?),
        OptionKind::Receive => None,
    };

    let payload = reader.remaining();
    let (gas_limit, native_value) = match payload.len() {
        GAS_LEN => (be_u128(payload), 0),
        len if len == GAS_LEN + VALUE_LEN => {
            (be_u128(&payload[..GAS_LEN]), be_u128(&payload[GAS_LEN..]))
        }
        len => {
            return Err(BridgeError::MalformedOptions(format!(
                "{} record has invalid payload length {}",
                kind, len
            )))
        }
    };

    Ok(EnforcedOption {
        message_type,
        kind,
        compose_index,
        gas_limit,
        native_value,
    })
}

fn write_record(
    out: &mut Vec<u8>,
    kind: OptionKind,
    compose_index: Option<u16>,
    gas_limit: u128,
    native_value: u128,
    compact: bool,
) {
    let with_value = !(compact && native_value == 0);
    let mut payload_len = 1 + GAS_LEN;
    if compose_index.is_some() {
        payload_len += INDEX_LEN;
    }
    if with_value {
        payload_len += VALUE_LEN;
    }

    out.push(EXECUTOR_WORKER_ID);
    out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    out.push(kind.discriminant());
    if let Some(index) = compose_index {
        out.extend_from_slice(&index.to_be_bytes());
    }
    out.extend_from_slice(&gas_limit.to_be_bytes());
    if with_value {
        out.extend_from_slice(&native_value.to_be_bytes());
    }
}

fn be_u128(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(bytes);
    u128::from_be_bytes(buf)
}

/// Per-call executor options attached to a single send
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    records: Vec<u8>,
}

impl ExecutorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a minimum gas (and value) for `lzReceive` on the destination
    pub fn lz_receive(mut self, gas_limit: u128, native_value: u128) -> Self {
        write_record(
            &mut self.records,
            OptionKind::Receive,
            None,
            gas_limit,
            native_value,
            true,
        );
        self
    }

    /// Request a minimum gas (and value) for the compose call at `index`
    pub fn lz_compose(mut self, index: u16, gas_limit: u128, native_value: u128) -> Self {
        write_record(
            &mut self.records,
            OptionKind::Compose,
            Some(index),
            gas_limit,
            native_value,
            true,
        );
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = OPTIONS_TYPE_3.to_be_bytes().to_vec();
        out.extend_from_slice(&self.records);
        out
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> BridgeResult<&'a [u8]> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(BridgeError::MalformedOptions(format!(
                "truncated: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> BridgeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> BridgeResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn remaining(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }
}
