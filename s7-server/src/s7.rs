//! S7 PDU codec: headers, read/write items, response assembly.

use byteorder::{BigEndian, ByteOrder};

pub const PROTO_ID: u8 = 0x32;

pub const ROSCTR_JOB: u8 = 0x01;
pub const ROSCTR_ACK_DATA: u8 = 0x03;
pub const ROSCTR_USERDATA: u8 = 0x07;

pub const FUNC_SETUP_COMMUNICATION: u8 = 0xf0;
pub const FUNC_READ_VAR: u8 = 0x04;
pub const FUNC_WRITE_VAR: u8 = 0x05;

/// Item return codes.
pub const RC_SUCCESS: u8 = 0xff;
pub const RC_ADDRESS_ERROR: u8 = 0x05;

/// Data transport sizes used in responses.
pub const TRANSPORT_BIT: u8 = 0x03;
pub const TRANSPORT_BYTES: u8 = 0x04;
pub const TRANSPORT_OCTETS: u8 = 0x09;

/// Whole-PDU error for requests the server does not implement.
pub const ERROR_INVALID_FUNCTION: (u8, u8) = (0x80, 0x01);
pub const ERROR_NONE: (u8, u8) = (0, 0);

const JOB_HEADER_LEN: usize = 10;
const ACK_HEADER_LEN: usize = 12;

/// One decoded S7 message (any direction).
pub struct S7Message<'a> {
    pub rosctr: u8,
    pub pdu_ref: u16,
    pub params: &'a [u8],
    pub data: &'a [u8],
}

pub fn parse(payload: &[u8]) -> Option<S7Message<'_>> {
    if payload.len() < JOB_HEADER_LEN || payload[0] != PROTO_ID {
        return None;
    }
    let rosctr = payload[1];
    let header_len = if rosctr == ROSCTR_ACK_DATA {
        ACK_HEADER_LEN
    } else {
        JOB_HEADER_LEN
    };
    if payload.len() < header_len {
        return None;
    }
    let pdu_ref = BigEndian::read_u16(&payload[4..6]);
    let param_len = BigEndian::read_u16(&payload[6..8]) as usize;
    let data_len = BigEndian::read_u16(&payload[8..10]) as usize;
    if payload.len() < header_len + param_len + data_len {
        return None;
    }
    Some(S7Message {
        rosctr,
        pdu_ref,
        params: &payload[header_len..header_len + param_len],
        data: &payload[header_len + param_len..header_len + param_len + data_len],
    })
}

/// Assembles an S7 message; ack-data messages carry the error pair.
pub fn build(rosctr: u8, pdu_ref: u16, error: (u8, u8), params: &[u8], data: &[u8]) -> Vec<u8> {
    let header_len = if rosctr == ROSCTR_ACK_DATA {
        ACK_HEADER_LEN
    } else {
        JOB_HEADER_LEN
    };
    let mut message = vec![0u8; header_len];
    message[0] = PROTO_ID;
    message[1] = rosctr;
    BigEndian::write_u16(&mut message[4..6], pdu_ref);
    BigEndian::write_u16(&mut message[6..8], params.len() as u16);
    BigEndian::write_u16(&mut message[8..10], data.len() as u16);
    if rosctr == ROSCTR_ACK_DATA {
        message[10] = error.0;
        message[11] = error.1;
    }
    message.extend_from_slice(params);
    message.extend_from_slice(data);
    message
}

/// One S7ANY addressing item of a read or write request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemRequest {
    pub transport: u8,
    pub count: u16,
    pub db: u16,
    pub area_code: u8,
    pub address: u32,
}

const ITEM_LEN: usize = 12;

impl ItemRequest {
    fn parse(bytes: &[u8]) -> Option<ItemRequest> {
        if bytes.len() < ITEM_LEN || bytes[0] != 0x12 || bytes[1] != 0x0a || bytes[2] != 0x10 {
            return None;
        }
        Some(ItemRequest {
            transport: bytes[3],
            count: BigEndian::read_u16(&bytes[4..6]),
            db: BigEndian::read_u16(&bytes[6..8]),
            area_code: bytes[8],
            address: BigEndian::read_u24(&bytes[9..12]),
        })
    }

    /// Byte offset inside the area; S7 addresses are bit addresses.
    pub fn byte_offset(&self) -> usize {
        (self.address >> 3) as usize
    }

    pub fn bit(&self) -> u8 {
        (self.address & 0x7) as u8
    }

    /// Single-bit access?
    pub fn is_bit_access(&self) -> bool {
        self.transport == 0x01
    }

    /// Requested length in bytes; `None` for transport sizes the server
    /// does not serve.
    pub fn byte_len(&self) -> Option<usize> {
        let count = self.count as usize;
        match self.transport {
            0x01 => (count == 1).then_some(1),
            0x02 | 0x03 => Some(count),       // byte, char
            0x04 | 0x05 => Some(count * 2),   // word, int
            0x06 | 0x07 | 0x08 => Some(count * 4), // dword, dint, real
            _ => None,
        }
    }
}

/// Parses the item list of a read/write request's parameters:
/// `[function, item_count, items...]`.
pub fn parse_items(params: &[u8]) -> Option<Vec<ItemRequest>> {
    if params.len() < 2 {
        return None;
    }
    let count = params[1] as usize;
    let mut items = Vec::with_capacity(count);
    let mut rest = &params[2..];
    for _ in 0..count {
        let item = ItemRequest::parse(rest)?;
        items.push(item);
        rest = &rest[ITEM_LEN..];
    }
    Some(items)
}

/// One value of a write request's data section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteValue<'a> {
    pub transport: u8,
    pub bytes: &'a [u8],
}

/// Parses the data section of a write request: per item
/// `[reserved, transport, length, value...]` with even padding between
/// items.
pub fn parse_write_values<'a>(data: &'a [u8], count: usize) -> Option<Vec<WriteValue<'a>>> {
    let mut values = Vec::with_capacity(count);
    let mut rest = data;
    for index in 0..count {
        if rest.len() < 4 {
            return None;
        }
        let transport = rest[1];
        let length = BigEndian::read_u16(&rest[2..4]) as usize;
        let byte_len = match transport {
            TRANSPORT_BIT => 1,
            TRANSPORT_BYTES => length / 8,
            TRANSPORT_OCTETS => length,
            _ => return None,
        };
        if rest.len() < 4 + byte_len {
            return None;
        }
        values.push(WriteValue {
            transport,
            bytes: &rest[4..4 + byte_len],
        });
        let mut consumed = 4 + byte_len;
        // Values are padded to even offsets between items.
        if index + 1 < count && consumed % 2 == 1 {
            consumed += 1;
        }
        if rest.len() < consumed {
            return None;
        }
        rest = &rest[consumed..];
    }
    Some(values)
}

/// Accumulates the data section of a read response.
pub struct ReadResponseData {
    buf: Vec<u8>,
    items: usize,
    total: usize,
}

impl ReadResponseData {
    pub fn with_items(total: usize) -> ReadResponseData {
        ReadResponseData {
            buf: Vec::new(),
            items: 0,
            total,
        }
    }

    /// Appends a successful item; `bit` selects the bit transport.
    pub fn push_value(&mut self, bytes: &[u8], bit: bool) {
        let (transport, length) = if bit {
            (TRANSPORT_BIT, bytes.len())
        } else {
            (TRANSPORT_BYTES, bytes.len() * 8)
        };
        self.buf.push(RC_SUCCESS);
        self.buf.push(transport);
        let mut len_field = [0u8; 2];
        BigEndian::write_u16(&mut len_field, length as u16);
        self.buf.extend_from_slice(&len_field);
        self.buf.extend_from_slice(bytes);
        self.items += 1;
        self.pad();
    }

    /// Appends a failed item carrying only its return code.
    pub fn push_error(&mut self, return_code: u8) {
        self.buf.extend_from_slice(&[return_code, 0, 0, 0]);
        self.items += 1;
        self.pad();
    }

    fn pad(&mut self) {
        if self.items < self.total && self.buf.len() % 2 == 1 {
            self.buf.push(0);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
