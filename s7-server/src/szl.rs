//! SZL (system status list) identity answers, built from the `identity.*`
//! configuration strings.

use byteorder::{BigEndian, ByteOrder};

use crate::config::IdentityConfig;

/// Module identification.
pub const SZL_MODULE_IDENT: u16 = 0x0011;
/// Component identification.
pub const SZL_COMPONENT_IDENT: u16 = 0x001c;

const COMPONENT_RECORD_LEN: usize = 34;
const MODULE_RECORD_LEN: usize = 28;

fn fixed_string(out: &mut Vec<u8>, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let take = bytes.len().min(len);
    out.extend_from_slice(&bytes[..take]);
    out.resize(out.len() + len - take, b' ');
}

fn header(szl_id: u16, szl_index: u16, record_len: usize, record_count: usize) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    BigEndian::write_u16(&mut buf[0..2], szl_id);
    BigEndian::write_u16(&mut buf[2..4], szl_index);
    BigEndian::write_u16(&mut buf[4..6], record_len as u16);
    BigEndian::write_u16(&mut buf[6..8], record_count as u16);
    buf
}

/// Builds the SZL payload for `(szl_id, szl_index)`; `None` for lists the
/// server does not keep.
pub fn build(szl_id: u16, szl_index: u16, identity: &IdentityConfig) -> Option<Vec<u8>> {
    match szl_id {
        SZL_MODULE_IDENT => {
            // Records: module, basic hardware. Same order code, zeroed
            // version words.
            let records: &[(u16, &str)] =
                &[(0x0001, &identity.order_code), (0x0006, &identity.order_code)];
            let mut buf = header(szl_id, szl_index, MODULE_RECORD_LEN, records.len());
            for (index, order_code) in records {
                let mut record = Vec::with_capacity(MODULE_RECORD_LEN);
                record.extend_from_slice(&index.to_be_bytes());
                fixed_string(&mut record, order_code, 20);
                record.extend_from_slice(&[0u8; 6]);
                buf.extend_from_slice(&record);
            }
            Some(buf)
        }
        SZL_COMPONENT_IDENT => {
            let records: &[(u16, &str)] = &[
                (1, &identity.as_name),
                (2, &identity.module_name),
                (3, &identity.plant_id),
                (4, &identity.copyright),
                (5, &identity.serial_number),
            ];
            let mut buf = header(szl_id, szl_index, COMPONENT_RECORD_LEN, records.len());
            for (index, text) in records {
                let mut record = Vec::with_capacity(COMPONENT_RECORD_LEN);
                record.extend_from_slice(&index.to_be_bytes());
                fixed_string(&mut record, text, COMPONENT_RECORD_LEN - 2);
                buf.extend_from_slice(&record);
            }
            Some(buf)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_list_carries_the_identity_strings() {
        let identity = IdentityConfig {
            as_name: "STATION-1".to_string(),
            ..IdentityConfig::default()
        };
        let payload = build(SZL_COMPONENT_IDENT, 0, &identity).unwrap();
        assert_eq!(BigEndian::read_u16(&payload[0..2]), SZL_COMPONENT_IDENT);
        assert_eq!(BigEndian::read_u16(&payload[6..8]), 5);
        // First record: index 1 + padded as_name.
        assert_eq!(BigEndian::read_u16(&payload[8..10]), 1);
        assert_eq!(&payload[10..19], b"STATION-1");
        assert_eq!(payload[19], b' ');
        assert_eq!(payload.len(), 8 + 5 * COMPONENT_RECORD_LEN);
    }

    #[test]
    fn unknown_lists_are_refused() {
        assert!(build(0x0131, 0, &IdentityConfig::default()).is_none());
    }

    #[test]
    fn module_list_truncates_long_order_codes() {
        let identity = IdentityConfig {
            order_code: "X".repeat(40),
            ..IdentityConfig::default()
        };
        let payload = build(SZL_MODULE_IDENT, 0, &identity).unwrap();
        assert_eq!(payload.len(), 8 + 2 * MODULE_RECORD_LEN);
    }
}
