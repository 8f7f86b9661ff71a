//! LEB128 varint encoding used throughout the WebAssembly binary format.

pub fn write_uleb128(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

pub fn write_sleb128(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_bit_set = byte & 0x40 != 0;
        if (value == 0 && !sign_bit_set) || (value == -1 && sign_bit_set) {
            buf.push(byte);
            break;
        } else {
            buf.push(byte | 0x80);
        }
    }
}

/// Length-prefixes `body` with its own ULEB128 byte length, the shape
/// every section and every sized vector in the format uses.
pub fn with_length_prefix(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    write_uleb128(&mut out, body.len() as u64);
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uleb128_small_values_are_one_byte() {
        for v in [0u64, 1, 63, 127] {
            let mut buf = Vec::new();
            write_uleb128(&mut buf, v);
            assert_eq!(buf.len(), 1, "{v} should fit in one byte");
            assert_eq!(buf[0], v as u8);
        }
    }

    #[test]
    fn uleb128_continuation_bit_set_on_all_but_last_byte() {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, 300); // 0b1_0010_1100
        assert_eq!(buf, vec![0xac, 0x02]);
    }

    #[test]
    fn sleb128_encodes_negative_values() {
        let mut buf = Vec::new();
        write_sleb128(&mut buf, -1);
        assert_eq!(buf, vec![0x7f]);

        let mut buf = Vec::new();
        write_sleb128(&mut buf, -128);
        assert_eq!(buf, vec![0x80, 0x7f]);
    }

    #[test]
    fn length_prefix_matches_body_len() {
        let body = vec![1u8, 2, 3, 4, 5];
        let framed = with_length_prefix(body.clone());
        assert_eq!(framed[0], body.len() as u8);
        assert_eq!(&framed[1..], &body[..]);
    }
}
