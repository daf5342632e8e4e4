//! Scans a growing byte buffer for the ESP32 frame marker
//! `0xFF 0xA0 0xFF 0xA1`, followed by a 2-byte little-endian length and
//! that many bytes of JPEG payload.

const MARKER: [u8; 4] = [0xFF, 0xA0, 0xFF, 0xA1];

/// Extracts the first complete frame from `buf`, if any, returning the
/// JPEG payload and the number of bytes consumed from the front of `buf`
/// (marker + length prefix + payload). Bytes before the marker are
/// consumed as noise; returns `None` if no complete frame is present yet.
pub fn extract_frame(buf: &[u8]) -> Option<(Vec<u8>, usize)> {
    let marker_pos = buf.windows(MARKER.len()).position(|w| w == MARKER)?;
    let header_end = marker_pos + MARKER.len();
    if buf.len() < header_end + 2 {
        return None;
    }
    let len = u16::from_le_bytes([buf[header_end], buf[header_end + 1]]) as usize;
    let payload_start = header_end + 2;
    let payload_end = payload_start + len;
    if buf.len() < payload_end {
        return None;
    }
    Some((buf[payload_start..payload_end].to_vec(), payload_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut buf = MARKER.to_vec();
        buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn extracts_a_complete_frame() {
        let payload = b"fake-jpeg-bytes";
        let buf = framed(payload);
        let (extracted, consumed) = extract_frame(&buf).unwrap();
        assert_eq!(extracted, payload);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn returns_none_on_incomplete_payload() {
        let payload = b"fake-jpeg-bytes";
        let mut buf = framed(payload);
        buf.truncate(buf.len() - 3);
        assert!(extract_frame(&buf).is_none());
    }

    #[test]
    fn skips_noise_before_the_marker() {
        let payload = b"abc";
        let mut buf = vec![0x00, 0x11, 0x22];
        buf.extend_from_slice(&framed(payload));
        let (extracted, consumed) = extract_frame(&buf).unwrap();
        assert_eq!(extracted, payload);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn extracts_only_the_first_frame_when_two_are_queued() {
        let mut buf = framed(b"one");
        buf.extend_from_slice(&framed(b"two"));
        let (first, consumed) = extract_frame(&buf).unwrap();
        assert_eq!(first, b"one");
        let (second, _) = extract_frame(&buf[consumed..]).unwrap();
        assert_eq!(second, b"two");
    }
}
