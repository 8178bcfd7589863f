use core::fmt::Write as _;

use embedded_can::Frame as _;

use crate::frame::CanFrame;

/// Worst case line: prefix + flags + identifier + bracketed length + 8 hex groups.
const MAX_LINE: usize = "RCV 00000000 00000000 [8]".len() + 8 * 3;

/// Formats received frames into log lines.
///
/// The renderer owns its line buffer and clears it before every frame, so a
/// short frame can never carry leftover text from a longer predecessor. One
/// renderer lives inside the receiver task; it is not shared.
pub struct FrameRenderer {
    line: String,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self {
            line: String::with_capacity(MAX_LINE),
        }
    }

    /// Render `frame` as `RCV <flags> <identifier> [<len>] <payload hex>`.
    ///
    /// Flags and identifier are fixed-width uppercase hex, payload bytes are
    /// two-digit uppercase hex groups in receipt order. A zero-length frame
    /// renders no groups.
    pub fn render(&mut self, frame: &CanFrame) -> &str {
        self.line.clear();
        // Writing into a String cannot fail.
        let _ = write!(
            self.line,
            "RCV {:08X} {:08X} [{}]",
            frame.flags(),
            frame.id_raw(),
            frame.dlc()
        );
        for byte in frame.data() {
            let _ = write!(self.line, " {:02X}", byte);
        }
        &self.line
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fixtures::{extended, standard};
    use embedded_can::{Frame as _, StandardId};

    /// Hex groups after the `[len]` field.
    fn payload_groups(line: &str) -> Vec<&str> {
        let (_, body) = line.split_once(']').unwrap();
        body.split_whitespace().collect()
    }

    #[test]
    fn renders_slave_data_frame() {
        let mut renderer = FrameRenderer::new();
        let line = renderer.render(&standard(0x0B1, &[0x01, 0xA0, 0xFF]));
        assert_eq!(line, "RCV 00000000 000000B1 [3] 01 A0 FF");
    }

    #[test]
    fn group_count_follows_data_length() {
        let mut renderer = FrameRenderer::new();
        for len in 0..=8usize {
            let payload: Vec<u8> = (0..len as u8).collect();
            let line = renderer.render(&standard(0x123, &payload));
            let groups = payload_groups(line);
            assert_eq!(groups.len(), len, "line {line:?}");
            for (group, byte) in groups.iter().zip(&payload) {
                assert_eq!(*group, format!("{byte:02X}"));
            }
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let mut renderer = FrameRenderer::new();
        let frame = standard(0x2A0, &[0xDE, 0xAD]);
        let first = renderer.render(&frame).to_owned();
        assert_eq!(renderer.render(&frame), first);
    }

    #[test]
    fn empty_frame_keeps_no_residue() {
        let mut renderer = FrameRenderer::new();
        renderer.render(&standard(0x100, &[0xFF; 8]));
        let line = renderer.render(&standard(0x101, &[]));
        assert_eq!(line, "RCV 00000000 00000101 [0]");
        assert!(payload_groups(line).is_empty());
    }

    #[test]
    fn shrinking_lengths_keep_their_own_groups() {
        let mut renderer = FrameRenderer::new();
        let first = renderer
            .render(&standard(0x200, &[1, 2, 3, 4, 5]))
            .to_owned();
        let second = renderer.render(&standard(0x201, &[6, 7])).to_owned();
        assert_eq!(payload_groups(&first).len(), 5);
        assert_eq!(payload_groups(&second).len(), 2);
    }

    #[test]
    fn extended_and_remote_frames_carry_flags() {
        let mut renderer = FrameRenderer::new();
        let line = renderer.render(&extended(0x1ABCDEF0, &[0x42]));
        assert_eq!(line, "RCV 00000001 1ABCDEF0 [1] 42");

        let remote = CanFrame::new_remote(StandardId::new(0x321).unwrap(), 2).unwrap();
        let line = renderer.render(&remote);
        assert_eq!(line, "RCV 00000002 00000321 [2] 00 00");
    }
}
