#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Bytes received from the remote.
    Output,
    /// A line submitted locally, prompt included.
    Command,
    /// Status written by the session itself (connection lost, closed).
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub bytes: Vec<u8>,
}

impl TranscriptEntry {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Append-only history of one session, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&mut self, chunk: &[u8]) {
        self.push(EntryKind::Output, chunk.to_vec());
    }

    pub fn push_command(&mut self, line: impl Into<String>) {
        self.push(EntryKind::Command, line.into().into_bytes());
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.push(EntryKind::Notice, text.into().into_bytes());
    }

    fn push(&mut self, kind: EntryKind, bytes: Vec<u8>) {
        self.entries.push(TranscriptEntry { kind, bytes });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every output chunk, concatenated exactly as received.
    pub fn output_bytes(&self) -> Vec<u8> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Output)
            .flat_map(|entry| entry.bytes.iter().copied())
            .collect()
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output_bytes()).into_owned()
    }

    /// Display lines. Output runs across chunk boundaries; commands and notices
    /// always start and end their own line. An empty trailing line is omitted.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut index = 0;

        while index < self.entries.len() {
            let entry = &self.entries[index];
            match entry.kind {
                EntryKind::Output => {
                    // Decode a whole run at once so multi-byte characters split
                    // across chunks survive.
                    let mut run = Vec::new();
                    while let Some(next) = self.entries.get(index) {
                        if next.kind != EntryKind::Output {
                            break;
                        }
                        run.extend_from_slice(&next.bytes);
                        index += 1;
                    }
                    for byte in run {
                        match byte {
                            b'\n' => lines.push(decode_line(&mut current)),
                            b'\r' => {}
                            other => current.push(other),
                        }
                    }
                    continue;
                }
                EntryKind::Command | EntryKind::Notice => {
                    if !current.is_empty() {
                        lines.push(decode_line(&mut current));
                    }
                    lines.push(entry.text());
                }
            }
            index += 1;
        }

        if !current.is_empty() {
            lines.push(decode_line(&mut current));
        }
        lines
    }
}

fn decode_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_join_into_one_line() {
        let mut transcript = Transcript::new();
        transcript.push_output(b"hello");
        transcript.push_output(b" world\n");
        assert_eq!(transcript.output_text(), "hello world\n");
        assert_eq!(transcript.lines(), vec!["hello world".to_string()]);
    }

    #[test]
    fn output_bytes_is_exact_concatenation() {
        let chunks: [&[u8]; 4] = [b"a\r\n", b"", b"\xe2\x82", b"\xac tail"];
        let mut transcript = Transcript::new();
        let mut expected = Vec::new();
        for chunk in chunks {
            transcript.push_output(chunk);
            expected.extend_from_slice(chunk);
        }
        assert_eq!(transcript.output_bytes(), expected);
        assert_eq!(transcript.lines(), vec!["a".to_string(), "€ tail".to_string()]);
    }

    #[test]
    fn commands_and_notices_get_their_own_lines() {
        let mut transcript = Transcript::new();
        transcript.push_output(b"prompt> ");
        transcript.push_command("root@web-01:~$ ls");
        transcript.push_output(b"bin etc\n");
        transcript.push_notice("[connection closed]");
        assert_eq!(
            transcript.lines(),
            vec![
                "prompt> ".to_string(),
                "root@web-01:~$ ls".to_string(),
                "bin etc".to_string(),
                "[connection closed]".to_string(),
            ]
        );
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn empty_command_line_is_kept() {
        let mut transcript = Transcript::new();
        transcript.push_command("");
        assert_eq!(transcript.lines(), vec![String::new()]);
        assert_eq!(transcript.entries()[0].kind, EntryKind::Command);
    }
}
