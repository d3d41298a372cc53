use log::warn;

use crate::token::TokenInterner;

/// Chunks shorter than this carry too little signal to classify.
pub const MIN_CLASSIFY_LEN: usize = 5;
/// Leading bytes used as the blackbox clustering key.
pub const PREFIX_LEN: usize = 32;
/// Unclassified prefixes held before a clustering pass runs.
pub const WINDOW_SIZE: usize = 100;
/// Repeats within one window needed to promote a prefix.
pub const PROMOTE_THRESHOLD: usize = 10;
/// Hard cap on distinct blackbox classes.
pub const MAX_BLACKBOX_CLASSES: usize = 32;

/// Protocol operations that finish a transaction's path.
pub const TERMINAL_COMMANDS: [&str; 2] = ["/apply", "/abort"];

/// Result of classifying one proxied chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Structured match: an HTTP command aimed at a node, with the
    /// transaction key when the body carried one.
    Request {
        token: u32,
        command: String,
        trid: Option<String>,
        terminal: bool,
    },
    /// Unparsable traffic that clustered into a known prefix class.
    Blackbox { token: u32 },
    /// Nothing usable; too short, or not (yet) a known cluster.
    Unknown,
}

/// Per-connection carry-over between chunks.
///
/// An HTTP header and its JSON body may arrive in separate reads; the
/// command is held here until the chunk with the trid shows up.
#[derive(Debug, Default)]
pub struct ChunkCarry {
    pending_command: Option<String>,
}

/// Turns raw proxied bytes into tokens over a single shared alphabet.
///
/// Structured HTTP traffic becomes a `"port,command"` token; everything
/// else goes through sliding-window frequency clustering of leading
/// prefixes, so novelty can be tracked even over traffic whose structure
/// is not understood.
pub struct SequenceClassifier {
    interner: TokenInterner,
    window: Vec<String>,
    blackbox_classes: usize,
}

impl SequenceClassifier {
    pub fn new() -> Self {
        SequenceClassifier {
            interner: TokenInterner::new(),
            window: Vec::with_capacity(WINDOW_SIZE),
            blackbox_classes: 0,
        }
    }

    /// Current distinct token count, for frequency-table bucket sizing.
    pub fn alphabet_len(&self) -> usize {
        self.interner.len()
    }

    pub fn token_names(&self) -> Vec<String> {
        self.interner.names()
    }

    /// Classify one chunk read from the client->server leg of a proxied
    /// connection to the node listening on `backend_port`.
    pub fn classify(
        &mut self,
        backend_port: u16,
        chunk: &[u8],
        carry: &mut ChunkCarry,
    ) -> Classification {
        let text = String::from_utf8_lossy(chunk);
        let command = parse_command(&text);
        let trid = parse_trid(&text);

        if let Some(command) = command {
            // remember a header whose body has not arrived yet
            carry.pending_command = if trid.is_none() {
                Some(command.clone())
            } else {
                None
            };
            return self.request(backend_port, command, trid);
        }

        if trid.is_some() {
            if let Some(command) = carry.pending_command.take() {
                return self.request(backend_port, command, trid);
            }
        }

        self.classify_blackbox(chunk)
    }

    fn request(&mut self, backend_port: u16, command: String, trid: Option<String>) -> Classification {
        let token = self.interner.intern(&format!("{},{}", backend_port, command));
        let terminal = TERMINAL_COMMANDS.contains(&command.as_str());
        Classification::Request {
            token,
            command,
            trid,
            terminal,
        }
    }

    fn classify_blackbox(&mut self, chunk: &[u8]) -> Classification {
        if chunk.len() < MIN_CLASSIFY_LEN {
            return Classification::Unknown;
        }

        let prefix = normalize_prefix(chunk);
        if let Some(token) = self.interner.get(&prefix) {
            return Classification::Blackbox { token };
        }

        self.window.push(prefix.clone());
        if self.window.len() >= WINDOW_SIZE {
            self.cluster_window();
        }

        match self.interner.get(&prefix) {
            Some(token) => Classification::Blackbox { token },
            None => Classification::Unknown,
        }
    }

    /// Sort the filled window, count runs of identical prefixes and
    /// promote the ones repeated past the threshold.
    fn cluster_window(&mut self) {
        self.window.sort();

        let mut start = 0;
        while start < self.window.len() {
            let mut end = start + 1;
            while end < self.window.len() && self.window[end] == self.window[start] {
                end += 1;
            }
            if end - start > PROMOTE_THRESHOLD {
                self.promote(start);
            }
            start = end;
        }

        self.window.clear();
    }

    fn promote(&mut self, window_idx: usize) {
        if self.blackbox_classes >= MAX_BLACKBOX_CLASSES {
            warn!(
                "no capacity for new blackbox class {:?}, classification degrades to unknown",
                self.window[window_idx]
            );
            return;
        }
        self.blackbox_classes += 1;
        self.interner.intern(&self.window[window_idx]);
    }
}

impl Default for SequenceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the PUT target path, tolerant of `\n` and `\r\n` endings.
fn parse_command(text: &str) -> Option<String> {
    let start = text.find("PUT /")?;
    let rest = &text[start + 4..];

    let mut len = 1;
    for c in rest[1..].chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            len += c.len_utf8();
        } else {
            break;
        }
    }
    if len == 1 {
        return None;
    }
    Some(rest[..len].to_string())
}

/// Extract the value of a `"trid":"..."` body field.
fn parse_trid(text: &str) -> Option<String> {
    let idx = text.find("\"trid\":\"")?;
    let rest = &text[idx + 8..];
    let end = rest.find('"')?;
    let value = &rest[..end];
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(value.to_string())
}

/// Leading prefix with line endings folded to spaces.
fn normalize_prefix(chunk: &[u8]) -> String {
    let head = &chunk[..chunk.len().min(PREFIX_LEN)];
    String::from_utf8_lossy(head)
        .replace("\r\n", " ")
        .replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(
        classifier: &mut SequenceClassifier,
        carry: &mut ChunkCarry,
        text: &str,
    ) -> Classification {
        classifier.classify(14001, text.as_bytes(), carry)
    }

    #[test]
    fn test_put_with_reversed_line_endings() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        let chunk = "PUT /vote HTTP/1.1\n\r\
                     Content-Type: application/json; utf-8\n\r\
                     Host: localhost:14001\n\r\
                     \n\r\
                     {\"qa\":\"as\",\"a\":\"1\",\"trid\":\"24003\"}";
        match classify_str(&mut classifier, &mut carry, chunk) {
            Classification::Request {
                command,
                trid,
                terminal,
                ..
            } => {
                assert_eq!(command, "/vote");
                assert_eq!(trid.as_deref(), Some("24003"));
                assert!(!terminal);
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_put_apply_is_terminal() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        let chunk = "PUT /apply HTTP/1.1\r\n\
                     Content-Length: 52\r\n\
                     \r\n\
                     {\"a\":\"1\",\"trid\":\"24001\"}";
        match classify_str(&mut classifier, &mut carry, chunk) {
            Classification::Request {
                command,
                trid,
                terminal,
                ..
            } => {
                assert_eq!(command, "/apply");
                assert_eq!(trid.as_deref(), Some("24001"));
                assert!(terminal);
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_newline_endings() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        let chunk = "PUT /commit HTTP/1.1\n\
                     Host: localhost:14001\n\
                     \n\
                     {\"z\":\"AA\",\"trid\":\"24003\"}";
        match classify_str(&mut classifier, &mut carry, chunk) {
            Classification::Request { command, trid, .. } => {
                assert_eq!(command, "/commit");
                assert_eq!(trid.as_deref(), Some("24003"));
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_body_in_later_chunk() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        let header = "PUT /vote HTTP/1.1\r\nContent-Length: 24\r\n\r\n";
        let first = classify_str(&mut classifier, &mut carry, header);
        match &first {
            Classification::Request { command, trid, .. } => {
                assert_eq!(command, "/vote");
                assert!(trid.is_none());
            }
            other => panic!("expected request, got {:?}", other),
        }

        // the body arrives on its own and is attributed to the held command
        let body = "{\"a\":\"1\",\"trid\":\"89537\"}";
        match classify_str(&mut classifier, &mut carry, body) {
            Classification::Request { command, trid, token, .. } => {
                assert_eq!(command, "/vote");
                assert_eq!(trid.as_deref(), Some("89537"));
                if let Classification::Request { token: first_token, .. } = first {
                    assert_eq!(token, first_token);
                }
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_same_command_same_token() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        let a = classify_str(
            &mut classifier,
            &mut carry,
            "PUT /vote HTTP/1.1\r\n\r\n{\"trid\":\"1\"}",
        );
        let b = classify_str(
            &mut classifier,
            &mut carry,
            "PUT /vote HTTP/1.1\r\n\r\n{\"trid\":\"2\"}",
        );
        match (a, b) {
            (
                Classification::Request { token: ta, .. },
                Classification::Request { token: tb, .. },
            ) => assert_eq!(ta, tb),
            other => panic!("expected two requests, got {:?}", other),
        }
    }

    #[test]
    fn test_short_chunk_is_unknown() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();
        assert_eq!(
            classifier.classify(14001, b"ab", &mut carry),
            Classification::Unknown
        );
    }

    #[test]
    fn test_blackbox_promotion() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        // fill a window with one dominant prefix and unique noise
        for i in 0..WINDOW_SIZE {
            let chunk = if i % 2 == 0 {
                "opaque-protocol-frame".to_string()
            } else {
                format!("noise-{:04}", i)
            };
            classifier.classify(14001, chunk.as_bytes(), &mut carry);
        }

        // the dominant prefix was promoted to a permanent token
        match classifier.classify(14001, b"opaque-protocol-frame", &mut carry) {
            Classification::Blackbox { .. } => {}
            other => panic!("expected blackbox, got {:?}", other),
        }
        // the noise was not
        assert_eq!(
            classifier.classify(14001, b"noise-0001", &mut carry),
            Classification::Unknown
        );
    }

    #[test]
    fn test_blackbox_capacity_cap() {
        let mut classifier = SequenceClassifier::new();
        let mut carry = ChunkCarry::default();

        // promote one class per window until past the cap
        for class in 0..(MAX_BLACKBOX_CLASSES + 2) {
            let dominant = format!("frame-type-{:02}", class);
            for i in 0..WINDOW_SIZE {
                let chunk = if i % 2 == 0 {
                    dominant.clone()
                } else {
                    format!("noise-{}-{:04}", class, i)
                };
                classifier.classify(14001, chunk.as_bytes(), &mut carry);
            }
        }

        assert_eq!(classifier.alphabet_len(), MAX_BLACKBOX_CLASSES);
        // classes past the cap stay unknown
        let over = format!("frame-type-{:02}", MAX_BLACKBOX_CLASSES + 1);
        assert_eq!(
            classifier.classify(14001, over.as_bytes(), &mut carry),
            Classification::Unknown
        );
    }
}
