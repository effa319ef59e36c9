/// Longest digit run accepted inside a marker; anything longer is plain text.
const MAX_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Text,
    /// After `[`, possibly with some digits.
    Marker,
}

/// Finds `[n]` citation markers in text that arrives in arbitrary fragments.
///
/// Only the pending digits after an unmatched `[` are carried between
/// fragments, so `"[" + "12]"` is seen as one marker.
#[derive(Debug, Clone)]
pub struct CitationScanner {
    state: ScanState,
    digits: String,
    cited: Vec<usize>,
}

impl Default for CitationScanner {
    fn default() -> Self { Self { state: ScanState::Text, digits: String::new(), cited: Vec::new() } }
}

impl CitationScanner {
    pub fn new() -> Self { Self::default() }

    pub fn feed(&mut self, fragment: &str) {
        for ch in fragment.chars() {
            self.step(ch);
        }
    }

    fn step(&mut self, ch: char) {
        match (self.state, ch) {
            (ScanState::Text, '[') | (ScanState::Marker, '[') => {
                self.state = ScanState::Marker;
                self.digits.clear();
            }
            (ScanState::Text, _) => {}
            (ScanState::Marker, d) if d.is_ascii_digit() && self.digits.len() < MAX_DIGITS => self.digits.push(d),
            (ScanState::Marker, ']') if !self.digits.is_empty() => {
                if let Ok(n) = self.digits.parse::<usize>() {
                    if n > 0 && !self.cited.contains(&n) { self.cited.push(n); }
                }
                self.state = ScanState::Text;
            }
            (ScanState::Marker, _) => self.state = ScanState::Text,
        }
    }

    /// Distinct indices in order of first appearance.
    pub fn cited(&self) -> &[usize] { &self.cited }
}
