use anyhow::bail;

/// Split one deck line into tokens. Single quotes group a token (and
/// may produce an empty one), `#` starts a comment outside quotes.
pub fn tokenize(line: &str) -> anyhow::Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match (in_quotes, c) {
            (true, '\'') => {
                tokens.push(std::mem::take(&mut current));
                in_quotes = false;
            }
            (true, _) => current.push(c),
            (false, '\'') => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                in_quotes = true;
            }
            (false, '#') => break,
            (false, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (false, _) => current.push(c),
        }
    }
    if in_quotes {
        bail!("unterminated quote in line: {}", line.trim());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Tokenised deck lines with their source line numbers, consumed one at
/// a time by the block parsers.
#[derive(Debug)]
pub struct LineParser {
    lines: Vec<(usize, Vec<String>)>,
    position: usize,
}

impl LineParser {
    pub fn new(contents: &str) -> anyhow::Result<Self> {
        let mut lines = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let tokens = tokenize(line).map_err(|e| anyhow::anyhow!("line {}: {}", number + 1, e))?;
            if !tokens.is_empty() {
                lines.push((number + 1, tokens));
            }
        }
        Ok(Self { lines, position: 0 })
    }

    /// consume and return the next non-empty line
    pub fn next(&mut self) -> Option<(usize, Vec<String>)> {
        let entry = self.lines.get(self.position)?;
        self.position += 1;
        Some((entry.0, entry.1.clone()))
    }

    pub fn eof(&self) -> bool {
        self.position >= self.lines.len()
    }
}
