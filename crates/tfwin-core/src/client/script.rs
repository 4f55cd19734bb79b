// Script templates
//
// Templates are PowerShell text with `{{name}}` placeholders. Arguments are
// JSON documents substituted inside single-quoted PowerShell strings, so the
// only escaping needed is doubling every character PowerShell reads as a
// single quote: the ASCII one and the curly quotes U+2018 to U+201B.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::error::Result;
use crate::traits::Script;

/// Lines every script starts with
const PREAMBLE: &str = "$ErrorActionPreference = 'Stop'\n\
                        $ProgressPreference = 'SilentlyContinue'\n";

/// A named PowerShell template
#[derive(Debug, Clone, Copy)]
pub struct ScriptTemplate {
    name: &'static str,
    text: &'static str,
}

impl ScriptTemplate {
    pub const fn new(name: &'static str, text: &'static str) -> Self {
        Self { name, text }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Substitute already-escaped arguments in a single pass over the template
    ///
    /// Placeholders without a matching argument are left untouched, and
    /// substituted values are never scanned for placeholders.
    pub fn render(&self, args: &[(&str, String)]) -> Script {
        let mut body = String::with_capacity(PREAMBLE.len() + self.text.len());
        body.push_str(PREAMBLE);

        let mut rest = self.text;
        while let Some(start) = rest.find("{{") {
            let (before, open) = rest.split_at(start);
            body.push_str(before);
            let value = open[2..].find("}}").and_then(|end| {
                let key = &open[2..2 + end];
                args.iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| (value, 2 + end + 2))
            });
            match value {
                Some((value, consumed)) => {
                    body.push_str(value);
                    rest = &open[consumed..];
                }
                None => {
                    body.push_str("{{");
                    rest = &open[2..];
                }
            }
        }
        body.push_str(rest);
        Script::new(self.name, body)
    }

    /// Render a template whose only argument is `{{args}}`
    pub fn render_json<T: Serialize + ?Sized>(&self, args: &T) -> Result<Script> {
        Ok(self.render(&[("args", ps_json(args)?)]))
    }
}

/// Encode a PowerShell command for `-EncodedCommand` (base64 of UTF-16LE)
pub fn encode_command(body: &str) -> String {
    let bytes: Vec<u8> = body.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

/// Serialize a value to JSON for a single-quoted PowerShell string
pub fn ps_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            escaped.push(c);
        }
        escaped.push(c);
    }
    Ok(escaped)
}
