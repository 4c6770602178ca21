//! Minimal Markdown scanner for executable code blocks.
//!
//! Recognizes YAML front matter and fenced code blocks whose info string is
//! `<language> {attributes}`. Attributes are either JSON
//! (`{"name": "build"}`) or whitespace-separated `key=value` pairs
//! (`{ name=build category=ci,release }`).

use std::collections::{BTreeMap, HashMap};

use crate::project::task::{CodeBlock, Frontmatter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub frontmatter: Option<Frontmatter>,
    pub blocks: Vec<CodeBlock>,
}

/// Scan `source`; the error is a message about malformed front matter.
pub fn parse_document(source: &str) -> Result<ParsedDocument, String> {
    let lines: Vec<&str> = source.lines().collect();
    let (frontmatter, mut i) = parse_frontmatter(&lines)?;

    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut last_paragraph = String::new();
    let mut seen_names: HashMap<String, usize> = HashMap::new();

    while i < lines.len() {
        let line = lines[i];
        if let Some((fence, info)) = open_fence(line) {
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && !closes_fence(lines[i], &fence) {
                body.push(lines[i].to_string());
                i += 1;
            }
            // Skip the closing fence (or run off the end of an unclosed block).
            i += 1;

            let description = if paragraph.is_empty() {
                std::mem::take(&mut last_paragraph)
            } else {
                paragraph.join(" ")
            };
            paragraph.clear();
            last_paragraph.clear();

            let mut block = build_block(&info, body, description);
            if block.is_unnamed {
                block.name = unique_name(generated_name(&block), &mut seen_names);
            } else {
                seen_names.entry(block.name.clone()).or_insert(1);
            }
            blocks.push(block);
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !paragraph.is_empty() {
                last_paragraph = paragraph.join(" ");
                paragraph.clear();
            }
        } else if trimmed.starts_with('#') {
            paragraph.clear();
            last_paragraph.clear();
        } else {
            paragraph.push(trimmed);
        }
        i += 1;
    }

    Ok(ParsedDocument { frontmatter, blocks })
}

fn parse_frontmatter(lines: &[&str]) -> Result<(Option<Frontmatter>, usize), String> {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return Ok((None, 0));
    }
    let Some(end) = lines.iter().skip(1).position(|l| l.trim_end() == "---") else {
        return Ok((None, 0));
    };
    let yaml = lines[1..=end].join("\n");
    let frontmatter = if yaml.trim().is_empty() {
        Frontmatter::default()
    } else {
        serde_yaml::from_str(&yaml).map_err(|e| e.to_string())?
    };
    Ok((Some(frontmatter), end + 2))
}

/// Returns the fence marker and info string of an opening fence line.
fn open_fence(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let count = trimmed.chars().take_while(|c| *c == marker).count();
    if count < 3 {
        return None;
    }
    let info = trimmed[count..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((trimmed[..count].to_string(), info.to_string()))
}

fn closes_fence(line: &str, fence: &str) -> bool {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let Some(marker) = fence.chars().next() else {
        return false;
    };
    let count = trimmed.chars().take_while(|c| *c == marker).count();
    count >= fence.len() && trimmed[count..].trim().is_empty()
}

fn build_block(info: &str, lines: Vec<String>, description: String) -> CodeBlock {
    let split = info
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(info.len());
    let language = info[..split].to_string();
    let attributes = parse_attributes(info[split..].trim());

    let mut block = CodeBlock {
        language,
        lines,
        description,
        ..Default::default()
    };

    if let Some(name) = attributes.get("name").filter(|n| !n.is_empty()) {
        block.name = name.clone();
        block.is_unnamed = false;
    }
    let flag = |key: &str, default: bool| attributes.get(key).map_or(default, |v| parse_flag(v, default));
    block.interactive = flag("interactive", true);
    block.background = flag("background", false);
    block.prompt_env = flag("promptEnv", true);
    block.close_terminal_on_success = flag("closeTerminalOnSuccess", true);
    block.exclude_from_run_all = flag("excludeFromRunAll", false);
    if let Some(category) = attributes.get("category") {
        block.categories = category
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
    }
    block.cwd = attributes.get("cwd").filter(|c| !c.is_empty()).cloned();

    block
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" | "auto" => true,
        "false" | "no" | "0" | "off" => false,
        _ => default,
    }
}

/// Parse `{...}` attributes in JSON or `key=value` form.
pub(crate) fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if raw.is_empty() {
        return out;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(raw) {
        for (key, value) in map {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            out.insert(key, value);
        }
        return out;
    }

    let inner = raw
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(raw);

    for token in split_respecting_quotes(inner) {
        if let Some((key, value)) = token.split_once('=') {
            out.insert(key.trim().to_string(), unquote(value.trim()));
        }
    }
    out
}

fn split_respecting_quotes(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> String {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn generated_name(block: &CodeBlock) -> String {
    let words: Vec<String> = block
        .first_command()
        .split_whitespace()
        .take(3)
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        if block.language.is_empty() {
            "block".to_string()
        } else {
            block.language.clone()
        }
    } else {
        words.join("-")
    }
}

fn unique_name(base: String, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(base.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        base
    } else {
        format!("{}-{}", base, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"---
shell: bash
cwd: ..
---

# Setup

Install the dependencies
before anything else.

```sh {"name": "install", "category": "setup"}
npm install
```

```bash { name=test excludeFromRunAll=true interactive=false category=ci,slow }
npm test
```

Run it.
```sh
echo hello world again
```

```sh
echo hello world again
```

```
no language here
```
"#;

    #[test]
    fn test_frontmatter() {
        let doc = parse_document(DOC).unwrap();
        let fm = doc.frontmatter.unwrap();
        assert_eq!(fm.shell, "bash");
        assert_eq!(fm.cwd, "..");
    }

    #[test]
    fn test_blocks_and_attributes() {
        let doc = parse_document(DOC).unwrap();
        assert_eq!(doc.blocks.len(), 5);

        let install = &doc.blocks[0];
        assert_eq!(install.name, "install");
        assert!(!install.is_unnamed);
        assert_eq!(install.language, "sh");
        assert_eq!(install.lines, vec!["npm install"]);
        assert_eq!(install.categories, vec!["setup"]);
        assert_eq!(install.description, "Install the dependencies before anything else.");
        assert!(install.interactive);

        let test = &doc.blocks[1];
        assert_eq!(test.name, "test");
        assert!(test.exclude_from_run_all);
        assert!(!test.interactive);
        assert_eq!(test.categories, vec!["ci", "slow"]);
        assert_eq!(test.description, "");
    }

    #[test]
    fn test_generated_names_are_unique() {
        let doc = parse_document(DOC).unwrap();
        assert_eq!(doc.blocks[2].name, "echo-hello-world");
        assert!(doc.blocks[2].is_unnamed);
        assert_eq!(doc.blocks[2].description, "Run it.");
        assert_eq!(doc.blocks[3].name, "echo-hello-world-2");
        assert_eq!(doc.blocks[4].language, "");
    }

    #[test]
    fn test_no_frontmatter() {
        let doc = parse_document("```sh\nls\n```\n").unwrap();
        assert!(doc.frontmatter.is_none());
        assert_eq!(doc.blocks[0].name, "ls");
    }

    #[test]
    fn test_tilde_fence_and_unclosed_block() {
        let doc = parse_document("~~~python\nprint(1)\n~~~\n```sh\necho open\n").unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[0].language, "python");
        assert_eq!(doc.blocks[1].lines, vec!["echo open"]);
    }

    #[test]
    fn test_invalid_frontmatter() {
        assert!(parse_document("---\nshell: [\n---\n").is_err());
    }

    #[test]
    fn test_quoted_attribute_values() {
        let attrs = parse_attributes(r#"{ name="hello world" cwd='/tmp' }"#);
        assert_eq!(attrs["name"], "hello world");
        assert_eq!(attrs["cwd"], "/tmp");
    }
}
