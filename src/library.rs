// src/library.rs

//! Block-level editing of KiCad symbol library text.
//!
//! A library is read as an ordered list of segments: free text (headers,
//! comments, whitespace) and component blocks. Concatenating the segments
//! gives back the original file byte for byte, so every edit only touches
//! the span of the block it targets.
//!
//! Two grammars are supported:
//! - nested (`.kicad_sym`, KiCad 6): a block starts at a line whose trimmed
//!   text begins with `(symbol "` and ends when the parenthesis depth counted
//!   from that line returns to zero. Parentheses inside quoted strings do
//!   not count.
//! - flat (`.lib`, KiCad 5): a block starts at a `DEF ` line, together with
//!   a directly preceding `#` / `# NAME` / `#` comment, and ends at the first
//!   line that is exactly `ENDDEF`.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KicadVersion {
    /// Legacy `.lib` libraries.
    V5,
    /// S-expression `.kicad_sym` libraries.
    V6,
}

impl KicadVersion {
    pub fn extension(&self) -> &'static str {
        match self {
            KicadVersion::V5 => "lib",
            KicadVersion::V6 => "kicad_sym",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "lib" => Some(KicadVersion::V5),
            "kicad_sym" => Some(KicadVersion::V6),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Contents of a freshly created, empty library.
pub fn library_header(version: KicadVersion, generator: &str) -> String {
    match version {
        KicadVersion::V6 => format!(
            "(kicad_symbol_lib\n  (version 20211014)\n  (generator {})\n)",
            generator
        ),
        KicadVersion::V5 => "EESchema-LIBRARY Version 2.4\n#encoding utf-8\n".to_string(),
    }
}

/// One component, exactly as it appears in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryBlock {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Block(LibraryBlock),
}

impl Segment {
    fn as_str(&self) -> &str {
        match self {
            Segment::Text(text) => text,
            Segment::Block(block) => &block.text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDocument {
    pub version: KicadVersion,
    segments: Vec<Segment>,
}

/// Adds the parenthesis balance of `line` to a running depth. Quoted
/// strings (with `\` escapes) are skipped; `in_string` carries across lines.
fn paren_delta(line: &str, in_string: &mut bool) -> i32 {
    let mut delta = 0;
    let mut escaped = false;
    for c in line.chars() {
        if *in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => *in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => *in_string = true,
            '(' => delta += 1,
            ')' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Reads a quoted string starting right after its opening quote.
fn read_quoted(text: &str) -> Option<String> {
    let mut value = String::new();
    let mut escaped = false;
    for c in text.chars() {
        match c {
            _ if escaped => {
                value.push(c);
                escaped = false;
            }
            '\\' => escaped = true,
            '"' => return Some(value),
            _ => value.push(c),
        }
    }
    None
}

fn nested_block_name(line: &str) -> Option<String> {
    line.trim_start()
        .strip_prefix("(symbol \"")
        .and_then(read_quoted)
}

fn flat_block_name(line: &str) -> Option<&str> {
    line.strip_prefix("DEF ")?.split_whitespace().next()
}

fn is_flat_terminator(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']) == "ENDDEF"
}

/// Splits the `#` / `# NAME` / `#` comment that introduces a flat block off
/// the end of `text`.
fn take_comment_header(text: &mut String, name: &str) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if lines.len() < 3 {
        return String::new();
    }
    let tail = &lines[lines.len() - 3..];
    let trimmed: Vec<&str> = tail.iter().map(|l| l.trim_end_matches(['\r', '\n'])).collect();
    if trimmed[0] != "#" || trimmed[1] != format!("# {}", name) || trimmed[2] != "#" {
        return String::new();
    }
    let tail_len: usize = tail.iter().map(|l| l.len()).sum();
    let at = text.len() - tail_len;
    text.split_off(at)
}

impl LibraryDocument {
    pub fn parse(content: &str, version: KicadVersion) -> Self {
        let segments = match version {
            KicadVersion::V6 => Self::parse_nested(content),
            KicadVersion::V5 => Self::parse_flat(content),
        };
        LibraryDocument { version, segments }
    }

    fn parse_nested(content: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut text = String::new();
        // (block, depth, inside a quoted string)
        let mut open: Option<(LibraryBlock, i32, bool)> = None;

        for line in content.split_inclusive('\n') {
            if let Some((block, depth, in_string)) = open.as_mut() {
                block.text.push_str(line);
                *depth += paren_delta(line, in_string);
                if *depth <= 0 {
                    if let Some((block, _, _)) = open.take() {
                        segments.push(Segment::Block(block));
                    }
                }
                continue;
            }

            if let Some(name) = nested_block_name(line) {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                let mut in_string = false;
                let depth = paren_delta(line, &mut in_string);
                let block = LibraryBlock {
                    name,
                    text: line.to_string(),
                };
                if depth <= 0 {
                    segments.push(Segment::Block(block));
                } else {
                    open = Some((block, depth, in_string));
                }
                continue;
            }

            text.push_str(line);
        }

        if let Some((block, _, _)) = open {
            log::debug!("Unterminated symbol block {:?} kept as plain text", block.name);
            text.push_str(&block.text);
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        segments
    }

    fn parse_flat(content: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut open: Option<LibraryBlock> = None;

        for line in content.split_inclusive('\n') {
            if let Some(block) = open.as_mut() {
                block.text.push_str(line);
                if is_flat_terminator(line) {
                    if let Some(block) = open.take() {
                        segments.push(Segment::Block(block));
                    }
                }
                continue;
            }

            if let Some(name) = flat_block_name(line) {
                let mut block_text = take_comment_header(&mut text, name);
                block_text.push_str(line);
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                open = Some(LibraryBlock {
                    name: name.to_string(),
                    text: block_text,
                });
                continue;
            }

            text.push_str(line);
        }

        if let Some(block) = open {
            log::debug!("Unterminated DEF block {:?} kept as plain text", block.name);
            text.push_str(&block.text);
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        segments
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn blocks(&self) -> impl Iterator<Item = &LibraryBlock> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Block(block) => Some(block),
            Segment::Text(_) => None,
        })
    }
}

impl fmt::Display for LibraryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str(segment.as_str())?;
        }
        Ok(())
    }
}

fn nested_property_regex() -> &'static Regex {
    static PROPERTY: OnceLock<Regex> = OnceLock::new();
    PROPERTY.get_or_init(|| {
        Regex::new(r#"\(property\s+"((?:[^"\\]|\\.)*)"\s+"((?:[^"\\]|\\.)*)""#)
            .expect("invalid property regex")
    })
}

fn unescape(value: &str) -> String {
    read_quoted(&format!("{}\"", value)).unwrap_or_else(|| value.to_string())
}

/// `F<n> "value" ... ["name"]` fields of a flat block.
fn flat_fields(text: &str) -> impl Iterator<Item = (usize, String, Option<String>)> + '_ {
    text.lines().filter_map(|line| {
        let rest = line.strip_prefix('F')?;
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        let index: usize = rest[..digits_end].parse().ok()?;
        let after = rest[digits_end..].trim_start().strip_prefix('"')?;
        let value = read_quoted(after)?;
        let name = line
            .trim_end()
            .strip_suffix('"')
            .and_then(|l| l.rsplit_once('"'))
            .map(|(_, name)| name.to_string())
            .filter(|_| index > 3);
        Some((index, value, name))
    })
}

/// LCSC id and footprint reference declared by a block.
fn block_properties(block: &LibraryBlock, version: KicadVersion) -> (Option<String>, Option<String>) {
    let mut lcsc = None;
    let mut footprint = None;
    match version {
        KicadVersion::V6 => {
            for caps in nested_property_regex().captures_iter(&block.text) {
                let value = unescape(&caps[2]);
                match &caps[1] {
                    "LCSC Part" if lcsc.is_none() => lcsc = Some(value),
                    "Footprint" if footprint.is_none() => footprint = Some(value),
                    _ => {}
                }
            }
        }
        KicadVersion::V5 => {
            for (index, value, name) in flat_fields(&block.text) {
                let is_lcsc = index == 6 || name.as_deref() == Some("LCSC Part");
                if is_lcsc && lcsc.is_none() {
                    lcsc = Some(value);
                } else if index == 2 && footprint.is_none() {
                    footprint = Some(value);
                }
            }
        }
    }
    (lcsc.filter(|id| !id.is_empty()), footprint.filter(|fp| !fp.is_empty()))
}

/// A block found by its LCSC id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch {
    pub name: String,
    pub lcsc_id: String,
    pub footprint: Option<String>,
}

/// First block whose LCSC property equals `lcsc_id`, ignoring case.
pub fn find_block(content: &str, version: KicadVersion, lcsc_id: &str) -> Option<BlockMatch> {
    let document = LibraryDocument::parse(content, version);
    document.blocks().find_map(|block| {
        let (lcsc, footprint) = block_properties(block, version);
        let lcsc = lcsc.filter(|id| id.eq_ignore_ascii_case(lcsc_id))?;
        Some(BlockMatch {
            name: block.name.clone(),
            lcsc_id: lcsc,
            footprint,
        })
    })
}

/// Maps every upper-cased LCSC id in the library to its footprint reference,
/// in one pass. The first block declaring an id wins.
pub fn index_by_lcsc_id(content: &str, version: KicadVersion) -> HashMap<String, Option<String>> {
    let document = LibraryDocument::parse(content, version);
    let mut index = HashMap::new();
    for block in document.blocks() {
        if let (Some(lcsc), footprint) = block_properties(block, version) {
            index.entry(lcsc.to_uppercase()).or_insert(footprint);
        }
    }
    index
}

pub fn contains_component(content: &str, version: KicadVersion, name: &str) -> bool {
    count_components(content, version, name) > 0
}

/// Number of blocks named `name`. `update` only replaces a block when this is one.
pub fn count_components(content: &str, version: KicadVersion, name: &str) -> usize {
    LibraryDocument::parse(content, version)
        .blocks()
        .filter(|block| block.name == name)
        .count()
}

fn normalize_block(block_text: &str) -> String {
    let mut text = block_text.to_string();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Adds a block before the closing parenthesis of a nested library, or at
/// the end of a flat one. A block whose name is already present is not
/// added twice.
pub fn insert(content: &str, version: KicadVersion, block_text: &str) -> String {
    let block_text = normalize_block(block_text);
    let Some(name) = LibraryDocument::parse(&block_text, version)
        .blocks()
        .next()
        .map(|block| block.name.clone())
    else {
        log::warn!("Refusing to insert text that is not a symbol block");
        return content.to_string();
    };

    if contains_component(content, version, &name) {
        log::warn!("Symbol {} is already in the library, not inserting it again", name);
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len() + block_text.len() + 1);
    match version {
        KicadVersion::V6 => match content.rfind(')') {
            Some(end) => {
                let (head, tail) = content.split_at(end);
                out.push_str(head);
                if !head.is_empty() && !head.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&block_text);
                out.push_str(tail);
            }
            None => {
                out.push_str(content);
                out.push_str(&block_text);
            }
        },
        KicadVersion::V5 => {
            out.push_str(content);
            if !content.is_empty() && !content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block_text);
        }
    }
    log::debug!("Inserted symbol {}", name);
    out
}

/// Replaces the block named `name` when exactly one block has that name.
pub fn update(content: &str, version: KicadVersion, name: &str, block_text: &str) -> String {
    let mut document = LibraryDocument::parse(content, version);
    let matches: Vec<usize> = document
        .segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| matches!(segment, Segment::Block(block) if block.name == name))
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [index] => {
            document.segments[*index] = Segment::Block(LibraryBlock {
                name: name.to_string(),
                text: normalize_block(block_text),
            });
            document.to_string()
        }
        [] => {
            log::debug!("No symbol named {} to update", name);
            content.to_string()
        }
        _ => {
            log::warn!("{} symbols are named {}, not updating any", matches.len(), name);
            content.to_string()
        }
    }
}

/// Removes the blocks named `name` whose LCSC property equals `lcsc_id`.
pub fn delete(content: &str, version: KicadVersion, lcsc_id: &str, name: &str) -> String {
    let mut document = LibraryDocument::parse(content, version);
    let before = document.segments.len();
    document.segments.retain(|segment| match segment {
        Segment::Block(block) if block.name == name => !block_properties(block, version)
            .0
            .is_some_and(|id| id.eq_ignore_ascii_case(lcsc_id)),
        _ => true,
    });
    if document.segments.len() == before {
        log::debug!("No symbol {} with LCSC id {} to delete", name, lcsc_id);
        return content.to_string();
    }
    document.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const V6_LIB: &str = r#"(kicad_symbol_lib
  (version 20211014)
  (generator easyeda2kicad_rs)
  (symbol "NE555"
    (property "Reference" "U" (id 0) (at 0 2.54 0)
      (effects (font (size 1.27 1.27)))
    )
    (property "Footprint" "lib:SOIC-8" (id 2) (at 0 0 0)
      (effects (font (size 1.27 1.27)) hide)
    )
    (property "LCSC Part" "C7593" (id 4) (at 0 0 0)
      (effects (font (size 1.27 1.27)) hide)
    )
    (symbol "NE555_1_1"
      (pin input line (at 0 0 0) (length 2.54)
        (name "TRIG(" (effects (font (size 1.27 1.27))))
        (number "2" (effects (font (size 1.27 1.27))))
      )
    )
  )
  (symbol "ONE_LINE" (property "LCSC Part" "c1234" (id 4) (at 0 0 0)))
)"#;

    const V5_LIB: &str = "EESchema-LIBRARY Version 2.4
#encoding utf-8
#
# NE555
#
DEF NE555 U 0 40 Y Y 1 F N
F0 \"U\" 0 100 50 H V C CNN
F1 \"NE555\" 0 -100 50 H V C CNN
F2 \"lib:SOIC-8\" 0 0 50 H I C CNN
F3 \"\" 0 0 50 H I C CNN
F6 \"C7593\" 0 0 50 H I C CNN \"LCSC Part\"
DRAW
ENDDRAW
ENDDEF
DEF LM358 U 0 40 Y Y 1 F N
F0 \"U\" 0 100 50 H V C CNN
F4 \"C7950\" 0 0 50 H I C CNN \"LCSC Part\"
ENDDEF
#End Library
";

    #[test]
    fn parse_round_trips_byte_for_byte() {
        for (content, version) in [(V6_LIB, KicadVersion::V6), (V5_LIB, KicadVersion::V5)] {
            let document = LibraryDocument::parse(content, version);
            assert_eq!(document.to_string(), content);
        }
        let v6 = LibraryDocument::parse(V6_LIB, KicadVersion::V6);
        let names: Vec<&str> = v6.blocks().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["NE555", "ONE_LINE"]);
    }

    #[test]
    fn quoted_parens_do_not_end_block() {
        let document = LibraryDocument::parse(V6_LIB, KicadVersion::V6);
        let first = document.blocks().next().unwrap();
        assert!(first.text.starts_with("  (symbol \"NE555\"\n"));
        assert!(first.text.ends_with("    )\n  )\n"));
    }

    #[test]
    fn flat_block_owns_its_comment_header() {
        let document = LibraryDocument::parse(V5_LIB, KicadVersion::V5);
        let blocks: Vec<&LibraryBlock> = document.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].text.starts_with("#\n# NE555\n#\nDEF NE555"));
        assert!(blocks[1].text.starts_with("DEF LM358"));
        assert!(blocks[1].text.ends_with("ENDDEF\n"));
    }

    #[test]
    fn find_block_is_case_insensitive() {
        let found = find_block(V6_LIB, KicadVersion::V6, "c7593").unwrap();
        assert_eq!(found.name, "NE555");
        assert_eq!(found.footprint.as_deref(), Some("lib:SOIC-8"));
        let single = find_block(V6_LIB, KicadVersion::V6, "C1234").unwrap();
        assert_eq!(single.name, "ONE_LINE");
        assert_eq!(single.footprint, None);
        assert!(find_block(V6_LIB, KicadVersion::V6, "C1").is_none());

        let legacy = find_block(V5_LIB, KicadVersion::V5, "C7950").unwrap();
        assert_eq!(legacy.name, "LM358");
    }

    #[test]
    fn index_agrees_with_find_block() {
        for (content, version) in [(V6_LIB, KicadVersion::V6), (V5_LIB, KicadVersion::V5)] {
            let index = index_by_lcsc_id(content, version);
            assert_eq!(index.len(), 2);
            for (id, footprint) in &index {
                let found = find_block(content, version, id).unwrap();
                assert_eq!(&found.footprint, footprint);
            }
        }
    }

    #[test]
    fn insert_goes_before_closing_paren() {
        let header = library_header(KicadVersion::V6, "easyeda2kicad_rs");
        let block = "  (symbol \"R1\" (property \"LCSC Part\" \"C1\"))";
        let out = insert(&header, KicadVersion::V6, block);
        assert_eq!(
            out,
            "(kicad_symbol_lib\n  (version 20211014)\n  (generator easyeda2kicad_rs)\n  (symbol \"R1\" (property \"LCSC Part\" \"C1\"))\n)"
        );
        // Same name again is refused.
        assert_eq!(insert(&out, KicadVersion::V6, block), out);
        assert_eq!(insert(&out, KicadVersion::V6, "not a block"), out);
    }

    #[test]
    fn insert_then_update_equals_inserting_final_text() {
        let first = "  (symbol \"NEW\"\n    (property \"LCSC Part\" \"C9\")\n  )\n";
        let last = "  (symbol \"NEW\"\n    (property \"LCSC Part\" \"C9\")\n    (property \"Value\" \"x\")\n  )\n";
        let updated = update(
            &insert(V6_LIB, KicadVersion::V6, first),
            KicadVersion::V6,
            "NEW",
            last,
        );
        assert_eq!(updated, insert(V6_LIB, KicadVersion::V6, last));
        assert!(updated.starts_with(&V6_LIB[..V6_LIB.len() - 1]));

        let first = "#\n# NEW\n#\nDEF NEW U 0 40 Y Y 1 F N\nENDDEF\n";
        let last = "#\n# NEW\n#\nDEF NEW IC 0 40 Y Y 1 F N\nDRAW\nENDDRAW\nENDDEF\n";
        let updated = update(
            &insert(V5_LIB, KicadVersion::V5, first),
            KicadVersion::V5,
            "NEW",
            last,
        );
        assert_eq!(updated, insert(V5_LIB, KicadVersion::V5, last));
        assert!(updated.starts_with(V5_LIB));
    }

    #[test]
    fn update_requires_unique_match() {
        assert_eq!(update(V6_LIB, KicadVersion::V6, "MISSING", "  (symbol \"MISSING\")\n"), V6_LIB);
        let doubled = format!("{}{}", V5_LIB, "DEF LM358 U 0 40 Y Y 1 F N\nENDDEF\n");
        assert_eq!(update(&doubled, KicadVersion::V5, "LM358", "DEF LM358 X\nENDDEF\n"), doubled);
        assert_eq!(count_components(&doubled, KicadVersion::V5, "LM358"), 2);
        assert_eq!(count_components(V6_LIB, KicadVersion::V6, "MISSING"), 0);
    }

    #[test]
    fn delete_needs_name_and_id() {
        assert_eq!(delete(V5_LIB, KicadVersion::V5, "C9999", "NE555"), V5_LIB);
        assert_eq!(delete(V5_LIB, KicadVersion::V5, "C7593", "LM358"), V5_LIB);

        let out = delete(V5_LIB, KicadVersion::V5, "c7593", "NE555");
        assert!(!out.contains("NE555"));
        assert!(out.starts_with("EESchema-LIBRARY Version 2.4\n#encoding utf-8\nDEF LM358"));
        assert!(out.ends_with("ENDDEF\n#End Library\n"));

        let out = delete(V6_LIB, KicadVersion::V6, "C1234", "ONE_LINE");
        assert!(!contains_component(&out, KicadVersion::V6, "ONE_LINE"));
        assert!(contains_component(&out, KicadVersion::V6, "NE555"));
    }

    #[test]
    fn version_follows_extension() {
        assert_eq!(KicadVersion::from_path(Path::new("a/b.kicad_sym")), Some(KicadVersion::V6));
        assert_eq!(KicadVersion::from_path(Path::new("b.lib")), Some(KicadVersion::V5));
        assert_eq!(KicadVersion::from_path(Path::new("b.txt")), None);
    }
}
